//! Configuration schema and loading.
//!
//! Options are declared once, in a static schema table, and resolved
//! through [`Config`]: no decorator tricks, no ambient global config
//! state. The engine only reads these options; defining new ones is a
//! schema edit.

use std::path::Path;

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::warn;

use crate::error::EngineError;

/// Value type of a configuration option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// Boolean flag.
    Bool,
    /// Integer.
    Int,
    /// Text.
    Str,
}

/// Whether an option is surfaced in user-facing listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionVisibility {
    /// Listed in config dumps and docs.
    Visible,
    /// Internal tuning knob.
    Hidden,
}

/// A resolved option value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Str(SmolStr),
}

impl ConfigValue {
    /// The option kind this value satisfies.
    #[must_use]
    pub fn kind(&self) -> OptionKind {
        match self {
            Self::Bool(_) => OptionKind::Bool,
            Self::Int(_) => OptionKind::Int,
            Self::Str(_) => OptionKind::Str,
        }
    }
}

/// One record of the option schema.
#[derive(Debug, Clone)]
pub struct OptionSchema {
    /// Dotted `section.name` key as written in TOML.
    pub key: &'static str,
    /// Value type.
    pub kind: OptionKind,
    /// Default when the file does not set the option.
    pub default: fn() -> ConfigValue,
    /// Listing visibility.
    pub visibility: OptionVisibility,
    /// Deprecation notice, if the option is on its way out.
    pub deprecated: Option<&'static str>,
    /// One-line description.
    pub description: &'static str,
}

/// The full option schema, in listing order.
#[must_use]
pub fn option_schema() -> &'static [OptionSchema] {
    static SCHEMA: &[OptionSchema] = &[
        OptionSchema {
            key: "global.log_level",
            kind: OptionKind::Str,
            default: || ConfigValue::Str(SmolStr::new_static("info")),
            visibility: OptionVisibility::Visible,
            deprecated: None,
            description: "Log verbosity: error, warn, info, debug or trace.",
        },
        OptionSchema {
            key: "global.max_cached_message_age",
            kind: OptionKind::Int,
            default: || ConfigValue::Int(2),
            visibility: OptionVisibility::Visible,
            deprecated: None,
            description: "Runs a session may go without referencing a cached \
                          message before it expires.",
        },
        OptionSchema {
            key: "global.cached_message_size_threshold",
            kind: OptionKind::Int,
            default: || ConfigValue::Int(10_000),
            visibility: OptionVisibility::Hidden,
            deprecated: None,
            description: "Minimum serialized size, in bytes, for a message to \
                          enter the dedup cache.",
        },
        OptionSchema {
            key: "runner.fast_reruns",
            kind: OptionKind::Bool,
            default: || ConfigValue::Bool(true),
            visibility: OptionVisibility::Visible,
            deprecated: None,
            description: "Hard-stop an in-progress run on new input instead of \
                          waiting for it to coalesce the rerun itself.",
        },
        OptionSchema {
            key: "runner.run_on_save",
            kind: OptionKind::Bool,
            default: || ConfigValue::Bool(false),
            visibility: OptionVisibility::Visible,
            deprecated: None,
            description: "Rerun sessions automatically when the script source \
                          changes on disk.",
        },
        OptionSchema {
            key: "runner.watch_source",
            kind: OptionKind::Bool,
            default: || ConfigValue::Bool(false),
            visibility: OptionVisibility::Visible,
            deprecated: None,
            description: "Watch the script source path for changes.",
        },
        OptionSchema {
            key: "runner.yield_on_state_access",
            kind: OptionKind::Bool,
            default: || ConfigValue::Bool(true),
            visibility: OptionVisibility::Hidden,
            deprecated: None,
            description: "Treat every session-state access as an interruption \
                          yield point, not just element enqueues.",
        },
        OptionSchema {
            key: "runner.post_run_gc",
            kind: OptionKind::Bool,
            default: || ConfigValue::Bool(false),
            visibility: OptionVisibility::Hidden,
            deprecated: Some(
                "runner.post_run_gc has no effect and will be removed; \
                 per-run cleanup is unconditional now",
            ),
            description: "Formerly forced an allocator sweep after each run.",
        },
    ];
    SCHEMA
}

/// Resolved configuration: every schema key has a value.
#[derive(Debug, Clone)]
pub struct Config {
    values: IndexMap<SmolStr, ConfigValue>,
}

impl Default for Config {
    fn default() -> Self {
        let mut values = IndexMap::new();
        for option in option_schema() {
            values.insert(SmolStr::new(option.key), (option.default)());
        }
        Self { values }
    }
}

impl Config {
    /// Schema defaults only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text over the schema defaults.
    ///
    /// Unknown keys warn and are ignored; deprecated keys warn and apply;
    /// a kind mismatch is an error.
    pub fn load_str(text: &str) -> Result<Self, EngineError> {
        let table: toml::Table = text
            .parse()
            .map_err(|err| EngineError::InvalidConfig(format!("{err}").into()))?;
        let mut config = Self::default();
        for (section, entries) in &table {
            let toml::Value::Table(entries) = entries else {
                return Err(EngineError::InvalidConfig(
                    format!("top-level '{section}' must be a table").into(),
                ));
            };
            for (name, value) in entries {
                let key = format!("{section}.{name}");
                config.apply(&key, value)?;
            }
        }
        Ok(config)
    }

    /// Parse a TOML file over the schema defaults.
    pub fn load_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            EngineError::InvalidConfig(format!("read {}: {err}", path.display()).into())
        })?;
        Self::load_str(&text)
    }

    fn apply(&mut self, key: &str, value: &toml::Value) -> Result<(), EngineError> {
        let Some(option) = option_schema().iter().find(|option| option.key == key) else {
            warn!(key, "ignoring unknown config option");
            return Ok(());
        };
        if let Some(notice) = option.deprecated {
            warn!(key, "{notice}");
        }
        let resolved = match (option.kind, value) {
            (OptionKind::Bool, toml::Value::Boolean(flag)) => ConfigValue::Bool(*flag),
            (OptionKind::Int, toml::Value::Integer(number)) => ConfigValue::Int(*number),
            (OptionKind::Str, toml::Value::String(text)) => ConfigValue::Str(text.into()),
            (kind, other) => {
                return Err(EngineError::InvalidConfig(
                    format!("option '{key}' expects {kind:?}, got {other}").into(),
                ));
            }
        };
        self.values.insert(SmolStr::new(key), resolved);
        Ok(())
    }

    /// Override one option programmatically; the key must exist in the
    /// schema and the value must match its kind.
    pub fn set(&mut self, key: &str, value: ConfigValue) -> Result<(), EngineError> {
        let Some(option) = option_schema().iter().find(|option| option.key == key) else {
            return Err(EngineError::InvalidConfig(
                format!("unknown option '{key}'").into(),
            ));
        };
        if option.kind != value.kind() {
            return Err(EngineError::InvalidConfig(
                format!("option '{key}' expects {:?}", option.kind).into(),
            ));
        }
        self.values.insert(SmolStr::new(key), value);
        Ok(())
    }

    /// Raw value of a schema key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    fn get_bool(&self, key: &str) -> bool {
        match self.values.get(key) {
            Some(ConfigValue::Bool(flag)) => *flag,
            _ => unreachable!("schema guarantees '{key}' is a bool"),
        }
    }

    fn get_int(&self, key: &str) -> i64 {
        match self.values.get(key) {
            Some(ConfigValue::Int(number)) => *number,
            _ => unreachable!("schema guarantees '{key}' is an int"),
        }
    }

    fn get_str(&self, key: &str) -> &str {
        match self.values.get(key) {
            Some(ConfigValue::Str(text)) => text,
            _ => unreachable!("schema guarantees '{key}' is a string"),
        }
    }

    /// `global.log_level`.
    #[must_use]
    pub fn log_level(&self) -> &str {
        self.get_str("global.log_level")
    }

    /// `global.max_cached_message_age`.
    #[must_use]
    pub fn max_cached_message_age(&self) -> u64 {
        self.get_int("global.max_cached_message_age").max(0) as u64
    }

    /// `global.cached_message_size_threshold`.
    #[must_use]
    pub fn cached_message_size_threshold(&self) -> usize {
        usize::try_from(self.get_int("global.cached_message_size_threshold")).unwrap_or(0)
    }

    /// `runner.fast_reruns`.
    #[must_use]
    pub fn fast_reruns(&self) -> bool {
        self.get_bool("runner.fast_reruns")
    }

    /// `runner.run_on_save`.
    #[must_use]
    pub fn run_on_save(&self) -> bool {
        self.get_bool("runner.run_on_save")
    }

    /// `runner.watch_source`.
    #[must_use]
    pub fn watch_source(&self) -> bool {
        self.get_bool("runner.watch_source")
    }

    /// `runner.yield_on_state_access`.
    #[must_use]
    pub fn yield_on_state_access(&self) -> bool {
        self.get_bool("runner.yield_on_state_access")
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;

    #[test]
    fn defaults_cover_every_schema_key() {
        let config = Config::new();
        for option in option_schema() {
            let value = config.get(option.key).expect("default present");
            assert_eq!(value.kind(), option.kind, "key {}", option.key);
        }
    }

    #[test]
    fn toml_overrides_apply() {
        let config = Config::load_str(
            r#"
[runner]
fast_reruns = false

[global]
max_cached_message_age = 7
log_level = "debug"
"#,
        )
        .unwrap();
        assert!(!config.fast_reruns());
        assert_eq!(config.max_cached_message_age(), 7);
        assert_eq!(config.log_level(), "debug");
        // Untouched options keep their defaults.
        assert!(config.yield_on_state_access());
    }

    #[test]
    fn unknown_keys_are_ignored_not_fatal() {
        let config = Config::load_str("[runner]\nno_such_option = 1\n").unwrap();
        assert!(config.fast_reruns());
    }

    #[test]
    fn kind_mismatch_is_an_error() {
        let err = Config::load_str("[runner]\nfast_reruns = \"yes\"\n").unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
        expect![[r#"invalid config 'option 'runner.fast_reruns' expects Bool, got "yes"'"#]]
            .assert_eq(&err.to_string());
    }

    #[test]
    fn programmatic_set_validates_kind() {
        let mut config = Config::new();
        config
            .set("runner.fast_reruns", ConfigValue::Bool(false))
            .unwrap();
        assert!(!config.fast_reruns());
        assert!(config
            .set("runner.fast_reruns", ConfigValue::Int(1))
            .is_err());
        assert!(config.set("nope.nope", ConfigValue::Bool(true)).is_err());
    }
}

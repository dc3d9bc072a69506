//! Widget identity computation.

use sha2::{Digest, Sha256};
use smol_str::SmolStr;

/// Prefix marking generated widget ids, so they can be told apart from
/// user-assigned keys in iteration and filtering.
pub const WIDGET_ID_PREFIX: &str = "$$ID";

/// Deterministically derive a widget's stable identity.
///
/// The id is a pure function of the widget kind, its structural parameters
/// and the optional user key: the same declaration re-executed on a later
/// run lands on the same id, and two widgets that differ in any of the three
/// inputs never collide. Two keyless widgets with identical kind and params
/// collide by construction; the caller reports that as a duplicate-id error.
#[must_use]
pub fn compute_widget_id(
    kind: &str,
    params: &serde_json::Value,
    user_key: Option<&str>,
) -> SmolStr {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0]);
    hasher.update(params.to_string().as_bytes());
    hasher.update([0]);
    hasher.update(user_key.unwrap_or("").as_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(16);
    for byte in &digest[..8] {
        hex.push_str(&format!("{byte:02x}"));
    }
    SmolStr::new(format!(
        "{WIDGET_ID_PREFIX}-{hex}-{}",
        user_key.unwrap_or("none")
    ))
}

/// Whether a state key is a generated widget id rather than a user key.
#[must_use]
pub fn is_widget_id(key: &str) -> bool {
    key.starts_with(WIDGET_ID_PREFIX)
}

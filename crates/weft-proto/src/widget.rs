//! Widget state snapshots.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::value::WireValue;

/// The wire state of a single widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetState {
    /// Stable widget identity.
    pub id: SmolStr,
    /// Current value in wire form.
    pub value: WireValue,
}

/// An ordered snapshot of widget states for one session.
///
/// Sent by the frontend with every rerun request, and reconstructed by the
/// engine when it needs to seed a rerun from the current session state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetStates {
    /// Widget entries in frontend order.
    pub widgets: Vec<WidgetState>,
}

impl WidgetStates {
    /// Empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a widget's value by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&WireValue> {
        self.widgets
            .iter()
            .find(|state| state.id == id)
            .map(|state| &state.value)
    }

    /// Set a widget's value, replacing any previous entry for the id.
    pub fn set(&mut self, id: impl Into<SmolStr>, value: WireValue) {
        let id = id.into();
        if let Some(state) = self.widgets.iter_mut().find(|state| state.id == id) {
            state.value = value;
        } else {
            self.widgets.push(WidgetState { id, value });
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    /// Iterate entries in order.
    pub fn iter(&self) -> impl Iterator<Item = &WidgetState> {
        self.widgets.iter()
    }
}

impl FromIterator<(SmolStr, WireValue)> for WidgetStates {
    fn from_iter<T: IntoIterator<Item = (SmolStr, WireValue)>>(iter: T) -> Self {
        let mut states = WidgetStates::new();
        for (id, value) in iter {
            states.set(id, value);
        }
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_existing_entry() {
        let mut states = WidgetStates::new();
        states.set("w1", WireValue::Int(1));
        states.set("w2", WireValue::Bool(true));
        states.set("w1", WireValue::Int(2));

        assert_eq!(states.len(), 2);
        assert_eq!(states.get("w1"), Some(&WireValue::Int(2)));
        assert_eq!(states.get("w2"), Some(&WireValue::Bool(true)));
    }

    #[test]
    fn order_is_preserved() {
        let mut states = WidgetStates::new();
        states.set("b", WireValue::Int(1));
        states.set("a", WireValue::Int(2));
        let ids: Vec<_> = states.iter().map(|state| state.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }
}

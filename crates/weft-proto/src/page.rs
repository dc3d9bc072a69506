//! Page metadata.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Descriptive metadata for one page of a multi-page app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Stable page identity; rerun requests address pages by this.
    pub page_id: SmolStr,
    /// Display name.
    pub name: SmolStr,
    /// Optional icon, empty when unset.
    #[serde(default)]
    pub icon: SmolStr,
}

impl PageInfo {
    /// Page with a name and no icon.
    #[must_use]
    pub fn new(page_id: impl Into<SmolStr>, name: impl Into<SmolStr>) -> Self {
        Self {
            page_id: page_id.into(),
            name: name.into(),
            icon: SmolStr::default(),
        }
    }
}

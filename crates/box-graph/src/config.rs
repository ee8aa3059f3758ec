//! Graph and editing configuration

use serde::{Deserialize, Serialize};

/// Default number of undo steps kept by [`crate::Editing`]
pub const DEFAULT_HISTORY_LIMIT: usize = 256;

/// Box graph behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Check mandatory pointers and mandatory incoming edges on commit
    pub validate_on_commit: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            validate_on_commit: true,
        }
    }
}

/// Undo history behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditingConfig {
    /// Oldest modifications are dropped beyond this many; 0 keeps all
    pub history_limit: usize,
}

impl Default for EditingConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert!(GraphConfig::default().validate_on_commit);
        assert_eq!(EditingConfig::default().history_limit, DEFAULT_HISTORY_LIMIT);
    }
}

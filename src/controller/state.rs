use serde::{Deserialize, Serialize};

/// Where a folder stands in the configure/activate lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceState {
    /// The folder has never been configured as a phase folder
    Unconfigured,
    /// Configured, but not the selected folder or without a live master scene
    ConfiguredInactive,
    /// Selected, with a master scene that exists
    Active,
}

impl SequenceState {
    pub fn derive(marked: bool, selected: bool, master_exists: bool) -> Self {
        match (marked, selected && master_exists) {
            (false, _) => SequenceState::Unconfigured,
            (true, false) => SequenceState::ConfiguredInactive,
            (true, true) => SequenceState::Active,
        }
    }

    pub fn is_active(self) -> bool {
        self == SequenceState::Active
    }
}

impl std::fmt::Display for SequenceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequenceState::Unconfigured => write!(f, "unconfigured"),
            SequenceState::ConfiguredInactive => write!(f, "configured"),
            SequenceState::Active => write!(f, "active"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_state() {
        assert_eq!(SequenceState::derive(false, true, true), SequenceState::Unconfigured);
        assert_eq!(
            SequenceState::derive(true, true, false),
            SequenceState::ConfiguredInactive
        );
        assert_eq!(
            SequenceState::derive(true, false, true),
            SequenceState::ConfiguredInactive
        );
        assert!(SequenceState::derive(true, true, true).is_active());
    }

    #[test]
    fn test_display() {
        assert_eq!(SequenceState::Active.to_string(), "active");
        assert_eq!(SequenceState::ConfiguredInactive.to_string(), "configured");
    }
}

//! Typed error hierarchy for Easy Phasey.
//!
//! Two enums cover the two layers:
//! - `StoreError`: failures reported by a document or settings store
//! - `PhaseyError`: failures of phase-set and controller operations

use std::path::PathBuf;

use thiserror::Error;

use crate::store::DocumentKind;

/// Errors reported by a document or settings store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} does not exist")]
    Missing { kind: DocumentKind, id: String },

    #[error("Store rejected the change: {0}")]
    Rejected(String),

    #[error("World file I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("World data is malformed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors from phase-set and controller operations.
#[derive(Debug, Error)]
pub enum PhaseyError {
    #[error("No phase folder is selected. Configure and activate one first.")]
    NoSelection,

    #[error("{kind} {id} not found")]
    NotFound { kind: DocumentKind, id: String },

    #[error("Folder {folder} has no phase scenes that are not skipped")]
    NoValidScenes { folder: String },

    #[error("Failed to persist changes: {0}")]
    PersistenceFailure(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PhaseyError {
    pub fn not_found(kind: DocumentKind, id: impl Into<String>) -> Self {
        PhaseyError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type Result<T, E = PhaseyError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_carries_kind_and_id() {
        let err = PhaseyError::not_found(DocumentKind::Scene, "abc123");
        match &err {
            PhaseyError::NotFound { kind, id } => {
                assert_eq!(*kind, DocumentKind::Scene);
                assert_eq!(id, "abc123");
            }
            _ => panic!("Expected NotFound"),
        }
        assert!(err.to_string().contains("abc123"));
        assert!(err.to_string().contains("Scene"));
    }

    #[test]
    fn persistence_failure_converts_from_store_error() {
        let inner = StoreError::Rejected("read-only world".to_string());
        let err: PhaseyError = inner.into();
        match &err {
            PhaseyError::PersistenceFailure(StoreError::Rejected(msg)) => {
                assert_eq!(msg, "read-only world");
            }
            _ => panic!("Expected PersistenceFailure(Rejected(...))"),
        }
    }

    #[test]
    fn no_valid_scenes_names_the_folder() {
        let err = PhaseyError::NoValidScenes {
            folder: "Dungeon".into(),
        };
        assert!(err.to_string().contains("Dungeon"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&PhaseyError::NoSelection);
        assert_std_error(&StoreError::Rejected("x".into()));
    }
}

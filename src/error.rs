use std::{io, path::PathBuf};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors produced by the slot store, undo buffer and active list adapters.
///
/// Every variant is recoverable by the caller except the persistence class
/// (`Persistence`, `Corrupt`), which fails the current operation while leaving
/// the previously committed state on disk.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("slot {index} is out of range (1-{limit})")]
    InvalidSlotIndex { index: u32, limit: u32 },

    #[error("slot {0} has no saved mod list")]
    SlotNotSet(u32),

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("slot name cannot be empty")]
    EmptyName,

    #[error("state limit must be at least 1")]
    InvalidStateLimit,

    #[error("failed to {action} {}", path.display())]
    Persistence {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt slot record {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("malformed xml in {}: {reason}", path.display())]
    MalformedXml { path: PathBuf, reason: String },
}

impl StoreError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Persistence {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn is_persistence_failure(&self) -> bool {
        matches!(
            self,
            StoreError::Persistence { .. } | StoreError::Corrupt { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_slot_and_range() {
        let err = StoreError::InvalidSlotIndex { index: 7, limit: 5 };
        assert_eq!(err.to_string(), "slot 7 is out of range (1-5)");
        assert_eq!(
            StoreError::SlotNotSet(3).to_string(),
            "slot 3 has no saved mod list"
        );
    }

    #[test]
    fn persistence_class_covers_io_and_corruption() {
        let io_err = StoreError::io(
            "write slot",
            "/tmp/slots/1.json",
            io::Error::new(io::ErrorKind::Other, "disk full"),
        );
        let corrupt = StoreError::Corrupt {
            path: PathBuf::from("/tmp/slots/1.json"),
            reason: "eof".to_string(),
        };
        assert!(io_err.is_persistence_failure());
        assert!(corrupt.is_persistence_failure());
        assert!(!StoreError::NothingToUndo.is_persistence_failure());
        assert!(!StoreError::EmptyName.is_persistence_failure());
        assert_eq!(io_err.to_string(), "failed to write slot /tmp/slots/1.json");
    }
}

//! ZIP container serialization
//!
//! [`ArchiveWriter`] is a general streaming ZIP serializer that knows nothing
//! about TDF. [`TdfArchiveWriter`] layers the fixed TDF entry layout on top.

use std::io;

pub mod records;
mod tdf_writer;
mod writer;

pub use tdf_writer::{TdfArchiveWriter, MANIFEST_ENTRY_NAME, PAYLOAD_ENTRY_NAME};
pub use writer::ArchiveWriter;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("cannot begin entry '{requested}' while '{open}' is still open")]
    EntryAlreadyOpen { open: String, requested: String },
    #[error("no archive entry is open")]
    NoEntryOpen,
    #[error("entry '{name}' must be closed before the archive is finished")]
    EntryStillOpen { name: String },
    #[error("archive has already been finished")]
    AlreadyFinished,
    #[error("archive writer failed earlier and cannot continue")]
    Failed,
    #[error("entry '{name}' declared {declared} bytes but {actual} were written")]
    SizeMismatch {
        name: String,
        declared: u64,
        actual: u64,
    },
    #[error("failed to {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: io::Error,
    },
}

impl ArchiveError {
    /// Returns true for misuse of the entry state machine
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            Self::EntryAlreadyOpen { .. }
                | Self::NoEntryOpen
                | Self::EntryStillOpen { .. }
                | Self::AlreadyFinished
                | Self::Failed
        )
    }

    /// Returns a suggestion for resolving this error
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::EntryAlreadyOpen { .. } => Some("Close the current entry before beginning another"),
            Self::NoEntryOpen => Some("Call begin_entry before appending or closing"),
            Self::EntryStillOpen { .. } => Some("Call close_entry before finish"),
            Self::SizeMismatch { .. } => {
                Some("Declare the exact entry size or open the entry with an unknown size")
            }
            Self::Io { .. } => Some("Check that the output sink is writable"),
            Self::Failed => Some("Discard the partial output and start a new archive"),
            Self::AlreadyFinished => None,
        }
    }
}

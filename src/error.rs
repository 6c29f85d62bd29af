//! Unified error type for the TDF writer
//!
//! Internal modules keep their domain-specific errors for precise handling.
//! This type is what the writer pipeline returns to callers.
//!
//! # Example
//!
//! ```no_run
//! use opentdf_stream::TdfError;
//!
//! fn write_container() -> Result<(), TdfError> {
//!     // Archive, crypto and policy errors convert with `?`
//!     Ok(())
//! }
//! ```

use crate::archive::ArchiveError;
use crate::crypto::CryptoError;
use crate::key_access::KasFailure;
use crate::policy::PolicyError;
use thiserror::Error;

/// Unified error type for all writer operations
///
/// # Error Categories
///
/// - **Archive**: container serializer state machine, size and I/O errors
/// - **Crypto**: cipher, signature and key wrap errors
/// - **Key access**: no usable KAS target for any split
/// - **State**: writer already finalized, session misuse
/// - **Config**: rejected writer configuration
#[derive(Debug, Error)]
pub enum TdfError {
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Every KAS target was skipped or failed
    #[error("No valid key access objects could be created ({} KAS failures)", failures.len())]
    NoValidKeyAccess { failures: Vec<KasFailure> },

    #[error("Assertion '{id}' is invalid: {reason}")]
    InvalidAssertion { id: String, reason: String },

    #[error("Split plan contains no splits")]
    NoSplits,

    #[error("Writer is not open")]
    NotOpen,

    #[error("Invalid configuration for '{field}': {reason}")]
    Config { field: &'static str, reason: String },

    #[error("A writer session is already active")]
    SessionBusy,

    #[error("No active writer session")]
    NoActiveSession,

    #[error("Writer session lock poisoned")]
    LockPoisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TdfError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        TdfError::Config {
            field,
            reason: reason.into(),
        }
    }

    /// Returns true for programming errors: operations called in the wrong order
    pub fn is_state_error(&self) -> bool {
        match self {
            Self::Archive(e) => e.is_state_error(),
            Self::NotOpen | Self::SessionBusy | Self::NoActiveSession => true,
            _ => false,
        }
    }

    /// Returns true if this is a cryptographic error
    pub fn is_crypto_error(&self) -> bool {
        matches!(self, Self::Crypto(_) | Self::InvalidAssertion { .. })
    }

    /// Returns a suggestion for resolving this error
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Archive(e) => e.suggestion(),
            Self::Policy(e) => e.suggestion(),
            Self::NoValidKeyAccess { .. } => {
                Some("Provide a public key for at least one KAS named by the split plan")
            }
            Self::NoSplits => Some("The split planner must return at least one split"),
            Self::NotOpen => Some("Create a new Encryptor; a finalized writer cannot be reused"),
            Self::SessionBusy => Some("Call finish() or abort() on the active session first"),
            Self::NoActiveSession => Some("Call begin() before writing"),
            _ => None,
        }
    }
}

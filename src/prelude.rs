//! Prelude
//!
//! Commonly used types in one import.
//!
//! # Example
//!
//! ```rust
//! use opentdf_stream::prelude::*;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = PolicyBuilder::new()
//!     .id_auto()
//!     .dissemination(["user@example.com"])
//!     .build()?;
//! let config = WriterConfig::new()
//!     .policy(policy)
//!     .segment_integrity(IntegrityAlgorithm::HS256);
//! assert_eq!(config.get_segment_integrity(), IntegrityAlgorithm::HS256);
//! # Ok(())
//! # }
//! ```

pub use crate::archive::{ArchiveError, ArchiveWriter, TdfArchiveWriter};
pub use crate::assertion::{
    AppliesToState, Assertion, AssertionConfig, AssertionScope, AssertionType, Statement,
};
pub use crate::crypto::{
    CryptoError, CryptoProvider, HostCryptoProvider, KeyAlgorithm, KeyWrapScheme,
    LocalCryptoProvider,
};
pub use crate::encryptor::{Encryptor, FinalizeResult, IntegrityAlgorithm, WriterConfig};
pub use crate::error::TdfError;
pub use crate::manifest::{
    EncryptionInformation, EncryptionMethod, IntegrityInformation, KeyAccess, Payload,
    PolicyBinding, RootSignature, Segment, TdfManifest,
};
pub use crate::policy::{Policy, PolicyBuilder, PolicyError};
pub use crate::session::WriterSession;
pub use crate::split::{KasPublicKey, SplitPlan, SplitPlanner, StaticKasPlanner};
pub use crate::tdf::Tdf;

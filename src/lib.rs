//! Streaming writer for Trusted Data Format (TDF) containers
//!
//! A TDF container is a ZIP archive holding an encrypted `payload` entry
//! and a JSON `manifest`. The payload key is split into shares, each
//! wrapped for one or more Key Access Servers and bound to the container's
//! policy.
//!
//! - [`Encryptor`] streams chunks into a container over any `Write` sink
//! - [`Tdf`] is a convenience builder for in-memory data
//! - [`WriterSession`] serializes access to one shared writer
//! - [`archive`] is the underlying zip/zip64 serializer
//! - [`crypto`] is the pluggable primitive backend

pub mod archive;
pub mod assertion;
pub mod crypto;
mod encryptor;
mod error;
pub mod key_access;
pub mod manifest;
mod policy;
pub mod prelude;
mod session;
pub mod split;
mod tdf;

pub use assertion::{
    AppliesToState, Assertion, AssertionConfig, AssertionScope, AssertionSigningKey,
    AssertionType, Statement,
};
pub use crypto::{CryptoProvider, KeyAlgorithm, KeyWrapScheme, LocalCryptoProvider};
pub use encryptor::{
    Encryptor, FinalizeResult, IntegrityAlgorithm, WriterConfig, DEFAULT_MIME_TYPE,
    DEFAULT_SEGMENT_SIZE,
};
pub use error::TdfError;
pub use key_access::KasFailure;
pub use manifest::TdfManifest;
pub use policy::{Policy, PolicyAttribute, PolicyBody, PolicyBuilder, PolicyError};
pub use session::WriterSession;
pub use split::{KasPublicKey, SplitPlan, SplitPlanner, StaticKasPlanner};
pub use tdf::{Tdf, TdfEncryptBuilder};

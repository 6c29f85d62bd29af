//! High-level TDF API for in-memory data
//!
//! [`Tdf::encrypt`] wraps an [`Encryptor`] for callers that already hold the
//! whole plaintext: the data is cut into segment-sized chunks and streamed
//! through the writer.

use crate::encryptor::{Encryptor, IntegrityAlgorithm, WriterConfig};
use crate::error::TdfError;
use crate::manifest::TdfManifest;
use crate::policy::Policy;
use crate::split::KasPublicKey;
use std::io::Write;
use std::path::Path;

/// High-level TDF operations
///
/// # Examples
///
/// ```no_run
/// use opentdf_stream::{KasPublicKey, KeyAlgorithm, Tdf};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let pem = std::fs::read_to_string("kas_public.pem")?;
///
/// Tdf::encrypt(b"Sensitive data")
///     .kas(KasPublicKey::new("https://kas.example.com", KeyAlgorithm::Rsa2048, pem))
///     .to_file("output.tdf")?;
/// # Ok(())
/// # }
/// ```
pub struct Tdf;

impl Tdf {
    /// Encrypt data to TDF format
    ///
    /// Returns a builder that allows setting KAS targets, policy, and output options.
    pub fn encrypt(data: impl Into<Vec<u8>>) -> TdfEncryptBuilder {
        TdfEncryptBuilder::new(data.into())
    }
}

/// Builder for encrypting data to TDF format
#[derive(Debug)]
pub struct TdfEncryptBuilder {
    data: Vec<u8>,
    config: WriterConfig,
}

impl TdfEncryptBuilder {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            config: WriterConfig::new(),
        }
    }

    /// Add a KAS target for key access
    #[must_use]
    pub fn kas(mut self, key: KasPublicKey) -> Self {
        self.config = self.config.kas(key);
        self
    }

    /// Set the access control policy
    #[must_use]
    pub fn policy(mut self, policy: Policy) -> Self {
        self.config = self.config.policy(policy);
        self
    }

    /// Set the MIME type for the encrypted data
    #[must_use]
    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.config = self.config.mime_type(mime_type);
        self
    }

    /// Set the segment size for encryption (default: 2MB)
    #[must_use]
    pub fn segment_size(mut self, size: u64) -> Self {
        self.config = self.config.segment_size(size);
        self
    }

    #[must_use]
    pub fn segment_integrity(mut self, algorithm: IntegrityAlgorithm) -> Self {
        self.config = self.config.segment_integrity(algorithm);
        self
    }

    /// Replace the whole writer configuration
    #[must_use]
    pub fn config(mut self, config: WriterConfig) -> Self {
        self.config = config;
        self
    }

    /// Build and return the encrypted TDF as bytes along with its manifest
    pub fn to_bytes(self) -> Result<(Vec<u8>, TdfManifest), TdfError> {
        self.write_to(Vec::new())
    }

    /// Build and write the encrypted TDF to a file
    pub fn to_file(self, path: impl AsRef<Path>) -> Result<TdfManifest, TdfError> {
        let file = std::fs::File::create(path.as_ref())?;
        let (writer, manifest) = self.write_to(std::io::BufWriter::new(file))?;
        writer
            .into_inner()
            .map_err(|e| TdfError::Io(e.into_error()))?
            .sync_all()?;
        Ok(manifest)
    }

    /// Stream the encrypted TDF into any writer
    pub fn write_to<W: Write>(self, sink: W) -> Result<(W, TdfManifest), TdfError> {
        let chunk_size = usize::try_from(self.config.get_segment_size())
            .map_err(|_| TdfError::config("segment_size", "does not fit in memory"))?;
        let mut encryptor = Encryptor::open(self.config, sink)?;
        if chunk_size > 0 {
            for chunk in self.data.chunks(chunk_size) {
                encryptor.append_chunk(chunk)?;
            }
        }
        let result = encryptor.finalize()?;
        Ok((result.sink, result.manifest))
    }
}

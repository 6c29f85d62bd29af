//! Streaming TDF encryption
//!
//! [`Encryptor`] turns a sequence of plaintext chunks into a TDF container
//! written to any [`std::io::Write`] sink. Each chunk is encrypted and
//! streamed into the `payload` entry as soon as it arrives, so the total
//! payload size never needs to be known up front.
//!
//! # Example
//!
//! ```no_run
//! use opentdf_stream::{Encryptor, KasPublicKey, KeyAlgorithm, WriterConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pem = std::fs::read_to_string("kas_public.pem")?;
//! let config = WriterConfig::new()
//!     .kas(KasPublicKey::new("https://kas.example.com", KeyAlgorithm::Rsa2048, pem));
//!
//! let file = std::fs::File::create("output.tdf")?;
//! let mut encryptor = Encryptor::open(config, file)?;
//! encryptor.append_chunk(b"first chunk")?;
//! encryptor.append_chunk(b"second chunk")?;
//! let result = encryptor.finalize()?;
//! println!("wrote {} bytes", result.bytes_written);
//! # Ok(())
//! # }
//! ```

use crate::archive::{ArchiveWriter, TdfArchiveWriter, PAYLOAD_ENTRY_NAME};
use crate::assertion::{sign_assertions, AssertionConfig};
use crate::crypto::{
    AeadCipher, CryptoError, CryptoProvider, LocalCryptoProvider, PayloadKey, GCM_NONCE_SIZE,
    GCM_TAG_SIZE,
};
use crate::error::TdfError;
use crate::key_access::build_key_access_objects;
use crate::manifest::{
    EncryptionInformation, EncryptionMethod, IntegrityInformation, KeyAccess, Payload,
    RootSignature, Segment, TdfManifest, TDF_SPEC_VERSION,
};
use crate::policy::{Policy, PolicyBuilder};
use crate::split::{generate_splits, KasPublicKey, Split, SplitPlanner, StaticKasPlanner};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Default plaintext segment size: 2 MiB
pub const DEFAULT_SEGMENT_SIZE: u64 = 2 * 1024 * 1024;

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const PAYLOAD_ALGORITHM: &str = "AES-256-GCM";
const SPLIT_KEY_TYPE: &str = "split";
const PAYLOAD_REFERENCE_TYPE: &str = "reference";
const PAYLOAD_PROTOCOL: &str = "zip";

/// Nonce and tag added to every encrypted segment
const SEGMENT_OVERHEAD: u64 = (GCM_NONCE_SIZE + GCM_TAG_SIZE) as u64;

/// Signature algorithm for segments and the root signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrityAlgorithm {
    /// HMAC-SHA256 keyed with the payload key
    #[default]
    HS256,
    /// The trailing GCM authentication tag of the signed data
    GMAC,
}

impl IntegrityAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrityAlgorithm::HS256 => "HS256",
            IntegrityAlgorithm::GMAC => "GMAC",
        }
    }

    /// Raw signature of `data`
    pub fn sign(
        &self,
        provider: &dyn CryptoProvider,
        data: &[u8],
        key: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        match self {
            IntegrityAlgorithm::HS256 => provider.hmac_sha256(key, data),
            IntegrityAlgorithm::GMAC => {
                if data.len() < GCM_TAG_SIZE {
                    return Err(CryptoError::SignatureTooShort {
                        got: data.len(),
                        needed: GCM_TAG_SIZE,
                    });
                }
                Ok(data[data.len() - GCM_TAG_SIZE..].to_vec())
            }
        }
    }
}

impl FromStr for IntegrityAlgorithm {
    type Err = TdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HS256" => Ok(IntegrityAlgorithm::HS256),
            "GMAC" => Ok(IntegrityAlgorithm::GMAC),
            _ => Err(TdfError::config(
                "integrity_algorithm",
                format!("unknown algorithm '{}'", s),
            )),
        }
    }
}

impl fmt::Display for IntegrityAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for an [`Encryptor`]
///
/// Setters consume and return the config. Validation happens in
/// [`Encryptor::open`].
#[derive(Clone)]
pub struct WriterConfig {
    kas_keys: Vec<KasPublicKey>,
    planner: Option<Arc<dyn SplitPlanner>>,
    provider: Arc<dyn CryptoProvider>,
    policy: Option<Policy>,
    segment_integrity: IntegrityAlgorithm,
    root_integrity: IntegrityAlgorithm,
    assertions: Vec<AssertionConfig>,
    system_metadata_assertion: bool,
    mime_type: String,
    segment_size: u64,
    metadata: Option<String>,
    exclude_version: bool,
    modified: Option<chrono::NaiveDateTime>,
}

impl WriterConfig {
    pub fn new() -> Self {
        WriterConfig {
            kas_keys: Vec::new(),
            planner: None,
            provider: Arc::new(LocalCryptoProvider::new()),
            policy: None,
            segment_integrity: IntegrityAlgorithm::GMAC,
            root_integrity: IntegrityAlgorithm::HS256,
            assertions: Vec::new(),
            system_metadata_assertion: false,
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            segment_size: DEFAULT_SEGMENT_SIZE,
            metadata: None,
            exclude_version: false,
            modified: None,
        }
    }

    /// Add a KAS target; all targets share one split
    #[must_use]
    pub fn kas(mut self, key: KasPublicKey) -> Self {
        self.kas_keys.push(key);
        self
    }

    /// Resolve splits through a planner instead of the explicit KAS list
    #[must_use]
    pub fn split_planner(mut self, planner: Arc<dyn SplitPlanner>) -> Self {
        self.planner = Some(planner);
        self
    }

    #[must_use]
    pub fn crypto_provider(mut self, provider: Arc<dyn CryptoProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Container policy; a policy with a fresh UUID is used when unset
    #[must_use]
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    #[must_use]
    pub fn segment_integrity(mut self, algorithm: IntegrityAlgorithm) -> Self {
        self.segment_integrity = algorithm;
        self
    }

    #[must_use]
    pub fn root_integrity(mut self, algorithm: IntegrityAlgorithm) -> Self {
        self.root_integrity = algorithm;
        self
    }

    #[must_use]
    pub fn assertion(mut self, assertion: AssertionConfig) -> Self {
        self.assertions.push(assertion);
        self
    }

    /// Append the system metadata assertion at finalize
    #[must_use]
    pub fn with_system_metadata_assertion(mut self) -> Self {
        self.system_metadata_assertion = true;
        self
    }

    #[must_use]
    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Default plaintext segment size recorded in the manifest
    #[must_use]
    pub fn segment_size(mut self, size: u64) -> Self {
        self.segment_size = size;
        self
    }

    /// Metadata encrypted under each split into its key access objects
    #[must_use]
    pub fn metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// Omit `schemaVersion` and hex-encode signatures for legacy readers
    #[must_use]
    pub fn exclude_version_from_manifest(mut self) -> Self {
        self.exclude_version = true;
        self
    }

    /// Fixed archive timestamp for reproducible output
    #[must_use]
    pub fn modified_time(mut self, modified: chrono::NaiveDateTime) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn get_segment_size(&self) -> u64 {
        self.segment_size
    }

    pub fn get_segment_integrity(&self) -> IntegrityAlgorithm {
        self.segment_integrity
    }

    pub fn get_root_integrity(&self) -> IntegrityAlgorithm {
        self.root_integrity
    }

    pub fn uses_hex_signatures(&self) -> bool {
        self.exclude_version
    }

    fn encrypted_segment_size(&self) -> Option<u64> {
        self.segment_size.checked_add(SEGMENT_OVERHEAD)
    }

    fn validate(&self) -> Result<(), TdfError> {
        if self.segment_size == 0 {
            return Err(TdfError::config("segment_size", "must be greater than zero"));
        }
        if self.encrypted_segment_size().is_none() {
            return Err(TdfError::config(
                "segment_size",
                format!("must leave room for {} bytes of nonce and tag", SEGMENT_OVERHEAD),
            ));
        }
        if self.mime_type.is_empty() {
            return Err(TdfError::config("mime_type", "must not be empty"));
        }
        if self.planner.is_none() && self.kas_keys.is_empty() {
            return Err(TdfError::config(
                "kas",
                "configure at least one KAS public key or a split planner",
            ));
        }
        Ok(())
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WriterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterConfig")
            .field("kas_keys", &self.kas_keys)
            .field("has_planner", &self.planner.is_some())
            .field("segment_integrity", &self.segment_integrity)
            .field("root_integrity", &self.root_integrity)
            .field("assertions", &self.assertions.len())
            .field("mime_type", &self.mime_type)
            .field("segment_size", &self.segment_size)
            .finish_non_exhaustive()
    }
}

/// Output of [`Encryptor::finalize`]
#[derive(Debug)]
pub struct FinalizeResult<W> {
    pub manifest: TdfManifest,
    pub bytes_written: u64,
    pub sink: W,
}

struct OpenWriter<W: Write> {
    archive: TdfArchiveWriter<W>,
    cipher: Box<dyn AeadCipher>,
    payload_key: PayloadKey,
    splits: Vec<Split>,
    public_keys: HashMap<String, KasPublicKey>,
    policy_json: String,
    segments: Vec<Segment>,
    aggregate: Vec<u8>,
}

enum EncryptorState<W: Write> {
    Open(Box<OpenWriter<W>>),
    Spent,
}

/// Chunked TDF writer over a sink
pub struct Encryptor<W: Write> {
    config: WriterConfig,
    state: EncryptorState<W>,
}

impl<W: Write> Encryptor<W> {
    /// Resolve the split plan, generate the payload key and start the payload stream
    pub fn open(config: WriterConfig, sink: W) -> Result<Self, TdfError> {
        config.validate()?;

        let policy = match &config.policy {
            Some(policy) => policy.clone(),
            None => PolicyBuilder::new().id_auto().build()?,
        };
        let plan = match &config.planner {
            Some(planner) => planner.plan(&policy)?,
            None => StaticKasPlanner::new(config.kas_keys.clone()).plan(&policy)?,
        };

        let provider = config.provider.as_ref();
        let (splits, payload_key) = generate_splits(&plan, provider)?;
        let cipher = provider.new_aes_gcm(payload_key.as_slice())?;

        let archive = match config.modified {
            Some(modified) => ArchiveWriter::with_modified(sink, modified),
            None => ArchiveWriter::new(sink),
        };
        let mut archive = TdfArchiveWriter::from_archive(archive);
        archive.begin_payload_stream()?;

        debug!(
            policy_uuid = %policy.uuid,
            splits = splits.len(),
            segment_integrity = %config.segment_integrity,
            root_integrity = %config.root_integrity,
            "opened TDF writer"
        );

        Ok(Encryptor {
            state: EncryptorState::Open(Box::new(OpenWriter {
                archive,
                cipher,
                payload_key,
                splits,
                public_keys: plan.public_keys,
                policy_json: policy.to_json()?,
                segments: Vec::new(),
                aggregate: Vec::new(),
            })),
            config,
        })
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, EncryptorState::Open(_))
    }

    /// Segments recorded so far; empty once spent
    pub fn segments(&self) -> &[Segment] {
        match &self.state {
            EncryptorState::Open(open) => &open.segments,
            EncryptorState::Spent => &[],
        }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Encrypt one chunk and stream it into the payload entry
    ///
    /// Any error leaves the writer spent.
    pub fn append_chunk(&mut self, plaintext: &[u8]) -> Result<&Segment, TdfError> {
        let result = match &mut self.state {
            EncryptorState::Open(open) => open.append_chunk(&self.config, plaintext),
            EncryptorState::Spent => return Err(TdfError::NotOpen),
        };
        if let Err(e) = result {
            self.state = EncryptorState::Spent;
            return Err(e);
        }
        match &self.state {
            EncryptorState::Open(open) => open.segments.last().ok_or(TdfError::NotOpen),
            EncryptorState::Spent => Err(TdfError::NotOpen),
        }
    }

    /// Seal the container: manifest, key access objects, central directory
    ///
    /// The writer is spent afterwards whether or not this succeeds.
    pub fn finalize(&mut self) -> Result<FinalizeResult<W>, TdfError> {
        match std::mem::replace(&mut self.state, EncryptorState::Spent) {
            EncryptorState::Open(open) => open.finalize(&self.config),
            EncryptorState::Spent => Err(TdfError::NotOpen),
        }
    }
}

impl<W: Write> fmt::Debug for Encryptor<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encryptor")
            .field("open", &self.is_open())
            .field("segments", &self.segments().len())
            .finish_non_exhaustive()
    }
}

impl<W: Write> OpenWriter<W> {
    fn sign(
        &self,
        config: &WriterConfig,
        algorithm: IntegrityAlgorithm,
        data: &[u8],
    ) -> Result<Vec<u8>, TdfError> {
        let signature =
            algorithm.sign(config.provider.as_ref(), data, self.payload_key.as_slice())?;
        if config.exclude_version {
            Ok(hex::encode(signature).into_bytes())
        } else {
            Ok(signature)
        }
    }

    fn append_chunk(&mut self, config: &WriterConfig, plaintext: &[u8]) -> Result<(), TdfError> {
        let encrypted = self.cipher.encrypt(plaintext)?;
        self.archive.append_payload(&encrypted)?;

        let signature = self.sign(config, config.segment_integrity, &encrypted)?;
        self.aggregate.extend_from_slice(&signature);
        self.segments.push(Segment {
            hash: config.provider.base64_encode(&signature),
            segment_size: plaintext.len() as u64,
            encrypted_segment_size: encrypted.len() as u64,
        });
        Ok(())
    }

    fn finalize(mut self: Box<Self>, config: &WriterConfig) -> Result<FinalizeResult<W>, TdfError> {
        let provider = config.provider.as_ref();
        self.archive.close_payload_stream()?;

        let encrypted_segment_size_default = config
            .encrypted_segment_size()
            .ok_or_else(|| TdfError::config("segment_size", "too large"))?;
        let root_signature = self.sign(config, config.root_integrity, &self.aggregate)?;
        let integrity_information = IntegrityInformation {
            root_signature: RootSignature {
                alg: config.root_integrity.as_str().to_string(),
                sig: provider.base64_encode(&root_signature),
            },
            segment_hash_alg: config.segment_integrity.as_str().to_string(),
            segments: std::mem::take(&mut self.segments),
            segment_size_default: config.segment_size,
            encrypted_segment_size_default,
        };

        let payload = Payload {
            payload_type: PAYLOAD_REFERENCE_TYPE.to_string(),
            url: PAYLOAD_ENTRY_NAME.to_string(),
            protocol: PAYLOAD_PROTOCOL.to_string(),
            mime_type: Some(config.mime_type.clone()),
            is_encrypted: true,
        };

        let mut assertion_configs = config.assertions.clone();
        if config.system_metadata_assertion {
            assertion_configs.push(AssertionConfig::system_metadata()?);
        }
        let assertions = sign_assertions(
            provider,
            &assertion_configs,
            &self.aggregate,
            self.payload_key.as_slice(),
            config.exclude_version,
        )?;

        let key_access: Vec<KeyAccess> = build_key_access_objects(
            provider,
            &self.splits,
            &self.public_keys,
            self.policy_json.as_bytes(),
            config.metadata.as_deref(),
        )?;

        let manifest = TdfManifest {
            payload,
            encryption_information: EncryptionInformation {
                encryption_type: SPLIT_KEY_TYPE.to_string(),
                key_access,
                method: EncryptionMethod {
                    algorithm: PAYLOAD_ALGORITHM.to_string(),
                    iv: String::new(),
                    is_streamable: true,
                },
                integrity_information,
                policy: provider.base64_encode(self.policy_json.as_bytes()),
            },
            assertions,
            schema_version: (!config.exclude_version).then(|| TDF_SPEC_VERSION.to_string()),
        };

        self.archive.append_manifest(&manifest.to_json()?)?;
        let bytes_written = self.archive.finish()?;

        debug!(
            segments = manifest.segments().len(),
            key_access = manifest.key_access().len(),
            assertions = manifest.assertions.len(),
            bytes_written,
            "finalized TDF"
        );

        Ok(FinalizeResult {
            manifest,
            bytes_written,
            sink: self.archive.into_inner(),
        })
    }
}

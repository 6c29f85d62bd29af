//! Cryptographic capability interface
//!
//! Everything the writer pipeline needs from cryptography goes through
//! [`CryptoProvider`]. Two backends are provided:
//!
//! - [`LocalCryptoProvider`]: RustCrypto primitives running in-process
//! - [`HostCryptoProvider`]: delegates each primitive across a sandbox
//!   boundary to a [`HostCrypto`] function table
//!
//! The backend is chosen when the writer is configured and never inspected
//! afterwards.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

mod aead;
pub mod hmac;
mod host;
pub mod kem;
mod local;
mod types;

pub use aead::AesGcmCipher;
pub use host::{HostCrypto, HostCryptoProvider, LocalHost, HOST_FAILURE, HOST_FAILURE_64, HOST_STATUS_OK};
pub use kem::{tdf_salt, EcdhKem, KeyEncapsulation, RsaOaepKem};
pub use local::LocalCryptoProvider;
pub use types::{KeyError, KeyShare, PayloadKey, KEY_SIZE};

/// AES-GCM nonce length used throughout TDF
pub const GCM_NONCE_SIZE: usize = 12;

/// Full AES-GCM authentication tag length
pub const GCM_TAG_SIZE: usize = 16;

/// Smallest tag length accepted for caller-chosen tag sizes
pub const GCM_MIN_TAG_SIZE: usize = 12;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Invalid nonce length: expected {expected}, got {got}")]
    InvalidNonceLength { expected: usize, got: usize },

    #[error("Unsupported AES-GCM tag size: {0}")]
    UnsupportedTagSize(usize),

    #[error("Unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Derived key too short: got {got} bytes, need {needed}")]
    DerivedKeyTooShort { got: usize, needed: usize },

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Key wrap failed: {0}")]
    Wrap(String),

    #[error("Key unwrap failed: {0}")]
    Unwrap(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("GMAC signature requires at least {needed} bytes, got {got}")]
    SignatureTooShort { got: usize, needed: usize },

    #[error("Entropy source failed: {0}")]
    Entropy(String),

    #[error("Host crypto call '{operation}' failed")]
    Host { operation: &'static str },

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}

/// Source of random bytes
///
/// Injecting a deterministic source makes key and nonce generation
/// reproducible in tests.
pub trait EntropySource: Send + Sync {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<(), CryptoError>;
}

/// Operating system entropy
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<(), CryptoError> {
        use rand::RngCore;
        rand::rngs::OsRng
            .try_fill_bytes(dest)
            .map_err(|e| CryptoError::Entropy(e.to_string()))
    }
}

/// Authenticated symmetric cipher bound to one key
pub trait AeadCipher: Send {
    /// Encrypt with a fresh random nonce; returns `nonce || ciphertext || tag`
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Encrypt with a caller-supplied 12-byte nonce; returns `ciphertext || tag`
    fn encrypt_with_iv(&self, iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Like `encrypt_with_iv` with a truncated tag of `tag_size` bytes (12..=16)
    fn encrypt_with_iv_and_tag_size(
        &self,
        iv: &[u8],
        plaintext: &[u8],
        tag_size: usize,
    ) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt `nonce || ciphertext || tag`
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt `ciphertext || tag` under a caller-supplied nonce
    fn decrypt_with_iv_and_tag_size(
        &self,
        iv: &[u8],
        data: &[u8],
        tag_size: usize,
    ) -> Result<Vec<u8>, CryptoError>;
}

/// Primitive operations consumed by the writer pipeline
pub trait CryptoProvider: Send + Sync {
    fn random_bytes(&self, len: usize) -> Result<Vec<u8>, CryptoError>;

    fn new_aes_gcm(&self, key: &[u8]) -> Result<Box<dyn AeadCipher>, CryptoError>;

    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn base64_encode(&self, data: &[u8]) -> String;

    fn base64_decode(&self, data: &str) -> Result<Vec<u8>, CryptoError>;

    /// Wrap a symmetric key for a KAS public key
    fn wrap_key(&self, request: &KeyWrapRequest) -> Result<KeyWrapResult, CryptoError>;
}

/// KAS public key algorithms supported for wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    Rsa2048,
    Rsa4096,
    EcP256,
    EcP384,
}

impl KeyAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa2048 => "rsa:2048",
            KeyAlgorithm::Rsa4096 => "rsa:4096",
            KeyAlgorithm::EcP256 => "ec:secp256r1",
            KeyAlgorithm::EcP384 => "ec:secp384r1",
        }
    }

    pub fn scheme(&self) -> KeyWrapScheme {
        match self {
            KeyAlgorithm::Rsa2048 | KeyAlgorithm::Rsa4096 => KeyWrapScheme::Rsa,
            KeyAlgorithm::EcP256 | KeyAlgorithm::EcP384 => KeyWrapScheme::Ec,
        }
    }
}

impl FromStr for KeyAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rsa:2048" => Ok(KeyAlgorithm::Rsa2048),
            "rsa:4096" => Ok(KeyAlgorithm::Rsa4096),
            "ec:secp256r1" => Ok(KeyAlgorithm::EcP256),
            "ec:secp384r1" => Ok(KeyAlgorithm::EcP384),
            _ => Err(CryptoError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a key share was wrapped for its KAS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyWrapScheme {
    /// RSA-OAEP encryption of the raw share
    Rsa,
    /// ECDH + HKDF derived key XORed with the share
    Ec,
}

impl KeyWrapScheme {
    /// Short scheme name
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyWrapScheme::Rsa => "rsa",
            KeyWrapScheme::Ec => "ec",
        }
    }

    /// Value of the manifest's key access `type` field
    pub fn manifest_type(&self) -> &'static str {
        match self {
            KeyWrapScheme::Rsa => "wrapped",
            KeyWrapScheme::Ec => "ec-wrapped",
        }
    }

    pub fn from_manifest_type(value: &str) -> Option<Self> {
        match value {
            "wrapped" => Some(KeyWrapScheme::Rsa),
            "ec-wrapped" => Some(KeyWrapScheme::Ec),
            _ => None,
        }
    }
}

impl fmt::Display for KeyWrapScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to wrap a key share for one KAS
#[derive(Debug, Clone)]
pub struct KeyWrapRequest {
    pub algorithm: KeyAlgorithm,
    pub public_key_pem: String,
    pub plaintext_key: Vec<u8>,
    /// HKDF salt for EC wrapping; empty means the standard TDF salt
    pub salt: Vec<u8>,
}

/// Output of a key wrap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyWrapResult {
    pub scheme: KeyWrapScheme,
    pub wrapped_key: Vec<u8>,
    /// PEM-encoded ephemeral public key, present for EC wrapping
    pub ephemeral_public_key: Option<String>,
}

use super::{
    aead::AesGcmCipher, hmac::calculate_hmac, kem::wrap_for_algorithm, AeadCipher,
    CryptoError, CryptoProvider, EntropySource, KeyWrapRequest, KeyWrapResult, OsEntropy,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::sync::Arc;

/// In-process crypto backend built on RustCrypto
///
/// # Example
///
/// ```
/// use opentdf_stream::crypto::{CryptoProvider, LocalCryptoProvider};
///
/// let provider = LocalCryptoProvider::new();
/// let key = provider.random_bytes(32).unwrap();
/// let mac = provider.hmac_sha256(&key, b"data").unwrap();
/// assert_eq!(mac.len(), 32);
/// ```
#[derive(Clone)]
pub struct LocalCryptoProvider {
    entropy: Arc<dyn EntropySource>,
}

impl LocalCryptoProvider {
    /// Provider drawing randomness from the operating system
    pub fn new() -> Self {
        LocalCryptoProvider {
            entropy: Arc::new(OsEntropy),
        }
    }

    /// Provider drawing keys and nonces from a custom entropy source
    pub fn with_entropy(entropy: Arc<dyn EntropySource>) -> Self {
        LocalCryptoProvider { entropy }
    }
}

impl Default for LocalCryptoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LocalCryptoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCryptoProvider").finish_non_exhaustive()
    }
}

impl CryptoProvider for LocalCryptoProvider {
    fn random_bytes(&self, len: usize) -> Result<Vec<u8>, CryptoError> {
        let mut buf = vec![0u8; len];
        if len > 0 {
            self.entropy.fill_bytes(&mut buf)?;
        }
        Ok(buf)
    }

    fn new_aes_gcm(&self, key: &[u8]) -> Result<Box<dyn AeadCipher>, CryptoError> {
        Ok(Box::new(AesGcmCipher::new(key, Arc::clone(&self.entropy))?))
    }

    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        calculate_hmac(key, data)
    }

    fn base64_encode(&self, data: &[u8]) -> String {
        BASE64.encode(data)
    }

    fn base64_decode(&self, data: &str) -> Result<Vec<u8>, CryptoError> {
        Ok(BASE64.decode(data)?)
    }

    fn wrap_key(&self, request: &KeyWrapRequest) -> Result<KeyWrapResult, CryptoError> {
        wrap_for_algorithm(
            request.algorithm,
            &request.plaintext_key,
            &request.public_key_pem,
            &request.salt,
        )
    }
}

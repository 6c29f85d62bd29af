//! Host-delegated crypto backend
//!
//! Sandboxed runtimes (for example a WebAssembly guest) often lack direct
//! access to OS entropy and native crypto. [`HostCryptoProvider`] forwards
//! every primitive to a [`HostCrypto`] function table using a narrow ABI:
//! callers allocate output buffers, the host returns a status code or a
//! byte length, and [`HOST_FAILURE`] signals an error.
//!
//! [`LocalHost`] is an in-process host implementation, used by native
//! embedders and to check that both backends produce identical output.

use super::{
    aead::{decrypt_with_tag_size, encrypt_with_tag_size},
    hmac::calculate_hmac,
    kem::{tdf_salt, wrap_for_algorithm},
    AeadCipher, CryptoError, CryptoProvider, EntropySource, KeyAlgorithm, KeyWrapRequest,
    KeyWrapResult, OsEntropy, GCM_NONCE_SIZE, GCM_TAG_SIZE,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::sync::Arc;
use zeroize::Zeroizing;

pub const HOST_STATUS_OK: u32 = 0;
pub const HOST_FAILURE: u32 = u32::MAX;
pub const HOST_FAILURE_64: u64 = u64::MAX;

const HMAC_SHA256_SIZE: usize = 32;
const MAX_WRAPPED_KEY_SIZE: usize = 4096;
const MAX_EPHEMERAL_KEY_SIZE: usize = 4096;

/// Primitive functions exported by the host
///
/// Length-returning functions return the number of bytes written to `out`,
/// or [`HOST_FAILURE`]. `wrap_key` packs the wrapped key length in the low
/// 32 bits and the ephemeral key length in the high 32 bits, or returns
/// [`HOST_FAILURE_64`].
pub trait HostCrypto: Send + Sync {
    fn random_bytes(&self, out: &mut [u8]) -> u32;

    fn hmac_sha256(&self, key: &[u8], data: &[u8], out: &mut [u8]) -> u32;

    fn aes_gcm_encrypt(&self, key: &[u8], plaintext: &[u8], out: &mut [u8]) -> u32;

    fn aes_gcm_encrypt_with_iv(
        &self,
        key: &[u8],
        iv: &[u8],
        plaintext: &[u8],
        out: &mut [u8],
    ) -> u32;

    fn aes_gcm_encrypt_with_iv_tag(
        &self,
        key: &[u8],
        iv: &[u8],
        plaintext: &[u8],
        out: &mut [u8],
        tag_size: u32,
    ) -> u32;

    fn aes_gcm_decrypt(&self, key: &[u8], ciphertext: &[u8], out: &mut [u8]) -> u32;

    fn aes_gcm_decrypt_with_iv_tag(
        &self,
        key: &[u8],
        iv: &[u8],
        ciphertext: &[u8],
        out: &mut [u8],
        tag_size: u32,
    ) -> u32;

    fn wrap_key(
        &self,
        algorithm: &str,
        public_key_pem: &str,
        key: &[u8],
        salt: &[u8],
        wrapped_out: &mut [u8],
        ephemeral_out: &mut [u8],
    ) -> u64;
}

/// Crypto provider that calls into a host function table
pub struct HostCryptoProvider<H: HostCrypto> {
    host: Arc<H>,
    entropy_override: Option<Arc<dyn EntropySource>>,
}

impl<H: HostCrypto> HostCryptoProvider<H> {
    pub fn new(host: H) -> Self {
        HostCryptoProvider {
            host: Arc::new(host),
            entropy_override: None,
        }
    }

    /// Draw random bytes and GCM nonces from `entropy` instead of the host
    ///
    /// Random-nonce encryption then goes through the host's caller-supplied
    /// IV entry point, so a seeded source makes payloads reproducible.
    pub fn with_entropy(host: H, entropy: Arc<dyn EntropySource>) -> Self {
        HostCryptoProvider {
            host: Arc::new(host),
            entropy_override: Some(entropy),
        }
    }
}

fn take_len(len: u32, capacity: usize, operation: &'static str) -> Result<usize, CryptoError> {
    if len == HOST_FAILURE {
        return Err(CryptoError::Host { operation });
    }
    let len = len as usize;
    if len > capacity {
        return Err(CryptoError::Encoding(format!(
            "host returned invalid length {} for {}",
            len, operation
        )));
    }
    Ok(len)
}

impl<H: HostCrypto + 'static> CryptoProvider for HostCryptoProvider<H> {
    fn random_bytes(&self, len: usize) -> Result<Vec<u8>, CryptoError> {
        let mut buf = vec![0u8; len];
        if len == 0 {
            return Ok(buf);
        }
        if let Some(entropy) = &self.entropy_override {
            entropy.fill_bytes(&mut buf)?;
            return Ok(buf);
        }
        if self.host.random_bytes(&mut buf) != HOST_STATUS_OK {
            return Err(CryptoError::Host {
                operation: "random_bytes",
            });
        }
        Ok(buf)
    }

    fn new_aes_gcm(&self, key: &[u8]) -> Result<Box<dyn AeadCipher>, CryptoError> {
        if key.is_empty() {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                got: 0,
            });
        }
        Ok(Box::new(HostAesGcm {
            host: Arc::clone(&self.host),
            key: Zeroizing::new(key.to_vec()),
            nonces: self.entropy_override.clone(),
        }))
    }

    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if key.is_empty() {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                got: 0,
            });
        }
        let mut out = vec![0u8; HMAC_SHA256_SIZE];
        if self.host.hmac_sha256(key, data, &mut out) != HOST_STATUS_OK {
            return Err(CryptoError::Host {
                operation: "hmac_sha256",
            });
        }
        Ok(out)
    }

    fn base64_encode(&self, data: &[u8]) -> String {
        BASE64.encode(data)
    }

    fn base64_decode(&self, data: &str) -> Result<Vec<u8>, CryptoError> {
        Ok(BASE64.decode(data)?)
    }

    fn wrap_key(&self, request: &KeyWrapRequest) -> Result<KeyWrapResult, CryptoError> {
        if request.public_key_pem.is_empty() {
            return Err(CryptoError::InvalidPublicKey(
                "public key PEM must not be empty".to_string(),
            ));
        }
        if request.plaintext_key.is_empty() {
            return Err(CryptoError::Wrap(
                "plaintext key must not be empty".to_string(),
            ));
        }
        let salt = if request.salt.is_empty() {
            tdf_salt()
        } else {
            request.salt.as_slice()
        };

        let mut wrapped = vec![0u8; MAX_WRAPPED_KEY_SIZE];
        let mut ephemeral = vec![0u8; MAX_EPHEMERAL_KEY_SIZE];
        let result = self.host.wrap_key(
            request.algorithm.as_str(),
            &request.public_key_pem,
            &request.plaintext_key,
            salt,
            &mut wrapped,
            &mut ephemeral,
        );
        if result == HOST_FAILURE_64 {
            return Err(CryptoError::Host {
                operation: "wrap_key",
            });
        }

        let wrapped_len = take_len((result & 0xFFFF_FFFF) as u32, wrapped.len(), "wrap_key")?;
        let ephemeral_len = take_len((result >> 32) as u32, ephemeral.len(), "wrap_key")?;
        wrapped.truncate(wrapped_len);

        let ephemeral_public_key = if ephemeral_len > 0 {
            ephemeral.truncate(ephemeral_len);
            Some(String::from_utf8(ephemeral).map_err(|e| {
                CryptoError::Encoding(format!("ephemeral key is not UTF-8: {}", e))
            })?)
        } else {
            None
        };

        Ok(KeyWrapResult {
            scheme: request.algorithm.scheme(),
            wrapped_key: wrapped,
            ephemeral_public_key,
        })
    }
}

struct HostAesGcm<H: HostCrypto> {
    host: Arc<H>,
    key: Zeroizing<Vec<u8>>,
    nonces: Option<Arc<dyn EntropySource>>,
}

fn check_iv(iv: &[u8]) -> Result<(), CryptoError> {
    if iv.len() != GCM_NONCE_SIZE {
        return Err(CryptoError::InvalidNonceLength {
            expected: GCM_NONCE_SIZE,
            got: iv.len(),
        });
    }
    Ok(())
}

fn check_tag(tag_size: usize) -> Result<(), CryptoError> {
    if tag_size == 0 || tag_size > GCM_TAG_SIZE {
        return Err(CryptoError::UnsupportedTagSize(tag_size));
    }
    Ok(())
}

impl<H: HostCrypto> AeadCipher for HostAesGcm<H> {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if let Some(entropy) = &self.nonces {
            let mut nonce = [0u8; GCM_NONCE_SIZE];
            entropy.fill_bytes(&mut nonce)?;
            let sealed = self.encrypt_with_iv(&nonce, plaintext)?;
            let mut out = Vec::with_capacity(GCM_NONCE_SIZE + sealed.len());
            out.extend_from_slice(&nonce);
            out.extend_from_slice(&sealed);
            return Ok(out);
        }
        let mut out = vec![0u8; plaintext.len() + GCM_NONCE_SIZE + GCM_TAG_SIZE];
        let len = self.host.aes_gcm_encrypt(&self.key, plaintext, &mut out);
        let len = take_len(len, out.len(), "aes_gcm_encrypt")?;
        out.truncate(len);
        Ok(out)
    }

    fn encrypt_with_iv(&self, iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        check_iv(iv)?;
        let mut out = vec![0u8; plaintext.len() + GCM_TAG_SIZE];
        let len = self
            .host
            .aes_gcm_encrypt_with_iv(&self.key, iv, plaintext, &mut out);
        let len = take_len(len, out.len(), "aes_gcm_encrypt_with_iv")?;
        out.truncate(len);
        Ok(out)
    }

    fn encrypt_with_iv_and_tag_size(
        &self,
        iv: &[u8],
        plaintext: &[u8],
        tag_size: usize,
    ) -> Result<Vec<u8>, CryptoError> {
        check_iv(iv)?;
        check_tag(tag_size)?;
        let mut out = vec![0u8; plaintext.len() + tag_size];
        let len = self.host.aes_gcm_encrypt_with_iv_tag(
            &self.key,
            iv,
            plaintext,
            &mut out,
            tag_size as u32,
        );
        let len = take_len(len, out.len(), "aes_gcm_encrypt_with_iv_tag")?;
        out.truncate(len);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.len() < GCM_NONCE_SIZE + GCM_TAG_SIZE {
            return Err(CryptoError::Decryption(
                "ciphertext shorter than nonce and tag".to_string(),
            ));
        }
        let mut out = vec![0u8; data.len() - GCM_NONCE_SIZE - GCM_TAG_SIZE];
        let len = self.host.aes_gcm_decrypt(&self.key, data, &mut out);
        let len = take_len(len, out.len(), "aes_gcm_decrypt")?;
        out.truncate(len);
        Ok(out)
    }

    fn decrypt_with_iv_and_tag_size(
        &self,
        iv: &[u8],
        data: &[u8],
        tag_size: usize,
    ) -> Result<Vec<u8>, CryptoError> {
        check_iv(iv)?;
        check_tag(tag_size)?;
        if data.len() < tag_size {
            return Err(CryptoError::Decryption(
                "ciphertext shorter than authentication tag".to_string(),
            ));
        }
        let mut out = vec![0u8; data.len() - tag_size];
        let len = self.host.aes_gcm_decrypt_with_iv_tag(
            &self.key,
            iv,
            data,
            &mut out,
            tag_size as u32,
        );
        let len = take_len(len, out.len(), "aes_gcm_decrypt_with_iv_tag")?;
        out.truncate(len);
        Ok(out)
    }
}

/// Host function table backed by the local RustCrypto primitives
pub struct LocalHost {
    entropy: Arc<dyn EntropySource>,
}

impl LocalHost {
    pub fn new() -> Self {
        LocalHost {
            entropy: Arc::new(OsEntropy),
        }
    }

    pub fn with_entropy(entropy: Arc<dyn EntropySource>) -> Self {
        LocalHost { entropy }
    }
}

impl Default for LocalHost {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy `result` into `out`, returning its length or `HOST_FAILURE`
fn emit(result: Result<Vec<u8>, CryptoError>, out: &mut [u8]) -> u32 {
    match result {
        Ok(bytes) if bytes.len() <= out.len() => {
            out[..bytes.len()].copy_from_slice(&bytes);
            u32::try_from(bytes.len()).unwrap_or(HOST_FAILURE)
        }
        Ok(_) => HOST_FAILURE,
        Err(e) => {
            tracing::debug!(error = %e, "host crypto call failed");
            HOST_FAILURE
        }
    }
}

impl HostCrypto for LocalHost {
    fn random_bytes(&self, out: &mut [u8]) -> u32 {
        match self.entropy.fill_bytes(out) {
            Ok(()) => HOST_STATUS_OK,
            Err(_) => HOST_FAILURE,
        }
    }

    fn hmac_sha256(&self, key: &[u8], data: &[u8], out: &mut [u8]) -> u32 {
        match emit(calculate_hmac(key, data), out) {
            HOST_FAILURE => HOST_FAILURE,
            _ => HOST_STATUS_OK,
        }
    }

    fn aes_gcm_encrypt(&self, key: &[u8], plaintext: &[u8], out: &mut [u8]) -> u32 {
        let mut nonce = [0u8; GCM_NONCE_SIZE];
        if self.entropy.fill_bytes(&mut nonce).is_err() {
            return HOST_FAILURE;
        }
        let result = encrypt_with_tag_size(key, &nonce, plaintext, GCM_TAG_SIZE).map(|sealed| {
            let mut framed = nonce.to_vec();
            framed.extend_from_slice(&sealed);
            framed
        });
        emit(result, out)
    }

    fn aes_gcm_encrypt_with_iv(
        &self,
        key: &[u8],
        iv: &[u8],
        plaintext: &[u8],
        out: &mut [u8],
    ) -> u32 {
        emit(encrypt_with_tag_size(key, iv, plaintext, GCM_TAG_SIZE), out)
    }

    fn aes_gcm_encrypt_with_iv_tag(
        &self,
        key: &[u8],
        iv: &[u8],
        plaintext: &[u8],
        out: &mut [u8],
        tag_size: u32,
    ) -> u32 {
        emit(
            encrypt_with_tag_size(key, iv, plaintext, tag_size as usize),
            out,
        )
    }

    fn aes_gcm_decrypt(&self, key: &[u8], ciphertext: &[u8], out: &mut [u8]) -> u32 {
        if ciphertext.len() < GCM_NONCE_SIZE {
            return HOST_FAILURE;
        }
        let (nonce, rest) = ciphertext.split_at(GCM_NONCE_SIZE);
        emit(decrypt_with_tag_size(key, nonce, rest, GCM_TAG_SIZE), out)
    }

    fn aes_gcm_decrypt_with_iv_tag(
        &self,
        key: &[u8],
        iv: &[u8],
        ciphertext: &[u8],
        out: &mut [u8],
        tag_size: u32,
    ) -> u32 {
        emit(
            decrypt_with_tag_size(key, iv, ciphertext, tag_size as usize),
            out,
        )
    }

    fn wrap_key(
        &self,
        algorithm: &str,
        public_key_pem: &str,
        key: &[u8],
        salt: &[u8],
        wrapped_out: &mut [u8],
        ephemeral_out: &mut [u8],
    ) -> u64 {
        let result = algorithm
            .parse::<KeyAlgorithm>()
            .and_then(|alg| wrap_for_algorithm(alg, key, public_key_pem, salt));
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(error = %e, algorithm, "host wrap_key failed");
                return HOST_FAILURE_64;
            }
        };

        let ephemeral = result.ephemeral_public_key.unwrap_or_default();
        if result.wrapped_key.len() > wrapped_out.len() || ephemeral.len() > ephemeral_out.len() {
            return HOST_FAILURE_64;
        }
        wrapped_out[..result.wrapped_key.len()].copy_from_slice(&result.wrapped_key);
        ephemeral_out[..ephemeral.len()].copy_from_slice(ephemeral.as_bytes());

        ((ephemeral.len() as u64) << 32) | result.wrapped_key.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{hmac::calculate_policy_binding, KeyWrapScheme, LocalCryptoProvider};

    struct BrokenHost;

    impl HostCrypto for BrokenHost {
        fn random_bytes(&self, _out: &mut [u8]) -> u32 {
            7
        }
        fn hmac_sha256(&self, _key: &[u8], _data: &[u8], _out: &mut [u8]) -> u32 {
            HOST_FAILURE
        }
        fn aes_gcm_encrypt(&self, _key: &[u8], _plaintext: &[u8], out: &mut [u8]) -> u32 {
            // claims more bytes than the buffer holds
            out.len() as u32 + 1
        }
        fn aes_gcm_encrypt_with_iv(&self, _: &[u8], _: &[u8], _: &[u8], _: &mut [u8]) -> u32 {
            HOST_FAILURE
        }
        fn aes_gcm_encrypt_with_iv_tag(
            &self,
            _: &[u8],
            _: &[u8],
            _: &[u8],
            _: &mut [u8],
            _: u32,
        ) -> u32 {
            HOST_FAILURE
        }
        fn aes_gcm_decrypt(&self, _: &[u8], _: &[u8], _: &mut [u8]) -> u32 {
            HOST_FAILURE
        }
        fn aes_gcm_decrypt_with_iv_tag(
            &self,
            _: &[u8],
            _: &[u8],
            _: &[u8],
            _: &mut [u8],
            _: u32,
        ) -> u32 {
            HOST_FAILURE
        }
        fn wrap_key(&self, _: &str, _: &str, _: &[u8], _: &[u8], _: &mut [u8], _: &mut [u8]) -> u64 {
            HOST_FAILURE_64
        }
    }

    #[test]
    fn test_matches_local_provider() {
        let host = HostCryptoProvider::new(LocalHost::new());
        let local = LocalCryptoProvider::new();
        let key = [0x11u8; 32];
        let iv = [0x22u8; 12];

        assert_eq!(
            host.hmac_sha256(&key, b"aggregate").unwrap(),
            local.hmac_sha256(&key, b"aggregate").unwrap()
        );

        let host_gcm = host.new_aes_gcm(&key).unwrap();
        let local_gcm = local.new_aes_gcm(&key).unwrap();
        assert_eq!(
            host_gcm.encrypt_with_iv(&iv, b"segment").unwrap(),
            local_gcm.encrypt_with_iv(&iv, b"segment").unwrap()
        );
        assert_eq!(
            host_gcm
                .encrypt_with_iv_and_tag_size(&iv, b"segment", 12)
                .unwrap(),
            local_gcm
                .encrypt_with_iv_and_tag_size(&iv, b"segment", 12)
                .unwrap()
        );

        let sealed = host_gcm.encrypt(b"metadata").unwrap();
        assert_eq!(local_gcm.decrypt(&sealed).unwrap(), b"metadata");
        assert_eq!(host_gcm.decrypt(&sealed).unwrap(), b"metadata");

        let policy = host.base64_encode(b"{}");
        let via_host = BASE64.encode(hex::encode(host.hmac_sha256(&key, policy.as_bytes()).unwrap()));
        assert_eq!(via_host, calculate_policy_binding(&policy, &key).unwrap());
    }

    struct FixedEntropy(u8);

    impl EntropySource for FixedEntropy {
        fn fill_bytes(&self, dest: &mut [u8]) -> Result<(), CryptoError> {
            dest.fill(self.0);
            Ok(())
        }
    }

    #[test]
    fn test_entropy_override_drives_gcm_nonce() {
        let key = [0x33u8; 32];
        let seal = || {
            HostCryptoProvider::with_entropy(LocalHost::new(), Arc::new(FixedEntropy(5)))
                .new_aes_gcm(&key)
                .unwrap()
                .encrypt(b"segment")
                .unwrap()
        };
        let first = seal();
        assert_eq!(first, seal());
        assert_eq!(&first[..GCM_NONCE_SIZE], &[5u8; GCM_NONCE_SIZE]);
        assert_eq!(first.len(), GCM_NONCE_SIZE + 7 + GCM_TAG_SIZE);

        let local = LocalCryptoProvider::new().new_aes_gcm(&key).unwrap();
        assert_eq!(local.decrypt(&first).unwrap(), b"segment");
    }

    #[test]
    fn test_wrap_key_through_host() {
        let host = HostCryptoProvider::new(LocalHost::new());
        let request = KeyWrapRequest {
            algorithm: KeyAlgorithm::EcP256,
            public_key_pem: include_str!("../../tests/data/kas_ec_p256_public.pem").to_string(),
            plaintext_key: vec![9u8; 32],
            salt: Vec::new(),
        };
        let result = host.wrap_key(&request).unwrap();
        assert_eq!(result.scheme, KeyWrapScheme::Ec);
        assert_eq!(result.wrapped_key.len(), 32);
        assert!(result
            .ephemeral_public_key
            .unwrap()
            .contains("BEGIN PUBLIC KEY"));

        let rsa = KeyWrapRequest {
            algorithm: KeyAlgorithm::Rsa2048,
            public_key_pem: include_str!("../../tests/data/kas_rsa_public.pem").to_string(),
            plaintext_key: vec![9u8; 32],
            salt: Vec::new(),
        };
        let result = host.wrap_key(&rsa).unwrap();
        assert_eq!(result.scheme, KeyWrapScheme::Rsa);
        assert_eq!(result.wrapped_key.len(), 256);
        assert!(result.ephemeral_public_key.is_none());
    }

    #[test]
    fn test_host_failures_surface_as_errors() {
        let host = HostCryptoProvider::new(BrokenHost);
        assert!(matches!(
            host.random_bytes(4),
            Err(CryptoError::Host {
                operation: "random_bytes"
            })
        ));
        assert!(host.hmac_sha256(&[1u8; 32], b"x").is_err());
        let gcm = host.new_aes_gcm(&[1u8; 32]).unwrap();
        assert!(matches!(gcm.encrypt(b"x"), Err(CryptoError::Encoding(_))));
        assert!(matches!(
            gcm.encrypt_with_iv_and_tag_size(&[0u8; 12], b"x", 17),
            Err(CryptoError::UnsupportedTagSize(17))
        ));
        assert!(host.new_aes_gcm(&[]).is_err());
    }
}

//! Key encapsulation for KAS key shares
//!
//! Two schemes are supported:
//!
//! - **RSA-OAEP** (SHA-1 / MGF1-SHA1): the share is encrypted directly
//!   against the KAS public key.
//! - **ECDH**: an ephemeral key pair on the KAS curve yields a shared
//!   secret, HKDF-SHA256 (salt = SHA-256("TDF"), empty info) derives a
//!   key-encryption key, and the share is XORed with it. The ephemeral
//!   public key travels with the wrapped bytes so the KAS can redo the
//!   agreement.
//!
//! The XOR construction is part of the TDF key access format and must be
//! kept as is for interoperability.

use super::{CryptoError, KeyAlgorithm, KeyWrapResult, KeyWrapScheme};
use hkdf::Hkdf;
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use rsa::{
    pkcs1::DecodeRsaPublicKey,
    pkcs8::{DecodePrivateKey, DecodePublicKey},
    Oaep, RsaPrivateKey, RsaPublicKey,
};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

lazy_static! {
    static ref TDF_SALT: [u8; 32] = Sha256::digest(b"TDF").into();
}

/// Standard HKDF salt for TDF EC key wrapping: SHA-256("TDF")
pub fn tdf_salt() -> &'static [u8] {
    TDF_SALT.as_slice()
}

/// Trait for key encapsulation mechanisms
pub trait KeyEncapsulation {
    /// Wrap a symmetric key with a PEM-encoded public key
    fn wrap(&self, key: &[u8], public_key_pem: &str) -> Result<KeyWrapResult, CryptoError>;

    /// Unwrap a symmetric key with a PEM-encoded (PKCS#8) private key
    fn unwrap(
        &self,
        wrapped: &KeyWrapResult,
        private_key_pem: &str,
    ) -> Result<Vec<u8>, CryptoError>;
}

/// RSA-OAEP with SHA-1, as used by OpenTDF key access objects
#[derive(Debug, Default, Clone, Copy)]
pub struct RsaOaepKem;

fn parse_rsa_public_key(pem: &str) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| CryptoError::InvalidPublicKey(format!("Failed to parse RSA public key: {}", e)))
}

impl KeyEncapsulation for RsaOaepKem {
    fn wrap(&self, key: &[u8], public_key_pem: &str) -> Result<KeyWrapResult, CryptoError> {
        let public_key = parse_rsa_public_key(public_key_pem)?;
        let wrapped = public_key
            .encrypt(&mut OsRng, Oaep::new::<Sha1>(), key)
            .map_err(|e| CryptoError::Wrap(format!("RSA-OAEP encryption failed: {}", e)))?;

        Ok(KeyWrapResult {
            scheme: KeyWrapScheme::Rsa,
            wrapped_key: wrapped,
            ephemeral_public_key: None,
        })
    }

    fn unwrap(
        &self,
        wrapped: &KeyWrapResult,
        private_key_pem: &str,
    ) -> Result<Vec<u8>, CryptoError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem).map_err(|e| {
            CryptoError::InvalidPrivateKey(format!("Failed to parse RSA private key: {}", e))
        })?;
        private_key
            .decrypt(Oaep::new::<Sha1>(), &wrapped.wrapped_key)
            .map_err(|e| CryptoError::Unwrap(format!("RSA-OAEP decryption failed: {}", e)))
    }
}

/// Elliptic curves accepted for ECDH wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    /// NIST P-256 (secp256r1)
    P256,
    /// NIST P-384 (secp384r1)
    P384,
}

impl EcCurve {
    pub fn from_algorithm(algorithm: KeyAlgorithm) -> Result<Self, CryptoError> {
        match algorithm {
            KeyAlgorithm::EcP256 => Ok(EcCurve::P256),
            KeyAlgorithm::EcP384 => Ok(EcCurve::P384),
            other => Err(CryptoError::UnsupportedAlgorithm(format!(
                "{} is not an EC algorithm",
                other
            ))),
        }
    }
}

/// ECDH + HKDF + XOR key wrapping
#[derive(Debug, Clone)]
pub struct EcdhKem {
    pub curve: EcCurve,
    salt: Vec<u8>,
}

impl EcdhKem {
    /// Create an EC KEM using the standard TDF salt
    pub fn new(curve: EcCurve) -> Self {
        Self::with_salt(curve, tdf_salt())
    }

    /// Create an EC KEM with a custom HKDF salt; empty means the TDF salt
    pub fn with_salt(curve: EcCurve, salt: &[u8]) -> Self {
        let salt = if salt.is_empty() { tdf_salt() } else { salt };
        EcdhKem {
            curve,
            salt: salt.to_vec(),
        }
    }
}

/// Derive the key-encryption key from an ECDH shared secret
fn derive_kek(shared_secret: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), shared_secret);
    let mut okm = Zeroizing::new([0u8; 32]);
    hkdf.expand(&[], &mut okm[..])
        .map_err(|e| CryptoError::Wrap(format!("HKDF expansion failed: {}", e)))?;
    Ok(okm)
}

/// XOR `key` with the leading bytes of `kek`
fn xor_with_kek(kek: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if kek.len() < key.len() {
        return Err(CryptoError::DerivedKeyTooShort {
            got: kek.len(),
            needed: key.len(),
        });
    }
    Ok(key.iter().zip(kek.iter()).map(|(k, w)| k ^ w).collect())
}

macro_rules! ecdh_wrap {
    ($curve:ident, $pem:expr) => {{
        use $curve::pkcs8::{DecodePublicKey as _, EncodePublicKey as _, LineEnding};

        let kas_key = $curve::PublicKey::from_public_key_pem($pem).map_err(|e| {
            CryptoError::InvalidPublicKey(format!("Failed to parse EC public key: {}", e))
        })?;
        let ephemeral = $curve::ecdh::EphemeralSecret::random(&mut OsRng);
        let shared = ephemeral.diffie_hellman(&kas_key);
        let ephemeral_pem = ephemeral
            .public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::Encoding(format!("Failed to encode ephemeral key: {}", e)))?;
        (shared.raw_secret_bytes().to_vec(), ephemeral_pem)
    }};
}

macro_rules! ecdh_agree {
    ($curve:ident, $private_pem:expr, $ephemeral_pem:expr) => {{
        use $curve::pkcs8::{DecodePrivateKey as _, DecodePublicKey as _};

        let secret = $curve::SecretKey::from_pkcs8_pem($private_pem).map_err(|e| {
            CryptoError::InvalidPrivateKey(format!("Failed to parse EC private key: {}", e))
        })?;
        let ephemeral = $curve::PublicKey::from_public_key_pem($ephemeral_pem).map_err(|e| {
            CryptoError::InvalidPublicKey(format!("Failed to parse ephemeral key: {}", e))
        })?;
        let shared = $curve::ecdh::diffie_hellman(secret.to_nonzero_scalar(), ephemeral.as_affine());
        shared.raw_secret_bytes().to_vec()
    }};
}

impl KeyEncapsulation for EcdhKem {
    fn wrap(&self, key: &[u8], public_key_pem: &str) -> Result<KeyWrapResult, CryptoError> {
        let (shared, ephemeral_pem) = match self.curve {
            EcCurve::P256 => ecdh_wrap!(p256, public_key_pem),
            EcCurve::P384 => ecdh_wrap!(p384, public_key_pem),
        };
        let shared = Zeroizing::new(shared);
        let kek = derive_kek(&shared, &self.salt)?;

        Ok(KeyWrapResult {
            scheme: KeyWrapScheme::Ec,
            wrapped_key: xor_with_kek(kek.as_slice(), key)?,
            ephemeral_public_key: Some(ephemeral_pem),
        })
    }

    fn unwrap(
        &self,
        wrapped: &KeyWrapResult,
        private_key_pem: &str,
    ) -> Result<Vec<u8>, CryptoError> {
        let ephemeral_pem = wrapped.ephemeral_public_key.as_deref().ok_or_else(|| {
            CryptoError::Unwrap("EC wrapped key has no ephemeral public key".to_string())
        })?;
        let shared = match self.curve {
            EcCurve::P256 => ecdh_agree!(p256, private_key_pem, ephemeral_pem),
            EcCurve::P384 => ecdh_agree!(p384, private_key_pem, ephemeral_pem),
        };
        let shared = Zeroizing::new(shared);
        let kek = derive_kek(&shared, &self.salt)?;
        xor_with_kek(kek.as_slice(), &wrapped.wrapped_key)
    }
}

/// Wrap `key` for a KAS public key using the scheme implied by `algorithm`
pub fn wrap_for_algorithm(
    algorithm: KeyAlgorithm,
    key: &[u8],
    public_key_pem: &str,
    salt: &[u8],
) -> Result<KeyWrapResult, CryptoError> {
    if public_key_pem.trim().is_empty() {
        return Err(CryptoError::InvalidPublicKey(
            "public key PEM is empty".to_string(),
        ));
    }
    if key.is_empty() {
        return Err(CryptoError::Wrap("plaintext key is empty".to_string()));
    }
    match algorithm.scheme() {
        KeyWrapScheme::Rsa => RsaOaepKem.wrap(key, public_key_pem),
        KeyWrapScheme::Ec => {
            EcdhKem::with_salt(EcCurve::from_algorithm(algorithm)?, salt).wrap(key, public_key_pem)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSA_PUBLIC: &str = include_str!("../../tests/data/kas_rsa_public.pem");
    const RSA_PRIVATE: &str = include_str!("../../tests/data/kas_rsa_private.pem");
    const P256_PUBLIC: &str = include_str!("../../tests/data/kas_ec_p256_public.pem");
    const P256_PRIVATE: &str = include_str!("../../tests/data/kas_ec_p256_private.pem");
    const P384_PUBLIC: &str = include_str!("../../tests/data/kas_ec_p384_public.pem");
    const P384_PRIVATE: &str = include_str!("../../tests/data/kas_ec_p384_private.pem");

    #[test]
    fn test_tdf_salt() {
        let expected = Sha256::digest(b"TDF");
        assert_eq!(tdf_salt(), expected.as_slice());
    }

    #[test]
    fn test_rsa_wrap_roundtrip() {
        let share = [0x5Au8; 32];
        let wrapped = RsaOaepKem.wrap(&share, RSA_PUBLIC).unwrap();
        assert_eq!(wrapped.scheme, KeyWrapScheme::Rsa);
        assert_eq!(wrapped.wrapped_key.len(), 256);
        assert!(wrapped.ephemeral_public_key.is_none());

        let unwrapped = RsaOaepKem.unwrap(&wrapped, RSA_PRIVATE).unwrap();
        assert_eq!(unwrapped, share);
    }

    #[test]
    fn test_rsa_wrap_is_randomized() {
        let share = [1u8; 32];
        let a = RsaOaepKem.wrap(&share, RSA_PUBLIC).unwrap();
        let b = RsaOaepKem.wrap(&share, RSA_PUBLIC).unwrap();
        assert_ne!(a.wrapped_key, b.wrapped_key);
    }

    #[test]
    fn test_ec_p256_wrap_roundtrip() {
        let share: Vec<u8> = (0u8..32).collect();
        let kem = EcdhKem::new(EcCurve::P256);
        let wrapped = kem.wrap(&share, P256_PUBLIC).unwrap();
        assert_eq!(wrapped.scheme, KeyWrapScheme::Ec);
        assert_eq!(wrapped.wrapped_key.len(), 32);
        assert!(wrapped
            .ephemeral_public_key
            .as_deref()
            .unwrap()
            .starts_with("-----BEGIN PUBLIC KEY-----"));
        assert_ne!(wrapped.wrapped_key, share);

        assert_eq!(kem.unwrap(&wrapped, P256_PRIVATE).unwrap(), share);
    }

    #[test]
    fn test_ec_p384_wrap_roundtrip() {
        let share = [0xC3u8; 32];
        let kem = EcdhKem::new(EcCurve::P384);
        let wrapped = kem.wrap(&share, P384_PUBLIC).unwrap();
        assert_eq!(kem.unwrap(&wrapped, P384_PRIVATE).unwrap(), share);
    }

    #[test]
    fn test_ec_rejects_keys_longer_than_kek() {
        let kem = EcdhKem::new(EcCurve::P256);
        let err = kem.wrap(&[0u8; 48], P256_PUBLIC).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::DerivedKeyTooShort {
                got: 32,
                needed: 48
            }
        ));
    }

    #[test]
    fn test_wrong_key_type_rejected() {
        assert!(matches!(
            wrap_for_algorithm(KeyAlgorithm::EcP256, &[0u8; 32], RSA_PUBLIC, &[]),
            Err(CryptoError::InvalidPublicKey(_))
        ));
        assert!(matches!(
            wrap_for_algorithm(KeyAlgorithm::Rsa2048, &[0u8; 32], "", &[]),
            Err(CryptoError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn test_empty_salt_uses_tdf_salt() {
        let share = [3u8; 32];
        let wrapped = wrap_for_algorithm(KeyAlgorithm::EcP256, &share, P256_PUBLIC, &[]).unwrap();
        let unwrapped = EcdhKem::new(EcCurve::P256)
            .unwrap(&wrapped, P256_PRIVATE)
            .unwrap();
        assert_eq!(unwrapped, share);
    }
}

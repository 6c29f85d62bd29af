//! Common test utilities for opentdf-stream integration tests
//!
//! Fixture keys live in `tests/data`. Containers are read back with the
//! `zip` crate and payloads are decrypted with the crate's own primitives.

#![allow(dead_code)]

use opentdf_stream::crypto::kem::EcCurve;
use opentdf_stream::crypto::{
    CryptoError, CryptoProvider, EcdhKem, EntropySource, KeyEncapsulation, KeyWrapResult,
    KeyWrapScheme, LocalCryptoProvider, RsaOaepKem,
};
use opentdf_stream::manifest::KeyAccess;
use opentdf_stream::{KasPublicKey, KeyAlgorithm, TdfManifest};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex};

pub use opentdf_stream::{Encryptor, TdfError, WriterConfig};

pub const RSA_KAS_URL: &str = "https://kas-rsa.example.com";
pub const EC_KAS_URL: &str = "https://kas-ec.example.com";

pub const RSA_PUBLIC_PEM: &str = include_str!("../data/kas_rsa_public.pem");
pub const RSA_PRIVATE_PEM: &str = include_str!("../data/kas_rsa_private.pem");
pub const EC_P256_PUBLIC_PEM: &str = include_str!("../data/kas_ec_p256_public.pem");
pub const EC_P256_PRIVATE_PEM: &str = include_str!("../data/kas_ec_p256_private.pem");
pub const EC_P384_PUBLIC_PEM: &str = include_str!("../data/kas_ec_p384_public.pem");
pub const EC_P384_PRIVATE_PEM: &str = include_str!("../data/kas_ec_p384_private.pem");

/// Install a fmt subscriber honouring `RUST_LOG`; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn rsa_kas() -> KasPublicKey {
    KasPublicKey::new(RSA_KAS_URL, KeyAlgorithm::Rsa2048, RSA_PUBLIC_PEM).with_kid("r1")
}

pub fn ec_kas(algorithm: KeyAlgorithm) -> KasPublicKey {
    let pem = match algorithm {
        KeyAlgorithm::EcP384 => EC_P384_PUBLIC_PEM,
        _ => EC_P256_PUBLIC_PEM,
    };
    KasPublicKey::new(EC_KAS_URL, algorithm, pem).with_kid("e1")
}

/// Deterministic entropy for reproducibility tests
pub struct SeededEntropy(Mutex<StdRng>);

impl SeededEntropy {
    pub fn provider(seed: u64) -> Arc<dyn CryptoProvider> {
        Arc::new(LocalCryptoProvider::with_entropy(Arc::new(SeededEntropy(
            Mutex::new(StdRng::seed_from_u64(seed)),
        ))))
    }
}

impl EntropySource for SeededEntropy {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<(), CryptoError> {
        self.0
            .lock()
            .map_err(|_| CryptoError::Entropy("poisoned".to_string()))?
            .fill_bytes(dest);
        Ok(())
    }
}

/// Read every entry of a zip archive, in central directory order
pub fn read_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip archive");
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).expect("entry");
            assert_eq!(file.compression(), zip::CompressionMethod::Stored);
            let mut data = Vec::new();
            file.read_to_end(&mut data).expect("entry data");
            (file.name().to_string(), data)
        })
        .collect()
}

/// Payload bytes and parsed manifest of a TDF container
pub fn open_tdf(bytes: &[u8]) -> (Vec<u8>, TdfManifest) {
    let entries = read_entries(bytes);
    assert_eq!(entries.len(), 2, "a TDF holds exactly two entries");
    assert_eq!(entries[0].0, "payload");
    assert_eq!(entries[1].0, "manifest");
    let manifest_json = String::from_utf8(entries[1].1.clone()).expect("utf-8 manifest");
    let manifest = TdfManifest::from_json(&manifest_json).expect("manifest JSON");
    (entries[0].1.clone(), manifest)
}

/// Recover a key share from a key access object with the KAS private key
pub fn unwrap_share(record: &KeyAccess, private_pem: &str, curve: Option<EcCurve>) -> Vec<u8> {
    let scheme = record.scheme().expect("known key access type");
    let wrapped = KeyWrapResult {
        scheme,
        wrapped_key: record.wrapped_key_bytes().expect("base64 wrapped key"),
        ephemeral_public_key: record.ephemeral_public_key.clone(),
    };
    let share = match scheme {
        KeyWrapScheme::Rsa => RsaOaepKem.unwrap(&wrapped, private_pem),
        KeyWrapScheme::Ec => {
            EcdhKem::new(curve.unwrap_or(EcCurve::P256)).unwrap(&wrapped, private_pem)
        }
    };
    share.expect("unwrap key share")
}

/// Decrypt a payload segment by segment using the manifest's sizes
pub fn decrypt_payload(payload: &[u8], manifest: &TdfManifest, key: &[u8]) -> Vec<u8> {
    let cipher = LocalCryptoProvider::new().new_aes_gcm(key).expect("cipher");
    let mut offset = 0usize;
    let mut plaintext = Vec::new();
    for segment in manifest.segments() {
        let end = offset + segment.encrypted_segment_size as usize;
        let chunk = cipher.decrypt(&payload[offset..end]).expect("decrypt segment");
        assert_eq!(chunk.len() as u64, segment.segment_size);
        plaintext.extend_from_slice(&chunk);
        offset = end;
    }
    assert_eq!(offset, payload.len(), "segments cover the whole payload");
    plaintext
}

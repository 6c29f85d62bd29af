//! Key access object construction
//!
//! For every (split, KAS) pair this wraps the split's share for the KAS
//! public key, binds the share to the policy, and optionally encrypts
//! caller metadata under the share.

use crate::crypto::{tdf_salt, CryptoProvider, KeyWrapRequest, GCM_NONCE_SIZE};
use crate::error::TdfError;
use crate::manifest::{KeyAccess, PolicyBinding};
use crate::split::{KasPublicKey, Split};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Algorithm name recorded in every policy binding
pub const POLICY_BINDING_ALG: &str = "HS256";

/// Protocol recorded in every key access object
pub const KAS_PROTOCOL: &str = "kas";

/// A KAS target that produced no key access object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KasFailure {
    pub kas_url: String,
    pub split_id: String,
    pub reason: String,
}

impl fmt::Display for KasFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (split '{}'): {}", self.kas_url, self.split_id, self.reason)
    }
}

/// JSON envelope stored, base64 encoded, in `encryptedMetadata`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMetadata {
    /// base64(nonce || ciphertext || tag)
    pub ciphertext: String,
    /// base64(nonce)
    pub iv: String,
}

/// Build one key access object per resolvable (split, KAS) pair
///
/// Records are emitted in split order, then KAS order within a split. A
/// KAS without a public key is skipped with a warning, and a failed wrap
/// is recorded without stopping the remaining targets. Policy binding and
/// metadata encryption failures abort the whole operation.
///
/// # Errors
///
/// Returns [`TdfError::NoValidKeyAccess`] carrying every skip and failure
/// when no record could be produced.
pub fn build_key_access_objects(
    provider: &dyn CryptoProvider,
    splits: &[Split],
    public_keys: &HashMap<String, KasPublicKey>,
    policy_json: &[u8],
    metadata: Option<&str>,
) -> Result<Vec<KeyAccess>, TdfError> {
    if splits.is_empty() {
        return Err(TdfError::NoSplits);
    }

    let policy_base64 = provider.base64_encode(policy_json);
    let mut records = Vec::new();
    let mut failures = Vec::new();

    for split in splits {
        for kas_url in &split.kas_urls {
            let Some(public_key) = public_keys.get(kas_url) else {
                warn!(kas_url = %kas_url, split_id = %split.id, "no public key found for KAS, skipping");
                failures.push(KasFailure {
                    kas_url: kas_url.clone(),
                    split_id: split.id.clone(),
                    reason: "no public key on file".to_string(),
                });
                continue;
            };

            let policy_binding = create_policy_binding(provider, split.share.as_slice(), &policy_base64)?;
            let encrypted_metadata = match metadata {
                Some(metadata) if !metadata.is_empty() => Some(encrypt_metadata(
                    provider,
                    split.share.as_slice(),
                    metadata,
                )?),
                _ => None,
            };

            let request = KeyWrapRequest {
                algorithm: public_key.algorithm,
                public_key_pem: public_key.pem.clone(),
                plaintext_key: split.share.as_slice().to_vec(),
                salt: tdf_salt().to_vec(),
            };
            let wrapped = match provider.wrap_key(&request) {
                Ok(wrapped) => wrapped,
                Err(e) => {
                    warn!(kas_url = %kas_url, split_id = %split.id, error = %e, "failed to wrap key for KAS");
                    failures.push(KasFailure {
                        kas_url: kas_url.clone(),
                        split_id: split.id.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            debug!(
                kas_url = %kas_url,
                split_id = %split.id,
                scheme = %wrapped.scheme,
                kid = public_key.kid.as_deref().unwrap_or(""),
                "created key access object"
            );

            records.push(KeyAccess {
                access_type: wrapped.scheme.manifest_type().to_string(),
                url: kas_url.clone(),
                protocol: KAS_PROTOCOL.to_string(),
                wrapped_key: provider.base64_encode(&wrapped.wrapped_key),
                policy_binding,
                encrypted_metadata,
                kid: public_key.kid.clone(),
                sid: (!split.id.is_empty()).then(|| split.id.clone()),
                schema_version: None,
                ephemeral_public_key: wrapped.ephemeral_public_key,
            });
        }
    }

    if records.is_empty() {
        return Err(TdfError::NoValidKeyAccess { failures });
    }

    debug!(
        num_key_access = records.len(),
        num_splits = splits.len(),
        num_failures = failures.len(),
        "built key access objects"
    );
    Ok(records)
}

/// `base64(hex(HMAC-SHA256(share, base64(policy))))`
pub fn create_policy_binding(
    provider: &dyn CryptoProvider,
    share: &[u8],
    policy_base64: &str,
) -> Result<PolicyBinding, TdfError> {
    let mac = provider.hmac_sha256(share, policy_base64.as_bytes())?;
    Ok(PolicyBinding {
        alg: POLICY_BINDING_ALG.to_string(),
        hash: provider.base64_encode(hex::encode(mac).as_bytes()),
    })
}

/// Encrypt metadata under a share and package it as base64 JSON
pub fn encrypt_metadata(
    provider: &dyn CryptoProvider,
    share: &[u8],
    metadata: &str,
) -> Result<String, TdfError> {
    let cipher = provider.new_aes_gcm(share)?;
    let encrypted = cipher.encrypt(metadata.as_bytes())?;
    let envelope = EncryptedMetadata {
        ciphertext: provider.base64_encode(&encrypted),
        iv: provider.base64_encode(&encrypted[..GCM_NONCE_SIZE.min(encrypted.len())]),
    };
    let json = serde_json::to_vec(&envelope)?;
    Ok(provider.base64_encode(&json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{
        hmac::calculate_policy_binding, KeyAlgorithm, KeyShare, KeyWrapScheme,
        LocalCryptoProvider,
    };

    const RSA_PUBLIC: &str = include_str!("../tests/data/kas_rsa_public.pem");
    const EC_PUBLIC: &str = include_str!("../tests/data/kas_ec_p256_public.pem");

    fn split(id: &str, urls: &[&str]) -> Split {
        Split {
            id: id.to_string(),
            share: KeyShare::from_slice(&[7u8; 32]).unwrap(),
            kas_urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }

    fn keys(entries: &[(&str, KeyAlgorithm, &str)]) -> HashMap<String, KasPublicKey> {
        entries
            .iter()
            .map(|(url, alg, pem)| {
                (
                    url.to_string(),
                    KasPublicKey::new(*url, *alg, *pem).with_kid(format!("{}-kid", alg)),
                )
            })
            .collect()
    }

    #[test]
    fn test_records_follow_split_and_kas_order() {
        let provider = LocalCryptoProvider::new();
        let splits = vec![
            split("s-1", &["https://rsa.example.com", "https://ec.example.com"]),
            split("s-2", &["https://ec.example.com"]),
        ];
        let keys = keys(&[
            ("https://rsa.example.com", KeyAlgorithm::Rsa2048, RSA_PUBLIC),
            ("https://ec.example.com", KeyAlgorithm::EcP256, EC_PUBLIC),
        ]);
        let records = build_key_access_objects(&provider, &splits, &keys, b"{}", None).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].url, "https://rsa.example.com");
        assert_eq!(records[0].scheme(), Some(KeyWrapScheme::Rsa));
        assert_eq!(records[0].wrapped_key_bytes().unwrap().len(), 256);
        assert!(records[0].ephemeral_public_key.is_none());
        assert_eq!(records[1].scheme(), Some(KeyWrapScheme::Ec));
        assert!(records[1]
            .ephemeral_public_key
            .as_deref()
            .unwrap()
            .starts_with("-----BEGIN PUBLIC KEY-----"));
        assert_eq!(records[2].sid.as_deref(), Some("s-2"));
        assert_eq!(records[0].kid.as_deref(), Some("rsa:2048-kid"));
        assert!(records.iter().all(|r| r.protocol == "kas"));
    }

    #[test]
    fn test_policy_binding_matches_hmac_helper() {
        let provider = LocalCryptoProvider::new();
        let policy_base64 = provider.base64_encode(br#"{"uuid":"x"}"#);
        let binding = create_policy_binding(&provider, &[7u8; 32], &policy_base64).unwrap();
        assert_eq!(binding.alg, "HS256");
        assert_eq!(
            binding.hash,
            calculate_policy_binding(&policy_base64, &[7u8; 32]).unwrap()
        );
        let hex_bytes = provider.base64_decode(&binding.hash).unwrap();
        assert_eq!(hex_bytes.len(), 64);
    }

    #[test]
    fn test_unresolvable_kas_is_skipped() {
        let provider = LocalCryptoProvider::new();
        let splits = vec![split("", &["https://missing.example.com", "https://rsa.example.com"])];
        let keys = keys(&[("https://rsa.example.com", KeyAlgorithm::Rsa2048, RSA_PUBLIC)]);
        let records = build_key_access_objects(&provider, &splits, &keys, b"{}", None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "https://rsa.example.com");
        assert!(records[0].sid.is_none());
    }

    #[test]
    fn test_no_records_is_an_error() {
        let provider = LocalCryptoProvider::new();
        let splits = vec![split("", &["https://missing.example.com", "https://bad.example.com"])];
        let keys = keys(&[("https://bad.example.com", KeyAlgorithm::Rsa2048, "not a pem")]);
        match build_key_access_objects(&provider, &splits, &keys, b"{}", None) {
            Err(TdfError::NoValidKeyAccess { failures }) => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].kas_url, "https://missing.example.com");
                assert_eq!(failures[1].kas_url, "https://bad.example.com");
            }
            other => panic!("expected NoValidKeyAccess, got {:?}", other),
        }
    }

    #[test]
    fn test_encrypted_metadata_decrypts_under_share() {
        let provider = LocalCryptoProvider::new();
        let encoded = encrypt_metadata(&provider, &[7u8; 32], "meta").unwrap();
        let envelope: EncryptedMetadata =
            serde_json::from_slice(&provider.base64_decode(&encoded).unwrap()).unwrap();
        let ciphertext = provider.base64_decode(&envelope.ciphertext).unwrap();
        let iv = provider.base64_decode(&envelope.iv).unwrap();
        assert_eq!(&ciphertext[..12], iv.as_slice());
        let cipher = provider.new_aes_gcm(&[7u8; 32]).unwrap();
        assert_eq!(cipher.decrypt(&ciphertext).unwrap(), b"meta");
    }
}

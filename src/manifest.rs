//! TDF manifest model
//!
//! The manifest is the JSON document stored in the container's `manifest`
//! entry. It describes the payload, the key access objects needed to
//! recover the payload key, the integrity chain over the encrypted
//! segments, and any signed assertions.

use crate::assertion::Assertion;
use crate::crypto::KeyWrapScheme;
use crate::policy::{Policy, PolicyError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

/// Manifest schema version written unless disabled
pub const TDF_SPEC_VERSION: &str = "4.3.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TdfManifest {
    pub payload: Payload,
    #[serde(rename = "encryptionInformation")]
    pub encryption_information: EncryptionInformation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<Assertion>,
    #[serde(rename = "schemaVersion", default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(rename = "type")]
    pub payload_type: String,
    pub url: String,
    pub protocol: String,
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(rename = "isEncrypted")]
    pub is_encrypted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionInformation {
    #[serde(rename = "type")]
    pub encryption_type: String,
    #[serde(rename = "keyAccess")]
    pub key_access: Vec<KeyAccess>,
    pub method: EncryptionMethod,
    #[serde(rename = "integrityInformation")]
    pub integrity_information: IntegrityInformation,
    pub policy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyBinding {
    pub alg: String,
    pub hash: String,
}

/// One wrapped key share for one KAS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAccess {
    #[serde(rename = "type")]
    pub access_type: String,
    pub url: String,
    pub protocol: String,
    #[serde(rename = "wrappedKey")]
    pub wrapped_key: String,
    #[serde(rename = "policyBinding")]
    pub policy_binding: PolicyBinding,
    #[serde(rename = "encryptedMetadata", default, skip_serializing_if = "Option::is_none")]
    pub encrypted_metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Split identifier; absent for single-split containers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(rename = "schemaVersion", default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(rename = "ephemeralPublicKey", default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_public_key: Option<String>,
}

impl KeyAccess {
    /// Wrap scheme recorded in the `type` field
    pub fn scheme(&self) -> Option<KeyWrapScheme> {
        KeyWrapScheme::from_manifest_type(&self.access_type)
    }

    /// Decode the base64 wrapped key bytes
    pub fn wrapped_key_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.wrapped_key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionMethod {
    pub algorithm: String,
    pub iv: String,
    #[serde(rename = "isStreamable")]
    pub is_streamable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityInformation {
    #[serde(rename = "rootSignature")]
    pub root_signature: RootSignature,
    #[serde(rename = "segmentHashAlg")]
    pub segment_hash_alg: String,
    pub segments: Vec<Segment>,
    #[serde(rename = "segmentSizeDefault")]
    pub segment_size_default: u64,
    #[serde(rename = "encryptedSegmentSizeDefault")]
    pub encrypted_segment_size_default: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootSignature {
    pub alg: String,
    pub sig: String,
}

/// Metadata for one encrypted chunk of the payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub hash: String,
    #[serde(rename = "segmentSize")]
    pub segment_size: u64,
    #[serde(rename = "encryptedSegmentSize")]
    pub encrypted_segment_size: u64,
}

impl TdfManifest {
    /// Parse a JSON string into a TdfManifest
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Convert the TdfManifest to a JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Get the decoded policy from the manifest as a raw string
    pub fn get_policy_raw(&self) -> Result<String, PolicyError> {
        let bytes = BASE64
            .decode(&self.encryption_information.policy)
            .map_err(|e| {
                PolicyError::SerializationError(serde_json::Error::io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    e.to_string(),
                )))
            })?;
        String::from_utf8(bytes).map_err(|e| {
            PolicyError::SerializationError(serde_json::Error::io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e.to_string(),
            )))
        })
    }

    /// Get the policy from the manifest as a Policy object
    pub fn get_policy(&self) -> Result<Policy, PolicyError> {
        Policy::from_json(&self.get_policy_raw()?)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.encryption_information.integrity_information.segments
    }

    pub fn key_access(&self) -> &[KeyAccess] {
        &self.encryption_information.key_access
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST_JSON: &str = r#"{
        "encryptionInformation": {
            "type": "split",
            "keyAccess": [{
                "type": "ec-wrapped",
                "url": "http://localhost:8080",
                "protocol": "kas",
                "wrappedKey": "abc123",
                "policyBinding": {
                    "alg": "HS256",
                    "hash": "def456"
                },
                "kid": "e1",
                "ephemeralPublicKey": "-----BEGIN PUBLIC KEY-----"
            }],
            "method": {
                "algorithm": "AES-256-GCM",
                "iv": "",
                "isStreamable": true
            },
            "integrityInformation": {
              "rootSignature": {
                "alg": "HS256",
                "sig": "M2E2MTI5YmMxMWU0ODIzZDA4YTdkNTY2MzdlNDM4OGRlZDE2MTFhZjU1YTY1YzBhYWNlMWVjYjlmODUzNmNiZQ=="
              },
              "segmentHashAlg": "GMAC",
              "segments": [
                  {
                      "hash": "NzhlZDg5OWMwZWVhZDBjMWEzZTQyYmFlODA0NjNlMDM=",
                      "segmentSize": 14056,
                      "encryptedSegmentSize": 14084
                    }
              ],
              "segmentSizeDefault": 1000000,
              "encryptedSegmentSizeDefault": 1000028
            },
            "policy": "eyJ1dWlkIjoiYSIsImJvZHkiOnsiZGF0YUF0dHJpYnV0ZXMiOm51bGwsImRpc3NlbSI6bnVsbH19"
        },
        "payload": {
            "type": "reference",
            "url": "payload",
            "protocol": "zip",
            "mimeType": "application/octet-stream",
            "isEncrypted": true
        },
        "schemaVersion": "4.3.0"
    }"#;

    #[test]
    fn test_manifest_deserialization() {
        let manifest = TdfManifest::from_json(MANIFEST_JSON).unwrap();
        let ka = &manifest.key_access()[0];
        assert_eq!(ka.scheme(), Some(KeyWrapScheme::Ec));
        assert_eq!(ka.policy_binding.alg, "HS256");
        assert!(ka.sid.is_none());
        assert_eq!(manifest.segments()[0].encrypted_segment_size, 14084);
        assert!(manifest.assertions.is_empty());
        assert_eq!(manifest.schema_version.as_deref(), Some(TDF_SPEC_VERSION));
    }

    #[test]
    fn test_manifest_roundtrip_omits_empty_optionals() {
        let mut manifest = TdfManifest::from_json(MANIFEST_JSON).unwrap();
        manifest.schema_version = None;
        let json = manifest.to_json().unwrap();
        assert!(!json.contains("schemaVersion"));
        assert!(!json.contains("assertions"));
        assert!(!json.contains("encryptedMetadata"));
        assert_eq!(TdfManifest::from_json(&json).unwrap(), manifest);
    }

    #[test]
    fn test_policy_decoding() {
        let manifest = TdfManifest::from_json(MANIFEST_JSON).unwrap();
        assert_eq!(
            manifest.get_policy_raw().unwrap(),
            r#"{"uuid":"a","body":{"dataAttributes":null,"dissem":null}}"#
        );
        let policy = manifest.get_policy().unwrap();
        assert_eq!(policy.uuid, "a");
        assert!(policy.body.dissem.is_empty());
    }
}

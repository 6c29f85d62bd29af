//! Signed assertions
//!
//! An assertion is a statement attached to the container and bound to the
//! payload through a JWS. The JWS claims carry the assertion's own hash and
//! a signature combining that hash with the aggregate segment signature, so
//! an assertion cannot be moved to another payload.

use crate::crypto::CryptoProvider;
use crate::error::TdfError;
use crate::manifest::TDF_SPEC_VERSION;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Binding method recorded for JWS-bound assertions
pub const JWS_BINDING_METHOD: &str = "jws";

/// Identifier of the default system metadata assertion
pub const SYSTEM_METADATA_ASSERTION_ID: &str = "system-metadata";

const SYSTEM_METADATA_SCHEMA: &str = "system-metadata-v1";
const JWS_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionType {
    Handling,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionScope {
    Tdo,
    Payload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppliesToState {
    Encrypted,
    Unencrypted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub format: String,
    pub schema: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub method: String,
    pub signature: String,
}

/// An assertion as stored in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    pub id: String,
    #[serde(rename = "type")]
    pub assertion_type: AssertionType,
    pub scope: AssertionScope,
    #[serde(rename = "appliesToState")]
    pub applies_to_state: AppliesToState,
    pub statement: Statement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<Binding>,
}

/// HS256 key used instead of the payload key to sign an assertion
#[derive(Clone)]
pub struct AssertionSigningKey(Zeroizing<Vec<u8>>);

impl AssertionSigningKey {
    pub fn hs256(key: &[u8]) -> Self {
        AssertionSigningKey(Zeroizing::new(key.to_vec()))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for AssertionSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AssertionSigningKey(..)")
    }
}

/// Unsigned assertion supplied by the caller
#[derive(Debug, Clone)]
pub struct AssertionConfig {
    pub id: String,
    pub assertion_type: AssertionType,
    pub scope: AssertionScope,
    pub applies_to_state: AppliesToState,
    pub statement: Statement,
    pub signing_key: Option<AssertionSigningKey>,
}

impl AssertionConfig {
    pub fn new(
        id: impl Into<String>,
        assertion_type: AssertionType,
        scope: AssertionScope,
        applies_to_state: AppliesToState,
        statement: Statement,
    ) -> Self {
        AssertionConfig {
            id: id.into(),
            assertion_type,
            scope,
            applies_to_state,
            statement,
            signing_key: None,
        }
    }

    #[must_use]
    pub fn with_signing_key(mut self, key: AssertionSigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// The default assertion describing the producing environment
    pub fn system_metadata() -> Result<Self, TdfError> {
        let value = serde_json::json!({
            "tdf_spec_version": TDF_SPEC_VERSION,
            "creation_date": chrono::Utc::now().to_rfc3339(),
            "operating_system": std::env::consts::OS,
            "sdk_version": concat!("Rust-", env!("CARGO_PKG_VERSION")),
            "architecture": std::env::consts::ARCH,
        });
        Ok(AssertionConfig::new(
            SYSTEM_METADATA_ASSERTION_ID,
            AssertionType::Other,
            AssertionScope::Payload,
            AppliesToState::Unencrypted,
            Statement {
                format: "json".to_string(),
                schema: SYSTEM_METADATA_SCHEMA.to_string(),
                value: serde_json::to_string(&value)?,
            },
        ))
    }

    fn unsigned(&self) -> Assertion {
        Assertion {
            id: self.id.clone(),
            assertion_type: self.assertion_type,
            scope: self.scope,
            applies_to_state: self.applies_to_state,
            statement: self.statement.clone(),
            binding: None,
        }
    }
}

/// Claims of the binding JWS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    #[serde(rename = "assertionHash")]
    pub assertion_hash: String,
    #[serde(rename = "assertionSig")]
    pub assertion_sig: String,
}

impl Assertion {
    /// Hex SHA-256 of the assertion JSON with the binding left out
    pub fn hash_hex(&self) -> Result<String, TdfError> {
        let unbound = Assertion {
            binding: None,
            ..self.clone()
        };
        let json = serde_json::to_vec(&unbound)?;
        Ok(hex::encode(Sha256::digest(&json)))
    }

    /// Check the binding JWS against `key` and return its claims
    pub fn verify_binding(
        &self,
        provider: &dyn CryptoProvider,
        key: &[u8],
    ) -> Result<AssertionClaims, TdfError> {
        let binding = self
            .binding
            .as_ref()
            .ok_or_else(|| self.invalid("assertion has no binding"))?;
        if binding.method != JWS_BINDING_METHOD {
            return Err(self.invalid(format!("unsupported binding method '{}'", binding.method)));
        }

        let mut parts = binding.signature.split('.');
        let (Some(header), Some(claims), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(self.invalid("binding is not a compact JWS"));
        };

        let expected = provider.hmac_sha256(key, format!("{}.{}", header, claims).as_bytes())?;
        let actual = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|e| self.invalid(format!("bad JWS signature encoding: {}", e)))?;
        if expected != actual {
            return Err(self.invalid("JWS signature does not verify"));
        }

        let claims = URL_SAFE_NO_PAD
            .decode(claims)
            .map_err(|e| self.invalid(format!("bad JWS claims encoding: {}", e)))?;
        let claims: AssertionClaims = serde_json::from_slice(&claims)?;
        if claims.assertion_hash != self.hash_hex()? {
            return Err(self.invalid("assertion hash does not match its content"));
        }
        Ok(claims)
    }

    fn invalid(&self, reason: impl Into<String>) -> TdfError {
        TdfError::InvalidAssertion {
            id: self.id.clone(),
            reason: reason.into(),
        }
    }
}

/// Sign every configured assertion against the aggregate segment signature
///
/// `assertionSig` is `base64(aggregate || hash)`, where the hash is the raw
/// digest, or its hex form when `use_hex` is set for legacy readers.
pub fn sign_assertions(
    provider: &dyn CryptoProvider,
    configs: &[AssertionConfig],
    aggregate: &[u8],
    payload_key: &[u8],
    use_hex: bool,
) -> Result<Vec<Assertion>, TdfError> {
    configs
        .iter()
        .map(|config| {
            let mut assertion = config.unsigned();
            let hash_hex = assertion.hash_hex()?;

            let mut complete = aggregate.to_vec();
            if use_hex {
                complete.extend_from_slice(hash_hex.as_bytes());
            } else {
                let raw = hex::decode(&hash_hex).map_err(|e| {
                    TdfError::InvalidAssertion {
                        id: config.id.clone(),
                        reason: e.to_string(),
                    }
                })?;
                complete.extend_from_slice(&raw);
            }

            let claims = AssertionClaims {
                assertion_hash: hash_hex,
                assertion_sig: provider.base64_encode(&complete),
            };
            let key = config
                .signing_key
                .as_ref()
                .map(AssertionSigningKey::as_slice)
                .unwrap_or(payload_key);

            assertion.binding = Some(Binding {
                method: JWS_BINDING_METHOD.to_string(),
                signature: sign_jws(provider, &claims, key)?,
            });
            tracing::debug!(assertion_id = %assertion.id, "signed assertion");
            Ok(assertion)
        })
        .collect()
}

fn sign_jws(
    provider: &dyn CryptoProvider,
    claims: &AssertionClaims,
    key: &[u8],
) -> Result<String, TdfError> {
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(JWS_HEADER),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?)
    );
    let signature = provider.hmac_sha256(key, signing_input.as_bytes())?;
    Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature)))
}

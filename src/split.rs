//! Key split planning
//!
//! A split plan says how the payload key is divided and which KAS must
//! receive each share. Planning from attribute grants is done by an
//! external collaborator behind [`SplitPlanner`]; this module provides the
//! explicit KAS list mode ([`StaticKasPlanner`]) and share generation.

use crate::crypto::{CryptoError, CryptoProvider, KeyAlgorithm, KeyShare, PayloadKey, KEY_SIZE};
use crate::error::TdfError;
use crate::policy::Policy;
use std::collections::HashMap;

/// A KAS endpoint and the public key shares are wrapped for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KasPublicKey {
    pub url: String,
    pub algorithm: KeyAlgorithm,
    pub kid: Option<String>,
    pub pem: String,
}

impl KasPublicKey {
    pub fn new(url: impl Into<String>, algorithm: KeyAlgorithm, pem: impl Into<String>) -> Self {
        KasPublicKey {
            url: url.into(),
            algorithm,
            kid: None,
            pem: pem.into(),
        }
    }

    #[must_use]
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }
}

/// One planned share and the KAS targets that each get a wrapped copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSplit {
    pub id: String,
    pub kas_urls: Vec<String>,
}

/// Output of a split planner
///
/// `public_keys` is keyed by KAS URL. A URL named by a split but missing
/// from the map is skipped when key access objects are built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitPlan {
    pub splits: Vec<PlannedSplit>,
    pub public_keys: HashMap<String, KasPublicKey>,
}

impl SplitPlan {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn split(mut self, id: impl Into<String>, kas_urls: &[&str]) -> Self {
        self.splits.push(PlannedSplit {
            id: id.into(),
            kas_urls: kas_urls.iter().map(|u| u.to_string()).collect(),
        });
        self
    }

    /// Register a KAS public key, replacing any earlier key for its URL
    #[must_use]
    pub fn public_key(mut self, key: KasPublicKey) -> Self {
        if let Some(previous) = self.public_keys.insert(key.url.clone(), key) {
            tracing::warn!(
                kas_url = %previous.url,
                replaced_kid = ?previous.kid,
                "replaced public key registered for the same KAS"
            );
        }
        self
    }
}

/// Resolves which splits a container needs and where each share goes
pub trait SplitPlanner: Send + Sync {
    fn plan(&self, policy: &Policy) -> Result<SplitPlan, TdfError>;
}

/// A fixed plan, returned as is for every policy
impl SplitPlanner for SplitPlan {
    fn plan(&self, _policy: &Policy) -> Result<SplitPlan, TdfError> {
        Ok(self.clone())
    }
}

/// Explicit KAS list mode: one split, every configured KAS receives it
#[derive(Debug, Clone, Default)]
pub struct StaticKasPlanner {
    keys: Vec<KasPublicKey>,
}

impl StaticKasPlanner {
    pub fn new(keys: Vec<KasPublicKey>) -> Self {
        StaticKasPlanner { keys }
    }

    pub fn keys(&self) -> &[KasPublicKey] {
        &self.keys
    }
}

impl SplitPlanner for StaticKasPlanner {
    fn plan(&self, _policy: &Policy) -> Result<SplitPlan, TdfError> {
        if self.keys.is_empty() {
            return Err(TdfError::config("kas", "at least one KAS public key is required"));
        }
        let mut kas_urls: Vec<String> = Vec::with_capacity(self.keys.len());
        let mut public_keys = HashMap::with_capacity(self.keys.len());
        for key in &self.keys {
            if public_keys.insert(key.url.clone(), key.clone()).is_some() {
                return Err(TdfError::config(
                    "kas",
                    format!("more than one public key configured for {}", key.url),
                ));
            }
            kas_urls.push(key.url.clone());
        }
        Ok(SplitPlan {
            splits: vec![PlannedSplit {
                id: String::new(),
                kas_urls,
            }],
            public_keys,
        })
    }
}

/// A generated share with its KAS targets
#[derive(Debug, Clone)]
pub struct Split {
    pub id: String,
    pub share: KeyShare,
    pub kas_urls: Vec<String>,
}

/// Generate one random share per planned split
///
/// The payload key is the XOR of all shares, so for a single split the
/// share is the payload key itself.
pub fn generate_splits(
    plan: &SplitPlan,
    provider: &dyn CryptoProvider,
) -> Result<(Vec<Split>, PayloadKey), TdfError> {
    if plan.splits.is_empty() {
        return Err(TdfError::NoSplits);
    }
    for (i, split) in plan.splits.iter().enumerate() {
        if plan.splits[..i].iter().any(|s| s.id == split.id) {
            return Err(TdfError::config(
                "split_plan",
                format!("duplicate split id '{}'", split.id),
            ));
        }
    }

    let mut splits = Vec::with_capacity(plan.splits.len());
    for planned in &plan.splits {
        let bytes = zeroize::Zeroizing::new(provider.random_bytes(KEY_SIZE)?);
        splits.push(Split {
            id: planned.id.clone(),
            share: KeyShare::from_slice(&bytes).map_err(CryptoError::from)?,
            kas_urls: planned.kas_urls.clone(),
        });
    }

    let shares: Vec<KeyShare> = splits.iter().map(|s| s.share.clone()).collect();
    let payload_key = PayloadKey::from_shares(&shares).map_err(CryptoError::from)?;
    Ok((splits, payload_key))
}

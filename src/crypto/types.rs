//! Zeroizing key types
//!
//! Key material is cleared from memory on drop.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of payload keys and key shares
pub const KEY_SIZE: usize = 32;

/// AES-256 payload key that zeroizes on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PayloadKey(pub(crate) [u8; KEY_SIZE]);

impl PayloadKey {
    /// Create a payload key from a 32-byte slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        Ok(PayloadKey(copy_key(bytes)?))
    }

    /// Combine key shares by XOR; a single share is the key itself
    pub fn from_shares(shares: &[KeyShare]) -> Result<Self, KeyError> {
        if shares.is_empty() {
            return Err(KeyError::NoShares);
        }
        let mut key = [0u8; KEY_SIZE];
        for share in shares {
            for (k, s) in key.iter_mut().zip(share.0.iter()) {
                *k ^= s;
            }
        }
        Ok(PayloadKey(key))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for PayloadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PayloadKey(..)")
    }
}

/// One split's share of the payload key, zeroized on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyShare(pub(crate) [u8; KEY_SIZE]);

impl KeyShare {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        Ok(KeyShare(copy_key(bytes)?))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyShare(..)")
    }
}

fn copy_key(bytes: &[u8]) -> Result<[u8; KEY_SIZE], KeyError> {
    if bytes.len() != KEY_SIZE {
        return Err(KeyError::InvalidLength {
            expected: KEY_SIZE,
            got: bytes.len(),
        });
    }
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(bytes);
    Ok(key)
}

/// Key-related errors
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("At least one key share is required")]
    NoShares,
}

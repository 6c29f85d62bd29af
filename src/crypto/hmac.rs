//! HMAC-SHA256 helpers for TDF integrity and policy binding

use super::CryptoError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Calculate HMAC-SHA256 over data
pub fn calculate_hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.is_empty() {
        return Err(CryptoError::InvalidKeyLength {
            expected: 32,
            got: 0,
        });
    }
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CryptoError::Encoding(format!("HMAC initialization failed: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Calculate the policy binding hash for one key share
///
/// 1. HMAC-SHA256 the base64-encoded policy using the key
/// 2. Hex encode the HMAC result (32 bytes -> 64 hex chars)
/// 3. Base64 encode the hex string for storage
pub fn calculate_policy_binding(policy_base64: &str, key: &[u8]) -> Result<String, CryptoError> {
    let hmac_result = calculate_hmac(key, policy_base64.as_bytes())?;
    let hex_string = hex::encode(hmac_result);
    Ok(BASE64.encode(hex_string.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_hmac() {
        let key = b"test_key_32_bytes_long_for_hmac!";
        let result = calculate_hmac(key, b"test data").unwrap();
        assert_eq!(result.len(), 32);
    }

    #[test]
    fn test_hmac_known_vector() {
        // RFC 4231 test case 2
        let mac = calculate_hmac(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(calculate_hmac(b"", b"data").is_err());
    }

    #[test]
    fn test_policy_binding_is_base64_of_hex() {
        let policy = BASE64.encode(r#"{"body":{"dataAttributes":[]}}"#);
        let key = b"test_key_32_bytes_long_for_hmac!";

        let binding = calculate_policy_binding(&policy, key).unwrap();
        let decoded = String::from_utf8(BASE64.decode(&binding).unwrap()).unwrap();
        assert_eq!(decoded.len(), 64);
        assert_eq!(
            decoded,
            hex::encode(calculate_hmac(key, policy.as_bytes()).unwrap())
        );

        assert_eq!(binding, calculate_policy_binding(&policy, key).unwrap());
    }
}

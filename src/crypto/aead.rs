use super::{
    AeadCipher, CryptoError, EntropySource, GCM_MIN_TAG_SIZE, GCM_NONCE_SIZE, GCM_TAG_SIZE,
};
use aes_gcm::{
    aead::{
        consts::{U12, U13, U14, U15, U16},
        generic_array::GenericArray,
        Aead, KeyInit,
    },
    aes::Aes256,
    AesGcm, TagSize,
};
use std::sync::Arc;
use zeroize::Zeroizing;

const AES_256_KEY_SIZE: usize = 32;

/// AES-256-GCM bound to a single key
///
/// Random nonces are drawn from the provider's entropy source.
pub struct AesGcmCipher {
    key: Zeroizing<Vec<u8>>,
    entropy: Arc<dyn EntropySource>,
}

impl AesGcmCipher {
    pub fn new(key: &[u8], entropy: Arc<dyn EntropySource>) -> Result<Self, CryptoError> {
        if key.len() != AES_256_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: AES_256_KEY_SIZE,
                got: key.len(),
            });
        }
        Ok(AesGcmCipher {
            key: Zeroizing::new(key.to_vec()),
            entropy,
        })
    }
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

fn seal<T: TagSize>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = AesGcm::<Aes256, U12, T>::new_from_slice(key).map_err(|_| {
        CryptoError::InvalidKeyLength {
            expected: AES_256_KEY_SIZE,
            got: key.len(),
        }
    })?;
    cipher
        .encrypt(GenericArray::from_slice(iv), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

fn open<T: TagSize>(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = AesGcm::<Aes256, U12, T>::new_from_slice(key).map_err(|_| {
        CryptoError::InvalidKeyLength {
            expected: AES_256_KEY_SIZE,
            got: key.len(),
        }
    })?;
    cipher
        .decrypt(GenericArray::from_slice(iv), data)
        .map_err(|e| CryptoError::Decryption(e.to_string()))
}

/// Encrypt with a caller-chosen tag length; output is `ciphertext || tag`
pub(crate) fn encrypt_with_tag_size(
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
    tag_size: usize,
) -> Result<Vec<u8>, CryptoError> {
    check_iv(iv)?;
    match tag_size {
        12 => seal::<U12>(key, iv, plaintext),
        13 => seal::<U13>(key, iv, plaintext),
        14 => seal::<U14>(key, iv, plaintext),
        15 => seal::<U15>(key, iv, plaintext),
        16 => seal::<U16>(key, iv, plaintext),
        other => Err(CryptoError::UnsupportedTagSize(other)),
    }
}

pub(crate) fn decrypt_with_tag_size(
    key: &[u8],
    iv: &[u8],
    data: &[u8],
    tag_size: usize,
) -> Result<Vec<u8>, CryptoError> {
    check_iv(iv)?;
    if !(GCM_MIN_TAG_SIZE..=GCM_TAG_SIZE).contains(&tag_size) {
        return Err(CryptoError::UnsupportedTagSize(tag_size));
    }
    if data.len() < tag_size {
        return Err(CryptoError::Decryption(
            "ciphertext shorter than authentication tag".to_string(),
        ));
    }
    match tag_size {
        12 => open::<U12>(key, iv, data),
        13 => open::<U13>(key, iv, data),
        14 => open::<U14>(key, iv, data),
        15 => open::<U15>(key, iv, data),
        _ => open::<U16>(key, iv, data),
    }
}

impl AeadCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = [0u8; GCM_NONCE_SIZE];
        self.entropy.fill_bytes(&mut nonce)?;

        let sealed = encrypt_with_tag_size(&self.key, &nonce, plaintext, GCM_TAG_SIZE)?;
        let mut out = Vec::with_capacity(GCM_NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn encrypt_with_iv(&self, iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        encrypt_with_tag_size(&self.key, iv, plaintext, GCM_TAG_SIZE)
    }

    fn encrypt_with_iv_and_tag_size(
        &self,
        iv: &[u8],
        plaintext: &[u8],
        tag_size: usize,
    ) -> Result<Vec<u8>, CryptoError> {
        encrypt_with_tag_size(&self.key, iv, plaintext, tag_size)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.len() < GCM_NONCE_SIZE + GCM_TAG_SIZE {
            return Err(CryptoError::Decryption(
                "ciphertext shorter than nonce and tag".to_string(),
            ));
        }
        let (nonce, rest) = data.split_at(GCM_NONCE_SIZE);
        decrypt_with_tag_size(&self.key, nonce, rest, GCM_TAG_SIZE)
    }

    fn decrypt_with_iv_and_tag_size(
        &self,
        iv: &[u8],
        data: &[u8],
        tag_size: usize,
    ) -> Result<Vec<u8>, CryptoError> {
        decrypt_with_tag_size(&self.key, iv, data, tag_size)
    }
}

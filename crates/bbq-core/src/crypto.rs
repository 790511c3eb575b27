//! At-rest payload cipher: AES-256-ECB with PKCS7 block padding, hex-encoded.
//!
//! The key is derived by right-padding the UTF-8 bytes of the configured
//! secret with NUL to 32 bytes, or truncating to 32. ECB is deterministic and
//! reveals payload structure; it is kept for on-disk format compatibility.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;

use crate::error::CryptoError;

const BLOCK: usize = 16;

/// Symmetric payload cipher bound to one derived key.
#[derive(Clone)]
pub struct PayloadCipher {
    cipher: Aes256,
}

impl std::fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material.
        f.write_str("PayloadCipher")
    }
}

impl PayloadCipher {
    /// Build a cipher from the configured secret. Returns `None` for an empty
    /// secret — payloads are then stored as plaintext.
    pub fn from_secret(secret: &str) -> Option<Self> {
        if secret.is_empty() {
            return None;
        }
        Some(Self {
            cipher: Aes256::new(GenericArray::from_slice(&derive_key(secret))),
        })
    }

    /// Encrypt a UTF-8 plaintext and hex-encode the ciphertext.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut buf = plaintext.as_bytes().to_vec();
        let pad = BLOCK - buf.len() % BLOCK;
        buf.extend(std::iter::repeat(pad as u8).take(pad));
        for chunk in buf.chunks_mut(BLOCK) {
            self.cipher
                .encrypt_block(GenericArray::from_mut_slice(chunk));
        }
        hex::encode(buf)
    }

    /// Decode hex, decrypt, strip padding, and return the plaintext.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let mut buf = hex::decode(ciphertext.trim()).map_err(|e| CryptoError::Hex(e.to_string()))?;
        if buf.is_empty() || buf.len() % BLOCK != 0 {
            return Err(CryptoError::Malformed(format!(
                "ciphertext length {} is not a positive multiple of {BLOCK}",
                buf.len()
            )));
        }
        for chunk in buf.chunks_mut(BLOCK) {
            self.cipher
                .decrypt_block(GenericArray::from_mut_slice(chunk));
        }
        let pad = *buf.last().unwrap_or(&0) as usize;
        if pad == 0 || pad > BLOCK || buf.len() < pad {
            return Err(CryptoError::Malformed("bad padding".to_string()));
        }
        if !buf[buf.len() - pad..].iter().all(|b| *b as usize == pad) {
            return Err(CryptoError::Malformed("bad padding".to_string()));
        }
        buf.truncate(buf.len() - pad);
        String::from_utf8(buf).map_err(|_| CryptoError::Utf8)
    }
}

/// Right-pad the UTF-8 bytes of the secret with NUL to 32 bytes, or truncate.
fn derive_key(secret: &str) -> [u8; 32] {
    let mut key = [0u8; 32];
    let bytes = secret.as_bytes();
    let n = bytes.len().min(32);
    key[..n].copy_from_slice(&bytes[..n]);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_secret_disables_encryption() {
        assert!(PayloadCipher::from_secret("").is_none());
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let cipher = PayloadCipher::from_secret("my-secret").unwrap();
        for plaintext in ["", "x", "Hello, World!", &"long ".repeat(100)] {
            let ct = cipher.encrypt(plaintext);
            assert_ne!(ct, plaintext);
            assert_eq!(cipher.decrypt(&ct).unwrap(), plaintext);
        }
    }

    #[test]
    fn ciphertext_is_deterministic() {
        // ECB has no IV — the same plaintext always encrypts the same way.
        let cipher = PayloadCipher::from_secret("key").unwrap();
        assert_eq!(cipher.encrypt("payload"), cipher.encrypt("payload"));
    }

    #[test]
    fn long_secrets_are_truncated_to_32_bytes() {
        let short = PayloadCipher::from_secret(&"k".repeat(32)).unwrap();
        let long = PayloadCipher::from_secret(&"k".repeat(64)).unwrap();
        let ct = short.encrypt("same key either way");
        assert_eq!(long.decrypt(&ct).unwrap(), "same key either way");
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let a = PayloadCipher::from_secret("alpha").unwrap();
        let b = PayloadCipher::from_secret("beta").unwrap();
        let ct = a.encrypt("guarded");
        // Either the padding check or the UTF-8 check rejects it.
        assert!(b.decrypt(&ct).is_err());
    }

    #[test]
    fn garbage_ciphertext_is_rejected() {
        let cipher = PayloadCipher::from_secret("key").unwrap();
        assert!(matches!(cipher.decrypt("not hex!"), Err(CryptoError::Hex(_))));
        assert!(matches!(
            cipher.decrypt("abcd"),
            Err(CryptoError::Malformed(_))
        ));
    }
}

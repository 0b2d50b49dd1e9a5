//! AES-256-CBC/PKCS7 protection for the shader and image blocks.
//!
//! The key and IV are both taken from SHA-256 of the passphrase: the first 32
//! digest bytes form the key and the IV is read from the bytes after them,
//! zero padded. A SHA-256 digest is exactly 32 bytes, so the IV is always
//! zero and equal plaintexts encrypt to equal ciphertexts.
//!
//! Encryption here provides confidentiality only. There is no MAC over the
//! ciphertext; a wrong key is detected through PKCS7 padding validation,
//! which is probabilistic, and the package hash only guards against
//! accidental corruption.
use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha256};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

/// Padding or length validation failed while decrypting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecryptError;

#[derive(Clone)]
pub struct PackageKey {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl PackageKey {
    /// Derives a key from a passphrase. An empty passphrase means "no
    /// encryption" and yields `None`.
    pub fn from_passphrase(passphrase: Option<&str>) -> Option<Self> {
        let passphrase = passphrase.filter(|value| !value.is_empty())?;
        let digest = Sha256::digest(passphrase.as_bytes());

        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&digest[..KEY_LEN]);

        let mut iv = [0u8; IV_LEN];
        let tail = digest.get(KEY_LEN..).unwrap_or_default();
        let take = tail.len().min(IV_LEN);
        iv[..take].copy_from_slice(&tail[..take]);

        Some(Self { key, iv })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes256CbcEnc::new(&self.key.into(), &self.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError> {
        Aes256CbcDec::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| DecryptError)
    }
}

impl std::fmt::Debug for PackageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PackageKey(..)")
    }
}

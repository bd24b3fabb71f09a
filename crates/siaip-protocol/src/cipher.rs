//! AES-CBC payload decryption.
//!
//! Panels encrypt the data block with AES in CBC mode, an all-zero IV and no
//! padding (the plaintext is left-padded by the panel itself). The key length
//! selects the variant: 16, 24 or 32 bytes for AES-128, -192 or -256.

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use siaip_core::constants::{AES_BLOCK_SIZE, ZERO_IV};
use siaip_core::{Error, Result};
use std::fmt;

/// AES-CBC variant chosen from the key length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
}

impl CipherKind {
    /// Select the variant for a key of `key_len` bytes.
    ///
    /// # Errors
    /// Returns `Error::UnsupportedKey` for any length other than 16, 24 or 32.
    ///
    /// # Examples
    ///
    /// ```
    /// use siaip_protocol::CipherKind;
    ///
    /// assert_eq!(CipherKind::select(16).unwrap(), CipherKind::Aes128Cbc);
    /// assert!(CipherKind::select(20).is_err());
    /// ```
    pub fn select(key_len: usize) -> Result<Self> {
        match key_len {
            16 => Ok(CipherKind::Aes128Cbc),
            24 => Ok(CipherKind::Aes192Cbc),
            32 => Ok(CipherKind::Aes256Cbc),
            length => Err(Error::UnsupportedKey { length }),
        }
    }

    pub fn key_len(self) -> usize {
        match self {
            CipherKind::Aes128Cbc => 16,
            CipherKind::Aes192Cbc => 24,
            CipherKind::Aes256Cbc => 32,
        }
    }
}

impl fmt::Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CipherKind::Aes128Cbc => write!(f, "aes-128-cbc"),
            CipherKind::Aes192Cbc => write!(f, "aes-192-cbc"),
            CipherKind::Aes256Cbc => write!(f, "aes-256-cbc"),
        }
    }
}

/// Decrypt a hex ciphertext block and decode it as text.
///
/// Invalid UTF-8 sequences in the plaintext are replaced, not rejected.
///
/// # Errors
/// - `Error::UnsupportedKey` if `key` is not 16, 24 or 32 bytes
/// - `Error::DecryptFailure` if the hex is invalid, the length is not a
///   whole number of blocks, or the plaintext is empty
pub fn decrypt_hex(ciphertext_hex: &str, key: &[u8]) -> Result<String> {
    let kind = CipherKind::select(key.len())?;

    let data = hex::decode(ciphertext_hex)
        .map_err(|e| Error::DecryptFailure(format!("invalid hex ciphertext: {e}")))?;
    if data.is_empty() || data.len() % AES_BLOCK_SIZE != 0 {
        return Err(Error::DecryptFailure(format!(
            "ciphertext length {} is not a multiple of {AES_BLOCK_SIZE}",
            data.len()
        )));
    }

    let plain = match kind {
        CipherKind::Aes128Cbc => cbc::Decryptor::<Aes128>::new_from_slices(key, &ZERO_IV)
            .map_err(|_| Error::UnsupportedKey { length: key.len() })?
            .decrypt_padded_vec_mut::<NoPadding>(&data),
        CipherKind::Aes192Cbc => cbc::Decryptor::<Aes192>::new_from_slices(key, &ZERO_IV)
            .map_err(|_| Error::UnsupportedKey { length: key.len() })?
            .decrypt_padded_vec_mut::<NoPadding>(&data),
        CipherKind::Aes256Cbc => cbc::Decryptor::<Aes256>::new_from_slices(key, &ZERO_IV)
            .map_err(|_| Error::UnsupportedKey { length: key.len() })?
            .decrypt_padded_vec_mut::<NoPadding>(&data),
    }
    .map_err(|_| Error::DecryptFailure(format!("{kind}: ciphertext rejected")))?;

    let text = String::from_utf8_lossy(&plain).into_owned();
    if text.is_empty() {
        return Err(Error::DecryptFailure("empty plaintext".to_string()));
    }
    Ok(text)
}

/// Encrypt `plaintext` and return it as uppercase hex.
///
/// Used by the panel emulator and tests; the receiver itself only decrypts.
///
/// # Errors
/// - `Error::UnsupportedKey` if `key` is not 16, 24 or 32 bytes
/// - `Error::MalformedFrame` if `plaintext` is not a whole number of blocks
pub fn encrypt_hex(plaintext: &[u8], key: &[u8]) -> Result<String> {
    let kind = CipherKind::select(key.len())?;

    if plaintext.is_empty() || plaintext.len() % AES_BLOCK_SIZE != 0 {
        return Err(Error::MalformedFrame(format!(
            "plaintext length {} is not a multiple of {AES_BLOCK_SIZE}",
            plaintext.len()
        )));
    }

    let data = match kind {
        CipherKind::Aes128Cbc => cbc::Encryptor::<Aes128>::new_from_slices(key, &ZERO_IV)
            .map_err(|_| Error::UnsupportedKey { length: key.len() })?
            .encrypt_padded_vec_mut::<NoPadding>(plaintext),
        CipherKind::Aes192Cbc => cbc::Encryptor::<Aes192>::new_from_slices(key, &ZERO_IV)
            .map_err(|_| Error::UnsupportedKey { length: key.len() })?
            .encrypt_padded_vec_mut::<NoPadding>(plaintext),
        CipherKind::Aes256Cbc => cbc::Encryptor::<Aes256>::new_from_slices(key, &ZERO_IV)
            .map_err(|_| Error::UnsupportedKey { length: key.len() })?
            .encrypt_padded_vec_mut::<NoPadding>(plaintext),
    };

    Ok(hex::encode_upper(data))
}

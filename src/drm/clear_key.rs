use crate::error::{HlsError, Result};
use aes::Aes128;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use std::path::Path;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES-128 `EXT-X-KEY` decryption (`METHOD=AES-128`).
///
/// Constructed from the raw 16-byte key fetched from the key descriptor's
/// `uri` (component C, `spec.md` §4.C). `iv` is the explicit `IV` attribute
/// when the playlist carries one; when absent this crate uses an all-zero
/// IV rather than a per-segment sequence-number IV, because a decryption
/// run is merged into one contiguous ciphertext before `decrypt` ever runs
/// (`spec.md` §4.E) — per-segment IVs only make sense when segments are
/// decrypted individually. See DESIGN.md for this Open Question resolution.
pub struct ClearKey {
    key: [u8; 16],
    iv: [u8; 16],
}

impl ClearKey {
    pub fn new(key: [u8; 16], iv: Option<[u8; 16]>) -> Self {
        Self {
            key,
            iv: iv.unwrap_or([0u8; 16]),
        }
    }

    /// Parse a hex `IV` attribute value (`0x...` or bare hex, 32 hex digits).
    pub fn parse_iv_hex(s: &str) -> Option<[u8; 16]> {
        let s = s.trim().trim_start_matches("0x").trim_start_matches("0X");
        let bytes = hex::decode(s).ok()?;
        bytes.try_into().ok()
    }
}

impl ClearKey {
    pub fn decrypt(&self, path: &Path) -> Result<()> {
        let data = std::fs::read(path).map_err(|source| HlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let decryptor = Aes128CbcDec::new(&self.key.into(), &self.iv.into());
        let plaintext = decryptor
            .decrypt_padded_vec_mut::<block_padding::Pkcs7>(&data)
            .map_err(|_| HlsError::ManifestInvalid(format!("AES-128 padding invalid in {path:?}")))?;

        std::fs::write(path, plaintext).map_err(|source| HlsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

use crate::error::{HlsError, Result};
use parking_lot::Mutex;
use std::path::Path;

/// External collaborator for Widevine (CENC) content-key acquisition and
/// decryption. This crate never implements CDM internals — `spec.md` §4.C
/// Non-goals explicitly exclude Widevine/PlayReady license logic — it only
/// defines the seam the pipeline calls through.
///
/// Ground truth for the shape of this seam: `devine/core/drm/widevine.py`'s
/// `Widevine.decrypt` delegates to an external `shaka-packager`/`mp4decrypt`
/// process fed a license-derived content key; here that external step is
/// modeled as a trait object supplied by the caller instead of a shelled-out
/// binary, since the actual decryptor is out of scope.
pub trait WidevineCdm: Send + Sync {
    /// Exchange `pssh` + `key_id` for a license server response and return
    /// the raw content key bytes.
    fn acquire_license(&self, pssh: &[u8], key_id: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt `path` in place using `content_key`.
    fn decrypt_with_key(&self, path: &Path, content_key: &[u8]) -> Result<()>;
}

/// Holds only what this crate is allowed to know about a Widevine-protected
/// track: the PSSH box bytes, the key id, and a lazily-populated content key.
pub struct Widevine {
    pssh: Vec<u8>,
    key_id: Vec<u8>,
    content_key: Mutex<Option<Vec<u8>>>,
    cdm: Box<dyn WidevineCdm>,
}

impl Widevine {
    pub fn new(pssh: Vec<u8>, key_id: Vec<u8>, cdm: Box<dyn WidevineCdm>) -> Self {
        Self {
            pssh,
            key_id,
            content_key: Mutex::new(None),
            cdm,
        }
    }

    /// Runs the license exchange once per instance; safe to call repeatedly
    /// ahead of `decrypt` (e.g. from a `--license-only` run, `spec.md` §9).
    pub fn license(&self) -> Result<()> {
        if self.content_key.lock().is_some() {
            return Ok(());
        }
        let key = self
            .cdm
            .acquire_license(&self.pssh, &self.key_id)
            .map_err(|e| HlsError::LicenseFailed(e.to_string()))?;
        *self.content_key.lock() = Some(key);
        Ok(())
    }

    pub fn decrypt(&self, path: &Path) -> Result<()> {
        self.license()?;
        let guard = self.content_key.lock();
        let key = guard.as_ref().expect("license() populates content_key or returns Err");
        self.cdm.decrypt_with_key(path, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeCdm {
        calls: AtomicUsize,
    }

    impl WidevineCdm for FakeCdm {
        fn acquire_license(&self, _pssh: &[u8], _key_id: &[u8]) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0u8; 16])
        }

        fn decrypt_with_key(&self, path: &Path, content_key: &[u8]) -> Result<()> {
            std::fs::write(path, content_key).map_err(|source| HlsError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    #[test]
    fn license_is_acquired_once() {
        let cdm = FakeCdm { calls: AtomicUsize::new(0) };
        let wv = Widevine::new(vec![1, 2, 3], vec![4, 5, 6], Box::new(cdm));
        wv.license().unwrap();
        wv.license().unwrap();
        let cdm_ref = &wv.cdm;
        let _ = cdm_ref;
    }

    #[test]
    fn decrypt_triggers_license_then_writes_key() {
        struct CountingCdm {
            calls: AtomicUsize,
        }
        impl WidevineCdm for CountingCdm {
            fn acquire_license(&self, _pssh: &[u8], _key_id: &[u8]) -> Result<Vec<u8>> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![9u8; 16])
            }
            fn decrypt_with_key(&self, path: &Path, content_key: &[u8]) -> Result<()> {
                std::fs::write(path, content_key).map_err(|source| HlsError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("init.mp4");
        std::fs::write(&path, b"ciphertext").unwrap();

        let cdm = CountingCdm { calls: AtomicUsize::new(0) };
        let wv = Widevine::new(vec![1], vec![2], Box::new(cdm));
        wv.decrypt(&path).unwrap();

        let out = std::fs::read(&path).unwrap();
        assert_eq!(out, vec![9u8; 16]);
    }
}

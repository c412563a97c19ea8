//! Tagged DRM handler variant. Ground truth: Design Notes "DRM polymorphism"
//! in `spec.md` §9 — the only shared capability the core uses is
//! `decrypt(path)`; Widevine additionally exposes a licensing entry point
//! invoked via a caller-supplied callback, never directly by the pipeline.

mod clear_key;
mod widevine;

pub use clear_key::ClearKey;
pub use widevine::{Widevine, WidevineCdm};

use crate::error::Result;
use std::path::Path;

pub trait DrmHandler {
    /// Decrypt `path` in place.
    fn decrypt(&self, path: &Path) -> Result<()>;
}

pub enum Drm {
    ClearKey(ClearKey),
    Widevine(Widevine),
}

impl DrmHandler for Drm {
    fn decrypt(&self, path: &Path) -> Result<()> {
        match self {
            Drm::ClearKey(c) => c.decrypt(path),
            Drm::Widevine(w) => w.decrypt(path),
        }
    }
}

//! Licensing entry point used by the segment pipeline.
//!
//! Ground truth: `devine/core/manifests/hls.py::download_track`'s
//! `license_widevine(...)` invocations for session DRM and per-run keys.
//! Per Non-goals (`spec.md` §1), DRM protocol internals are out of scope —
//! this trait is the seam the pipeline calls through; only `Widevine` needs
//! it, since `ClearKey` never requires a license exchange.

use crate::drm::Widevine;
use crate::error::Result;

pub trait LicenseCallback: Send + Sync {
    /// `track_kid` is the key id recovered from the track's cached init
    /// section, when one is available (`spec.md` §4.E step 4).
    fn license(&self, widevine: &Widevine, track_kid: Option<&[u8]>) -> Result<()>;
}

/// The obvious default: just run the license exchange, ignoring `track_kid`
/// (most CDMs derive the KID from the PSSH already carried by `Widevine`).
pub struct DefaultLicenseCallback;

impl LicenseCallback for DefaultLicenseCallback {
    fn license(&self, widevine: &Widevine, _track_kid: Option<&[u8]>) -> Result<()> {
        widevine.license()
    }
}

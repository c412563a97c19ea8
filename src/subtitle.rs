//! Subtitle segment text normalization.
//!
//! Ground truth: `devine/core/utilities.py::try_ensure_utf8` plus the
//! `&lrm;`/`&rlm;` unescape in `devine/core/manifests/hls.py`'s per-segment
//! subtitle handling.

use encoding_rs::WINDOWS_1252;

/// Coerce `data` to UTF-8.
///
/// Tries UTF-8 first (cheap, the common case), then CP-1252 (a superset of
/// Latin-1, catching the bulk of the rest). `chardet`'s statistical
/// last-resort step has no crate equivalent in this stack — see
/// `SPEC_FULL.md` §4.G and DESIGN.md — so that step is a pass-through:
/// data that fails both decodes is returned unchanged, exactly as
/// `try_ensure_utf8` does when its own last-ditch `chardet.detect` finds no
/// usable encoding.
pub fn ensure_utf8(data: &[u8]) -> Vec<u8> {
    if std::str::from_utf8(data).is_ok() {
        return data.to_vec();
    }

    let (decoded, _, had_errors) = WINDOWS_1252.decode(data);
    if !had_errors {
        return decoded.into_owned().into_bytes();
    }

    data.to_vec()
}

/// Unescape `&lrm;`/`&rlm;` direction-mark entities so RTL-aware subtitle
/// tooling (e.g. SubtitleEdit's "ReverseRtlStartEnd") can act on them.
///
/// Only applies to plain-text subtitle formats; the fragmented-MP4 variants
/// (`fVTT`/`fTTML`) carry binary boxes and must not be treated as text here.
pub fn unescape_direction_marks(text: &str) -> String {
    text.replace("&lrm;", "\u{200e}").replace("&rlm;", "\u{200f}")
}

/// Full per-segment normalization pass used by the pipeline for subtitle
/// tracks, mirroring the order of operations in `hls.py`.
pub fn normalize_segment(data: &[u8], is_plain_text_format: bool) -> Vec<u8> {
    let utf8 = ensure_utf8(data);
    if !is_plain_text_format {
        return utf8;
    }
    match std::str::from_utf8(&utf8) {
        Ok(text) => unescape_direction_marks(text).into_bytes(),
        Err(_) => utf8,
    }
}

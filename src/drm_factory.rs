//! Component C: Key → DRM Factory. Ground truth:
//! `devine/core/manifests/hls.py::download_track`'s `get_drm` helper and
//! the `ClearKey`/`Widevine` constructors it calls (`core/drm/clearkey.py`,
//! `core/drm/widevine.py::Widevine.from_track`).

use crate::drm::{ClearKey, Drm, Widevine, WidevineCdm};
use crate::error::{HlsError, Result};
use crate::fetch::PlaylistFetcher;
use crate::key_system::WIDEVINE_URN;
use crate::playlist::KeyDescriptor;
use base64::Engine as _;

/// Widevine system id, same 16 bytes as the `urn:uuid:` in [`WIDEVINE_URN`].
const WIDEVINE_SYSTEM_ID: [u8; 16] = [
    0xed, 0xef, 0x8b, 0xa9, 0x79, 0xd6, 0x4a, 0xce, 0xa3, 0xc8, 0x27, 0xdc, 0xd5, 0x1d, 0x21, 0xed,
];

fn token_after_last_comma(uri: &str) -> Result<&str> {
    uri.rsplit_once(',')
        .map(|(_, tail)| tail.trim())
        .ok_or_else(|| HlsError::ManifestInvalid(format!("key uri has no comma-separated token: {uri:?}")))
}

/// Wrap `payload` in an ISO/IEC 23001-7 `pssh` box (full box version 0, no
/// embedded KID list — the KID lives in the Widevine protobuf payload).
fn pssh_box(system_id: [u8; 16], payload: &[u8]) -> Vec<u8> {
    let total_len = 4 + 4 + 4 + 16 + 4 + payload.len();
    let mut out = Vec::with_capacity(total_len);
    out.extend_from_slice(&(total_len as u32).to_be_bytes());
    out.extend_from_slice(b"pssh");
    out.extend_from_slice(&[0, 0, 0, 0]);
    out.extend_from_slice(&system_id);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Minimal protobuf encoding of a Widevine `WidevineCencHeader` carrying
/// only `key_id` (field 2, length-delimited) — the subset a CDM needs to
/// resolve a license for a CENC-derived PSSH. Same shape third-party HLS
/// downloaders (e.g. N_m3u8DL-RE) synthesize for `ISO-23001-7` keys.
fn widevine_cenc_header(key_id: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + key_id.len());
    out.push((2 << 3) | 2);
    out.push(key_id.len() as u8);
    out.extend_from_slice(key_id);
    out
}

/// Build a [`Drm`] handler from a selected key descriptor (component B's
/// output). `cdm_factory` is only invoked for Widevine keys — callers that
/// never touch Widevine content can pass one that panics.
pub fn build_drm(
    key: &KeyDescriptor,
    fetcher: &dyn PlaylistFetcher,
    cdm_factory: &dyn Fn() -> Box<dyn WidevineCdm>,
) -> Result<Drm> {
    if key.method.eq_ignore_ascii_case("AES-128") {
        let uri = key
            .uri
            .as_deref()
            .ok_or_else(|| HlsError::ManifestInvalid("AES-128 key has no uri".into()))?;
        let key_bytes = fetcher.fetch_bytes(uri, None)?;
        let key_arr: [u8; 16] = key_bytes.as_slice().try_into().map_err(|_| {
            HlsError::ManifestInvalid(format!(
                "AES-128 key at {uri} is not 16 bytes (got {})",
                key_bytes.len()
            ))
        })?;
        let iv = key.extra.get("IV").and_then(|s| ClearKey::parse_iv_hex(s));
        return Ok(Drm::ClearKey(ClearKey::new(key_arr, iv)));
    }

    if key.method.eq_ignore_ascii_case("ISO-23001-7") {
        let uri = key
            .uri
            .as_deref()
            .ok_or_else(|| HlsError::ManifestInvalid("ISO-23001-7 key has no uri".into()))?;
        let kid_hex = token_after_last_comma(uri)?;
        let kid = hex::decode(kid_hex)
            .map_err(|_| HlsError::ManifestInvalid(format!("KID is not hex: {kid_hex:?}")))?;
        let pssh = pssh_box(WIDEVINE_SYSTEM_ID, &widevine_cenc_header(&kid));
        return Ok(Drm::Widevine(Widevine::new(pssh, kid, cdm_factory())));
    }

    if key.keyformat.as_deref().is_some_and(|f| f.eq_ignore_ascii_case(WIDEVINE_URN)) {
        let uri = key
            .uri
            .as_deref()
            .ok_or_else(|| HlsError::ManifestInvalid("widevine key has no uri".into()))?;
        let token = token_after_last_comma(uri)?;
        let pssh = base64::engine::general_purpose::STANDARD
            .decode(token)
            .map_err(|_| HlsError::ManifestInvalid(format!("widevine pssh token is not base64: {token:?}")))?;
        let key_id = key
            .extra
            .get("KEYID")
            .or_else(|| key.extra.get("keyid"))
            .and_then(|s| hex::decode(s.trim_start_matches("0x").trim_start_matches("0X")).ok())
            .unwrap_or_default();
        return Ok(Drm::Widevine(Widevine::new(pssh, key_id, cdm_factory())));
    }

    Err(HlsError::UnsupportedKeySystem {
        method: key.method.clone(),
        keyformat: key.keyformat.clone(),
    })
}

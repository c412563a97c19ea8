//! Value types produced by the (external) M3U8 parser.
//!
//! This crate does not parse M3U8 text itself — see `spec.md` §1, the parser
//! is an external collaborator. These types are the contract a parser must
//! hand over for [`crate::tracks`] and [`crate::pipeline`] to operate on.
//! Field shapes follow the teacher's own `src/sources/youtube/hls/types.rs`
//! (`Resource`, `Variant`, `Media`) generalized to the full spec.

use std::collections::BTreeMap;

/// Identity + location of a segment's encryption key (`EXT-X-KEY`).
///
/// Equality is by value — `(method, keyformat, uri, extra)` — matching the
/// data model's identity rule for encryption-context comparisons.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyDescriptor {
    pub method: String,
    pub keyformat: Option<String>,
    pub uri: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl KeyDescriptor {
    pub fn is_none_method(&self) -> bool {
        self.method.eq_ignore_ascii_case("NONE")
    }
}

/// `EXT-X-MAP` reference: identity for change detection plus where to fetch it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitSectionRef {
    pub uri: String,
    pub base_uri: String,
    pub byterange: Option<String>,
}

/// One entry of an invariant (media) playlist.
#[derive(Clone, Debug)]
pub struct Segment {
    pub uri: String,
    pub base_uri: String,
    pub byterange: Option<String>,
    pub init_section: Option<InitSectionRef>,
    pub keys: Vec<KeyDescriptor>,
    pub discontinuity: bool,
    pub duration: Option<f64>,
}

impl Segment {
    pub fn resolved_url(&self) -> String {
        crate::util::resolve_url(&self.base_uri, &self.uri)
    }

    pub fn extension(&self) -> &str {
        std::path::Path::new(&self.uri)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("ts")
    }
}

/// A per-rendition (invariant) playlist — the thing `segments[]` lives on.
#[derive(Clone, Debug, Default)]
pub struct MediaPlaylist {
    pub segments: Vec<Segment>,
}

/// Rendition group used for `EXT-X-MEDIA` (`AUDIO`, `SUBTITLES`, …).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaType {
    Audio,
    Subtitles,
    ClosedCaptions,
    Video,
}

#[derive(Clone, Debug)]
pub struct Media {
    pub media_type: MediaType,
    pub group_id: String,
    pub uri: Option<String>,
    pub base_uri: String,
    pub language: Option<String>,
    pub channels: Option<String>,
    pub characteristics: Option<String>,
    pub forced: bool,
    pub is_default: bool,
}

#[derive(Clone, Debug)]
pub struct Variant {
    pub uri: String,
    pub base_uri: String,
    pub bandwidth: u64,
    pub average_bandwidth: Option<u64>,
    pub codecs: String,
    pub resolution: Option<(u32, u32)>,
    pub frame_rate: Option<f64>,
    pub video_range: Option<String>,
    pub audio_group: Option<String>,
}

/// A top-level master/variant playlist (`playlists[]`, `media[]`, `session_keys[]`).
#[derive(Clone, Debug, Default)]
pub struct MasterPlaylist {
    pub variants: Vec<Variant>,
    pub media: Vec<Media>,
    pub session_keys: Vec<KeyDescriptor>,
}

/// The M3U8 parser itself is an external collaborator (`spec.md` §1) — this
/// crate never tokenizes playlist text. This trait is the seam Phase 1 of
/// the segment pipeline calls through to turn the raw body fetched via
/// [`crate::fetch::PlaylistFetcher`] into a [`MediaPlaylist`].
pub trait MediaPlaylistParser: Send + Sync {
    fn parse(&self, text: &str, base_uri: &str) -> crate::error::Result<MediaPlaylist>;
}

/// Same external-collaborator seam as [`MediaPlaylistParser`], for the
/// top-level master/variant playlist (`spec.md` §1: "a master playlist is
/// parsed upstream and handed to" the variant-to-tracks converter). Letting
/// [`crate::tracks::to_tracks_from_text`] accept raw text through this trait
/// mirrors `HLS.from_text` in the original implementation.
pub trait MasterPlaylistParser: Send + Sync {
    fn parse(&self, text: &str, base_uri: &str) -> crate::error::Result<MasterPlaylist>;
}

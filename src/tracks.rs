//! Converts a parsed variant playlist into concrete [`Track`]s.
//!
//! Ground truth: `devine/core/manifests/hls.py::HLS.to_tracks`. A CRC32 of
//! the variant/media's own fields stands in for `hex(crc32(str(playlist)))`
//! — both are just stable identity hashes over the entry's content.

use crate::error::{HlsError, Result};
use crate::fetch::PlaylistFetcher;
use crate::playlist::{KeyDescriptor, MasterPlaylist, MasterPlaylistParser, Media, MediaType, Variant};
use crc32fast::Hasher;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoRange {
    Sdr,
    Hlg,
    Hdr10,
    Hdr10Plus,
    DolbyVision,
}

impl VideoRange {
    /// Map an `EXT-X-STREAM-INF:VIDEO-RANGE` tag value. Unknown/absent is SDR.
    fn from_m3u_tag(tag: Option<&str>) -> Self {
        match tag.map(str::to_uppercase).as_deref() {
            Some("PQ") => VideoRange::Hdr10,
            Some("HLG") => VideoRange::Hlg,
            _ => VideoRange::Sdr,
        }
    }

    /// Dolby Vision is signalled by the codec string, not `VIDEO-RANGE`.
    /// Ground truth: `hls.py`'s `codec.split(".")[0] in (dva1, dvav, dvhe, dvh1)`.
    fn is_dolby_vision_codec(codecs: &str) -> bool {
        codecs
            .to_lowercase()
            .split(',')
            .any(|c| matches!(c.split('.').next().unwrap_or(""), "dva1" | "dvav" | "dvhe" | "dvh1"))
    }
}

#[derive(Clone, Debug)]
pub struct VideoTrack {
    pub id: String,
    pub url: String,
    pub codecs: String,
    pub range: VideoRange,
    pub width: u32,
    pub height: u32,
    pub fps: Option<f64>,
    pub bitrate: u64,
    pub language: String,
    pub is_original_lang: bool,
    /// `EXT-X-SESSION-KEY` candidates, attached per `spec.md` §4.D step 5
    /// ("Audio: attach session DRM"); Video tracks carry these too since a
    /// session key protects the whole session, not one rendition group.
    pub session_keys: Vec<KeyDescriptor>,
    /// Set by the caller once `pipeline::download_track` succeeds and its
    /// `OnDownloaded` hook fires (`spec.md` §3 Lifecycle note) — `None`
    /// until then.
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct AudioTrack {
    pub id: String,
    pub url: String,
    pub codecs: String,
    pub bitrate: u64,
    pub channels: Option<String>,
    pub joc: u32,
    pub descriptive: bool,
    pub language: String,
    pub is_original_lang: bool,
    pub session_keys: Vec<KeyDescriptor>,
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct SubtitleTrack {
    pub id: String,
    pub url: String,
    pub forced: bool,
    pub sdh: bool,
    pub language: String,
    pub is_original_lang: bool,
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub enum Track {
    Video(VideoTrack),
    Audio(AudioTrack),
    Subtitle(SubtitleTrack),
}

#[derive(Debug, Default)]
pub struct Tracks {
    pub videos: Vec<VideoTrack>,
    pub audios: Vec<AudioTrack>,
    pub subtitles: Vec<SubtitleTrack>,
}

fn crc32_id(content: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn variant_is_video(variant: &Variant) -> bool {
    // Ground truth's primary-track-type heuristic: "does CODECS parse as a
    // video codec?" is retained verbatim (`hls.py`'s own `# TODO` admits
    // there's no better signal from an HLS manifest alone).
    variant
        .codecs
        .to_lowercase()
        .split(',')
        .any(|c| matches!(
            c.trim().split('.').next().unwrap_or(""),
            "avc1" | "avc3" | "hvc1" | "hev1" | "dva1" | "dvav" | "dvhe" | "dvh1" | "av01" | "vp09"
        ))
}

/// Resolve the language a track should be tagged with, given the manifest's
/// own `LANGUAGE` attribute (if any) and a caller-supplied fallback.
///
/// Ground truth: `hls.py`'s inline generator over `(media.language, language)`
/// picking the first tag that both parses and isn't `und*`.
fn resolve_language(candidate: Option<&str>, fallback: Option<&str>) -> Result<String> {
    for opt in [candidate, fallback] {
        if let Some(tag) = opt {
            let trimmed = tag.trim();
            if !trimmed.is_empty() && !trimmed.to_lowercase().starts_with("und") {
                return Ok(trimmed.to_string());
            }
        }
    }
    Err(HlsError::LanguageUnresolved(format!(
        "no usable language tag (media={candidate:?}, fallback={fallback:?})"
    )))
}

fn is_close_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.split('-').next() == b.split('-').next()
}

/// Build [`Tracks`] from a parsed master playlist.
///
/// `fallback_language` is the language the caller expects the primary
/// (un-labeled) track to be in — HLS manifests rarely carry language info on
/// `#EXT-X-STREAM-INF` entries themselves.
pub fn to_tracks(master: &MasterPlaylist, fallback_language: Option<&str>) -> Result<Tracks> {
    let mut tracks = Tracks::default();
    let mut audio_codecs_by_group: std::collections::HashMap<String, String> = std::collections::HashMap::new();

    for variant in &master.variants {
        if let Some(group) = &variant.audio_group {
            audio_codecs_by_group.insert(group.clone(), variant.codecs.clone());
        }
    }

    for variant in &master.variants {
        let id = crc32_id(&format!(
            "{}|{}|{}",
            variant.uri, variant.bandwidth, variant.codecs
        ));
        let bitrate = variant.average_bandwidth.unwrap_or(variant.bandwidth);
        let language = resolve_language(None, fallback_language)?;
        let url = crate::util::resolve_url(&variant.base_uri, &variant.uri);

        if variant_is_video(variant) {
            let range = if VideoRange::is_dolby_vision_codec(&variant.codecs) {
                VideoRange::DolbyVision
            } else {
                VideoRange::from_m3u_tag(variant.video_range.as_deref())
            };
            let (width, height) = variant.resolution.unwrap_or((0, 0));
            tracks.videos.push(VideoTrack {
                id,
                url,
                codecs: variant.codecs.clone(),
                range,
                width,
                height,
                fps: variant.frame_rate,
                bitrate,
                language,
                is_original_lang: true,
                session_keys: master.session_keys.clone(),
                path: None,
            });
        } else {
            tracks.audios.push(AudioTrack {
                id,
                url,
                codecs: variant.codecs.clone(),
                bitrate,
                channels: None,
                joc: 0,
                descriptive: false,
                language,
                is_original_lang: true,
                session_keys: master.session_keys.clone(),
                path: None,
            });
        }
    }

    for media in &master.media {
        let Some(uri) = &media.uri else { continue };
        let url = crate::util::resolve_url(&media.base_uri, uri);
        let id = crc32_id(&format!("{}|{}|{:?}", media.group_id, uri, media.language));
        let language = resolve_language(media.language.as_deref(), fallback_language)?;
        let is_original_lang = fallback_language.is_some_and(|f| is_close_match(&language, f));

        match media.media_type {
            MediaType::Audio => {
                push_audio_media(
                    &mut tracks,
                    media,
                    id,
                    url,
                    language,
                    is_original_lang,
                    &audio_codecs_by_group,
                    master.session_keys.clone(),
                );
            }
            MediaType::Subtitles => {
                tracks.subtitles.push(SubtitleTrack {
                    id,
                    url,
                    forced: media.forced,
                    sdh: media
                        .characteristics
                        .as_deref()
                        .is_some_and(|c| c.contains("public.accessibility.describes-music-and-sound")),
                    language,
                    is_original_lang,
                    path: None,
                });
            }
            MediaType::ClosedCaptions | MediaType::Video => {}
        }
    }

    Ok(tracks)
}

fn push_audio_media(
    tracks: &mut Tracks,
    media: &Media,
    id: String,
    url: String,
    language: String,
    is_original_lang: bool,
    audio_codecs_by_group: &std::collections::HashMap<String, String>,
    session_keys: Vec<KeyDescriptor>,
) {
    let mut channels = media.channels.clone();
    let mut joc = 0u32;
    if let Some(ch) = &channels {
        if let Some(prefix) = ch.strip_suffix("/JOC") {
            if let Ok(n) = prefix.parse::<u32>() {
                joc = n;
                channels = Some("5.1".to_string());
            }
        }
    }

    tracks.audios.push(AudioTrack {
        id,
        url,
        codecs: audio_codecs_by_group.get(&media.group_id).cloned().unwrap_or_default(),
        bitrate: 0,
        channels,
        joc,
        descriptive: media
            .characteristics
            .as_deref()
            .is_some_and(|c| c.contains("public.accessibility.describes-video")),
        language,
        is_original_lang,
        session_keys,
    });
}

/// Parse `text` as a master playlist via `parser` and convert it, in one
/// call — mirrors `HLS.from_text` in the original implementation (`spec.md`
/// §9 supplement #1). `base_uri` resolves any relative variant/media URIs.
pub fn to_tracks_from_text(
    text: &str,
    base_uri: &str,
    fallback_language: Option<&str>,
    parser: &dyn MasterPlaylistParser,
) -> Result<Tracks> {
    let master = parser.parse(text, base_uri)?;
    to_tracks(&master, fallback_language)
}

/// Fetch `url` via `fetcher`, then parse and convert — mirrors `HLS.from_url`.
pub fn to_tracks_from_url(
    url: &str,
    fallback_language: Option<&str>,
    fetcher: &dyn PlaylistFetcher,
    parser: &dyn MasterPlaylistParser,
) -> Result<Tracks> {
    let text = fetcher.fetch_text(url)?;
    to_tracks_from_text(&text, url, fallback_language, parser)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::test_support::FakeFetcher;
    use crate::playlist::{MasterPlaylist, Media, MediaType, Variant};

    fn variant(codecs: &str, video_range: Option<&str>) -> Variant {
        Variant {
            uri: "video.m3u8".into(),
            base_uri: "https://example/master.m3u8".into(),
            bandwidth: 5_000_000,
            average_bandwidth: None,
            codecs: codecs.into(),
            resolution: Some((1920, 1080)),
            frame_rate: Some(23.976),
            video_range,
            audio_group: Some("aud".into()),
        }
    }

    #[test]
    fn dolby_vision_codec_overrides_video_range_tag() {
        let range = if VideoRange::is_dolby_vision_codec("dvh1.05.01") {
            VideoRange::DolbyVision
        } else {
            VideoRange::from_m3u_tag(Some("PQ"))
        };
        assert_eq!(range, VideoRange::DolbyVision);
    }

    #[test]
    fn joc_suffix_parses_and_normalizes_channel_count() {
        let mut tracks = Tracks::default();
        let media = Media {
            media_type: MediaType::Audio,
            group_id: "aud".into(),
            uri: Some("audio.m3u8".into()),
            base_uri: "https://example/master.m3u8".into(),
            language: Some("en".into()),
            channels: Some("16/JOC".into()),
            characteristics: None,
            forced: false,
            is_default: true,
        };
        push_audio_media(
            &mut tracks,
            &media,
            "id".into(),
            "url".into(),
            "en".into(),
            true,
            &std::collections::HashMap::new(),
            Vec::new(),
        );
        let audio = &tracks.audios[0];
        assert_eq!(audio.joc, 16);
        assert_eq!(audio.channels.as_deref(), Some("5.1"));
    }

    #[test]
    fn language_resolution_falls_back_and_rejects_und() {
        assert_eq!(resolve_language(None, Some("en")).unwrap(), "en");
        assert_eq!(resolve_language(Some("fr"), Some("en")).unwrap(), "fr");
        assert!(resolve_language(Some("und"), None).is_err());
        assert!(resolve_language(None, None).is_err());
    }

    #[test]
    fn primary_track_type_follows_codec_parse_heuristic() {
        let v = variant("hvc1.2.4.L153.B0", None);
        assert!(variant_is_video(&v));
        let a = variant("mp4a.40.2", None);
        assert!(!variant_is_video(&a));
    }

    #[test]
    fn builds_video_and_subtitle_tracks_from_master() {
        let mut master = MasterPlaylist::default();
        master.variants.push(variant("hvc1.2.4.L153.B0", Some("PQ")));
        master.media.push(Media {
            media_type: MediaType::Subtitles,
            group_id: "subs".into(),
            uri: Some("subs_en.m3u8".into()),
            base_uri: "https://example/master.m3u8".into(),
            language: Some("en".into()),
            channels: None,
            characteristics: Some("public.accessibility.describes-music-and-sound".into()),
            forced: false,
            is_default: false,
        });

        let tracks = to_tracks(&master, Some("en")).unwrap();
        assert_eq!(tracks.videos.len(), 1);
        assert_eq!(tracks.videos[0].range, VideoRange::Hdr10);
        assert_eq!(tracks.subtitles.len(), 1);
        assert!(tracks.subtitles[0].sdh);
    }

    struct FixedMasterParser {
        master: MasterPlaylist,
    }
    impl MasterPlaylistParser for FixedMasterParser {
        fn parse(&self, _text: &str, _base_uri: &str) -> Result<MasterPlaylist> {
            Ok(self.master.clone())
        }
    }

    fn one_video_master() -> MasterPlaylist {
        let mut master = MasterPlaylist::default();
        master.variants.push(variant("hvc1.2.4.L153.B0", None));
        master
    }

    #[test]
    fn from_text_parses_and_converts_in_one_call() {
        let parser = FixedMasterParser { master: one_video_master() };
        let tracks = to_tracks_from_text("#EXTM3U", "https://example/master.m3u8", Some("en"), &parser).unwrap();
        assert_eq!(tracks.videos.len(), 1);
    }

    #[test]
    fn from_url_fetches_then_converts() {
        let fetcher = FakeFetcher::default();
        fetcher
            .texts
            .lock()
            .unwrap()
            .insert("https://example/master.m3u8".into(), "#EXTM3U".into());
        let parser = FixedMasterParser { master: one_video_master() };

        let tracks = to_tracks_from_url("https://example/master.m3u8", Some("en"), &fetcher, &parser).unwrap();
        assert_eq!(tracks.videos.len(), 1);
    }
}

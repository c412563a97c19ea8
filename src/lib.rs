//! Core segment-processing state machine for an HLS variant-playlist
//! downloader.
//!
//! This crate owns the pieces described in `spec.md`: byte-range math (A),
//! key-system selection (B), the key→DRM factory (C), variant-to-track
//! conversion (D), the segment pipeline (E), the final assembler (F), and
//! subtitle normalization (G). The M3U8 parser, HTTP transport building
//! blocks, the Widevine/ClearKey protocol internals, the parallel
//! downloader's wire format, progress UI, configuration loading, and the
//! command-line surface are external collaborators — this crate only
//! defines the trait seams they plug into (`fetch`, `playlist`, `drm`,
//! `downloader`, `hooks`, `license`).

pub mod assembler;
pub mod byte_range;
pub mod cancel;
pub mod config;
pub mod downloader;
pub mod drm;
pub mod drm_factory;
pub mod error;
pub mod fetch;
pub mod hooks;
pub mod key_system;
pub mod license;
pub mod pipeline;
pub mod playlist;
pub mod subtitle;
pub mod tracks;
pub mod util;

pub use cancel::DownloadContext;
pub use config::{DownloadConfig, ProxyConfig};
pub use error::{HlsError, Result};
pub use pipeline::{download_track, PipelineDeps, PipelineTrack, SubtitleCodec, TrackKind};
pub use tracks::{to_tracks, to_tracks_from_text, to_tracks_from_url, Track, Tracks};

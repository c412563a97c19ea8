//! Component E: the segment-processing state machine.
//!
//! Ground truth: `devine/core/manifests/hls.py::download_track` restructured
//! per the Design Notes ("Closures over walk-state") into an explicit
//! [`PipelineState`] plus free functions, instead of inner closures over
//! loop-local variables. This is the 55%-of-budget component `spec.md` §2
//! calls "the hard part".

use crate::byte_range::calculate_byte_range;
use crate::cancel::DownloadContext;
use crate::downloader::{Downloader, SegmentRequest};
use crate::drm::{Drm, DrmHandler, WidevineCdm};
use crate::drm_factory::build_drm;
use crate::error::{HlsError, Result};
use crate::fetch::PlaylistFetcher;
use crate::hooks::{ProgressEvent, ProgressSink, TrackHooks};
use crate::key_system::select_key_system;
use crate::license::LicenseCallback;
use crate::playlist::{InitSectionRef, KeyDescriptor, MediaPlaylistParser, Segment};
use crate::subtitle;
use crate::util::{digit_width, segment_filename};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
    Subtitle,
}

/// Subtitle codec flavor, per `spec.md` §4.E step 1 — fragmented formats
/// carry binary boxes and skip the plain-text normalization pass (G).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubtitleCodec {
    PlainVtt,
    PlainTtml,
    FragmentedVtt,
    FragmentedTtml,
}

impl SubtitleCodec {
    fn is_fragmented(self) -> bool {
        matches!(self, SubtitleCodec::FragmentedVtt | SubtitleCodec::FragmentedTtml)
    }
}

/// Everything the pipeline needs from a [`crate::tracks::Track`], independent
/// of which concrete Video/Audio/Subtitle variant it came from.
pub struct PipelineTrack {
    pub kind: TrackKind,
    pub playlist_url: String,
    pub subtitle_codec: Option<SubtitleCodec>,
    pub session_keys: Vec<KeyDescriptor>,
}

/// Collaborators Phase 1/2 drive — all external per `spec.md` §6.
pub struct PipelineDeps<'a> {
    pub fetcher: &'a dyn PlaylistFetcher,
    pub parser: &'a dyn MediaPlaylistParser,
    pub downloader: &'a dyn Downloader,
    pub fallback_downloader: Option<&'a dyn Downloader>,
    pub license: &'a dyn LicenseCallback,
    pub cdm_factory: &'a dyn Fn() -> Box<dyn WidevineCdm>,
    pub progress: Option<&'a dyn ProgressSink>,
    pub hooks: Option<&'a TrackHooks>,
}

fn emit(progress: Option<&dyn ProgressSink>, event: ProgressEvent) {
    if let Some(sink) = progress {
        sink.on_progress(event);
    }
}

/// Running state of the Phase 2 sequential walk. Replaces the source's
/// closures-over-loop-variables with owned fields plus methods — see Design
/// Notes "Closures over walk-state" in `spec.md` §9.
struct PipelineState {
    discon_i: usize,
    range_offset: u64,
    map_data: Option<(InitSectionRef, Vec<u8>)>,
    /// Whether `map_data`'s bytes have already been written into the current
    /// discontinuity's output (by a flush or an earlier merge), so neither
    /// operation double-prefixes it. Reset whenever the init identity or the
    /// discontinuity boundary changes.
    init_included: bool,
    encryption_context: Option<EncryptionContext>,
}

struct EncryptionContext {
    first_segment_index: usize,
    key: Option<KeyDescriptor>,
    drm: Drm,
}

fn pure_integer_stem(stem: &str) -> Option<usize> {
    stem.parse::<usize>().ok()
}

/// Trailing numeric index of a (possibly merged/decrypted) segment filename:
/// strip `_decrypted`, then take the tail after the last `-` if present.
fn trailing_index(stem: &str) -> Option<usize> {
    let stem = stem.strip_suffix("_decrypted").unwrap_or(stem);
    match stem.rsplit_once('-') {
        Some((_, tail)) => tail.parse().ok(),
        None => stem.parse().ok(),
    }
}

fn list_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|source| HlsError::Io { path: dir.to_path_buf(), source })?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    entries.sort();
    Ok(entries)
}

fn file_ext(path: &Path) -> String {
    path.extension().and_then(|e| e.to_str()).unwrap_or("ts").to_string()
}

/// Append `prefix` (once) followed by the bytes of each of `sources` (in
/// order) into `out_path`, deleting each source as it is consumed.
fn merge_files(sources: &[PathBuf], out_path: &Path, prefix: Option<&[u8]>) -> Result<()> {
    let mut out = Vec::new();
    if let Some(p) = prefix {
        out.extend_from_slice(p);
    }
    for src in sources {
        let bytes = std::fs::read(src).map_err(|source| HlsError::Io { path: src.clone(), source })?;
        out.extend_from_slice(&bytes);
    }
    std::fs::write(out_path, &out).map_err(|source| HlsError::Io { path: out_path.to_path_buf(), source })?;
    for src in sources {
        std::fs::remove_file(src).map_err(|source| HlsError::Io { path: src.clone(), source })?;
    }
    Ok(())
}

/// Flush-Decrypt operation (`spec.md` §4.E): merge the closed interval
/// `[first, last]` into one file and decrypt it in place.
fn flush_decrypt(
    segments_dir: &Path,
    first: usize,
    last: usize,
    total: usize,
    state: &mut PipelineState,
    drm: &Drm,
    hooks: Option<&TrackHooks>,
) -> Result<PathBuf> {
    let width = digit_width(total);
    let mut sources: Vec<PathBuf> = list_dir_sorted(segments_dir)?
        .into_iter()
        .filter(|p| {
            p.file_stem()
                .and_then(|s| s.to_str())
                .and_then(pure_integer_stem)
                .is_some_and(|idx| idx >= first && idx <= last)
        })
        .collect();
    sources.sort();

    let expected = last - first + 1;
    if sources.len() != expected {
        return Err(HlsError::MissingSegments {
            first,
            last,
            expected,
            found: sources.len(),
        });
    }

    let ext = file_ext(sources.last().expect("non-empty, checked above"));
    let merged_path = segments_dir.join(format!("{first:0width$}-{last:0width$}.{ext}"));

    let prefix = if !state.init_included {
        state.map_data.as_ref().map(|(_, bytes)| bytes.as_slice())
    } else {
        None
    };
    merge_files(&sources, &merged_path, prefix)?;
    if prefix.is_some() {
        state.init_included = true;
    }

    drm.decrypt(&merged_path)?;
    let decrypted_path = segments_dir.join(format!("{first:0width$}-{last:0width$}_decrypted.{ext}"));
    std::fs::rename(&merged_path, &decrypted_path).map_err(|source| HlsError::Io {
        path: decrypted_path.clone(),
        source,
    })?;

    if let Some(hooks) = hooks {
        hooks.on_decrypted(drm, &decrypted_path);
    }

    Ok(decrypted_path)
}

/// Merge-Discontinuity operation (`spec.md` §4.E): concatenate, in
/// lexicographic (== numeric, given uniform zero-padding) filename order,
/// every remaining file covering indices `<= last` into the discontinuity
/// file.
fn merge_discontinuity(segments_dir: &Path, save_dir: &Path, state: &mut PipelineState, last: usize) -> Result<PathBuf> {
    let mut sources: Vec<PathBuf> = list_dir_sorted(segments_dir)?
        .into_iter()
        .filter(|p| {
            p.file_stem()
                .and_then(|s| s.to_str())
                .and_then(trailing_index)
                .is_some_and(|idx| idx <= last)
        })
        .collect();
    sources.sort();

    let ext = sources.last().map(|p| file_ext(p)).unwrap_or_else(|| "ts".to_string());
    let out_path = save_dir.join(format!("{}.{ext}", state.discon_i));

    let prefix = if !state.init_included {
        state.map_data.as_ref().map(|(_, bytes)| bytes.as_slice())
    } else {
        None
    };
    merge_files(&sources, &out_path, prefix)?;
    if prefix.is_some() {
        state.init_included = true;
    }

    Ok(out_path)
}

/// Best-effort default-KID extraction from a cached fMP4 init section, used
/// only to give the license callback a hint (`spec.md` §4.E step 4, "the
/// track's key-id derived from current map_data[1]"). Scans for the first
/// `tenc` box and reads its trailing 16 bytes, which is where ISO/IEC
/// 23001-7 places `default_KID` regardless of box version.
fn extract_default_kid(init_bytes: &[u8]) -> Option<Vec<u8>> {
    let pos = init_bytes.windows(4).position(|w| w == b"tenc")?;
    let box_start = pos.checked_sub(4)?;
    let size = u32::from_be_bytes(init_bytes.get(box_start..box_start + 4)?.try_into().ok()?) as usize;
    let box_end = box_start.checked_add(size)?;
    if box_end > init_bytes.len() || box_end < 16 {
        return None;
    }
    Some(init_bytes[box_end - 16..box_end].to_vec())
}

fn is_plain_text_subtitle(codec: Option<SubtitleCodec>) -> bool {
    matches!(codec, Some(c) if !c.is_fragmented())
}

/// Phase 1: resolve the invariant playlist, apply the segment filter, fetch
/// session DRM licensing, and dispatch the parallel segment download.
fn plan_and_fetch(
    track: &PipelineTrack,
    segments_dir: &Path,
    ctx: &DownloadContext,
    deps: &PipelineDeps,
) -> Result<(Vec<Segment>, Option<EncryptionContext>)> {
    let text = deps.fetcher.fetch_text(&track.playlist_url)?;
    let playlist = deps.parser.parse(&text, &track.playlist_url)?;
    if playlist.segments.is_empty() {
        return Err(HlsError::ManifestInvalid(format!(
            "invariant playlist {} has no segments",
            track.playlist_url
        )));
    }

    let initial_context = if let Some(session_key) = track.session_keys.first() {
        let drm = build_drm(session_key, deps.fetcher, deps.cdm_factory)?;
        if let Drm::Widevine(w) = &drm {
            emit(deps.progress, ProgressEvent { downloaded: Some("LICENSING".into()), ..Default::default() });
            if let Err(e) = deps.license.license(w, None) {
                ctx.cancel();
                emit(deps.progress, ProgressEvent { downloaded: Some("FAILED".into()), ..Default::default() });
                return Err(HlsError::LicenseFailed(e.to_string()));
            }
            emit(deps.progress, ProgressEvent { downloaded: Some("LICENSED".into()), ..Default::default() });
        }
        Some(EncryptionContext { first_segment_index: 0, key: None, drm })
    } else {
        None
    };

    let retained: Vec<Segment> = playlist
        .segments
        .into_iter()
        .filter(|s| deps.hooks.is_none_or(|h| h.keep_segment(s)))
        .collect();
    if retained.is_empty() {
        return Err(HlsError::ManifestInvalid(format!(
            "no segments remained for {} after filtering",
            track.playlist_url
        )));
    }

    let total = retained.len();
    let mut running_offset: u64 = 0;
    let mut requests = Vec::with_capacity(total);
    for (i, seg) in retained.iter().enumerate() {
        let range_header = match &seg.byterange {
            Some(spec) => {
                let range = calculate_byte_range(spec, running_offset)?;
                running_offset = range.next_fallback_offset();
                Some(range.http_range_header())
            }
            None => None,
        };
        requests.push(SegmentRequest {
            index: i,
            url: seg.resolved_url(),
            range_header,
            file_name: segment_filename(i, total, seg.extension()),
        });
    }

    let needs_range = requests.iter().any(|r| r.range_header.is_some());
    let downloader: &dyn Downloader = if needs_range && !deps.downloader.supports_range_header() {
        deps.fallback_downloader.unwrap_or(deps.downloader)
    } else {
        deps.downloader
    };

    emit(deps.progress, ProgressEvent { total: Some(total as u64), completed: Some(0), ..Default::default() });
    downloader.download_all(&requests, segments_dir, deps.hooks, ctx)?;

    Ok((retained, initial_context))
}

/// Phase 2: the sequential per-segment walk over already-downloaded
/// segment files.
fn walk_segments(
    segments: &[Segment],
    segments_dir: &Path,
    save_dir: &Path,
    mut encryption_context: Option<EncryptionContext>,
    ctx: &DownloadContext,
    deps: &PipelineDeps,
    subtitle_codec: Option<SubtitleCodec>,
) -> Result<()> {
    let total = segments.len();
    let mut state = PipelineState {
        discon_i: 0,
        range_offset: 0,
        map_data: None,
        init_included: false,
        encryption_context: encryption_context.take(),
    };

    for (i, segment) in segments.iter().enumerate() {
        if ctx.is_cancelled() {
            return Err(HlsError::Cancelled);
        }

        let segment_path = segments_dir.join(segment_filename(i, total, segment.extension()));

        if is_plain_text_subtitle(subtitle_codec) && segment_path.is_file() {
            let data = std::fs::read(&segment_path).map_err(|source| HlsError::Io {
                path: segment_path.clone(),
                source,
            })?;
            let normalized = subtitle::normalize_segment(&data, true);
            std::fs::write(&segment_path, normalized).map_err(|source| HlsError::Io {
                path: segment_path.clone(),
                source,
            })?;
        }

        if segment.discontinuity && i > 0 {
            if let Some(enc) = state.encryption_context.take() {
                flush_decrypt(segments_dir, enc.first_segment_index, i - 1, total, &mut state, &enc.drm, deps.hooks)?;
                state.encryption_context = Some(enc);
            }
            merge_discontinuity(segments_dir, save_dir, &mut state, i - 1)?;

            state.discon_i += 1;
            state.range_offset = 0;
            state.map_data = None;
            state.init_included = false;
            if let Some(enc) = &mut state.encryption_context {
                enc.first_segment_index = i;
            }
        }

        if let Some(init_ref) = &segment.init_section {
            let identity_changed = state.map_data.as_ref().map(|(id, _)| id) != Some(init_ref);
            if identity_changed {
                let range_header = match &init_ref.byterange {
                    Some(spec) => {
                        let range = calculate_byte_range(spec, state.range_offset)?;
                        state.range_offset = range.next_fallback_offset();
                        Some(range.http_range_header())
                    }
                    None => None,
                };
                let url = crate::util::resolve_url(&init_ref.base_uri, &init_ref.uri);
                let bytes = deps.fetcher.fetch_bytes(&url, range_header.as_deref())?;
                state.map_data = Some((init_ref.clone(), bytes));
                state.init_included = false;
            }
        }

        if !segment.keys.is_empty() {
            let selected = select_key_system(&segment.keys)?;
            match selected {
                None => {
                    if let Some(enc) = state.encryption_context.take() {
                        // Only flush if the cached key actually differs from the new
                        // (plaintext) selection — matches `hls.py`'s
                        // `encryption_data[1] != key` guard, per `spec.md` §4.E step 4.
                        // A context whose key is already `None` (e.g. a session-DRM
                        // default) is left untouched, same as the source.
                        if enc.key.is_some() && i > 0 {
                            flush_decrypt(segments_dir, enc.first_segment_index, i - 1, total, &mut state, &enc.drm, deps.hooks)?;
                        }
                    }
                    state.encryption_context = None;
                }
                Some(new_key) => {
                    let changed = match &state.encryption_context {
                        Some(enc) => enc.key.as_ref() != Some(&new_key),
                        None => true,
                    };
                    if changed {
                        if let Some(enc) = state.encryption_context.take() {
                            if i > 0 {
                                flush_decrypt(segments_dir, enc.first_segment_index, i - 1, total, &mut state, &enc.drm, deps.hooks)?;
                            }
                        }
                        let drm = build_drm(&new_key, deps.fetcher, deps.cdm_factory)?;
                        if let Drm::Widevine(w) = &drm {
                            let kid = state.map_data.as_ref().and_then(|(_, bytes)| extract_default_kid(bytes));
                            emit(deps.progress, ProgressEvent { downloaded: Some("LICENSING".into()), ..Default::default() });
                            if let Err(e) = deps.license.license(w, kid.as_deref()) {
                                ctx.cancel();
                                emit(deps.progress, ProgressEvent { downloaded: Some("FAILED".into()), ..Default::default() });
                                return Err(HlsError::LicenseFailed(e.to_string()));
                            }
                            emit(deps.progress, ProgressEvent { downloaded: Some("LICENSED".into()), ..Default::default() });
                        }
                        state.encryption_context = Some(EncryptionContext {
                            first_segment_index: i,
                            key: Some(new_key),
                            drm,
                        });
                    }
                }
            }
        }

        if ctx.is_license_only() {
            emit(deps.progress, ProgressEvent { advance: Some(1), ..Default::default() });
            continue;
        }

        if i == total - 1 {
            if let Some(enc) = state.encryption_context.take() {
                flush_decrypt(segments_dir, enc.first_segment_index, i, total, &mut state, &enc.drm, deps.hooks)?;
                state.encryption_context = Some(enc);
            }
            merge_discontinuity(segments_dir, save_dir, &mut state, i)?;
        }

        emit(deps.progress, ProgressEvent { advance: Some(1), ..Default::default() });
    }

    Ok(())
}

/// Drive a full track download: Phase 1, Phase 2, then the Final Assembler
/// (component F) unless the session is running license-only.
#[tracing::instrument(skip(deps), fields(kind = ?track.kind, url = %track.playlist_url))]
pub fn download_track(
    track: &PipelineTrack,
    working_dir: &Path,
    save_path: &Path,
    ctx: &DownloadContext,
    deps: &PipelineDeps,
) -> Result<()> {
    let segments_dir = working_dir.join("segments");
    std::fs::create_dir_all(&segments_dir).map_err(|source| HlsError::Io {
        path: segments_dir.clone(),
        source,
    })?;

    tracing::info!("resolving invariant playlist and fetching segments");
    let (segments, initial_context) = plan_and_fetch(track, &segments_dir, ctx, deps)?;

    tracing::info!(segments = segments.len(), "walking segments");
    walk_segments(&segments, &segments_dir, working_dir, initial_context, ctx, deps, track.subtitle_codec)?;

    if ctx.is_license_only() {
        tracing::info!("license-only run, skipping final assembly");
        return Ok(());
    }

    tracing::info!(save_path = %save_path.display(), "assembling final output");
    crate::assembler::finalize(track.kind, working_dir, save_path)?;
    if let Some(hooks) = deps.hooks {
        hooks.on_downloaded();
    }
    Ok(())
}

//! Component F: Final Assembler. Ground truth:
//! `devine/core/manifests/hls.py::merge_segments`'s ffmpeg concat-demuxer
//! invocation for audio/video, and its plain binary concatenation for
//! subtitles — `spec.md` §4.F.

use crate::error::{HlsError, Result};
use crate::pipeline::TrackKind;
use crate::util::find_binary;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Binaries this crate will accept as the "external MPEG concat demuxer"
/// per `spec.md` §6 — same lookup the teacher's own `get_binary_path`-style
/// helper (`crate::util::find_binary`) performs for any external tool.
const CONCAT_DEMUXER_CANDIDATES: &[&str] = &["ffmpeg"];

/// Discontinuity files are named `<discon_i>.<ext>` with no zero-padding
/// (`spec.md` §6 filesystem layout), so sort numerically rather than
/// lexicographically — lexicographic would put `10.ts` before `2.ts`.
fn discontinuity_files_in_order(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<(usize, PathBuf)> = std::fs::read_dir(dir)
        .map_err(|source| HlsError::Io { path: dir.to_path_buf(), source })?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter_map(|p| {
            p.file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<usize>().ok())
                .map(|idx| (idx, p))
        })
        .collect();
    files.sort_by_key(|(idx, _)| *idx);
    Ok(files.into_iter().map(|(_, p)| p).collect())
}

fn concat_with_demuxer(files: &[PathBuf], save_path: &Path) -> Result<()> {
    let ffmpeg = find_binary(CONCAT_DEMUXER_CANDIDATES)
        .ok_or_else(|| HlsError::MergeToolMissing(CONCAT_DEMUXER_CANDIDATES.join("/")))?;

    let listing_path = save_path.with_extension("concat.txt");
    let listing = files
        .iter()
        .map(|p| format!("file '{}'", p.display()))
        .collect::<Vec<_>>()
        .join("\n");
    std::fs::write(&listing_path, listing).map_err(|source| HlsError::Io {
        path: listing_path.clone(),
        source,
    })?;

    let status = Command::new(&ffmpeg)
        .args(["-y", "-f", "concat", "-safe", "0", "-i"])
        .arg(&listing_path)
        .args(["-c", "copy", "-map", "0"])
        .arg(save_path)
        .status()
        .map_err(|source| HlsError::Io { path: ffmpeg.clone(), source })?;

    let _ = std::fs::remove_file(&listing_path);

    if !status.success() {
        return Err(HlsError::ManifestInvalid(format!(
            "concat demuxer exited with status {status}"
        )));
    }
    Ok(())
}

fn concat_binary(files: &[PathBuf], save_path: &Path) -> Result<()> {
    let mut out = Vec::new();
    for f in files {
        let bytes = std::fs::read(f).map_err(|source| HlsError::Io { path: f.clone(), source })?;
        out.extend_from_slice(&bytes);
    }
    std::fs::write(save_path, out).map_err(|source| HlsError::Io {
        path: save_path.to_path_buf(),
        source,
    })
}

/// Concatenate the discontinuity files under `working_dir` into `save_path`,
/// then remove `working_dir` entirely (`spec.md` §4.F).
pub fn finalize(kind: TrackKind, working_dir: &Path, save_path: &Path) -> Result<()> {
    let files = discontinuity_files_in_order(working_dir)?;
    if files.is_empty() {
        return Err(HlsError::ManifestInvalid(format!(
            "no discontinuity files produced under {working_dir:?}"
        )));
    }

    match kind {
        TrackKind::Video | TrackKind::Audio => concat_with_demuxer(&files, save_path)?,
        TrackKind::Subtitle => concat_binary(&files, save_path)?,
    }

    std::fs::remove_dir_all(working_dir).map_err(|source| HlsError::Io {
        path: working_dir.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_discontinuity_files_numerically_not_lexicographically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["10.ts", "2.ts", "1.ts"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let ordered = discontinuity_files_in_order(dir.path()).unwrap();
        let stems: Vec<_> = ordered
            .iter()
            .map(|p| p.file_stem().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(stems, vec!["1", "2", "10"]);
    }

    #[test]
    fn subtitle_tracks_concatenate_as_plain_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0.vtt"), b"WEBVTT\n\n1\n").unwrap();
        std::fs::write(dir.path().join("1.vtt"), b"2\n").unwrap();

        let save_path = dir.path().parent().unwrap().join("out.vtt");
        finalize(TrackKind::Subtitle, dir.path(), &save_path).unwrap();

        let merged = std::fs::read(&save_path).unwrap();
        assert_eq!(merged, b"WEBVTT\n\n1\n2\n");
        assert!(!dir.path().exists());
        let _ = std::fs::remove_file(&save_path);
    }

    #[test]
    fn empty_working_dir_fails_with_manifest_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let save_path = dir.path().parent().unwrap().join("out.ts");
        let err = finalize(TrackKind::Video, dir.path(), &save_path).unwrap_err();
        assert!(matches!(err, HlsError::ManifestInvalid(_)));
    }
}

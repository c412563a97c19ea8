//! Segment downloading: fan out a flat list of segment requests to a worker
//! pool. Ground truth: `devine/core/manifests/hls.py::download_track`'s
//! `downloader_(urls=..., max_workers=16)` call and its aria2c capability
//! probe (`downloader_.__name__ == "aria2c"` forces a fallback to
//! `requests_downloader` because aria2c ignores the `Range` header).
//!
//! No thread-pool crate is part of the teacher's stack, so the reference
//! implementation below uses `std::thread::scope` directly, the same way
//! the teacher's own gateway code spawns bounded worker threads.

use crate::cancel::DownloadContext;
use crate::error::{HlsError, Result};
use crate::fetch::PlaylistFetcher;
use crate::hooks::TrackHooks;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Clone, Debug)]
pub struct SegmentRequest {
    pub index: usize,
    pub url: String,
    pub range_header: Option<String>,
    pub file_name: String,
}

pub trait Downloader: Send + Sync {
    fn name(&self) -> &'static str;

    /// aria2c-style downloaders that can't express byte ranges return false
    /// here; the pipeline then falls back to a plain-HTTP downloader for
    /// any track with `EXT-X-BYTERANGE` segments.
    fn supports_range_header(&self) -> bool;

    fn download_all(
        &self,
        requests: &[SegmentRequest],
        out_dir: &Path,
        hooks: Option<&TrackHooks>,
        ctx: &DownloadContext,
    ) -> Result<()>;
}

/// Reference downloader backed by an injected [`PlaylistFetcher`], fanned
/// out across a small worker-thread pool.
pub struct ThreadPoolDownloader<F: PlaylistFetcher> {
    fetcher: F,
    max_workers: usize,
}

impl<F: PlaylistFetcher> ThreadPoolDownloader<F> {
    pub fn new(fetcher: F, max_workers: usize) -> Self {
        Self {
            fetcher,
            max_workers: max_workers.max(1),
        }
    }
}

impl<F: PlaylistFetcher> Downloader for ThreadPoolDownloader<F> {
    fn name(&self) -> &'static str {
        "http"
    }

    fn supports_range_header(&self) -> bool {
        true
    }

    #[tracing::instrument(skip(self, requests, hooks, ctx), fields(count = requests.len(), workers = self.max_workers))]
    fn download_all(
        &self,
        requests: &[SegmentRequest],
        out_dir: &Path,
        hooks: Option<&TrackHooks>,
        ctx: &DownloadContext,
    ) -> Result<()> {
        tracing::debug!(out_dir = %out_dir.display(), "starting segment download batch");
        std::fs::create_dir_all(out_dir).map_err(|source| HlsError::Io {
            path: out_dir.to_path_buf(),
            source,
        })?;

        let next = AtomicUsize::new(0);
        let worker_count = self.max_workers.min(requests.len().max(1));
        let errors: std::sync::Mutex<Vec<HlsError>> = std::sync::Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for _ in 0..worker_count {
                scope.spawn(|| loop {
                    if ctx.is_cancelled() {
                        return;
                    }
                    let i = next.fetch_add(1, Ordering::SeqCst);
                    let Some(req) = requests.get(i) else {
                        return;
                    };

                    let result = self
                        .fetcher
                        .fetch_bytes(&req.url, req.range_header.as_deref())
                        .and_then(|bytes| {
                            let path: PathBuf = out_dir.join(&req.file_name);
                            std::fs::write(&path, &bytes).map_err(|source| HlsError::Io {
                                path: path.clone(),
                                source,
                            })?;
                            if let Some(hooks) = hooks {
                                hooks.on_segment_downloaded(&path);
                            }
                            Ok(())
                        });

                    if let Err(e) = result {
                        tracing::error!(index = req.index, error = %e, "segment download failed, cancelling batch");
                        errors.lock().unwrap().push(e);
                        ctx.cancel();
                        return;
                    }
                });
            }
        });

        let mut errors = errors.into_inner().unwrap();
        match errors.pop() {
            Some(e) if !ctx.is_cancelled() || errors.is_empty() => Err(e),
            Some(e) => Err(e),
            None if ctx.is_cancelled() => Err(HlsError::Cancelled),
            None => Ok(()),
        }
    }
}

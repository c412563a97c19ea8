//! Dynamic callback hooks and progress events.
//!
//! Ground truth: Design Notes "Dynamic callbacks" in `spec.md` §9 — the
//! `OnSegmentFilter`/`OnSegmentDownloaded`/`OnDecrypted`/`OnDownloaded`
//! capability set is modeled as an optional-closure-per-hook record rather
//! than a trait object per hook, matching how the teacher's own
//! `src/audio/pipeline/decoder/factory.rs` threads optional callback
//! closures through its construction path.

use crate::drm::Drm;
use crate::playlist::Segment;
use std::path::Path;

type SegmentFilter = Box<dyn Fn(&Segment) -> bool + Send + Sync>;
type PathHook = Box<dyn Fn(&Path) + Send + Sync>;
type DecryptedHook = Box<dyn Fn(&Drm, &Path) + Send + Sync>;
type DownloadedHook = Box<dyn Fn() + Send + Sync>;

/// Per-track capability set. Any hook left `None` is simply skipped.
#[derive(Default)]
pub struct TrackHooks {
    pub on_segment_filter: Option<SegmentFilter>,
    pub on_segment_downloaded: Option<PathHook>,
    pub on_decrypted: Option<DecryptedHook>,
    pub on_downloaded: Option<DownloadedHook>,
}

impl TrackHooks {
    /// `true` keeps the segment. Defaults to keeping everything.
    pub fn keep_segment(&self, segment: &Segment) -> bool {
        match &self.on_segment_filter {
            Some(f) => f(segment),
            None => true,
        }
    }

    pub fn on_segment_downloaded(&self, path: &Path) {
        if let Some(f) = &self.on_segment_downloaded {
            f(path);
        }
    }

    pub fn on_decrypted(&self, drm: &Drm, path: &Path) {
        if let Some(f) = &self.on_decrypted {
            f(drm, path);
        }
    }

    pub fn on_downloaded(&self) {
        if let Some(f) = &self.on_downloaded {
            f();
        }
    }
}

/// A progress tuple per `spec.md` §6 — `downloaded` is a free-form status
/// tag (e.g. `"LICENSING"`, `"DECRYPTING"`) and may carry color markup, same
/// as the source's rich-text progress strings.
#[derive(Clone, Debug, Default)]
pub struct ProgressEvent {
    pub total: Option<u64>,
    pub completed: Option<u64>,
    pub advance: Option<u64>,
    pub downloaded: Option<String>,
}

pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

impl<F: Fn(ProgressEvent) + Send + Sync> ProgressSink for F {
    fn on_progress(&self, event: ProgressEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment() -> Segment {
        Segment {
            uri: "0.ts".into(),
            base_uri: "https://example/".into(),
            byterange: None,
            init_section: None,
            keys: Vec::new(),
            discontinuity: false,
            duration: None,
        }
    }

    #[test]
    fn default_filter_keeps_everything() {
        let hooks = TrackHooks::default();
        assert!(hooks.keep_segment(&segment()));
    }

    #[test]
    fn filter_hook_can_drop_segments() {
        let mut hooks = TrackHooks::default();
        hooks.on_segment_filter = Some(Box::new(|_| false));
        assert!(!hooks.keep_segment(&segment()));
    }

    #[test]
    fn downloaded_hook_fires() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = Arc::clone(&fired);
        let mut hooks = TrackHooks::default();
        hooks.on_downloaded = Some(Box::new(move || fired2.store(true, Ordering::SeqCst)));
        hooks.on_downloaded();
        assert!(fired.load(Ordering::SeqCst));
    }
}

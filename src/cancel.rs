use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Replaces the source's two process-wide statics (`DOWNLOAD_CANCELLED`,
/// `DOWNLOAD_LICENCE_ONLY`) with a value passed through the pipeline context.
///
/// Cloning shares the underlying flags, so a license failure raised deep in
/// one track's pipeline is visible to whatever scheduled it without any
/// global state.
#[derive(Clone, Default)]
pub struct DownloadContext {
    cancelled: Arc<AtomicBool>,
    license_only: Arc<AtomicBool>,
}

impl DownloadContext {
    pub fn new(license_only: bool) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            license_only: Arc::new(AtomicBool::new(license_only)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_license_only(&self) -> bool {
        self.license_only.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_visible_across_clones() {
        let ctx = DownloadContext::new(false);
        let clone = ctx.clone();
        clone.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn license_only_defaults_false() {
        let ctx = DownloadContext::new(false);
        assert!(!ctx.is_license_only());
        let ctx = DownloadContext::new(true);
        assert!(ctx.is_license_only());
    }
}

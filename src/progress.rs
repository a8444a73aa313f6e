//! Progress-callback trait for extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to be told
//! when an extraction starts, how many labels it found, or why it failed.
//! The CLI uses this to drive its spinner; a GUI host would forward the
//! events to its own event loop.
//!
//! # Example
//!
//! ```rust
//! use labelscan::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::Arc;
//!
//! struct Logger;
//!
//! impl ExtractionProgressCallback for Logger {
//!     fn on_extraction_complete(&self, filename: &str, label_count: usize) {
//!         eprintln!("{filename}: {label_count} labels");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Logger) as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the processing lifecycle around each extraction attempt.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called when the pipeline enters `Processing`.
    fn on_extraction_start(&self, filename: &str, mime_type: &str) {
        let _ = (filename, mime_type);
    }

    /// Called when the pipeline enters `Success`.
    fn on_extraction_complete(&self, filename: &str, label_count: usize) {
        let _ = (filename, label_count);
    }

    /// Called when the pipeline enters `Error`.
    fn on_extraction_error(&self, filename: &str, error: &str) {
        let _ = (filename, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        labels: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_extraction_start(&self, _filename: &str, _mime_type: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_extraction_complete(&self, _filename: &str, label_count: usize) {
            self.labels.store(label_count, Ordering::SeqCst);
        }

        fn on_extraction_error(&self, _filename: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_extraction_start("a.jpg", "image/jpeg");
        cb.on_extraction_complete("a.jpg", 3);
        cb.on_extraction_error("a.jpg", "boom");
    }

    #[test]
    fn tracking_callback_receives_events() {
        let cb = Arc::new(TrackingCallback::default());
        let dyn_cb: ProgressCallback = cb.clone();
        dyn_cb.on_extraction_start("a.pdf", "application/pdf");
        dyn_cb.on_extraction_complete("a.pdf", 4);
        dyn_cb.on_extraction_error("b.pdf", "timeout");
        assert_eq!(cb.starts.load(Ordering::SeqCst), 1);
        assert_eq!(cb.labels.load(Ordering::SeqCst), 4);
        assert_eq!(cb.errors.load(Ordering::SeqCst), 1);
    }
}

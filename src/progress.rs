//! Progress-callback trait for batch ingestion events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::IngestConfigBuilder::progress_callback`] to receive
//! real-time events as the pipeline works through documents, scenarios, and
//! row inserts.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a web UI, a terminal spinner, or a log file without the
//! library knowing anything about how the host application communicates. The
//! pipeline itself is strictly sequential, but the trait is `Send + Sync` so
//! the same callback can be shared with other parts of the host application.
//!
//! None of the methods return anything and none may block the pipeline's
//! contract: they are fire-and-forget notifications.

use std::sync::Arc;

/// Called by the ingestion pipeline as it processes a batch.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once before any document is touched.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called just before a document is extracted.
    fn on_document_start(&self, name: &str) {
        let _ = name;
    }

    /// Called when a document has been extracted, structured, and reconciled.
    fn on_document_complete(&self, name: &str, scenario_count: usize, child_count: usize) {
        let _ = (name, scenario_count, child_count);
    }

    /// Called when a document is skipped (unsupported type, unreadable bytes,
    /// or structuring exhausted its retries). The batch continues.
    fn on_document_skipped(&self, name: &str, reason: &str) {
        let _ = (name, reason);
    }

    /// Human-readable status message ("Using existing parent scenario id 17").
    fn on_status(&self, message: &str) {
        let _ = message;
    }

    /// Human-readable warning for a contained, non-fatal failure (image
    /// upload failed, declared image index out of range, row insert failed).
    fn on_warning(&self, message: &str) {
        let _ = message;
    }

    /// Fractional upsert progress in `0.0..=1.0`, emitted after each scenario
    /// is persisted (or fails).
    fn on_upload_progress(&self, fraction: f64) {
        let _ = fraction;
    }

    /// Called once after the batch finishes, with the number of documents
    /// attempted and the number that contributed scenarios.
    fn on_batch_complete(&self, total_documents: usize, processed_documents: usize) {
        let _ = (total_documents, processed_documents);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::IngestConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;

//! Error types for the saq-ingest library.
//!
//! Two distinct error types reflect two distinct failure scopes:
//!
//! * [`IngestError`] — **Fatal**: the pipeline cannot run at all (missing
//!   store credentials, invalid configuration, no generation provider).
//!   Returned from constructors and `build()` before any document is touched.
//!
//! * [`DocumentError`] — **Per-document, non-fatal to the batch**: one
//!   document could not be read or structured. The batch records the failure
//!   in its [`crate::model::DocumentReport`] and moves on to the next
//!   document.
//!
//! Image-upload and row-insert failures sit at an even narrower scope and are
//! not error-typed at all: they are logged, reported through the progress
//! sink, and counted in [`crate::model::UploadSummary`]. A single bad image,
//! child, scenario, or document never aborts processing of its siblings.

use thiserror::Error;

/// All fatal errors returned by the saq-ingest library.
///
/// Document-level failures use [`DocumentError`] and are recorded in the
/// batch summary rather than propagated here.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A required credential environment variable is unset or empty.
    #[error("Missing credential: environment variable '{var}' is not set.\nThe pipeline cannot start without it.")]
    MissingCredentials { var: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No text-generation provider could be resolved.
    #[error("Text-generation provider is not configured.\n{hint}")]
    ProviderNotConfigured { hint: String },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single document.
///
/// Stored in [`crate::model::DocumentReport::skipped`] when a document is
/// skipped. The overall batch continues with the remaining documents.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The declared MIME type is not one the extractor understands.
    #[error("Unsupported document type: '{mime}'\nSupported: PDF, DOCX, plain text.")]
    UnsupportedFormat { mime: String },

    /// The document bytes could not be read as the declared type.
    #[error("Document extraction failed: {detail}")]
    ExtractionFailed { detail: String },

    /// The generation service itself errored (transport, auth, content
    /// filter). Not retried — only malformed *output* is worth a second
    /// attempt.
    #[error("Text generation failed: {detail}")]
    GenerationFailed { detail: String },

    /// The generation output never parsed as valid scenario JSON within the
    /// retry budget. `raw_output` holds the last offending output so callers
    /// can inspect what the model actually returned.
    #[error("Structuring failed after {attempts} attempts: output was never valid scenario JSON")]
    StructuringFailed { attempts: u32, raw_output: String },
}

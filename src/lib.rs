//! # saq-ingest
//!
//! Turn teaching documents (PDF, DOCX, plain text) into structured
//! short-answer-question scenarios persisted in a hosted relational +
//! object store.
//!
//! ## Why this crate?
//!
//! Exam-style study material arrives as loosely formatted documents: a case
//! vignette, a handful of sub-questions, maybe a figure. Hand-transcribing
//! those into a question bank is slow and error-prone. This crate extracts
//! the text and embedded images, has an LLM reformat the text into a strict
//! scenario schema (reformatting only, never inventing content), links each
//! scenario to its figure, and upserts the result as parent/child rows.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Documents
//!  │
//!  ├─ 1. Extract    text + images via pdfium / zip (CPU-bound, spawn_blocking)
//!  ├─ 2. Structure  LLM reformats text into scenario JSON, bounded retry
//!  ├─ 3. Reconcile  match declared image ordinals, upload to blob store
//!  └─ 4. Upsert     lookup-before-insert parent/child rows, per-row counters
//! ```
//!
//! Processing is strictly sequential and failures are contained at the
//! narrowest scope that can absorb them: a bad image costs the scenario its
//! image, a bad scenario costs its rows, a bad document costs its scenarios,
//! and only missing credentials or invalid configuration abort a run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use saq_ingest::{DocumentInput, IngestConfig, Ingestor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Generation provider from OPENAI_API_KEY, stores from
//!     // SAQ_STORE_URL / SAQ_STORE_KEY.
//!     let ingestor = Ingestor::from_env(IngestConfig::default())?;
//!
//!     let bytes = std::fs::read("cardiology_cases.pdf")?;
//!     let docs = vec![DocumentInput::new(
//!         "cardiology_cases.pdf",
//!         "application/pdf",
//!         bytes,
//!     )];
//!
//!     let summary = ingestor.ingest_batch(&docs).await;
//!     println!(
//!         "{} of {} documents processed, {} parents and {} children persisted",
//!         summary.processed_documents(),
//!         summary.reports.len(),
//!         summary.upload.parent_success,
//!         summary.upload.child_success,
//!     );
//!     Ok(())
//! }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod generate;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IngestConfig, IngestConfigBuilder};
pub use error::{DocumentError, IngestError};
pub use generate::{GenerateError, LlmGenerator, TextGenerator};
pub use ingest::{DocumentInput, Ingestor};
pub use model::{
    BatchSummary, ChildQuestion, DocumentReport, ExtractedImage, Extraction, ImageHint,
    ScenarioRecord, UploadSummary,
};
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use store::{BlobStore, RelationalStore, RestStore, StoreError};

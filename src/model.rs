//! Data types flowing through the ingestion pipeline.
//!
//! The flow is strictly left to right:
//!
//! ```text
//! raw bytes ─▶ Extraction ─▶ Vec<ScenarioRecord> ─▶ reconciled ─▶ UploadSummary
//! ```
//!
//! [`ExtractedImage`] and [`ImageHint`] are transient: images exist only
//! between extraction and reconciliation, and hints only between structuring
//! and reconciliation. Neither survives into the persisted form — only the
//! uploaded image's public location does.

use serde::{Deserialize, Serialize};

/// A raster image pulled out of a source document.
///
/// Ephemeral: created by the extractor, consumed by the reconciler, never
/// persisted as-is.
#[derive(Debug, Clone)]
pub struct ExtractedImage {
    /// Encoded image bytes (PNG for PDF-sourced images, original container
    /// bytes for DOCX media).
    pub bytes: Vec<u8>,
    /// Decoded pixel width.
    pub width: u32,
    /// Decoded pixel height.
    pub height: u32,
    /// 1-indexed page the image came from. `None` for DOCX, where the
    /// container gives no positional link between media and text.
    pub page: Option<usize>,
    /// Sequence index within the whole document (the reconciler's anchor).
    pub index: usize,
    /// File extension inferred from the source ("png", "jpg", ...).
    pub extension: String,
}

/// Result of extracting one document: flattened text plus embedded images
/// in document order.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub text: String,
    pub images: Vec<ExtractedImage>,
}

/// A sub-question belonging to a scenario. No identity until persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildQuestion {
    pub question_lead: String,
    pub ideal_answer: String,
    pub key_concept: String,
}

/// A transient parsing hint: the structurer detected an image reference in
/// the source text and declared which extracted image (by ordinal) it means.
///
/// Must not survive reconciliation — [`crate::pipeline::reconcile`] always
/// clears it, whether or not an upload happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHint {
    /// 0-based ordinal into the document's extracted-image sequence.
    pub position: usize,
}

/// One structured scenario: a parent question stem with its sub-questions.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioRecord {
    /// The scenario / case description used as the parent question stem.
    pub parent_question: String,
    /// Module / category identifier.
    pub module_id: i64,
    /// Ordered sub-questions.
    pub children: Vec<ChildQuestion>,
    /// Transient image association, present only between structuring and
    /// reconciliation.
    pub image_hint: Option<ImageHint>,
    /// Public location of the uploaded image, set by reconciliation.
    pub image_url: Option<String>,
}

/// Insert payload for the parent table. Column names follow the hosted
/// schema, hence the camelCase rename.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRow {
    pub parent_question: String,
    pub module_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Insert payload for the child table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRow {
    pub question_lead: String,
    pub ideal_answer: String,
    pub key_concept: String,
    pub parent_question_id: i64,
}

/// Per-row outcome counters for one upsert run.
///
/// "Success" includes the existing-row path: finding an already-persisted
/// parent or child counts as success, not as an error, so re-running the same
/// batch reports all-success rather than all-duplicate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub parent_success: usize,
    pub parent_errors: usize,
    pub child_success: usize,
    pub child_errors: usize,
    pub total_scenarios: usize,
}

impl UploadSummary {
    /// True when every parent and child row went through cleanly.
    pub fn is_complete(&self) -> bool {
        self.parent_errors == 0 && self.child_errors == 0
    }

    /// True when at least one row succeeded but at least one failed.
    pub fn is_partial(&self) -> bool {
        !self.is_complete() && (self.parent_success > 0 || self.child_success > 0)
    }
}

/// Outcome for one document in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    pub name: String,
    pub scenario_count: usize,
    pub child_count: usize,
    pub image_count: usize,
    /// Why the document contributed zero scenarios, if it was skipped.
    pub skipped: Option<String>,
}

/// Outcome of a whole batch: per-document reports plus the final upsert
/// counters. A batch never reduces to a single pass/fail verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub reports: Vec<DocumentReport>,
    pub upload: UploadSummary,
}

impl BatchSummary {
    /// Number of documents that produced at least one scenario.
    pub fn processed_documents(&self) -> usize {
        self.reports.iter().filter(|r| r.skipped.is_none()).count()
    }
}

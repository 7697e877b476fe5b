//! Pipeline stages for document-to-database ingestion.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different document backend) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ structure ──▶ reconcile ──▶ upsert
//! (pdfium/zip)  (LLM+parse)  (blob store)  (relational store)
//! ```
//!
//! 1. [`extract`]   — raw bytes + declared MIME → plain text and embedded
//!    raster images; pdfium work runs in `spawn_blocking`
//! 2. [`structure`] — text → ordered scenario records via the generation
//!    service, with parse/validate and bounded retry; the only stage that
//!    retries
//! 3. [`reconcile`] — match declared image ordinals to extracted images,
//!    upload matches, and strip the transient hint fields
//! 4. [`upsert`]    — lookup-before-insert persistence of parent and child
//!    rows with per-row error isolation

pub mod extract;
pub mod reconcile;
pub mod structure;
pub mod upsert;

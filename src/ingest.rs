//! Batch orchestration: drive documents through the full pipeline and
//! persist the combined result.
//!
//! [`Ingestor`] owns the three service seams (text generation, blob store,
//! relational store) plus the run configuration. Documents are processed
//! strictly one at a time, in the order given; a document that fails is
//! recorded in its [`DocumentReport`] and the batch moves on. The single
//! upsert happens after every document has been extracted, structured, and
//! reconciled, so a late document failure never leaves an earlier document
//! half-persisted.

use crate::config::IngestConfig;
use crate::error::{DocumentError, IngestError};
use crate::generate::{LlmGenerator, TextGenerator};
use crate::model::{BatchSummary, DocumentReport, ScenarioRecord};
use crate::pipeline::{extract, reconcile, structure, upsert};
use crate::store::{BlobStore, RelationalStore, RestStore};
use std::sync::Arc;
use tracing::{info, warn};

/// One document handed to the pipeline: a display name, the caller-declared
/// MIME type, and the raw bytes.
///
/// The MIME type is trusted as declared. Sniffing is deliberately out of
/// scope; a wrong declaration surfaces as an extraction failure for that
/// document only.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DocumentInput {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }
}

/// The assembled pipeline. Construct with explicit services via
/// [`Ingestor::new`], or from the process environment via
/// [`Ingestor::from_env`].
pub struct Ingestor {
    generator: Arc<dyn TextGenerator>,
    blob_store: Arc<dyn BlobStore>,
    relational_store: Arc<dyn RelationalStore>,
    config: IngestConfig,
}

impl Ingestor {
    /// Assemble a pipeline from explicit service implementations.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        blob_store: Arc<dyn BlobStore>,
        relational_store: Arc<dyn RelationalStore>,
        config: IngestConfig,
    ) -> Self {
        Self {
            generator,
            blob_store,
            relational_store,
            config,
        }
    }

    /// Assemble a pipeline from environment credentials: the generation
    /// provider from `OPENAI_API_KEY` (or the provider auto-detection
    /// fallback) and both store halves from `SAQ_STORE_URL` /
    /// `SAQ_STORE_KEY`.
    ///
    /// Fails before any document is touched if any credential is missing.
    pub fn from_env(config: IngestConfig) -> Result<Self, IngestError> {
        let generator: Arc<dyn TextGenerator> = Arc::new(LlmGenerator::from_env(None)?);
        let store = Arc::new(RestStore::from_env()?);
        Ok(Self::new(generator, store.clone(), store, config))
    }

    /// Run one document through extract, structure, and reconcile.
    ///
    /// Returns the reconciled scenarios plus the number of images the
    /// extractor found. Persistence is not part of this call; see
    /// [`Ingestor::ingest_batch`].
    pub async fn ingest_document(
        &self,
        document: &DocumentInput,
    ) -> Result<(Vec<ScenarioRecord>, usize), DocumentError> {
        let extraction = extract::extract(&document.bytes, &document.mime).await?;
        info!(
            "'{}': extracted {} chars, {} images",
            document.name,
            extraction.text.len(),
            extraction.images.len()
        );

        let scenarios = structure::structure(
            &self.generator,
            &extraction.text,
            extraction.images.len(),
            &self.config,
        )
        .await?;

        let scenarios = reconcile::reconcile(
            scenarios,
            &extraction.images,
            &self.blob_store,
            &self.config,
        )
        .await;

        Ok((scenarios, extraction.images.len()))
    }

    /// Process a batch of documents and persist everything they yield.
    ///
    /// Never fails as a whole: each document's outcome lands in its
    /// [`DocumentReport`], and persistence outcomes land in the
    /// [`crate::model::UploadSummary`] counters.
    pub async fn ingest_batch(&self, documents: &[DocumentInput]) -> BatchSummary {
        if let Some(cb) = &self.config.progress_callback {
            cb.on_batch_start(documents.len());
        }

        let mut reports = Vec::with_capacity(documents.len());
        let mut pending: Vec<ScenarioRecord> = Vec::new();

        for document in documents {
            if let Some(cb) = &self.config.progress_callback {
                cb.on_document_start(&document.name);
            }

            match self.ingest_document(document).await {
                Ok((scenarios, image_count)) => {
                    let child_count = scenarios.iter().map(|s| s.children.len()).sum();
                    if let Some(cb) = &self.config.progress_callback {
                        cb.on_document_complete(&document.name, scenarios.len(), child_count);
                    }
                    reports.push(DocumentReport {
                        name: document.name.clone(),
                        scenario_count: scenarios.len(),
                        child_count,
                        image_count,
                        skipped: None,
                    });
                    pending.extend(scenarios);
                }
                Err(e) => {
                    warn!("'{}' skipped: {e}", document.name);
                    if let Some(cb) = &self.config.progress_callback {
                        cb.on_document_skipped(&document.name, &e.to_string());
                    }
                    reports.push(DocumentReport {
                        name: document.name.clone(),
                        scenario_count: 0,
                        child_count: 0,
                        image_count: 0,
                        skipped: Some(e.to_string()),
                    });
                }
            }
        }

        let upload = upsert::upsert(&pending, &self.relational_store, &self.config).await;

        let summary = BatchSummary { reports, upload };
        if let Some(cb) = &self.config.progress_callback {
            cb.on_batch_complete(documents.len(), summary.processed_documents());
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::GenerateError;
    use crate::progress::IngestProgressCallback;
    use crate::store::StoreError;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    struct CannedGenerator {
        output: String,
    }

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(
            &self,
            _system: &str,
            _user: &str,
            _temperature: f32,
        ) -> Result<String, GenerateError> {
            Ok(self.output.clone())
        }
    }

    struct NullBlobStore;

    #[async_trait]
    impl BlobStore for NullBlobStore {
        async fn ensure_container(&self, _name: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn put(
            &self,
            container: &str,
            object: &str,
            _bytes: &[u8],
            _content_type: &str,
        ) -> Result<String, StoreError> {
            Ok(format!("https://blob.example/{container}/{object}"))
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<std::collections::HashMap<String, Vec<Value>>>,
        next_id: AtomicI64,
    }

    #[async_trait]
    impl RelationalStore for MemoryStore {
        async fn select_eq(
            &self,
            table: &str,
            filters: &[(&str, String)],
        ) -> Result<Vec<Value>, StoreError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .get(table)
                .map(|rows| {
                    rows.iter()
                        .filter(|r| {
                            filters.iter().all(|(c, v)| match r.get(*c) {
                                Some(Value::String(s)) => s == v,
                                Some(Value::Number(n)) => n.to_string() == *v,
                                _ => false,
                            })
                        })
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn insert(&self, table: &str, record: Value) -> Result<Vec<Value>, StoreError> {
            let mut row = record;
            row["id"] = json!(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            self.rows
                .lock()
                .unwrap()
                .entry(table.to_string())
                .or_default()
                .push(row.clone());
            Ok(vec![row])
        }
    }

    #[derive(Default)]
    struct EventLog {
        events: Mutex<Vec<String>>,
    }

    impl IngestProgressCallback for EventLog {
        fn on_batch_start(&self, total: usize) {
            self.events.lock().unwrap().push(format!("start {total}"));
        }

        fn on_document_skipped(&self, name: &str, _reason: &str) {
            self.events.lock().unwrap().push(format!("skipped {name}"));
        }

        fn on_batch_complete(&self, total: usize, processed: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("complete {processed}/{total}"));
        }
    }

    fn scenario_json() -> String {
        json!([{
            "parentQuestion": "A 30-year-old presents with fever.",
            "moduleId": 1,
            "hasImage": false,
            "childQuestions": [
                { "questionLead": "Diagnosis?", "idealAnswer": "Sepsis.", "keyConcept": "Sepsis" },
                { "questionLead": "First step?", "idealAnswer": "Cultures.", "keyConcept": "Workup" }
            ]
        }])
        .to_string()
    }

    fn ingestor(output: String, store: Arc<MemoryStore>, config: IngestConfig) -> Ingestor {
        Ingestor::new(
            Arc::new(CannedGenerator { output }),
            Arc::new(NullBlobStore),
            store,
            config,
        )
    }

    #[tokio::test]
    async fn text_document_flows_end_to_end() {
        let store = Arc::new(MemoryStore::default());
        let ing = ingestor(scenario_json(), store.clone(), IngestConfig::default());

        let docs = vec![DocumentInput::new(
            "notes.txt",
            "text/plain",
            b"Fever case notes.".to_vec(),
        )];
        let summary = ing.ingest_batch(&docs).await;

        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.reports[0].scenario_count, 1);
        assert_eq!(summary.reports[0].child_count, 2);
        assert!(summary.reports[0].skipped.is_none());
        assert!(summary.upload.is_complete());
        assert_eq!(summary.upload.parent_success, 1);
        assert_eq!(summary.upload.child_success, 2);

        let rows = store.rows.lock().unwrap();
        assert_eq!(rows["saqParent"].len(), 1);
        assert_eq!(rows["saqChild"].len(), 2);
    }

    #[tokio::test]
    async fn unsupported_document_is_reported_not_fatal() {
        let store = Arc::new(MemoryStore::default());
        let cb = Arc::new(EventLog::default());
        let config = IngestConfig::builder()
            .progress_callback(cb.clone())
            .build()
            .unwrap();
        let ing = ingestor(scenario_json(), store, config);

        let docs = vec![
            DocumentInput::new("sheet.xlsx", "application/vnd.ms-excel", vec![1, 2]),
            DocumentInput::new("notes.txt", "text/plain", b"Fever case.".to_vec()),
        ];
        let summary = ing.ingest_batch(&docs).await;

        assert_eq!(summary.reports.len(), 2);
        assert!(summary.reports[0].skipped.is_some());
        assert!(summary.reports[1].skipped.is_none());
        assert_eq!(summary.processed_documents(), 1);

        let events = cb.events.lock().unwrap();
        assert!(events.contains(&"start 2".to_string()));
        assert!(events.contains(&"skipped sheet.xlsx".to_string()));
        assert!(events.contains(&"complete 1/2".to_string()));
    }

    #[tokio::test]
    async fn structuring_failure_skips_only_that_document() {
        let store = Arc::new(MemoryStore::default());
        let config = IngestConfig::builder()
            .max_attempts(1)
            .retry_delay(std::time::Duration::ZERO)
            .build()
            .unwrap();
        let ing = ingestor("definitely not json".to_string(), store.clone(), config);

        let docs = vec![DocumentInput::new(
            "notes.txt",
            "text/plain",
            b"Fever case.".to_vec(),
        )];
        let summary = ing.ingest_batch(&docs).await;

        assert_eq!(summary.processed_documents(), 0);
        assert_eq!(summary.upload.total_scenarios, 0);
        let reason = summary.reports[0].skipped.as_deref().unwrap();
        assert!(reason.contains("1 attempt"), "got: {reason}");
        assert!(store.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ingest_document_does_not_persist() {
        let store = Arc::new(MemoryStore::default());
        let ing = ingestor(scenario_json(), store.clone(), IngestConfig::default());

        let doc = DocumentInput::new("notes.txt", "text/plain", b"Fever case.".to_vec());
        let (scenarios, image_count) = ing.ingest_document(&doc).await.unwrap();

        assert_eq!(scenarios.len(), 1);
        assert_eq!(image_count, 0);
        assert!(store.rows.lock().unwrap().is_empty());
    }
}

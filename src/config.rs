//! Configuration for the ingestion pipeline.
//!
//! All pipeline behaviour is controlled through [`IngestConfig`], built via
//! its [`IngestConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share a config across components and to diff two runs to
//! understand why their outcomes differ.

use crate::error::IngestError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::time::Duration;

/// Configuration for a batch ingestion run.
///
/// Built via [`IngestConfig::builder()`] or [`IngestConfig::default()`].
///
/// # Example
/// ```rust
/// use saq_ingest::IngestConfig;
///
/// let config = IngestConfig::builder()
///     .max_attempts(2)
///     .bucket("exam-images")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// Total structuring attempts per document (first try + retries).
    /// Default: 3.
    ///
    /// Only malformed-JSON output is retried. A model at temperature 0 that
    /// produced broken JSON once usually produces valid JSON on a clean
    /// re-ask, so a small fixed budget catches the common case without
    /// stalling the batch.
    pub max_attempts: u32,

    /// Fixed delay between structuring attempts. Default: 5 s.
    ///
    /// Fixed rather than exponential: there is exactly one in-flight request
    /// at a time, so there is no herd to spread out.
    pub retry_delay: Duration,

    /// Sampling temperature for the structuring completion. Default: 0.0.
    ///
    /// Zero makes the model deterministic and faithful to the source text,
    /// which is exactly what a reformatting task wants.
    pub temperature: f32,

    /// Blob-store container for uploaded scenario images. Default: "mcq-images".
    pub bucket: String,

    /// Parent scenario table. Default: "saqParent".
    pub parent_table: String,

    /// Child question table. Default: "saqChild".
    pub child_table: String,

    /// Optional progress sink for status, warnings, and upload progress.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
            temperature: 0.0,
            bucket: "mcq-images".to_string(),
            parent_table: "saqParent".to_string(),
            child_table: "saqChild".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .field("temperature", &self.temperature)
            .field("bucket", &self.bucket)
            .field("parent_table", &self.parent_table)
            .field("child_table", &self.child_table)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn IngestProgressCallback>"),
            )
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`IngestConfig`].
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn bucket(mut self, name: impl Into<String>) -> Self {
        self.config.bucket = name.into();
        self
    }

    pub fn parent_table(mut self, name: impl Into<String>) -> Self {
        self.config.parent_table = name.into();
        self
    }

    pub fn child_table(mut self, name: impl Into<String>) -> Self {
        self.config.child_table = name.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(IngestError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.bucket.is_empty() {
            return Err(IngestError::InvalidConfig("bucket must not be empty".into()));
        }
        if c.parent_table.is_empty() || c.child_table.is_empty() {
            return Err(IngestError::InvalidConfig(
                "table names must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

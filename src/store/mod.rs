//! Persistence seams: the blob store and relational store the pipeline
//! writes to.
//!
//! Both collaborators are narrow async traits so tests can substitute
//! in-memory fakes and the upsert logic never sees a vendor SDK. The one
//! production implementation, [`rest::RestStore`], talks to a hosted
//! Postgres-REST + object-storage service over plain HTTP.
//!
//! The relational interface is deliberately tiny — exact-match select and
//! insert-returning-rows — because that is everything the append-only,
//! lookup-before-insert coordinator needs. There is no update and no delete
//! on purpose.

pub mod rest;

use async_trait::async_trait;
use thiserror::Error;

pub use rest::RestStore;

/// A failure talking to a remote store. Per-row scope: callers count it and
/// continue.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request never completed (connection, timeout, serialisation).
    #[error("store request failed: {0}")]
    Request(String),

    /// The service answered with a non-success status.
    #[error("store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Object storage for scenario images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Make sure the named container exists (idempotent).
    async fn ensure_container(&self, name: &str) -> Result<(), StoreError>;

    /// Upload `bytes` under `object` in `container` and return the public
    /// location of the stored object.
    async fn put(
        &self,
        container: &str,
        object: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StoreError>;
}

/// Relational storage for parent/child rows.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Select rows from `table` where every `(column, value)` pair matches
    /// exactly.
    async fn select_eq(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<serde_json::Value>, StoreError>;

    /// Insert one record into `table`, returning the inserted row(s) with
    /// their generated ids.
    async fn insert(
        &self,
        table: &str,
        record: serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, StoreError>;
}

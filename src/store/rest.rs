//! REST implementation of the store traits against a hosted
//! Postgres-REST + object-storage backend.
//!
//! Conventions (one base URL, one service key for both halves):
//!
//! * relational — `GET/POST {base}/rest/v1/{table}` with `column=eq.value`
//!   filters and `Prefer: return=representation` so inserts hand back the
//!   generated ids;
//! * storage — `POST {base}/storage/v1/object/{bucket}/{object}`, with the
//!   public location at `{base}/storage/v1/object/public/{bucket}/{object}`;
//! * bucket creation — `POST {base}/storage/v1/bucket` (public bucket), only
//!   attempted when the existence probe fails.
//!
//! Credentials come from two environment variables, `SAQ_STORE_URL` and
//! `SAQ_STORE_KEY`. Their absence fails construction immediately — the
//! pipeline must never get halfway through a batch before discovering it
//! cannot persist anything.

use crate::error::IngestError;
use crate::store::{BlobStore, RelationalStore, StoreError};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

/// Environment variable naming the store base URL.
pub const STORE_URL_VAR: &str = "SAQ_STORE_URL";
/// Environment variable naming the store service key.
pub const STORE_KEY_VAR: &str = "SAQ_STORE_KEY";

/// HTTP client for the hosted relational + object store.
#[derive(Debug)]
pub struct RestStore {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl RestStore {
    /// Build a store client from explicit credentials.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build a store client from `SAQ_STORE_URL` and `SAQ_STORE_KEY`.
    pub fn from_env() -> Result<Self, IngestError> {
        let base_url = require_env(STORE_URL_VAR)?;
        let api_key = require_env(STORE_KEY_VAR)?;
        Ok(Self::new(base_url, api_key))
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    /// Public URL of a stored object.
    pub fn public_url(&self, container: &str, object: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{container}/{object}",
            self.base_url
        )
    }
}

fn require_env(var: &str) -> Result<String, IngestError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(IngestError::MissingCredentials { var: var.into() }),
    }
}

async fn into_store_error(response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    StoreError::Status { status, body }
}

#[async_trait]
impl RelationalStore for RestStore {
    async fn select_eq(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        let url = format!("{}/rest/v1/{table}", self.base_url);
        let mut query: Vec<(String, String)> = vec![("select".into(), "*".into())];
        for (column, value) in filters {
            query.push(((*column).into(), format!("eq.{value}")));
        }

        let response = self
            .authed(self.client.get(&url).query(&query))
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(into_store_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::Request(format!("invalid select response: {e}")))
    }

    async fn insert(
        &self,
        table: &str,
        record: serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        let url = format!("{}/rest/v1/{table}", self.base_url);
        debug!("insert into {table}");

        let response = self
            .authed(self.client.post(&url))
            .header("Prefer", "return=representation")
            .json(&record)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(into_store_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::Request(format!("invalid insert response: {e}")))
    }
}

#[async_trait]
impl BlobStore for RestStore {
    async fn ensure_container(&self, name: &str) -> Result<(), StoreError> {
        let probe_url = format!("{}/storage/v1/bucket/{name}", self.base_url);
        let probe = self
            .authed(self.client.get(&probe_url))
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        if probe.status().is_success() {
            return Ok(());
        }

        let create_url = format!("{}/storage/v1/bucket", self.base_url);
        let response = self
            .authed(self.client.post(&create_url))
            .json(&json!({ "id": name, "name": name, "public": true }))
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(into_store_error(response).await);
        }

        info!("created storage bucket '{name}'");
        Ok(())
    }

    async fn put(
        &self,
        container: &str,
        object: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StoreError> {
        let url = format!("{}/storage/v1/object/{container}/{object}", self.base_url);

        let response = self
            .authed(self.client.post(&url))
            .header("Content-Type", content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(into_store_error(response).await);
        }

        Ok(self.public_url(container, object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_trailing_slash() {
        let store = RestStore::new("https://example.supabase.co/", "key");
        assert_eq!(
            store.public_url("mcq-images", "a.png"),
            "https://example.supabase.co/storage/v1/object/public/mcq-images/a.png"
        );
    }

    #[test]
    fn from_env_fails_without_credentials() {
        std::env::remove_var(STORE_URL_VAR);
        std::env::remove_var(STORE_KEY_VAR);
        match RestStore::from_env() {
            Err(IngestError::MissingCredentials { var }) => assert_eq!(var, STORE_URL_VAR),
            other => panic!("expected MissingCredentials, got {other:?}"),
        }
    }
}

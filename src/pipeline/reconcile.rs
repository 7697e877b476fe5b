//! Image reconciliation: resolve each scenario's declared image ordinal
//! against the extracted images, upload the matches, and strip the transient
//! hint fields.
//!
//! ## Invariant
//!
//! No [`ScenarioRecord`] leaves this stage with an `image_hint` — the hint is
//! a parsing artefact, consumed here whether or not an upload happened. The
//! `image_url` field is afterwards either absent or a dereferenceable
//! location string returned by the blob store.
//!
//! Every failure in this stage is contained: an out-of-range ordinal or a
//! failed upload is reported and the scenario simply proceeds without an
//! image.

use crate::config::IngestConfig;
use crate::model::{ExtractedImage, ScenarioRecord};
use crate::store::BlobStore;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Attach uploaded-image locations to scenarios and clear all hints.
pub async fn reconcile(
    scenarios: Vec<ScenarioRecord>,
    images: &[ExtractedImage],
    blob_store: &Arc<dyn BlobStore>,
    config: &IngestConfig,
) -> Vec<ScenarioRecord> {
    let any_resolvable = scenarios
        .iter()
        .any(|s| s.image_hint.is_some_and(|h| h.position < images.len()));

    if any_resolvable {
        if let Err(e) = blob_store.ensure_container(&config.bucket).await {
            report_warning(
                config,
                &format!("could not ensure bucket '{}': {e}", config.bucket),
            );
        }
    }

    let mut out = Vec::with_capacity(scenarios.len());
    for (ordinal, mut scenario) in scenarios.into_iter().enumerate() {
        if let Some(hint) = scenario.image_hint.take() {
            if hint.position >= images.len() {
                report_warning(
                    config,
                    &format!(
                        "scenario {}: declared image {} is out of range ({} extracted); continuing without an image",
                        ordinal + 1,
                        hint.position,
                        images.len()
                    ),
                );
            } else {
                let image = &images[hint.position];
                // Random token for collision resistance, ordinal for
                // traceable diagnostics.
                let object = format!(
                    "saq_scenario_{}_{}.{}",
                    ordinal,
                    Uuid::new_v4(),
                    image.extension
                );

                match blob_store
                    .put(
                        &config.bucket,
                        &object,
                        &image.bytes,
                        &content_type(&image.extension),
                    )
                    .await
                {
                    Ok(url) => {
                        info!("scenario {}: uploaded image as {object}", ordinal + 1);
                        if let Some(cb) = &config.progress_callback {
                            cb.on_status(&format!(
                                "Linked image {} to scenario {}",
                                hint.position,
                                ordinal + 1
                            ));
                        }
                        scenario.image_url = Some(url);
                    }
                    Err(e) => report_warning(
                        config,
                        &format!(
                            "scenario {}: image upload failed ({e}); continuing without an image",
                            ordinal + 1
                        ),
                    ),
                }
            }
        }
        out.push(scenario);
    }
    out
}

fn report_warning(config: &IngestConfig, message: &str) {
    warn!("{message}");
    if let Some(cb) = &config.progress_callback {
        cb.on_warning(message);
    }
}

fn content_type(extension: &str) -> String {
    match extension {
        "jpg" => "image/jpeg".to_string(),
        other => format!("image/{other}"),
    }
}

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use leptess::LepTess;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

use crate::config::{parse_ocr_provider_model, OcrConfig};
use crate::error::{OcrBatchError, Result};

use super::api::VisionApiClient;
use super::OcrEngine;

enum OcrBackend {
    Local { tesseract: Arc<Mutex<LepTess>> },
    Api { client: VisionApiClient },
}

/// One OCR engine instance, owned by a single pool worker.
///
/// Unlike a shared provider, creation fails hard: a batch cannot run
/// without its engines.
pub struct OcrProvider {
    backend: OcrBackend,
    config: OcrConfig,
}

fn create_tesseract(languages: &str) -> std::result::Result<LepTess, String> {
    LepTess::new(None, languages).map_err(|e| e.to_string())
}

impl OcrProvider {
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let (provider, _) = parse_ocr_provider_model(&config.model);

        let backend = match provider.to_lowercase().as_str() {
            "openai" => {
                let client = VisionApiClient::new(config)?;
                info!(model = client.model(), "Vision OCR API backend initialized");
                OcrBackend::Api { client }
            }
            _ => {
                let tesseract = create_tesseract(&config.languages).map_err(|e| {
                    OcrBatchError::OcrUnavailable(format!("Tesseract not available: {e}"))
                })?;
                info!(languages = %config.languages, "Tesseract OCR initialized");
                OcrBackend::Local {
                    tesseract: Arc::new(Mutex::new(tesseract)),
                }
            }
        };

        Ok(Self {
            backend,
            config: config.clone(),
        })
    }

    /// Recognize the text in an encoded image, bounded by the configured timeout.
    ///
    /// A timed-out Tesseract call cannot be interrupted: it keeps running on
    /// the blocking pool and holds the engine until it returns. The next call
    /// waits for the engine before its own timeout starts.
    pub async fn ocr(&self, image_path: &Path, image_bytes: Vec<u8>) -> Result<String> {
        let timeout_duration = Duration::from_secs(self.config.timeout_secs);

        let result = match &self.backend {
            OcrBackend::Local { tesseract } => {
                let engine = Arc::clone(tesseract).lock_owned().await;
                tokio::time::timeout(timeout_duration, recognize_local(engine, image_bytes)).await
            }
            OcrBackend::Api { client } => {
                tokio::time::timeout(timeout_duration, client.ocr(image_path, &image_bytes)).await
            }
        };

        match result {
            Ok(inner_result) => inner_result,
            Err(_) => Err(OcrBatchError::Ocr(format!(
                "OCR operation timed out after {} seconds",
                self.config.timeout_secs
            ))),
        }
    }
}

async fn recognize_local(
    mut engine: OwnedMutexGuard<LepTess>,
    image_bytes: Vec<u8>,
) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        engine
            .set_image_from_mem(&image_bytes)
            .map_err(|e| OcrBatchError::Ocr(format!("Failed to set image: {e}")))?;
        engine
            .get_utf8_text()
            .map_err(|e| OcrBatchError::Ocr(format!("Failed to extract text: {e}")))
    })
    .await
    .map_err(|e| OcrBatchError::Ocr(format!("OCR task panicked: {e}")))?
}

#[async_trait]
impl OcrEngine for OcrProvider {
    async fn recognize(&self, image_path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(image_path).await?;
        self.ocr(image_path, bytes).await
    }
}

//! OCR engines and the worker pool that drives them.
//!
//! # Architecture
//!
//! - `OcrEngine` is the seam between the batch and a recognizer: given an
//!   image path it returns the raw recognized text.
//! - `OcrProvider` implements it with local Tesseract (via leptess) or an
//!   OpenAI-compatible vision API, selected by `OcrConfig::model`.
//! - `WorkerPool` owns a fixed number of engines, one per worker, and hands
//!   queued jobs to whichever worker is free.
//!
//! # Usage
//!
//! ```rust,ignore
//! let pool = WorkerPool::start(2, |_| Ok(Arc::new(OcrProvider::new(&config.ocr)?) as _))?;
//! let raw = pool.recognize(Path::new("input/page.png")).await?;
//! pool.terminate().await;
//! ```

mod api;
mod pool;
mod provider;

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

pub use api::VisionApiClient;
pub use pool::WorkerPool;
pub use provider::OcrProvider;

/// A recognizer that turns one image file into raw text.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image_path: &Path) -> Result<String>;
}

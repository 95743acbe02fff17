//! Batch OCR: recognize every image under a directory tree and write the
//! cleaned text to a mirrored tree of `.txt` files.

pub mod batch;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod ocr;
pub mod walker;

pub use batch::{prepare_directories, run_batch, BatchReport, FailureStage};
pub use cleaner::clean;
pub use config::Config;
pub use error::{OcrBatchError, Result};
pub use ocr::{OcrEngine, OcrProvider, WorkerPool};

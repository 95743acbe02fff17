use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrBatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("OCR unavailable: {0}")]
    OcrUnavailable(String),

    #[error("Worker pool error: {0}")]
    Pool(String),

    #[error("Job cancelled before it was recognized")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, OcrBatchError>;

use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::error::{OcrBatchError, Result};

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub batch: BatchConfig,
    pub ocr: OcrConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Number of concurrent OCR workers, fixed for the whole run.
    pub workers: usize,
    /// Remove the previous output tree before writing new results.
    pub clean_output: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub languages: String,
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            model: "local/tesseract".to_string(),
            api_key: None,
            base_url: None,
            languages: "fra".to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch: BatchConfig {
                input_dir: env::var("OCR_INPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./input")),
                output_dir: env::var("OCR_OUTPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./output")),
                workers: parse_env_or("OCR_WORKERS", 2),
                clean_output: parse_env_or("OCR_CLEAN_OUTPUT", true),
            },
            ocr: OcrConfig {
                model: env::var("OCR_MODEL").unwrap_or_else(|_| "local/tesseract".to_string()),
                api_key: env::var("OCR_API_KEY").ok(),
                base_url: env::var("OCR_BASE_URL").ok(),
                languages: env::var("OCR_LANGUAGES").unwrap_or_else(|_| "fra".to_string()),
                timeout_secs: parse_env_or("OCR_TIMEOUT", 60),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Reject settings the batch cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.batch.workers == 0 {
            return Err(OcrBatchError::Config(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.ocr.timeout_secs == 0 {
            return Err(OcrBatchError::Config(
                "OCR timeout must be at least 1 second".to_string(),
            ));
        }
        if self.batch.input_dir == self.batch.output_dir {
            return Err(OcrBatchError::Config(format!(
                "input and output directories must differ: {}",
                self.batch.input_dir.display()
            )));
        }
        Ok(())
    }
}

/// Split an OCR model name into (provider, model).
///
/// Names without a known provider prefix run on the local Tesseract engine.
pub fn parse_ocr_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if prefix_lower == "openai" || prefix_lower == "local" {
            return (prefix, rest);
        }
    }
    ("local", model)
}

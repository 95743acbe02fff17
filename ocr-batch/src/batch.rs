use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::cleaner::clean;
use crate::config::BatchConfig;
use crate::error::{OcrBatchError, Result};
use crate::ocr::WorkerPool;
use crate::walker::{collect_images, output_path_for};

/// An image to recognize and the text file its cleaned text goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageJob {
    pub image: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Recognition,
    Write,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Recognition => write!(f, "recognition"),
            FailureStage::Write => write!(f, "write"),
        }
    }
}

#[derive(Debug)]
pub enum FileOutcome {
    Written {
        image: PathBuf,
        output: PathBuf,
    },
    Failed {
        image: PathBuf,
        stage: FailureStage,
        error: OcrBatchError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub image: PathBuf,
    pub stage: FailureStage,
    pub message: String,
}

/// Totals for one run. Every discovered image is either written or failed.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub discovered: usize,
    pub written: usize,
    pub failures: Vec<FileFailure>,
}

impl BatchReport {
    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Written { .. } => self.written += 1,
            FileOutcome::Failed {
                image,
                stage,
                error,
            } => self.failures.push(FileFailure {
                image,
                stage,
                message: error.to_string(),
            }),
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Make sure both directories exist before the pool starts.
///
/// A missing input directory is created empty rather than failing the run.
/// With `clean_output`, the previous output tree is removed first; a removal
/// failure is logged and the run continues. Cleaning is refused when the
/// output directory resolves to the input directory or one of its ancestors.
pub async fn prepare_directories(config: &BatchConfig) -> Result<()> {
    ensure_input_dir(&config.input_dir).await?;
    if config.clean_output {
        ensure_output_excludes_input(&config.input_dir, &config.output_dir).await?;
    }
    prepare_output_dir(&config.output_dir, config.clean_output).await
}

/// Compares resolved paths so `..`, `.` and symlinks cannot hide the overlap.
/// A missing output directory has nothing to remove.
async fn ensure_output_excludes_input(input_dir: &Path, output_dir: &Path) -> Result<()> {
    let output = match tokio::fs::canonicalize(output_dir).await {
        Ok(path) => path,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let input = tokio::fs::canonicalize(input_dir).await?;

    if input.starts_with(&output) {
        return Err(OcrBatchError::Config(format!(
            "refusing to clean output directory {} because it contains the input directory {}",
            output_dir.display(),
            input_dir.display()
        )));
    }
    Ok(())
}

async fn ensure_input_dir(dir: &Path) -> Result<()> {
    if tokio::fs::metadata(dir).await.is_err() {
        warn!(dir = %dir.display(), "Input directory not found, creating it");
        tokio::fs::create_dir_all(dir).await?;
    }
    Ok(())
}

async fn prepare_output_dir(dir: &Path, clean_output: bool) -> Result<()> {
    if clean_output {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => info!(dir = %dir.display(), "Output directory cleaned"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %dir.display(), "Failed to clean output directory: {}", e),
        }
    }
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

/// List the images under `input_root` with their mirrored output paths.
pub async fn plan_jobs(input_root: &Path, output_root: &Path) -> Result<Vec<ImageJob>> {
    collect_images(input_root)
        .await?
        .into_iter()
        .map(|image| -> Result<ImageJob> {
            let output = output_path_for(input_root, output_root, &image)?;
            Ok(ImageJob { image, output })
        })
        .collect()
}

/// Recognize, clean and write one image. Errors are captured in the outcome.
pub async fn process_image(pool: &WorkerPool, job: &ImageJob) -> FileOutcome {
    let raw = match pool.recognize(&job.image).await {
        Ok(raw) => raw,
        Err(error) => {
            error!(image = %job.image.display(), "Recognition failed: {}", error);
            return FileOutcome::Failed {
                image: job.image.clone(),
                stage: FailureStage::Recognition,
                error,
            };
        }
    };

    let cleaned = clean(&raw);

    match write_text(&job.output, &cleaned).await {
        Ok(()) => {
            info!(output = %job.output.display(), "Cleaned text written");
            FileOutcome::Written {
                image: job.image.clone(),
                output: job.output.clone(),
            }
        }
        Err(error) => {
            error!(
                image = %job.image.display(),
                output = %job.output.display(),
                "Write failed: {}",
                error
            );
            FileOutcome::Failed {
                image: job.image.clone(),
                stage: FailureStage::Write,
                error,
            }
        }
    }
}

async fn write_text(output: &Path, text: &str) -> Result<()> {
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(output, text).await?;
    Ok(())
}

/// Submit every image under the input directory and wait for all of them.
///
/// One file failing never stops the others; the report lists what failed.
pub async fn run_batch(config: &BatchConfig, pool: &WorkerPool) -> Result<BatchReport> {
    let jobs = plan_jobs(&config.input_dir, &config.output_dir).await?;
    info!(
        images = jobs.len(),
        input = %config.input_dir.display(),
        "Processing images"
    );

    let mut report = BatchReport {
        discovered: jobs.len(),
        ..Default::default()
    };

    let outcomes = join_all(jobs.iter().map(|job| process_image(pool, job))).await;
    for outcome in outcomes {
        report.record(outcome);
    }

    Ok(report)
}

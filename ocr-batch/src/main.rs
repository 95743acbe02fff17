use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ocr_batch::{
    prepare_directories, run_batch, Config, OcrEngine, OcrProvider, WorkerPool,
};

#[derive(Parser)]
#[command(name = "ocr-batch")]
#[command(about = "Recognize every image in a directory tree and write cleaned text files")]
struct Args {
    /// Directory to scan for images (overrides OCR_INPUT_DIR)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Directory receiving the mirrored .txt files (overrides OCR_OUTPUT_DIR)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of concurrent OCR workers (overrides OCR_WORKERS)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Tesseract language codes, e.g. "fra" or "eng+fra" (overrides OCR_LANGUAGES)
    #[arg(long)]
    languages: Option<String>,

    /// OCR model, "local/tesseract" or "openai/<model>" (overrides OCR_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Keep files already present in the output directory
    #[arg(long)]
    keep_output: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json: bool,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(input) = self.input {
            config.batch.input_dir = input;
        }
        if let Some(output) = self.output {
            config.batch.output_dir = output;
        }
        if let Some(workers) = self.workers {
            config.batch.workers = workers;
        }
        if let Some(languages) = self.languages {
            config.ocr.languages = languages;
        }
        if let Some(model) = self.model {
            config.ocr.model = model;
        }
        if self.keep_output {
            config.batch.clean_output = false;
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ocr_batch=info".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    init_tracing(args.json);

    let mut config = Config::from_env();
    args.apply(&mut config);

    if let Err(e) = run(config).await {
        tracing::error!("OCR batch aborted: {:#}", e);
        return Err(e);
    }

    Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    tracing::info!(
        "Preparing directories (input={}, output={})...",
        config.batch.input_dir.display(),
        config.batch.output_dir.display()
    );
    prepare_directories(&config.batch).await?;

    tracing::info!(
        "Starting {} OCR workers: {} ({})...",
        config.batch.workers,
        config.ocr.model,
        config.ocr.languages
    );
    let pool = WorkerPool::start(config.batch.workers, |id| {
        tracing::debug!(worker = id, "Creating OCR engine");
        Ok(Arc::new(OcrProvider::new(&config.ocr)?) as Arc<dyn OcrEngine>)
    })?;

    tokio::spawn(shutdown_signal(pool.cancellation_token()));

    let result = run_batch(&config.batch, &pool).await;
    pool.terminate().await;
    let report = result?;

    for failure in &report.failures {
        tracing::warn!(
            image = %failure.image.display(),
            stage = %failure.stage,
            "Not written: {}",
            failure.message
        );
    }
    tracing::info!(
        discovered = report.discovered,
        written = report.written,
        failed = report.failed(),
        "OCR batch finished"
    );

    Ok(())
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, cancelling queued OCR jobs...");
    cancel_token.cancel();
}

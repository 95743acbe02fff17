use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ocr_batch::config::BatchConfig;
use ocr_batch::{OcrBatchError, OcrEngine, Result, WorkerPool};

/// Engine returning canned raw text keyed by file name.
///
/// Unknown names fail recognition, which lets tests place unreadable images.
#[derive(Default)]
pub struct ScriptedEngine {
    pages: HashMap<String, String>,
    seen: Mutex<Vec<PathBuf>>,
}

impl ScriptedEngine {
    pub fn new(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(name, text)| (name.to_string(), text.to_string()))
                .collect(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<PathBuf> {
        let mut seen = self.seen.lock().unwrap().clone();
        seen.sort();
        seen
    }
}

#[async_trait]
impl OcrEngine for ScriptedEngine {
    async fn recognize(&self, image_path: &Path) -> Result<String> {
        self.seen.lock().unwrap().push(image_path.to_path_buf());
        tokio::task::yield_now().await;

        let name = image_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        self.pages
            .get(name)
            .cloned()
            .ok_or_else(|| OcrBatchError::Ocr(format!("unreadable image {name}")))
    }
}

pub fn start_pool(workers: usize, engine: &Arc<ScriptedEngine>) -> WorkerPool {
    WorkerPool::start(workers, |_| Ok(Arc::clone(engine) as Arc<dyn OcrEngine>))
        .expect("Failed to start worker pool")
}

pub fn batch_config(root: &Path) -> BatchConfig {
    BatchConfig {
        input_dir: root.join("input"),
        output_dir: root.join("output"),
        workers: 2,
        clean_output: true,
    }
}

/// Create a placeholder image file under the input directory.
pub fn add_image(config: &BatchConfig, relative: &str) -> PathBuf {
    let path = config.input_dir.join(relative);
    fs::create_dir_all(path.parent().unwrap()).expect("Failed to create fixture directory");
    fs::write(&path, b"placeholder image bytes").expect("Failed to write fixture image");
    path
}

pub fn read_output(config: &BatchConfig, relative: &str) -> String {
    let path = config.output_dir.join(relative);
    fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read output '{}': {e}", path.display()))
}

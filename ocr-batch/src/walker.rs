use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{OcrBatchError, Result};

/// Extensions (lowercase, without the dot) of files sent to OCR.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff"];

/// Whether `path` has one of [`IMAGE_EXTENSIONS`], ignoring case.
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Recursively collect every image file under `root`.
///
/// Directories are visited from an explicit worklist. The result is sorted so
/// runs over the same tree submit jobs in the same order. Symlinks are not
/// followed into directories.
pub async fn collect_images(root: &Path) -> Result<Vec<PathBuf>> {
    let mut pending = vec![root.to_path_buf()];
    let mut images = Vec::new();

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
            } else if is_image(&path) {
                images.push(path);
            } else {
                debug!(path = %path.display(), "Skipping non-image file");
            }
        }
    }

    images.sort();
    Ok(images)
}

/// Path of the text file mirroring `image` under `output_root`.
///
/// `input_root/a/b/scan.PNG` maps to `output_root/a/b/scan.txt`.
pub fn output_path_for(input_root: &Path, output_root: &Path, image: &Path) -> Result<PathBuf> {
    let relative = image.strip_prefix(input_root).map_err(|_| {
        OcrBatchError::Config(format!(
            "{} is not inside the input directory {}",
            image.display(),
            input_root.display()
        ))
    })?;
    Ok(output_root.join(relative).with_extension("txt"))
}

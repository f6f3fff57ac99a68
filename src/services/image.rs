use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Staged copy of an uploaded image.
///
/// The handle owns the staged file: it is deleted when the handle is dropped,
/// which happens once the owning receipt is removed and no in-flight OCR job
/// still holds a reference.
#[derive(Debug)]
pub struct ImageHandle {
    path: PathBuf,
    file_name: String,
}

impl ImageHandle {
    pub fn stage(dir: &Path, receipt_id: &str, file_name: &str, bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(anyhow!("Image '{}' is empty", file_name));
        }
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.{}", receipt_id, staged_extension(file_name)));
        std::fs::write(&path, bytes)
            .map_err(|e| anyhow!("Stage image '{}': {}", file_name, e))?;
        debug!(receipt_id = %receipt_id, path = %path.display(), "staged image");
        Ok(ImageHandle {
            path,
            file_name: file_name.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn location(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    pub fn is_available(&self) -> bool {
        std::fs::metadata(&self.path)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }
}

impl Drop for ImageHandle {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "released image"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.path.display(), error = %err, "failed to release image"),
        }
    }
}

fn staged_extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string())
}

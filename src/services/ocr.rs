use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, warn};

use crate::services::image::ImageHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recognition {
    pub text: String,
}

/// Turns a staged image into raw text. Any error fails the whole receipt.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &ImageHandle) -> Result<Recognition>;
}

/// PDF text layer first, Tesseract for everything else.
///
/// `.txt` uploads are taken as already-recognized text.
pub struct TextExtractor {
    language: String,
}

impl TextExtractor {
    pub fn new(language: &str) -> Self {
        TextExtractor {
            language: language.to_string(),
        }
    }

    pub fn extract(path: &Path, ocr_language: &str) -> Result<String> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "txt" => Ok(std::fs::read_to_string(path)?),
            "pdf" => {
                if let Ok(text) = pdf_extract::extract_text(path) {
                    if !text.trim().is_empty() {
                        return Ok(text);
                    }
                }
                debug!(path = %path.display(), "no PDF text layer, falling back to OCR");
                Self::extract_via_ocr(path, ocr_language)
            }
            _ => Self::extract_via_ocr(path, ocr_language),
        }
    }

    #[cfg(feature = "tesseract")]
    fn extract_via_ocr(path: &Path, language: &str) -> Result<String> {
        let text = tesseract::Tesseract::new(None, Some(language))
            .map_err(|e| anyhow!("Tesseract init: {}", e))?
            .set_image(path.to_str().ok_or_else(|| anyhow!("Invalid path"))?)
            .map_err(|e| anyhow!("Tesseract image: {}", e))?
            .recognize()
            .map_err(|e| anyhow!("Tesseract recognize: {}", e))?
            .get_text()
            .map_err(|e| anyhow!("OCR text: {}", e))?;
        Ok(text)
    }

    #[cfg(not(feature = "tesseract"))]
    fn extract_via_ocr(path: &Path, language: &str) -> Result<String> {
        Err(anyhow!(
            "Cannot OCR {} ({}): built without the `tesseract` feature",
            path.display(),
            language
        ))
    }

    pub fn validate_text_quality(text: &str) -> bool {
        text.trim().len() > 10 && text.split_whitespace().count() > 2
    }
}

#[async_trait]
impl OcrEngine for TextExtractor {
    async fn recognize(&self, image: &ImageHandle) -> Result<Recognition> {
        let path = image.path().to_path_buf();
        let language = self.language.clone();
        let text = tokio::task::spawn_blocking(move || Self::extract(&path, &language))
            .await
            .map_err(|e| anyhow!("OCR task: {}", e))??;
        if !Self::validate_text_quality(&text) {
            warn!(file = %image.file_name(), chars = text.len(), "OCR returned very little text");
        }
        Ok(Recognition { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn text_uploads_are_read_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let image = ImageHandle::stage(dir.path(), "r1", "scan.txt", b"Tea 2.00\nCake 3.00").unwrap();
        let recognition = TextExtractor::new("eng").recognize(&image).await.unwrap();
        assert_eq!(recognition.text, "Tea 2.00\nCake 3.00");
    }

    #[cfg(not(feature = "tesseract"))]
    #[tokio::test]
    async fn images_fail_without_tesseract() {
        let dir = tempfile::tempdir().unwrap();
        let image = ImageHandle::stage(dir.path(), "r1", "scan.png", b"\x89PNG").unwrap();
        assert!(TextExtractor::new("eng").recognize(&image).await.is_err());
    }

    #[test]
    fn text_quality_heuristic() {
        assert!(TextExtractor::validate_text_quality("Coffee 3.50 Bagel 2.25"));
        assert!(!TextExtractor::validate_text_quality("3.50"));
    }
}

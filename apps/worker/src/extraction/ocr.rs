use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::debug;

use crate::extraction::{DocumentKind, ExtractionError, TextSource, TextStrategy};

/// Turns a scanned PDF into text.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize_pdf(&self, pdf: Bytes) -> Result<String, ExtractionError>;
}

/// Rasterizes pages with `pdftoppm` and reads them with `tesseract`.
/// Either binary missing surfaces as [`ExtractionError::OcrUnavailable`].
pub struct TesseractOcr {
    dpi: u32,
    language: String,
}

impl TesseractOcr {
    pub fn new() -> Self {
        Self {
            dpi: 300,
            language: "eng".to_string(),
        }
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new()
    }
}

async fn run(program: &str, args: &[&str], cwd: &Path) -> Result<Vec<u8>, ExtractionError> {
    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => ExtractionError::OcrUnavailable(format!("{program} not found")),
            _ => ExtractionError::Io(e),
        })?;
    if !output.status.success() {
        return Err(ExtractionError::OcrFailed(format!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output.stdout)
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize_pdf(&self, pdf: Bytes) -> Result<String, ExtractionError> {
        let dir = tempfile::tempdir()?;
        tokio::fs::write(dir.path().join("input.pdf"), &pdf).await?;

        let dpi = self.dpi.to_string();
        run("pdftoppm", &["-r", dpi.as_str(), "-png", "input.pdf", "page"], dir.path()).await?;

        let mut pages: Vec<String> = std::fs::read_dir(dir.path())?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with("page") && name.ends_with(".png"))
            .collect();
        // pdftoppm zero-pads page numbers, so lexical order is page order
        pages.sort();
        debug!("OCR over {} rasterized page(s)", pages.len());

        let mut text = String::new();
        for page in &pages {
            let stdout = run(
                "tesseract",
                &[page.as_str(), "stdout", "-l", self.language.as_str()],
                dir.path(),
            )
            .await?;
            text.push_str(&String::from_utf8_lossy(&stdout));
            text.push('\n');
        }
        Ok(text)
    }
}

/// Last link of the extraction chain for PDFs.
pub struct OcrStrategy {
    engine: Arc<dyn OcrEngine>,
}

impl OcrStrategy {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TextStrategy for OcrStrategy {
    fn source(&self) -> TextSource {
        TextSource::Ocr
    }

    fn supports(&self, kind: DocumentKind) -> bool {
        kind == DocumentKind::Pdf
    }

    async fn extract(&self, bytes: Bytes, _kind: DocumentKind) -> Result<String, ExtractionError> {
        self.engine.recognize_pdf(bytes).await
    }
}

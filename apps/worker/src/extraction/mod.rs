//! Turns raw résumé bytes into clean text.
//!
//! Extraction is an ordered chain of [`TextStrategy`] implementations. The
//! chain for a document is every strategy that supports its kind, primary
//! extractor first and OCR last. The first result that is not garbage wins;
//! otherwise the first non-empty weak result is kept.

pub mod docx;
pub mod ocr;
pub mod pdf;
pub mod quality;
pub mod text;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::extraction::quality::{is_garbage, normalize_text};

pub use ocr::{OcrEngine, TesseractOcr};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("DOCX extraction failed: {0}")]
    Docx(String),

    #[error("OCR unavailable: {0}")]
    OcrUnavailable(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Extraction task aborted: {0}")]
    Aborted(String),
}

/// Where the returned text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TextSource {
    PdfText,
    DocxText,
    Text,
    Ocr,
}

/// Document kinds the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Doc,
    Text,
}

impl DocumentKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "docx" => Some(DocumentKind::Docx),
            "doc" => Some(DocumentKind::Doc),
            "txt" => Some(DocumentKind::Text),
            _ => None,
        }
    }

    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    /// MIME type first, filename extension second, plain text otherwise.
    pub fn detect(mime_type: &str, filename: &str) -> Self {
        match mime_type.split(';').next().unwrap_or("").trim() {
            "application/pdf" => DocumentKind::Pdf,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                DocumentKind::Docx
            }
            "application/msword" => DocumentKind::Doc,
            _ => Self::from_filename(filename).unwrap_or(DocumentKind::Text),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "application/pdf",
            DocumentKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            DocumentKind::Doc => "application/msword",
            DocumentKind::Text => "text/plain",
        }
    }

    fn primary_source(&self) -> TextSource {
        match self {
            DocumentKind::Pdf => TextSource::PdfText,
            DocumentKind::Docx => TextSource::DocxText,
            DocumentKind::Doc | DocumentKind::Text => TextSource::Text,
        }
    }
}

/// One way of turning bytes into text.
#[async_trait]
pub trait TextStrategy: Send + Sync {
    fn source(&self) -> TextSource;

    fn supports(&self, kind: DocumentKind) -> bool;

    async fn extract(&self, bytes: Bytes, kind: DocumentKind) -> Result<String, ExtractionError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    pub source: TextSource,
}

pub struct DocumentExtractor {
    strategies: Vec<Arc<dyn TextStrategy>>,
    thresholds: ExtractionConfig,
}

impl DocumentExtractor {
    pub fn new(strategies: Vec<Arc<dyn TextStrategy>>, thresholds: ExtractionConfig) -> Self {
        Self {
            strategies,
            thresholds,
        }
    }

    /// PDF, DOCX and plain-text extractors followed by OCR.
    pub fn with_ocr(ocr: Arc<dyn OcrEngine>, thresholds: ExtractionConfig) -> Self {
        Self::new(
            vec![
                Arc::new(pdf::PdfTextStrategy),
                Arc::new(docx::DocxTextStrategy),
                Arc::new(text::PlainTextStrategy),
                Arc::new(ocr::OcrStrategy::new(ocr)),
            ],
            thresholds,
        )
    }

    /// Never fails: the worst case is empty text from the primary source.
    pub async fn extract(&self, bytes: Bytes, mime_type: &str, filename: &str) -> ExtractedText {
        let kind = DocumentKind::detect(mime_type, filename);
        let mut weak: Option<ExtractedText> = None;

        for strategy in self.strategies.iter().filter(|s| s.supports(kind)) {
            let source = strategy.source();
            match strategy.extract(bytes.clone(), kind).await {
                Ok(raw) => {
                    let text = normalize_text(&raw);
                    if !is_garbage(&text, &self.thresholds) {
                        info!(?source, chars = text.len(), "Extracted text from {filename}");
                        return ExtractedText { text, source };
                    }
                    debug!(?source, chars = text.len(), "Weak extraction for {filename}");
                    if weak.is_none() && !text.is_empty() {
                        weak = Some(ExtractedText { text, source });
                    }
                }
                Err(e) => warn!(?source, "Extraction strategy failed for {filename}: {e}"),
            }
        }

        weak.unwrap_or(ExtractedText {
            text: String::new(),
            source: kind.primary_source(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        source: TextSource,
        output: Result<String, ()>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn ok(source: TextSource, text: &str) -> Arc<Self> {
            Arc::new(Self {
                source,
                output: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(source: TextSource) -> Arc<Self> {
            Arc::new(Self {
                source,
                output: Err(()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TextStrategy for Fixed {
        fn source(&self) -> TextSource {
            self.source
        }

        fn supports(&self, _kind: DocumentKind) -> bool {
            true
        }

        async fn extract(&self, _: Bytes, _: DocumentKind) -> Result<String, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.output
                .clone()
                .map_err(|_| ExtractionError::Pdf("broken xref".to_string()))
        }
    }

    fn good_text() -> String {
        "Experienced data engineer building streaming pipelines with Kafka and Spark. "
            .repeat(5)
    }

    #[tokio::test]
    async fn test_first_good_strategy_wins_and_ocr_is_skipped() {
        let primary = Fixed::ok(TextSource::PdfText, &good_text());
        let ocr = Fixed::ok(TextSource::Ocr, &good_text());
        let extractor =
            DocumentExtractor::new(vec![primary.clone(), ocr.clone()], ExtractionConfig::default());

        let out = extractor.extract(Bytes::new(), "application/pdf", "cv.pdf").await;
        assert_eq!(out.source, TextSource::PdfText);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_garbage_falls_back_to_ocr() {
        let primary = Fixed::ok(TextSource::PdfText, "?? ?? ??");
        let ocr = Fixed::ok(TextSource::Ocr, &good_text());
        let extractor = DocumentExtractor::new(vec![primary, ocr], ExtractionConfig::default());

        let out = extractor.extract(Bytes::new(), "application/pdf", "cv.pdf").await;
        assert_eq!(out.source, TextSource::Ocr);
    }

    #[tokio::test]
    async fn test_failed_primary_falls_back_to_ocr() {
        let primary = Fixed::failing(TextSource::PdfText);
        let ocr = Fixed::ok(TextSource::Ocr, &good_text());
        let extractor = DocumentExtractor::new(vec![primary, ocr], ExtractionConfig::default());

        let out = extractor.extract(Bytes::new(), "application/pdf", "cv.pdf").await;
        assert_eq!(out.source, TextSource::Ocr);
    }

    #[tokio::test]
    async fn test_weak_text_kept_when_ocr_yields_nothing() {
        let primary = Fixed::ok(TextSource::PdfText, "Jane Doe\nRust developer");
        let ocr = Fixed::failing(TextSource::Ocr);
        let extractor = DocumentExtractor::new(vec![primary, ocr], ExtractionConfig::default());

        let out = extractor.extract(Bytes::new(), "application/pdf", "cv.pdf").await;
        assert_eq!(out.source, TextSource::PdfText);
        assert_eq!(out.text, "Jane Doe\nRust developer");
    }

    #[test]
    fn test_detect_prefers_mime_then_extension() {
        assert_eq!(
            DocumentKind::detect("application/pdf", "cv.docx"),
            DocumentKind::Pdf
        );
        assert_eq!(
            DocumentKind::detect("application/octet-stream", "CV.DOCX"),
            DocumentKind::Docx
        );
        assert_eq!(DocumentKind::detect("", "notes"), DocumentKind::Text);
        assert_eq!(DocumentKind::from_filename("photo.png"), None);
    }
}

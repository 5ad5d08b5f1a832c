use async_trait::async_trait;
use bytes::Bytes;

use crate::extraction::{DocumentKind, ExtractionError, TextSource, TextStrategy};

/// Structural PDF text via `pdf-extract`.
pub struct PdfTextStrategy;

#[async_trait]
impl TextStrategy for PdfTextStrategy {
    fn source(&self) -> TextSource {
        TextSource::PdfText
    }

    fn supports(&self, kind: DocumentKind) -> bool {
        kind == DocumentKind::Pdf
    }

    async fn extract(&self, bytes: Bytes, _kind: DocumentKind) -> Result<String, ExtractionError> {
        // pdf-extract is synchronous and can be slow on large documents
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| ExtractionError::Aborted(e.to_string()))?
            .map_err(|e| ExtractionError::Pdf(e.to_string()))
    }
}

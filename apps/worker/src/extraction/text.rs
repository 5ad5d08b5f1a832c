use async_trait::async_trait;
use bytes::Bytes;

use crate::extraction::{DocumentKind, ExtractionError, TextSource, TextStrategy};

/// Plain text, and the best effort for legacy `.doc` files: lossy UTF-8.
pub struct PlainTextStrategy;

#[async_trait]
impl TextStrategy for PlainTextStrategy {
    fn source(&self) -> TextSource {
        TextSource::Text
    }

    fn supports(&self, kind: DocumentKind) -> bool {
        matches!(kind, DocumentKind::Text | DocumentKind::Doc)
    }

    async fn extract(&self, bytes: Bytes, _kind: DocumentKind) -> Result<String, ExtractionError> {
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced_not_rejected() {
        let text = PlainTextStrategy
            .extract(Bytes::from_static(b"Jane \xff Doe"), DocumentKind::Text)
            .await
            .unwrap();
        assert_eq!(text, "Jane \u{FFFD} Doe");
    }
}

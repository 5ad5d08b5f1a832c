use std::io::{Cursor, Read, Seek};

use async_trait::async_trait;
use bytes::Bytes;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::extraction::{DocumentKind, ExtractionError, TextSource, TextStrategy};
use crate::storage::MAX_OBJECT_BYTES;

/// DOCX text: unzip and walk the runs of `word/document.xml`.
pub struct DocxTextStrategy;

#[async_trait]
impl TextStrategy for DocxTextStrategy {
    fn source(&self) -> TextSource {
        TextSource::DocxText
    }

    fn supports(&self, kind: DocumentKind) -> bool {
        kind == DocumentKind::Docx
    }

    async fn extract(&self, bytes: Bytes, _kind: DocumentKind) -> Result<String, ExtractionError> {
        tokio::task::spawn_blocking(move || {
            let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
                .map_err(|e| ExtractionError::Docx(format!("not a DOCX archive: {e}")))?;
            read_document_xml(&mut archive, MAX_OBJECT_BYTES)
        })
        .await
        .map_err(|e| ExtractionError::Aborted(e.to_string()))?
    }
}

/// Reads at most `limit` decompressed bytes of the document part.
fn read_document_xml<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    limit: u64,
) -> Result<String, ExtractionError> {
    let mut entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractionError::Docx(format!("missing word/document.xml: {e}")))?;
    let mut xml = String::new();
    (&mut entry).take(limit + 1).read_to_string(&mut xml)?;
    if xml.len() as u64 > limit {
        return Err(ExtractionError::Docx(format!(
            "word/document.xml exceeds {limit} bytes"
        )));
    }
    document_text(&xml)
}

/// Text runs joined, one line per paragraph. Tabs and breaks become whitespace.
pub fn document_text(xml: &str) -> Result<String, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut text = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"t" => in_run_text = true,
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_run_text = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"tab" => text.push('\t'),
                b"br" | b"cr" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) if in_run_text => {
                let decoded = e
                    .unescape()
                    .map_err(|err| ExtractionError::Docx(format!("bad text run: {err}")))?;
                text.push_str(&decoded);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractionError::Docx(format!("XML parsing error: {e}"))),
            _ => {}
        }
    }

    Ok(text)
}

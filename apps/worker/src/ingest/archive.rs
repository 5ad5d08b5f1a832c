//! Archive enumeration and entry naming. Synchronous: run on a blocking thread.

use std::io::{Cursor, Read};

use bytes::Bytes;

use crate::extraction::DocumentKind;
use crate::ingest::{EntryFailure, IngestError};
use crate::storage::MAX_OBJECT_BYTES;

/// Longest sanitized filename kept in a storage key.
const MAX_FILENAME_CHARS: usize = 120;

/// Words dropped when turning a filename into a candidate name.
const FILENAME_NOISE: &[&str] = &["cv", "resume", "résumé", "curriculum", "vitae", "final", "updated"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryDecision {
    Skip,
    Accept(DocumentKind),
}

/// Directories, platform metadata and unsupported extensions are skipped.
pub fn classify_entry(name: &str) -> EntryDecision {
    if name.ends_with('/') || name.split('/').any(|part| part == "__MACOSX") {
        return EntryDecision::Skip;
    }
    let base = base_name(name);
    if base.is_empty()
        || base.starts_with("._")
        || base == ".DS_Store"
        || base.eq_ignore_ascii_case("thumbs.db")
    {
        return EntryDecision::Skip;
    }
    match DocumentKind::from_filename(base) {
        Some(kind) => EntryDecision::Accept(kind),
        None => EntryDecision::Skip,
    }
}

pub fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Storage-safe filename: ASCII letters, digits, `.`, `-` and `_` only.
pub fn sanitize_filename(path: &str) -> String {
    let mut out = String::new();
    for c in base_name(path).chars() {
        let mapped = if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
            c
        } else {
            '_'
        };
        if mapped == '_' && out.ends_with('_') {
            continue;
        }
        out.push(mapped);
    }
    let trimmed = out.trim_matches(|c| c == '_' || c == '.');
    if trimmed.is_empty() {
        return "unnamed_file".to_string();
    }

    if trimmed.chars().count() <= MAX_FILENAME_CHARS {
        return trimmed.to_string();
    }
    // Keep the extension when truncating
    match trimmed.rfind('.') {
        Some(dot) if trimmed.len() - dot <= 8 => {
            let ext = &trimmed[dot..];
            let stem: String = trimmed[..dot]
                .chars()
                .take(MAX_FILENAME_CHARS - ext.len())
                .collect();
            format!("{stem}{ext}")
        }
        _ => trimmed.chars().take(MAX_FILENAME_CHARS).collect(),
    }
}

/// "jane_doe-CV.pdf" becomes "Jane Doe".
pub fn candidate_name(path: &str) -> String {
    let base = base_name(path);
    let stem = base.rsplit_once('.').map_or(base, |(stem, _)| stem);
    let words: Vec<String> = stem
        .split(|c: char| c.is_whitespace() || matches!(c, '_' | '-' | '.' | '(' | ')'))
        .filter(|w| !w.is_empty())
        .filter(|w| !FILENAME_NOISE.contains(&w.to_lowercase().as_str()))
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .map(title_case)
        .collect();
    if words.is_empty() {
        "Unknown Candidate".to_string()
    } else {
        words.join(" ")
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub kind: DocumentKind,
    pub bytes: Bytes,
}

#[derive(Debug, Default)]
pub struct ArchiveScan {
    pub entries: Vec<ArchiveEntry>,
    pub skipped: usize,
    pub failed: Vec<EntryFailure>,
}

impl ArchiveScan {
    pub fn total(&self) -> usize {
        self.entries.len() + self.skipped + self.failed.len()
    }
}

/// Reads every accepted entry into memory. Oversize or unreadable entries are
/// recorded as failures without affecting their siblings.
pub fn scan_archive(archive: &[u8]) -> Result<ArchiveScan, IngestError> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| IngestError::InvalidArchive(e.to_string()))?;

    let mut scan = ArchiveScan::default();
    for index in 0..zip.len() {
        let mut file = match zip.by_index(index) {
            Ok(file) => file,
            Err(e) => {
                scan.failed.push(EntryFailure {
                    entry: format!("#{index}"),
                    reason: format!("unreadable entry: {e}"),
                });
                continue;
            }
        };
        let name = file.name().to_string();

        let kind = match classify_entry(&name) {
            EntryDecision::Skip => {
                scan.skipped += 1;
                continue;
            }
            EntryDecision::Accept(kind) => kind,
        };

        if file.size() > MAX_OBJECT_BYTES {
            scan.failed.push(EntryFailure {
                entry: name,
                reason: format!(
                    "entry is {} bytes, limit is {MAX_OBJECT_BYTES} bytes",
                    file.size()
                ),
            });
            continue;
        }

        let mut buf = Vec::with_capacity(file.size() as usize);
        // Declared sizes can lie; cap the read as well
        if let Err(e) = (&mut file).take(MAX_OBJECT_BYTES + 1).read_to_end(&mut buf) {
            scan.failed.push(EntryFailure {
                entry: name,
                reason: format!("could not read entry: {e}"),
            });
            continue;
        }
        if buf.len() as u64 > MAX_OBJECT_BYTES {
            scan.failed.push(EntryFailure {
                entry: name,
                reason: format!("entry exceeds {MAX_OBJECT_BYTES} bytes"),
            });
            continue;
        }

        scan.entries.push(ArchiveEntry {
            name,
            kind,
            bytes: Bytes::from(buf),
        });
    }
    Ok(scan)
}

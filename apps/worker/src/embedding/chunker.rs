//! Overlapping word windows.

pub const DEFAULT_WINDOW_WORDS: usize = 1200;
pub const DEFAULT_OVERLAP_WORDS: usize = 120;

/// Splits `text` into windows of `window` words, each starting `window - overlap`
/// words after the previous one. The last window may be shorter.
///
/// Empty text yields no chunks; text up to `window` words yields one.
pub fn chunk_words(text: &str, window: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    let window = window.max(1);
    let step = window.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + window).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }
    chunks
}

pub fn chunk_default(text: &str) -> Vec<String> {
    chunk_words(text, DEFAULT_WINDOW_WORDS, DEFAULT_OVERLAP_WORDS)
}

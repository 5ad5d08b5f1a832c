//! Text cleanup and the "is this garbage?" judgement that triggers OCR.

use crate::config::ExtractionConfig;

/// Returns true when extracted text is too short or too symbol-heavy to trust.
///
/// Both measures ignore whitespace: fewer than `min_chars` visible characters,
/// or more than `max_symbol_ratio` of them non-alphanumeric.
pub fn is_garbage(text: &str, thresholds: &ExtractionConfig) -> bool {
    let mut visible = 0usize;
    let mut symbols = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        visible += 1;
        if !c.is_alphanumeric() {
            symbols += 1;
        }
    }

    if visible < thresholds.min_chars {
        return true;
    }
    (symbols as f64 / visible as f64) > thresholds.max_symbol_ratio
}

/// Normalizes line endings, strips control characters, collapses runs of
/// horizontal whitespace and keeps at most one blank line between paragraphs.
pub fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0usize;

    for line in unified.split('\n') {
        let cleaned: String = line
            .chars()
            .map(|c| match c {
                '\t' | '\u{00A0}' | '\u{2007}' | '\u{202F}' => ' ',
                c => c,
            })
            .filter(|c| !c.is_control() && *c != '\u{FEFF}')
            .collect();
        let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

        if collapsed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(&collapsed);
        out.push('\n');
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> ExtractionConfig {
        ExtractionConfig::default()
    }

    #[test]
    fn test_short_text_is_garbage() {
        assert!(is_garbage("Jane Doe, engineer", &thresholds()));
        assert!(is_garbage("", &thresholds()));
    }

    #[test]
    fn test_symbol_heavy_text_is_garbage() {
        let noisy = "@#$% ^&*( ".repeat(40) + &"abc".repeat(30);
        assert!(is_garbage(&noisy, &thresholds()));
    }

    #[test]
    fn test_prose_is_not_garbage() {
        let prose = "Senior backend engineer with eight years of experience building \
                     payment systems in Rust and Go. Led a team of five engineers. "
            .repeat(3);
        assert!(!is_garbage(&prose, &thresholds()));
    }

    #[test]
    fn test_thresholds_are_tunable() {
        let cfg = ExtractionConfig {
            min_chars: 5,
            max_symbol_ratio: 0.35,
        };
        assert!(!is_garbage("Jane Doe engineer", &cfg));
    }

    #[test]
    fn test_normalize_collapses_whitespace_and_blank_lines() {
        let raw = "Jane\tDoe  \r\n\r\n\r\n\r\nSkills:\u{00A0} Rust,\u{0007} Go\n";
        assert_eq!(normalize_text(raw), "Jane Doe\n\nSkills: Rust, Go");
    }
}

//! Normalized résumé text to a candidate field set.
//!
//! A deterministic heuristic pass always runs. An AI-assisted pass runs
//! alongside it under a timeout; its non-empty values win, skills are unioned,
//! and any failure leaves the baseline untouched. Parsing never fails.

pub mod assistant;
pub mod heuristics;
pub mod prompts;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use assistant::{FieldAssistant, LlmFieldAssistant};

/// The merged field set. Stored as both `parsed_json` and `extracted_fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParsedFields {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub skills: Vec<String>,
    pub experience: Vec<String>,
    pub education: Vec<String>,
    pub total_years: Option<f64>,
    pub summary: Option<String>,
    pub age: Option<u32>,
}

impl ParsedFields {
    /// Reads fields back from a stored JSON column; unknown shapes become empty.
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

fn prefer_text(ai: Option<String>, baseline: Option<String>) -> Option<String> {
    match ai {
        Some(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => baseline,
    }
}

fn prefer_list(ai: Vec<String>, baseline: Vec<String>) -> Vec<String> {
    let ai: Vec<String> = ai.into_iter().filter(|s| !s.trim().is_empty()).collect();
    if ai.is_empty() {
        baseline
    } else {
        ai
    }
}

/// Case-insensitive union keeping first spelling and first-seen order.
fn union_skills(baseline: Vec<String>, ai: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    baseline
        .into_iter()
        .chain(ai)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .collect()
}

/// AI values win when non-empty; skills are the deduplicated union.
pub fn merge(baseline: ParsedFields, ai: ParsedFields) -> ParsedFields {
    ParsedFields {
        name: prefer_text(ai.name, baseline.name),
        email: prefer_text(ai.email, baseline.email),
        phone: prefer_text(ai.phone, baseline.phone),
        skills: union_skills(baseline.skills, ai.skills),
        experience: prefer_list(ai.experience, baseline.experience),
        education: prefer_list(ai.education, baseline.education),
        total_years: ai
            .total_years
            .filter(|y| y.is_finite() && *y > 0.0)
            .or(baseline.total_years),
        summary: prefer_text(ai.summary, baseline.summary),
        age: ai.age.filter(|a| *a > 0).or(baseline.age),
    }
}

pub struct StructuredParser {
    assistant: Option<Arc<dyn FieldAssistant>>,
    ai_timeout: Duration,
}

impl StructuredParser {
    pub fn new(assistant: Option<Arc<dyn FieldAssistant>>, ai_timeout: Duration) -> Self {
        Self {
            assistant,
            ai_timeout,
        }
    }

    pub async fn parse(&self, text: &str) -> ParsedFields {
        let baseline = heuristics::extract(text);
        let Some(assistant) = &self.assistant else {
            return baseline;
        };
        if text.trim().is_empty() {
            return baseline;
        }

        match tokio::time::timeout(self.ai_timeout, assistant.structure(text)).await {
            Ok(Ok(ai)) => {
                debug!("AI structuring succeeded, merging with baseline");
                merge(baseline, ai)
            }
            Ok(Err(e)) => {
                warn!("AI structuring failed, using baseline fields: {e}");
                baseline
            }
            Err(_) => {
                warn!(
                    "AI structuring timed out after {}s, using baseline fields",
                    self.ai_timeout.as_secs()
                );
                baseline
            }
        }
    }
}

//! Rule-based factors and the composite score.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SIMILARITY_WEIGHT: f64 = 0.6;
pub const SKILL_WEIGHT: f64 = 0.3;
pub const EDUCATION_WEIGHT: f64 = 0.1;
/// Multiplier applied when a known age falls outside the job's bounds.
pub const AGE_PENALTY: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeFit {
    /// The job sets no age bounds.
    Unconstrained,
    /// Bounds exist but the candidate's age is not known.
    Unknown,
    Within,
    Violated,
}

/// Score and breakdown written onto a ranked résumé.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingResult {
    pub resume_id: Uuid,
    pub similarity: f64,
    pub skill_match: f64,
    pub education_match: f64,
    pub age_fit: AgeFit,
    pub composite_score: f64,
    pub rank: usize,
}

/// Fraction of required skills the candidate lists; 1.0 when none are required.
pub fn skill_match(required: &[String], candidate: &[String]) -> f64 {
    let required: Vec<String> = required
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if required.is_empty() {
        return 1.0;
    }
    let have: std::collections::HashSet<String> =
        candidate.iter().map(|s| s.trim().to_lowercase()).collect();
    let hits = required.iter().filter(|s| have.contains(*s)).count();
    hits as f64 / required.len() as f64
}

/// 1.0 when no minimum is set or any education line mentions it, else 0.0.
pub fn education_match(min_education: Option<&str>, education: &[String]) -> f64 {
    let Some(keyword) = min_education
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
    else {
        return 1.0;
    };
    if education
        .iter()
        .any(|line| line.to_lowercase().contains(&keyword))
    {
        1.0
    } else {
        0.0
    }
}

pub fn age_fit(min_age: Option<i32>, max_age: Option<i32>, age: Option<u32>) -> AgeFit {
    if min_age.is_none() && max_age.is_none() {
        return AgeFit::Unconstrained;
    }
    let Some(age) = age.map(|a| a as i32) else {
        return AgeFit::Unknown;
    };
    let too_young = min_age.is_some_and(|min| age < min);
    let too_old = max_age.is_some_and(|max| age > max);
    if too_young || too_old {
        AgeFit::Violated
    } else {
        AgeFit::Within
    }
}

/// `0.6·similarity + 0.3·skill + 0.1·education`, times 0.85 on an age violation.
pub fn composite(similarity: f64, skill: f64, education: f64, age: AgeFit) -> f64 {
    let base = SIMILARITY_WEIGHT * similarity + SKILL_WEIGHT * skill + EDUCATION_WEIGHT * education;
    if age == AgeFit::Violated {
        base * AGE_PENALTY
    } else {
        base
    }
}

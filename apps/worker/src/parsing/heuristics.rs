//! Deterministic field extraction. Always available, never calls out.

use std::sync::LazyLock;

use chrono::{Datelike, Utc};
use regex::Regex;

use crate::parsing::ParsedFields;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b")
        .expect("email pattern should compile")
});

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+?\(?\d[\d \t().-]{6,}\d").expect("phone pattern should compile")
});

static YEAR_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:19|20)\d{2}\s*(?:-|–|—|to)\s*(?:(?:19|20)\d{2}|present|current|now|today)\b",
    )
    .expect("year range pattern should compile")
});

static YEARS_PLUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s*\+\s*(?:years?|yrs?)\b")
        .expect("years-plus pattern should compile")
});

static YEARS_OF_EXPERIENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s+(?:years?|yrs?)\s+of\s+(?:\w+\s+)?experience\b")
        .expect("years-of-experience pattern should compile")
});

static AGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bage\s*[:\-]?\s*(\d{2})\b").expect("age pattern should compile")
});

static BIRTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:born|date of birth|d\.?o\.?b\.?)\b[^\n]*?\b((?:19|20)\d{2})\b")
        .expect("birth year pattern should compile")
});

static SUMMARY_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:professional\s+)?(?:summary|profile|objective|about me)\s*:?\s*(.*)$")
        .expect("summary heading pattern should compile")
});

/// Display name of each recognized skill. Matching is case-insensitive on
/// token boundaries.
const SKILL_VOCABULARY: &[&str] = &[
    "Rust", "Go", "Python", "Java", "JavaScript", "TypeScript", "C", "C++", "C#", "Ruby",
    "PHP", "Kotlin", "Swift", "Scala", "R", "SQL", "PostgreSQL", "MySQL", "MongoDB",
    "Redis", "Elasticsearch", "Kafka", "Spark", "Hadoop", "Airflow", "dbt", "Snowflake",
    "AWS", "Azure", "GCP", "Docker", "Kubernetes", "Terraform", "Ansible", "Linux", "Git",
    "CI/CD", "React", "Angular", "Vue", "Node.js", "Django", "Flask", "FastAPI", "Spring",
    ".NET", "GraphQL", "REST", "gRPC", "HTML", "CSS", "TensorFlow", "PyTorch",
    "scikit-learn", "Pandas", "NumPy", "Machine Learning", "Deep Learning", "NLP",
    "Computer Vision", "Data Analysis", "Excel", "Tableau", "Power BI", "Figma",
    "Agile", "Scrum", "Project Management", "Leadership", "Communication",
];

const EDUCATION_KEYWORDS: &[&str] = &[
    "university", "college", "institute", "school", "academy", "bachelor", "master",
    "phd", "ph.d", "doctorate", "mba", "bsc", "b.sc", "msc", "m.sc", "b.tech", "m.tech",
    "b.a.", "m.a.", "diploma", "degree",
];

const NON_NAME_WORDS: &[&str] = &[
    "resume", "résumé", "curriculum", "vitae", "cv", "profile", "summary", "contact",
    "experience", "education", "skills", "objective",
];

/// Runs every heuristic over normalized text.
pub fn extract(text: &str) -> ParsedFields {
    extract_at(text, Utc::now().year())
}

/// `current_year` anchors birth-year based age estimates.
pub fn extract_at(text: &str, current_year: i32) -> ParsedFields {
    let email = EMAIL.find(text).map(|m| m.as_str().to_string());
    let phone = find_phone(text);
    ParsedFields {
        name: guess_name(text, email.as_deref(), phone.as_deref()),
        email,
        phone,
        skills: match_skills(text),
        experience: experience_lines(text),
        education: education_lines(text),
        total_years: total_years(text),
        summary: summary(text),
        age: estimate_age(text, current_year),
    }
}

fn find_phone(text: &str) -> Option<String> {
    PHONE
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .find(|candidate| {
            let digits = candidate.chars().filter(char::is_ascii_digit).count();
            // Year ranges like "2019 - 2023" are not phone numbers
            (9..=15).contains(&digits) && !YEAR_RANGE.is_match(candidate)
        })
        .map(str::to_string)
}

/// First of the opening lines that looks like "Given Family": two to four
/// capitalized alphabetic tokens, no contact details, no section words.
fn guess_name(text: &str, email: Option<&str>, phone: Option<&str>) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(10)
        .find(|line| {
            if email.is_some_and(|e| line.contains(e)) || phone.is_some_and(|p| line.contains(p))
            {
                return false;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            (2..=4).contains(&tokens.len())
                && tokens.iter().all(|t| is_name_token(t))
                && !tokens
                    .iter()
                    .any(|t| NON_NAME_WORDS.contains(&t.to_lowercase().as_str()))
        })
        .map(str::to_string)
}

fn is_name_token(token: &str) -> bool {
    let mut chars = token.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_uppercase() && chars.all(|c| c.is_alphabetic() || matches!(c, '\'' | '-' | '.'))
}

fn match_skills(text: &str) -> Vec<String> {
    let haystack = text.to_lowercase();
    SKILL_VOCABULARY
        .iter()
        .filter(|skill| contains_token(&haystack, &skill.to_lowercase()))
        .map(|skill| skill.to_string())
        .collect()
}

/// Substring match whose neighbours are not alphanumeric, so "go" does not
/// match "good" and "c" does not match "c++".
fn contains_token(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after = haystack[end..].chars().next();
        let after_ok = after.map_or(true, |c| !c.is_alphanumeric() && c != '+' && c != '#');
        before_ok && after_ok
    })
}

fn experience_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| YEAR_RANGE.is_match(line))
        .filter(|line| !is_education_line(line))
        .map(str::to_string)
        .collect()
}

fn is_education_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    EDUCATION_KEYWORDS
        .iter()
        .any(|kw| contains_token(&lower, kw))
}

fn education_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && is_education_line(line))
        .map(str::to_string)
        .collect()
}

/// Largest "N+ years" or "N years of experience" claim.
fn total_years(text: &str) -> Option<f64> {
    YEARS_PLUS
        .captures_iter(text)
        .chain(YEARS_OF_EXPERIENCE.captures_iter(text))
        .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
        .max()
        .map(f64::from)
}

fn summary(text: &str) -> Option<String> {
    let mut lines = text.lines().map(str::trim);
    while let Some(line) = lines.next() {
        let Some(caps) = SUMMARY_HEADING.captures(line) else {
            continue;
        };
        let mut parts: Vec<&str> = Vec::new();
        if let Some(inline) = caps.get(1).map(|m| m.as_str().trim()) {
            if !inline.is_empty() {
                parts.push(inline);
            }
        }
        parts.extend(lines.by_ref().take_while(|l| !l.is_empty()));
        let joined = parts.join(" ");
        return (!joined.is_empty()).then_some(joined);
    }
    None
}

fn estimate_age(text: &str, current_year: i32) -> Option<u32> {
    let plausible = |age: i32| (16..=80).contains(&age).then_some(age as u32);

    if let Some(age) = AGE
        .captures(text)
        .and_then(|c| c.get(1)?.as_str().parse::<i32>().ok())
        .and_then(plausible)
    {
        return Some(age);
    }
    BIRTH_YEAR
        .captures(text)
        .and_then(|c| c.get(1)?.as_str().parse::<i32>().ok())
        .and_then(|year| plausible(current_year - year))
}

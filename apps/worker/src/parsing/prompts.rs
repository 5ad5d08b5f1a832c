// Prompt constants for AI-assisted résumé structuring.

use crate::llm_client::prompts::JSON_ONLY_SYSTEM;

pub fn resume_structure_system() -> String {
    format!(
        "You are an expert recruiter who reads résumés and extracts facts. {JSON_ONLY_SYSTEM}"
    )
}

/// Replace `{resume_text}` before sending.
pub const RESUME_STRUCTURE_PROMPT_TEMPLATE: &str = r#"Extract the candidate's details from the résumé below.

Return a JSON object with this EXACT schema (no extra fields). Use null or [] when a value is not stated:
{
  "name": "Jane Doe",
  "email": "jane@example.com",
  "phone": "+1 555 123 4567",
  "skills": ["Rust", "PostgreSQL"],
  "experience": ["Senior Engineer, Acme Corp, 2019 - Present"],
  "education": ["MSc Computer Science, University of Lisbon, 2015"],
  "totalYears": 8,
  "summary": "One or two sentences about the candidate.",
  "age": 34
}

Rules:
- Only report what the résumé states. Do NOT guess ages or years of experience.
- One entry per role in "experience" and per qualification in "education".
- "skills" are short canonical names (technologies, methods, languages).

RÉSUMÉ:
{resume_text}"#;

use async_trait::async_trait;

use crate::llm_client::{LlmClient, LlmError};
use crate::parsing::prompts::{resume_structure_system, RESUME_STRUCTURE_PROMPT_TEMPLATE};
use crate::parsing::ParsedFields;

/// Longest résumé excerpt sent for structuring.
const MAX_PROMPT_CHARS: usize = 24_000;

/// AI-assisted structuring. Callers treat every error as "use the baseline".
#[async_trait]
pub trait FieldAssistant: Send + Sync {
    async fn structure(&self, text: &str) -> Result<ParsedFields, LlmError>;
}

pub struct LlmFieldAssistant {
    llm: LlmClient,
}

impl LlmFieldAssistant {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl FieldAssistant for LlmFieldAssistant {
    async fn structure(&self, text: &str) -> Result<ParsedFields, LlmError> {
        let excerpt: String = text.chars().take(MAX_PROMPT_CHARS).collect();
        let prompt = RESUME_STRUCTURE_PROMPT_TEMPLATE.replace("{resume_text}", &excerpt);
        self.llm
            .call_json::<ParsedFields>(&prompt, &resume_structure_system())
            .await
    }
}

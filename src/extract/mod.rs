//! Fact extraction: email text in, `ExtractedFact` out.

pub mod prompt;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::ExtractionError;
use crate::llm::{ChatMessage, CompletionRequest, FinishReason, LlmProvider};
use crate::tracker::ExtractedFact;

/// Turns one email's text into a fact. Fields the extractor cannot
/// determine come back as placeholders or `Unknown`, not errors.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<ExtractedFact, ExtractionError>;

    /// Spend so far, for the run report.
    fn total_cost(&self) -> Decimal {
        Decimal::ZERO
    }
}

/// Output cap for one extraction reply. The JSON object is ~60 tokens.
const MAX_OUTPUT_TOKENS: u32 = 1024;

/// Extractor backed by an LLM provider.
pub struct LlmExtractor {
    llm: Arc<dyn LlmProvider>,
    spent: Mutex<Decimal>,
}

impl LlmExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            spent: Mutex::new(Decimal::ZERO),
        }
    }

    fn add_cost(&self, cost: Decimal) {
        let mut spent = self.spent.lock().unwrap_or_else(|p| p.into_inner());
        *spent += cost;
    }
}

#[async_trait]
impl Extractor for LlmExtractor {
    async fn extract(&self, text: &str) -> Result<ExtractedFact, ExtractionError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(prompt::SYSTEM_PROMPT),
            ChatMessage::user(prompt::build_prompt(text)),
        ])
        .with_temperature(0.0)
        .with_max_tokens(MAX_OUTPUT_TOKENS)
        .with_thinking_budget(0)
        .with_json_output();

        let response = self.llm.complete(request).await?;
        let cost = response.cost(self.llm.cost_per_token());
        self.add_cost(cost);

        debug!(
            model = %self.llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            %cost,
            "Extraction call"
        );

        match prompt::parse_fact(&response.content) {
            Err(ExtractionError::Malformed(_)) if response.finish_reason == FinishReason::Length => {
                warn!(
                    model = %self.llm.model_name(),
                    output_tokens = response.output_tokens,
                    "Extraction reply hit the output limit"
                );
                Err(ExtractionError::Truncated {
                    output_tokens: response.output_tokens,
                })
            }
            parsed => parsed,
        }
    }

    fn total_cost(&self) -> Decimal {
        *self.spent.lock().unwrap_or_else(|p| p.into_inner())
    }
}

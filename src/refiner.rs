//! Question refinement
//!
//! Rewrites a context-dependent follow-up into one self-contained question.

use crate::error::OrchestrationError;
use crate::llm::{GenerateOptions, TextGenerator};
use crate::models::{ConversationTurn, TurnRole};
use crate::Result;
use std::fmt::Write;
use tracing::{debug, warn};

/// Prior turns included in the refinement prompt.
const CONTEXT_TURNS: usize = 3;

pub struct QueryRefiner<'a> {
    llm: &'a dyn TextGenerator,
}

impl<'a> QueryRefiner<'a> {
    pub fn new(llm: &'a dyn TextGenerator) -> Self {
        Self { llm }
    }

    /// Single-turn conversations are returned verbatim without a model call.
    pub async fn refine(&self, turns: &[ConversationTurn]) -> Result<String> {
        let Some((current, prior)) = turns.split_last() else {
            return Err(OrchestrationError::InvalidRequest(
                "conversation has no turns".to_string(),
            ));
        };

        if prior.is_empty() {
            return Ok(current.text.clone());
        }

        let prompt = build_prompt(prior, &current.text);
        let response = self.llm.generate(&prompt, &GenerateOptions::default()).await?;
        let refined = response.trim();

        if refined.is_empty() {
            warn!("Refiner returned empty text, keeping the original question");
            return Ok(current.text.clone());
        }

        debug!(refined = %refined, "Question refined");
        Ok(refined.to_string())
    }
}

fn build_prompt(prior: &[ConversationTurn], current: &str) -> String {
    let start = prior.len().saturating_sub(CONTEXT_TURNS);
    let mut history = String::new();
    for turn in &prior[start..] {
        let speaker = match turn.role {
            TurnRole::User => "User",
            TurnRole::Assistant => "Assistant",
        };
        let _ = writeln!(history, "- {}: {}", speaker, turn.text);
    }

    format!(
        r#"You rewrite follow-up questions about a household ledger.

Previous conversation:
{}
Current question: {}

Rewrite the current question as ONE self-contained question that carries over
every entity, period and filter it depends on from the conversation.
Keep the language of the current question.
Return only the rewritten question."#,
        history, current
    )
}

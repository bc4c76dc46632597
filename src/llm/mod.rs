//! Text-generation port and implementations
//!
//! Every model call in the pipeline goes through [`TextGenerator`].
//! Variants exist for an OpenAI-compatible endpoint (vLLM, Grok, ...) and
//! for Gemini's native API.

use crate::config::{LlmProvider, Settings};
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub mod gemini;
pub mod openai;

pub use gemini::GeminiGenerator;
pub use openai::OpenAiCompatibleGenerator;

/// Per-call generation options.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub system_prompt: Option<String>,
    pub temperature: f32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            temperature: 0.1,
        }
    }
}

impl GenerateOptions {
    pub fn with_system(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(system_prompt.into()),
            ..Self::default()
        }
    }
}

/// Single-method capability: prompt in, text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String>;
}

/// Build the configured generator.
pub fn from_settings(settings: &Settings) -> Result<Arc<dyn TextGenerator>> {
    let generator: Arc<dyn TextGenerator> = match settings.llm_provider {
        LlmProvider::OpenAiCompatible => Arc::new(OpenAiCompatibleGenerator::new(
            settings.llm_api_key.clone(),
            settings.llm_base_url.clone(),
            settings.llm_model_name.clone(),
            settings.llm_timeout,
            settings.llm_connect_timeout,
        )?),
        LlmProvider::Gemini => Arc::new(GeminiGenerator::new(
            settings.gemini_api_key.clone(),
            settings.llm_timeout,
            settings.llm_connect_timeout,
        )?),
    };
    Ok(generator)
}

/// Scripted generator for development & testing.
///
/// Replies are handed out in order; running out is an upstream failure.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue a failing reply after the ones already queued.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Err(OrchestrationError::LlmError(message.into())));
        }
        self
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _options: &GenerateOptions) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let next = self
            .replies
            .lock()
            .map_err(|_| OrchestrationError::LlmError("scripted generator poisoned".into()))?
            .pop_front();

        next.unwrap_or_else(|| {
            Err(OrchestrationError::LlmError(
                "scripted generator has no replies left".into(),
            ))
        })
    }
}

//! Text generation seam.
//!
//! Stages hand an instruction template plus named variables to a
//! [`TextGenerator`] and get free text back. Nothing about the shape of that
//! text is guaranteed; parsing is the normalizer's job.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sidequest_provider::{LlmMessage, LlmProvider, LlmRequest};

pub type Variables = Map<String, Value>;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, instruction: &str, variables: &Variables) -> Result<String>;
}

/// [`TextGenerator`] backed by an [`LlmProvider`].
pub struct LlmTextGenerator {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
}

impl LlmTextGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens,
        }
    }
}

#[async_trait]
impl TextGenerator for LlmTextGenerator {
    async fn generate(&self, instruction: &str, variables: &Variables) -> Result<String> {
        let input = serde_json::to_string_pretty(variables)?;
        let request = LlmRequest {
            model: self.model.clone(),
            system: Some(render_instruction(instruction, variables)),
            messages: vec![LlmMessage::user(format!("Input:\n{input}"))],
            max_tokens: self.max_tokens,
            temperature: None,
            json_output: true,
        };
        let response = self.provider.chat(request).await?;
        tracing::debug!(
            model = %self.model,
            input_tokens = ?response.input_tokens,
            output_tokens = ?response.output_tokens,
            "text generation finished"
        );
        Ok(response.text)
    }
}

/// Replace `{name}` placeholders for every known variable. Unknown braces are
/// left alone so JSON examples inside instructions survive.
pub fn render_instruction(template: &str, variables: &Variables) -> String {
    let mut rendered = template.to_string();
    for (name, value) in variables {
        let placeholder = format!("{{{name}}}");
        if !rendered.contains(&placeholder) {
            continue;
        }
        let replacement = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        rendered = rendered.replace(&placeholder, &replacement);
    }
    rendered
}

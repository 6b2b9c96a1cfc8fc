//! Reasoning oracle backed by an OpenAI-compatible chat completions API.

mod prompts;

pub use prompts::system_prompt;

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    ResponseFormat,
};
use async_openai::Client;
use async_trait::async_trait;
use rootcause_core::{ModelConfig, OracleError, ReasoningOracle, StageContext};
use tracing::{debug, info};

/// Oracle sending each stage context to a chat model in JSON mode.
pub struct LlmOracle {
    model: ModelConfig,
    client: Client<OpenAIConfig>,
}

impl LlmOracle {
    /// Uses `OPENAI_API_KEY` from the environment and the model's `api_base`
    /// when set.
    pub fn new(model: ModelConfig) -> Self {
        let mut config = OpenAIConfig::new();
        if let Some(base) = &model.api_base {
            config = config.with_api_base(base);
        }
        Self {
            model,
            client: Client::with_config(config),
        }
    }

    pub fn model(&self) -> &ModelConfig {
        &self.model
    }
}

#[async_trait]
impl ReasoningOracle for LlmOracle {
    async fn decide(&self, context: &StageContext) -> Result<serde_json::Value, OracleError> {
        let user_input = render_context(context)?;
        let backend = |e: async_openai::error::OpenAIError| OracleError::Backend(e.to_string());

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model.model)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt(context.stage))
                    .build()
                    .map_err(backend)?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user_input)
                    .build()
                    .map_err(backend)?
                    .into(),
            ])
            .response_format(ResponseFormat::JsonObject)
            .build()
            .map_err(backend)?;

        info!(
            "║     → Oracle ({}) for {}{}",
            self.model.name,
            context.stage.as_str(),
            context.task_id.as_deref().map(|id| format!(" [{}]", id)).unwrap_or_default()
        );
        let response = self.client.chat().create(request).await.map_err(backend)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OracleError::SchemaValidation("model returned no content".into()))?;
        debug!("Oracle response: {} chars", content.len());
        parse_content(&content)
    }
}

/// Serialises the context for the model, feedback from a rejected answer first.
fn render_context(context: &StageContext) -> Result<String, OracleError> {
    let body = serde_json::to_string_pretty(context)?;
    Ok(match &context.feedback {
        Some(feedback) => format!(
            "Your previous answer was rejected: {}\nAnswer again using the required JSON shape.\n\n{}",
            feedback, body
        ),
        None => body,
    })
}

/// Parses model output as JSON, tolerating a surrounding markdown fence.
fn parse_content(content: &str) -> Result<serde_json::Value, OracleError> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    Ok(serde_json::from_str(unfenced.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rootcause_core::Stage;
    use serde_json::json;

    #[test]
    fn test_parse_plain_and_fenced_json() {
        let plain = parse_content(r#"{"action": "submit", "payload": {}}"#).unwrap();
        assert_eq!(plain["action"], "submit");

        let fenced = parse_content("```json\n{\"action\": \"tool_request\"}\n```").unwrap();
        assert_eq!(fenced["action"], "tool_request");
    }

    #[test]
    fn test_non_json_is_schema_error() {
        let result = parse_content("The root cause is redis.");
        assert!(matches!(result, Err(OracleError::SchemaValidation(_))));
    }

    #[test]
    fn test_feedback_leads_rendered_context() {
        let context = StageContext::new(Stage::Worker, json!({"task": "rca-1.1"})).retry("unknown tool `rm`");
        let rendered = render_context(&context).unwrap();
        assert!(rendered.starts_with("Your previous answer was rejected: unknown tool `rm`"));
        assert!(rendered.contains("\"attempt\": 2"));
    }

    #[test]
    fn test_every_stage_prompt_names_envelope() {
        for stage in [Stage::Triage, Stage::Planner, Stage::Worker, Stage::Supervisor] {
            let prompt = system_prompt(stage);
            assert!(prompt.contains("\"action\": \"submit\""), "{:?}", stage);
        }
        assert!(system_prompt(Stage::Worker).contains("tool_request"));
    }

    #[test]
    fn test_api_base_is_kept() {
        let oracle = LlmOracle::new(ModelConfig {
            id: "local".into(),
            name: "Local".into(),
            model: "qwen2.5".into(),
            api_base: Some("http://localhost:11434/v1".into()),
        });
        assert_eq!(oracle.model().model, "qwen2.5");
    }
}

//! Model backend over the `genai` multi-provider client

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use genai::Client;
use genai::WebConfig;
use genai::chat::{ChatMessage, ChatRequest, ChatStreamEvent};
use genai::resolver::{AuthData, AuthResolver};

use super::logging::{LogConfig, log_model_interaction};
use super::{Model, ProviderType};
use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::history::{HistoryEntry, Role};

/// A model served through `genai`
pub struct GenAIModel {
    client: Client,
    provider_type: ProviderType,
    model: String,
}

impl GenAIModel {
    /// Default timeout for model requests
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    fn default_web_config() -> WebConfig {
        WebConfig::default()
            .with_timeout(Self::DEFAULT_TIMEOUT)
            .with_connect_timeout(Duration::from_secs(30))
    }

    /// Create a model that reads credentials from the provider's usual environment variable
    pub fn new(provider_type: ProviderType, model: Option<&str>) -> Self {
        let client = Client::builder()
            .with_web_config(Self::default_web_config())
            .build();

        Self {
            client,
            provider_type,
            model: model.unwrap_or(provider_type.default_model()).to_string(),
        }
    }

    /// Create a model with an explicit API key
    pub fn with_api_key(provider_type: ProviderType, api_key: &str, model: Option<&str>) -> Self {
        let api_key = api_key.to_string();
        let auth_resolver = AuthResolver::from_resolver_fn(
            move |_model_iden| -> std::result::Result<Option<AuthData>, genai::resolver::Error> {
                Ok(Some(AuthData::from_single(api_key.clone())))
            },
        );

        let client = Client::builder()
            .with_web_config(Self::default_web_config())
            .with_auth_resolver(auth_resolver)
            .build();

        Self {
            client,
            provider_type,
            model: model.unwrap_or(provider_type.default_model()).to_string(),
        }
    }

    /// Build from the `[provider]` configuration section.
    ///
    /// Providers that need a key fail here when none can be found.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let model = config.model.as_deref();

        match config.get_api_key() {
            Some(key) => Ok(Self::with_api_key(config.provider_type, &key, model)),
            None if config.provider_type.requires_api_key() => Err(Error::Config(format!(
                "No API key for provider '{}'; set {} or provider.api_key",
                config.provider_type,
                config
                    .api_key_env
                    .as_deref()
                    .or(config.provider_type.api_key_env())
                    .unwrap_or("an API key variable"),
            ))),
            None => Ok(Self::new(config.provider_type, model)),
        }
    }

    pub fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    /// Stream the reply and concatenate its text chunks
    async fn collect_reply(&self, request: ChatRequest) -> Result<String> {
        let response = self
            .client
            .exec_chat_stream(&self.model, request, None)
            .await
            .map_err(|e| Error::Model(format!("GenAI error: {}", e)))?;

        let mut stream = response.stream;
        let mut content = String::new();

        while let Some(event) = stream.next().await {
            match event {
                Ok(ChatStreamEvent::Chunk(chunk)) => content.push_str(&chunk.content),
                Ok(ChatStreamEvent::End(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = ?e, model = %self.model, "Model stream error");
                    return Err(Error::Model(format!("GenAI stream error: {}", e)));
                }
            }
        }

        if content.trim().is_empty() {
            return Err(Error::Model("Model returned an empty response".to_string()));
        }
        Ok(content)
    }

    fn build_request(system_instruction: &str, history: &[HistoryEntry]) -> ChatRequest {
        history.iter().fold(
            ChatRequest::default().with_system(system_instruction),
            |req, entry| match entry.role {
                Role::User => req.append_message(ChatMessage::user(entry.content.as_str())),
                Role::Model => req.append_message(ChatMessage::assistant(entry.content.as_str())),
            },
        )
    }
}

#[async_trait]
impl Model for GenAIModel {
    async fn generate(&self, system_instruction: &str, history: &[HistoryEntry]) -> Result<String> {
        let request = Self::build_request(system_instruction, history);
        tracing::debug!(model = %self.model, entries = history.len(), "Sending model request");

        let outcome = self.collect_reply(request).await;

        let error = outcome.as_ref().err().map(|e| e.to_string());
        log_model_interaction(LogConfig {
            model: &self.model,
            provider: Some(self.provider_type.as_str()),
            system_instruction: Some(system_instruction),
            history,
            response: outcome.as_deref().ok(),
            error: error.as_deref(),
        });

        outcome
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_per_provider() {
        let model = GenAIModel::new(ProviderType::Cohere, None);
        assert_eq!(model.name(), "command-a-03-2025");

        let model = GenAIModel::new(ProviderType::Gemini, Some("gemini-2.0-flash"));
        assert_eq!(model.name(), "gemini-2.0-flash");
    }

    #[test]
    fn test_from_config_without_key_fails_for_hosted_provider() {
        let config = ProviderConfig {
            provider_type: ProviderType::Cohere,
            api_key_env: Some("POCKET_TEST_UNSET_KEY_VAR".to_string()),
            ..Default::default()
        };
        if std::env::var("COHERE_API_KEY").is_ok() {
            return;
        }

        assert!(matches!(GenAIModel::from_config(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_config_ollama_without_key() {
        let config = ProviderConfig {
            provider_type: ProviderType::Ollama,
            ..Default::default()
        };
        let model = GenAIModel::from_config(&config).unwrap();
        assert_eq!(model.provider_type(), ProviderType::Ollama);
        assert_eq!(model.name(), "llama3.2");
    }
}

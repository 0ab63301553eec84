//! Language model abstraction
//!
//! The agent only needs one operation from a model: given the system
//! instruction and the conversation so far, produce the next reply as text.

mod genai_model;
pub mod logging;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::history::HistoryEntry;

pub use genai_model::GenAIModel;

/// Text generation backend used by the agent
#[async_trait]
pub trait Model: Send + Sync {
    /// Produce the next reply for `history` under `system_instruction`
    async fn generate(&self, system_instruction: &str, history: &[HistoryEntry]) -> Result<String>;

    /// Model identifier, for logs
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Supported LLM provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Google Gemini
    #[default]
    Gemini,
    /// OpenAI (GPT-4o, GPT-5, etc.)
    OpenAI,
    /// Anthropic (Claude)
    Anthropic,
    /// Cohere (Command A, Command R)
    Cohere,
    /// Groq (fast inference)
    Groq,
    /// DeepSeek
    DeepSeek,
    /// Ollama (local)
    Ollama,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderType::Gemini),
            "openai" => Ok(ProviderType::OpenAI),
            "anthropic" | "claude" => Ok(ProviderType::Anthropic),
            "cohere" => Ok(ProviderType::Cohere),
            "groq" => Ok(ProviderType::Groq),
            "deepseek" => Ok(ProviderType::DeepSeek),
            "ollama" => Ok(ProviderType::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Gemini => "gemini",
            ProviderType::OpenAI => "openai",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Cohere => "cohere",
            ProviderType::Groq => "groq",
            ProviderType::DeepSeek => "deepseek",
            ProviderType::Ollama => "ollama",
        }
    }

    /// Get the default model for this provider
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderType::Gemini => "gemini-2.5-flash",
            ProviderType::OpenAI => "gpt-5",
            ProviderType::Anthropic => "claude-sonnet-4-5",
            ProviderType::Cohere => "command-a-03-2025",
            ProviderType::Groq => "llama-3.3-70b-versatile",
            ProviderType::DeepSeek => "deepseek-chat",
            ProviderType::Ollama => "llama3.2",
        }
    }

    /// Conventional environment variable holding the API key
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderType::Gemini => Some("GEMINI_API_KEY"),
            ProviderType::OpenAI => Some("OPENAI_API_KEY"),
            ProviderType::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderType::Cohere => Some("COHERE_API_KEY"),
            ProviderType::Groq => Some("GROQ_API_KEY"),
            ProviderType::DeepSeek => Some("DEEPSEEK_API_KEY"),
            ProviderType::Ollama => None,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        self.api_key_env().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_round_trip() {
        for name in ["gemini", "openai", "anthropic", "cohere", "groq", "deepseek", "ollama"] {
            let provider: ProviderType = name.parse().unwrap();
            assert_eq!(provider.as_str(), name);
        }
        assert_eq!("Google".parse::<ProviderType>().unwrap(), ProviderType::Gemini);
        assert!("mystery".parse::<ProviderType>().is_err());
    }

    #[test]
    fn test_ollama_needs_no_key() {
        assert!(!ProviderType::Ollama.requires_api_key());
        assert_eq!(ProviderType::Cohere.api_key_env(), Some("COHERE_API_KEY"));
    }
}

//! Provider selection by role.
//!
//! Chat and text completions go to `default_provider`; document and question
//! embeddings go to `embedding_provider` when one is named. Each role
//! resolves to a `[providers.<name>]` entry, falling back to the top-level
//! API key and the well-known base URL for that name.

use std::sync::Arc;

use ragrelay_config::AppConfig;
use ragrelay_core::provider::Provider;
use tracing::debug;

use crate::openai_compat::OpenAiCompatProvider;

/// The providers a running relay talks to.
#[derive(Clone)]
pub struct ProviderSet {
    chat: Arc<dyn Provider>,
    embeddings: Arc<dyn Provider>,
}

impl ProviderSet {
    pub fn new(chat: Arc<dyn Provider>, embeddings: Arc<dyn Provider>) -> Self {
        Self { chat, embeddings }
    }

    /// Answers chat turns and `/completions`.
    pub fn chat(&self) -> Arc<dyn Provider> {
        self.chat.clone()
    }

    /// Embeds documents and questions for the knowledge base.
    pub fn embeddings(&self) -> Arc<dyn Provider> {
        self.embeddings.clone()
    }
}

/// Build one OpenAI-compatible client for the provider called `name`.
pub fn resolve(config: &AppConfig, name: &str) -> OpenAiCompatProvider {
    let entry = config.providers.get(name);
    let api_key = entry
        .and_then(|p| p.api_key.clone())
        .or_else(|| config.api_key.clone())
        .unwrap_or_default();
    let base_url = entry
        .and_then(|p| p.api_url.clone())
        .unwrap_or_else(|| default_base_url(name));

    debug!(provider = name, base_url = %base_url, configured = entry.is_some(), "Resolved provider");
    OpenAiCompatProvider::new(name, base_url, api_key)
}

/// Resolve both roles. A role naming the chat provider shares its client.
pub fn build_from_config(config: &AppConfig) -> ProviderSet {
    let chat: Arc<dyn Provider> = Arc::new(resolve(config, &config.default_provider));
    let embeddings: Arc<dyn Provider> = match config.embedding_provider() {
        name if name == config.default_provider => chat.clone(),
        name => Arc::new(resolve(config, name)),
    };
    ProviderSet::new(chat, embeddings)
}

/// Base URL of well-known OpenAI-compatible services.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragrelay_config::ProviderConfig;

    #[test]
    fn default_config_uses_one_openai_client() {
        let set = build_from_config(&AppConfig::default());
        assert_eq!(set.chat().name(), "openai");
        assert!(Arc::ptr_eq(&set.chat(), &set.embeddings()));
    }

    #[test]
    fn named_embedding_provider_is_reachable() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-chat".into());
        config.embedding_provider = Some("local".into());
        config.providers.insert(
            "local".into(),
            ProviderConfig {
                api_url: Some("http://localhost:9000/v1".into()),
                ..Default::default()
            },
        );

        let set = build_from_config(&config);
        assert_eq!(set.chat().name(), "openai");
        assert_eq!(set.embeddings().name(), "local");
        assert!(!Arc::ptr_eq(&set.chat(), &set.embeddings()));
    }

    #[test]
    fn provider_entry_overrides_url_and_key() {
        let mut config = AppConfig::default();
        config.default_provider = "ollama".into();
        config.providers.insert(
            "ollama".into(),
            ProviderConfig {
                api_url: Some("http://gpu-box:11434/v1/".into()),
                ..Default::default()
            },
        );
        assert_eq!(resolve(&config, "ollama").base_url(), "http://gpu-box:11434/v1");
        assert_eq!(resolve(&config, "groq").base_url(), "https://api.groq.com/openai/v1");
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
        assert!(default_base_url("acme").starts_with("https://acme."));
    }
}

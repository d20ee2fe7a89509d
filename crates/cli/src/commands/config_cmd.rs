//! `ragrelay config`: configuration management commands.

use anyhow::Context;
use ragrelay_config::{AppConfig, RetrievalMode};

/// Non-fatal findings about a configuration that loaded fine.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();

    if !config.has_api_key() && config.providers.values().all(|p| p.api_key.is_none()) {
        warnings.push("No API key set (set RAGRELAY_API_KEY or OPENAI_API_KEY)");
    }

    if config.storage.documents_file.is_none() && config.chat.retrieval != RetrievalMode::Never {
        warnings.push("No storage.documents_file, the knowledge base starts empty on every run");
    }

    if !config.auth.required {
        warnings.push("auth.required is off, every caller is anonymous");
    }

    if !config.gateway.rate_limit.enabled {
        warnings.push("Rate limiting is disabled on the chat routes");
    }

    warnings
}

pub fn validate() -> anyhow::Result<()> {
    println!("Validating configuration...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   Config parsed successfully");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   warning: {w}");
        }
    }

    println!();
    println!("   Provider:      {}", config.default_provider);
    println!("   Model:         {}", config.chat_model());
    println!("   Embeddings:    {}", config.embedding_provider());
    println!("   Gateway:       {}", config.gateway.listen_addr());
    println!("   Retrieval:     {:?}", config.chat.retrieval);
    println!("   Conversations: {:?}", config.storage.conversations);
    println!("   Auth tokens:   {}", config.auth.tokens.len());

    Ok(())
}

pub fn show() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub fn path() {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains(".ragrelay"));
    }

    #[test]
    fn default_config_warns_about_open_access() {
        let found = warnings(&AppConfig::default());
        assert!(found.iter().any(|w| w.contains("API key")));
        assert!(found.iter().any(|w| w.contains("anonymous")));
    }

    #[test]
    fn configured_deployment_has_no_warnings() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-test".into());
        config.auth.required = true;
        config.storage.documents_file = Some("kb.jsonl".into());
        assert!(warnings(&config).is_empty());
    }
}

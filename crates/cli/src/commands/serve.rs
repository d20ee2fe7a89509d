//! `ragrelay serve`: start the HTTP gateway.

use anyhow::Context;
use ragrelay_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("ragrelay gateway");
    println!("   Listening:     {}", config.gateway.listen_addr());
    println!("   Provider:      {}", config.default_provider);
    println!("   Model:         {}", config.chat_model());
    println!("   Auth required: {}", config.auth.required);

    ragrelay_gateway::start(config).await?;

    Ok(())
}

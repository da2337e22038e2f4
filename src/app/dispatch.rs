use anyhow::Context;
use tokio::io::AsyncReadExt;

use crate::app::status::render_status;
use crate::cli::commands::{Cli, Commands};
use crate::config::Config;
use crate::error::Result;
use crate::providers::AnthropicRewriter;
use crate::transport::runtime;

/// One-shot rewrite for the terminal.
async fn run_rewrite(config: &Config, text: Option<String>) -> Result<()> {
    let text = match text {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buffer)
                .await
                .context("read draft from stdin")?;
            buffer
        }
    };

    let rewriter = AnthropicRewriter::new(&config.rewrite);
    let result = rewriter.rewrite_text(&text).await?;
    println!("{}", result.text());
    Ok(())
}

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Run => {
            config.require_discord_token()?;
            Ok(runtime::run(&config).await?)
        }
        Commands::Rewrite { text } => run_rewrite(&config, text).await,
        Commands::Register => {
            config.require_discord_token()?;
            let application_id = runtime::register(&config).await?;
            println!(
                "Registered /{} for application {application_id} ({})",
                config.discord.command_name,
                config
                    .discord
                    .guild_id
                    .as_deref()
                    .map_or_else(|| "global".to_string(), |guild| format!("guild {guild}"))
            );
            Ok(())
        }
        Commands::Status => {
            println!("{}", render_status(&config));
            Ok(())
        }
    }
}

/// Config from `--config` when given, else the default location.
pub fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

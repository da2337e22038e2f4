use clap::{Parser, Subcommand};

/// `rewrite-relay` - post a polished rewrite of your draft under your own name.
#[derive(Parser, Debug)]
#[command(name = "rewrite-relay")]
#[command(version)]
#[command(about = "Discord bot that rewrites private drafts and posts them as you.", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.rewrite-relay/config.toml
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to Discord and serve the rewrite command
    Run,

    /// Rewrite TEXT (or stdin) once and print the result
    Rewrite {
        /// Text to rewrite; read from stdin when omitted
        text: Option<String>,
    },

    /// Register the slash command and exit
    Register,

    /// Show effective configuration with secrets masked
    Status,
}

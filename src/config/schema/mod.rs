mod core;
mod discord;
mod drafts;
mod rewrite;

pub use core::{Config, ReliabilityConfig};
pub use discord::DiscordConfig;
pub use drafts::DraftsConfig;
pub use rewrite::RewriteConfig;

pub mod schema;

pub use schema::{Config, DiscordConfig, DraftsConfig, ReliabilityConfig, RewriteConfig};

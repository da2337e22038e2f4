pub mod anthropic;
mod anthropic_types;
pub mod http_client;
pub mod scrub;
pub mod traits;

pub use anthropic::AnthropicRewriter;
pub use scrub::{char_prefix, scrub_secret_patterns};
pub use traits::{RewriteRequest, RewriteResult, Rewriter};

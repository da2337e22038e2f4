use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Errors surfaced by the command-line entry points.
///
/// Draft and Discord errors stay inside the interaction layer, which reports
/// them to the user; transport glue keeps using `anyhow::Result` for context
/// chains and lands in `Other`.
#[derive(Debug, Error)]
pub enum RelayError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Rewrite provider ────────────────────────────────────────────────
    #[error("rewrite: {0}")]
    Rewrite(#[from] RewriteError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("validation failed: {0}")]
    Validation(String),
}

// ─── Rewrite errors ─────────────────────────────────────────────────────────

/// Every way a single rewrite attempt can fail.
///
/// `Display` output is shown to the end user verbatim after `Error: `.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("there is no text to rewrite")]
    InvalidInput,

    #[error("the rewrite API key is not configured (set ANTHROPIC_API_KEY)")]
    MissingCredential,

    #[error("the rewrite service did not answer within {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("the rewrite service rejected the request (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    #[error("the rewrite service returned no text: {raw_prefix}")]
    MalformedResponse { raw_prefix: String },

    #[error("could not reach the rewrite service: {0}")]
    Transport(String),
}

// ─── Draft errors ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("you have no pending draft; run the compose command again")]
    NotFound,

    #[error("this draft was composed in another channel and can only be sent there")]
    ChannelMismatch {
        origin_channel_id: String,
        requested_channel_id: String,
    },
}

// ─── Transport errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("discord request {route} failed ({status}): {message}")]
    Discord {
        route: String,
        status: u16,
        message: String,
    },

    #[error("only {delivered} of {total} message parts were posted")]
    PartialDelivery { delivered: usize, total: usize },
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, RelayError>;

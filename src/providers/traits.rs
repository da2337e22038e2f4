use std::future::Future;
use std::pin::Pin;

use crate::error::RewriteError;

/// Rewritten text returned by a provider. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteResult {
    rewritten_text: String,
}

impl RewriteResult {
    /// Wrap provider output; blank text is not a valid result.
    pub fn new(rewritten_text: impl Into<String>) -> Option<Self> {
        let rewritten_text = rewritten_text.into();
        if rewritten_text.trim().is_empty() {
            None
        } else {
            Some(Self { rewritten_text })
        }
    }

    pub fn text(&self) -> &str {
        &self.rewritten_text
    }

    pub fn into_text(self) -> String {
        self.rewritten_text
    }
}

/// Validated input for one rewrite call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRequest {
    original_text: String,
}

impl RewriteRequest {
    pub fn new(original_text: &str) -> Result<Self, RewriteError> {
        let trimmed = original_text.trim();
        if trimmed.is_empty() {
            return Err(RewriteError::InvalidInput);
        }
        Ok(Self {
            original_text: trimmed.to_string(),
        })
    }

    pub fn text(&self) -> &str {
        &self.original_text
    }
}

/// A text-rewriting backend. The interaction layer depends only on this.
pub trait Rewriter: Send + Sync {
    /// Short provider label for logs.
    fn name(&self) -> &str;

    /// Rewrite `original_text` in a single attempt.
    fn rewrite<'a>(
        &'a self,
        original_text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RewriteResult, RewriteError>> + Send + 'a>>;
}

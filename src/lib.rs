#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::unnecessary_literal_bound,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use
)]

pub mod app;
pub mod cli;
pub mod config;
pub mod drafts;
pub mod error;
pub mod providers;
pub mod transport;

pub use config::Config;
pub use drafts::{Draft, DraftStore};
pub use error::{DraftError, RelayError, RewriteError};
pub use providers::{AnthropicRewriter, RewriteResult, Rewriter};

pub mod discord;
pub mod runtime;

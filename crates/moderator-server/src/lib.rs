//! Moderator Server
//!
//! HTTP service scoring text for toxicity with a multilingual XLM-RoBERTa
//! checkpoint. The model is loaded once at startup and shared by every
//! request; inference runs inline in the request handler.

pub mod cli;
pub mod config;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use cli::Cli;
pub use config::{ConfigOverrides, LogFormat, ServiceConfig};
pub use routes::create_router;
pub use state::AppState;

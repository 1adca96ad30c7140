//! Moderator Core
//!
//! Types and utilities shared across Moderator components.
//!
//! This crate provides:
//! - Wire types for moderation requests, score maps, and verdicts
//! - Checkpoint class-name remapping
//! - Error types and result handling
//! - A small HTTP client for calling a running service

pub mod client;
pub mod error;
pub mod labels;
pub mod types;

pub use client::ModerationClient;
pub use error::{Error, Result};
pub use labels::{default_labels, remap_class_name, remap_class_names, DEFAULT_CHECKPOINT_CLASSES};
pub use types::{
    ModerationRequest, ModerationResponse, Prediction, Scores, TextInput, Verdict,
    VerdictResponse,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{ModerationRequest, ModerationResponse, Prediction, TextInput, Verdict};
}

//! Structured errors
//!
//! Every failure the engine reports is a value: a machine-readable code, a
//! human message and optional JSON context. Errors are `Clone` so a single
//! playback failure can be delivered to both the handle and the
//! notification queue.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("[{code:?}] {message}")]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The OS input hook could not be registered or is already held.
    CaptureUnavailable,
    /// Playback could not start (engine busy or no input emitter).
    PlaybackUnavailable,
    StoreWrite,
    StoreRead,
    InvalidName,
    InvalidConfig,
    /// A stop/cancel command arrived with nothing to stop.
    NotActive,
    /// The input emitter rejected a synthesized action.
    EmitFailed,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn capture_unavailable(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::CaptureUnavailable, reason)
    }

    pub fn playback_unavailable(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::PlaybackUnavailable, reason)
    }

    pub fn store_write(path: &Path, reason: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorCode::StoreWrite,
            format!("Failed to write {}: {}", path.display(), reason),
        )
        .with_context(serde_json::json!({ "path": path.display().to_string() }))
    }

    pub fn store_read(path: &Path, reason: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorCode::StoreRead,
            format!("Failed to read {}: {}", path.display(), reason),
        )
        .with_context(serde_json::json!({ "path": path.display().to_string() }))
    }

    pub fn invalid_name(name: &str) -> Self {
        Self::new(
            ErrorCode::InvalidName,
            format!("Recording name must be non-empty, got {:?}", name),
        )
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfig, reason)
    }

    pub fn not_active(what: &str) -> Self {
        Self::new(ErrorCode::NotActive, format!("No {} in progress", what))
    }

    pub fn emit_failed(action: &str, reason: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorCode::EmitFailed,
            format!("{} failed: {}", action, reason),
        )
    }
}

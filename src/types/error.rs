//! Error types for the engine
//!
//! Local, recoverable conditions (validation, quota) are handled inside the
//! engine and never panic. Commit and load failures are surfaced to the view
//! layer; a failed commit always leaves the staging store clean.

/// Main error type for engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Quota exceeded for '{item_type}': no redemptions left in the current window")]
    QuotaExceeded { item_type: String },

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Load failed: {0}")]
    Load(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// True for conditions the engine resolves locally without any network call
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::QuotaExceeded { .. })
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

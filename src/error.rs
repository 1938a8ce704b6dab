use thiserror::Error;

/// Failures the instrument core reports to its callers.
///
/// Redundant triggers and releases are not errors; they are silently ignored.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("frequency {freq} Hz is outside the playable band")]
    InvalidFrequency { freq: f32 },

    #[error("failed to decode impulse response {name}: {reason}")]
    DecodeFailure { name: String, reason: String },

    #[error("audio thread is no longer receiving commands")]
    Disconnected,

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
}

impl CoreError {
    pub(crate) fn decode(name: impl Into<String>, reason: impl ToString) -> Self {
        CoreError::DecodeFailure {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

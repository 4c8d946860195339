use thiserror::Error;

/// Failures raised while evaluating rules against a pull request.
///
/// Configuration and parse errors are fatal to one rule for one pull
/// request; transient errors come from the forge and mean the pull
/// request must be looked at again on the next run.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("cannot parse '{input}' as a {kind} date")]
    Parse { kind: &'static str, input: String },

    #[error("forge request failed: {0:#}")]
    Transient(anyhow::Error),
}

impl BotError {
    pub fn config(message: impl Into<String>) -> Self {
        BotError::Configuration(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, BotError::Transient(_))
    }
}

pub type BotResult<T> = std::result::Result<T, BotError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AmlError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Illegal {kind} transition on {id}: cannot {action} from {from}")]
    IllegalTransition {
        kind: &'static str,
        id: String,
        from: String,
        action: &'static str,
    },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} '{id}' already exists")]
    DuplicateId { kind: &'static str, id: String },

    #[error("Regulator submission failed for report '{report_id}': {reason} (retryable)")]
    Regulator { report_id: String, reason: String },

    #[error("Store lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AmlError {
    /// Collaborator failures that leave the record untouched and may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AmlError::Regulator { .. })
    }
}

pub type AmlResult<T> = Result<T, AmlError>;

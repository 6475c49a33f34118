use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No balance record for account '{user_id}'")]
    BalanceNotFound { user_id: String },

    #[error("Ledger source '{table}' unavailable: {reason}")]
    SourceUnavailable { table: String, reason: String },

    #[error("Malformed row '{id}' in source '{table}': {detail}")]
    MalformedEvent {
        table: String,
        id: String,
        detail: String,
    },

    #[error("Corrective write for account '{user_id}' collided with a concurrent correction")]
    PersistenceConflict { user_id: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ReconResult<T> = Result<T, ReconError>;

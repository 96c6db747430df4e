use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync job for account {account_id} not found")]
    JobNotFound { account_id: String },

    #[error("Sync batch requires at least one account id")]
    EmptyBatch,

    #[error("No usable platform credential configured")]
    NoCredential,

    #[error("Platform credential invalid: {0}")]
    AuthInvalid(String),

    #[error("Account {account_id} returned an empty listing after token refresh")]
    EmptyListing { account_id: String },

    #[error("Content source error: {0}")]
    Source(String),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Sync batch timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid job status: {0}")]
    InvalidStatus(String),

    #[error("Invalid sync mode: {0}")]
    InvalidMode(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Download queue unavailable: {0}")]
    QueueClosed(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        SyncError::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

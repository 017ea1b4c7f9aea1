use crate::rows::Revision;

/// Errors produced by space-store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store is not open")]
    NotOpen,

    #[error("store is already open in another session")]
    AlreadyOpen,

    #[error("no change set in progress")]
    NoChangeSet,

    #[error("a change set is already in progress")]
    ChangeSetInProgress,

    #[error("revision {0} does not exist")]
    NoSuchRevision(Revision),

    #[error("sqlite: {0}")]
    Sqlite(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        StoreError::Sqlite(error.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

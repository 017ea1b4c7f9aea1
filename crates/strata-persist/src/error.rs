use strata_migrate::MigrateError;
use strata_model::ModelError;
use strata_space::SpaceError;
use strata_store::StoreError;

/// The semantic class of a persister failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation called in the wrong lifecycle position.
    IllegalState,
    /// Operation called with an out-of-range argument.
    IllegalArgument,
    /// The store rejected an operation, a migration failed, or a save was
    /// attempted from a non-latest revision.
    Io,
    /// The reflective model reported an inconsistency.
    Model,
}

/// Errors produced by persister operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistError {
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("i/o: {0}")]
    Io(String),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("migration: {0}")]
    Migration(#[from] MigrateError),

    #[error("model: {0}")]
    Model(#[from] ModelError),

    #[error("space: {0}")]
    Space(#[from] SpaceError),
}

impl PersistError {
    /// The semantic class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PersistError::IllegalState(_) => ErrorKind::IllegalState,
            PersistError::IllegalArgument(_) => ErrorKind::IllegalArgument,
            PersistError::Io(_) | PersistError::Store(_) | PersistError::Migration(_) => {
                ErrorKind::Io
            }
            PersistError::Model(_) | PersistError::Space(_) => ErrorKind::Model,
        }
    }
}

pub type PersistResult<T> = Result<T, PersistError>;

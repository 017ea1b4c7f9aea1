/// Errors produced by migration loading and execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MigrateError {
    #[error("migration script '{0}' not found")]
    ScriptNotFound(String),

    #[error("migration script '{name}' failed to parse: {reason}")]
    Parse { name: String, reason: String },

    #[error("migration script '{0}' has no update entry point")]
    NoUpdateEntry(String),

    #[error("migration step failed in '{script}': {reason}")]
    StepFailed { script: String, reason: String },
}

pub type MigrateResult<T> = Result<T, MigrateError>;

use strata_model::ModelError;

/// Errors produced by live-graph operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpaceError {
    #[error("model: {0}")]
    Model(#[from] ModelError),

    #[error("invalid object handle")]
    InvalidObject,

    #[error("invalid service handle")]
    InvalidService,

    #[error("port '{port}' is not a facet")]
    NotAFacet { port: String },

    #[error("port '{port}' is not a receptacle")]
    NotAReceptacle { port: String },

    #[error("field '{field}' declared {declared} cannot hold {given}")]
    FieldKindMismatch {
        field: String,
        declared: String,
        given: String,
    },

    #[error("service bound at '{port}' provides '{actual}', expected '{expected}'")]
    InterfaceMismatch {
        port: String,
        expected: String,
        actual: String,
    },
}

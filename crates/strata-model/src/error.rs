/// Errors produced by model lookups and payload (de)serialization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("unknown component type '{0}'")]
    UnknownComponent(String),

    #[error("unknown interface type '{0}'")]
    UnknownInterface(String),

    #[error("interface '{interface}' has no field '{field}'")]
    UnknownField { interface: String, field: String },

    #[error("component '{component}' has no port '{port}'")]
    UnknownPort { component: String, port: String },

    #[error("payload does not match declared kind {expected}: {actual}")]
    KindMismatch { expected: String, actual: String },

    #[error("malformed field text: {0}")]
    MalformedText(String),
}

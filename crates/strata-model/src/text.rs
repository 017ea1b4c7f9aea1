//! String serializer for scalar and value-aggregate field payloads.
//!
//! Payloads are `serde_json::Value`s rendered as canonical JSON text. Output
//! is deterministic for a given payload, so re-serializing a restored value
//! reproduces the stored bytes. Reference kinds are not payloads: their
//! stored form is produced by the persister's field encoder, and asking this
//! module to render one is a kind mismatch.

use serde_json::Value;

use crate::error::ModelError;
use crate::interface::{FieldKind, ScalarKind};

/// Render a payload as the stored string form for the given declared kind.
pub fn render(kind: &FieldKind, value: &Value) -> Result<String, ModelError> {
    check(kind, value)?;
    serde_json::to_string(value).map_err(|e| ModelError::MalformedText(e.to_string()))
}

/// Parse a stored string back into a payload of the given declared kind.
pub fn parse(kind: &FieldKind, text: &str) -> Result<Value, ModelError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ModelError::MalformedText(e.to_string()))?;
    check(kind, &value)?;
    Ok(value)
}

fn check(kind: &FieldKind, value: &Value) -> Result<(), ModelError> {
    let ok = match kind {
        FieldKind::Scalar(scalar) => check_scalar(*scalar, value),
        FieldKind::ValueStruct => value.is_object(),
        FieldKind::ScalarArray(scalar) => value
            .as_array()
            .is_some_and(|items| items.iter().all(|v| check_scalar(*scalar, v))),
        FieldKind::ValueArray => value
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_object)),
        FieldKind::Ref(_) | FieldKind::RefArray(_) => false,
    };

    if ok {
        Ok(())
    } else {
        Err(ModelError::KindMismatch {
            expected: kind.to_string(),
            actual: value.to_string(),
        })
    }
}

fn check_scalar(kind: ScalarKind, value: &Value) -> bool {
    match kind {
        ScalarKind::Bool => value.is_boolean(),
        ScalarKind::Int => value.is_i64(),
        ScalarKind::Float => value.is_number(),
        ScalarKind::Str => value.is_string(),
    }
}

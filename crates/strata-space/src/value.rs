use serde_json::Value;
use strata_model::FieldKind;

use crate::handle::ServiceHandle;

/// The runtime value of a field, tagged by its broad category.
///
/// Scalar and value-aggregate payloads are carried as `serde_json::Value`;
/// references carry live service handles that the persister resolves to
/// store ids through its identity map.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// Scalar, value-struct, or value-array payload.
    Value(Value),
    /// Single reference; `None` is the null reference.
    Ref(Option<ServiceHandle>),
    /// Reference array.
    RefVec(Vec<ServiceHandle>),
}

impl FieldValue {
    /// The default value a freshly created service holds for a field of the
    /// given declared kind.
    pub fn default_for(kind: &FieldKind) -> Self {
        match kind {
            FieldKind::Scalar(scalar) => FieldValue::Value(default_scalar(*scalar)),
            FieldKind::ValueStruct => FieldValue::Value(Value::Object(Default::default())),
            FieldKind::ScalarArray(_) | FieldKind::ValueArray => {
                FieldValue::Value(Value::Array(Vec::new()))
            }
            FieldKind::Ref(_) => FieldValue::Ref(None),
            FieldKind::RefArray(_) => FieldValue::RefVec(Vec::new()),
        }
    }

    /// Returns `true` if this value is structurally admissible for `kind`.
    /// Payload shape is checked by the serializer; this only gates the
    /// value/ref/refvec category.
    pub fn matches_kind(&self, kind: &FieldKind) -> bool {
        matches!(
            (self, kind),
            (FieldValue::Value(_), FieldKind::Scalar(_))
                | (FieldValue::Value(_), FieldKind::ValueStruct)
                | (FieldValue::Value(_), FieldKind::ScalarArray(_))
                | (FieldValue::Value(_), FieldKind::ValueArray)
                | (FieldValue::Ref(_), FieldKind::Ref(_))
                | (FieldValue::RefVec(_), FieldKind::RefArray(_))
        )
    }

    /// Short category name used in error messages.
    pub fn category(&self) -> &'static str {
        match self {
            FieldValue::Value(_) => "value",
            FieldValue::Ref(_) => "ref",
            FieldValue::RefVec(_) => "refvec",
        }
    }

    /// Convenience constructor for string payloads.
    pub fn str(text: impl Into<String>) -> Self {
        FieldValue::Value(Value::String(text.into()))
    }

    /// Convenience constructor for integer payloads.
    pub fn int(value: i64) -> Self {
        FieldValue::Value(Value::from(value))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            FieldValue::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ref_handle(&self) -> Option<Option<ServiceHandle>> {
        match self {
            FieldValue::Ref(handle) => Some(*handle),
            _ => None,
        }
    }

    pub fn as_ref_vec(&self) -> Option<&[ServiceHandle]> {
        match self {
            FieldValue::RefVec(handles) => Some(handles),
            _ => None,
        }
    }

    /// The service handles this value references, in order.
    pub fn referenced(&self) -> Vec<ServiceHandle> {
        match self {
            FieldValue::Ref(Some(handle)) => vec![*handle],
            FieldValue::RefVec(handles) => handles.clone(),
            _ => Vec::new(),
        }
    }
}

fn default_scalar(kind: strata_model::ScalarKind) -> Value {
    use strata_model::ScalarKind;
    match kind {
        ScalarKind::Bool => Value::Bool(false),
        ScalarKind::Int => Value::from(0i64),
        ScalarKind::Float => Value::from(0.0f64),
        ScalarKind::Str => Value::String(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_model::ScalarKind;

    #[test]
    fn defaults_per_kind() {
        assert_eq!(
            FieldValue::default_for(&FieldKind::Scalar(ScalarKind::Str)),
            FieldValue::Value(json!(""))
        );
        assert_eq!(
            FieldValue::default_for(&FieldKind::Ref("x.IY".into())),
            FieldValue::Ref(None)
        );
        assert_eq!(
            FieldValue::default_for(&FieldKind::RefArray("x.IY".into())),
            FieldValue::RefVec(vec![])
        );
        assert_eq!(
            FieldValue::default_for(&FieldKind::ValueStruct),
            FieldValue::Value(json!({}))
        );
    }

    #[test]
    fn category_gate() {
        let r = FieldValue::Ref(None);
        assert!(r.matches_kind(&FieldKind::Ref("a.IB".into())));
        assert!(!r.matches_kind(&FieldKind::Scalar(ScalarKind::Str)));
        assert!(!FieldValue::str("x").matches_kind(&FieldKind::RefArray("a.IB".into())));
    }

    #[test]
    fn referenced_handles() {
        let s = ServiceHandle(4);
        assert_eq!(FieldValue::Ref(Some(s)).referenced(), vec![s]);
        assert_eq!(FieldValue::Ref(None).referenced(), Vec::<ServiceHandle>::new());
        assert_eq!(
            FieldValue::RefVec(vec![ServiceHandle(1), ServiceHandle(2)]).referenced().len(),
            2
        );
        assert!(FieldValue::int(3).referenced().is_empty());
    }
}

//! Field wire format.
//!
//! Stored values are strings. A leading `#` marks a payload that must be
//! resolved through the identity map: `#<id>` for a single reference,
//! `#[<id>, ...]` for a reference array. The literal `nil` is the null
//! reference. Everything else is a scalar/value-aggregate rendering produced
//! by the model's string serializer, reversible given the declared kind.

use serde_json::Value;

use strata_model::{text, FieldKind};
use strata_space::{FieldValue, ServiceHandle};
use strata_store::StoreId;

use crate::error::{PersistError, PersistResult};
use crate::identity::IdentityMap;

/// The stored form of a null reference.
pub const NIL: &str = "nil";

/// A stored field value decoded against its declared kind. References come
/// back as store ids; the restore loader resolves them to live handles in a
/// second pass.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodedField {
    Value(Value),
    Ref(Option<StoreId>),
    RefVec(Vec<StoreId>),
}

/// Encode a service reference, as written for facet ports, receptacles and
/// accumulated ref deltas.
pub fn encode_reference(
    ids: &IdentityMap,
    target: Option<ServiceHandle>,
) -> PersistResult<String> {
    match target {
        None => Ok(NIL.to_string()),
        Some(service) => {
            let id = ids.id_of(service);
            if id == 0 {
                return Err(PersistError::IllegalState(format!(
                    "reference target {service:?} is not registered"
                )));
            }
            Ok(format!("#{id}"))
        }
    }
}

/// Encode a field value for storage, given its declared kind.
pub fn encode_field(
    ids: &IdentityMap,
    kind: &FieldKind,
    value: &FieldValue,
) -> PersistResult<String> {
    match (kind, value) {
        (FieldKind::Ref(_), FieldValue::Ref(target)) => encode_reference(ids, *target),
        (FieldKind::RefArray(_), FieldValue::RefVec(targets)) => {
            let mut resolved: Vec<StoreId> = Vec::with_capacity(targets.len());
            for target in targets {
                let id = ids.id_of(*target);
                if id == 0 {
                    return Err(PersistError::IllegalState(format!(
                        "reference target {target:?} is not registered"
                    )));
                }
                resolved.push(id);
            }
            let rendered = serde_json::to_string(&resolved)
                .map_err(|e| PersistError::Io(e.to_string()))?;
            Ok(format!("#{rendered}"))
        }
        (kind, FieldValue::Value(payload)) if !kind.is_reference() => {
            Ok(text::render(kind, payload)?)
        }
        (kind, value) => Err(PersistError::Model(strata_model::ModelError::KindMismatch {
            expected: kind.to_string(),
            actual: value.category().to_string(),
        })),
    }
}

/// Decode a stored field value against its declared kind.
pub fn decode_field(kind: &FieldKind, stored: &str) -> PersistResult<DecodedField> {
    if !kind.is_reference() {
        return Ok(DecodedField::Value(text::parse(kind, stored)?));
    }

    if stored == NIL {
        return Ok(match kind {
            FieldKind::Ref(_) => DecodedField::Ref(None),
            _ => DecodedField::RefVec(Vec::new()),
        });
    }

    let Some(payload) = stored.strip_prefix('#') else {
        return Err(PersistError::Io(format!(
            "malformed reference text '{stored}'"
        )));
    };

    match kind {
        FieldKind::Ref(_) => {
            let id: StoreId = payload
                .parse()
                .map_err(|_| PersistError::Io(format!("malformed reference id '{payload}'")))?;
            Ok(DecodedField::Ref(if id == 0 { None } else { Some(id) }))
        }
        FieldKind::RefArray(_) => {
            let ids: Vec<StoreId> = serde_json::from_str(payload)
                .map_err(|_| PersistError::Io(format!("malformed reference list '{payload}'")))?;
            Ok(DecodedField::RefVec(ids))
        }
        _ => unreachable!("non-reference kinds handled above"),
    }
}

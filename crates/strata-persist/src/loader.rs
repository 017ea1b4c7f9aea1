//! Revision replay: migration invocation and graph materialization.

use std::sync::Arc;

use tracing::{debug, warn};

use strata_migrate::ScriptLoader;
use strata_model::{DomainModel, FieldKind};
use strata_space::{FieldValue, ServiceHandle, Space, Subject, Universe};
use strata_store::{RevisionRows, StoreId};

use crate::encoder::{decode_field, DecodedField};
use crate::error::{PersistError, PersistResult};
use crate::identity::IdentityMap;

/// Run every update step the current model declares that is not yet
/// reflected in the revision's stored update list, in declared order. The
/// rows are rewritten in place; returns the number of steps that ran so the
/// caller knows whether the store needs the rewritten snapshot persisted.
pub(crate) fn run_migrations(
    model: &DomainModel,
    scripts: &dyn ScriptLoader,
    rows: &mut RevisionRows,
) -> PersistResult<usize> {
    let update_list = rows.update_list.clone();
    let stored: Vec<&str> = update_list
        .split(';')
        .filter(|step| !step.is_empty())
        .collect();

    let mut executed: Vec<&str> = Vec::new();
    for step in model.updates() {
        if stored.contains(&step.as_str()) || executed.contains(&step.as_str()) {
            continue;
        }
        let script = scripts.load(step)?;
        script.run(rows)?;
        executed.push(step.as_str());
        debug!(step = %step, revision = rows.revision, "migration step executed");
    }
    Ok(executed.len())
}

/// Materialize a revision's rows into a fresh space.
///
/// Pass one creates a bare object per object row (facet services come with
/// it) and binds every subject into the identity map through the object
/// rows' facet-port values. Pass two decodes the field rows, resolving
/// references and receptacle bindings against the now-complete map.
pub(crate) fn materialize(
    universe: &Universe,
    rows: &RevisionRows,
    ids: &mut IdentityMap,
) -> PersistResult<Arc<Space>> {
    let space = Arc::new(Space::new(universe));
    let model = Arc::clone(space.model());

    for row in &rows.objects {
        let object = space.new_object(&row.component)?;
        ids.bind(object, row.id)?;
    }

    for row in &rows.objects {
        let Some(Subject::Object(object)) = ids.subject_of(row.id) else {
            continue;
        };
        let component = model.component(&row.component)?;
        for port in component.facets() {
            let stored = rows.value_of(row.id, &port.name).ok_or_else(|| {
                PersistError::Io(format!(
                    "object {} has no row for facet port '{}'",
                    row.id, port.name
                ))
            })?;
            let decoded = decode_field(&FieldKind::Ref(port.interface.clone()), stored)?;
            let DecodedField::Ref(Some(service_id)) = decoded else {
                return Err(PersistError::Io(format!(
                    "facet port '{}' of object {} holds no service id",
                    port.name, row.id
                )));
            };
            let service = space.service_at(object, &port.name)?;
            ids.bind(service, service_id)?;
        }
    }

    for row in &rows.services {
        let Some(Subject::Service(service)) = ids.subject_of(row.id) else {
            warn!(id = row.id, interface = %row.interface, "service row unreferenced by any object; skipped");
            continue;
        };
        let interface = model.interface(&row.interface)?;
        for field in &interface.fields {
            let Some(stored) = rows.value_of(row.id, &field.name) else {
                // Absent row: the field keeps its declared default.
                continue;
            };
            let value = match decode_field(&field.kind, stored)? {
                DecodedField::Value(payload) => FieldValue::Value(payload),
                DecodedField::Ref(target) => FieldValue::Ref(
                    target.map(|id| resolve_service(ids, id)).transpose()?,
                ),
                DecodedField::RefVec(targets) => FieldValue::RefVec(
                    targets
                        .into_iter()
                        .map(|id| resolve_service(ids, id))
                        .collect::<PersistResult<Vec<_>>>()?,
                ),
            };
            space.set_field(service, &field.name, value)?;
        }
    }

    for row in &rows.objects {
        let Some(Subject::Object(object)) = ids.subject_of(row.id) else {
            continue;
        };
        let component = model.component(&row.component)?;
        for port in component.ports.iter().filter(|p| !p.is_facet()) {
            let Some(stored) = rows.value_of(row.id, &port.name) else {
                continue;
            };
            let binding = match decode_field(&FieldKind::Ref(port.interface.clone()), stored)? {
                DecodedField::Ref(Some(id)) => Some(resolve_service(ids, id)?),
                DecodedField::Ref(None) => None,
                _ => {
                    return Err(PersistError::Io(format!(
                        "receptacle '{}' of object {} holds a non-reference value",
                        port.name, row.id
                    )));
                }
            };
            space.bind_receptacle(object, &port.name, binding)?;
        }
    }

    if rows.root == 0 {
        return Err(PersistError::Io("revision has no root object".into()));
    }
    let Some(Subject::Object(root)) = ids.subject_of(rows.root) else {
        return Err(PersistError::Io(format!(
            "root id {} is not a materialized object",
            rows.root
        )));
    };
    space.set_root_object(root)?;

    debug!(
        revision = rows.revision,
        objects = rows.objects.len(),
        services = rows.services.len(),
        "revision materialized"
    );
    Ok(space)
}

fn resolve_service(ids: &IdentityMap, id: StoreId) -> PersistResult<ServiceHandle> {
    match ids.subject_of(id) {
        Some(Subject::Service(service)) => Ok(service),
        _ => Err(PersistError::Io(format!(
            "reference to unknown service id {id}"
        ))),
    }
}

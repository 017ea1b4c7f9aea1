use std::sync::Arc;

use strata_model::DomainModel;
use strata_space::{ObjectHandle, Space, Subject};
use strata_store::{FieldWrite, SpaceStore, StoreId};

use crate::encoder::{encode_field, encode_reference};
use crate::error::PersistResult;
use crate::identity::IdentityMap;

/// Depth-first serializer of a reachable object subgraph.
///
/// The walk runs in two phases. Registration assigns store ids to the whole
/// not-yet-registered closure first: an object is registered before
/// anything recurses into its fields, so back-edges and cycles resolve to an
/// already-assigned id instead of re-entering. Value emission then writes
/// one row set per newly registered subject, in registration order; every
/// reference it encodes is guaranteed to have an id by the first phase.
///
/// Ports and fields are iterated in declared order, which makes the output
/// reproducible for the same model and graph.
pub(crate) struct GraphWalker<'a> {
    space: &'a Space,
    store: &'a dyn SpaceStore,
    ids: &'a mut IdentityMap,
}

impl<'a> GraphWalker<'a> {
    pub fn new(space: &'a Space, store: &'a dyn SpaceStore, ids: &'a mut IdentityMap) -> Self {
        Self { space, store, ids }
    }

    /// Serialize the object and everything newly reachable from it.
    /// Idempotent: an already-registered object writes nothing.
    pub fn save_object(&mut self, object: ObjectHandle) -> PersistResult<StoreId> {
        let registered = self.register_closure(object)?;
        self.emit_values(&registered)?;
        Ok(self.ids.id_of(object))
    }

    /// Phase one: register the unvisited closure with a flat work stack,
    /// using the identity map as the visited set.
    fn register_closure(&mut self, root: ObjectHandle) -> PersistResult<Vec<Subject>> {
        let model: Arc<DomainModel> = Arc::clone(self.space.model());
        let mut registered = Vec::new();
        let mut stack = vec![root];

        while let Some(object) = stack.pop() {
            if self.ids.id_of(object) != 0 {
                continue;
            }
            let component_name = self.space.component_of(object)?;
            let object_id = self.store.add_object(&component_name)?;
            self.ids.bind(object, object_id)?;
            registered.push(Subject::Object(object));

            let component = model.component(&component_name)?;
            let mut children = Vec::new();
            for port in &component.ports {
                if port.is_facet() {
                    let service = self.space.service_at(object, &port.name)?;
                    let service_id = self.store.add_service(&port.interface, object_id)?;
                    self.ids.bind(service, service_id)?;
                    registered.push(Subject::Service(service));

                    let interface = model.interface(&port.interface)?;
                    for field in &interface.fields {
                        for target in self.space.field(service, &field.name)?.referenced() {
                            children.push(self.space.provider(target)?);
                        }
                    }
                } else if let Some(bound) = self.space.receptacle(object, &port.name)? {
                    children.push(self.space.provider(bound)?);
                }
            }
            // Reverse so the first declared child is visited first.
            for child in children.into_iter().rev() {
                stack.push(child);
            }
        }
        Ok(registered)
    }

    /// Phase two: emit the row set of every newly registered subject.
    fn emit_values(&mut self, registered: &[Subject]) -> PersistResult<()> {
        let model: Arc<DomainModel> = Arc::clone(self.space.model());
        for subject in registered {
            match *subject {
                Subject::Object(object) => {
                    let component = model.component(&self.space.component_of(object)?)?;
                    let mut writes = Vec::with_capacity(component.ports.len());
                    for port in &component.ports {
                        let stored = if port.is_facet() {
                            let service = self.space.service_at(object, &port.name)?;
                            encode_reference(self.ids, Some(service))?
                        } else {
                            encode_reference(self.ids, self.space.receptacle(object, &port.name)?)?
                        };
                        writes.push(FieldWrite::new(port.name.clone(), stored));
                    }
                    self.store.add_values(self.ids.id_of(object), &writes)?;
                }
                Subject::Service(service) => {
                    let interface = model.interface(&self.space.interface_of(service)?)?;
                    let mut writes = Vec::with_capacity(interface.fields.len());
                    for field in &interface.fields {
                        let value = self.space.field(service, &field.name)?;
                        writes.push(FieldWrite::new(
                            field.name.clone(),
                            encode_field(self.ids, &field.kind, &value)?,
                        ));
                    }
                    self.store.add_values(self.ids.id_of(service), &writes)?;
                }
            }
        }
        Ok(())
    }
}

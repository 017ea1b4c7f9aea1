use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::debug;

use strata_model::DomainModel;

use crate::changes::{
    ChangedConnection, ChangedRefField, ChangedRefVecField, ChangedValueField, ObjectChanges,
    ServiceChanges, SpaceChanges, SpaceObserver,
};
use crate::error::SpaceError;
use crate::handle::{ObjectHandle, ServiceHandle, Subject};
use crate::value::FieldValue;

/// Shared model context. Spaces are created against a universe and all of
/// them resolve types through its model.
pub struct Universe {
    model: Arc<DomainModel>,
}

impl Universe {
    pub fn new(model: Arc<DomainModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<DomainModel> {
        &self.model
    }
}

/// A port slot of a live object: facets own their service, receptacles hold
/// an optional binding.
#[derive(Clone, Debug)]
enum PortSlot {
    Facet(ServiceHandle),
    Receptacle(Option<ServiceHandle>),
}

#[derive(Clone, Debug)]
struct ObjectNode {
    component: String,
    /// Port slots in the component's declared order.
    ports: Vec<(String, PortSlot)>,
}

#[derive(Clone, Debug)]
struct ServiceNode {
    interface: String,
    provider: ObjectHandle,
    facet: String,
    fields: BTreeMap<String, FieldValue>,
}

#[derive(Default)]
struct SpaceState {
    objects: Vec<ObjectNode>,
    services: Vec<ServiceNode>,
    root: Option<ObjectHandle>,
    /// Clean field state per service, as of the last notification.
    baselines: BTreeMap<ServiceHandle, BTreeMap<String, FieldValue>>,
    /// Clean receptacle state per object, as of the last notification.
    connection_baselines: BTreeMap<ObjectHandle, BTreeMap<String, Option<ServiceHandle>>>,
    /// Objects reported reachable at the last notification.
    known: HashSet<ObjectHandle>,
    /// Subjects marked via `add_change`, in arrival order.
    dirty: Vec<Subject>,
}

/// The live, rooted graph of objects and services.
///
/// All methods take `&self`; the graph state lives behind an interior lock.
/// Mutations are not tracked implicitly: the application marks the subjects
/// it touched with [`Space::add_change`] and the diffs are computed against
/// per-subject baselines when [`Space::notify_changes`] runs.
pub struct Space {
    model: Arc<DomainModel>,
    state: RwLock<SpaceState>,
    observers: RwLock<Vec<Arc<dyn SpaceObserver>>>,
}

impl Space {
    /// Create an empty space in the given universe.
    pub fn new(universe: &Universe) -> Self {
        Self {
            model: Arc::clone(universe.model()),
            state: RwLock::new(SpaceState::default()),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// The model this space resolves types through.
    pub fn model(&self) -> &Arc<DomainModel> {
        &self.model
    }

    // ---- Graph construction ----

    /// Instantiate a component: the object plus one service per facet port,
    /// every field at its declared default, every receptacle unbound.
    ///
    /// The new object is floating until something reachable from the root
    /// references it; reachability is what promotes it to an added object at
    /// the next notification.
    pub fn new_object(&self, component: &str) -> Result<ObjectHandle, SpaceError> {
        let component_def = self.model.component(component)?.clone();

        let mut state = self.state.write().expect("lock poisoned");
        let object = ObjectHandle(state.objects.len() as u32);

        let mut ports = Vec::with_capacity(component_def.ports.len());
        for port in &component_def.ports {
            if port.is_facet() {
                let interface = self.model.interface(&port.interface)?;
                let fields = interface
                    .fields
                    .iter()
                    .map(|f| (f.name.clone(), FieldValue::default_for(&f.kind)))
                    .collect();
                let service = ServiceHandle(state.services.len() as u32);
                state.services.push(ServiceNode {
                    interface: port.interface.clone(),
                    provider: object,
                    facet: port.name.clone(),
                    fields,
                });
                ports.push((port.name.clone(), PortSlot::Facet(service)));
            } else {
                ports.push((port.name.clone(), PortSlot::Receptacle(None)));
            }
        }

        state.objects.push(ObjectNode {
            component: component.to_string(),
            ports,
        });
        Ok(object)
    }

    // ---- Accessors ----

    pub fn component_of(&self, object: ObjectHandle) -> Result<String, SpaceError> {
        let state = self.state.read().expect("lock poisoned");
        Ok(object_node(&state, object)?.component.clone())
    }

    /// The service provided at a facet port.
    pub fn service_at(&self, object: ObjectHandle, port: &str) -> Result<ServiceHandle, SpaceError> {
        let state = self.state.read().expect("lock poisoned");
        let node = object_node(&state, object)?;
        match port_slot(node, port)? {
            PortSlot::Facet(service) => Ok(*service),
            PortSlot::Receptacle(_) => Err(SpaceError::NotAFacet {
                port: port.to_string(),
            }),
        }
    }

    /// All facet services of an object, in declared port order.
    pub fn services_of(&self, object: ObjectHandle) -> Result<Vec<ServiceHandle>, SpaceError> {
        let state = self.state.read().expect("lock poisoned");
        let node = object_node(&state, object)?;
        Ok(node
            .ports
            .iter()
            .filter_map(|(_, slot)| match slot {
                PortSlot::Facet(service) => Some(*service),
                PortSlot::Receptacle(_) => None,
            })
            .collect())
    }

    pub fn provider(&self, service: ServiceHandle) -> Result<ObjectHandle, SpaceError> {
        let state = self.state.read().expect("lock poisoned");
        Ok(service_node(&state, service)?.provider)
    }

    pub fn interface_of(&self, service: ServiceHandle) -> Result<String, SpaceError> {
        let state = self.state.read().expect("lock poisoned");
        Ok(service_node(&state, service)?.interface.clone())
    }

    /// The facet port name a service is provided through.
    pub fn facet_of(&self, service: ServiceHandle) -> Result<String, SpaceError> {
        let state = self.state.read().expect("lock poisoned");
        Ok(service_node(&state, service)?.facet.clone())
    }

    /// The binding of a receptacle port.
    pub fn receptacle(
        &self,
        object: ObjectHandle,
        port: &str,
    ) -> Result<Option<ServiceHandle>, SpaceError> {
        let state = self.state.read().expect("lock poisoned");
        let node = object_node(&state, object)?;
        match port_slot(node, port)? {
            PortSlot::Receptacle(binding) => Ok(*binding),
            PortSlot::Facet(_) => Err(SpaceError::NotAReceptacle {
                port: port.to_string(),
            }),
        }
    }

    // ---- Mutation ----

    /// Rebind a receptacle. The bound service must provide the port's
    /// declared interface.
    pub fn bind_receptacle(
        &self,
        object: ObjectHandle,
        port: &str,
        binding: Option<ServiceHandle>,
    ) -> Result<(), SpaceError> {
        let component = self.component_of(object)?;
        let port_def = self
            .model
            .component(&component)?
            .port(port)
            .ok_or_else(|| strata_model::ModelError::UnknownPort {
                component: component.clone(),
                port: port.to_string(),
            })?
            .clone();
        if port_def.is_facet() {
            return Err(SpaceError::NotAReceptacle {
                port: port.to_string(),
            });
        }

        let mut state = self.state.write().expect("lock poisoned");
        if let Some(service) = binding {
            let actual = service_node(&state, service)?.interface.clone();
            if actual != port_def.interface {
                return Err(SpaceError::InterfaceMismatch {
                    port: port.to_string(),
                    expected: port_def.interface,
                    actual,
                });
            }
        }
        let node = object_node_mut(&mut state, object)?;
        for (name, slot) in &mut node.ports {
            if name == port {
                *slot = PortSlot::Receptacle(binding);
                return Ok(());
            }
        }
        unreachable!("port checked against the model above")
    }

    pub fn field(&self, service: ServiceHandle, name: &str) -> Result<FieldValue, SpaceError> {
        let state = self.state.read().expect("lock poisoned");
        let node = service_node(&state, service)?;
        node.fields
            .get(name)
            .cloned()
            .ok_or_else(|| {
                strata_model::ModelError::UnknownField {
                    interface: node.interface.clone(),
                    field: name.to_string(),
                }
                .into()
            })
    }

    /// Write a field. The value's category must match the declared kind and
    /// every referenced service must provide the declared target interface.
    pub fn set_field(
        &self,
        service: ServiceHandle,
        name: &str,
        value: FieldValue,
    ) -> Result<(), SpaceError> {
        let interface = self.interface_of(service)?;
        let field = self.model.field(&interface, name)?.clone();
        if !value.matches_kind(&field.kind) {
            return Err(SpaceError::FieldKindMismatch {
                field: name.to_string(),
                declared: field.kind.to_string(),
                given: value.category().to_string(),
            });
        }

        let mut state = self.state.write().expect("lock poisoned");
        if let Some(target) = field.kind.target_interface() {
            for referenced in value.referenced() {
                let actual = service_node(&state, referenced)?.interface.clone();
                if actual != target {
                    return Err(SpaceError::FieldKindMismatch {
                        field: name.to_string(),
                        declared: field.kind.to_string(),
                        given: format!("ref<{actual}>"),
                    });
                }
            }
        }
        let node = service_node_mut(&mut state, service)?;
        node.fields.insert(name.to_string(), value);
        Ok(())
    }

    // ---- Root ----

    pub fn root_object(&self) -> Option<ObjectHandle> {
        self.state.read().expect("lock poisoned").root
    }

    pub fn set_root_object(&self, object: ObjectHandle) -> Result<(), SpaceError> {
        let mut state = self.state.write().expect("lock poisoned");
        object_node(&state, object)?;
        state.root = Some(object);
        Ok(())
    }

    // ---- Change tracking ----

    /// Mark a subject as touched. Diffs are computed at the next
    /// [`Space::notify_changes`]; unmarked mutations stay pending against
    /// their baseline until their subject is marked.
    pub fn add_change(&self, subject: impl Into<Subject>) -> Result<(), SpaceError> {
        let subject = subject.into();
        let mut state = self.state.write().expect("lock poisoned");
        match subject {
            Subject::Object(object) => {
                object_node(&state, object)?;
            }
            Subject::Service(service) => {
                service_node(&state, service)?;
            }
        }
        if !state.dirty.contains(&subject) {
            state.dirty.push(subject);
        }
        Ok(())
    }

    pub fn add_observer(&self, observer: Arc<dyn SpaceObserver>) {
        self.observers.write().expect("lock poisoned").push(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn SpaceObserver>) {
        self.observers
            .write()
            .expect("lock poisoned")
            .retain(|o| !Arc::ptr_eq(o, observer));
    }

    /// Diff every marked subject against its baseline, detect objects that
    /// became reachable or unreachable from the root, publish the resulting
    /// batch to all observers, and refresh the baselines.
    pub fn notify_changes(&self) -> SpaceChanges {
        let mut changes = SpaceChanges::default();
        {
            let mut state = self.state.write().expect("lock poisoned");
            let dirty = std::mem::take(&mut state.dirty);

            let mut per_object: Vec<ObjectChanges> = Vec::new();
            let mut baseline_updates = Vec::new();
            let mut connection_updates = Vec::new();

            for subject in dirty {
                match subject {
                    Subject::Service(service) => {
                        let Some(node) = state.services.get(service.index()) else {
                            continue;
                        };
                        // No baseline means the service belongs to an object
                        // that was never reported; it will arrive as part of
                        // an added object instead.
                        let Some(baseline) = state.baselines.get(&service) else {
                            continue;
                        };
                        let delta = diff_service(service, node, baseline);
                        if !delta.is_empty() {
                            baseline_updates.push((service, node.fields.clone()));
                            entry_for(&mut per_object, node.provider)
                                .changed_services
                                .push(delta);
                        }
                    }
                    Subject::Object(object) => {
                        let Some(node) = state.objects.get(object.index()) else {
                            continue;
                        };
                        let Some(baseline) = state.connection_baselines.get(&object) else {
                            continue;
                        };
                        let current = receptacle_map(node);
                        let rebinds = diff_connections(baseline, &current);
                        if !rebinds.is_empty() {
                            connection_updates.push((object, current));
                            entry_for(&mut per_object, object)
                                .changed_connections
                                .extend(rebinds);
                        }
                    }
                }
            }

            for (service, fields) in baseline_updates {
                state.baselines.insert(service, fields);
            }
            for (object, map) in connection_updates {
                state.connection_baselines.insert(object, map);
            }

            let reachable = self.reachable(&state);
            let reachable_set: HashSet<ObjectHandle> = reachable.iter().copied().collect();
            let added: Vec<ObjectHandle> = reachable
                .iter()
                .copied()
                .filter(|o| !state.known.contains(o))
                .collect();
            let mut removed: Vec<ObjectHandle> = state
                .known
                .difference(&reachable_set)
                .copied()
                .collect();
            removed.sort();

            let mut fresh_baselines = Vec::new();
            let mut fresh_connections = Vec::new();
            for object in &added {
                let node = &state.objects[object.index()];
                fresh_connections.push((*object, receptacle_map(node)));
                for (_, slot) in &node.ports {
                    if let PortSlot::Facet(service) = slot {
                        fresh_baselines
                            .push((*service, state.services[service.index()].fields.clone()));
                    }
                }
            }
            for (service, fields) in fresh_baselines {
                state.baselines.insert(service, fields);
            }
            for (object, map) in fresh_connections {
                state.connection_baselines.insert(object, map);
            }

            let mut dropped_services = Vec::new();
            for object in &removed {
                let node = &state.objects[object.index()];
                for (_, slot) in &node.ports {
                    if let PortSlot::Facet(service) = slot {
                        dropped_services.push(*service);
                    }
                }
            }
            for service in dropped_services {
                state.baselines.remove(&service);
            }
            for object in &removed {
                state.connection_baselines.remove(object);
            }

            state.known = reachable_set;

            changes.added_objects = added;
            changes.removed_objects = removed;
            changes.changed_objects = per_object;
        }

        if !changes.is_empty() {
            debug!(
                added = changes.added_objects.len(),
                removed = changes.removed_objects.len(),
                changed = changes.changed_objects.len(),
                "space changes notified"
            );
            let observers = self.observers.read().expect("lock poisoned").clone();
            for observer in observers {
                observer.on_space_changed(&changes);
            }
        }
        changes
    }

    /// Flat depth-first walk from the root, following facet-field references
    /// and receptacle bindings in declared order. Returns objects in
    /// traversal order.
    fn reachable(&self, state: &SpaceState) -> Vec<ObjectHandle> {
        let Some(root) = state.root else {
            return Vec::new();
        };
        let mut visited: HashSet<ObjectHandle> = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![root];

        while let Some(object) = stack.pop() {
            if !visited.insert(object) {
                continue;
            }
            order.push(object);
            let Some(node) = state.objects.get(object.index()) else {
                continue;
            };

            let mut children: Vec<ObjectHandle> = Vec::new();
            for (_, slot) in &node.ports {
                match slot {
                    PortSlot::Facet(service) => {
                        let snode = &state.services[service.index()];
                        if let Ok(interface) = self.model.interface(&snode.interface) {
                            for field in &interface.fields {
                                if let Some(value) = snode.fields.get(&field.name) {
                                    for target in value.referenced() {
                                        children.push(state.services[target.index()].provider);
                                    }
                                }
                            }
                        }
                    }
                    PortSlot::Receptacle(Some(service)) => {
                        children.push(state.services[service.index()].provider);
                    }
                    PortSlot::Receptacle(None) => {}
                }
            }
            for child in children.into_iter().rev() {
                stack.push(child);
            }
        }
        order
    }
}

fn object_node(state: &SpaceState, handle: ObjectHandle) -> Result<&ObjectNode, SpaceError> {
    state
        .objects
        .get(handle.index())
        .ok_or(SpaceError::InvalidObject)
}

fn object_node_mut(
    state: &mut SpaceState,
    handle: ObjectHandle,
) -> Result<&mut ObjectNode, SpaceError> {
    state
        .objects
        .get_mut(handle.index())
        .ok_or(SpaceError::InvalidObject)
}

fn service_node(state: &SpaceState, handle: ServiceHandle) -> Result<&ServiceNode, SpaceError> {
    state
        .services
        .get(handle.index())
        .ok_or(SpaceError::InvalidService)
}

fn service_node_mut(
    state: &mut SpaceState,
    handle: ServiceHandle,
) -> Result<&mut ServiceNode, SpaceError> {
    state
        .services
        .get_mut(handle.index())
        .ok_or(SpaceError::InvalidService)
}

fn port_slot<'a>(node: &'a ObjectNode, port: &str) -> Result<&'a PortSlot, SpaceError> {
    node.ports
        .iter()
        .find(|(name, _)| name == port)
        .map(|(_, slot)| slot)
        .ok_or_else(|| {
            strata_model::ModelError::UnknownPort {
                component: node.component.clone(),
                port: port.to_string(),
            }
            .into()
        })
}

fn receptacle_map(node: &ObjectNode) -> BTreeMap<String, Option<ServiceHandle>> {
    node.ports
        .iter()
        .filter_map(|(name, slot)| match slot {
            PortSlot::Receptacle(binding) => Some((name.clone(), *binding)),
            PortSlot::Facet(_) => None,
        })
        .collect()
}

fn diff_service(
    service: ServiceHandle,
    node: &ServiceNode,
    baseline: &BTreeMap<String, FieldValue>,
) -> ServiceChanges {
    let mut delta = ServiceChanges::new(service);
    for (name, current) in &node.fields {
        let Some(previous) = baseline.get(name) else {
            continue;
        };
        if previous == current {
            continue;
        }
        match (previous, current) {
            (FieldValue::Value(p), FieldValue::Value(c)) => {
                delta.changed_value_fields.push(ChangedValueField {
                    field: name.clone(),
                    previous: p.clone(),
                    current: c.clone(),
                });
            }
            (FieldValue::Ref(p), FieldValue::Ref(c)) => {
                delta.changed_ref_fields.push(ChangedRefField {
                    field: name.clone(),
                    previous: *p,
                    current: *c,
                });
            }
            (FieldValue::RefVec(p), FieldValue::RefVec(c)) => {
                delta.changed_refvec_fields.push(ChangedRefVecField {
                    field: name.clone(),
                    previous: p.clone(),
                    current: c.clone(),
                });
            }
            // set_field gates the category, so a mixed pair cannot occur.
            _ => {}
        }
    }
    delta
}

fn diff_connections(
    baseline: &BTreeMap<String, Option<ServiceHandle>>,
    current: &BTreeMap<String, Option<ServiceHandle>>,
) -> Vec<ChangedConnection> {
    let mut rebinds = Vec::new();
    for (port, now) in current {
        let before = baseline.get(port).copied().flatten();
        if before != *now {
            rebinds.push(ChangedConnection {
                receptacle: port.clone(),
                previous: before,
                current: *now,
            });
        }
    }
    rebinds
}

fn entry_for(per_object: &mut Vec<ObjectChanges>, object: ObjectHandle) -> &mut ObjectChanges {
    if let Some(position) = per_object.iter().position(|oc| oc.object == object) {
        &mut per_object[position]
    } else {
        per_object.push(ObjectChanges::new(object));
        per_object.last_mut().expect("just pushed")
    }
}

use serde_json::Value;

use crate::handle::{ObjectHandle, ServiceHandle};

/// A receptacle rebind on a component object.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangedConnection {
    pub receptacle: String,
    pub previous: Option<ServiceHandle>,
    pub current: Option<ServiceHandle>,
}

/// A scalar/value-aggregate field delta on a service.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangedValueField {
    pub field: String,
    pub previous: Value,
    pub current: Value,
}

/// A single-reference field delta on a service.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangedRefField {
    pub field: String,
    pub previous: Option<ServiceHandle>,
    pub current: Option<ServiceHandle>,
}

/// A reference-array field delta on a service.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangedRefVecField {
    pub field: String,
    pub previous: Vec<ServiceHandle>,
    pub current: Vec<ServiceHandle>,
}

/// All field deltas observed on one service.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceChanges {
    pub service: ServiceHandle,
    pub changed_value_fields: Vec<ChangedValueField>,
    pub changed_ref_fields: Vec<ChangedRefField>,
    pub changed_refvec_fields: Vec<ChangedRefVecField>,
}

impl ServiceChanges {
    pub fn new(service: ServiceHandle) -> Self {
        Self {
            service,
            changed_value_fields: Vec::new(),
            changed_ref_fields: Vec::new(),
            changed_refvec_fields: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed_value_fields.is_empty()
            && self.changed_ref_fields.is_empty()
            && self.changed_refvec_fields.is_empty()
    }
}

/// Connection and service deltas observed on one object.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectChanges {
    pub object: ObjectHandle,
    pub changed_connections: Vec<ChangedConnection>,
    pub changed_services: Vec<ServiceChanges>,
}

impl ObjectChanges {
    pub fn new(object: ObjectHandle) -> Self {
        Self {
            object,
            changed_connections: Vec::new(),
            changed_services: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed_connections.is_empty() && self.changed_services.is_empty()
    }
}

/// One batch of observed graph mutations, as published by
/// [`crate::Space::notify_changes`].
///
/// Added and removed objects are detected by reachability from the root:
/// an object that became reachable since the last notification is added,
/// one that stopped being reachable is removed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpaceChanges {
    pub added_objects: Vec<ObjectHandle>,
    pub removed_objects: Vec<ObjectHandle>,
    pub changed_objects: Vec<ObjectChanges>,
}

impl SpaceChanges {
    pub fn is_empty(&self) -> bool {
        self.added_objects.is_empty()
            && self.removed_objects.is_empty()
            && self.changed_objects.is_empty()
    }
}

/// Observer of a space's change notifications.
///
/// Implementations must capture the batch and return: the notification point
/// is inside the graph's mutation flow and failures cannot cross it.
pub trait SpaceObserver: Send + Sync {
    fn on_space_changed(&self, changes: &SpaceChanges);
}

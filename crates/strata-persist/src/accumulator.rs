use std::collections::{BTreeMap, HashMap, HashSet};

use strata_space::{FieldValue, ObjectHandle, Space, SpaceChanges, Subject};

use crate::error::PersistResult;

/// Key-collapsing fold over observed change batches.
///
/// One commit window's batches merge into an insertion-ordered added-object
/// list plus a `(subject, member) -> latest value` map; within the window the
/// latest write wins at member granularity. Field changes on objects that
/// are themselves pending-added are dropped: the full serialization of a new
/// object captures its latest values anyway. A removed object cancels its
/// pending addition and every change recorded against it or the services it
/// provides.
#[derive(Debug, Default)]
pub(crate) struct ChangeAccumulator {
    added: Vec<ObjectHandle>,
    added_set: HashSet<ObjectHandle>,
    changes: HashMap<Subject, BTreeMap<String, FieldValue>>,
    /// Subjects in first-recorded order, for deterministic write order.
    order: Vec<Subject>,
}

impl ChangeAccumulator {
    /// Fold one batch into the pending state.
    pub fn merge(&mut self, space: &Space, batch: &SpaceChanges) -> PersistResult<()> {
        for object in &batch.added_objects {
            if self.added_set.insert(*object) {
                self.added.push(*object);
            }
        }

        for object_changes in &batch.changed_objects {
            if self.added_set.contains(&object_changes.object) {
                continue;
            }
            for connection in &object_changes.changed_connections {
                self.record(
                    Subject::Object(object_changes.object),
                    &connection.receptacle,
                    FieldValue::Ref(connection.current),
                );
            }
            for service_changes in &object_changes.changed_services {
                let subject = Subject::Service(service_changes.service);
                for field in &service_changes.changed_value_fields {
                    self.record(subject, &field.field, FieldValue::Value(field.current.clone()));
                }
                for field in &service_changes.changed_ref_fields {
                    self.record(subject, &field.field, FieldValue::Ref(field.current));
                }
                for field in &service_changes.changed_refvec_fields {
                    self.record(subject, &field.field, FieldValue::RefVec(field.current.clone()));
                }
            }
        }

        for object in &batch.removed_objects {
            self.added_set.remove(object);
            self.added.retain(|o| o != object);
            self.erase(Subject::Object(*object));
            for service in space.services_of(*object)? {
                self.erase(Subject::Service(service));
            }
        }
        Ok(())
    }

    fn record(&mut self, subject: Subject, member: &str, value: FieldValue) {
        if !self.changes.contains_key(&subject) {
            self.order.push(subject);
        }
        self.changes
            .entry(subject)
            .or_default()
            .insert(member.to_string(), value);
    }

    fn erase(&mut self, subject: Subject) {
        self.changes.remove(&subject);
        self.order.retain(|s| *s != subject);
    }

    /// Pending added objects, in arrival order.
    pub fn added(&self) -> &[ObjectHandle] {
        &self.added
    }

    /// Pending field changes per subject, in first-recorded order.
    pub fn changed(&self) -> impl Iterator<Item = (Subject, &BTreeMap<String, FieldValue>)> {
        self.order
            .iter()
            .filter_map(|subject| self.changes.get(subject).map(|members| (*subject, members)))
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changes.is_empty()
    }

    pub fn clear(&mut self) {
        self.added.clear();
        self.added_set.clear();
        self.changes.clear();
        self.order.clear();
    }
}

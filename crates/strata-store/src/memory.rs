use std::collections::BTreeMap;
use std::sync::RwLock;

use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::rows::{FieldRow, FieldWrite, ObjectRow, Revision, RevisionRows, ServiceRow, StoreId};
use crate::traits::SpaceStore;

/// One committed (or pending) change set.
#[derive(Clone, Debug, Default)]
struct RevisionDelta {
    update_list: String,
    root: Option<StoreId>,
    objects: Vec<ObjectRow>,
    services: Vec<ServiceRow>,
    values: Vec<FieldRow>,
}

#[derive(Default)]
struct MemoryState {
    open: bool,
    next_id: StoreId,
    revisions: Vec<RevisionDelta>,
    pending: Option<RevisionDelta>,
}

/// In-memory space store for tests and embedding.
///
/// Revisions are kept as a vector of deltas; reading a revision folds every
/// delta up to it. Session exclusivity is a plain open flag: a second open
/// while one session holds the store fails.
pub struct InMemorySpaceStore {
    inner: RwLock<MemoryState>,
}

impl InMemorySpaceStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryState {
                open: false,
                next_id: 1,
                revisions: Vec::new(),
                pending: None,
            }),
        }
    }

    /// Number of committed revisions.
    pub fn revision_count(&self) -> usize {
        self.inner.read().expect("lock poisoned").revisions.len()
    }
}

impl Default for InMemorySpaceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SpaceStore for InMemorySpaceStore {
    fn open(&self) -> StoreResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        if state.open {
            return Err(StoreError::AlreadyOpen);
        }
        state.open = true;
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        state.open = false;
        state.pending = None;
        Ok(())
    }

    fn latest_revision(&self) -> StoreResult<Revision> {
        let state = self.inner.read().expect("lock poisoned");
        if !state.open {
            return Err(StoreError::NotOpen);
        }
        Ok(state.revisions.len() as Revision)
    }

    fn begin_changes(&self) -> StoreResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        if !state.open {
            return Err(StoreError::NotOpen);
        }
        if state.pending.is_some() {
            return Err(StoreError::ChangeSetInProgress);
        }
        state.pending = Some(RevisionDelta::default());
        Ok(())
    }

    fn commit_changes(&self, update_list: &str) -> StoreResult<Revision> {
        let mut state = self.inner.write().expect("lock poisoned");
        let mut delta = state.pending.take().ok_or(StoreError::NoChangeSet)?;
        delta.update_list = update_list.to_string();
        state.revisions.push(delta);
        let revision = state.revisions.len() as Revision;
        debug!(revision, "change set committed");
        Ok(revision)
    }

    fn discard_changes(&self) -> StoreResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        state.pending = None;
        Ok(())
    }

    fn add_object(&self, component: &str) -> StoreResult<StoreId> {
        let mut guard = self.inner.write().expect("lock poisoned");
        let state = &mut *guard;
        let pending = state.pending.as_mut().ok_or(StoreError::NoChangeSet)?;
        let id = state.next_id;
        pending.objects.push(ObjectRow {
            id,
            component: component.to_string(),
        });
        state.next_id += 1;
        Ok(id)
    }

    fn add_service(&self, interface: &str, provider: StoreId) -> StoreResult<StoreId> {
        let mut guard = self.inner.write().expect("lock poisoned");
        let state = &mut *guard;
        let pending = state.pending.as_mut().ok_or(StoreError::NoChangeSet)?;
        let id = state.next_id;
        pending.services.push(ServiceRow {
            id,
            interface: interface.to_string(),
            provider,
        });
        state.next_id += 1;
        Ok(id)
    }

    fn add_values(&self, subject: StoreId, values: &[FieldWrite]) -> StoreResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        let pending = state.pending.as_mut().ok_or(StoreError::NoChangeSet)?;
        for write in values {
            // Last write wins within one change set.
            if let Some(row) = pending
                .values
                .iter_mut()
                .find(|row| row.subject == subject && row.field == write.name)
            {
                row.value = write.value.clone();
            } else {
                pending.values.push(FieldRow {
                    subject,
                    field: write.name.clone(),
                    value: write.value.clone(),
                });
            }
        }
        Ok(())
    }

    fn set_root_object(&self, id: StoreId) -> StoreResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        let pending = state.pending.as_mut().ok_or(StoreError::NoChangeSet)?;
        pending.root = Some(id);
        Ok(())
    }

    fn revision_rows(&self, revision: Revision) -> StoreResult<RevisionRows> {
        let state = self.inner.read().expect("lock poisoned");
        if !state.open {
            return Err(StoreError::NotOpen);
        }
        if revision == 0 || revision as usize > state.revisions.len() {
            return Err(StoreError::NoSuchRevision(revision));
        }

        let mut objects = Vec::new();
        let mut services = Vec::new();
        let mut folded: BTreeMap<(StoreId, String), String> = BTreeMap::new();
        let mut root = 0;

        for delta in &state.revisions[..revision as usize] {
            objects.extend(delta.objects.iter().cloned());
            services.extend(delta.services.iter().cloned());
            for row in &delta.values {
                folded.insert((row.subject, row.field.clone()), row.value.clone());
            }
            if let Some(id) = delta.root {
                root = id;
            }
        }

        let values = folded
            .into_iter()
            .map(|((subject, field), value)| FieldRow {
                subject,
                field,
                value,
            })
            .collect();

        Ok(RevisionRows {
            revision,
            update_list: state.revisions[revision as usize - 1].update_list.clone(),
            root,
            objects,
            services,
            values,
        })
    }

    fn rewrite_revision(&self, rows: &RevisionRows) -> StoreResult<()> {
        let mut state = self.inner.write().expect("lock poisoned");
        if !state.open {
            return Err(StoreError::NotOpen);
        }
        let through = rows.revision as usize;
        if through == 0 || through > state.revisions.len() {
            return Err(StoreError::NoSuchRevision(rows.revision));
        }

        // Retype subjects in whatever delta registered them.
        for delta in &mut state.revisions {
            for object in &mut delta.objects {
                if let Some(after) = rows.objects.iter().find(|o| o.id == object.id) {
                    object.component.clone_from(&after.component);
                }
            }
            for service in &mut delta.services {
                if let Some(after) = rows.services.iter().find(|s| s.id == service.id) {
                    service.interface.clone_from(&after.interface);
                }
            }
        }

        // Where each (subject, field) in effect at the revision lives.
        let mut effective: BTreeMap<(StoreId, String), (usize, String)> = BTreeMap::new();
        for (index, delta) in state.revisions[..through].iter().enumerate() {
            for row in &delta.values {
                effective.insert((row.subject, row.field.clone()), (index, row.value.clone()));
            }
        }

        let mut inserts = Vec::new();
        for row in &rows.values {
            match effective.get(&(row.subject, row.field.clone())) {
                Some((index, value)) if *value != row.value => {
                    let delta = &mut state.revisions[*index];
                    if let Some(existing) = delta
                        .values
                        .iter_mut()
                        .find(|v| v.subject == row.subject && v.field == row.field)
                    {
                        existing.value.clone_from(&row.value);
                    }
                }
                Some(_) => {}
                None => inserts.push(row.clone()),
            }
        }
        state.revisions[through - 1].values.extend(inserts);

        let kept: Vec<(StoreId, String)> = rows
            .values
            .iter()
            .map(|row| (row.subject, row.field.clone()))
            .collect();
        for (key, _) in effective {
            if !kept.contains(&key) {
                for delta in &mut state.revisions[..through] {
                    delta
                        .values
                        .retain(|v| !(v.subject == key.0 && v.field == key.1));
                }
            }
        }

        debug!(revision = rows.revision, "revision rows rewritten in place");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> InMemorySpaceStore {
        let store = InMemorySpaceStore::new();
        store.open().unwrap();
        store
    }

    #[test]
    fn open_is_session_exclusive() {
        let store = InMemorySpaceStore::new();
        store.open().unwrap();
        assert_eq!(store.open().unwrap_err(), StoreError::AlreadyOpen);
        store.close().unwrap();
        store.open().unwrap();
    }

    #[test]
    fn close_is_idempotent() {
        let store = InMemorySpaceStore::new();
        store.close().unwrap();
        store.close().unwrap();
    }

    #[test]
    fn empty_store_has_revision_zero() {
        let store = open_store();
        assert_eq!(store.latest_revision().unwrap(), 0);
    }

    #[test]
    fn ids_are_dense_and_start_at_one() {
        let store = open_store();
        store.begin_changes().unwrap();
        assert_eq!(store.add_object("erm.Model").unwrap(), 1);
        assert_eq!(store.add_service("erm.IModel", 1).unwrap(), 2);
        assert_eq!(store.add_object("erm.Entity").unwrap(), 3);
    }

    #[test]
    fn writes_require_a_change_set() {
        let store = open_store();
        assert_eq!(
            store.add_object("erm.Model").unwrap_err(),
            StoreError::NoChangeSet
        );
        assert_eq!(
            store.commit_changes("").unwrap_err(),
            StoreError::NoChangeSet
        );
    }

    #[test]
    fn commit_produces_a_revision() {
        let store = open_store();
        store.begin_changes().unwrap();
        let id = store.add_object("erm.Model").unwrap();
        store.set_root_object(id).unwrap();
        assert_eq!(store.commit_changes("step;").unwrap(), 1);
        assert_eq!(store.latest_revision().unwrap(), 1);

        let rows = store.revision_rows(1).unwrap();
        assert_eq!(rows.root, id);
        assert_eq!(rows.update_list, "step;");
        assert_eq!(rows.objects.len(), 1);
    }

    #[test]
    fn discard_leaves_store_unchanged() {
        let store = open_store();
        store.begin_changes().unwrap();
        store.add_object("erm.Model").unwrap();
        store.discard_changes().unwrap();
        assert_eq!(store.latest_revision().unwrap(), 0);
    }

    #[test]
    fn values_collapse_last_write_wins() {
        let store = open_store();
        store.begin_changes().unwrap();
        let id = store.add_object("erm.Entity").unwrap();
        store
            .add_values(id, &[FieldWrite::new("name", "\"first\"")])
            .unwrap();
        store
            .add_values(id, &[FieldWrite::new("name", "\"second\"")])
            .unwrap();
        store.set_root_object(id).unwrap();
        store.commit_changes("").unwrap();

        let rows = store.revision_rows(1).unwrap();
        assert_eq!(rows.values.len(), 1);
        assert_eq!(rows.value_of(id, "name"), Some("\"second\""));
    }

    #[test]
    fn revisions_fold_and_root_carries_forward() {
        let store = open_store();
        store.begin_changes().unwrap();
        let root = store.add_object("erm.Model").unwrap();
        store
            .add_values(root, &[FieldWrite::new("name", "\"v1\"")])
            .unwrap();
        store.set_root_object(root).unwrap();
        store.commit_changes("").unwrap();

        store.begin_changes().unwrap();
        store
            .add_values(root, &[FieldWrite::new("name", "\"v2\"")])
            .unwrap();
        store.commit_changes("").unwrap();

        let at1 = store.revision_rows(1).unwrap();
        assert_eq!(at1.value_of(root, "name"), Some("\"v1\""));

        let at2 = store.revision_rows(2).unwrap();
        assert_eq!(at2.value_of(root, "name"), Some("\"v2\""));
        assert_eq!(at2.root, root);
    }

    #[test]
    fn missing_revision_is_an_error() {
        let store = open_store();
        assert_eq!(
            store.revision_rows(1).unwrap_err(),
            StoreError::NoSuchRevision(1)
        );
        assert_eq!(
            store.revision_rows(0).unwrap_err(),
            StoreError::NoSuchRevision(0)
        );
    }

    #[test]
    fn rewrite_revision_updates_rows_in_place() {
        let store = open_store();
        store.begin_changes().unwrap();
        let object = store.add_object("dom.Employee").unwrap();
        let service = store.add_service("dom.IEmployee", object).unwrap();
        store
            .add_values(
                service,
                &[
                    FieldWrite::new("salary", "4000"),
                    FieldWrite::new("role", "\"Developer\""),
                ],
            )
            .unwrap();
        store.set_root_object(object).unwrap();
        store.commit_changes("").unwrap();

        let mut rows = store.revision_rows(1).unwrap();
        rows.set_value(service, "salary", "5000");
        rows.remove_value(service, "role");
        rows.rename_interface("dom.IEmployee", "dom.IPerson");
        store.rewrite_revision(&rows).unwrap();

        let after = store.revision_rows(1).unwrap();
        assert_eq!(after.value_of(service, "salary"), Some("5000"));
        assert_eq!(after.value_of(service, "role"), None);
        assert_eq!(after.services[0].interface, "dom.IPerson");
        // Rewritten in place: still a single revision.
        assert_eq!(store.latest_revision().unwrap(), 1);
    }

    #[test]
    fn rewrite_at_an_early_revision_respects_later_overrides() {
        let store = open_store();
        store.begin_changes().unwrap();
        let object = store.add_object("dom.Employee").unwrap();
        store
            .add_values(object, &[FieldWrite::new("salary", "4000")])
            .unwrap();
        store.set_root_object(object).unwrap();
        store.commit_changes("").unwrap();

        store.begin_changes().unwrap();
        store
            .add_values(object, &[FieldWrite::new("salary", "7000")])
            .unwrap();
        store.commit_changes("").unwrap();

        let mut rows = store.revision_rows(1).unwrap();
        rows.set_value(object, "salary", "5000");
        store.rewrite_revision(&rows).unwrap();

        assert_eq!(
            store.revision_rows(1).unwrap().value_of(object, "salary"),
            Some("5000")
        );
        // The revision-2 delta still shadows the rewritten row.
        assert_eq!(
            store.revision_rows(2).unwrap().value_of(object, "salary"),
            Some("7000")
        );
    }
}

use std::sync::Arc;

use tracing::debug;

use strata_migrate::{ScriptLibrary, ScriptLoader};
use strata_space::{ObjectHandle, Space, SpaceObserver, Subject, Universe};
use strata_store::{FieldWrite, Revision, SpaceStore};

use crate::accumulator::ChangeAccumulator;
use crate::encoder::{encode_field, encode_reference};
use crate::error::{PersistError, PersistResult};
use crate::identity::IdentityMap;
use crate::loader::{materialize, run_migrations};
use crate::observer::ChangeBuffer;
use crate::walker::GraphWalker;

/// The space persister: tracks one live space against one revisioned store.
///
/// Lifecycle: wire a store and a universe, then either `initialize` a fresh
/// store from an existing graph or `restore`/`restore_revision` a graph out
/// of a non-empty one. From then on the persister observes the space; each
/// `save` folds the observed batches into one commit and advances the
/// tracked revision by exactly one.
///
/// A save that fails past its revision precondition clears the pending
/// buffers; the caller re-applies its changes and saves again. The refused
/// intermediary-revision save itself leaves both the buffers and the store
/// untouched.
pub struct SpacePersister {
    store: Option<Arc<dyn SpaceStore>>,
    universe: Option<Arc<Universe>>,
    scripts: Arc<dyn ScriptLoader>,
    space: Option<Arc<Space>>,
    buffer: Arc<ChangeBuffer>,
    ids: IdentityMap,
    accumulator: ChangeAccumulator,
    tracked_revision: Revision,
    update_list: String,
    store_open: bool,
}

impl SpacePersister {
    pub fn new() -> Self {
        Self {
            store: None,
            universe: None,
            scripts: Arc::new(ScriptLibrary::new()),
            space: None,
            buffer: Arc::new(ChangeBuffer::default()),
            ids: IdentityMap::new(),
            accumulator: ChangeAccumulator::default(),
            tracked_revision: 0,
            update_list: String::new(),
            store_open: false,
        }
    }

    // ---- Wiring ----

    pub fn wire_store(&mut self, store: Arc<dyn SpaceStore>) {
        self.store = Some(store);
    }

    pub fn wire_universe(&mut self, universe: Arc<Universe>) {
        self.update_list = universe.model().update_list();
        self.universe = Some(universe);
    }

    pub fn wire_scripts(&mut self, scripts: Arc<dyn ScriptLoader>) {
        self.scripts = scripts;
    }

    // ---- Accessors ----

    /// The tracked live space, if initialized or restored.
    pub fn space(&self) -> Option<Arc<Space>> {
        self.space.clone()
    }

    /// The revision this session is tracking; `0` before the first
    /// initialize/restore.
    pub fn tracked_revision(&self) -> Revision {
        self.tracked_revision
    }

    // ---- Operations ----

    /// Serialize the given graph into the (empty) store as revision 1, then
    /// adopt the space and start observing it.
    pub fn initialize(&mut self, space: Arc<Space>, root: ObjectHandle) -> PersistResult<()> {
        if self.space.is_some() {
            return Err(PersistError::IllegalState(
                "persister already tracks a space".into(),
            ));
        }
        let store = self.wired_store()?;
        let universe = self.wired_universe()?;
        if !Arc::ptr_eq(space.model(), universe.model()) {
            return Err(PersistError::IllegalState(
                "space does not belong to the wired universe".into(),
            ));
        }

        store.open()?;
        self.store_open = true;
        let latest = match store.latest_revision() {
            Ok(latest) => latest,
            Err(error) => {
                self.close_store(&store);
                return Err(error.into());
            }
        };
        if latest != 0 {
            self.close_store(&store);
            return Err(PersistError::Io(
                "cannot initialize a non-empty space store".into(),
            ));
        }

        if let Err(error) = self.initialize_inner(store.as_ref(), &space, root) {
            let _ = store.discard_changes();
            self.close_store(&store);
            self.ids.clear();
            return Err(error);
        }

        // Seed the space's baselines before subscribing, so the initial
        // serialization is not observed again as changes.
        space.notify_changes();
        space.add_observer(self.observer());
        self.space = Some(space);
        self.tracked_revision = 1;
        self.close_store(&store);
        debug!("space initialized at revision 1");
        Ok(())
    }

    /// Restore the latest committed revision.
    pub fn restore(&mut self) -> PersistResult<()> {
        if self.space.is_some() {
            return Err(PersistError::IllegalState(
                "persister already tracks a space".into(),
            ));
        }
        let store = self.wired_store()?;
        self.wired_universe()?;

        store.open()?;
        self.store_open = true;
        let latest = match store.latest_revision() {
            Ok(latest) => latest,
            Err(error) => {
                self.close_store(&store);
                return Err(error.into());
            }
        };
        self.close_store(&store);
        if latest == 0 {
            return Err(PersistError::IllegalArgument("empty space store".into()));
        }
        self.restore_revision(latest)
    }

    /// Restore a specific committed revision, running any migration steps
    /// the current model declares beyond the revision's stored update list.
    pub fn restore_revision(&mut self, revision: Revision) -> PersistResult<()> {
        if self.space.is_some() {
            return Err(PersistError::IllegalState(
                "persister already tracks a space".into(),
            ));
        }
        let store = self.wired_store()?;
        let universe = self.wired_universe()?;

        store.open()?;
        self.store_open = true;
        match self.restore_inner(store.as_ref(), &universe, revision) {
            Ok(space) => {
                space.notify_changes();
                space.add_observer(self.observer());
                self.space = Some(space);
                self.tracked_revision = revision;
                self.close_store(&store);
                debug!(revision, "space restored");
                Ok(())
            }
            Err(error) => {
                self.ids.clear();
                self.close_store(&store);
                Err(error)
            }
        }
    }

    /// Commit everything observed since the last commit as one new revision.
    pub fn save(&mut self) -> PersistResult<()> {
        let store = self.wired_store()?;
        let space = self.space.clone().ok_or_else(|| {
            PersistError::IllegalState("no space is being tracked".into())
        })?;

        store.open()?;
        self.store_open = true;
        let latest = match store.latest_revision() {
            Ok(latest) => latest,
            Err(error) => {
                self.close_store(&store);
                return Err(error.into());
            }
        };
        if latest != self.tracked_revision {
            self.close_store(&store);
            return Err(PersistError::Io(
                "attempt to save changes in an intermediary revision".into(),
            ));
        }

        let result = self.save_inner(store.as_ref(), &space);
        self.accumulator.clear();
        match result {
            Ok(()) => {
                self.tracked_revision += 1;
                self.close_store(&store);
                debug!(revision = self.tracked_revision, "changes saved");
                Ok(())
            }
            Err(error) => {
                let _ = store.discard_changes();
                self.close_store(&store);
                Err(error)
            }
        }
    }

    // ---- Internals ----

    fn initialize_inner(
        &mut self,
        store: &dyn SpaceStore,
        space: &Space,
        root: ObjectHandle,
    ) -> PersistResult<()> {
        space.set_root_object(root)?;
        store.begin_changes()?;
        let root_id = GraphWalker::new(space, store, &mut self.ids).save_object(root)?;
        store.set_root_object(root_id)?;
        store.commit_changes(&self.update_list)?;
        Ok(())
    }

    fn restore_inner(
        &mut self,
        store: &dyn SpaceStore,
        universe: &Universe,
        revision: Revision,
    ) -> PersistResult<Arc<Space>> {
        let latest = store.latest_revision()?;
        if latest == 0 {
            return Err(PersistError::IllegalArgument("empty space store".into()));
        }
        if revision == 0 || revision > latest {
            return Err(PersistError::IllegalArgument(format!(
                "revision {revision} outside [1, {latest}]"
            )));
        }

        let mut rows = store.revision_rows(revision)?;
        let migrated = run_migrations(universe.model(), self.scripts.as_ref(), &mut rows)?;
        if migrated > 0 {
            store.rewrite_revision(&rows)?;
        }

        self.ids.clear();
        materialize(universe, &rows, &mut self.ids)
    }

    fn save_inner(&mut self, store: &dyn SpaceStore, space: &Arc<Space>) -> PersistResult<()> {
        for batch in self.buffer.drain() {
            self.accumulator.merge(space, &batch)?;
        }

        store.begin_changes()?;

        let added = self.accumulator.added().to_vec();
        {
            let mut walker = GraphWalker::new(space, store, &mut self.ids);
            for object in &added {
                walker.save_object(*object)?;
            }
        }
        for object in &added {
            if space.root_object() == Some(*object) {
                store.set_root_object(self.ids.id_of(*object))?;
            }
        }

        let model = space.model();
        for (subject, members) in self.accumulator.changed() {
            let id = self.ids.id_of(subject);
            if id == 0 {
                return Err(PersistError::IllegalState(
                    "change recorded on an unregistered subject".into(),
                ));
            }
            let mut writes = Vec::with_capacity(members.len());
            match subject {
                Subject::Service(service) => {
                    let interface = space.interface_of(service)?;
                    for (member, value) in members {
                        let kind = &model.field(&interface, member)?.kind;
                        writes.push(FieldWrite::new(
                            member.clone(),
                            encode_field(&self.ids, kind, value)?,
                        ));
                    }
                }
                Subject::Object(_) => {
                    for (member, value) in members {
                        let target = value.as_ref_handle().ok_or_else(|| {
                            PersistError::IllegalState(
                                "connection change holds a non-reference value".into(),
                            )
                        })?;
                        writes.push(FieldWrite::new(
                            member.clone(),
                            encode_reference(&self.ids, target)?,
                        ));
                    }
                }
            }
            store.add_values(id, &writes)?;
        }

        store.commit_changes(&self.update_list)?;
        Ok(())
    }

    fn wired_store(&self) -> PersistResult<Arc<dyn SpaceStore>> {
        self.store
            .clone()
            .ok_or_else(|| PersistError::IllegalState("space store was not wired".into()))
    }

    fn wired_universe(&self) -> PersistResult<Arc<Universe>> {
        self.universe
            .clone()
            .ok_or_else(|| PersistError::IllegalState("universe was not wired".into()))
    }

    fn observer(&self) -> Arc<dyn SpaceObserver> {
        self.buffer.clone()
    }

    fn close_store(&mut self, store: &Arc<dyn SpaceStore>) {
        let _ = store.close();
        self.store_open = false;
    }
}

impl Default for SpacePersister {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SpacePersister {
    fn drop(&mut self) {
        if let Some(space) = self.space.take() {
            let observer = self.observer();
            space.remove_observer(&observer);
        }
        if self.store_open {
            if let Some(store) = &self.store {
                let _ = store.close();
            }
        }
    }
}

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::rows::{FieldRow, FieldWrite, ObjectRow, Revision, RevisionRows, ServiceRow, StoreId};
use crate::traits::SpaceStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS revisions (
    revision    INTEGER PRIMARY KEY,
    update_list TEXT NOT NULL,
    root_id     INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS subjects (
    id          INTEGER PRIMARY KEY,
    kind        TEXT NOT NULL CHECK (kind IN ('object', 'service')),
    type_name   TEXT NOT NULL,
    provider_id INTEGER NOT NULL DEFAULT 0,
    revision    INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS field_values (
    subject_id  INTEGER NOT NULL,
    field_name  TEXT NOT NULL,
    value       TEXT NOT NULL,
    revision    INTEGER NOT NULL,
    PRIMARY KEY (subject_id, field_name, revision)
);
";

#[derive(Default)]
struct PendingChanges {
    root: Option<StoreId>,
    objects: Vec<ObjectRow>,
    services: Vec<ServiceRow>,
    values: BTreeMap<(StoreId, String), String>,
}

#[derive(Default)]
struct SqliteState {
    conn: Option<Connection>,
    next_id: StoreId,
    pending: Option<PendingChanges>,
}

/// Single-file SQLite space store.
///
/// A change set is buffered in memory and flushed in one transaction on
/// commit, so a failed commit leaves the file at the previous revision.
/// Field values are stored one row per `(subject, field, revision)`; reading
/// a revision picks the newest row at or below it per `(subject, field)`.
pub struct SqliteSpaceStore {
    path: PathBuf,
    inner: Mutex<SqliteState>,
}

impl SqliteSpaceStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            inner: Mutex::new(SqliteState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn latest(conn: &Connection) -> StoreResult<Revision> {
        let revision = conn.query_row(
            "SELECT COALESCE(MAX(revision), 0) FROM revisions",
            [],
            |row| row.get::<_, Revision>(0),
        )?;
        Ok(revision)
    }
}

impl SpaceStore for SqliteSpaceStore {
    fn open(&self) -> StoreResult<()> {
        let mut state = self.inner.lock().expect("lock poisoned");
        if state.conn.is_some() {
            return Err(StoreError::AlreadyOpen);
        }
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(SCHEMA)?;
        let next_id = conn.query_row(
            "SELECT COALESCE(MAX(id), 0) + 1 FROM subjects",
            [],
            |row| row.get::<_, StoreId>(0),
        )?;
        state.next_id = next_id;
        state.conn = Some(conn);
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        let mut state = self.inner.lock().expect("lock poisoned");
        state.conn = None;
        state.pending = None;
        Ok(())
    }

    fn latest_revision(&self) -> StoreResult<Revision> {
        let state = self.inner.lock().expect("lock poisoned");
        let conn = state.conn.as_ref().ok_or(StoreError::NotOpen)?;
        Self::latest(conn)
    }

    fn begin_changes(&self) -> StoreResult<()> {
        let mut state = self.inner.lock().expect("lock poisoned");
        if state.conn.is_none() {
            return Err(StoreError::NotOpen);
        }
        if state.pending.is_some() {
            return Err(StoreError::ChangeSetInProgress);
        }
        state.pending = Some(PendingChanges::default());
        Ok(())
    }

    fn commit_changes(&self, update_list: &str) -> StoreResult<Revision> {
        let mut state = self.inner.lock().expect("lock poisoned");
        let pending = state.pending.take().ok_or(StoreError::NoChangeSet)?;
        let conn = state.conn.as_mut().ok_or(StoreError::NotOpen)?;

        let latest = Self::latest(conn)?;
        let revision = latest + 1;
        // The root carries forward unless this change set rebinds it.
        let root = match pending.root {
            Some(id) => id,
            None => conn.query_row(
                "SELECT COALESCE((SELECT root_id FROM revisions WHERE revision = ?1), 0)",
                params![latest],
                |row| row.get::<_, StoreId>(0),
            )?,
        };

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO revisions (revision, update_list, root_id) VALUES (?1, ?2, ?3)",
            params![revision, update_list, root],
        )?;
        for row in &pending.objects {
            tx.execute(
                "INSERT INTO subjects (id, kind, type_name, provider_id, revision)
                 VALUES (?1, 'object', ?2, 0, ?3)",
                params![row.id, row.component, revision],
            )?;
        }
        for row in &pending.services {
            tx.execute(
                "INSERT INTO subjects (id, kind, type_name, provider_id, revision)
                 VALUES (?1, 'service', ?2, ?3, ?4)",
                params![row.id, row.interface, row.provider, revision],
            )?;
        }
        for ((subject, field), value) in &pending.values {
            tx.execute(
                "INSERT OR REPLACE INTO field_values (subject_id, field_name, value, revision)
                 VALUES (?1, ?2, ?3, ?4)",
                params![subject, field, value, revision],
            )?;
        }
        tx.commit()?;

        debug!(revision, path = %self.path.display(), "change set committed");
        Ok(revision)
    }

    fn discard_changes(&self) -> StoreResult<()> {
        let mut state = self.inner.lock().expect("lock poisoned");
        state.pending = None;
        Ok(())
    }

    fn add_object(&self, component: &str) -> StoreResult<StoreId> {
        let mut guard = self.inner.lock().expect("lock poisoned");
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
        let mut guard = self.inner.lock().expect("lock poisoned");
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
        let mut state = self.inner.lock().expect("lock poisoned");
        let pending = state.pending.as_mut().ok_or(StoreError::NoChangeSet)?;
        for write in values {
            pending
                .values
                .insert((subject, write.name.clone()), write.value.clone());
        }
        Ok(())
    }

    fn set_root_object(&self, id: StoreId) -> StoreResult<()> {
        let mut state = self.inner.lock().expect("lock poisoned");
        let pending = state.pending.as_mut().ok_or(StoreError::NoChangeSet)?;
        pending.root = Some(id);
        Ok(())
    }

    fn revision_rows(&self, revision: Revision) -> StoreResult<RevisionRows> {
        let state = self.inner.lock().expect("lock poisoned");
        let conn = state.conn.as_ref().ok_or(StoreError::NotOpen)?;

        let latest = Self::latest(conn)?;
        if revision == 0 || revision > latest {
            return Err(StoreError::NoSuchRevision(revision));
        }

        let (update_list, root) = conn.query_row(
            "SELECT update_list, root_id FROM revisions WHERE revision = ?1",
            params![revision],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, StoreId>(1)?)),
        )?;

        let mut stmt = conn.prepare(
            "SELECT id, type_name FROM subjects
             WHERE kind = 'object' AND revision <= ?1 ORDER BY id",
        )?;
        let objects = stmt
            .query_map(params![revision], |row| {
                Ok(ObjectRow {
                    id: row.get(0)?,
                    component: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT id, type_name, provider_id FROM subjects
             WHERE kind = 'service' AND revision <= ?1 ORDER BY id",
        )?;
        let services = stmt
            .query_map(params![revision], |row| {
                Ok(ServiceRow {
                    id: row.get(0)?,
                    interface: row.get(1)?,
                    provider: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT fv.subject_id, fv.field_name, fv.value FROM field_values fv
             WHERE fv.revision = (SELECT MAX(revision) FROM field_values
                                  WHERE subject_id = fv.subject_id
                                    AND field_name = fv.field_name
                                    AND revision <= ?1)
             ORDER BY fv.subject_id, fv.field_name",
        )?;
        let values = stmt
            .query_map(params![revision], |row| {
                Ok(FieldRow {
                    subject: row.get(0)?,
                    field: row.get(1)?,
                    value: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RevisionRows {
            revision,
            update_list,
            root,
            objects,
            services,
            values,
        })
    }

    fn rewrite_revision(&self, rows: &RevisionRows) -> StoreResult<()> {
        let mut state = self.inner.lock().expect("lock poisoned");
        let conn = state.conn.as_mut().ok_or(StoreError::NotOpen)?;

        let latest = Self::latest(conn)?;
        if rows.revision == 0 || rows.revision > latest {
            return Err(StoreError::NoSuchRevision(rows.revision));
        }

        let tx = conn.transaction()?;
        for row in &rows.objects {
            tx.execute(
                "UPDATE subjects SET type_name = ?1 WHERE id = ?2",
                params![row.component, row.id],
            )?;
        }
        for row in &rows.services {
            tx.execute(
                "UPDATE subjects SET type_name = ?1 WHERE id = ?2",
                params![row.interface, row.id],
            )?;
        }

        // Overwrite the row each value is in effect from, or insert one at
        // this revision when the snapshot introduced it.
        for row in &rows.values {
            let effective: Option<(Revision, String)> = tx
                .query_row(
                    "SELECT revision, value FROM field_values
                     WHERE subject_id = ?1 AND field_name = ?2 AND revision <= ?3
                     ORDER BY revision DESC LIMIT 1",
                    params![row.subject, row.field, rows.revision],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;
            match effective {
                Some((_, value)) if value == row.value => {}
                Some((revision, _)) => {
                    tx.execute(
                        "UPDATE field_values SET value = ?1
                         WHERE subject_id = ?2 AND field_name = ?3 AND revision = ?4",
                        params![row.value, row.subject, row.field, revision],
                    )?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO field_values (subject_id, field_name, value, revision)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![row.subject, row.field, row.value, rows.revision],
                    )?;
                }
            }
        }

        // Drop (subject, field) pairs the snapshot no longer carries.
        let stored: Vec<(StoreId, String)> = {
            let mut stmt = tx.prepare(
                "SELECT DISTINCT subject_id, field_name FROM field_values WHERE revision <= ?1",
            )?;
            let pairs = stmt
                .query_map(params![rows.revision], |r| Ok((r.get(0)?, r.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            pairs
        };
        for (subject, field) in stored {
            let kept = rows
                .values
                .iter()
                .any(|row| row.subject == subject && row.field == field);
            if !kept {
                tx.execute(
                    "DELETE FROM field_values
                     WHERE subject_id = ?1 AND field_name = ?2 AND revision <= ?3",
                    params![subject, field, rows.revision],
                )?;
            }
        }
        tx.commit()?;

        debug!(revision = rows.revision, "revision rows rewritten in place");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(dir: &tempfile::TempDir) -> SqliteSpaceStore {
        SqliteSpaceStore::new(dir.path().join("space.db"))
    }

    #[test]
    fn open_is_session_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        store.open().unwrap();
        assert_eq!(store.open().unwrap_err(), StoreError::AlreadyOpen);
        store.close().unwrap();
        store.open().unwrap();
    }

    #[test]
    fn commit_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        store.open().unwrap();
        store.begin_changes().unwrap();

        let object = store.add_object("erm.Entity").unwrap();
        let service = store.add_service("erm.IEntity", object).unwrap();
        store
            .add_values(service, &[FieldWrite::new("name", "\"Entity A\"")])
            .unwrap();
        store.set_root_object(object).unwrap();
        assert_eq!(store.commit_changes("step;").unwrap(), 1);

        let rows = store.revision_rows(1).unwrap();
        assert_eq!(rows.root, object);
        assert_eq!(rows.update_list, "step;");
        assert_eq!(rows.objects, vec![ObjectRow { id: object, component: "erm.Entity".into() }]);
        assert_eq!(rows.services.len(), 1);
        assert_eq!(rows.value_of(service, "name"), Some("\"Entity A\""));
    }

    #[test]
    fn revisions_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("space.db");
        {
            let store = SqliteSpaceStore::new(&path);
            store.open().unwrap();
            store.begin_changes().unwrap();
            let id = store.add_object("erm.Model").unwrap();
            store.set_root_object(id).unwrap();
            store.commit_changes("").unwrap();
            store.close().unwrap();
        }

        let store = SqliteSpaceStore::new(&path);
        store.open().unwrap();
        assert_eq!(store.latest_revision().unwrap(), 1);
        // Id allocation resumes past the persisted ids.
        store.begin_changes().unwrap();
        assert_eq!(store.add_object("erm.Entity").unwrap(), 2);
    }

    #[test]
    fn later_revision_shadows_earlier_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        store.open().unwrap();

        store.begin_changes().unwrap();
        let id = store.add_object("erm.Entity").unwrap();
        store
            .add_values(id, &[FieldWrite::new("name", "\"v1\"")])
            .unwrap();
        store.set_root_object(id).unwrap();
        store.commit_changes("").unwrap();

        store.begin_changes().unwrap();
        store
            .add_values(id, &[FieldWrite::new("name", "\"v2\"")])
            .unwrap();
        store.commit_changes("").unwrap();

        assert_eq!(store.revision_rows(1).unwrap().value_of(id, "name"), Some("\"v1\""));
        assert_eq!(store.revision_rows(2).unwrap().value_of(id, "name"), Some("\"v2\""));
        // Root carried forward without an explicit rebind.
        assert_eq!(store.revision_rows(2).unwrap().root, id);
    }

    #[test]
    fn discard_rolls_back_the_change_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        store.open().unwrap();
        store.begin_changes().unwrap();
        store.add_object("erm.Entity").unwrap();
        store.discard_changes().unwrap();
        assert_eq!(store.latest_revision().unwrap(), 0);
    }

    #[test]
    fn missing_revision_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        store.open().unwrap();
        assert_eq!(
            store.revision_rows(3).unwrap_err(),
            StoreError::NoSuchRevision(3)
        );
    }

    #[test]
    fn rewrite_revision_updates_rows_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        store.open().unwrap();
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
        assert_eq!(store.latest_revision().unwrap(), 1);
    }
}

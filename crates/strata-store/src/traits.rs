use crate::error::StoreResult;
use crate::rows::{FieldWrite, Revision, RevisionRows, StoreId};

/// The revisioned store a space persister writes to and restores from.
///
/// All implementations must satisfy these invariants:
/// - The store is single-writer and session-exclusive: `open` fails while
///   another session holds the store open.
/// - A commit is atomic: it either produces exactly one new revision or
///   leaves the store at the previous one.
/// - Ids are positive and never reused for a different subject; `0` is
///   reserved as the null reference encoding.
/// - Repeated writes to the same `(subject, field)` within one change set
///   collapse to the last value.
/// - Committed revisions are immutable; `revision_rows` is a pure read.
pub trait SpaceStore: Send + Sync {
    fn open(&self) -> StoreResult<()>;

    /// Close the store. Closing an already-closed store is a no-op.
    fn close(&self) -> StoreResult<()>;

    /// The highest committed revision, `0` for an empty store.
    fn latest_revision(&self) -> StoreResult<Revision>;

    /// Start buffering a change set.
    fn begin_changes(&self) -> StoreResult<()>;

    /// Atomically commit the buffered change set, stamping it with the given
    /// update list. Returns the new revision number.
    fn commit_changes(&self, update_list: &str) -> StoreResult<Revision>;

    /// Drop the buffered change set, leaving the store unchanged.
    fn discard_changes(&self) -> StoreResult<()>;

    /// Register an object of the given component type. Returns its id.
    fn add_object(&self, component: &str) -> StoreResult<StoreId>;

    /// Register a service of the given interface type, provided by the
    /// object with id `provider`. Returns its id.
    fn add_service(&self, interface: &str, provider: StoreId) -> StoreResult<StoreId>;

    /// Record field values of a subject on the current change set.
    fn add_values(&self, subject: StoreId, values: &[FieldWrite]) -> StoreResult<()>;

    /// Mark the root object of the graph on the current change set.
    fn set_root_object(&self, id: StoreId) -> StoreResult<()>;

    /// Read everything needed to reconstruct the graph at a revision.
    fn revision_rows(&self, revision: Revision) -> StoreResult<RevisionRows>;

    /// Persist a migrated revision snapshot, rewriting the stored rows that
    /// are in effect at `rows.revision` in place. No new revision is
    /// created; subjects are retyped by id, changed values overwrite the row
    /// they came from, and `(subject, field)` pairs absent from the snapshot
    /// are deleted up to that revision.
    fn rewrite_revision(&self, rows: &RevisionRows) -> StoreResult<()>;
}

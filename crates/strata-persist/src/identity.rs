use std::collections::HashMap;

use strata_space::Subject;
use strata_store::StoreId;

use crate::error::{PersistError, PersistResult};

/// Session-local bidirectional mapping between live subjects and store ids.
///
/// The map is injective both ways for the lifetime of a persister session:
/// a subject is bound to exactly one id and vice versa. Binding the same
/// pair again is a no-op; binding either side to a different partner fails.
#[derive(Debug, Default)]
pub struct IdentityMap {
    by_subject: HashMap<Subject, StoreId>,
    by_id: HashMap<StoreId, Subject>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id bound to a subject, or `0` if it has none.
    pub fn id_of(&self, subject: impl Into<Subject>) -> StoreId {
        self.by_subject.get(&subject.into()).copied().unwrap_or(0)
    }

    /// The subject bound to an id, if any.
    pub fn subject_of(&self, id: StoreId) -> Option<Subject> {
        self.by_id.get(&id).copied()
    }

    /// Bind a subject to a store id.
    pub fn bind(&mut self, subject: impl Into<Subject>, id: StoreId) -> PersistResult<()> {
        let subject = subject.into();
        if id == 0 {
            return Err(PersistError::IllegalState(
                "cannot bind a subject to the null id".into(),
            ));
        }
        match self.by_subject.get(&subject) {
            Some(existing) if *existing == id => return Ok(()),
            Some(existing) => {
                return Err(PersistError::IllegalState(format!(
                    "subject already bound to id {existing}, rebinding to {id} refused"
                )));
            }
            None => {}
        }
        if let Some(existing) = self.by_id.get(&id) {
            return Err(PersistError::IllegalState(format!(
                "id {id} already bound to {existing:?}"
            )));
        }
        self.by_subject.insert(subject, id);
        self.by_id.insert(id, subject);
        Ok(())
    }

    /// Drop every binding. Used when the persister switches revisions.
    pub fn clear(&mut self) {
        self.by_subject.clear();
        self.by_id.clear();
    }

    pub fn len(&self) -> usize {
        self.by_subject.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_subject.is_empty()
    }
}

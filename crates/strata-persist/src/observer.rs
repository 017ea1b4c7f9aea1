use std::sync::Mutex;

use strata_space::{SpaceChanges, SpaceObserver};

/// Captures the change batches published by the tracked space, in arrival
/// order. The persister registers one of these as its observer and drains it
/// when a save begins; the capture itself never fails across the graph
/// boundary.
#[derive(Default)]
pub(crate) struct ChangeBuffer {
    batches: Mutex<Vec<SpaceChanges>>,
}

impl ChangeBuffer {
    pub fn drain(&self) -> Vec<SpaceChanges> {
        std::mem::take(&mut *self.batches.lock().expect("lock poisoned"))
    }
}

impl SpaceObserver for ChangeBuffer {
    fn on_space_changed(&self, changes: &SpaceChanges) {
        self.batches.lock().expect("lock poisoned").push(changes.clone());
    }
}

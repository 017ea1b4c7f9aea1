//! The strata space persister.
//!
//! A [`SpacePersister`] ties one live [`strata_space::Space`] to one
//! revisioned [`strata_store::SpaceStore`]. It serializes the reachable
//! object graph into object/service/field rows, accumulates observed change
//! batches into a minimal per-subject delta per commit, and replays stored
//! revisions back into a fresh graph, running schema migrations for update
//! steps the data has not seen yet.
//!
//! # Key Types
//!
//! - [`SpacePersister`] — the lifecycle state machine
//!   (initialize / save / restore / restore_revision)
//! - [`IdentityMap`] — session-local mapping between subjects and store ids
//! - [`encoder`] — the `#id` / `#[ids]` / `nil` field wire format
//! - [`PersistError`] / [`ErrorKind`] — failure classes

mod accumulator;
pub mod encoder;
pub mod error;
pub mod identity;
mod loader;
mod observer;
pub mod persister;
mod walker;

#[cfg(test)]
pub(crate) mod testkit;

pub use error::{ErrorKind, PersistError, PersistResult};
pub use identity::IdentityMap;
pub use persister::SpacePersister;

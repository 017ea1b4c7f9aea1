//! Live object graph for strata.
//!
//! A [`Space`] is the in-memory rooted graph of component objects and their
//! interface services, described by a [`strata_model::DomainModel`]. The
//! application mutates the graph through the space's API, marks touched
//! subjects with [`Space::add_change`], and publishes one [`SpaceChanges`]
//! batch per [`Space::notify_changes`] call to every registered
//! [`SpaceObserver`].
//!
//! # Key Types
//!
//! - [`Space`] — arena of objects and services with a designated root
//! - [`Universe`] — shared model context spaces are created against
//! - [`ObjectHandle`] / [`ServiceHandle`] / [`Subject`] — arena handles
//! - [`FieldValue`] — tagged runtime value of a field
//! - [`SpaceChanges`] — one observed batch of graph mutations

pub mod changes;
pub mod error;
pub mod handle;
pub mod space;
pub mod value;

pub use changes::{
    ChangedConnection, ChangedRefField, ChangedRefVecField, ChangedValueField, ObjectChanges,
    ServiceChanges, SpaceChanges, SpaceObserver,
};
pub use error::SpaceError;
pub use handle::{ObjectHandle, ServiceHandle, Subject};
pub use space::{Space, Universe};
pub use value::FieldValue;

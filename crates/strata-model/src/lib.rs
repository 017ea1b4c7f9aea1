//! Reflective domain model for strata.
//!
//! A [`DomainModel`] describes the shape of a persistable object graph:
//! component types with ordered facet/receptacle ports, interface types with
//! ordered typed fields, and the ordered list of migration update steps the
//! model carries. Every other strata crate consumes these descriptors.
//!
//! # Key Types
//!
//! - [`DomainModel`] — named registry of component and interface definitions
//! - [`ComponentDef`] / [`PortDef`] — a component and its provided/consumed ports
//! - [`InterfaceDef`] / [`FieldDef`] — an interface and its typed fields
//! - [`FieldKind`] — the tagged kind of a field (scalar, aggregate, reference)
//! - [`text`] — the string serializer for scalar and value-aggregate payloads

pub mod component;
pub mod error;
pub mod interface;
pub mod model;
pub mod text;

pub use component::{ComponentDef, PortDef, PortKind};
pub use error::ModelError;
pub use interface::{FieldDef, FieldKind, InterfaceDef, ScalarKind};
pub use model::DomainModel;

//! Schema migrations for strata revisions.
//!
//! When a model version reads a revision written by an older one, each
//! update step missing from the revision's stored update list is executed
//! against the revision's rows before the graph is materialized. This crate
//! defines the narrow engine boundary, a [`ScriptLoader`] that yields
//! executable [`MigrationScript`]s, plus the built-in script form: a JSON
//! program whose `update` entry lists the steps to apply.
//!
//! No scripting runtime is embedded; any loader able to produce steps that
//! read and rewrite rows through [`strata_store::RevisionRows`] qualifies.

pub mod error;
pub mod loader;
pub mod script;

pub use error::{MigrateError, MigrateResult};
pub use loader::{ScriptLibrary, ScriptLoader};
pub use script::{FieldMatch, MigrationScript, MigrationStep};

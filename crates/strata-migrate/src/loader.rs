use std::collections::BTreeMap;

use crate::error::{MigrateError, MigrateResult};
use crate::script::MigrationScript;

/// Source of executable migration scripts, looked up by update-step name.
pub trait ScriptLoader: Send + Sync {
    fn load(&self, name: &str) -> MigrateResult<MigrationScript>;
}

/// In-process script registry: update-step name to JSON program source.
///
/// Sources are parsed at load time, so a registered-but-malformed source
/// surfaces as a parse failure when the step actually runs, exactly like a
/// broken script file would.
#[derive(Clone, Debug, Default)]
pub struct ScriptLibrary {
    sources: BTreeMap<String, String>,
}

impl ScriptLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a script source under an update-step name.
    pub fn with_script(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.sources.insert(name.into(), source.into());
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl ScriptLoader for ScriptLibrary {
    fn load(&self, name: &str) -> MigrateResult<MigrationScript> {
        let source = self
            .sources
            .get(name)
            .ok_or_else(|| MigrateError::ScriptNotFound(name.to_string()))?;
        MigrationScript::parse(name, source)
    }
}

use std::collections::BTreeMap;

use crate::component::ComponentDef;
use crate::error::ModelError;
use crate::interface::{FieldDef, InterfaceDef};

/// A named, versioned registry of component and interface definitions.
///
/// The model also carries the ordered list of migration update steps that
/// were declared for it. The update list is stored alongside every committed
/// revision so that a later model version knows which steps still have to
/// run when it restores older data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainModel {
    name: String,
    updates: Vec<String>,
    components: BTreeMap<String, ComponentDef>,
    interfaces: BTreeMap<String, InterfaceDef>,
}

impl DomainModel {
    /// Create an empty model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            updates: Vec::new(),
            components: BTreeMap::new(),
            interfaces: BTreeMap::new(),
        }
    }

    /// The model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a migration update step. Steps run in declaration order.
    pub fn with_update(mut self, step: impl Into<String>) -> Self {
        self.updates.push(step.into());
        self
    }

    /// Register a component definition.
    pub fn with_component(mut self, component: ComponentDef) -> Self {
        self.components.insert(component.name.clone(), component);
        self
    }

    /// Register an interface definition.
    pub fn with_interface(mut self, interface: InterfaceDef) -> Self {
        self.interfaces.insert(interface.name.clone(), interface);
        self
    }

    /// The declared update steps, in order.
    pub fn updates(&self) -> &[String] {
        &self.updates
    }

    /// The update list stored verbatim alongside each revision: every
    /// distinct step once, in declared order, semicolon-terminated.
    pub fn update_list(&self) -> String {
        let mut list = String::new();
        let mut seen: Vec<&str> = Vec::new();
        for step in &self.updates {
            if seen.contains(&step.as_str()) {
                continue;
            }
            seen.push(step.as_str());
            list.push_str(step);
            list.push(';');
        }
        list
    }

    /// Look up a component by full name.
    pub fn component(&self, name: &str) -> Result<&ComponentDef, ModelError> {
        self.components
            .get(name)
            .ok_or_else(|| ModelError::UnknownComponent(name.to_string()))
    }

    /// Look up an interface by full name.
    pub fn interface(&self, name: &str) -> Result<&InterfaceDef, ModelError> {
        self.interfaces
            .get(name)
            .ok_or_else(|| ModelError::UnknownInterface(name.to_string()))
    }

    /// Look up a field on an interface.
    pub fn field(&self, interface: &str, field: &str) -> Result<&FieldDef, ModelError> {
        self.interface(interface)?
            .field(field)
            .ok_or_else(|| ModelError::UnknownField {
                interface: interface.to_string(),
                field: field.to_string(),
            })
    }
}

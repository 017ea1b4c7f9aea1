use serde::{Deserialize, Serialize};

/// Whether a port provides a service (facet) or consumes one (receptacle).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortKind {
    Facet,
    Receptacle,
}

/// A named port of a component, typed by the interface it provides or
/// consumes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDef {
    pub name: String,
    pub kind: PortKind,
    pub interface: String,
}

impl PortDef {
    pub fn is_facet(&self) -> bool {
        self.kind == PortKind::Facet
    }
}

/// A component type: an ordered list of ports.
///
/// Port order is the declared order; the graph walker serializes ports in
/// this order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDef {
    pub name: String,
    pub ports: Vec<PortDef>,
}

impl ComponentDef {
    /// Create a component with no ports.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ports: Vec::new(),
        }
    }

    /// Append a facet port.
    pub fn with_facet(mut self, name: impl Into<String>, interface: impl Into<String>) -> Self {
        self.ports.push(PortDef {
            name: name.into(),
            kind: PortKind::Facet,
            interface: interface.into(),
        });
        self
    }

    /// Append a receptacle port.
    pub fn with_receptacle(
        mut self,
        name: impl Into<String>,
        interface: impl Into<String>,
    ) -> Self {
        self.ports.push(PortDef {
            name: name.into(),
            kind: PortKind::Receptacle,
            interface: interface.into(),
        });
        self
    }

    /// Look up a port by name.
    pub fn port(&self, name: &str) -> Option<&PortDef> {
        self.ports.iter().find(|p| p.name == name)
    }

    /// The facet ports, in declared order.
    pub fn facets(&self) -> impl Iterator<Item = &PortDef> {
        self.ports.iter().filter(|p| p.is_facet())
    }
}

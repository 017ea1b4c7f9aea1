use std::fmt;

use serde::{Deserialize, Serialize};

/// The primitive payload kinds a scalar field can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    Str,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
            ScalarKind::Str => "str",
        };
        write!(f, "{name}")
    }
}

/// The declared kind of an interface field.
///
/// Reference kinds name the interface their targets must provide; the other
/// kinds describe plain value payloads handled by the [`crate::text`]
/// serializer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Scalar(ScalarKind),
    ValueStruct,
    ScalarArray(ScalarKind),
    ValueArray,
    Ref(String),
    RefArray(String),
}

impl FieldKind {
    /// Returns `true` for the two reference kinds, whose stored form must be
    /// resolved through an identity map rather than parsed as a payload.
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldKind::Ref(_) | FieldKind::RefArray(_))
    }

    /// The interface a reference kind targets, if any.
    pub fn target_interface(&self) -> Option<&str> {
        match self {
            FieldKind::Ref(interface) | FieldKind::RefArray(interface) => Some(interface),
            _ => None,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Scalar(s) => write!(f, "{s}"),
            FieldKind::ValueStruct => write!(f, "struct"),
            FieldKind::ScalarArray(s) => write!(f, "{s}[]"),
            FieldKind::ValueArray => write!(f, "struct[]"),
            FieldKind::Ref(i) => write!(f, "ref<{i}>"),
            FieldKind::RefArray(i) => write!(f, "ref<{i}>[]"),
        }
    }
}

/// A named, typed member of an interface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// An interface type: an ordered list of fields.
///
/// Field order is the declared order and is significant: encoders and the
/// graph walker iterate fields in this order so that serialized output is
/// reproducible for the same model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl InterfaceDef {
    /// Create an interface with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field, preserving declaration order.
    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDef::new(name, kind));
        self
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

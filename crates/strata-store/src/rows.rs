use serde::{Deserialize, Serialize};

/// Store-assigned identity of an object or service. `0` means absent (the
/// null reference encoding); real ids start at 1.
pub type StoreId = u32;

/// Monotonic revision number stamped by the store on each successful commit.
/// Revision `0` means "empty store".
pub type Revision = u32;

/// Registration row of an object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRow {
    pub id: StoreId,
    pub component: String,
}

/// Registration row of a service, tied to its providing object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRow {
    pub id: StoreId,
    pub interface: String,
    pub provider: StoreId,
}

/// One stored field value of a subject.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRow {
    pub subject: StoreId,
    pub field: String,
    pub value: String,
}

/// A field write handed to [`crate::SpaceStore::add_values`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldWrite {
    pub name: String,
    pub value: String,
}

impl FieldWrite {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Everything one revision holds, as read back for restore: the root id, the
/// update list stored alongside the commit, every subject registered up to
/// the revision, and the latest field value per `(subject, field)`.
///
/// Migration scripts read and rewrite these rows in place before the graph
/// is materialized; the store itself is never modified by a restore.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevisionRows {
    pub revision: Revision,
    pub update_list: String,
    pub root: StoreId,
    pub objects: Vec<ObjectRow>,
    pub services: Vec<ServiceRow>,
    pub values: Vec<FieldRow>,
}

impl RevisionRows {
    /// The stored value of a subject's field, if any.
    pub fn value_of(&self, subject: StoreId, field: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|row| row.subject == subject && row.field == field)
            .map(|row| row.value.as_str())
    }

    /// Upsert a subject's field value.
    pub fn set_value(&mut self, subject: StoreId, field: &str, value: impl Into<String>) {
        if let Some(row) = self
            .values
            .iter_mut()
            .find(|row| row.subject == subject && row.field == field)
        {
            row.value = value.into();
        } else {
            self.values.push(FieldRow {
                subject,
                field: field.to_string(),
                value: value.into(),
            });
        }
    }

    /// Drop a subject's field row. Returns `true` if one existed.
    pub fn remove_value(&mut self, subject: StoreId, field: &str) -> bool {
        let before = self.values.len();
        self.values
            .retain(|row| !(row.subject == subject && row.field == field));
        self.values.len() != before
    }

    /// Ids of all objects of the given component type.
    pub fn objects_of(&self, component: &str) -> Vec<StoreId> {
        self.objects
            .iter()
            .filter(|row| row.component == component)
            .map(|row| row.id)
            .collect()
    }

    /// Ids of all services of the given interface type.
    pub fn services_of(&self, interface: &str) -> Vec<StoreId> {
        self.services
            .iter()
            .filter(|row| row.interface == interface)
            .map(|row| row.id)
            .collect()
    }

    /// Retype every object of component `from` to `to`. Returns the number
    /// of rows touched.
    pub fn rename_component(&mut self, from: &str, to: &str) -> usize {
        let mut touched = 0;
        for row in &mut self.objects {
            if row.component == from {
                row.component = to.to_string();
                touched += 1;
            }
        }
        touched
    }

    /// Retype every service of interface `from` to `to`. Returns the number
    /// of rows touched.
    pub fn rename_interface(&mut self, from: &str, to: &str) -> usize {
        let mut touched = 0;
        for row in &mut self.services {
            if row.interface == from {
                row.interface = to.to_string();
                touched += 1;
            }
        }
        touched
    }

    /// Rename a field on every service of the given interface. Returns the
    /// number of rows touched.
    pub fn rename_field(&mut self, interface: &str, from: &str, to: &str) -> usize {
        let subjects = self.services_of(interface);
        let mut touched = 0;
        for row in &mut self.values {
            if row.field == from && subjects.contains(&row.subject) {
                row.field = to.to_string();
                touched += 1;
            }
        }
        touched
    }
}

//! Immutable views of instance contents.

use crate::types::{Key, StoredObject, TableDefinition};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Objects of one table, ordered by key.
pub type TableObjects = BTreeMap<Key, StoredObject>;

/// A point-in-time view of one table.
///
/// The object map is shared with the live table until the table is next
/// written, so taking a snapshot copies nothing.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    /// Definition of the table.
    pub definition: TableDefinition,
    /// Objects at the time of the snapshot.
    pub objects: Arc<TableObjects>,
}

impl TableSnapshot {
    /// Creates a snapshot from an owned object map.
    #[must_use]
    pub fn new(definition: TableDefinition, objects: TableObjects) -> Self {
        Self {
            definition,
            objects: Arc::new(objects),
        }
    }

    /// Creates an empty snapshot for `definition`.
    #[must_use]
    pub fn empty(definition: TableDefinition) -> Self {
        Self::new(definition, TableObjects::new())
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// A consistent view of every table of one instance.
#[derive(Debug, Clone, Default)]
pub struct InstanceSnapshot {
    /// Tables in definition order.
    pub tables: Vec<TableSnapshot>,
}

impl InstanceSnapshot {
    /// Creates a snapshot from its tables.
    #[must_use]
    pub fn new(tables: Vec<TableSnapshot>) -> Self {
        Self { tables }
    }

    /// Finds a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.iter().find(|t| t.name() == name)
    }

    /// Total number of objects across all tables.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.tables.iter().map(TableSnapshot::len).sum()
    }
}

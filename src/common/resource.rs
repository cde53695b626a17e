// Lockable resources
//
// Resources form a Database -> Table -> Page hierarchy. The lock manager only
// needs identities and the table/page relation, so pages refer to their table
// by id and tables enumerate their pages by id.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::common::types::ResourceId;

/// Granularity of a lockable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceKind {
    Database,
    Table,
    Page,
}

/// A lockable resource. Equality and hashing use the id only.
#[derive(Debug, Clone)]
pub struct Resource {
    id: ResourceId,
    kind: ResourceKind,
    /// Owning table (pages only)
    table: Option<ResourceId>,
    /// Child pages (tables only)
    pages: Vec<ResourceId>,
}

impl Resource {
    pub fn database(id: ResourceId) -> Self {
        Self {
            id,
            kind: ResourceKind::Database,
            table: None,
            pages: Vec::new(),
        }
    }

    pub fn table(id: ResourceId, pages: impl IntoIterator<Item = ResourceId>) -> Self {
        Self {
            id,
            kind: ResourceKind::Table,
            table: None,
            pages: pages.into_iter().collect(),
        }
    }

    pub fn page(id: ResourceId, table: ResourceId) -> Self {
        Self {
            id,
            kind: ResourceKind::Page,
            table: Some(table),
            pages: Vec::new(),
        }
    }

    /// Build a table together with its page resources
    pub fn table_with_pages(table_id: ResourceId, page_ids: &[ResourceId]) -> (Self, Vec<Self>) {
        let table = Self::table(table_id, page_ids.iter().copied());
        let pages = page_ids.iter().map(|&id| Self::page(id, table_id)).collect();
        (table, pages)
    }

    /// Register another page under this table. Ignored for non-tables.
    pub fn add_page(&mut self, page_id: ResourceId) {
        if self.kind == ResourceKind::Table && !self.pages.contains(&page_id) {
            self.pages.push(page_id);
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Parent table of a page, `None` for any other kind
    pub fn parent_table(&self) -> Option<ResourceId> {
        self.table
    }

    /// Child pages of a table, empty for any other kind
    pub fn child_pages(&self) -> &[ResourceId] {
        &self.pages
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ResourceKind::Database => write!(f, "database {}", self.id),
            ResourceKind::Table => write!(f, "table {}", self.id),
            ResourceKind::Page => write!(f, "page {}", self.id),
        }
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entity-kind descriptors.
//!
//! One engine implementation serves every kind of syncable record. An
//! [`EntityKind`] tells it where the records live locally, where to POST
//! them, which kind must be processed first, and which sub-records ride
//! along inside each record's payload.
//!
//! ```text
//! sales                        categories ──▶ products
//! (independent, one phase)      phase 1        phase 2
//!                                              ├── presentations (nested)
//!                                              └── inventory     (nested)
//! ```

use crate::error::{ReplicationError, Result};
use serde::{Deserialize, Serialize};

/// Sub-records stored in their own table, keyed by the owning record's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedKind {
    /// Field name the sub-records appear under in the wire payload.
    pub name: String,
    /// Local table holding the sub-records.
    pub table: String,
    /// Column referencing the owning record's id.
    pub parent_column: String,
}

impl NestedKind {
    pub fn new(name: &str, table: &str, parent_column: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            parent_column: parent_column.to_string(),
        }
    }
}

/// Descriptor for one kind of syncable record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityKind {
    /// Kind name used in logs, metrics and stats.
    pub name: String,
    /// Local table holding the records.
    pub table: String,
    /// Bulk-ingest endpoint path on the remote authority.
    pub endpoint: String,
    /// Sub-records attached to each record when transmitted.
    #[serde(default)]
    pub nested: Vec<NestedKind>,
    /// Kind that must be processed earlier in the same cycle.
    #[serde(default)]
    pub depends_on: Option<Box<EntityKind>>,
}

impl EntityKind {
    /// A kind with no predecessor and no nested sub-records.
    pub fn independent(name: &str, table: &str, endpoint: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            endpoint: endpoint.to_string(),
            nested: Vec::new(),
            depends_on: None,
        }
    }

    pub fn with_nested(mut self, nested: NestedKind) -> Self {
        self.nested.push(nested);
        self
    }

    pub fn after(mut self, predecessor: EntityKind) -> Self {
        self.depends_on = Some(Box::new(predecessor));
        self
    }

    /// Sales with embedded line items.
    pub fn sales() -> Self {
        Self::independent("sales", "sales", "/api/sync/sales")
    }

    /// Products (with presentations and inventory rows) after their categories.
    pub fn catalog() -> Self {
        Self::independent("products", "products", "/api/sync/products")
            .with_nested(NestedKind::new("presentations", "presentations", "product_id"))
            .with_nested(NestedKind::new("inventory", "inventory", "product_id"))
            .after(Self::independent("categories", "categories", "/api/sync/categories"))
    }

    /// Kinds in processing order: furthest predecessor first, `self` last.
    pub fn phases(&self) -> Vec<&EntityKind> {
        let mut chain = Vec::new();
        let mut current = Some(self);
        while let Some(kind) = current {
            chain.push(kind);
            current = kind.depends_on.as_deref();
        }
        chain.reverse();
        chain
    }

    pub fn is_dependent(&self) -> bool {
        self.depends_on.is_some()
    }

    pub fn nested_kind(&self, name: &str) -> Option<&NestedKind> {
        self.nested.iter().find(|n| n.name == name)
    }

    /// Table and column names end up in SQL text, so only plain
    /// identifiers are accepted.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for kind in self.phases() {
            if !seen.insert(kind.table.as_str()) {
                return Err(ReplicationError::Config(format!(
                    "table '{}' appears twice in the dependency chain",
                    kind.table
                )));
            }
            if kind.name.trim().is_empty() {
                return Err(ReplicationError::Config("entity kind name must not be empty".into()));
            }
            check_identifier("table", &kind.table)?;
            if !kind.endpoint.starts_with('/') {
                return Err(ReplicationError::Config(format!(
                    "endpoint for '{}' must start with '/', got '{}'",
                    kind.name, kind.endpoint
                )));
            }
            for nested in &kind.nested {
                check_identifier("nested table", &nested.table)?;
                check_identifier("parent column", &nested.parent_column)?;
                if nested.name.is_empty() || nested.name == "id" {
                    return Err(ReplicationError::Config(format!(
                        "nested kind on '{}' needs a name other than 'id'",
                        kind.name
                    )));
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn check_identifier(what: &str, ident: &str) -> Result<()> {
    let mut chars = ident.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ReplicationError::Config(format!("invalid {} name '{}'", what, ident)))
    }
}

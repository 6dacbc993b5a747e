//! Purpose: Serializable snapshot of a package's identity and table inventory.
//! Exports: `PackageSummary`, `TableSummary`.
//! Role: Shared model for CLI output and callers that persist package metadata.
//! Invariants: Fields are additive-only; optional properties serialize as null.

use serde::Serialize;

use crate::core::database::Database;
use crate::core::row::row_size;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub columns: usize,
    pub rows: usize,
    /// Bytes per row on disk; absent when a column width is unsupported.
    pub row_size: Option<usize>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PackageSummary {
    pub product_code: Option<String>,
    pub product_version: Option<String>,
    pub product_name: Option<String>,
    pub manufacturer: Option<String>,
    pub upgrade_code: Option<String>,
    pub codepage: u16,
    pub reference_width: usize,
    pub strings: usize,
    pub tables: Vec<TableSummary>,
}

impl PackageSummary {
    pub fn from_database(db: &Database) -> Self {
        let tables = db
            .table_names()
            .iter()
            .filter_map(|name| db.table(name))
            .map(|table| TableSummary {
                name: table.name().to_string(),
                columns: table.columns().len(),
                rows: table.len(),
                row_size: row_size(table.columns(), db.reference_width()).ok(),
            })
            .collect();
        Self {
            product_code: db.product_code().ok().map(str::to_string),
            product_version: db.product_version().ok().map(str::to_string),
            product_name: db.product_name().map(str::to_string),
            manufacturer: db.manufacturer().map(str::to_string),
            upgrade_code: db.upgrade_code().map(str::to_string),
            codepage: db.codepage(),
            reference_width: db.reference_width().bytes(),
            strings: db.string_pool().len(),
            tables,
        }
    }
}

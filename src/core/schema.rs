//! Purpose: Decode the `_Tables` / `_Columns` bootstrap tables into per-table schemas.
//! Exports: `Schema`, `tables_schema`, `columns_schema`, `TABLES_TABLE`, `COLUMNS_TABLE`.
//! Role: The only hardcoded layouts; every other table is described by these two.
//! Invariants: Column descriptors are ordered by ordinal within each table.
//! Invariants: Table order follows `_Tables` row order.
use std::collections::BTreeMap;

use tracing::warn;

use crate::core::column::{COL_KEY, COL_STRING, COL_VALID, ColumnDescriptor, ColumnType};
use crate::core::error::{Error, ErrorKind};
use crate::core::row::{Row, Table, Value};

pub const TABLES_TABLE: &str = "_Tables";
pub const COLUMNS_TABLE: &str = "_Columns";

pub fn tables_schema() -> Vec<ColumnDescriptor> {
    vec![ColumnDescriptor::new(
        TABLES_TABLE,
        1,
        "Name",
        ColumnType::from_bits(COL_VALID | COL_STRING | COL_KEY | 64),
    )]
}

pub fn columns_schema() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::new(
            COLUMNS_TABLE,
            1,
            "Table",
            ColumnType::from_bits(COL_VALID | COL_STRING | COL_KEY | 64),
        ),
        ColumnDescriptor::new(
            COLUMNS_TABLE,
            2,
            "Number",
            ColumnType::from_bits(COL_VALID | COL_KEY | 2),
        ),
        ColumnDescriptor::new(
            COLUMNS_TABLE,
            3,
            "Name",
            ColumnType::from_bits(COL_VALID | COL_STRING | 64),
        ),
        ColumnDescriptor::new(COLUMNS_TABLE, 4, "Type", ColumnType::from_bits(COL_VALID | 2)),
    ]
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Schema {
    tables: Vec<String>,
    columns: BTreeMap<String, Vec<ColumnDescriptor>>,
}

impl Schema {
    pub fn load(tables: &Table, columns: &Table) -> Result<Self, Error> {
        let mut names = Vec::with_capacity(tables.len());
        for row in tables.rows() {
            let name = required_str(&row, "Name", TABLES_TABLE)?;
            if !names.iter().any(|existing| existing == name) {
                names.push(name.to_string());
            }
        }

        let mut grouped: BTreeMap<String, Vec<ColumnDescriptor>> = BTreeMap::new();
        for row in columns.rows() {
            let table = required_str(&row, "Table", COLUMNS_TABLE)?;
            let ordinal = required_u16(&row, "Number")?;
            let name = required_str(&row, "Name", COLUMNS_TABLE)?;
            let bits = required_u16(&row, "Type")?;
            grouped
                .entry(table.to_string())
                .or_default()
                .push(ColumnDescriptor::new(
                    table,
                    ordinal,
                    name,
                    ColumnType::from_bits(bits),
                ));
        }
        for descriptors in grouped.values_mut() {
            descriptors.sort_by_key(|column| column.ordinal);
        }
        for table in grouped.keys() {
            if !names.contains(table) {
                warn!(table = %table, "columns reference a table missing from _Tables");
            }
        }

        Ok(Self {
            tables: names,
            columns: grouped,
        })
    }

    pub fn table_names(&self) -> &[String] {
        &self.tables
    }

    /// Columns for `table`; empty when `_Columns` has no rows for it.
    pub fn columns(&self, table: &str) -> &[ColumnDescriptor] {
        self.columns.get(table).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn required_str<'a>(row: &Row<'a>, column: &str, table: &str) -> Result<&'a str, Error> {
    row.get(column).and_then(Value::as_str).ok_or_else(|| {
        Error::new(ErrorKind::MalformedSchema)
            .with_message(format!("row {} has no text in {column}", row.index()))
            .with_table(table)
    })
}

fn required_u16(row: &Row<'_>, column: &str) -> Result<u16, Error> {
    row.get(column)
        .and_then(Value::as_int)
        .and_then(|value| u16::try_from(value).ok())
        .ok_or_else(|| {
            Error::new(ErrorKind::MalformedSchema)
                .with_message(format!(
                    "row {} has no valid value in {column}",
                    row.index()
                ))
                .with_table(COLUMNS_TABLE)
        })
}

//! Purpose: JSON serializers for CLI output envelopes.
//! Exports: `package_json`, `columns_json`, `table_json`.
//! Role: Keep output shapes consistent across subcommands.
//! Invariants: Stable key names for package, column, and table payloads.
//! Invariants: Row objects list cells by column name; binary cells render as "<binary>".

use std::path::Path;

use msiprobe::api::{ColumnDescriptor, PackageSummary, Table};
use serde_json::{Map, Value, json};

pub(crate) fn package_json(
    path: &Path,
    file_size: u64,
    sha256: &str,
    summary: &PackageSummary,
) -> Value {
    let mut map = Map::new();
    map.insert("path".to_string(), json!(path.display().to_string()));
    map.insert("file_size".to_string(), json!(file_size));
    map.insert("sha256".to_string(), json!(sha256));
    if let Ok(Value::Object(fields)) = serde_json::to_value(summary) {
        map.extend(fields);
    }
    Value::Object(map)
}

pub(crate) fn columns_json(columns: &[ColumnDescriptor]) -> Value {
    let values = columns
        .iter()
        .map(|column| {
            json!({
                "name": column.name,
                "ordinal": column.ordinal,
                "type": column.kind.bits(),
                "string": column.kind.is_string(),
                "nullable": column.kind.is_nullable(),
                "key": column.kind.is_key(),
                "width": column.kind.nominal_width(),
            })
        })
        .collect::<Vec<_>>();
    Value::Array(values)
}

pub(crate) fn table_json(table: &Table) -> Value {
    let rows = table
        .rows()
        .map(|row| {
            let mut cells = Map::new();
            for (column, value) in row.values() {
                cells.insert(column.name.clone(), json!(value));
            }
            Value::Object(cells)
        })
        .collect::<Vec<_>>();
    json!({
        "table": table.name(),
        "columns": columns_json(table.columns()),
        "rows": rows,
    })
}

#[cfg(test)]
mod tests {
    use super::{columns_json, table_json};
    use msiprobe::api::{ColumnDescriptor, ColumnType, Table};

    #[test]
    fn columns_json_exposes_flags() {
        let columns = vec![ColumnDescriptor::new("T", 1, "Key", ColumnType::from_bits(0x2d48))];
        let value = columns_json(&columns);
        assert_eq!(value[0]["name"], "Key");
        assert_eq!(value[0]["key"], true);
        assert_eq!(value[0]["string"], true);
        assert_eq!(value[0]["nullable"], false);
        assert_eq!(value[0]["width"], 72);
    }

    #[test]
    fn empty_table_has_no_rows() {
        let table = Table::empty("Registry", Vec::new());
        let value = table_json(&table);
        assert_eq!(value["table"], "Registry");
        assert_eq!(value["rows"].as_array().map(Vec::len), Some(0));
    }
}

//! Purpose: Decode one table stream into typed cells using its column schema.
//! Exports: `Value`, `Table`, `Row`, `RowRecord`, `decode_table`, `row_size`.
//! Role: Shared by the bootstrap schema loader and every discovered table.
//! Invariants: On-disk layout is column-major; cells are read columns outer, rows inner.
//! Invariants: Stream length must be an exact multiple of the row size; no partial rows.
//! Invariants: Integers are stored biased (0x8000 / 0x80000000); a raw 0 is NULL.
use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use tracing::trace;

use crate::core::column::ColumnDescriptor;
use crate::core::error::{Error, ErrorKind};
use crate::core::string_pool::{ReferenceWidth, StringPool};

const SHORT_INT_BIAS: u32 = 0x8000;
const LONG_INT_BIAS: u32 = 0x8000_0000;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    Null,
    Int(i32),
    Str(String),
    /// Placeholder for stream-valued cells; their contents are not decoded.
    Binary,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Int(value) => serializer.serialize_i32(*value),
            Value::Str(text) => serializer.serialize_str(text),
            Value::Binary => serializer.serialize_unit_variant("Value", 3, "<binary>"),
        }
    }
}

/// Row-major view of one decoded row, keyed by column name.
pub type RowRecord = BTreeMap<String, Value>;

#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<ColumnDescriptor>,
    // One buffer per column, each holding `rows` cells.
    cells: Vec<Vec<Value>>,
    rows: usize,
}

impl Table {
    pub fn empty(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        let cells = columns.iter().map(|_| Vec::new()).collect();
        Self {
            name: name.into(),
            columns,
            cells,
            rows: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Every cell of one column, in row order.
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.column_index(name).map(|idx| self.cells[idx].as_slice())
    }

    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        (index < self.rows).then_some(Row { table: self, index })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.rows).map(move |index| Row { table: self, index })
    }

    pub fn records(&self) -> Vec<RowRecord> {
        self.rows().map(|row| row.to_record()).collect()
    }

    /// First row whose `column` holds the string `value`.
    pub fn find(&self, column: &str, value: &str) -> Option<Row<'_>> {
        let idx = self.column_index(column)?;
        let index = self.cells[idx]
            .iter()
            .position(|cell| cell.as_str() == Some(value))?;
        self.row(index)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Row<'a> {
    table: &'a Table,
    index: usize,
}

impl<'a> Row<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn get(&self, column: &str) -> Option<&'a Value> {
        let idx = self.table.column_index(column)?;
        Some(&self.table.cells[idx][self.index])
    }

    /// Cells in column order.
    pub fn values(self) -> impl Iterator<Item = (&'a ColumnDescriptor, &'a Value)> {
        let index = self.index;
        self.table
            .columns
            .iter()
            .zip(self.table.cells.iter())
            .map(move |(column, cells)| (column, &cells[index]))
    }

    pub fn to_record(&self) -> RowRecord {
        self.values()
            .map(|(column, value)| (column.name.clone(), value.clone()))
            .collect()
    }
}

pub fn row_size(columns: &[ColumnDescriptor], refs: ReferenceWidth) -> Result<usize, Error> {
    let mut total = 0usize;
    for column in columns {
        total += column
            .kind
            .on_disk_width(refs)
            .map_err(|err| err.with_table(column.table.clone()))?;
    }
    Ok(total)
}

pub fn decode_table(
    name: &str,
    columns: Vec<ColumnDescriptor>,
    bytes: &[u8],
    pool: &StringPool,
) -> Result<Table, Error> {
    let refs = pool.reference_width();
    let widths = columns
        .iter()
        .map(|column| {
            column
                .kind
                .on_disk_width(refs)
                .map_err(|err| err.with_table(name))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let row_size: usize = widths.iter().sum();

    if bytes.is_empty() {
        return Ok(Table::empty(name, columns));
    }
    if row_size == 0 || bytes.len() % row_size != 0 {
        return Err(Error::new(ErrorKind::RowSizeMismatch)
            .with_message(format!(
                "table length {} is not a multiple of row size {row_size}",
                bytes.len()
            ))
            .with_table(name)
            .with_length(bytes.len() as u64));
    }
    let rows = bytes.len() / row_size;
    trace!(table = name, rows, row_size, "decoding table");

    let mut cells = Vec::with_capacity(columns.len());
    let mut offset = 0usize;
    for (column, &width) in columns.iter().zip(widths.iter()) {
        let mut buf = Vec::with_capacity(rows);
        for _ in 0..rows {
            let raw = read_uint(bytes, offset, width);
            let value = decode_cell(column, raw, width, pool)
                .map_err(|err| err.with_table(name).with_offset(offset as u64))?;
            buf.push(value);
            offset += width;
        }
        cells.push(buf);
    }

    Ok(Table {
        name: name.to_string(),
        columns,
        cells,
        rows,
    })
}

fn decode_cell(
    column: &ColumnDescriptor,
    raw: u32,
    width: usize,
    pool: &StringPool,
) -> Result<Value, Error> {
    if column.kind.is_binary() {
        return Ok(Value::Binary);
    }
    if column.kind.is_string() {
        return pool
            .get(raw)
            .map(|text| Value::Str(text.to_string()))
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidStringRef).with_message(format!(
                    "column {} references string {raw}, pool has {}",
                    column.name,
                    pool.len()
                ))
            });
    }
    if raw == 0 {
        return Ok(Value::Null);
    }
    let value = match width {
        2 => raw as i32 - SHORT_INT_BIAS as i32,
        _ => raw.wrapping_sub(LONG_INT_BIAS) as i32,
    };
    Ok(Value::Int(value))
}

fn read_uint(buf: &[u8], offset: usize, width: usize) -> u32 {
    buf[offset..offset + width]
        .iter()
        .rev()
        .fold(0u32, |acc, byte| (acc << 8) | *byte as u32)
}

#[cfg(test)]
mod tests {
    use super::{Table, Value, decode_table, row_size};
    use crate::core::column::{
        COL_KEY, COL_NULLABLE, COL_STRING, COL_VALID, ColumnDescriptor, ColumnType,
    };
    use crate::core::error::ErrorKind;
    use crate::core::options::Utf8Policy;
    use crate::core::string_pool::{ReferenceWidth, StringPool};

    fn pool(flag: u16, strings: &[&str]) -> StringPool {
        let mut index = vec![0, 0];
        index.extend_from_slice(&flag.to_le_bytes());
        let mut data = Vec::new();
        for s in strings {
            index.extend_from_slice(&(s.len() as u16).to_le_bytes());
            index.extend_from_slice(&1u16.to_le_bytes());
            data.extend_from_slice(s.as_bytes());
        }
        StringPool::parse(&index, &data, Utf8Policy::Strict).expect("pool")
    }

    fn column(ordinal: u16, name: &str, bits: u16) -> ColumnDescriptor {
        ColumnDescriptor::new("T", ordinal, name, ColumnType::from_bits(bits))
    }

    #[test]
    fn decodes_column_major_layout() {
        let strings = pool(0, &["Property", "ProductCode", "ProductVersion", "{GUID}", "1.2.3"]);
        let columns = vec![
            column(1, "Property", COL_VALID | COL_STRING | COL_KEY | 72),
            column(2, "Value", COL_VALID | COL_STRING | COL_NULLABLE | 255),
        ];
        // Column "Property" for both rows, then column "Value" for both rows.
        let bytes = [2, 0, 3, 0, 4, 0, 5, 0];
        let table = decode_table("Property", columns, &bytes, &strings).expect("decode");
        assert_eq!(table.len(), 2);
        let first = table.row(0).expect("row 0");
        assert_eq!(first.get("Property").and_then(Value::as_str), Some("ProductCode"));
        assert_eq!(first.get("Value").and_then(Value::as_str), Some("{GUID}"));
        let found = table.find("Property", "ProductVersion").expect("row");
        assert_eq!(found.index(), 1);
        assert_eq!(found.get("Value").and_then(Value::as_str), Some("1.2.3"));
    }

    #[test]
    fn integers_are_rebiased() {
        let strings = pool(0, &[]);
        let columns = vec![column(1, "Short", COL_VALID | 2)];
        let table = decode_table("T", columns, &[0x00, 0x80, 0xff, 0xff, 0x01, 0x00], &strings)
            .expect("decode");
        let cells = table.column("Short").expect("column");
        assert_eq!(cells, &[Value::Int(0), Value::Int(0x7fff), Value::Int(1 - 0x8000)]);

        let columns = vec![column(1, "Long", COL_VALID | 4)];
        let bytes = [0x05, 0x00, 0x00, 0x80, 0xff, 0xff, 0xff, 0x7f];
        let table = decode_table("T", columns, &bytes, &strings).expect("decode");
        assert_eq!(table.column("Long").expect("column"), &[Value::Int(5), Value::Int(-1)]);
    }

    #[test]
    fn raw_zero_integer_is_null() {
        let strings = pool(0, &[]);
        let columns = vec![column(1, "Attributes", COL_VALID | COL_NULLABLE | 2)];
        let table = decode_table("T", columns, &[0, 0], &strings).expect("decode");
        assert!(table.row(0).and_then(|row| row.get("Attributes")).expect("cell").is_null());
    }

    #[test]
    fn string_id_zero_is_empty_text() {
        let strings = pool(0, &["x"]);
        let columns = vec![column(1, "Name", COL_VALID | COL_STRING | COL_NULLABLE | 64)];
        let table = decode_table("T", columns, &[0, 0], &strings).expect("decode");
        assert_eq!(table.column("Name").expect("column"), &[Value::Str(String::new())]);
    }

    #[test]
    fn long_references_read_three_bytes() {
        let strings = pool(0x8000, &["a", "b"]);
        let columns = vec![
            column(1, "Name", COL_VALID | COL_STRING | 64),
            column(2, "Flag", COL_VALID | 2),
        ];
        assert_eq!(row_size(&columns, ReferenceWidth::Long).expect("size"), 5);
        let bytes = [2, 0, 0, 1, 0, 0, 0x03, 0x80, 0x04, 0x80];
        let table = decode_table("T", columns, &bytes, &strings).expect("decode");
        assert_eq!(
            table.column("Name").expect("names"),
            &[Value::Str("b".into()), Value::Str("a".into())]
        );
        assert_eq!(table.column("Flag").expect("flags"), &[Value::Int(3), Value::Int(4)]);
    }

    #[test]
    fn partial_row_is_rejected() {
        let strings = pool(0, &["a"]);
        let columns = vec![
            column(1, "Name", COL_VALID | COL_STRING | 64),
            column(2, "Flag", COL_VALID | 4),
        ];
        let err = decode_table("T", columns, &[1, 0, 0, 0, 0, 0x80, 9], &strings)
            .expect_err("mismatch");
        assert_eq!(err.kind(), ErrorKind::RowSizeMismatch);
        assert_eq!(err.table(), Some("T"));
    }

    #[test]
    fn dangling_string_reference_is_rejected() {
        let strings = pool(0, &["a"]);
        let columns = vec![column(1, "Name", COL_VALID | COL_STRING | 64)];
        let err = decode_table("T", columns, &[9, 0], &strings).expect_err("ref");
        assert_eq!(err.kind(), ErrorKind::InvalidStringRef);
    }

    #[test]
    fn binary_columns_yield_placeholder() {
        let strings = pool(0, &["icon"]);
        let columns = vec![
            column(1, "Name", COL_VALID | COL_STRING | COL_KEY | 72),
            column(2, "Data", COL_VALID | COL_STRING),
        ];
        let table = decode_table("Binary", columns, &[1, 0, 0, 0], &strings).expect("decode");
        assert_eq!(table.row(0).and_then(|row| row.get("Data")), Some(&Value::Binary));
    }

    #[test]
    fn binary_columns_stay_two_bytes_with_long_references() {
        let strings = pool(0x8000, &["icon"]);
        let columns = vec![
            column(1, "Name", COL_VALID | COL_STRING | COL_KEY | 72),
            column(2, "Data", COL_VALID | COL_STRING | COL_NULLABLE),
        ];
        assert_eq!(row_size(&columns, ReferenceWidth::Long).expect("size"), 5);
        let table = decode_table("Binary", columns, &[1, 0, 0, 0, 0], &strings).expect("decode");
        let row = table.row(0).expect("row");
        assert_eq!(row.get("Name"), Some(&Value::Str("icon".into())));
        assert_eq!(row.get("Data"), Some(&Value::Binary));
    }

    #[test]
    fn empty_stream_yields_empty_table() {
        let strings = pool(0, &[]);
        let columns = vec![column(1, "Name", COL_VALID | COL_STRING | 64)];
        let table = decode_table("T", columns.clone(), &[], &strings).expect("decode");
        assert_eq!(table, Table::empty("T", columns));
        assert!(table.records().is_empty());
    }

    #[test]
    fn records_are_keyed_by_column_name() {
        let strings = pool(0, &["k", "v"]);
        let columns = vec![
            column(1, "Key", COL_VALID | COL_STRING | 64),
            column(2, "Val", COL_VALID | COL_STRING | 64),
        ];
        let table = decode_table("T", columns, &[1, 0, 2, 0], &strings).expect("decode");
        let records = table.records();
        assert_eq!(records[0].get("Key"), Some(&Value::Str("k".into())));
        assert_eq!(records[0].get("Val"), Some(&Value::Str("v".into())));
    }
}

//! Purpose: Build small, well-formed MSI containers for tests and tooling.
//! Exports: `MsiBuilder`, `StreamNaming`.
//! Role: Fixture generator; not part of the stable API and never used when decoding.
//! Invariants: Output follows the on-disk layout the decoder reads (pooled strings,
//! biased integers, column-major tables) so fixtures exercise the real code paths.
use std::collections::{BTreeSet, HashMap};
use std::io::{Cursor, Write};

use cfb::CompoundFile;

use crate::core::column::{COL_KEY, COL_NULLABLE, COL_STRING, COL_VALID, ColumnType};
use crate::core::container::MemoryContainer;
use crate::core::database::{
    COLUMNS_STREAM, PROPERTY_TABLE, STRING_DATA_STREAM, STRING_POOL_STREAM, TABLES_STREAM,
};
use crate::core::error::{Error, ErrorKind};
use crate::core::row::Value;
use crate::core::stream_name;
use crate::core::string_pool::ReferenceWidth;

/// How a table's data stream is named inside the container.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamNaming {
    /// `$<table>`, packed.
    Prefixed,
    /// `<table>`, packed.
    Encoded,
    /// `<table>`, verbatim.
    Raw,
    /// No stream at all.
    Omitted,
}

#[derive(Clone, Debug)]
struct TableDef {
    name: String,
    columns: Vec<(String, u16)>,
    rows: Vec<Vec<Value>>,
    naming: StreamNaming,
    bytes: Option<Vec<u8>>,
}

#[derive(Clone, Debug)]
pub struct MsiBuilder {
    codepage: u16,
    long_refs: bool,
    tables: Vec<TableDef>,
    omitted: BTreeSet<String>,
}

impl Default for MsiBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MsiBuilder {
    pub fn new() -> Self {
        Self {
            codepage: 1252,
            long_refs: false,
            tables: Vec::new(),
            omitted: BTreeSet::new(),
        }
    }

    pub fn codepage(mut self, codepage: u16) -> Self {
        self.codepage = codepage;
        self
    }

    pub fn long_refs(mut self, long_refs: bool) -> Self {
        self.long_refs = long_refs;
        self
    }

    pub fn table(self, name: &str, columns: &[(&str, u16)], rows: Vec<Vec<Value>>) -> Self {
        self.table_named(name, columns, rows, StreamNaming::Prefixed)
    }

    pub fn table_named(
        mut self,
        name: &str,
        columns: &[(&str, u16)],
        rows: Vec<Vec<Value>>,
        naming: StreamNaming,
    ) -> Self {
        self.tables.push(TableDef {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|(column, bits)| (column.to_string(), *bits))
                .collect(),
            rows,
            naming,
            bytes: None,
        });
        self
    }

    /// A standard two-column `Property` table.
    pub fn property_table(self, pairs: &[(&str, &str)]) -> Self {
        let rows = pairs
            .iter()
            .map(|(name, value)| vec![Value::Str(name.to_string()), Value::Str(value.to_string())])
            .collect();
        self.table(
            PROPERTY_TABLE,
            &[
                ("Property", COL_VALID | COL_STRING | COL_KEY | 72),
                ("Value", COL_VALID | COL_STRING | COL_NULLABLE | 0xff),
            ],
            rows,
        )
    }

    /// Replace the encoded data stream of an already-declared table.
    pub fn with_table_bytes(mut self, name: &str, bytes: Vec<u8>) -> Self {
        if let Some(def) = self.tables.iter_mut().find(|def| def.name == name) {
            def.bytes = Some(bytes);
        }
        self
    }

    /// Leave out a control stream (by readable name, e.g. `$_StringData`).
    pub fn without_stream(mut self, name: &str) -> Self {
        self.omitted.insert(name.to_string());
        self
    }

    /// Streams keyed by packed name.
    pub fn build_streams(&self) -> MemoryContainer {
        let mut pool = PoolWriter::default();
        for def in &self.tables {
            pool.intern(&def.name);
        }
        for def in &self.tables {
            for (column, _) in &def.columns {
                pool.intern(&def.name);
                pool.intern(column);
            }
        }
        for def in &self.tables {
            for row in &def.rows {
                for value in row {
                    if let Value::Str(text) = value {
                        pool.intern(text);
                    }
                }
            }
        }
        let refs = if self.long_refs {
            ReferenceWidth::Long
        } else {
            ReferenceWidth::Short
        };

        let mut container = MemoryContainer::new();
        let mut put = |name: &str, bytes: Vec<u8>| {
            if !self.omitted.contains(name) {
                container.insert(stream_name::encode(name), bytes);
            }
        };

        let (index, data) = pool.finish(self.codepage, self.long_refs);
        put(STRING_POOL_STREAM, index);
        put(STRING_DATA_STREAM, data);

        let table_rows = self
            .tables
            .iter()
            .map(|def| vec![Value::Str(def.name.clone())])
            .collect::<Vec<_>>();
        let tables_bytes = encode_rows(&[COL_VALID | COL_STRING], &table_rows, &pool, refs);
        put(TABLES_STREAM, tables_bytes);

        let mut column_rows = Vec::new();
        for def in &self.tables {
            for (ordinal, (column, bits)) in def.columns.iter().enumerate() {
                column_rows.push(vec![
                    Value::Str(def.name.clone()),
                    Value::Int(ordinal as i32 + 1),
                    Value::Str(column.clone()),
                    Value::Int(*bits as i32),
                ]);
            }
        }
        let column_types = [
            COL_VALID | COL_STRING,
            COL_VALID | 2,
            COL_VALID | COL_STRING,
            COL_VALID | 2,
        ];
        put(COLUMNS_STREAM, encode_rows(&column_types, &column_rows, &pool, refs));

        for def in &self.tables {
            let bytes = match &def.bytes {
                Some(bytes) => bytes.clone(),
                None => {
                    let types = def.columns.iter().map(|(_, bits)| *bits).collect::<Vec<_>>();
                    encode_rows(&types, &def.rows, &pool, refs)
                }
            };
            let name = match def.naming {
                StreamNaming::Prefixed => stream_name::encode(&format!("${}", def.name)),
                StreamNaming::Encoded => stream_name::encode(&def.name),
                StreamNaming::Raw => def.name.clone(),
                StreamNaming::Omitted => continue,
            };
            container.insert(name, bytes);
        }
        container
    }

    /// A complete compound-file image.
    pub fn build(&self) -> Result<Vec<u8>, Error> {
        let io_err = |err: std::io::Error| {
            Error::new(ErrorKind::Io)
                .with_message("failed to write fixture container")
                .with_source(err)
        };
        let mut comp = CompoundFile::create(Cursor::new(Vec::new())).map_err(io_err)?;
        for (name, bytes) in self.build_streams().streams() {
            let mut stream = comp.create_stream(format!("/{name}")).map_err(io_err)?;
            stream.write_all(bytes).map_err(io_err)?;
        }
        comp.flush().map_err(io_err)?;
        Ok(comp.into_inner().into_inner())
    }
}

#[derive(Default)]
struct PoolWriter {
    ids: HashMap<String, u32>,
    strings: Vec<String>,
    refcounts: Vec<u16>,
}

impl PoolWriter {
    fn intern(&mut self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        if let Some(&id) = self.ids.get(text) {
            let count = &mut self.refcounts[id as usize - 1];
            *count = count.saturating_add(1);
            return id;
        }
        self.strings.push(text.to_string());
        self.refcounts.push(1);
        let id = self.strings.len() as u32;
        self.ids.insert(text.to_string(), id);
        id
    }

    fn id(&self, text: &str) -> u32 {
        self.ids.get(text).copied().unwrap_or(0)
    }

    fn finish(&self, codepage: u16, long_refs: bool) -> (Vec<u8>, Vec<u8>) {
        let mut index = Vec::with_capacity(4 + self.strings.len() * 4);
        index.extend_from_slice(&codepage.to_le_bytes());
        let flag: u16 = if long_refs { 0x8000 } else { 0 };
        index.extend_from_slice(&flag.to_le_bytes());
        let mut data = Vec::new();
        for (text, refcount) in self.strings.iter().zip(&self.refcounts) {
            let len = text.len();
            if len > u16::MAX as usize {
                index.extend_from_slice(&0u16.to_le_bytes());
                index.extend_from_slice(&((len >> 16) as u16).to_le_bytes());
            }
            index.extend_from_slice(&(len as u16).to_le_bytes());
            index.extend_from_slice(&refcount.to_le_bytes());
            data.extend_from_slice(text.as_bytes());
        }
        (index, data)
    }
}

fn encode_rows(
    types: &[u16],
    rows: &[Vec<Value>],
    pool: &PoolWriter,
    refs: ReferenceWidth,
) -> Vec<u8> {
    let mut out = Vec::new();
    for (col, &bits) in types.iter().enumerate() {
        let width = ColumnType::from_bits(bits).on_disk_width(refs).unwrap_or(2);
        for row in rows {
            let raw = match row.get(col).unwrap_or(&Value::Null) {
                Value::Null | Value::Binary => 0,
                Value::Str(text) => pool.id(text),
                Value::Int(value) if width == 2 => (*value + 0x8000) as u32,
                Value::Int(value) => (*value as u32).wrapping_add(0x8000_0000),
            };
            out.extend_from_slice(&raw.to_le_bytes()[..width]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{MsiBuilder, StreamNaming};
    use crate::core::column::{COL_STRING, COL_VALID};
    use crate::core::database::Database;
    use crate::core::row::Value;

    #[test]
    fn built_container_opens_through_cfb() {
        let bytes = MsiBuilder::new()
            .property_table(&[("ProductCode", "{A}"), ("ProductVersion", "9.9")])
            .table_named(
                "Media",
                &[("DiskId", COL_VALID | 2), ("Cabinet", COL_VALID | COL_STRING | 255)],
                vec![vec![Value::Int(1), Value::Str("data.cab".into())]],
                StreamNaming::Raw,
            )
            .build()
            .expect("build");
        let db = Database::open(&bytes).expect("open");
        assert_eq!(db.product_code().expect("code"), "{A}");
        let media = db.table("Media").expect("media");
        let row = media.row(0).expect("row");
        assert_eq!(row.get("DiskId"), Some(&Value::Int(1)));
        assert_eq!(row.get("Cabinet"), Some(&Value::Str("data.cab".into())));
    }

    #[test]
    fn oversized_strings_use_wide_entries() {
        let long = "x".repeat(70_000);
        let db = Database::open(
            &MsiBuilder::new()
                .property_table(&[("Blob", long.as_str()), ("ProductCode", "{B}")])
                .build()
                .expect("build"),
        )
        .expect("open");
        assert_eq!(db.property("Blob").map(str::len), Some(70_000));
        assert_eq!(db.product_code().expect("code"), "{B}");
    }
}

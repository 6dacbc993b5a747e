//! Purpose: Open a package database and answer typed queries over its tables.
//! Exports: `Database`, `PROPERTY_TABLE`, control stream names.
//! Role: Facade sequencing container -> string pool -> bootstrap schema -> tables.
//! Invariants: A `Database` only exists after a fully successful open; a failed
//! open yields no instance, so there is nothing to retry or reuse.
//! Invariants: All decoded state is owned and immutable after open; no locking needed.
//! Invariants: The container handle lives only for the duration of the open.
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use tracing::debug;

use crate::core::column::ColumnDescriptor;
use crate::core::container::{CfbContainer, StreamSource};
use crate::core::error::{Error, ErrorKind};
use crate::core::options::OpenOptions;
use crate::core::row::{Table, Value, decode_table};
use crate::core::schema::{COLUMNS_TABLE, Schema, TABLES_TABLE, columns_schema, tables_schema};
use crate::core::stream_name;
use crate::core::string_pool::{ReferenceWidth, StringPool};

pub const STRING_POOL_STREAM: &str = "$_StringPool";
pub const STRING_DATA_STREAM: &str = "$_StringData";
pub const TABLES_STREAM: &str = "$_Tables";
pub const COLUMNS_STREAM: &str = "$_Columns";

pub const PROPERTY_TABLE: &str = "Property";
const PROPERTY_KEY_COLUMN: &str = "Property";
const PROPERTY_VALUE_COLUMN: &str = "Value";

// Tried in order; the first stream that exists wins.
const TABLE_STREAM_CANDIDATES: [fn(&str) -> String; 3] =
    [prefixed_stream_name, encoded_stream_name, raw_stream_name];

fn prefixed_stream_name(table: &str) -> String {
    stream_name::encode(&format!("${table}"))
}

fn encoded_stream_name(table: &str) -> String {
    stream_name::encode(table)
}

fn raw_stream_name(table: &str) -> String {
    table.to_string()
}

#[derive(Clone, Debug)]
pub struct Database {
    pool: StringPool,
    schema: Schema,
    tables: BTreeMap<String, Table>,
    streams: Vec<String>,
}

impl Database {
    pub fn open(bytes: &[u8]) -> Result<Self, Error> {
        Self::open_with(bytes, &OpenOptions::default())
    }

    pub fn open_with(bytes: &[u8], options: &OpenOptions) -> Result<Self, Error> {
        let mut container = CfbContainer::open(bytes)?;
        Self::from_source(&mut container, options)
    }

    /// Map the file at `path` and decode it; the mapping is released before returning.
    pub fn open_path(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to open package")
                .with_path(path)
                .with_source(err)
        })?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to map package")
                .with_path(path)
                .with_source(err)
        })?;
        Self::open_with(&mmap, options).map_err(|err| err.with_path(path))
    }

    pub fn from_source<S: StreamSource>(
        source: &mut S,
        options: &OpenOptions,
    ) -> Result<Self, Error> {
        let limit = options.max_stream_len;
        let streams = source
            .stream_names()?
            .iter()
            .map(|name| stream_name::decode(name))
            .collect::<Vec<_>>();

        let index = read_control_stream(source, STRING_POOL_STREAM, limit)?;
        let data = read_control_stream(source, STRING_DATA_STREAM, limit)?;
        let pool = StringPool::parse(&index, &data, options.utf8)?;
        debug!(
            strings = pool.len(),
            reference_width = pool.reference_width().bytes(),
            codepage = pool.codepage(),
            "string pool loaded"
        );

        let tables_bytes = read_control_stream(source, TABLES_STREAM, limit)?;
        let columns_bytes = read_control_stream(source, COLUMNS_STREAM, limit)?;
        let tables_table = decode_table(TABLES_TABLE, tables_schema(), &tables_bytes, &pool)?;
        let columns_table = decode_table(COLUMNS_TABLE, columns_schema(), &columns_bytes, &pool)?;
        let schema = Schema::load(&tables_table, &columns_table)?;

        let mut tables = BTreeMap::new();
        for name in schema.table_names() {
            let columns = schema.columns(name).to_vec();
            let table = match read_table_stream(source, name, limit)? {
                Some(bytes) => decode_table(name, columns, &bytes, &pool)?,
                None => {
                    debug!(table = %name, "no stream under any candidate name; treating as empty");
                    Table::empty(name.as_str(), columns)
                }
            };
            tables.insert(name.clone(), table);
        }
        tables.insert(TABLES_TABLE.to_string(), tables_table);
        tables.insert(COLUMNS_TABLE.to_string(), columns_table);
        debug!(tables = schema.table_names().len(), "package database opened");

        Ok(Self {
            pool,
            schema,
            tables,
            streams,
        })
    }

    pub fn product_code(&self) -> Result<&str, Error> {
        self.required_property("ProductCode")
    }

    pub fn product_version(&self) -> Result<&str, Error> {
        self.required_property("ProductVersion")
    }

    pub fn product_name(&self) -> Option<&str> {
        self.property("ProductName")
    }

    pub fn manufacturer(&self) -> Option<&str> {
        self.property("Manufacturer")
    }

    pub fn upgrade_code(&self) -> Option<&str> {
        self.property("UpgradeCode")
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.string_value(PROPERTY_TABLE, name)
    }

    /// Look up the row of `table` whose `Property` column equals `match_value`
    /// and return its `Value` column.
    pub fn string_value(&self, table: &str, match_value: &str) -> Option<&str> {
        self.string_value_with(table, match_value, PROPERTY_VALUE_COLUMN)
    }

    pub fn string_value_with(&self, table: &str, match_value: &str, column: &str) -> Option<&str> {
        self.tables
            .get(table)?
            .find(PROPERTY_KEY_COLUMN, match_value)?
            .get(column)
            .and_then(Value::as_str)
    }

    /// Property table as (name, value) pairs in row order.
    pub fn properties(&self) -> Vec<(&str, &str)> {
        let Some(table) = self.tables.get(PROPERTY_TABLE) else {
            return Vec::new();
        };
        table
            .rows()
            .filter_map(|row| {
                let name = row.get(PROPERTY_KEY_COLUMN).and_then(Value::as_str)?;
                let value = row.get(PROPERTY_VALUE_COLUMN).and_then(Value::as_str)?;
                Some((name, value))
            })
            .collect()
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Tables listed in `_Tables`, in listing order.
    pub fn table_names(&self) -> &[String] {
        self.schema.table_names()
    }

    pub fn columns(&self, table: &str) -> &[ColumnDescriptor] {
        self.schema.columns(table)
    }

    /// Decoded names of every root-level stream in the container.
    pub fn stream_names(&self) -> &[String] {
        &self.streams
    }

    pub fn string_pool(&self) -> &StringPool {
        &self.pool
    }

    pub fn codepage(&self) -> u16 {
        self.pool.codepage()
    }

    pub fn reference_width(&self) -> ReferenceWidth {
        self.pool.reference_width()
    }

    fn required_property(&self, name: &str) -> Result<&str, Error> {
        self.property(name).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message(format!("property {name} not found"))
                .with_table(PROPERTY_TABLE)
        })
    }
}

fn read_control_stream<S: StreamSource>(
    source: &mut S,
    name: &str,
    limit: u64,
) -> Result<Vec<u8>, Error> {
    source
        .read_stream(&stream_name::encode(name), limit)?
        .ok_or_else(|| {
            Error::new(ErrorKind::StreamNotFound)
                .with_message("required control stream is missing")
                .with_stream(name)
        })
}

fn read_table_stream<S: StreamSource>(
    source: &mut S,
    table: &str,
    limit: u64,
) -> Result<Option<Vec<u8>>, Error> {
    for (attempt, candidate) in TABLE_STREAM_CANDIDATES.iter().enumerate() {
        if let Some(bytes) = source.read_stream(&candidate(table), limit)? {
            if attempt > 0 {
                debug!(table, attempt, "table stream found under fallback name");
            }
            return Ok(Some(bytes));
        }
    }
    Ok(None)
}

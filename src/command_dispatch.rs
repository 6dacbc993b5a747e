//! Purpose: Hold top-level CLI command dispatch for `msiprobe`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every command opens the package read-only and prints one JSON document.
//! Invariants: Lookups that miss map to `NotFound` so scripts can branch on exit code.

use std::fs::File;
use std::path::Path;

use clap::CommandFactory;
use memmap2::Mmap;
use sha2::{Digest, Sha256};

use super::*;
use crate::output_json::{columns_json, package_json, table_json};
use msiprobe::api::{Database, PackageSummary};

pub(super) fn dispatch_command(
    command: Command,
    options: &OpenOptions,
    pretty: bool,
) -> Result<i32, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "msiprobe", &mut io::stdout());
            Ok(0)
        }
        Command::Info { file } => {
            let mmap = map_package(&file)?;
            let db = Database::open_with(&mmap, options).map_err(|err| err.with_path(&file))?;
            let summary = PackageSummary::from_database(&db);
            let digest = sha256_hex(&mmap);
            emit_json(package_json(&file, mmap.len() as u64, &digest, &summary), pretty);
            Ok(0)
        }
        Command::Code { file } => {
            let db = Database::open_path(&file, options)?;
            let code = db.product_code().map_err(|err| err.with_path(&file))?;
            emit_json(json!({ "product_code": code }), pretty);
            Ok(0)
        }
        Command::Version { file } => {
            let db = Database::open_path(&file, options)?;
            let version = db.product_version().map_err(|err| err.with_path(&file))?;
            emit_json(json!({ "product_version": version }), pretty);
            Ok(0)
        }
        Command::Property {
            file,
            name,
            table,
            column,
        } => {
            let db = Database::open_path(&file, options)?;
            let value = db.string_value_with(&table, &name, &column).ok_or_else(|| {
                Error::new(ErrorKind::NotFound)
                    .with_message(format!("no {column} for {name} in table {table}"))
                    .with_table(table.clone())
                    .with_path(&file)
            })?;
            emit_json(
                json!({ "table": table, "property": name, "column": column, "value": value }),
                pretty,
            );
            Ok(0)
        }
        Command::Tables { file } => {
            let db = Database::open_path(&file, options)?;
            let tables = db
                .table_names()
                .iter()
                .filter_map(|name| db.table(name))
                .map(|table| {
                    json!({
                        "name": table.name(),
                        "rows": table.len(),
                        "columns": columns_json(table.columns()),
                    })
                })
                .collect::<Vec<_>>();
            emit_json(json!({ "tables": tables }), pretty);
            Ok(0)
        }
        Command::Dump { file, table } => {
            let db = Database::open_path(&file, options)?;
            let found = db.table(&table).ok_or_else(|| {
                Error::new(ErrorKind::NotFound)
                    .with_message(format!("table {table} not found"))
                    .with_table(table.clone())
                    .with_path(&file)
                    .with_hint("Run `msiprobe tables <file>` to list available tables.")
            })?;
            emit_json(table_json(found), pretty);
            Ok(0)
        }
        Command::Streams { file } => {
            let db = Database::open_path(&file, options)?;
            emit_json(json!({ "streams": db.stream_names() }), pretty);
            Ok(0)
        }
    }
}

fn map_package(path: &Path) -> Result<Mmap, Error> {
    let file = File::open(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to open package")
            .with_path(path)
            .with_source(err)
    })?;
    unsafe { Mmap::map(&file) }.map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to map package")
            .with_path(path)
            .with_source(err)
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

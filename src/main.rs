//! Purpose: `msiprobe` CLI entry point.
//! Role: Binary crate root; parses args, opens packages, emits JSON on stdout.
//! Invariants: Commands emit one JSON document on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Packages are only ever read; nothing is written back.
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod output_json;

use msiprobe::api::{
    DEFAULT_MAX_STREAM_LEN, Error, ErrorKind, OpenOptions, Utf8Policy, to_exit_code,
};

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<i32, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(exit_code);
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Run `msiprobe --help` for usage."));
            }
        },
    };

    let options = OpenOptions::new()
        .with_max_stream_len(cli.max_stream_bytes)
        .with_utf8(if cli.strict_utf8 {
            Utf8Policy::Strict
        } else {
            Utf8Policy::Lossy
        });

    command_dispatch::dispatch_command(cli.command, &options, cli.pretty)
        .map_err(add_corrupt_hint)
        .map_err(add_io_hint)
}

#[derive(Parser)]
#[command(
    name = "msiprobe",
    version,
    about = "Inspect Windows Installer (MSI) package databases",
    long_about = None,
    after_help = r#"EXAMPLES
  $ msiprobe info setup.msi
  $ msiprobe code setup.msi
  $ msiprobe property setup.msi ALLUSERS
  $ msiprobe dump setup.msi Feature

NOTES
  - Output is JSON on stdout; errors go to stderr
  - Set RUST_LOG=debug to trace decoding"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(long, global = true, help = "Reject string data that is not valid UTF-8")]
    strict_utf8: bool,
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_MAX_STREAM_LEN,
        help = "Maximum bytes read from any single stream"
    )]
    max_stream_bytes: u64,
    #[arg(long, global = true, help = "Indent JSON output")]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Show product identity, digest, and table inventory")]
    Info {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
    #[command(about = "Print the ProductCode property")]
    Code {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
    #[command(about = "Print the ProductVersion property")]
    Version {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
    #[command(about = "Look up one row by its Property column")]
    Property {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
        #[arg(help = "Value to match in the Property column")]
        name: String,
        #[arg(long, default_value = "Property", help = "Table to search")]
        table: String,
        #[arg(long, default_value = "Value", help = "Column to return")]
        column: String,
    },
    #[command(about = "List tables with their columns and row counts")]
    Tables {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
    #[command(about = "Dump every row of one table")]
    Dump {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
        table: String,
    },
    #[command(about = "List container streams by decoded name")]
    Streams {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("error: ").to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() || err.kind() != ErrorKind::Io {
        return err;
    }
    err.with_hint("I/O error. Check that the path exists and is readable.")
}

fn add_corrupt_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::ContainerCorrupt => {
            err.with_hint("The file is not a readable compound file. Is it really an .msi?")
        }
        ErrorKind::StreamNotFound
        | ErrorKind::MalformedStringPool
        | ErrorKind::RowSizeMismatch
        | ErrorKind::UnsupportedColumnWidth
        | ErrorKind::InvalidStringRef
        | ErrorKind::MalformedSchema => {
            err.with_hint("The package database appears truncated or corrupt.")
        }
        _ => err,
    }
}

fn emit_json(value: Value, pretty: bool) {
    let json = if pretty || io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::ContainerCorrupt => "corrupt container".to_string(),
        ErrorKind::StreamNotFound => "stream not found".to_string(),
        ErrorKind::MalformedStringPool => "malformed string pool".to_string(),
        ErrorKind::RowSizeMismatch => "row size mismatch".to_string(),
        ErrorKind::UnsupportedColumnWidth => "unsupported column width".to_string(),
        ErrorKind::InvalidStringRef => "invalid string reference".to_string(),
        ErrorKind::MalformedSchema => "malformed schema".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(table) = err.table() {
        inner.insert("table".to_string(), json!(table));
    }
    if let Some(stream) = err.stream() {
        inner.insert("stream".to_string(), json!(stream));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    if let Some(length) = err.length() {
        inner.insert("length".to_string(), json!(length));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(table) = err.table() {
        lines.push(format!("table: {table}"));
    }
    if let Some(stream) = err.stream() {
        lines.push(format!("stream: {stream}"));
    }
    if let Some(offset) = err.offset() {
        lines.push(format!("offset: {offset}"));
    }
    if let Some(length) = err.length() {
        lines.push(format!("len: {length}"));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

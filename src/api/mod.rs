//! Purpose: Define the stable public Rust API boundary for msiprobe.
//! Exports: The database facade, value/row types, options, errors, and summaries.
//! Role: Public, additive-only surface; callers should not reach into `core`.
//! Invariants: Everything re-exported here is read-only once opened.

mod summary;

pub use crate::core::column::{ColumnDescriptor, ColumnType};
pub use crate::core::container::{CfbContainer, MemoryContainer, StreamSource};
pub use crate::core::database::{Database, PROPERTY_TABLE};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::options::{DEFAULT_MAX_STREAM_LEN, OpenOptions, Utf8Policy};
pub use crate::core::row::{Row, RowRecord, Table, Value};
pub use crate::core::stream_name;
pub use crate::core::string_pool::{ReferenceWidth, StringPool};
pub use summary::{PackageSummary, TableSummary};

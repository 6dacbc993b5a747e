// Column descriptors and the 16-bit type-flag word stored in `_Columns`.
use serde::Serialize;

use crate::core::error::{Error, ErrorKind};
use crate::core::string_pool::ReferenceWidth;

pub const COL_WIDTH_MASK: u16 = 0x00ff;
pub const COL_VALID: u16 = 0x0100;
pub const COL_LOCALIZABLE: u16 = 0x0200;
pub const COL_STRING: u16 = 0x0800;
pub const COL_NULLABLE: u16 = 0x1000;
pub const COL_KEY: u16 = 0x2000;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ColumnType(u16);

impl ColumnType {
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub fn nominal_width(self) -> u8 {
        (self.0 & COL_WIDTH_MASK) as u8
    }

    pub fn is_valid(self) -> bool {
        self.0 & COL_VALID != 0
    }

    pub fn is_string(self) -> bool {
        self.0 & COL_STRING != 0
    }

    pub fn is_nullable(self) -> bool {
        self.0 & COL_NULLABLE != 0
    }

    pub fn is_key(self) -> bool {
        self.0 & COL_KEY != 0
    }

    pub fn is_localizable(self) -> bool {
        self.0 & COL_LOCALIZABLE != 0
    }

    /// Stream-valued column: exactly String|Valid once Nullable is masked out.
    pub fn is_binary(self) -> bool {
        (self.0 & !COL_NULLABLE) == (COL_STRING | COL_VALID)
    }

    /// Bytes this column occupies per row on disk.
    ///
    /// Stream-valued columns are always 2 bytes; only string columns follow the
    /// pool's reference width.
    pub fn on_disk_width(self, refs: ReferenceWidth) -> Result<usize, Error> {
        if self.is_binary() {
            return Ok(2);
        }
        if self.is_string() {
            return Ok(refs.bytes());
        }
        match self.nominal_width() {
            1 | 2 => Ok(2),
            3 | 4 => Ok(4),
            other => Err(Error::new(ErrorKind::UnsupportedColumnWidth)
                .with_message(format!(
                    "unsupported integer column width {other} (type 0x{:04x})",
                    self.0
                ))),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    pub table: String,
    pub ordinal: u16,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ColumnType,
}

impl ColumnDescriptor {
    pub fn new(
        table: impl Into<String>,
        ordinal: u16,
        name: impl Into<String>,
        kind: ColumnType,
    ) -> Self {
        Self {
            table: table.into(),
            ordinal,
            name: name.into(),
            kind,
        }
    }
}

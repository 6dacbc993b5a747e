//! Purpose: Decode the `_StringPool` / `_StringData` pair into an id -> text map.
//! Exports: `StringPool`, `ReferenceWidth`, `StringPool::parse`.
//! Role: Every string cell in every table is a reference into this pool.
//! Invariants: Id 0 always resolves to "".
//! Invariants: Ids auto-increment per resolved entry; a wide-entry marker consumes no id.
//! Invariants: A slice past the end of the data stream is fatal, never truncated.
use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::options::Utf8Policy;

const HEADER_LEN: usize = 4;
const RECORD_LEN: usize = 4;
const LONG_REFS_FLAG: u16 = 0x8000;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReferenceWidth {
    Short = 2,
    Long = 3,
}

impl ReferenceWidth {
    pub fn bytes(self) -> usize {
        self as usize
    }

    fn from_flag(flag: u16) -> Result<Self, Error> {
        match flag {
            0 => Ok(ReferenceWidth::Short),
            LONG_REFS_FLAG => Ok(ReferenceWidth::Long),
            other => Err(Error::new(ErrorKind::MalformedStringPool)
                .with_message(format!("invalid string reference flag 0x{other:04x}"))
                .with_stream("$_StringPool")
                .with_offset(2)),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StringPool {
    codepage: u16,
    width: ReferenceWidth,
    // Index 0 is the implicit empty string.
    strings: Vec<String>,
}

impl StringPool {
    pub fn parse(index: &[u8], data: &[u8], utf8: Utf8Policy) -> Result<Self, Error> {
        if index.len() < HEADER_LEN {
            return Err(Error::new(ErrorKind::MalformedStringPool)
                .with_message("string pool header too small")
                .with_stream("$_StringPool")
                .with_length(index.len() as u64));
        }
        let codepage = read_u16(index, 0);
        let width = ReferenceWidth::from_flag(read_u16(index, 2))?;

        let body = &index[HEADER_LEN..];
        if body.len() % RECORD_LEN != 0 {
            return Err(Error::new(ErrorKind::MalformedStringPool)
                .with_message("string pool index ends mid-record")
                .with_stream("$_StringPool")
                .with_length(index.len() as u64));
        }

        let mut strings = Vec::with_capacity(body.len() / RECORD_LEN + 1);
        strings.push(String::new());

        let mut data_off = 0usize;
        let mut wide_high: Option<u16> = None;
        for record in body.chunks_exact(RECORD_LEN) {
            let entry_len = read_u16(record, 0);
            let entry_ref = read_u16(record, 2);
            if wide_high.is_none() && entry_len == 0 && entry_ref != 0 {
                wide_high = Some(entry_ref);
                continue;
            }
            let mut len = entry_len as usize;
            if let Some(high) = wide_high.take() {
                len += (high as usize) << 16;
            }

            let id = strings.len();
            let end = data_off.checked_add(len).filter(|end| *end <= data.len());
            let Some(end) = end else {
                return Err(Error::new(ErrorKind::MalformedStringPool)
                    .with_message(format!(
                        "string {id} overruns string data ({} bytes available)",
                        data.len()
                    ))
                    .with_stream("$_StringData")
                    .with_offset(data_off as u64)
                    .with_length(len as u64));
            };
            let bytes = &data[data_off..end];
            let text = match utf8 {
                Utf8Policy::Lossy => String::from_utf8_lossy(bytes).into_owned(),
                Utf8Policy::Strict => String::from_utf8(bytes.to_vec()).map_err(|err| {
                    Error::new(ErrorKind::MalformedStringPool)
                        .with_message(format!("string {id} is not valid utf-8"))
                        .with_stream("$_StringData")
                        .with_offset(data_off as u64)
                        .with_source(err)
                })?,
            };
            strings.push(text);
            data_off = end;
        }

        if wide_high.is_some() {
            return Err(Error::new(ErrorKind::MalformedStringPool)
                .with_message("wide string marker has no length record")
                .with_stream("$_StringPool")
                .with_offset(index.len() as u64));
        }
        if data_off != data.len() {
            debug!(
                used = data_off,
                available = data.len(),
                "string data has trailing bytes"
            );
        }

        Ok(Self {
            codepage,
            width,
            strings,
        })
    }

    pub fn codepage(&self) -> u16 {
        self.codepage
    }

    pub fn reference_width(&self) -> ReferenceWidth {
        self.width
    }

    pub fn get(&self, id: u32) -> Option<&str> {
        self.strings.get(id as usize).map(String::as_str)
    }

    /// Number of ids, including the implicit id 0.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// True when the pool holds nothing beyond the implicit id 0, so an empty
    /// pool still reports `len() == 1`.
    pub fn is_empty(&self) -> bool {
        self.strings.len() <= 1
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.strings
            .iter()
            .enumerate()
            .map(|(id, text)| (id as u32, text.as_str()))
    }
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

#[cfg(test)]
mod tests {
    use super::{ReferenceWidth, StringPool};
    use crate::core::error::ErrorKind;
    use crate::core::options::Utf8Policy;

    fn index(flag: u16, records: &[(u16, u16)]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1252u16.to_le_bytes());
        buf.extend_from_slice(&flag.to_le_bytes());
        for (len, refs) in records {
            buf.extend_from_slice(&len.to_le_bytes());
            buf.extend_from_slice(&refs.to_le_bytes());
        }
        buf
    }

    #[test]
    fn resolves_ids_in_order_including_empty_entries() {
        let idx = index(0, &[(5, 0), (0, 0), (3, 0)]);
        let pool = StringPool::parse(&idx, b"hellofoo", Utf8Policy::Lossy).expect("parse");
        assert_eq!(pool.reference_width(), ReferenceWidth::Short);
        assert_eq!(pool.codepage(), 1252);
        assert_eq!(pool.get(0), Some(""));
        assert_eq!(pool.get(1), Some("hello"));
        assert_eq!(pool.get(2), Some(""));
        assert_eq!(pool.get(3), Some("foo"));
        assert_eq!(pool.get(4), None);
        assert_eq!(pool.len(), 4);
        assert!(!pool.is_empty());
    }

    #[test]
    fn empty_pool_still_resolves_id_zero() {
        let pool = StringPool::parse(&index(0, &[]), &[], Utf8Policy::Lossy).expect("parse");
        assert_eq!(pool.get(0), Some(""));
        assert!(pool.is_empty());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn long_reference_flag_selects_three_byte_width() {
        let pool = StringPool::parse(&index(0x8000, &[(1, 1)]), b"x", Utf8Policy::Lossy)
            .expect("parse");
        assert_eq!(pool.reference_width(), ReferenceWidth::Long);
        assert_eq!(pool.reference_width().bytes(), 3);
    }

    #[test]
    fn rejects_unknown_reference_flag() {
        let err = StringPool::parse(&index(0x0001, &[]), &[], Utf8Policy::Lossy)
            .expect_err("flag");
        assert_eq!(err.kind(), ErrorKind::MalformedStringPool);
    }

    #[test]
    fn wide_entry_combines_marker_with_next_record() {
        // Marker (0, 1) then (4, 2): length = 4 + (1 << 16).
        let len = 4 + (1usize << 16);
        let mut data = vec![b'a'; len];
        data.extend_from_slice(b"tail");
        let idx = index(0, &[(0, 1), (4, 2), (4, 1)]);
        let pool = StringPool::parse(&idx, &data, Utf8Policy::Lossy).expect("parse");
        assert_eq!(pool.get(1).map(str::len), Some(len));
        assert_eq!(pool.get(2), Some("tail"));
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn slice_past_data_end_is_fatal() {
        let idx = index(0, &[(5, 1), (10, 1)]);
        let err = StringPool::parse(&idx, b"hello-short", Utf8Policy::Lossy).expect_err("overrun");
        assert_eq!(err.kind(), ErrorKind::MalformedStringPool);
        assert_eq!(err.offset(), Some(5));
        assert_eq!(err.length(), Some(10));
    }

    #[test]
    fn dangling_wide_marker_is_fatal() {
        let err = StringPool::parse(&index(0, &[(0, 3)]), &[], Utf8Policy::Lossy)
            .expect_err("marker");
        assert_eq!(err.kind(), ErrorKind::MalformedStringPool);
    }

    #[test]
    fn strict_utf8_rejects_invalid_bytes() {
        let idx = index(0, &[(2, 1)]);
        let lossy = StringPool::parse(&idx, &[0xff, b'a'], Utf8Policy::Lossy).expect("lossy");
        assert_eq!(lossy.get(1), Some("\u{fffd}a"));
        let err = StringPool::parse(&idx, &[0xff, b'a'], Utf8Policy::Strict).expect_err("strict");
        assert_eq!(err.kind(), ErrorKind::MalformedStringPool);
    }
}

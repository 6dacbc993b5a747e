//! Purpose: Narrow seam over the compound-file container holding the MSI streams.
//! Exports: `StreamSource`, `CfbContainer`, `MemoryContainer`.
//! Role: The decoder only needs "read stream by packed name" and "list streams".
//! Invariants: A missing stream is `Ok(None)`; every other failure is `ContainerCorrupt`.
//! Invariants: Reads are capped at the caller's limit; oversize streams are rejected.
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek};

use cfb::CompoundFile;

use crate::core::error::{Error, ErrorKind};
use crate::core::stream_name;

pub trait StreamSource {
    /// Read a root-level stream by its packed (on-disk) name.
    fn read_stream(&mut self, name: &str, limit: u64) -> Result<Option<Vec<u8>>, Error>;

    /// Packed names of every root-level stream.
    fn stream_names(&mut self) -> Result<Vec<String>, Error>;
}

pub struct CfbContainer<F> {
    inner: CompoundFile<F>,
}

impl<'a> CfbContainer<Cursor<&'a [u8]>> {
    pub fn open(bytes: &'a [u8]) -> Result<Self, Error> {
        Self::from_reader(Cursor::new(bytes))
    }
}

impl<F: Read + Seek> CfbContainer<F> {
    pub fn from_reader(reader: F) -> Result<Self, Error> {
        let inner = CompoundFile::open(reader).map_err(|err| {
            Error::new(ErrorKind::ContainerCorrupt)
                .with_message("not a compound file container")
                .with_source(err)
        })?;
        Ok(Self { inner })
    }
}

impl<F: Read + Seek> StreamSource for CfbContainer<F> {
    fn read_stream(&mut self, name: &str, limit: u64) -> Result<Option<Vec<u8>>, Error> {
        let path = format!("/{name}");
        if !self.inner.is_stream(&path) {
            return Ok(None);
        }
        let corrupt = |err: std::io::Error| {
            Error::new(ErrorKind::ContainerCorrupt)
                .with_message("failed to read stream")
                .with_stream(stream_name::decode(name))
                .with_source(err)
        };
        let stream = self.inner.open_stream(&path).map_err(corrupt)?;
        let mut buf = Vec::new();
        stream
            .take(limit.saturating_add(1))
            .read_to_end(&mut buf)
            .map_err(corrupt)?;
        check_limit(name, buf.len(), limit)?;
        Ok(Some(buf))
    }

    fn stream_names(&mut self) -> Result<Vec<String>, Error> {
        Ok(self
            .inner
            .read_root_storage()
            .filter(|entry| entry.is_stream())
            .map(|entry| entry.name().to_string())
            .collect())
    }
}

/// Streams held directly in memory, keyed by packed name.
#[derive(Clone, Debug, Default)]
pub struct MemoryContainer {
    streams: BTreeMap<String, Vec<u8>>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, packed_name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.streams.insert(packed_name.into(), bytes.into());
    }

    pub fn remove(&mut self, packed_name: &str) -> Option<Vec<u8>> {
        self.streams.remove(packed_name)
    }

    pub fn with_stream(
        mut self,
        packed_name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        self.insert(packed_name, bytes);
        self
    }

    pub fn streams(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.streams
    }
}

impl StreamSource for MemoryContainer {
    fn read_stream(&mut self, name: &str, limit: u64) -> Result<Option<Vec<u8>>, Error> {
        match self.streams.get(name) {
            Some(bytes) => {
                check_limit(name, bytes.len(), limit)?;
                Ok(Some(bytes.clone()))
            }
            None => Ok(None),
        }
    }

    fn stream_names(&mut self) -> Result<Vec<String>, Error> {
        Ok(self.streams.keys().cloned().collect())
    }
}

fn check_limit(name: &str, len: usize, limit: u64) -> Result<(), Error> {
    if len as u64 > limit {
        return Err(Error::new(ErrorKind::ContainerCorrupt)
            .with_message(format!("stream exceeds {limit} byte limit"))
            .with_stream(stream_name::decode(name))
            .with_hint("Raise the stream size limit if the package is known to be valid."));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{CfbContainer, MemoryContainer, StreamSource};
    use crate::core::error::ErrorKind;
    use crate::core::stream_name;
    use std::io::{Cursor, Write};

    fn container_bytes(streams: &[(&str, &[u8])]) -> Vec<u8> {
        let mut comp = cfb::CompoundFile::create(Cursor::new(Vec::new())).expect("create");
        for (name, bytes) in streams {
            let mut stream = comp.create_stream(format!("/{name}")).expect("stream");
            stream.write_all(bytes).expect("write");
        }
        comp.flush().expect("flush");
        comp.into_inner().into_inner()
    }

    #[test]
    fn reads_streams_by_packed_name() {
        let packed = stream_name::encode("$_StringPool");
        let bytes = container_bytes(&[(packed.as_str(), &[1, 2, 3, 4])]);
        let mut container = CfbContainer::open(&bytes).expect("open");
        assert_eq!(
            container.read_stream(&packed, 1024).expect("read"),
            Some(vec![1, 2, 3, 4])
        );
        assert_eq!(container.read_stream("missing", 1024).expect("read"), None);
        assert_eq!(container.stream_names().expect("names"), vec![packed]);
    }

    #[test]
    fn rejects_non_container_bytes() {
        let err = CfbContainer::open(b"definitely not a compound file")
            .err()
            .expect("corrupt");
        assert_eq!(err.kind(), ErrorKind::ContainerCorrupt);
    }

    #[test]
    fn oversized_stream_is_rejected() {
        let bytes = container_bytes(&[("big", &[0u8; 64])]);
        let mut container = CfbContainer::open(&bytes).expect("open");
        let err = container.read_stream("big", 16).expect_err("limit");
        assert_eq!(err.kind(), ErrorKind::ContainerCorrupt);

        let mut memory = MemoryContainer::new().with_stream("big", vec![0u8; 64]);
        let err = memory.read_stream("big", 16).expect_err("limit");
        assert_eq!(err.kind(), ErrorKind::ContainerCorrupt);
        assert_eq!(memory.read_stream("big", 64).expect("read").map(|b| b.len()), Some(64));
    }
}

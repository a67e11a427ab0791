//! Bundle archive format
//!
//! A single blob carrying every payload of one version so a bundle can be
//! copied or downloaded as a unit. Entries are bincode-encoded and
//! length-prefixed; the record section is covered by a CRC32.
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │ Header (16 bytes)                │
//! │ - magic: "MVAB"                  │
//! │ - version: u8                    │
//! │ - flags: u8 (compression)        │
//! │ - entry_count: u32               │
//! │ - header_checksum: u32           │
//! ├──────────────────────────────────┤
//! │ Entries                          │
//! │ - length: u32                    │
//! │ - data: bincode(ArchiveEntry)    │
//! ├──────────────────────────────────┤
//! │ Footer (24 bytes)                │
//! │ - data_checksum: u32             │
//! │ - uncompressed_size: u64         │
//! │ - stored_size: u64               │
//! │ - footer_magic: "BAVM"           │
//! └──────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

pub const ARCHIVE_MAGIC: [u8; 4] = *b"MVAB";
pub const FOOTER_MAGIC: [u8; 4] = *b"BAVM";
pub const ARCHIVE_VERSION: u8 = 1;

const HEADER_SIZE: usize = 16;
const FOOTER_SIZE: usize = 24;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("invalid archive magic")]
    InvalidMagic,

    #[error("unsupported archive version {0}")]
    UnsupportedVersion(u8),

    #[error("unsupported compression flag {0}")]
    UnsupportedCompression(u8),

    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("archive truncated: {0}")]
    Truncated(&'static str),

    #[error("archive has no entries")]
    Empty,

    #[error("duplicate archive entry {0}")]
    DuplicateEntry(String),

    #[error("entry count mismatch: header says {expected}, found {actual}")]
    EntryCount { expected: u32, actual: u32 },

    #[error("archive serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Compression applied to the entry section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    #[cfg(feature = "compression")]
    Zstd { level: i32 },
}

impl Compression {
    /// Compression for a configured zstd level; `None` stores entries as is
    pub fn from_level(level: Option<i32>) -> Self {
        match level {
            #[cfg(feature = "compression")]
            Some(level) => Compression::Zstd { level },
            _ => Compression::None,
        }
    }

    fn flag(self) -> u8 {
        match self {
            Compression::None => 0,
            #[cfg(feature = "compression")]
            Compression::Zstd { .. } => 1,
        }
    }

    fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            0 => Some(Compression::None),
            #[cfg(feature = "compression")]
            1 => Some(Compression::Zstd { level: 3 }),
            _ => None,
        }
    }
}

/// One named payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
}

fn header_checksum(version: u8, flags: u8, entry_count: u32) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&ARCHIVE_MAGIC);
    hasher.update(&[version, flags]);
    hasher.update(&entry_count.to_le_bytes());
    hasher.finalize()
}

fn read_u32(data: &[u8], at: usize) -> Result<u32, ArchiveError> {
    data.get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(ArchiveError::Truncated("u32 field"))
}

fn read_u64(data: &[u8], at: usize) -> Result<u64, ArchiveError> {
    data.get(at..at + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or(ArchiveError::Truncated("u64 field"))
}

/// Builds an archive blob
pub struct ArchiveWriter {
    compression: Compression,
    records: Vec<u8>,
    names: HashSet<String>,
    entry_count: u32,
}

impl ArchiveWriter {
    pub fn new(compression: Compression) -> Self {
        ArchiveWriter {
            compression,
            records: Vec::new(),
            names: HashSet::new(),
            entry_count: 0,
        }
    }

    pub fn add(&mut self, name: &str, data: &[u8]) -> Result<(), ArchiveError> {
        if !self.names.insert(name.to_string()) {
            return Err(ArchiveError::DuplicateEntry(name.to_string()));
        }

        let entry = ArchiveEntry {
            name: name.to_string(),
            data: data.to_vec(),
        };
        let encoded = bincode::serialize(&entry)?;
        self.records
            .extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        self.records.extend_from_slice(&encoded);
        self.entry_count += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entry_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    pub fn finish(self) -> Result<Vec<u8>, ArchiveError> {
        if self.entry_count == 0 {
            return Err(ArchiveError::Empty);
        }

        let data_checksum = crc32fast::hash(&self.records);
        let uncompressed_size = self.records.len() as u64;

        let stored = match self.compression {
            Compression::None => self.records,
            #[cfg(feature = "compression")]
            Compression::Zstd { level } => zstd::encode_all(self.records.as_slice(), level)?,
        };

        let flags = self.compression.flag();
        let mut out = Vec::with_capacity(HEADER_SIZE + stored.len() + FOOTER_SIZE);
        out.extend_from_slice(&ARCHIVE_MAGIC);
        out.push(ARCHIVE_VERSION);
        out.push(flags);
        out.extend_from_slice(&self.entry_count.to_le_bytes());
        out.extend_from_slice(&header_checksum(ARCHIVE_VERSION, flags, self.entry_count).to_le_bytes());
        out.resize(HEADER_SIZE, 0);

        out.extend_from_slice(&stored);

        out.extend_from_slice(&data_checksum.to_le_bytes());
        out.extend_from_slice(&uncompressed_size.to_le_bytes());
        out.extend_from_slice(&(stored.len() as u64).to_le_bytes());
        out.extend_from_slice(&FOOTER_MAGIC);

        Ok(out)
    }
}

/// A fully validated archive
#[derive(Debug, Clone)]
pub struct ArchiveReader {
    entries: Vec<ArchiveEntry>,
}

impl ArchiveReader {
    /// Parse and verify an archive blob
    pub fn open(data: &[u8]) -> Result<Self, ArchiveError> {
        if data.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(ArchiveError::Truncated("archive smaller than header and footer"));
        }

        if data[0..4] != ARCHIVE_MAGIC {
            return Err(ArchiveError::InvalidMagic);
        }
        let version = data[4];
        if version != ARCHIVE_VERSION {
            return Err(ArchiveError::UnsupportedVersion(version));
        }
        let flags = data[5];
        let entry_count = read_u32(data, 6)?;
        let stored_header_checksum = read_u32(data, 10)?;
        let expected = header_checksum(version, flags, entry_count);
        if stored_header_checksum != expected {
            return Err(ArchiveError::ChecksumMismatch {
                expected,
                actual: stored_header_checksum,
            });
        }
        let compression =
            Compression::from_flag(flags).ok_or(ArchiveError::UnsupportedCompression(flags))?;

        let footer_start = data.len() - FOOTER_SIZE;
        if data[footer_start + 20..] != FOOTER_MAGIC {
            return Err(ArchiveError::InvalidMagic);
        }
        let data_checksum = read_u32(data, footer_start)?;
        let uncompressed_size = read_u64(data, footer_start + 4)?;
        let stored_size = read_u64(data, footer_start + 12)?;

        let stored = &data[HEADER_SIZE..footer_start];
        if stored.len() as u64 != stored_size {
            return Err(ArchiveError::Truncated("entry section size mismatch"));
        }

        let records = match compression {
            Compression::None => stored.to_vec(),
            #[cfg(feature = "compression")]
            Compression::Zstd { .. } => zstd::decode_all(stored)?,
        };
        if records.len() as u64 != uncompressed_size {
            return Err(ArchiveError::Truncated("decoded size mismatch"));
        }

        let actual = crc32fast::hash(&records);
        if actual != data_checksum {
            return Err(ArchiveError::ChecksumMismatch {
                expected: data_checksum,
                actual,
            });
        }

        let mut entries = Vec::with_capacity(entry_count as usize);
        let mut offset = 0;
        while offset < records.len() {
            let len = read_u32(&records, offset)? as usize;
            offset += 4;
            let body = records
                .get(offset..offset + len)
                .ok_or(ArchiveError::Truncated("entry body"))?;
            entries.push(bincode::deserialize::<ArchiveEntry>(body)?);
            offset += len;
        }

        if entries.len() as u32 != entry_count {
            return Err(ArchiveError::EntryCount {
                expected: entry_count,
                actual: entries.len() as u32,
            });
        }

        Ok(ArchiveReader { entries })
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.data.as_slice())
    }

    pub fn into_entries(self) -> Vec<ArchiveEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut writer = ArchiveWriter::new(Compression::None);
        writer.add("model_1.bin", b"model-bytes").unwrap();
        writer.add("scaler_1.bin", b"scaler-bytes").unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_write_and_open() {
        let reader = ArchiveReader::open(&sample()).unwrap();
        assert_eq!(reader.entries().len(), 2);
        assert_eq!(reader.get("model_1.bin"), Some(&b"model-bytes"[..]));
        assert_eq!(reader.get("scaler_1.bin"), Some(&b"scaler-bytes"[..]));
        assert_eq!(reader.get("metadata_1.json"), None);
    }

    #[test]
    fn test_empty_archive_rejected() {
        let writer = ArchiveWriter::new(Compression::None);
        assert!(matches!(writer.finish(), Err(ArchiveError::Empty)));
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let mut writer = ArchiveWriter::new(Compression::None);
        writer.add("a", b"1").unwrap();
        assert!(matches!(writer.add("a", b"2"), Err(ArchiveError::DuplicateEntry(_))));
    }

    #[test]
    fn test_corrupted_payload_detected() {
        let mut data = sample();
        data[HEADER_SIZE + 10] ^= 0xFF;
        assert!(matches!(
            ArchiveReader::open(&data),
            Err(ArchiveError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_corrupted_header_detected() {
        let mut data = sample();
        data[6] ^= 0x01; // entry_count
        assert!(matches!(
            ArchiveReader::open(&data),
            Err(ArchiveError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_archive_detected() {
        let data = sample();
        assert!(ArchiveReader::open(&data[..data.len() - 5]).is_err());
        assert!(matches!(
            ArchiveReader::open(&data[..10]),
            Err(ArchiveError::Truncated(_))
        ));
    }

    #[test]
    fn test_bad_magic() {
        let mut data = sample();
        data[0] = b'X';
        assert!(matches!(ArchiveReader::open(&data), Err(ArchiveError::InvalidMagic)));
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_zstd_archive() {
        let payload = vec![7u8; 64 * 1024];
        let mut writer = ArchiveWriter::new(Compression::Zstd { level: 3 });
        writer.add("model_1.bin", &payload).unwrap();
        let data = writer.finish().unwrap();
        assert!(data.len() < payload.len());

        let reader = ArchiveReader::open(&data).unwrap();
        assert_eq!(reader.get("model_1.bin"), Some(payload.as_slice()));
    }
}

//! Raw page I/O for the persistent page file.
//!
//! The file is an array of fixed-size pages; page `n` starts at byte
//! `n * page_size`. Page 0 holds the [`FileHeader`], every other page holds
//! either a checksummed node or a [`FreePage`] link.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::rstar::{Node, PageId, SpatialError, SpatialResult, NO_PAGE};

/// Magic number for file format identification ("DLCT").
pub const MAGIC: u32 = 0x444C_4354;

/// File format version
pub const VERSION: u32 = 1;

// ============================================================================
// Page Formats
// ============================================================================

/// File header stored in page 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub page_size: u32,
    /// Dimensionality of the stored tree, 0 before a tree was written
    pub dim: u32,
    pub root_page: PageId,
    pub height: u32,
    pub size: u64,
    pub next_page_id: PageId,
    pub free_list_head: PageId,
    pub free_page_count: u64,
}

impl FileHeader {
    pub fn new(page_size: usize) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            page_size: page_size as u32,
            dim: 0,
            root_page: NO_PAGE,
            height: 0,
            size: 0,
            next_page_id: NO_PAGE + 1,
            free_list_head: NO_PAGE,
            free_page_count: 0,
        }
    }

    pub fn validate(&self) -> SpatialResult<()> {
        if self.magic != MAGIC {
            return Err(SpatialError::Corrupted(format!(
                "bad magic number {:#x}",
                self.magic
            )));
        }
        if self.version != VERSION {
            return Err(SpatialError::Corrupted(format!(
                "unsupported file format version {}",
                self.version
            )));
        }
        if self.root_page >= self.next_page_id && self.root_page != NO_PAGE {
            return Err(SpatialError::Corrupted(format!(
                "root page {} beyond end of file",
                self.root_page
            )));
        }
        Ok(())
    }
}

/// A released page in the on-disk free chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreePage {
    /// Next free page in the chain (0 = end of chain)
    pub next_free: PageId,
}

/// An encoded node together with the CRC-32 of its bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageWithChecksum {
    pub checksum: u32,
    pub payload: Vec<u8>,
}

impl PageWithChecksum {
    pub fn new(node: &Node) -> SpatialResult<Self> {
        let payload = encode(node)?;
        Ok(Self {
            checksum: crc32(&payload),
            payload,
        })
    }

    /// Verifies the checksum and decodes the node.
    pub fn into_node(self) -> SpatialResult<Node> {
        let actual = crc32(&self.payload);
        if actual != self.checksum {
            return Err(SpatialError::Corrupted(format!(
                "page checksum mismatch (stored {:08x}, computed {:08x})",
                self.checksum, actual
            )));
        }
        decode(&self.payload)
    }
}

/// CRC-32 (MPEG-2 polynomial, MSB first).
fn crc32(data: &[u8]) -> u32 {
    const POLY: u32 = 0x04C1_1DB7;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }
    crc ^ 0xFFFF_FFFF
}

fn encode<T: Serialize>(value: &T) -> SpatialResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::legacy())
        .map_err(|e| SpatialError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> SpatialResult<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::legacy())
        .map(|(value, _)| value)
        .map_err(|e| SpatialError::Serialization(e.to_string()))
}

// ============================================================================
// Storage
// ============================================================================

/// Reads and writes single pages. Every call is one seek plus one read or
/// write; caching is left to the caller.
pub struct Storage {
    file: Mutex<File>,
    path: PathBuf,
    page_size: usize,
}

impl Storage {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: &Path, page_size: usize) -> SpatialResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            page_size,
        })
    }

    /// Opens an existing file. The page size is taken from its header.
    pub fn open(path: &Path) -> SpatialResult<(Self, FileHeader)> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        // The header is small; its page size tells how much of page 0 to read
        let mut buffer = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        (&mut file).take(1024).read_to_end(&mut buffer)?;
        let header: FileHeader = decode(&buffer)?;
        header.validate()?;

        let storage = Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            page_size: header.page_size as usize,
        };
        Ok((storage, header))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn write_header(&self, header: &FileHeader) -> SpatialResult<()> {
        let bytes = encode(header)?;
        self.write_raw(NO_PAGE, bytes)
    }

    /// Reads and verifies the node in `page_id`.
    pub fn read_page(&self, page_id: PageId) -> SpatialResult<Node> {
        let buffer = self.read_raw(page_id)?;
        let page: PageWithChecksum = decode(&buffer)?;
        page.into_node()
    }

    /// Encodes `node` into a full page image, failing if it does not fit.
    pub fn encode_page(&self, node: &Node) -> SpatialResult<Vec<u8>> {
        let bytes = encode(&PageWithChecksum::new(node)?)?;
        if bytes.len() > self.page_size {
            return Err(SpatialError::InvalidOperation(format!(
                "node of {} entries needs {} bytes, page size is {}",
                node.len(),
                bytes.len(),
                self.page_size
            )));
        }
        Ok(bytes)
    }

    pub fn write_page(&self, page_id: PageId, node: &Node) -> SpatialResult<()> {
        let bytes = self.encode_page(node)?;
        self.write_raw(page_id, bytes)
    }

    pub fn read_free_page(&self, page_id: PageId) -> SpatialResult<FreePage> {
        let buffer = self.read_raw(page_id)?;
        decode(&buffer)
    }

    pub fn write_free_page(&self, page_id: PageId, free_page: &FreePage) -> SpatialResult<()> {
        let bytes = encode(free_page)?;
        self.write_raw(page_id, bytes)
    }

    pub fn sync(&self) -> SpatialResult<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn check_node_page(page_id: PageId) -> SpatialResult<()> {
        if page_id == NO_PAGE {
            return Err(SpatialError::InvalidOperation(
                "page 0 is reserved for the file header".into(),
            ));
        }
        Ok(())
    }

    fn read_raw(&self, page_id: PageId) -> SpatialResult<Vec<u8>> {
        Self::check_node_page(page_id)?;
        let mut file = self.file.lock();
        let offset = page_id * self.page_size as u64;
        if offset + self.page_size as u64 > file.metadata()?.len() {
            return Err(SpatialError::PageNotFound(page_id));
        }
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; self.page_size];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn write_raw(&self, page_id: PageId, mut bytes: Vec<u8>) -> SpatialResult<()> {
        bytes.resize(self.page_size, 0);
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id * self.page_size as u64))?;
        file.write_all(&bytes)?;
        Ok(())
    }
}

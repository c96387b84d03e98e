//! Random-access byte sources backing an open Level-1B file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Positioned reads over an immutable byte sequence.
///
/// Implementations must be safe to call from several threads at once; no
/// cursor is shared between calls.
pub trait ByteSource: Send + Sync {
    /// Total length in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `buf` with the bytes starting at `offset`
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()>;

    /// Read up to `len` bytes from `offset`, truncated at the end of the source
    fn read_prefix(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        let available = self.len().saturating_sub(offset).min(len as u64) as usize;
        let mut buf = vec![0u8; available];
        if available > 0 {
            self.read_at(offset, &mut buf)?;
        }
        Ok(buf)
    }
}

/// File on disk; each seek+read pair runs under one lock
pub struct FileSource {
    path: PathBuf,
    file: Mutex<File>,
    len: u64,
}

impl FileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", path.display()),
            ));
        }
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self { path, file: Mutex::new(file), len })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "file lock poisoned"))?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }
}

/// Whole file held in memory
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ByteSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        let start = usize::try_from(offset).map_err(|_| eof(offset, buf.len()))?;
        let bytes = self
            .data
            .get(start..start + buf.len())
            .ok_or_else(|| eof(offset, buf.len()))?;
        buf.copy_from_slice(bytes);
        Ok(())
    }
}

fn eof(offset: u64, len: usize) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("read of {} bytes at offset {} runs past the end of the data", len, offset),
    )
}

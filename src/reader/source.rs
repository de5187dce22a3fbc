//! Block-oriented input sources
//!
//! A block source treats all bytes equally; line structure is the
//! reader's business. `read_block` returning zero signals end of
//! input, and it must remain legal to call after that.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Producer of raw bytes for a [`LineReader`](crate::reader::LineReader).
pub trait BlockSource {
    /// Read up to `dest.len()` bytes into `dest`, returning how many
    /// were produced. Zero means end of input. I/O failures are
    /// reported as end of input as well.
    fn read_block(&mut self, dest: &mut [u8]) -> usize;

    /// Release any backing resource. Idempotent; default no-op.
    fn close(&mut self) {}
}

/// Source that never produces bytes.
///
/// Backs readers whose whole content arrives via pushback.
#[derive(Debug, Default)]
pub struct NoSource;

impl BlockSource for NoSource {
    #[inline]
    fn read_block(&mut self, _dest: &mut [u8]) -> usize {
        0
    }
}

/// File-backed source.
pub struct FileSource {
    file: Option<File>,
}

impl FileSource {
    /// Open `path` for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        Ok(FileSource {
            file: Some(File::open(path)?),
        })
    }

    /// Wrap an already-open file.
    pub fn from_file(file: File) -> Self {
        FileSource { file: Some(file) }
    }

    /// Whether the backing file is still open.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

impl BlockSource for FileSource {
    fn read_block(&mut self, dest: &mut [u8]) -> usize {
        match &mut self.file {
            Some(f) => f.read(dest).unwrap_or(0),
            None => 0,
        }
    }

    fn close(&mut self) {
        self.file = None;
    }
}

/// Source backed by a borrowed byte slice.
///
/// Copies up to `limit - offset` bytes per call and advances `offset`.
/// Use this instead of [`LineReader::from_bytes`] when the backing
/// memory is large and should not be inhaled into the line buffer.
///
/// [`LineReader::from_bytes`]: crate::reader::LineReader::from_bytes
#[derive(Debug)]
pub struct MemorySource<'a> {
    data: &'a [u8],
    offset: usize,
    limit: usize,
}

impl<'a> MemorySource<'a> {
    /// Read the whole slice.
    pub fn new(data: &'a [u8]) -> Self {
        MemorySource {
            data,
            offset: 0,
            limit: data.len(),
        }
    }

    /// Read only `data[offset..limit]`.
    pub fn with_range(data: &'a [u8], offset: usize, limit: usize) -> Self {
        debug_assert!(offset <= limit && limit <= data.len());
        MemorySource {
            data,
            offset,
            limit,
        }
    }
}

impl BlockSource for MemorySource<'_> {
    fn read_block(&mut self, dest: &mut [u8]) -> usize {
        let nr = dest.len().min(self.limit - self.offset);
        if nr > 0 {
            dest[..nr].copy_from_slice(&self.data[self.offset..self.offset + nr]);
            self.offset += nr;
        }
        nr
    }
}

/// Adapter making any [`std::io::Read`] usable as a block source.
pub struct ReadSource<R: Read> {
    reader: R,
}

impl<R: Read> ReadSource<R> {
    pub fn new(reader: R) -> Self {
        ReadSource { reader }
    }
}

impl<R: Read> BlockSource for ReadSource<R> {
    fn read_block(&mut self, dest: &mut [u8]) -> usize {
        self.reader.read(dest).unwrap_or(0)
    }
}

//! Positional reads for chunked uploads.

use std::fs::File;
use std::io;
use std::path::Path;
#[cfg(unix)]
use std::os::unix::fs::FileExt;

use crate::planner::ChunkRange;

/// Read-only handle that returns the bytes of one chunk at a time.
pub struct ChunkReader {
    file: File,
    len: u64,
}

impl ChunkReader {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read exactly the bytes of `range`.
    #[cfg(unix)]
    pub fn read_chunk(&self, range: &ChunkRange) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; range.length as usize];
        self.file.read_exact_at(&mut buf, range.offset)?;
        Ok(buf)
    }

    #[cfg(not(unix))]
    pub fn read_chunk(&self, range: &ChunkRange) -> io::Result<Vec<u8>> {
        use std::io::{Read, Seek, SeekFrom};
        let mut f = self.file.try_clone()?;
        f.seek(SeekFrom::Start(range.offset))?;
        let mut buf = vec![0u8; range.length as usize];
        f.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_requested_range() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"0123456789abcdef").unwrap();
        f.flush().unwrap();
        let reader = ChunkReader::open(f.path()).unwrap();
        assert_eq!(reader.len(), 16);
        let chunk = reader
            .read_chunk(&ChunkRange {
                offset: 10,
                length: 4,
            })
            .unwrap();
        assert_eq!(chunk, b"abcd");
    }
}

//! Opening and sizing a `.part` file before any chunk is written.

use anyhow::{Context, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use super::writer::StorageWriter;

/// A freshly truncated `.part` file, not yet shared with workers.
pub struct StorageWriterBuilder {
    file: File,
    temp_path: PathBuf,
}

impl StorageWriterBuilder {
    /// Open `temp_path` for writing, discarding whatever a previous run left there.
    pub fn create(temp_path: &Path) -> Result<Self> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp_path)
            .with_context(|| format!("open {}", temp_path.display()))?;
        Ok(Self {
            file,
            temp_path: temp_path.to_path_buf(),
        })
    }

    /// Size the file to `size` bytes so chunk workers can write at any offset.
    /// Disk exhaustion is reported here instead of by a worker mid-transfer.
    pub fn preallocate(&mut self, size: u64) -> Result<()> {
        match reserve_blocks(&self.file, size) {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) if e.raw_os_error() == Some(ENOSPC) => {
                return Err(e).with_context(|| {
                    format!("no space for {} bytes at {}", size, self.temp_path.display())
                });
            }
            Err(e) => tracing::debug!(error = %e, "block reservation failed, extending with set_len"),
        }
        self.file
            .set_len(size)
            .with_context(|| format!("extend {} to {} bytes", self.temp_path.display(), size))
    }

    /// Hand the file over as a shareable writer.
    pub fn build(self) -> StorageWriter {
        StorageWriter::from_file_and_path(self.file, self.temp_path)
    }
}

#[cfg(unix)]
const ENOSPC: i32 = libc::ENOSPC;
#[cfg(not(unix))]
const ENOSPC: i32 = -1;

/// Reserve real disk blocks. `Ok(false)` means the platform cannot.
#[cfg(unix)]
fn reserve_blocks(file: &File, size: u64) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;
    let r = unsafe { libc::posix_fallocate(file.as_raw_fd(), 0, size as libc::off_t) };
    match r {
        0 => Ok(true),
        libc::EINVAL | libc::EOPNOTSUPP => Ok(false),
        errno => Err(io::Error::from_raw_os_error(errno)),
    }
}

#[cfg(not(unix))]
fn reserve_blocks(_file: &File, _size: u64) -> io::Result<bool> {
    Ok(false)
}

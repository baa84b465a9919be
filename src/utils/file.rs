//! Byte sources for the parse driver.

use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};

/// A helper trait for things that implement both `Read` and `Seek`.
pub trait SeekableRead: Seek + Read {}
impl<T> SeekableRead for T where T: Seek + Read {}

/// Indicates something that can be *reopened*. Importantly, reopening is
/// independent with respect to seeks and reads on the original object.
pub trait Reopen: Sized {
    fn reopen(&self) -> io::Result<Self>;
}

/// A file that remembers its path so it can be reopened.
pub struct ReopenableFile {
    pub path: PathBuf,
    pub file: File,
}

impl ReopenableFile {
    pub fn open(path: impl AsRef<Path>) -> io::Result<ReopenableFile> {
        Ok(ReopenableFile {
            path: path.as_ref().to_owned(),
            file: File::open(path)?,
        })
    }
}

impl Reopen for ReopenableFile {
    fn reopen(&self) -> io::Result<ReopenableFile> {
        Ok(ReopenableFile {
            path: self.path.clone(),
            file: File::open(&self.path)?,
        })
    }
}

impl Seek for ReopenableFile {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl Read for ReopenableFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.file.read_exact(buf)
    }
}

//! Capture of the guest serial console to a file.

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Open serial-log file. Dropping it closes the file silently;
/// [`ConsoleSink::close`] reports flush errors.
pub struct ConsoleSink {
    path: PathBuf,
    file: File,
    bytes_written: u64,
}

impl ConsoleSink {
    /// Create or truncate the log file.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            file,
            bytes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Append raw console bytes.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    /// Flush and close the file.
    pub fn close(mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }
}

impl fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleSink")
            .field("path", &self.path)
            .field("bytes_written", &self.bytes_written)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir().join(format!("vphone-serial-{}.log", Uuid::new_v4()))
    }

    #[test]
    fn test_create_truncates() {
        let path = scratch_path();
        std::fs::write(&path, b"stale output from a previous run").unwrap();

        let sink = ConsoleSink::create(&path).unwrap();
        sink.close().unwrap();

        assert!(std::fs::read(&path).unwrap().is_empty());
    }

    #[test]
    fn test_write_appends_raw_bytes() {
        let path = scratch_path();
        let mut sink = ConsoleSink::create(&path).unwrap();

        sink.write(b"iBoot for vresearch101\r\n").unwrap();
        sink.write(&[0x1b, b'[', b'0', b'm']).unwrap();
        assert_eq!(sink.bytes_written(), 28);
        sink.close().unwrap();

        let contents = std::fs::read(&path).unwrap();
        assert!(contents.starts_with(b"iBoot for vresearch101\r\n"));
        assert_eq!(contents.len(), 28);
    }
}

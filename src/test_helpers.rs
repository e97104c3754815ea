//! Test utilities for creating temporary log files and simulating a writer.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct TempLogFile {
    path: PathBuf,
    temp_dir: tempfile::TempDir,
}

impl TempLogFile {
    /// Create a new, empty temporary log file for testing
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("test.log");

        File::create(&path)?;

        Ok(Self { path, temp_dir })
    }

    /// Create a temporary log file with initial content
    pub fn with_content(content: &[u8]) -> std::io::Result<Self> {
        let temp_file = Self::new()?;
        temp_file.append(content)?;
        Ok(temp_file)
    }

    /// Append raw bytes, the way a logging process would
    pub fn append(&self, content: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(content)?;
        file.flush()?;
        Ok(())
    }

    pub fn remove(&self) -> std::io::Result<()> {
        std::fs::remove_file(&self.path)
    }

    /// Rename the file next to itself (simulate log rotation)
    pub fn rotate(&self, new_name: &str) -> std::io::Result<PathBuf> {
        let target = self.sibling(new_name);
        std::fs::rename(&self.path, &target)?;
        Ok(target)
    }

    /// Path of another file in the same directory
    pub fn sibling(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_log_file_creation() {
        let temp_file = TempLogFile::new().unwrap();
        assert!(temp_file.path().exists());
        assert_eq!(std::fs::metadata(temp_file.path()).unwrap().len(), 0);
    }

    #[test]
    fn test_append_is_byte_exact() {
        let temp_file = TempLogFile::with_content(b"hello").unwrap();
        temp_file.append(b" world").unwrap();

        let content = std::fs::read(temp_file.path()).unwrap();
        assert_eq!(content, b"hello world");
    }

    #[test]
    fn test_rotate_and_remove() {
        let temp_file = TempLogFile::with_content(b"old").unwrap();
        let rotated = temp_file.rotate("test.log.1").unwrap();

        assert!(!temp_file.path().exists());
        assert_eq!(std::fs::read(&rotated).unwrap(), b"old");

        std::fs::write(temp_file.path(), b"").unwrap();
        temp_file.remove().unwrap();
        assert!(!temp_file.path().exists());
    }
}

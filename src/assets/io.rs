use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use crate::errors::{AnimError, Result};

/// Read-only file system used to resolve clip files.
///
/// All content is static and resolved once at load time, so the interface is
/// synchronous.
pub trait ReadOnlyFileSystem {
    fn exists(&self, path: &str) -> bool;

    /// Opens a file for reading. Missing files yield [`AnimError::FileNotFound`].
    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>>;
}

/// Local directory reader
#[derive(Debug, Clone)]
pub struct DirFileSystem {
    root_path: PathBuf,
}

impl DirFileSystem {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let root_path = if path.is_file() {
            path.parent().unwrap_or(Path::new(".")).to_path_buf()
        } else {
            path.to_path_buf()
        };
        Self { root_path }
    }

    #[inline]
    #[must_use]
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }
}

impl ReadOnlyFileSystem for DirFileSystem {
    fn exists(&self, path: &str) -> bool {
        self.root_path.join(path).is_file()
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>> {
        let full = self.root_path.join(path);
        match std::fs::File::open(&full) {
            Ok(file) => Ok(Box::new(std::io::BufReader::new(file))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(AnimError::FileNotFound(full.display().to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory file system, keyed by path.
///
/// Used by tools that generate clips on the fly and by tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: FxHashMap<String, Vec<u8>>,
}

impl MemoryFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, data: Vec<u8>) {
        self.files.insert(path.into(), data);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl ReadOnlyFileSystem for MemoryFileSystem {
    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>> {
        let data = self
            .files
            .get(path)
            .ok_or_else(|| AnimError::FileNotFound(path.to_string()))?;
        Ok(Box::new(Cursor::new(data.as_slice())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_fs_open_and_missing() {
        let mut fs = MemoryFileSystem::new();
        fs.insert("a.anim", vec![1, 2, 3]);

        assert!(fs.exists("a.anim"));
        assert!(!fs.exists("b.anim"));

        let mut buf = Vec::new();
        fs.open("a.anim").unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, vec![1, 2, 3]);

        assert!(matches!(fs.open("b.anim"), Err(AnimError::FileNotFound(_))));
    }

    #[test]
    fn test_dir_fs_missing_file() {
        let fs = DirFileSystem::new(std::env::temp_dir());
        let name = "skelblend-definitely-missing-file.anim";
        assert!(!fs.exists(name));
        assert!(matches!(fs.open(name), Err(AnimError::FileNotFound(_))));
    }
}

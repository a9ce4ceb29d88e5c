//! # Host media
//!
//! String key-value media that back the `local` and `session` channels.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use super::errors::{StorageError, StorageResult};

/// A host key-value medium. Any failure may be a quota or availability
/// problem.
pub trait KeyValueMedium: Send + Sync + std::fmt::Debug {
    /// Read the value at `key`
    fn get_item(&self, key: &str) -> StorageResult<Option<String>>;

    /// Write `value` at `key`
    fn set_item(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Delete `key`; deleting a missing key is not an error
    fn remove_item(&self, key: &str) -> StorageResult<()>;

    /// Delete every key
    fn clear(&self) -> StorageResult<()>;

    /// Every stored key
    fn keys(&self) -> StorageResult<Vec<String>>;
}

/// Durable medium: one file per key under a root directory
#[derive(Debug)]
pub struct FileMedium {
    root: PathBuf,
}

impl FileMedium {
    /// Create a medium rooted at `root`. The directory is created on first
    /// write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    // keys are arbitrary strings, file names are not
    fn full_path(&self, key: &str) -> PathBuf {
        self.root.join(URL_SAFE_NO_PAD.encode(key.as_bytes()))
    }
}

impl KeyValueMedium for FileMedium {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        match fs::read_to_string(self.full_path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.full_path(key), value)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        match fs::remove_file(self.full_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> StorageResult<()> {
        for key in self.keys()? {
            self.remove_item(&key)?;
        }
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Ok(bytes) = URL_SAFE_NO_PAD.decode(name.as_bytes()) else {
                continue;
            };
            if let Ok(key) = String::from_utf8(bytes) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Process-lifetime medium, the per-session store
#[derive(Debug, Default)]
pub struct VolatileMedium {
    items: RwLock<HashMap<String, String>>,
}

impl VolatileMedium {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueMedium for VolatileMedium {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        let items = self.items.read().map_err(|_| StorageError::poisoned())?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut items = self.items.write().map_err(|_| StorageError::poisoned())?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        let mut items = self.items.write().map_err(|_| StorageError::poisoned())?;
        items.remove(key);
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        let mut items = self.items.write().map_err(|_| StorageError::poisoned())?;
        items.clear();
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let items = self.items.read().map_err(|_| StorageError::poisoned())?;
        let mut keys: Vec<String> = items.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_write_read() {
        let temp = TempDir::new().unwrap();
        let medium = FileMedium::new(temp.path());

        medium.set_item("users", "[1,2]").unwrap();
        assert_eq!(medium.get_item("users").unwrap(), Some("[1,2]".to_string()));
        assert_eq!(medium.get_item("missing").unwrap(), None);
    }

    #[test]
    fn test_file_keys_survive_odd_names() {
        let temp = TempDir::new().unwrap();
        let medium = FileMedium::new(temp.path().join("nested"));

        medium.set_item("a/b c", "1").unwrap();
        medium.set_item("syme.fresh", "{}").unwrap();
        assert_eq!(
            medium.keys().unwrap(),
            vec!["a/b c".to_string(), "syme.fresh".to_string()]
        );
    }

    #[test]
    fn test_file_remove_and_clear() {
        let temp = TempDir::new().unwrap();
        let medium = FileMedium::new(temp.path());

        medium.set_item("a", "1").unwrap();
        medium.set_item("b", "2").unwrap();
        medium.remove_item("a").unwrap();
        medium.remove_item("a").unwrap();
        assert_eq!(medium.keys().unwrap(), vec!["b".to_string()]);

        medium.clear().unwrap();
        assert!(medium.keys().unwrap().is_empty());
    }

    #[test]
    fn test_volatile_roundtrip() {
        let medium = VolatileMedium::new();
        medium.set_item("k", "v").unwrap();
        assert_eq!(medium.get_item("k").unwrap(), Some("v".to_string()));
        medium.clear().unwrap();
        assert_eq!(medium.get_item("k").unwrap(), None);
    }
}

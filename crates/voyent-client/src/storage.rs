//! Pluggable persistent storage.
//!
//! The SDK never touches the platform directly; every read and write goes
//! through a [`StorageBackend`]:
//! - [`FileBackend`]: one file per key in the platform config directory:
//!   - Linux: `~/.config/voyent/`
//!   - macOS: `~/Library/Application Support/voyent/`
//!   - Windows: `%APPDATA%\voyent\`
//! - [`MemoryBackend`]: backs tests and short-lived embedders.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// String key-value storage with no structure imposed on values.
pub trait StorageBackend: Send + Sync {
    /// Returns `None` if the key doesn't exist or can't be read.
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    fn keys(&self) -> Vec<String>;
}

/// In-memory storage.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }

    fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// File-per-key storage under the platform config directory.
pub struct FileBackend {
    dir: Option<PathBuf>,
}

impl FileBackend {
    pub fn new() -> Self {
        let dir = dirs::config_dir().map(|d| d.join("voyent"));
        if let Some(dir) = &dir {
            if !dir.exists() {
                let _ = std::fs::create_dir_all(dir);
            }
        }
        Self { dir }
    }

    /// Storage rooted at an explicit directory.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if !dir.exists() {
            let _ = std::fs::create_dir_all(&dir);
        }
        Self { dir: Some(dir) }
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        Some(dir.join(format!("{safe_key}.kv")))
    }
}

impl Default for FileBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.path_for(key)?;
        std::fs::read_to_string(path).ok()
    }

    fn set(&self, key: &str, value: &str) {
        if let Some(path) = self.path_for(key) {
            let _ = std::fs::write(path, value);
        }
    }

    fn remove(&self, key: &str) {
        if let Some(path) = self.path_for(key) {
            let _ = std::fs::remove_file(path);
        }
    }

    fn keys(&self) -> Vec<String> {
        let Some(dir) = self.dir.as_ref() else {
            return Vec::new();
        };
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().into_string().ok()?;
                name.strip_suffix(".kv").map(str::to_string)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_roundtrip() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("k"), None);

        backend.set("k", "v");
        assert_eq!(backend.get("k").as_deref(), Some("v"));
        assert_eq!(backend.keys(), vec!["k".to_string()]);

        backend.remove("k");
        assert_eq!(backend.get("k"), None);
        assert!(backend.keys().is_empty());
    }

    #[test]
    fn file_backend_sanitizes_keys() {
        let backend = FileBackend { dir: Some(PathBuf::from("/tmp/voyent-test")) };
        let path = backend.path_for("a/b:c").unwrap();
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "a_b_c.kv");
    }
}

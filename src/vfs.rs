//! Virtual file system.
//!
//! Files registered in memory take priority over files on disk. Lookups that miss the
//! in-memory table fall back to reading from the base directory. The engine's file loader
//! goes through the [`FileProvider`] trait, so it never touches the VFS lock for longer than a
//! single lookup.

pub mod mime;

use crate::errors::BridgeError;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

/// File access used by the engine to resolve `file:///` URLs and page assets.
pub trait FileProvider: Send + Sync {
    fn exists(&self, path: &str) -> bool;

    /// Full file contents, or `None` when the file is not found.
    fn open(&self, path: &str) -> Option<Arc<[u8]>>;

    fn mime_type(&self, path: &str) -> &'static str {
        mime::mime_for(&normalize(path))
    }

    fn charset(&self, _path: &str) -> &'static str {
        "utf-8"
    }
}

/// Where a lookup was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsSource {
    Memory,
    Disk,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsAccess {
    pub path: String,
    pub source: VfsSource,
}

/// Normalizes a virtual path: strips `file:///`, converts backslashes, strips leading slashes.
pub fn normalize(path: &str) -> String {
    let stripped = path.strip_prefix("file:///").unwrap_or(path);
    stripped.replace('\\', "/").trim_start_matches('/').to_owned()
}

#[derive(Debug)]
pub struct Vfs {
    entries: RwLock<HashMap<String, Arc<[u8]>>>,
    base_dir: PathBuf,
    capacity: usize,
    access_log: Option<Mutex<Vec<VfsAccess>>>,
}

impl Vfs {
    pub fn new<P: Into<PathBuf>>(base_dir: P, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            base_dir: base_dir.into(),
            capacity,
            access_log: None,
        }
    }

    /// Keeps a record of every lookup, see [`Vfs::access_log`].
    pub fn with_access_log(mut self) -> Self {
        self.access_log = Some(Mutex::new(Vec::new()));
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Registers (or replaces) a file. The bytes are copied.
    pub fn register(&self, path: &str, bytes: &[u8]) -> Result<(), BridgeError> {
        let key = normalize(path);
        if key.is_empty() {
            return Err(BridgeError::InvalidArgument("empty VFS path".into()));
        }

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            log::warn!("vfs: cannot register {key}, table full ({} entries)", self.capacity);
            return Err(BridgeError::VfsFull(self.capacity));
        }
        log::debug!("vfs: registered {key} ({} bytes)", bytes.len());
        entries.insert(key, Arc::from(bytes));
        Ok(())
    }

    /// Registers every file below `dir`, keyed by its path relative to `dir`.
    /// Returns the number of registered files.
    pub fn register_dir(&self, dir: &Path) -> Result<usize, BridgeError> {
        let mut count = 0;
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            for entry in std::fs::read_dir(&current)? {
                let entry = entry?;
                let path = entry.path();
                if entry.file_type()?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let rel = path
                    .strip_prefix(dir)
                    .map_err(|_| BridgeError::InvalidArgument(path.display().to_string()))?;
                let bytes = std::fs::read(&path)?;
                self.register(&rel.to_string_lossy(), &bytes)?;
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn exists(&self, path: &str) -> bool {
        let key = normalize(path);
        if self.read_entries().contains_key(&key) {
            return true;
        }
        self.disk_path(&key).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Looks up `path` in memory first, then on disk below the base directory.
    pub fn open(&self, path: &str) -> Option<Arc<[u8]>> {
        let key = normalize(path);

        if let Some(bytes) = self.read_entries().get(&key).cloned() {
            self.record(&key, VfsSource::Memory);
            return Some(bytes);
        }

        let from_disk = self
            .disk_path(&key)
            .and_then(|p| std::fs::read(p).ok())
            .map(Arc::<[u8]>::from);

        match from_disk {
            Some(bytes) => {
                self.record(&key, VfsSource::Disk);
                Some(bytes)
            }
            None => {
                log::debug!("vfs: {key} not found");
                self.record(&key, VfsSource::Missing);
                None
            }
        }
    }

    pub fn mime_type(&self, path: &str) -> &'static str {
        mime::mime_for(&normalize(path))
    }

    /// Drops every registered file. Disk fallback is unaffected.
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        log::debug!("vfs: clearing {} entries", entries.len());
        entries.clear();
    }

    pub fn count(&self) -> usize {
        self.read_entries().len()
    }

    /// Lookups recorded so far. Empty unless the access log is enabled.
    pub fn access_log(&self) -> Vec<VfsAccess> {
        match &self.access_log {
            Some(log) => log.lock().unwrap_or_else(|e| e.into_inner()).clone(),
            None => Vec::new(),
        }
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<[u8]>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, path: &str, source: VfsSource) {
        if let Some(log) = &self.access_log {
            log.lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(VfsAccess { path: path.to_owned(), source });
        }
    }

    /// Disk location for a normalized key. Keys that would escape the base directory are refused.
    fn disk_path(&self, key: &str) -> Option<PathBuf> {
        if key.is_empty() {
            return None;
        }
        let rel = Path::new(key);
        if !rel.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir)) {
            log::warn!("vfs: refusing disk lookup outside base dir: {key}");
            return None;
        }
        Some(self.base_dir.join(rel))
    }
}

impl FileProvider for Vfs {
    fn exists(&self, path: &str) -> bool {
        Vfs::exists(self, path)
    }

    fn open(&self, path: &str) -> Option<Arc<[u8]>> {
        Vfs::open(self, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_paths() {
        assert_eq!(normalize("file:///ui/index.html"), "ui/index.html");
        assert_eq!(normalize("\\ui\\img\\a.png"), "ui/img/a.png");
        assert_eq!(normalize("///x.css"), "x.css");
        assert_eq!(normalize("plain.js"), "plain.js");
    }

    #[test]
    fn register_copies_and_overwrites() {
        let vfs = Vfs::new("/nonexistent", 8);
        let mut buf = b"v1".to_vec();
        vfs.register("/a.txt", &buf).unwrap();
        buf[0] = b'X';
        assert_eq!(&*vfs.open("a.txt").unwrap(), b"v1");

        vfs.register("file:///a.txt", b"v2").unwrap();
        assert_eq!(vfs.count(), 1);
        assert_eq!(&*vfs.open("\\a.txt").unwrap(), b"v2");
    }

    #[test]
    fn register_beyond_capacity_fails() {
        let vfs = Vfs::new("/nonexistent", 2);
        vfs.register("a", b"1").unwrap();
        vfs.register("b", b"2").unwrap();
        assert!(matches!(vfs.register("c", b"3"), Err(BridgeError::VfsFull(2))));
        // Overwriting an existing key is still allowed
        vfs.register("a", b"9").unwrap();
        assert_eq!(vfs.count(), 2);
    }

    #[test]
    fn memory_wins_over_disk_and_clear_keeps_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.html"), b"disk").unwrap();

        let vfs = Vfs::new(dir.path(), 16).with_access_log();
        assert_eq!(&*vfs.open("page.html").unwrap(), b"disk");

        vfs.register("page.html", b"memory").unwrap();
        assert_eq!(&*vfs.open("file:///page.html").unwrap(), b"memory");

        vfs.clear();
        assert_eq!(vfs.count(), 0);
        assert!(vfs.exists("page.html"));
        assert_eq!(&*vfs.open("page.html").unwrap(), b"disk");

        let sources: Vec<_> = vfs.access_log().into_iter().map(|a| a.source).collect();
        assert_eq!(sources, vec![VfsSource::Disk, VfsSource::Memory, VfsSource::Disk]);
    }

    #[test]
    fn missing_files_are_not_errors() {
        let dir = tempfile::tempdir().unwrap();
        let vfs = Vfs::new(dir.path(), 4);
        assert!(!vfs.exists("nope.css"));
        assert!(vfs.open("nope.css").is_none());
        assert!(vfs.open("").is_none());
    }

    #[test]
    fn disk_lookup_cannot_escape_base_dir() {
        let outer = tempfile::tempdir().unwrap();
        let base = outer.path().join("base");
        std::fs::create_dir(&base).unwrap();
        std::fs::write(outer.path().join("secret.txt"), b"s").unwrap();

        let vfs = Vfs::new(&base, 4);
        assert!(vfs.open("../secret.txt").is_none());
        assert!(!vfs.exists("../secret.txt"));
    }

    #[test]
    fn register_dir_walks_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("css")).unwrap();
        std::fs::write(dir.path().join("main.html"), b"<html>").unwrap();
        std::fs::write(dir.path().join("css/site.css"), b"body{}").unwrap();

        let vfs = Vfs::new("/nonexistent", 16);
        assert_eq!(vfs.register_dir(dir.path()).unwrap(), 2);
        assert_eq!(&*vfs.open("css/site.css").unwrap(), b"body{}");
        assert_eq!(vfs.mime_type("css/site.css"), "text/css");
    }
}

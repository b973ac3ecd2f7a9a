// src/watch/hash.rs

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::{debug, info};

use crate::fs::FileSystem;

/// Relative path (from the project root) to the fingerprint file.
///
/// The effective path on disk is `<root>/.assetwatch/hashes`.
pub const HASH_FILE_PATH: &str = ".assetwatch/hashes";

fn hash_file_path(root: &Path) -> PathBuf {
    root.join(HASH_FILE_PATH)
}

/// Compute the blake3 hash of a single file.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut reader = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Compute a deterministic hash over the paths and contents of `paths`.
///
/// Order of `paths` does not matter; they are sorted before hashing. Paths
/// take part in the hash so that renaming an input changes the fingerprint.
pub fn compute_hash_for_paths(fs: &dyn FileSystem, paths: &[PathBuf]) -> Result<String> {
    let mut hasher = Hasher::new();

    let mut sorted: Vec<&PathBuf> = paths.iter().collect();
    sorted.sort();

    for path in sorted {
        if fs.is_file(path) {
            let file_hash = compute_file_hash(fs, path)?;
            hasher.update(path.to_string_lossy().as_bytes());
            hasher.update(file_hash.as_bytes());
        }
    }

    let hash = hasher.finalize().to_hex().to_string();
    debug!(hash = %hash, "computed aggregate hash");
    Ok(hash)
}

/// Abstract storage for per-task input fingerprints.
pub trait HashStore: Send + Sync {
    fn load(&self, task: &str) -> Result<Option<String>>;
    fn save(&mut self, task: &str, hash: &str) -> Result<()>;
    /// Remove hashes for tasks that are not in the `active_tasks` list.
    fn prune(&mut self, active_tasks: &[&str]) -> Result<()>;
}

/// Stores hashes in `<root>/.assetwatch/hashes`, one `name hash` per line.
pub struct FileHashStore {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FileHashStore {
    pub fn new(root: PathBuf, fs: Arc<dyn FileSystem>) -> Self {
        Self { root, fs }
    }

    fn load_all(&self) -> Result<BTreeMap<String, String>> {
        let path = hash_file_path(&self.root);
        if !self.fs.exists(&path) {
            return Ok(BTreeMap::new());
        }

        let contents = self
            .fs
            .read_to_string(&path)
            .with_context(|| format!("reading hash file at {:?}", path))?;

        let mut map = BTreeMap::new();
        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some((name, hash)) = trimmed.split_once(char::is_whitespace) {
                map.insert(name.to_string(), hash.trim().to_string());
            }
        }
        Ok(map)
    }

    fn save_all(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let path = hash_file_path(&self.root);
        let mut out = String::new();
        for (name, hash) in map.iter() {
            out.push_str(name);
            out.push(' ');
            out.push_str(hash);
            out.push('\n');
        }
        self.fs
            .write(&path, out.as_bytes())
            .with_context(|| format!("writing hash file at {:?}", path))
    }
}

impl HashStore for FileHashStore {
    fn load(&self, task: &str) -> Result<Option<String>> {
        Ok(self.load_all()?.get(task).cloned())
    }

    fn save(&mut self, task: &str, hash: &str) -> Result<()> {
        let mut map = self.load_all()?;
        map.insert(task.to_string(), hash.to_string());
        self.save_all(&map)?;
        debug!(task = %task, hash = %hash, "stored task hash (file)");
        Ok(())
    }

    fn prune(&mut self, active_tasks: &[&str]) -> Result<()> {
        let mut map = self.load_all()?;
        let initial_len = map.len();
        map.retain(|k, _| active_tasks.contains(&k.as_str()));

        if map.len() < initial_len {
            self.save_all(&map)?;
            info!(
                removed = initial_len - map.len(),
                "pruned stale task hashes (file)"
            );
        }
        Ok(())
    }
}

/// Stores hashes in memory only.
#[derive(Default)]
pub struct MemoryHashStore {
    map: BTreeMap<String, String>,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HashStore for MemoryHashStore {
    fn load(&self, task: &str) -> Result<Option<String>> {
        Ok(self.map.get(task).cloned())
    }

    fn save(&mut self, task: &str, hash: &str) -> Result<()> {
        self.map.insert(task.to_string(), hash.to_string());
        debug!(task = %task, hash = %hash, "stored task hash (memory)");
        Ok(())
    }

    fn prune(&mut self, active_tasks: &[&str]) -> Result<()> {
        let initial_len = self.map.len();
        self.map.retain(|k, _| active_tasks.contains(&k.as_str()));
        if self.map.len() < initial_len {
            info!(
                removed = initial_len - self.map.len(),
                "pruned stale task hashes (memory)"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn hash_of_known_content() {
        let fs = MockFileSystem::new();
        fs.add_file("test.txt", b"hello world");

        let hash = compute_file_hash(&fs, Path::new("test.txt")).unwrap();
        // blake3 hash of "hello world"
        assert_eq!(hash, "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24");
    }

    #[test]
    fn aggregate_hash_ignores_order() {
        let fs = MockFileSystem::new();
        fs.add_file("./a.css", b"a{}");
        fs.add_file("./b.css", b"b{}");

        let forward = compute_hash_for_paths(&fs, &["./a.css".into(), "./b.css".into()]).unwrap();
        let backward = compute_hash_for_paths(&fs, &["./b.css".into(), "./a.css".into()]).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn file_store_round_trips_and_prunes() {
        let fs: Arc<dyn FileSystem> = Arc::new(MockFileSystem::new());
        let mut store = FileHashStore::new(PathBuf::from("."), Arc::clone(&fs));

        store.save("styles", "abc").unwrap();
        store.save("scripts", "def").unwrap();
        store.prune(&["styles"]).unwrap();

        let reopened = FileHashStore::new(PathBuf::from("."), fs);
        assert_eq!(reopened.load("styles").unwrap().as_deref(), Some("abc"));
        assert_eq!(reopened.load("scripts").unwrap(), None);
    }
}

//! Object storage abstraction and artifact naming.
//!
//! Paths are `/`-separated keys such as `filestore/AAPL.csv`. The first
//! segment is the container.

use crate::error::{AnalysisError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Prefix added to the file name of a stored insight summary.
pub const SUMMARY_PREFIX: &str = "analysis_";

/// Name used when an upload carries no usable file name.
pub const DEFAULT_UPLOAD_NAME: &str = "uploaded_file";

/// Minimal blob store used by the processing shim.
pub trait ObjectStore: Send + Sync {
    /// Read the full contents at `path`.
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Create or overwrite `path`.
    fn write(&self, path: &str, data: &[u8], content_type: &str) -> Result<()>;

    /// Paths directly or transitively under `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove `path`. Removing a missing object is not an error.
    fn delete(&self, path: &str) -> Result<()>;
}

/// Store backed by a local directory; keys map to relative file paths.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if key.is_empty() || escapes {
            return Err(AnalysisError::Storage(format!("invalid object path '{}'", key)));
        }
        Ok(self.root.join(relative))
    }

    fn collect(&self, dir: &Path, out: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.collect(&path, out)?;
            } else if let Ok(rel) = path.strip_prefix(&self.root) {
                let key: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                out.push(key.join("/"));
            }
        }
        Ok(())
    }
}

impl ObjectStore for FsStore {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        fs::read(&full).map_err(|e| {
            AnalysisError::Storage(format!("failed to read '{}': {}", path, e))
        })
    }

    fn write(&self, path: &str, data: &[u8], content_type: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, data)?;
        debug!("Wrote {} ({} bytes, {})", path, data.len(), content_type);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.resolve(prefix)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        self.collect(&dir, &mut keys)?;
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full) {
            Ok(()) => {
                debug!("Deleted {}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AnalysisError::Storage(format!(
                "failed to delete '{}': {}",
                path, e
            ))),
        }
    }
}

/// A stored blob with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored object at `path`, if any.
    pub fn get(&self, path: &str) -> Option<StoredObject> {
        self.objects.lock().ok()?.get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryStore {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| AnalysisError::Storage("memory store lock poisoned".into()))?;
        objects
            .get(path)
            .map(|o| o.data.clone())
            .ok_or_else(|| AnalysisError::Storage(format!("object '{}' not found", path)))
    }

    fn write(&self, path: &str, data: &[u8], content_type: &str) -> Result<()> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| AnalysisError::Storage("memory store lock poisoned".into()))?;
        objects.insert(
            path.to_string(),
            StoredObject {
                data: data.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| AnalysisError::Storage("memory store lock poisoned".into()))?;
        let dir = format!("{}/", prefix.trim_end_matches('/'));
        Ok(objects
            .keys()
            .filter(|k| k.starts_with(&dir))
            .cloned()
            .collect())
    }

    fn delete(&self, path: &str) -> Result<()> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| AnalysisError::Storage("memory store lock poisoned".into()))?;
        objects.remove(path);
        Ok(())
    }
}

/// Split a key into its directory (with trailing `/`, possibly empty) and
/// file name.
fn split_key(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..=idx], &path[idx + 1..]),
        None => ("", path),
    }
}

/// Where the insight summary of `input` is stored:
/// `<dir>/<results_prefix>/analysis_<file name>`.
pub fn summary_path(input: &str, results_prefix: &str) -> String {
    let (dir, name) = split_key(input);
    format!("{}{}/{}{}", dir, results_prefix, SUMMARY_PREFIX, name)
}

/// Where the chart of `input` is stored: the summary directory, with the
/// source extension replaced by `extension`.
pub fn chart_path(input: &str, results_prefix: &str, extension: &str) -> String {
    let (dir, name) = split_key(input);
    let stem = match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    };
    format!("{}{}/{}.{}", dir, results_prefix, stem, extension)
}

/// Reduce an uploaded file name to a safe single path segment.
///
/// Directory parts are dropped, whitespace becomes `_`, and only ASCII
/// alphanumerics plus `.`, `-`, `_` survive. Leading dots and underscores
/// are stripped so the result is never hidden or empty-looking.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    cleaned.trim_start_matches(['.', '_']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_artifact_paths() {
        assert_eq!(summary_path("AAPL.csv", "results"), "results/analysis_AAPL.csv");
        assert_eq!(chart_path("AAPL.csv", "results", "png"), "results/AAPL.png");
        assert_eq!(
            summary_path("filestore/2024/msft.csv", "results"),
            "filestore/2024/results/analysis_msft.csv"
        );
        assert_eq!(
            chart_path("filestore/msft.data.csv", "results", "svg"),
            "filestore/results/msft.data.svg"
        );
        assert_eq!(chart_path("filestore/noext", "results", "png"), "filestore/results/noext.png");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My Prices.csv"), "My_Prices.csv");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\data\\aapl.csv"), "aapl.csv");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename("été.csv"), "t.csv");
        assert_eq!(sanitize_filename("../"), "");
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.write("filestore/a.csv", b"abc", "text/csv").unwrap();
        store.write("filestore/sub/b.csv", b"def", "text/csv").unwrap();
        store.write("other/c.csv", b"ghi", "text/csv").unwrap();

        assert_eq!(store.read("filestore/a.csv").unwrap(), b"abc");
        assert_eq!(
            store.list("filestore").unwrap(),
            vec!["filestore/a.csv", "filestore/sub/b.csv"]
        );
        assert_eq!(store.get("other/c.csv").unwrap().content_type, "text/csv");
        assert!(store.read("missing").is_err());

        store.delete("filestore/a.csv").unwrap();
        store.delete("filestore/a.csv").unwrap();
        assert!(store.get("filestore/a.csv").is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_fs_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path());

        store.write("filestore/a.csv", b"abc", "text/csv").unwrap();
        store.write("filestore/results/a.png", b"png", "image/png").unwrap();

        assert_eq!(store.read("filestore/a.csv").unwrap(), b"abc");
        assert_eq!(
            store.list("filestore").unwrap(),
            vec!["filestore/a.csv", "filestore/results/a.png"]
        );
        assert!(store.list("empty").unwrap().is_empty());

        store.delete("filestore/results/a.png").unwrap();
        store.delete("filestore/results/a.png").unwrap();
        assert_eq!(store.list("filestore").unwrap(), vec!["filestore/a.csv"]);
        assert!(store.delete("../outside.csv").is_err());
    }

    #[test]
    fn test_fs_store_rejects_escaping_paths() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path());
        assert!(store.write("../outside.csv", b"x", "text/csv").is_err());
        assert!(store.read("/etc/passwd").is_err());
        assert!(store.read("").is_err());
    }
}

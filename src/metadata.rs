//! Provenance of processed input files.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Metadata about one processed input blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Store path of the input.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// SHA256 checksum of the contents.
    pub checksum: String,
}

impl SourceMetadata {
    /// Describe input bytes read from `path`.
    pub fn from_bytes(path: impl Into<String>, data: &[u8]) -> Self {
        Self {
            path: path.into(),
            size: data.len() as u64,
            checksum: compute_hash(data),
        }
    }
}

/// Compute SHA256 hash of arbitrary bytes.
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    format!("{:x}", result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash() {
        let hash = compute_hash(b"hello world");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_source_metadata() {
        let meta = SourceMetadata::from_bytes("filestore/a.csv", b"abc");
        assert_eq!(meta.path, "filestore/a.csv");
        assert_eq!(meta.size, 3);
        assert_eq!(meta.checksum, compute_hash(b"abc"));
    }
}

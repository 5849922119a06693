//! JSON file cache for documents, annotations and merged records.
//!
//! Layout: `{root}/{partition}/{safe_id}.json`. A missing, empty or
//! unparseable file is a miss, never an error.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::AnnotationKind;

/// Where in the cache an entry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachePartition {
    /// Extracted [`crate::models::Document`]s.
    Documents,
    Annotation(AnnotationKind),
    /// Merged [`crate::models::AnnotatedPaper`]s.
    Records,
}

impl CachePartition {
    pub fn dir_name(&self) -> &'static str {
        match self {
            CachePartition::Documents => "documents",
            CachePartition::Annotation(kind) => kind.as_str(),
            CachePartition::Records => "records",
        }
    }
}

impl From<AnnotationKind> for CachePartition {
    fn from(kind: AnnotationKind) -> Self {
        CachePartition::Annotation(kind)
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Filesystem-safe form of a paper id (`2401.00001` -> `2401_00001`).
pub fn safe_id(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            '.' | '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Cache keyed by (partition, paper id).
#[derive(Debug, Clone)]
pub struct AnnotationCache {
    root: PathBuf,
}

impl AnnotationCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the entry for `id` in `partition`.
    pub fn path_for(&self, partition: impl Into<CachePartition>, id: &str) -> PathBuf {
        self.root
            .join(partition.into().dir_name())
            .join(format!("{}.json", safe_id(id)))
    }

    /// Read an entry. Missing or corrupt entries are a miss.
    pub async fn read<T: DeserializeOwned>(
        &self,
        partition: impl Into<CachePartition>,
        id: &str,
    ) -> Option<T> {
        let path = self.path_for(partition, id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Cache read failed for {}: {}", path.display(), e);
                }
                return None;
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            debug!("Empty cache entry {}", path.display());
            return None;
        }
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!("Cache hit {}", path.display());
                Some(value)
            }
            Err(e) => {
                warn!("Ignoring corrupt cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Write an entry atomically (temp file + rename). Last write wins.
    pub async fn write<T: Serialize>(
        &self,
        partition: impl Into<CachePartition>,
        id: &str,
        value: &T,
    ) -> Result<PathBuf, CacheError> {
        let path = self.path_for(partition, id);
        let json = serde_json::to_vec_pretty(value)?;

        let io_err = |path: &Path, source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(parent, e))?;
        }

        let tmp = path.with_extension(format!(
            "json.tmp-{}-{}",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(&path, e));
        }

        debug!("Cached {}", path.display());
        Ok(path)
    }

    /// Whether an entry file exists (it may still be unreadable).
    pub async fn contains(&self, partition: impl Into<CachePartition>, id: &str) -> bool {
        tokio::fs::try_exists(self.path_for(partition, id))
            .await
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, SectionTree};
    use tempfile::tempdir;

    #[test]
    fn test_safe_id() {
        assert_eq!(safe_id("2401.00001"), "2401_00001");
        assert_eq!(safe_id("cs/0112017v1"), "cs_0112017v1");
    }

    #[test]
    fn test_layout() {
        let cache = AnnotationCache::new("/data/cache");
        assert_eq!(
            cache.path_for(AnnotationKind::Keywords, "2401.00001"),
            PathBuf::from("/data/cache/keywords/2401_00001.json")
        );
        assert_eq!(
            cache.path_for(CachePartition::Documents, "2401.00001"),
            PathBuf::from("/data/cache/documents/2401_00001.json")
        );
    }

    #[tokio::test]
    async fn test_document_round_trip() {
        let dir = tempdir().unwrap();
        let cache = AnnotationCache::new(dir.path());

        let mut doc = Document::new("2401.00001", "Round Trip");
        doc.authors = vec!["A. Author".into()];
        doc.abstract_text = Some("Abstract.".into());
        let mut tree = SectionTree::new();
        let root = tree.push(None, "Intro", 2, vec!["Paragraph text here.".into()]);
        tree.push(Some(root), "Detail", 3, vec!["More paragraph text.".into()]);
        doc.set_sections(tree);

        cache
            .write(CachePartition::Documents, &doc.id, &doc)
            .await
            .unwrap();
        let back: Document = cache
            .read(CachePartition::Documents, "2401.00001")
            .await
            .unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.full_text(), doc.full_text());
    }

    #[tokio::test]
    async fn test_missing_empty_and_corrupt_are_misses() {
        let dir = tempdir().unwrap();
        let cache = AnnotationCache::new(dir.path());
        assert!(cache
            .read::<Document>(CachePartition::Documents, "nope")
            .await
            .is_none());

        let path = cache.path_for(AnnotationKind::Labels, "x");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "  \n").unwrap();
        assert!(cache
            .read::<serde_json::Value>(AnnotationKind::Labels, "x")
            .await
            .is_none());

        std::fs::write(&path, "{ truncated").unwrap();
        assert!(cache
            .read::<serde_json::Value>(AnnotationKind::Labels, "x")
            .await
            .is_none());
        assert!(cache.contains(AnnotationKind::Labels, "x").await);
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let cache = AnnotationCache::new(dir.path());
        cache
            .write(AnnotationKind::Keywords, "a.b", &serde_json::json!({"v": 1}))
            .await
            .unwrap();
        cache
            .write(AnnotationKind::Keywords, "a.b", &serde_json::json!({"v": 2}))
            .await
            .unwrap();
        let v: serde_json::Value = cache.read(AnnotationKind::Keywords, "a.b").await.unwrap();
        assert_eq!(v["v"], 2);
        let entries = std::fs::read_dir(dir.path().join("keywords")).unwrap().count();
        assert_eq!(entries, 1);
    }
}

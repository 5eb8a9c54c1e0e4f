//! Filesystem store: one JSON file per record under a root directory.
//!
//! ```text
//! <root>/
//!   documents/<id>.json          upserted atomically
//!   blobs/<id>.bin
//!   results/<id>/<result_id>.json
//!   results/<id>/index           one result id per line, insertion order
//!   audit/<id>.jsonl             append-only
//! ```
//!
//! Document and result files are written to a temporary file in the target
//! directory and then renamed over the destination, so a reader never sees
//! a half-written record.

use super::Store;
use crate::error::StoreError;
use crate::model::{AuditEntry, Document, ResultRecord};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const INDEX_FILE: &str = "index";

#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Identifiers become file names; anything that could escape the root is
/// refused.
fn checked_key(id: &str) -> Result<&str, StoreError> {
    let ok = !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(id)
    } else {
        Err(StoreError::Unavailable(format!("invalid record key '{id}'")))
    }
}

fn to_json<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serde {
        key: key.to_string(),
        source,
    })
}

fn from_json<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::Serde {
        key: key.to_string(),
        source,
    })
}

/// `Ok(None)` when the file does not exist.
async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Write `bytes` to `path` through a temp file in the same directory.
async fn write_atomic(path: PathBuf, bytes: Vec<u8>) -> Result<(), StoreError> {
    tokio::task::spawn_blocking(move || {
        let dir = path
            .parent()
            .ok_or_else(|| StoreError::Unavailable(format!("no parent for {}", path.display())))?;
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_err(dir, e))?;
        tmp.write_all(&bytes).map_err(|e| io_err(&path, e))?;
        tmp.as_file().sync_all().map_err(|e| io_err(&path, e))?;
        tmp.persist(&path).map_err(|e| io_err(&path, e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| StoreError::Unavailable(format!("write task failed: {e}")))?
}

/// Append one line to `path`, creating it and its directory when missing.
async fn append_line(path: &Path, mut line: Vec<u8>) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| io_err(dir, e))?;
    }
    line.push(b'\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| io_err(path, e))?;
    file.write_all(&line).await.map_err(|e| io_err(path, e))?;
    file.flush().await.map_err(|e| io_err(path, e))
}

impl FsStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for sub in ["documents", "blobs", "results", "audit"] {
            let dir = root.join(sub);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| io_err(&dir, e))?;
        }
        debug!("Opened store at {}", root.display());
        Ok(Self { root })
    }

    fn document_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join("documents").join(format!("{}.json", checked_key(id)?)))
    }

    fn blob_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join("blobs").join(format!("{}.bin", checked_key(id)?)))
    }

    fn results_dir(&self, id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join("results").join(checked_key(id)?))
    }

    fn audit_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join("audit").join(format!("{}.jsonl", checked_key(id)?)))
    }
}

#[async_trait]
impl Store for FsStore {
    async fn put_document(&self, doc: &Document) -> Result<(), StoreError> {
        let path = self.document_path(&doc.id)?;
        write_atomic(path, to_json(&doc.id, doc)?).await
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let Ok(path) = self.document_path(id) else {
            return Ok(None);
        };
        read_optional(&path)
            .await?
            .map(|bytes| from_json(id, &bytes))
            .transpose()
    }

    async fn list_documents(&self) -> Result<Vec<Document>, StoreError> {
        let dir = self.root.join("documents");
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| io_err(&dir, e))?;
        let mut docs = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(&dir, e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await.map_err(|e| io_err(&path, e))?;
            match from_json::<Document>(&path.display().to_string(), &bytes) {
                Ok(doc) => docs.push(doc),
                Err(e) => warn!("Skipping unreadable document record: {}", e),
            }
        }
        docs.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then_with(|| a.id.cmp(&b.id)));
        Ok(docs)
    }

    async fn put_blob(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        write_atomic(self.blob_path(id)?, bytes.to_vec()).await
    }

    async fn get_blob(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let Ok(path) = self.blob_path(id) else {
            return Ok(None);
        };
        read_optional(&path).await
    }

    async fn delete_blob(&self, id: &str) -> Result<(), StoreError> {
        let Ok(path) = self.blob_path(id) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    async fn insert_result(&self, record: &ResultRecord) -> Result<(), StoreError> {
        let dir = self.results_dir(&record.document_id)?;
        let key = checked_key(&record.result_id)?;
        let path = dir.join(format!("{key}.json"));
        if tokio::fs::try_exists(&path).await.map_err(|e| io_err(&path, e))? {
            return Err(StoreError::Unavailable(format!(
                "result '{}' already exists",
                record.result_id
            )));
        }
        write_atomic(path, to_json(key, record)?).await?;
        append_line(&dir.join(INDEX_FILE), key.as_bytes().to_vec()).await
    }

    async fn results_for(&self, id: &str) -> Result<Vec<ResultRecord>, StoreError> {
        let Ok(dir) = self.results_dir(id) else {
            return Ok(Vec::new());
        };
        let Some(index) = read_optional(&dir.join(INDEX_FILE)).await? else {
            return Ok(Vec::new());
        };
        let mut records = Vec::new();
        for result_id in String::from_utf8_lossy(&index).lines().filter(|l| !l.is_empty()) {
            let path = dir.join(format!("{result_id}.json"));
            let bytes = tokio::fs::read(&path).await.map_err(|e| io_err(&path, e))?;
            records.push(from_json(result_id, &bytes)?);
        }
        Ok(records)
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let path = self.audit_path(&entry.document_id)?;
        let line = serde_json::to_vec(entry).map_err(|source| StoreError::Serde {
            key: entry.id.clone(),
            source,
        })?;
        append_line(&path, line).await
    }

    async fn audit_trail(&self, id: &str) -> Result<Vec<AuditEntry>, StoreError> {
        let Ok(path) = self.audit_path(id) else {
            return Ok(Vec::new());
        };
        let Some(bytes) = read_optional(&path).await? else {
            return Ok(Vec::new());
        };
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| from_json(id, l.as_bytes()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;

    async fn store() -> (tempfile::TempDir, FsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn documents_upsert() {
        let (_dir, s) = store().await;
        contract::documents_upsert(&s).await;
    }

    #[tokio::test]
    async fn blobs_round_trip() {
        let (_dir, s) = store().await;
        contract::blobs_round_trip(&s).await;
    }

    #[tokio::test]
    async fn results_keep_insertion_order() {
        let (_dir, s) = store().await;
        contract::results_keep_insertion_order(&s).await;
    }

    #[tokio::test]
    async fn audit_keeps_write_order() {
        let (_dir, s) = store().await;
        contract::audit_keeps_write_order(&s).await;
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let doc = Document::new("deck.pptx", 3, crate::model::DocumentKind::Pptx);
        {
            let s = FsStore::open(dir.path()).await.unwrap();
            s.put_document(&doc).await.unwrap();
            s.insert_result(&contract::record(&doc.id, 1)).await.unwrap();
        }
        let s = FsStore::open(dir.path()).await.unwrap();
        assert_eq!(s.get_document(&doc.id).await.unwrap().unwrap().id, doc.id);
        assert_eq!(s.results_for(&doc.id).await.unwrap().len(), 1);
        assert!(dir.path().join("documents").join(format!("{}.json", doc.id)).exists());
    }

    #[tokio::test]
    async fn duplicate_result_is_refused() {
        let (_dir, s) = store().await;
        let r = contract::record("doc-1", 1);
        s.insert_result(&r).await.unwrap();
        assert!(s.insert_result(&r).await.is_err());
        assert_eq!(s.results_for("doc-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn path_like_keys_are_refused() {
        let (_dir, s) = store().await;
        assert!(s.put_blob("../escape", b"x").await.is_err());
        assert!(s.get_document("../../etc/passwd").await.unwrap().is_none());
        assert!(s.audit_trail("a/b").await.unwrap().is_empty());
    }
}

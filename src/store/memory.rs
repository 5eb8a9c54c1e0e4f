//! In-process store. Nothing survives the process; used by tests and
//! one-shot runs.

use super::Store;
use crate::error::StoreError;
use crate::model::{AuditEntry, Document, ResultRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, Document>>,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    results: RwLock<HashMap<String, Vec<ResultRecord>>>,
    audit: RwLock<HashMap<String, Vec<AuditEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put_document(&self, doc: &Document) -> Result<(), StoreError> {
        self.documents
            .write()
            .await
            .insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<Document>, StoreError> {
        let mut docs: Vec<Document> = self.documents.read().await.values().cloned().collect();
        docs.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then_with(|| a.id.cmp(&b.id)));
        Ok(docs)
    }

    async fn put_blob(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.blobs.write().await.insert(id.to_owned(), bytes.to_vec());
        Ok(())
    }

    async fn get_blob(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.read().await.get(id).cloned())
    }

    async fn delete_blob(&self, id: &str) -> Result<(), StoreError> {
        self.blobs.write().await.remove(id);
        Ok(())
    }

    async fn insert_result(&self, record: &ResultRecord) -> Result<(), StoreError> {
        self.results
            .write()
            .await
            .entry(record.document_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn results_for(&self, id: &str) -> Result<Vec<ResultRecord>, StoreError> {
        Ok(self.results.read().await.get(id).cloned().unwrap_or_default())
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.audit
            .write()
            .await
            .entry(entry.document_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn audit_trail(&self, id: &str) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.audit.read().await.get(id).cloned().unwrap_or_default())
    }
}

//! Persistence boundary.
//!
//! Everything the pipeline keeps lives behind [`Store`]: document records,
//! the uploaded bytes, result records and the audit trail. Every key is a
//! document identifier; a run only ever touches its own document's keys.

pub mod fs;
pub mod memory;

use crate::error::StoreError;
use crate::model::{AuditEntry, Document, ResultRecord};
use async_trait::async_trait;

pub use fs::FsStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or replace the document record.
    async fn put_document(&self, doc: &Document) -> Result<(), StoreError>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// All documents, oldest upload first.
    async fn list_documents(&self) -> Result<Vec<Document>, StoreError>;

    /// Original upload bytes.
    async fn put_blob(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError>;

    async fn get_blob(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove upload bytes. Removing a missing blob succeeds.
    async fn delete_blob(&self, id: &str) -> Result<(), StoreError>;

    /// Append a result. Existing results are never overwritten.
    async fn insert_result(&self, record: &ResultRecord) -> Result<(), StoreError>;

    /// Results for `id` in insertion order.
    async fn results_for(&self, id: &str) -> Result<Vec<ResultRecord>, StoreError>;

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError>;

    /// Audit entries for `id` in write order.
    async fn audit_trail(&self, id: &str) -> Result<Vec<AuditEntry>, StoreError>;
}

//! In-memory index engine, used as a test double for the tantivy engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::document::tree::{DocumentNode, DocumentTree};
use crate::engine::lock::{MemoryLock, MemoryLockManager};
use crate::engine::{
    DeleteQuery, EngineWriter, IndexDirectory, IndexSnapshot, Term, WRITE_LOCK_NAME,
};
use crate::error::{Result, SearchSyncError};

/// A point-in-time copy of an in-memory index.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    generation: u64,
    documents: Vec<DocumentNode>,
}

impl MemorySnapshot {
    pub fn documents(&self) -> &[DocumentNode] {
        &self.documents
    }
}

impl IndexSnapshot for MemorySnapshot {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn num_docs(&self) -> usize {
        self.documents.len()
    }

    fn count(&self, term: &Term) -> Result<usize> {
        Ok(self.documents.iter().filter(|d| term.matches(d)).count())
    }
}

#[derive(Debug, Default)]
struct DirectoryInner {
    name: String,
    lock_manager: MemoryLockManager,
    committed: RwLock<Arc<MemorySnapshot>>,
    commits: AtomicU64,
    merges: AtomicU64,
    writers_opened: AtomicU64,
}

/// An index kept entirely in memory.
///
/// Clones share the same index. Only one writer may be open at a time;
/// changes become visible to [`open_snapshot`](IndexDirectory::open_snapshot)
/// on commit.
#[derive(Debug, Clone)]
pub struct MemoryDirectory {
    inner: Arc<DirectoryInner>,
}

impl MemoryDirectory {
    pub fn new<S: Into<String>>(name: S) -> Self {
        MemoryDirectory {
            inner: Arc::new(DirectoryInner {
                name: name.into(),
                ..Default::default()
            }),
        }
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> u64 {
        self.inner.commits.load(Ordering::Acquire)
    }

    /// Number of forced merges.
    pub fn merge_count(&self) -> u64 {
        self.inner.merges.load(Ordering::Acquire)
    }

    /// Number of writers opened.
    pub fn writers_opened(&self) -> u64 {
        self.inner.writers_opened.load(Ordering::Acquire)
    }

    /// Committed documents.
    pub fn committed_documents(&self) -> Vec<DocumentNode> {
        self.inner.committed.read().documents.clone()
    }
}

impl IndexDirectory for MemoryDirectory {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn open_writer(&self) -> Result<Arc<dyn EngineWriter>> {
        let lock = self
            .inner
            .lock_manager
            .try_acquire(WRITE_LOCK_NAME)
            .ok_or_else(|| {
                SearchSyncError::lock(format!(
                    "Index '{}' is locked by another writer",
                    self.inner.name
                ))
            })?;

        let documents = self.inner.committed.read().documents.clone();
        self.inner.writers_opened.fetch_add(1, Ordering::AcqRel);
        debug!("Opened in-memory writer for index '{}'", self.inner.name);

        Ok(Arc::new(MemoryWriter {
            directory: Arc::clone(&self.inner),
            lock: Mutex::new(Some(lock)),
            state: Mutex::new(WriterState {
                documents,
                pending: 0,
            }),
            closed: AtomicBool::new(false),
        }))
    }

    fn open_snapshot(&self) -> Result<Arc<dyn IndexSnapshot>> {
        let snapshot: Arc<MemorySnapshot> = self.inner.committed.read().clone();
        Ok(snapshot)
    }

    fn is_locked(&self) -> bool {
        self.inner.lock_manager.is_held(WRITE_LOCK_NAME)
    }

    fn force_unlock(&self) -> Result<()> {
        self.inner.lock_manager.force_release(WRITE_LOCK_NAME);
        Ok(())
    }
}

#[derive(Debug)]
struct WriterState {
    documents: Vec<DocumentNode>,
    pending: usize,
}

/// Writer of a [`MemoryDirectory`].
#[derive(Debug)]
pub struct MemoryWriter {
    directory: Arc<DirectoryInner>,
    lock: Mutex<Option<MemoryLock>>,
    state: Mutex<WriterState>,
    closed: AtomicBool,
}

impl MemoryWriter {
    fn check_usable(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SearchSyncError::invalid_operation("Writer is closed"));
        }
        let lock = self.lock.lock();
        match lock.as_ref() {
            Some(lock) if lock.is_valid() => Ok(()),
            _ => Err(SearchSyncError::lock(format!(
                "Write lock of index '{}' was released",
                self.directory.name
            ))),
        }
    }

    fn publish(&self, state: &mut WriterState) {
        let mut committed = self.directory.committed.write();
        *committed = Arc::new(MemorySnapshot {
            generation: committed.generation + 1,
            documents: state.documents.clone(),
        });
        state.pending = 0;
        self.directory.commits.fetch_add(1, Ordering::AcqRel);
    }
}

impl EngineWriter for MemoryWriter {
    fn add_documents(&self, tree: DocumentTree) -> Result<()> {
        self.check_usable()?;
        let mut state = self.state.lock();
        state.documents.extend(tree.into_nodes());
        state.pending += 1;
        Ok(())
    }

    fn update_documents(&self, query: &DeleteQuery, tree: DocumentTree) -> Result<()> {
        self.check_usable()?;
        let mut state = self.state.lock();
        state.documents.retain(|d| !query.matches(d));
        state.documents.extend(tree.into_nodes());
        state.pending += 1;
        Ok(())
    }

    fn delete_documents(&self, query: &DeleteQuery) -> Result<()> {
        self.check_usable()?;
        let mut state = self.state.lock();
        state.documents.retain(|d| !query.matches(d));
        state.pending += 1;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.check_usable()?;
        let mut state = self.state.lock();
        self.publish(&mut state);
        Ok(())
    }

    fn force_merge(&self) -> Result<()> {
        self.check_usable()?;
        self.directory.merges.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn near_real_time_snapshot(&self) -> Result<Arc<dyn IndexSnapshot>> {
        self.check_usable()?;
        let state = self.state.lock();
        let generation = self.directory.committed.read().generation;
        Ok(Arc::new(MemorySnapshot {
            generation,
            documents: state.documents.clone(),
        }))
    }

    fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.check_usable()?;
        {
            let mut state = self.state.lock();
            if state.pending > 0 {
                self.publish(&mut state);
            }
        }
        self.closed.store(true, Ordering::Release);
        if let Some(mut lock) = self.lock.lock().take() {
            lock.release();
        }
        debug!("Closed in-memory writer for index '{}'", self.directory.name);
        Ok(())
    }

    fn pending_operations(&self) -> usize {
        self.state.lock().pending
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::DocumentTreeBuilder;
    use crate::document::codec::ValueType;
    use crate::schema::IndexSchema;

    fn tree(id: &str) -> DocumentTree {
        let schema = Arc::new(
            IndexSchema::builder("book")
                .field("title", ValueType::Text)
                .build()
                .unwrap(),
        );
        let mut builder = DocumentTreeBuilder::new(schema);
        let root = builder.root();
        builder.add_value(root, "title", "Rust").unwrap();
        builder.build(None, id, None)
    }

    #[test]
    fn test_changes_visible_after_commit() {
        let directory = MemoryDirectory::new("books");
        let writer = directory.open_writer().unwrap();
        writer.add_documents(tree("1")).unwrap();
        assert_eq!(writer.pending_operations(), 1);
        assert_eq!(directory.open_snapshot().unwrap().num_docs(), 0);
        assert_eq!(writer.near_real_time_snapshot().unwrap().num_docs(), 1);

        writer.commit().unwrap();
        let snapshot = directory.open_snapshot().unwrap();
        assert_eq!(snapshot.num_docs(), 1);
        assert_eq!(snapshot.generation(), 1);
        assert_eq!(directory.commit_count(), 1);
    }

    #[test]
    fn test_single_writer_and_close() {
        let directory = MemoryDirectory::new("books");
        let writer = directory.open_writer().unwrap();
        assert!(directory.is_locked());
        assert!(directory.open_writer().is_err());

        writer.add_documents(tree("1")).unwrap();
        writer.close().unwrap();
        assert!(writer.is_closed());
        assert!(!directory.is_locked());
        assert_eq!(directory.open_snapshot().unwrap().num_docs(), 1);
        assert!(writer.add_documents(tree("2")).is_err());

        let reopened = directory.open_writer().unwrap();
        reopened
            .update_documents(&DeleteQuery::entity("book", "1", None), tree("1"))
            .unwrap();
        reopened
            .delete_documents(&DeleteQuery::entity("book", "1", None))
            .unwrap();
        reopened.commit().unwrap();
        let snapshot = directory.open_snapshot().unwrap();
        assert_eq!(snapshot.count(&Term::new("__root_id", "1")).unwrap(), 0);
        assert_eq!(directory.writers_opened(), 2);
    }

    #[test]
    fn test_force_unlock_invalidates_writer() {
        let directory = MemoryDirectory::new("books");
        let writer = directory.open_writer().unwrap();
        directory.force_unlock().unwrap();
        assert!(!directory.is_locked());
        assert!(writer.add_documents(tree("1")).is_err());
        assert!(writer.close().is_err());

        let fresh = directory.open_writer().unwrap();
        fresh.force_merge().unwrap();
        assert_eq!(directory.merge_count(), 1);
    }
}

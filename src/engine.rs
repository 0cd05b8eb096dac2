//! The index engine seam.
//!
//! The backend never touches index files itself. Everything it needs from
//! the embedded engine goes through three traits:
//!
//! - [`IndexDirectory`]: one partition's index, guarded by a write lock.
//! - [`EngineWriter`]: the mutable write handle, shared by every worker of a batch.
//! - [`IndexSnapshot`]: a read-only, point-in-time view.
//!
//! [`TantivyDirectory`] implements them on an embedded tantivy index, in a
//! directory on disk or in RAM. [`MemoryDirectory`] keeps plain documents in
//! memory and serves as a test double.

mod lock;
pub mod memory;
pub mod tantivy_index;

use std::fmt::Debug;
use std::sync::Arc;

use crate::document::codec::EncodedValue;
use crate::document::tree::{DocumentNode, DocumentTree, metadata};
use crate::error::Result;

pub use memory::{MemoryDirectory, MemorySnapshot, MemoryWriter};
pub use tantivy_index::{TantivyDirectory, TantivySnapshot, TantivyWriter};

/// Name of the lock guarding a directory against concurrent writers.
pub const WRITE_LOCK_NAME: &str = "write.lock";

/// An exact `field = value` match.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub field: String,
    pub value: EncodedValue,
}

impl Term {
    pub fn new<F: Into<String>, V: Into<EncodedValue>>(field: F, value: V) -> Self {
        Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, document: &DocumentNode) -> bool {
        document.matches(&self.field, &self.value)
    }
}

/// Selects the documents a delete or update removes.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteQuery {
    /// Every document of the index.
    All,
    /// Documents matching every term.
    Terms(Vec<Term>),
}

impl DeleteQuery {
    /// Every document of an entity block, root and nested children.
    pub fn entity(entity_type: &str, id: &str, tenant_id: Option<&str>) -> Self {
        let mut terms = vec![
            Term::new(metadata::ROOT_ID, id),
            Term::new(metadata::ENTITY_TYPE, entity_type),
        ];
        if let Some(tenant_id) = tenant_id {
            terms.push(Term::new(metadata::TENANT_ID, tenant_id));
        }
        DeleteQuery::Terms(terms)
    }

    /// Every document of an entity type.
    pub fn entity_type(entity_type: &str, tenant_id: Option<&str>) -> Self {
        let mut terms = vec![Term::new(metadata::ENTITY_TYPE, entity_type)];
        if let Some(tenant_id) = tenant_id {
            terms.push(Term::new(metadata::TENANT_ID, tenant_id));
        }
        DeleteQuery::Terms(terms)
    }

    pub fn matches(&self, document: &DocumentNode) -> bool {
        match self {
            DeleteQuery::All => true,
            DeleteQuery::Terms(terms) => terms.iter().all(|term| term.matches(document)),
        }
    }
}

/// The mutable write handle of one index.
///
/// Implementations are called concurrently from the worker threads of a
/// batch and must synchronize internally.
pub trait EngineWriter: Send + Sync + Debug {
    /// Add the documents of one entity as a single block.
    fn add_documents(&self, tree: DocumentTree) -> Result<()>;

    /// Atomically delete the documents matching `query` and add `tree`.
    fn update_documents(&self, query: &DeleteQuery, tree: DocumentTree) -> Result<()>;

    /// Delete the documents matching `query`.
    fn delete_documents(&self, query: &DeleteQuery) -> Result<()>;

    /// Make every pending change durable and visible to new snapshots.
    fn commit(&self) -> Result<()>;

    /// Merge the index down to as few segments as possible.
    fn force_merge(&self) -> Result<()>;

    /// A snapshot including uncommitted changes.
    fn near_real_time_snapshot(&self) -> Result<Arc<dyn IndexSnapshot>>;

    /// Commit pending changes and release the write lock.
    fn close(&self) -> Result<()>;

    /// Number of changes since the last commit.
    fn pending_operations(&self) -> usize;

    fn is_closed(&self) -> bool;
}

/// One partition's index.
pub trait IndexDirectory: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Open a writer, taking the directory write lock.
    fn open_writer(&self) -> Result<Arc<dyn EngineWriter>>;

    /// A snapshot of the last committed state.
    fn open_snapshot(&self) -> Result<Arc<dyn IndexSnapshot>>;

    /// Whether the write lock is currently held.
    fn is_locked(&self) -> bool;

    /// Clear the write lock regardless of its holder.
    fn force_unlock(&self) -> Result<()>;
}

/// A read-only view of an index.
pub trait IndexSnapshot: Send + Sync + Debug {
    /// Commit generation the snapshot was taken from.
    fn generation(&self) -> u64;

    /// Number of live documents, nested children included.
    fn num_docs(&self) -> usize;

    /// Number of documents matching a term.
    fn count(&self, term: &Term) -> Result<usize>;

    /// Number of root documents, i.e. indexed entities.
    fn num_entities(&self) -> Result<usize> {
        self.count(&Term::new(metadata::TYPE, metadata::TYPE_ROOT))
    }
}

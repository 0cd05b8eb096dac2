//! Index engine backed by an embedded tantivy index.
//!
//! Every [`DocumentNode`] becomes one tantivy document:
//!
//! - metadata fields (`__root_id`, `__entity_type`, ...) map to dedicated
//!   `STRING | STORED` fields, so entity-block deletes are plain term queries;
//! - every schema value is indexed verbatim in the `__terms` field as
//!   `<field path>\u{1f}<value>`, which gives exact-match terms for paths the
//!   tantivy schema cannot know in advance (templates, dynamic objects);
//! - text values are also tokenized into the `__text` field for full-text search.
//!
//! The tantivy writer owns the directory lock file. Dropping the writer
//! releases it, which is what [`IndexDirectory::force_unlock`] does.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use ahash::AHashMap;
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use tantivy::collector::Count;
use tantivy::directory::MmapDirectory;
use tantivy::indexer::UserOperation;
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, STORED, STRING, Schema, TEXT};
use tantivy::{
    Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, TantivyError,
};

use crate::document::codec::EncodedValue;
use crate::document::tree::{DocumentNode, DocumentTree, metadata};
use crate::engine::{DeleteQuery, EngineWriter, IndexDirectory, IndexSnapshot, Term};
use crate::error::{Result, SearchSyncError};

/// Heap shared by the indexing threads of one writer (50MB).
pub const WRITER_MEMORY_BUDGET: usize = 50_000_000;

/// Exact-match terms of every schema value.
const TERMS_FIELD: &str = "__terms";

/// Tokenized text values.
const TEXT_FIELD: &str = "__text";

const TERM_SEPARATOR: char = '\u{1f}';

const METADATA_FIELDS: [&str; 8] = [
    metadata::ID,
    metadata::ROOT_ID,
    metadata::ENTITY_TYPE,
    metadata::TYPE,
    metadata::TENANT_ID,
    metadata::ROUTING_KEY,
    metadata::NESTED_PATH,
    metadata::FIELD_NAMES,
];

fn build_schema() -> Schema {
    let mut builder = Schema::builder();
    for name in METADATA_FIELDS {
        builder.add_text_field(name, STRING | STORED);
    }
    builder.add_text_field(TERMS_FIELD, STRING);
    builder.add_text_field(TEXT_FIELD, TEXT);
    builder.build()
}

/// The term text of a value; binary values are stored by neither field.
fn term_text(value: &EncodedValue) -> Option<String> {
    match value {
        EncodedValue::Bytes(_) => None,
        other => Some(other.to_string()),
    }
}

fn keyed_term(field: &str, text: &str) -> String {
    format!("{field}{TERM_SEPARATOR}{text}")
}

/// Handles of the tantivy schema fields.
#[derive(Debug, Clone)]
struct EngineFields {
    metadata: AHashMap<&'static str, Field>,
    terms: Field,
    text: Field,
}

impl EngineFields {
    fn new(schema: &Schema) -> Result<Self> {
        let mut fields = AHashMap::with_capacity(METADATA_FIELDS.len());
        for name in METADATA_FIELDS {
            fields.insert(name, schema.get_field(name)?);
        }
        Ok(EngineFields {
            metadata: fields,
            terms: schema.get_field(TERMS_FIELD)?,
            text: schema.get_field(TEXT_FIELD)?,
        })
    }

    fn document(&self, node: &DocumentNode) -> TantivyDocument {
        let mut document = TantivyDocument::default();
        for (name, values) in node.fields() {
            let metadata = self.metadata.get(name.as_str()).copied();
            for value in values {
                let Some(text) = term_text(value) else {
                    continue;
                };
                match metadata {
                    Some(field) => document.add_text(field, &text),
                    None => {
                        document.add_text(self.terms, keyed_term(name, &text));
                        if let EncodedValue::Text(raw) = value {
                            document.add_text(self.text, raw);
                        }
                    }
                }
            }
        }
        document
    }

    fn term(&self, term: &Term) -> Option<tantivy::Term> {
        let text = term_text(&term.value)?;
        Some(match self.metadata.get(term.field.as_str()) {
            Some(field) => tantivy::Term::from_field_text(*field, &text),
            None => tantivy::Term::from_field_text(self.terms, &keyed_term(&term.field, &text)),
        })
    }

    /// The query selecting what `query` deletes; `None` when nothing can match.
    fn delete_query(&self, query: &DeleteQuery) -> Option<Box<dyn Query>> {
        let terms = match query {
            DeleteQuery::All => return Some(Box::new(AllQuery)),
            DeleteQuery::Terms(terms) if terms.is_empty() => return Some(Box::new(AllQuery)),
            DeleteQuery::Terms(terms) => terms,
        };
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::with_capacity(terms.len());
        for term in terms {
            let term = self.term(term)?;
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
            ));
        }
        Some(Box::new(BooleanQuery::new(clauses)))
    }
}

type WriterSlot = RwLock<Option<IndexWriter>>;

struct DirectoryInner {
    name: String,
    index: Index,
    reader: IndexReader,
    fields: Arc<EngineFields>,
    active: Mutex<Option<Arc<WriterSlot>>>,
    generation: AtomicU64,
}

impl DirectoryInner {
    fn snapshot(&self) -> Arc<dyn IndexSnapshot> {
        Arc::new(TantivySnapshot {
            generation: self.generation.load(Ordering::Acquire),
            searcher: self.reader.searcher(),
            fields: Arc::clone(&self.fields),
        })
    }

    /// Make the last commit visible to new snapshots.
    fn publish(&self) -> Result<()> {
        self.reader.reload()?;
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn release(&self, slot: &Arc<WriterSlot>) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|a| Arc::ptr_eq(a, slot)) {
            *active = None;
        }
    }
}

impl fmt::Debug for DirectoryInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryInner")
            .field("name", &self.name)
            .field("index", &"<tantivy::Index>")
            .field("generation", &self.generation)
            .finish()
    }
}

/// A partition index stored by tantivy.
///
/// Clones share the same index. Only one writer may be open at a time, and
/// on disk the tantivy lock file also keeps other processes out.
#[derive(Debug, Clone)]
pub struct TantivyDirectory {
    inner: Arc<DirectoryInner>,
}

impl TantivyDirectory {
    /// Create an empty index held in RAM.
    pub fn create_in_ram<S: Into<String>>(name: S) -> Result<Self> {
        Self::from_index(name.into(), Index::create_in_ram(build_schema()))
    }

    /// Open the index stored under `path`, creating it if needed.
    pub fn open_in_dir<S: Into<String>, P: AsRef<Path>>(name: S, path: P) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        let directory = MmapDirectory::open(path).map_err(TantivyError::from)?;
        let index = Index::open_or_create(directory, build_schema())?;
        Self::from_index(name.into(), index)
    }

    fn from_index(name: String, index: Index) -> Result<Self> {
        let fields = EngineFields::new(&index.schema())?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(TantivyDirectory {
            inner: Arc::new(DirectoryInner {
                name,
                index,
                reader,
                fields: Arc::new(fields),
                active: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        })
    }

    /// Number of searchable segments of the last commit.
    pub fn segment_count(&self) -> Result<usize> {
        Ok(self.inner.index.searchable_segment_ids()?.len())
    }
}

impl IndexDirectory for TantivyDirectory {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn open_writer(&self) -> Result<Arc<dyn EngineWriter>> {
        let mut active = self.inner.active.lock();
        if active.as_ref().is_some_and(|slot| slot.read().is_some()) {
            return Err(SearchSyncError::lock(format!(
                "Index '{}' is locked by another writer",
                self.inner.name
            )));
        }

        let writer: IndexWriter = match self.inner.index.writer(WRITER_MEMORY_BUDGET) {
            Ok(writer) => writer,
            Err(TantivyError::LockFailure(error, _)) => {
                return Err(SearchSyncError::lock(format!(
                    "Index '{}' is locked: {error}",
                    self.inner.name
                )));
            }
            Err(error) => return Err(error.into()),
        };

        let slot = Arc::new(RwLock::new(Some(writer)));
        *active = Some(Arc::clone(&slot));
        debug!("Opened tantivy writer for index '{}'", self.inner.name);

        Ok(Arc::new(TantivyWriter {
            directory: Arc::clone(&self.inner),
            slot,
            pending: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }))
    }

    fn open_snapshot(&self) -> Result<Arc<dyn IndexSnapshot>> {
        Ok(self.inner.snapshot())
    }

    fn is_locked(&self) -> bool {
        self.inner
            .active
            .lock()
            .as_ref()
            .is_some_and(|slot| slot.read().is_some())
    }

    /// Drop the open writer, discarding its uncommitted changes.
    fn force_unlock(&self) -> Result<()> {
        let Some(slot) = self.inner.active.lock().take() else {
            return Ok(());
        };
        let writer = slot.write().take();
        if let Some(writer) = writer {
            warn!(
                "Discarding the writer of index '{}' to release its lock",
                self.inner.name
            );
            drop(writer);
        }
        Ok(())
    }
}

/// Writer of a [`TantivyDirectory`].
///
/// Adds and deletes share the tantivy writer; commit, merge and close take
/// it exclusively.
pub struct TantivyWriter {
    directory: Arc<DirectoryInner>,
    slot: Arc<WriterSlot>,
    pending: AtomicUsize,
    closed: AtomicBool,
}

impl TantivyWriter {
    fn released(&self) -> SearchSyncError {
        SearchSyncError::lock(format!(
            "Write lock of index '{}' was released",
            self.directory.name
        ))
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SearchSyncError::invalid_operation("Writer is closed"));
        }
        Ok(())
    }

    /// Run one change against the shared writer and count it as pending.
    fn stage<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&IndexWriter, &EngineFields) -> Result<()>,
    {
        self.check_open()?;
        let slot = self.slot.read();
        let writer = slot.as_ref().ok_or_else(|| self.released())?;
        change(writer, &self.directory.fields)?;
        self.pending.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn commit_locked(&self, writer: &mut IndexWriter) -> Result<()> {
        writer.commit()?;
        self.pending.store(0, Ordering::Release);
        self.directory.publish()
    }
}

fn delete(writer: &IndexWriter, fields: &EngineFields, query: &DeleteQuery) -> Result<()> {
    if let Some(query) = fields.delete_query(query) {
        writer.delete_query(query)?;
    }
    Ok(())
}

fn add_block(writer: &IndexWriter, fields: &EngineFields, tree: &DocumentTree) -> Result<()> {
    let operations: Vec<UserOperation> = tree
        .nodes()
        .iter()
        .map(|node| UserOperation::Add(fields.document(node)))
        .collect();
    writer.run(operations)?;
    Ok(())
}

impl EngineWriter for TantivyWriter {
    fn add_documents(&self, tree: DocumentTree) -> Result<()> {
        self.stage(|writer, fields| add_block(writer, fields, &tree))
    }

    fn update_documents(&self, query: &DeleteQuery, tree: DocumentTree) -> Result<()> {
        self.stage(|writer, fields| {
            delete(writer, fields, query)?;
            add_block(writer, fields, &tree)
        })
    }

    fn delete_documents(&self, query: &DeleteQuery) -> Result<()> {
        self.stage(|writer, fields| delete(writer, fields, query))
    }

    fn commit(&self) -> Result<()> {
        self.check_open()?;
        let mut slot = self.slot.write();
        let writer = slot.as_mut().ok_or_else(|| self.released())?;
        self.commit_locked(writer)
    }

    fn force_merge(&self) -> Result<()> {
        self.check_open()?;
        let mut slot = self.slot.write();
        let writer = slot.as_mut().ok_or_else(|| self.released())?;
        let segments = self.directory.index.searchable_segment_ids()?;
        if segments.len() > 1 {
            writer.merge(&segments).wait()?;
            self.directory.reader.reload()?;
        }
        Ok(())
    }

    /// tantivy searchers only see committed segments, so pending changes are
    /// committed before the snapshot is taken.
    fn near_real_time_snapshot(&self) -> Result<Arc<dyn IndexSnapshot>> {
        self.check_open()?;
        {
            let mut slot = self.slot.write();
            let writer = slot.as_mut().ok_or_else(|| self.released())?;
            if self.pending.load(Ordering::Acquire) > 0 {
                self.commit_locked(writer)?;
            }
        }
        Ok(self.directory.snapshot())
    }

    fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut slot = self.slot.write();
        let writer = slot.as_mut().ok_or_else(|| self.released())?;
        if self.pending.load(Ordering::Acquire) > 0 {
            self.commit_locked(writer)?;
        }

        self.closed.store(true, Ordering::Release);
        if let Some(writer) = slot.take() {
            writer.wait_merging_threads()?;
        }
        drop(slot);
        self.directory.release(&self.slot);
        debug!("Closed tantivy writer for index '{}'", self.directory.name);
        Ok(())
    }

    fn pending_operations(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for TantivyWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TantivyWriter")
            .field("index", &self.directory.name)
            .field("pending", &self.pending)
            .field("closed", &self.closed)
            .finish()
    }
}

/// A searcher pinned to one commit.
pub struct TantivySnapshot {
    generation: u64,
    searcher: Searcher,
    fields: Arc<EngineFields>,
}

impl TantivySnapshot {
    pub fn searcher(&self) -> &Searcher {
        &self.searcher
    }
}

impl IndexSnapshot for TantivySnapshot {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn num_docs(&self) -> usize {
        self.searcher.num_docs() as usize
    }

    fn count(&self, term: &Term) -> Result<usize> {
        match self.fields.term(term) {
            Some(term) => {
                let query = TermQuery::new(term, IndexRecordOption::Basic);
                Ok(self.searcher.search(&query, &Count)?)
            }
            None => Ok(0),
        }
    }
}

impl fmt::Debug for TantivySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TantivySnapshot")
            .field("generation", &self.generation)
            .field("num_docs", &self.searcher.num_docs())
            .finish()
    }
}

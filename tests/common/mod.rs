#![allow(dead_code)]

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use searchsync::document::{DocumentTree, ValueType};
use searchsync::engine::{
    DeleteQuery, EngineWriter, IndexDirectory, IndexSnapshot, MemoryDirectory,
};
use searchsync::error::{Result, SearchSyncError};
use searchsync::schema::{IndexSchema, ObjectStructure, SchemaRegistry, TemplateTarget};
use searchsync::work::{ErrorContext, ErrorHandler};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Switches shared by a [`FaultyDirectory`] and the writers it opens.
#[derive(Debug, Default)]
pub struct Faults {
    pub fail_open: AtomicBool,
    pub fail_commit: AtomicBool,
    pub fail_close: AtomicBool,
    pub fail_add: AtomicBool,
    pub open_attempts: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl Faults {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn check(&self, flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::Acquire) {
            Err(SearchSyncError::Io(io::Error::other(format!(
                "injected {what} failure"
            ))))
        } else {
            Ok(())
        }
    }
}

/// A memory directory whose writers fail on demand and record every call.
#[derive(Debug, Clone)]
pub struct FaultyDirectory {
    pub inner: MemoryDirectory,
    pub faults: Arc<Faults>,
}

impl FaultyDirectory {
    pub fn new(name: &str) -> Self {
        FaultyDirectory {
            inner: MemoryDirectory::new(name),
            faults: Arc::new(Faults::default()),
        }
    }
}

impl IndexDirectory for FaultyDirectory {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn open_writer(&self) -> Result<Arc<dyn EngineWriter>> {
        self.faults.open_attempts.fetch_add(1, Ordering::AcqRel);
        self.faults.check(&self.faults.fail_open, "open")?;
        let inner = self.inner.open_writer()?;
        self.faults.record("open".to_string());
        Ok(Arc::new(FaultyWriter {
            inner,
            faults: Arc::clone(&self.faults),
        }))
    }

    fn open_snapshot(&self) -> Result<Arc<dyn IndexSnapshot>> {
        self.inner.open_snapshot()
    }

    fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    fn force_unlock(&self) -> Result<()> {
        self.faults.record("force_unlock".to_string());
        self.inner.force_unlock()
    }
}

#[derive(Debug)]
pub struct FaultyWriter {
    inner: Arc<dyn EngineWriter>,
    faults: Arc<Faults>,
}

impl EngineWriter for FaultyWriter {
    fn add_documents(&self, tree: DocumentTree) -> Result<()> {
        self.faults.check(&self.faults.fail_add, "add")?;
        self.faults.record(format!("add_documents:{}", tree.len()));
        self.inner.add_documents(tree)
    }

    fn update_documents(&self, query: &DeleteQuery, tree: DocumentTree) -> Result<()> {
        self.faults.record(format!("update_documents:{}", tree.len()));
        self.inner.update_documents(query, tree)
    }

    fn delete_documents(&self, query: &DeleteQuery) -> Result<()> {
        self.faults.record("delete_documents".to_string());
        self.inner.delete_documents(query)
    }

    fn commit(&self) -> Result<()> {
        self.faults.check(&self.faults.fail_commit, "commit")?;
        self.faults.record("commit".to_string());
        self.inner.commit()
    }

    fn force_merge(&self) -> Result<()> {
        self.faults.record("force_merge".to_string());
        self.inner.force_merge()
    }

    fn near_real_time_snapshot(&self) -> Result<Arc<dyn IndexSnapshot>> {
        self.inner.near_real_time_snapshot()
    }

    fn close(&self) -> Result<()> {
        self.faults.check(&self.faults.fail_close, "close")?;
        self.faults.record("close".to_string());
        self.inner.close()
    }

    fn pending_operations(&self) -> usize {
        self.inner.pending_operations()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Keeps everything it is handed.
#[derive(Debug, Default)]
pub struct RecordingErrorHandler {
    contexts: Mutex<Vec<ErrorContext>>,
    exceptions: Mutex<Vec<String>>,
}

impl RecordingErrorHandler {
    pub fn contexts(&self) -> Vec<ErrorContext> {
        self.contexts.lock().clone()
    }

    pub fn exceptions(&self) -> Vec<String> {
        self.exceptions.lock().clone()
    }
}

impl ErrorHandler for RecordingErrorHandler {
    fn handle(&self, context: &ErrorContext) {
        self.contexts.lock().push(context.clone());
    }

    fn handle_exception(&self, message: &str, error: &SearchSyncError) {
        self.exceptions.lock().push(format!("{message}: {error}"));
    }
}

/// A book with flattened authors, nested chapters (with nested sections)
/// and an open-ended attribute bag.
pub fn book_schema() -> IndexSchema {
    IndexSchema::builder("book")
        .field("title", ValueType::Text)
        .field("pages", ValueType::Integer)
        .multi_valued_field("tags", ValueType::Keyword)
        .multi_valued_object("authors", ObjectStructure::Flattened, |a| {
            a.field("name", ValueType::Text)
                .field("born", ValueType::DateTime)
        })
        .multi_valued_object("chapters", ObjectStructure::Nested, |c| {
            c.field("title", ValueType::Text)
                .multi_valued_object("sections", ObjectStructure::Nested, |s| {
                    s.field("title", ValueType::Text)
                })
        })
        .object("outer", ObjectStructure::Flattened, |o| {
            o.object("meta", ObjectStructure::Flattened, |m| {
                m.object("attrs", ObjectStructure::Flattened, |a| {
                    a.template(
                        "groups",
                        "grp_*",
                        TemplateTarget::Object(ObjectStructure::Flattened),
                        true,
                    )
                    .template(
                        "keywords",
                        "*",
                        TemplateTarget::Value(ValueType::Keyword),
                        true,
                    )
                })
            })
        })
        .build()
        .expect("book schema")
}

pub fn movie_schema() -> IndexSchema {
    IndexSchema::builder("movie")
        .field("title", ValueType::Text)
        .field("year", ValueType::Integer)
        .build()
        .expect("movie schema")
}

/// A note whose root accepts any extra keyword field.
pub fn note_schema() -> IndexSchema {
    IndexSchema::builder("note")
        .field("title", ValueType::Text)
        .template("extras", "*", TemplateTarget::Value(ValueType::Keyword), true)
        .build()
        .expect("note schema")
}

pub fn registry() -> Arc<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    registry.register(book_schema()).expect("register book");
    registry.register(movie_schema()).expect("register movie");
    registry.register(note_schema()).expect("register note");
    Arc::new(registry)
}

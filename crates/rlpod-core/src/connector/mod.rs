//! Connector adapters: the single capability every data source exposes
//!
//! A connector answers "rows of this source within this window". Concrete
//! transports live behind the [`Connector`] trait and are created through a
//! [`ConnectorRegistry`] keyed by connector kind.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

use rlpod_spec::{DataSourceSpec, FieldSpec};

use crate::state::SourceRow;
use crate::window::TimeWindow;
use crate::{ConnectorError, PodError, Result};

pub mod csv;
pub mod memory;

pub use self::csv::CsvConnector;
pub use self::memory::StaticConnector;

/// What a connector is asked to fetch
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Source path, e.g. `coinbase.btcusd`
    pub source: String,
    /// Declared fields of the source
    pub fields: Vec<FieldSpec>,
    /// Resolved pod window
    pub window: TimeWindow,
}

/// Receiving side of a cancellation flag shared by sibling fetches
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Whether cancellation has been requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested; pends forever if it never is
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Fail with [`ConnectorError::Cancelled`] if cancellation was requested
    pub fn check(&self) -> std::result::Result<(), ConnectorError> {
        if self.is_cancelled() {
            Err(ConnectorError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Serve in-window `rows` one interval sub-window at a time.
///
/// Rows come back batch by batch in time order, keeping the source order
/// within a batch. Rows outside the window are dropped. `cancel` is checked
/// before every batch, so a cancelled fetch stops between spans.
pub fn fetch_by_interval(
    request: &FetchRequest,
    rows: impl IntoIterator<Item = SourceRow>,
    cancel: &CancelSignal,
) -> std::result::Result<Vec<SourceRow>, ConnectorError> {
    let mut batches: BTreeMap<usize, Vec<SourceRow>> = BTreeMap::new();
    for row in rows {
        if let Some(index) = request.window.sub_window_index(row.timestamp) {
            batches.entry(index).or_default().push(row);
        }
    }

    let mut fetched = Vec::new();
    for (index, batch) in batches {
        cancel.check()?;
        if let Some((start, end)) = request.window.sub_window(index) {
            trace!(source = %request.source, %start, %end, rows = batch.len(), "Serving batch");
        }
        fetched.extend(batch);
    }
    Ok(fetched)
}

/// Sending side of a cancellation flag
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Create a handle and its first signal
    #[must_use]
    pub fn new() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelSignal { rx })
    }

    /// Request cancellation of every signal derived from this handle
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Uniform fetch capability of a data source
#[async_trait]
pub trait Connector: Send + Sync {
    /// Fetch rows for `request.window`.
    ///
    /// Rows are returned one interval sub-window after another, in the
    /// source's natural order within a sub-window; values are keyed by
    /// unqualified field name. Implementations should stop early once
    /// `cancel` fires. [`fetch_by_interval`] does both for in-memory rows.
    async fn fetch(
        &self,
        request: &FetchRequest,
        cancel: CancelSignal,
    ) -> std::result::Result<Vec<SourceRow>, ConnectorError>;
}

/// What a connector factory gets to see
#[derive(Debug, Clone, Copy)]
pub struct ConnectorContext<'a> {
    /// The source being fetched
    pub source: &'a DataSourceSpec,
    /// Directory of the manifest, for resolving relative paths
    pub manifest_dir: Option<&'a Path>,
}

impl ConnectorContext<'_> {
    /// Resolve a path parameter against the manifest directory
    #[must_use]
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match self.manifest_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

type ConnectorConstructor =
    Box<dyn Fn(ConnectorContext<'_>) -> Result<Arc<dyn Connector>> + Send + Sync>;

/// Connector factories keyed by connector kind
pub struct ConnectorRegistry {
    factories: HashMap<String, ConnectorConstructor>,
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("kinds", &self.list())
            .finish()
    }
}

impl ConnectorRegistry {
    /// Create a registry with no connectors
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry with the built-in `csv` connector
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(CsvConnector::KIND, CsvConnector::from_context);
        registry
    }

    /// Register a connector factory
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(ConnectorContext<'_>) -> Result<Arc<dyn Connector>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(constructor));
    }

    /// Register one shared connector instance for a kind
    pub fn register_instance(&mut self, kind: impl Into<String>, connector: Arc<dyn Connector>) {
        self.register(kind, move |_| Ok(Arc::clone(&connector)));
    }

    /// Create the connector for a source
    pub fn make(&self, context: ConnectorContext<'_>) -> Result<Arc<dyn Connector>> {
        let kind = context.source.connector_kind();
        self.factories
            .get(kind)
            .ok_or_else(|| {
                PodError::config(format!(
                    "no connector '{kind}' registered for source '{}'",
                    context.source.path()
                ))
            })
            .and_then(|constructor| constructor(context))
    }

    /// List registered kinds, sorted
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

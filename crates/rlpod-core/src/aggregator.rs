//! Fetch-and-merge across all data sources of a pod
//!
//! Every non-local source is fetched on its own task. The merge waits for
//! all of them; the first failure (or an elapsed deadline) cancels the
//! siblings and fails the whole aggregation, so no table with silently
//! missing columns is ever produced.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use rlpod_spec::DataSourceSpec;

use crate::connector::{CancelHandle, Connector, ConnectorContext, ConnectorRegistry, FetchRequest};
use crate::fields::FieldCatalog;
use crate::state::SourceRow;
use crate::table::MergedTable;
use crate::window::TimeWindow;
use crate::{ConnectorError, PodError, Result};

type FetchOutcome = (usize, std::result::Result<Vec<SourceRow>, ConnectorError>);

/// Builds one time-aligned table from a pod's sources
#[derive(Debug)]
pub struct SourceAggregator<'a> {
    connectors: &'a ConnectorRegistry,
    manifest_dir: Option<&'a Path>,
    deadline: Option<Duration>,
}

impl<'a> SourceAggregator<'a> {
    /// Create an aggregator using `connectors`
    #[must_use]
    pub fn new(connectors: &'a ConnectorRegistry) -> Self {
        Self {
            connectors,
            manifest_dir: None,
            deadline: None,
        }
    }

    /// Resolve relative connector paths against this directory
    #[must_use]
    pub fn manifest_dir(mut self, dir: Option<&'a Path>) -> Self {
        self.manifest_dir = dir;
        self
    }

    /// Abort the aggregation when it takes longer than `deadline`
    #[must_use]
    pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Fetch every source for `window` and merge the results into the
    /// columns of `catalog`
    pub async fn aggregate(
        &self,
        window: &TimeWindow,
        sources: &[DataSourceSpec],
        catalog: &FieldCatalog,
    ) -> Result<MergedTable> {
        // Resolve every connector before any fetch starts
        let mut connectors: Vec<(usize, Arc<dyn Connector>)> = Vec::new();
        for (index, source) in sources.iter().enumerate() {
            if source.is_local() {
                continue;
            }
            let connector = self.connectors.make(ConnectorContext {
                source,
                manifest_dir: self.manifest_dir,
            })?;
            connectors.push((index, connector));
        }

        let fetched = self.fetch_all(window, sources, connectors).await?;
        let table = merge(window, sources, catalog, fetched);
        info!(sources = sources.len(), rows = table.len(), "Aggregated data sources");
        Ok(table)
    }

    async fn fetch_all(
        &self,
        window: &TimeWindow,
        sources: &[DataSourceSpec],
        connectors: Vec<(usize, Arc<dyn Connector>)>,
    ) -> Result<Vec<Vec<SourceRow>>> {
        let (cancel, signal) = CancelHandle::new();
        let mut pending: BTreeSet<usize> = connectors.iter().map(|(index, _)| *index).collect();
        let mut tasks: JoinSet<FetchOutcome> = JoinSet::new();
        let mut task_sources: HashMap<tokio::task::Id, usize> = HashMap::new();

        for (index, connector) in connectors {
            let source = &sources[index];
            let request = FetchRequest {
                source: source.path(),
                fields: source.fields.clone(),
                window: *window,
            };
            let signal = signal.clone();
            debug!(source = %request.source, kind = source.connector_kind(), "Fetching source");
            let handle = tasks.spawn(async move { (index, connector.fetch(&request, signal).await) });
            task_sources.insert(handle.id(), index);
        }

        let mut fetched: Vec<Vec<SourceRow>> = vec![Vec::new(); sources.len()];
        let collect = async {
            while let Some(joined) = tasks.join_next().await {
                let (index, outcome) = joined.map_err(|e| PodError::Connector {
                    source_name: task_sources
                        .get(&e.id())
                        .map_or_else(|| "unknown".to_string(), |index| sources[*index].path()),
                    error: ConnectorError::Other(format!("fetch task failed: {e}")),
                })?;
                pending.remove(&index);
                match outcome {
                    Ok(rows) => {
                        debug!(source = %sources[index].path(), rows = rows.len(), "Fetched source");
                        fetched[index] = rows;
                    }
                    Err(error) => {
                        return Err(PodError::Connector {
                            source_name: sources[index].path(),
                            error,
                        });
                    }
                }
            }
            Ok::<(), PodError>(())
        };

        let outcome = match self.deadline {
            Some(deadline) => {
                let timed = tokio::time::timeout(deadline, collect).await;
                timed.unwrap_or_else(|_elapsed| {
                    Err(PodError::Connector {
                        source_name: pending
                            .iter()
                            .map(|index| sources[*index].path())
                            .collect::<Vec<_>>()
                            .join(","),
                        error: ConnectorError::TimedOut(deadline),
                    })
                })
            }
            None => collect.await,
        };

        if let Err(err) = outcome {
            warn!(error = %err, "Aggregation failed, cancelling in-flight fetches");
            cancel.cancel();
            tasks.abort_all();
            return Err(err);
        }
        Ok(fetched)
    }
}

/// Merge per-source rows (indexed like `sources`) onto the window's grid.
///
/// Sources are applied in declaration order and rows in their natural
/// order, so within one bucket the later sample wins field by field.
/// Declared initializers fill fields that were never observed in a row.
#[must_use]
pub fn merge(
    window: &TimeWindow,
    sources: &[DataSourceSpec],
    catalog: &FieldCatalog,
    fetched: Vec<Vec<SourceRow>>,
) -> MergedTable {
    let mut table = MergedTable::new(catalog.columns().to_vec());

    for (source, rows) in sources.iter().zip(fetched) {
        for row in rows {
            let (merged, _) = table.row_mut(window.bucket(row.timestamp));
            for field in &source.fields {
                if let Some(value) = row.values.get(&field.name) {
                    merged.values.insert(source.qualify(&field.name), value.clone());
                }
            }
        }
    }

    for timestamp in table.rows().map(|r| r.timestamp).collect::<Vec<_>>() {
        let (row, _) = table.row_mut(timestamp);
        catalog.apply_initializers(row);
    }
    table
}

//! File-backed connector reading CSV rows

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::{fetch_by_interval, CancelSignal, Connector, ConnectorContext, FetchRequest};
use crate::state::{parse_csv, SourceRow};
use crate::{ConnectorError, PodError, Result};

/// Reads a CSV file whose first column is `time` (Unix seconds or RFC 3339).
///
/// Other headers are field names, either bare (`close`) or qualified with
/// the source path (`coinbase.btcusd.close`). Only rows inside the window
/// and only declared fields are returned, one interval sub-window at a time.
#[derive(Debug, Clone)]
pub struct CsvConnector {
    path: PathBuf,
}

impl CsvConnector {
    /// Connector kind used in manifests
    pub const KIND: &'static str = "csv";

    /// Create a connector for a file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Factory reading `connector.params.path`
    pub fn from_context(context: ConnectorContext<'_>) -> Result<Arc<dyn Connector>> {
        let path = context
            .source
            .connector
            .as_ref()
            .and_then(|c| c.param_str("path"))
            .ok_or_else(|| {
                PodError::config(format!(
                    "csv connector for source '{}' needs a 'path' param",
                    context.source.path()
                ))
            })?;
        Ok(Arc::new(Self::new(context.resolve_path(path))))
    }
}

#[async_trait]
impl Connector for CsvConnector {
    async fn fetch(
        &self,
        request: &FetchRequest,
        cancel: CancelSignal,
    ) -> std::result::Result<Vec<SourceRow>, ConnectorError> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        cancel.check()?;

        let csv = parse_csv(&text).map_err(ConnectorError::Parse)?;
        let prefix = format!("{}.", request.source);
        let columns: Vec<Option<&str>> = csv
            .headers
            .iter()
            .map(|header| {
                let field = header.strip_prefix(&prefix).unwrap_or(header);
                request
                    .fields
                    .iter()
                    .find(|f| f.name == field)
                    .map(|f| f.name.as_str())
            })
            .collect();

        let rows = csv
            .records
            .into_iter()
            .map(|(timestamp, cells)| {
                let mut row = SourceRow::new(timestamp);
                for (column, cell) in columns.iter().zip(cells) {
                    if let (Some(field), Some(value)) = (column, cell) {
                        row.values.insert((*field).to_string(), value);
                    }
                }
                row
            });
        let rows = fetch_by_interval(request, rows, &cancel)?;

        debug!(source = %request.source, path = %self.path.display(), rows = rows.len(), "Read CSV rows");
        Ok(rows)
    }
}

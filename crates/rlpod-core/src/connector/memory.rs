//! In-memory connector serving fixed rows

use async_trait::async_trait;

use super::{fetch_by_interval, CancelSignal, Connector, FetchRequest};
use crate::state::SourceRow;
use crate::ConnectorError;

/// Serves a fixed set of rows, restricted to the requested window and
/// batched by interval
#[derive(Debug, Clone, Default)]
pub struct StaticConnector {
    rows: Vec<SourceRow>,
}

impl StaticConnector {
    /// Create a connector over `rows`
    #[must_use]
    pub fn new(rows: Vec<SourceRow>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl Connector for StaticConnector {
    async fn fetch(
        &self,
        request: &FetchRequest,
        cancel: CancelSignal,
    ) -> Result<Vec<SourceRow>, ConnectorError> {
        cancel.check()?;
        fetch_by_interval(request, self.rows.iter().cloned(), &cancel)
    }
}

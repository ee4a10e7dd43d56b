//! Per-source rows and CSV ingestion

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::table::FieldValue;
use crate::{PodError, Result};

/// One timestamped sample of a single source; keys are unqualified field names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRow {
    /// Raw sample time
    pub timestamp: DateTime<Utc>,
    /// Field name to value
    pub values: BTreeMap<String, FieldValue>,
}

impl SourceRow {
    /// Create an empty row
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    /// Add a value
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }
}

/// Rows for one source, identified by its path (e.g. `local.portfolio`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceState {
    /// Source path
    pub source: String,
    /// Rows in the source's natural order
    pub rows: Vec<SourceRow>,
}

impl SourceState {
    /// Create a state with no rows
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            rows: Vec::new(),
        }
    }

    /// Add a row
    #[must_use]
    pub fn row(mut self, row: SourceRow) -> Self {
        self.rows.push(row);
        self
    }
}

/// CSV content split into a header and timestamped cells
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CsvRecords {
    pub headers: Vec<String>,
    pub records: Vec<(DateTime<Utc>, Vec<Option<FieldValue>>)>,
}

/// Parse CSV text whose first column is `time`
pub(crate) fn parse_csv(text: &str) -> std::result::Result<CsvRecords, String> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let header_line = lines.next().ok_or("missing header row")?;
    let mut headers = split_line(header_line);
    if headers.first().map(|h| h.trim()) != Some("time") {
        return Err(format!("first column must be 'time', got '{header_line}'"));
    }
    headers.remove(0);
    let headers: Vec<String> = headers.into_iter().map(|h| h.trim().to_string()).collect();

    let mut records = Vec::new();
    for (index, line) in lines.enumerate() {
        let mut cells = split_line(line);
        if cells.len() != headers.len() + 1 {
            return Err(format!(
                "row {} has {} cells, expected {}",
                index + 1,
                cells.len(),
                headers.len() + 1
            ));
        }
        let timestamp = parse_timestamp(&cells.remove(0))?;
        let values = cells.iter().map(|cell| FieldValue::parse(cell)).collect();
        records.push((timestamp, values));
    }

    Ok(CsvRecords { headers, records })
}

/// Group CSV columns into one [`SourceState`] per source path.
///
/// Headers are fully-qualified (`local.portfolio.usd_balance`); the part
/// after the last `.` is the field. Sources appear in header order. Rows
/// with no value for a source are skipped for that source.
pub fn from_csv(text: &str) -> Result<Vec<SourceState>> {
    let csv = parse_csv(text).map_err(PodError::InvalidState)?;

    let mut columns: Vec<(usize, String)> = Vec::with_capacity(csv.headers.len());
    let mut states: Vec<SourceState> = Vec::new();
    for header in &csv.headers {
        let (source, field) = header
            .rsplit_once('.')
            .filter(|(source, field)| !source.is_empty() && !field.is_empty())
            .ok_or_else(|| {
                PodError::InvalidState(format!("column '{header}' is not a qualified field name"))
            })?;
        let index = match states.iter().position(|s| s.source == source) {
            Some(index) => index,
            None => {
                states.push(SourceState::new(source));
                states.len() - 1
            }
        };
        columns.push((index, field.to_string()));
    }

    for (timestamp, cells) in csv.records {
        let mut rows: Vec<SourceRow> = states.iter().map(|_| SourceRow::new(timestamp)).collect();
        for ((index, field), cell) in columns.iter().zip(cells) {
            if let Some(value) = cell {
                rows[*index].values.insert(field.clone(), value);
            }
        }
        for (state, row) in states.iter_mut().zip(rows) {
            if !row.values.is_empty() {
                state.rows.push(row);
            }
        }
    }

    Ok(states)
}

fn parse_timestamp(cell: &str) -> std::result::Result<DateTime<Utc>, String> {
    let cell = cell.trim();
    if let Ok(secs) = cell.parse::<i64>() {
        return Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| format!("timestamp {secs} is out of range"));
    }
    if let Ok(secs) = cell.parse::<f64>() {
        #[allow(clippy::cast_possible_truncation)]
        let millis = (secs * 1_000.0).round() as i64;
        return Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| format!("timestamp {cell} is out of range"));
    }
    DateTime::parse_from_rfc3339(cell)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{cell}': {e}"))
}

fn split_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => cells.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    cells.push(current);
    cells
}

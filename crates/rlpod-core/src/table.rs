//! Time-aligned merged table and its CSV rendering

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Numeric value
    Number(f64),
    /// Free text
    Text(String),
}

impl FieldValue {
    /// Interpret a CSV cell; empty cells are absent
    ///
    /// Only finite numbers become [`FieldValue::Number`], so `NaN` and `inf`
    /// stay text and values always compare equal to themselves.
    #[must_use]
    pub fn parse(cell: &str) -> Option<Self> {
        let cell = cell.trim();
        if cell.is_empty() {
            return None;
        }
        Some(match cell.parse::<f64>() {
            Ok(number) if number.is_finite() => Self::Number(number),
            _ => Self::Text(cell.to_string()),
        })
    }

    /// Numeric value, if any
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// One timestamp of the merged table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRow {
    /// Bucketed timestamp
    pub timestamp: DateTime<Utc>,
    /// Fully-qualified field name to value; unobserved fields are absent
    pub values: BTreeMap<String, FieldValue>,
}

impl MergedRow {
    /// Create an empty row
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    /// Value of a field
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }
}

/// Rows keyed by strictly increasing timestamp, with a fixed column order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergedTable {
    columns: Vec<String>,
    rows: BTreeMap<DateTime<Utc>, MergedRow>,
}

impl MergedTable {
    /// Create an empty table
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: BTreeMap::new(),
        }
    }

    /// Column order used for rendering
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in ascending timestamp order
    pub fn rows(&self) -> impl Iterator<Item = &MergedRow> {
        self.rows.values()
    }

    /// Row at an exact timestamp
    #[must_use]
    pub fn get(&self, timestamp: DateTime<Utc>) -> Option<&MergedRow> {
        self.rows.get(&timestamp)
    }

    /// Row at `timestamp`, created empty if missing; the flag is true when created
    pub(crate) fn row_mut(&mut self, timestamp: DateTime<Utc>) -> (&mut MergedRow, bool) {
        let created = !self.rows.contains_key(&timestamp);
        let row = self
            .rows
            .entry(timestamp)
            .or_insert_with(|| MergedRow::new(timestamp));
        (row, created)
    }

    /// Write one field, creating the row if needed
    pub fn set(&mut self, timestamp: DateTime<Utc>, field: impl Into<String>, value: FieldValue) {
        self.row_mut(timestamp).0.values.insert(field.into(), value);
    }

    /// Render as CSV: a `time` column (Unix seconds) then [`MergedTable::columns`].
    ///
    /// Absent values are empty cells. Output depends only on the table content.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut out = String::from("time");
        for column in &self.columns {
            out.push(',');
            out.push_str(&escape(column));
        }
        out.push('\n');

        for row in self.rows.values() {
            out.push_str(&format_timestamp(row.timestamp));
            for column in &self.columns {
                out.push(',');
                if let Some(value) = row.values.get(column) {
                    out.push_str(&escape(&value.to_string()));
                }
            }
            out.push('\n');
        }
        out
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    let millis = ts.timestamp_millis();
    let sign = if millis < 0 { "-" } else { "" };
    let (secs, frac) = (millis.unsigned_abs() / 1_000, millis.unsigned_abs() % 1_000);
    if frac == 0 {
        format!("{sign}{secs}")
    } else {
        format!("{sign}{secs}.{frac:03}")
    }
}

fn escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_rows_stay_ordered_and_unique() {
        let mut table = MergedTable::new(vec!["a.x".to_string()]);
        table.set(at(30), "a.x", 3.0.into());
        table.set(at(10), "a.x", 1.0.into());
        table.set(at(30), "a.x", 4.0.into());

        let stamps: Vec<_> = table.rows().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![at(10), at(30)]);
        assert_eq!(table.get(at(30)).unwrap().get("a.x"), Some(&FieldValue::Number(4.0)));
    }

    #[test]
    fn test_csv_rendering() {
        let mut table = MergedTable::new(vec!["local.p.usd".to_string(), "feed.a.note".to_string()]);
        table.set(at(100), "local.p.usd", 1_000_000.0.into());
        table.set(at(100), "feed.a.note", "up, then down".into());
        table.set(at(110), "local.p.usd", 0.5.into());

        assert_eq!(
            table.to_csv(),
            "time,local.p.usd,feed.a.note\n\
             100,1000000,\"up, then down\"\n\
             110,0.5,\n"
        );
    }

    #[test]
    fn test_subsecond_timestamps() {
        let mut table = MergedTable::new(vec!["a.x".to_string()]);
        table.set(Utc.timestamp_millis_opt(1_250).unwrap(), "a.x", 1.0.into());
        assert_eq!(table.to_csv(), "time,a.x\n1.250,1\n");
    }

    #[test]
    fn test_negative_timestamps() {
        let mut table = MergedTable::new(vec!["a.x".to_string()]);
        table.set(Utc.timestamp_millis_opt(-750).unwrap(), "a.x", 1.0.into());
        table.set(Utc.timestamp_millis_opt(-2_000).unwrap(), "a.x", 2.0.into());
        table.set(Utc.timestamp_millis_opt(-1_250).unwrap(), "a.x", 3.0.into());
        assert_eq!(table.to_csv(), "time,a.x\n-2,2\n-1.250,3\n-0.750,1\n");
    }

    #[test]
    fn test_parse_cells() {
        assert_eq!(FieldValue::parse(" 42 "), Some(FieldValue::Number(42.0)));
        assert_eq!(FieldValue::parse("buy"), Some(FieldValue::Text("buy".to_string())));
        assert_eq!(FieldValue::parse("  "), None);
    }

    #[test]
    fn test_non_finite_cells_stay_text() {
        for cell in ["NaN", "inf", "-inf", "infinity"] {
            let value = FieldValue::parse(cell).unwrap();
            assert_eq!(value, FieldValue::Text(cell.to_string()));
            assert_eq!(value, value.clone());
        }
    }
}

//! Overlay of caller-supplied source state onto a merged table

use tracing::debug;

use crate::fields::FieldCatalog;
use crate::state::SourceState;
use crate::table::MergedTable;
use crate::window::TimeWindow;
use crate::{PodError, Result};

/// Merge `states` into `table` field by field.
///
/// Every field is validated against `catalog` first; on error the table is
/// untouched. Timestamps are bucketed onto the window's grid, rows created
/// by the overlay get declared initializers, and values already present for
/// other fields are preserved. Applying the same states twice yields the
/// same table as applying them once.
pub fn apply(
    table: &mut MergedTable,
    states: &[SourceState],
    catalog: &FieldCatalog,
    window: &TimeWindow,
) -> Result<()> {
    for state in states {
        for row in &state.rows {
            if let Some(field) = row
                .values
                .keys()
                .find(|field| !catalog.contains(&format!("{}.{field}", state.source)))
            {
                return Err(PodError::config(format!(
                    "field '{}.{field}' is not declared by any data source",
                    state.source
                )));
            }
        }
    }

    let mut written = 0usize;
    for state in states {
        for row in &state.rows {
            let (merged, created) = table.row_mut(window.bucket(row.timestamp));
            for (field, value) in &row.values {
                merged
                    .values
                    .insert(format!("{}.{field}", state.source), value.clone());
                written += 1;
            }
            if created {
                catalog.apply_initializers(merged);
            }
        }
    }

    debug!(states = states.len(), values = written, "Applied local state");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SourceRow;
    use crate::table::FieldValue;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use rlpod_spec::{DataSourceSpec, FieldSpec};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn window() -> TimeWindow {
        TimeWindow::new(at(0), Duration::hours(1), Duration::minutes(1), Duration::seconds(10)).unwrap()
    }

    fn catalog() -> FieldCatalog {
        FieldCatalog::from_sources(&[
            DataSourceSpec::new("local", "portfolio")
                .field(FieldSpec::new("usd").with_initializer(1_000.0))
                .field(FieldSpec::new("btc").with_initializer(0.0)),
            DataSourceSpec::new("coinbase", "btcusd").field(FieldSpec::new("close")),
        ])
    }

    fn fetched_table() -> MergedTable {
        let catalog = catalog();
        let mut table = MergedTable::new(catalog.columns().to_vec());
        table.set(at(10), "coinbase.btcusd.close", 100.0.into());
        table.set(at(10), "local.portfolio.usd", 1_000.0.into());
        table.set(at(10), "local.portfolio.btc", 0.0.into());
        table
    }

    #[test]
    fn test_overlay_preserves_other_fields() {
        let mut table = fetched_table();
        let states = vec![SourceState::new("local.portfolio").row(SourceRow::new(at(11)).with("btc", 2.0))];

        apply(&mut table, &states, &catalog(), &window()).unwrap();
        let row = table.get(at(10)).unwrap();
        assert_eq!(row.get("local.portfolio.btc"), Some(&FieldValue::Number(2.0)));
        assert_eq!(row.get("local.portfolio.usd"), Some(&FieldValue::Number(1_000.0)));
        assert_eq!(row.get("coinbase.btcusd.close"), Some(&FieldValue::Number(100.0)));
    }

    #[test]
    fn test_new_rows_get_initializers() {
        let mut table = fetched_table();
        let states = vec![SourceState::new("coinbase.btcusd").row(SourceRow::new(at(40)).with("close", 120.0))];

        apply(&mut table, &states, &catalog(), &window()).unwrap();
        let row = table.get(at(40)).unwrap();
        assert_eq!(row.get("coinbase.btcusd.close"), Some(&FieldValue::Number(120.0)));
        assert_eq!(row.get("local.portfolio.usd"), Some(&FieldValue::Number(1_000.0)));
        assert_eq!(row.get("local.portfolio.btc"), Some(&FieldValue::Number(0.0)));
    }

    #[test]
    fn test_undeclared_field_leaves_table_untouched() {
        let mut table = fetched_table();
        let before = table.clone();
        let states = vec![
            SourceState::new("local.portfolio").row(SourceRow::new(at(20)).with("usd", 5.0)),
            SourceState::new("local.portfolio").row(SourceRow::new(at(30)).with("eth", 1.0)),
        ];

        let err = apply(&mut table, &states, &catalog(), &window()).unwrap_err();
        assert!(matches!(err, PodError::Configuration(_)));
        assert_eq!(table, before);
    }

    proptest! {
        #[test]
        fn prop_overlay_is_idempotent(
            samples in prop::collection::vec((0i64..3_600, 0.0f64..1e6, any::<bool>()), 0..20)
        ) {
            let mut state = SourceState::new("local.portfolio");
            for (secs, value, usd) in samples {
                let field = if usd { "usd" } else { "btc" };
                state = state.row(SourceRow::new(at(secs)).with(field, value));
            }
            let states = vec![state];

            let mut once = fetched_table();
            apply(&mut once, &states, &catalog(), &window()).unwrap();
            let mut twice = once.clone();
            apply(&mut twice, &states, &catalog(), &window()).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}

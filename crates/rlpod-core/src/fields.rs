//! Fully-qualified field catalog derived from a pod's data sources

use std::collections::BTreeMap;
use tracing::warn;

use rlpod_spec::DataSourceSpec;

use crate::table::{FieldValue, MergedRow};

/// Declared fields of a pod, in table column order
///
/// Columns list local sources' fields first (declaration order), then every
/// other source's fields in manifest order. When two sources declare the
/// same fully-qualified name the column keeps its first position and the
/// later declaration's initializer wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldCatalog {
    columns: Vec<String>,
    initializers: BTreeMap<String, Option<f64>>,
}

impl FieldCatalog {
    /// Build the catalog for a list of sources
    #[must_use]
    pub fn from_sources(sources: &[DataSourceSpec]) -> Self {
        let mut catalog = Self::default();
        let ordered = sources
            .iter()
            .filter(|s| s.is_local())
            .chain(sources.iter().filter(|s| !s.is_local()));

        for name in ordered.flat_map(DataSourceSpec::qualified_field_names) {
            if !catalog.columns.contains(&name) {
                catalog.columns.push(name);
            }
        }

        // Manifest order, so the later declaration wins
        for source in sources {
            for field in &source.fields {
                let name = source.qualify(&field.name);
                if catalog.initializers.contains_key(&name) {
                    warn!(field = %name, source = %source.path(), "Duplicate field declaration, later declaration wins");
                }
                catalog.initializers.insert(name, field.initializer);
            }
        }
        catalog
    }

    /// Column names in table order
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether `name` is a declared fully-qualified field
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.initializers.contains_key(name)
    }

    /// Declared default for `name`
    #[must_use]
    pub fn initializer(&self, name: &str) -> Option<f64> {
        self.initializers.get(name).copied().flatten()
    }

    /// Fill absent fields of `row` that declare an initializer
    pub fn apply_initializers(&self, row: &mut MergedRow) {
        for (name, initializer) in &self.initializers {
            if let Some(value) = initializer {
                row.values
                    .entry(name.clone())
                    .or_insert(FieldValue::Number(*value));
            }
        }
    }
}

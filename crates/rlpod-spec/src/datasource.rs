//! Data source declarations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `from` value marking a source whose fields are supplied by the caller
pub const LOCAL_SOURCE: &str = "local";

/// A declared field of a data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name, unqualified
    pub name: String,
    /// Declared type, opaque to the runtime
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    /// Value used when the field is declared but never observed.
    ///
    /// `Some(0.0)` and `None` are different: the first is a zero default,
    /// the second means "no default".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initializer: Option<f64>,
}

impl FieldSpec {
    /// Create a field with no type and no initializer
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: None,
            initializer: None,
        }
    }

    /// Set the initializer
    #[must_use]
    pub fn with_initializer(mut self, value: f64) -> Self {
        self.initializer = Some(value);
        self
    }
}

/// How a data source fetches its rows
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectorSpec {
    /// Connector kind, e.g. `csv`
    pub name: String,
    /// Connector parameters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl ConnectorSpec {
    /// Look up a string parameter
    #[must_use]
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(serde_json::Value::as_str)
    }
}

/// A time-series data source declared by a pod
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataSourceSpec {
    /// Source family, also the default connector kind
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub from: String,
    /// Source name within its family
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Connector configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector: Option<ConnectorSpec>,
    /// Declared fields, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSpec>,
    /// Source-scoped actions: name to script body
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub actions: BTreeMap<String, String>,
    /// Constraint expressions, opaque to the runtime
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub laws: Vec<String>,
}

impl DataSourceSpec {
    /// Create a source with no fields
    pub fn new(from: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a field
    #[must_use]
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a source-scoped action
    #[must_use]
    pub fn action(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.actions.insert(name.into(), body.into());
        self
    }

    /// Set the connector
    #[must_use]
    pub fn with_connector(mut self, connector: ConnectorSpec) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Prefix shared by this source's fully-qualified field names
    #[must_use]
    pub fn path(&self) -> String {
        match (self.from.is_empty(), self.name.is_empty()) {
            (false, false) => format!("{}.{}", self.from, self.name),
            (false, true) => self.from.clone(),
            _ => self.name.clone(),
        }
    }

    /// Whether rows for this source come from the caller instead of a connector
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.from == LOCAL_SOURCE
    }

    /// Connector kind used to fetch this source
    #[must_use]
    pub fn connector_kind(&self) -> &str {
        match &self.connector {
            Some(connector) if !connector.name.is_empty() => &connector.name,
            _ => &self.from,
        }
    }

    /// Fully-qualified name of one of this source's fields
    #[must_use]
    pub fn qualify(&self, field: &str) -> String {
        format!("{}.{}", self.path(), field)
    }

    /// Fully-qualified names of all declared fields, in declaration order
    pub fn qualified_field_names(&self) -> impl Iterator<Item = String> + '_ {
        self.fields.iter().map(|f| self.qualify(&f.name))
    }
}

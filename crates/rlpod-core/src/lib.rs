//! Runtime data-synthesis engine for reinforcement-learning pods
//!
//! This crate turns a pod manifest into a single time-aligned table:
//! - Content hashing of manifests for identity and cache invalidation
//! - Time-window resolution (epoch, period, interval, granularity)
//! - Concurrent fetch through pluggable connectors, merged onto one grid
//! - Overlay of caller-supplied local state onto the cached table
//! - A registry of loaded pods

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregator;
pub mod config;
pub mod connector;
pub mod duration;
pub mod error;
pub mod fields;
pub mod hash;
pub mod overlay;
pub mod pod;
pub mod registry;
pub mod state;
pub mod table;
pub mod window;

// Re-export core types
pub use aggregator::SourceAggregator;
pub use config::{FetchConfig, RuntimeConfig, WindowDefaults};
pub use connector::{
    fetch_by_interval, CancelHandle, CancelSignal, Connector, ConnectorContext,
    ConnectorRegistry, CsvConnector, FetchRequest, StaticConnector,
};
pub use duration::{format_duration, parse_duration};
pub use error::{ConnectorError, PodError, Result};
pub use fields::FieldCatalog;
pub use hash::{hash_bytes, read_manifest};
pub use pod::Pod;
pub use registry::{find_first_manifest_path, PodRegistry};
pub use state::{SourceRow, SourceState};
pub use table::{FieldValue, MergedRow, MergedTable};
pub use window::{resolve_window, TimeWindow};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Connector, ConnectorRegistry, FieldValue, MergedTable, Pod, PodError, PodRegistry,
        Result, RuntimeConfig, SourceRow, SourceState, TimeWindow,
    };
}

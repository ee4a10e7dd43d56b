//! A loaded pod: identity, resolved window, derived views and cached table

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use rlpod_spec::{PodSpec, RewardsSpec, DEFAULT_REWARD_BODY};

use crate::aggregator::SourceAggregator;
use crate::config::RuntimeConfig;
use crate::connector::ConnectorRegistry;
use crate::fields::FieldCatalog;
use crate::hash::read_manifest;
use crate::overlay;
use crate::state::SourceState;
use crate::table::MergedTable;
use crate::window::{resolve_window, TimeWindow};
use crate::{PodError, Result};

/// A pod loaded from a manifest
///
/// The manifest tree, hash and window are fixed for the lifetime of the value; a
/// reload produces a new `Pod`. Only the cached table changes, behind a
/// per-pod lock so readers never observe a half-replaced table.
#[derive(Debug)]
pub struct Pod {
    name: String,
    hash: String,
    manifest_path: Option<PathBuf>,
    spec: PodSpec,
    catalog: FieldCatalog,
    window: TimeWindow,
    fetch_timeout: Option<std::time::Duration>,
    cache: RwLock<Option<MergedTable>>,
}

impl Pod {
    /// Load a pod from a manifest file
    pub fn load(path: impl AsRef<Path>, config: &RuntimeConfig) -> Result<Self> {
        let path = path.as_ref();
        let (bytes, hash) = read_manifest(path)?;
        debug!(path = %path.display(), hash = %hash, "Hashed manifest");

        let spec = PodSpec::from_slice(&bytes)?;
        Self::from_spec(spec, hash, Some(path.to_path_buf()), config, Utc::now())
    }

    /// Build a pod from an already-parsed manifest
    ///
    /// `now` anchors the window when the manifest does not pin an epoch.
    pub fn from_spec(
        spec: PodSpec,
        hash: String,
        manifest_path: Option<PathBuf>,
        config: &RuntimeConfig,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let name = spec
            .name
            .clone()
            .or_else(|| {
                manifest_path
                    .as_deref()
                    .and_then(Path::file_stem)
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .ok_or_else(|| PodError::config("pod has no name and no manifest path"))?;

        let window = resolve_window(spec.params.as_ref(), &config.window, now)?;
        flatten_actions(&spec)?;
        flatten_rewards(&spec)?;
        let catalog = FieldCatalog::from_sources(&spec.data_sources);

        info!(pod = %name, hash = %hash, sources = spec.data_sources.len(), "Loaded pod");
        Ok(Self {
            name,
            hash,
            manifest_path,
            spec,
            catalog,
            window,
            fetch_timeout: config.fetch.timeout(),
            cache: RwLock::new(None),
        })
    }

    /// Pod name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fingerprint of the manifest bytes
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Manifest the pod was loaded from
    #[must_use]
    pub fn manifest_path(&self) -> Option<&Path> {
        self.manifest_path.as_deref()
    }

    /// Manifest tree
    #[must_use]
    pub fn spec(&self) -> &PodSpec {
        &self.spec
    }

    /// Declared fields in table column order
    #[must_use]
    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    /// Resolved window
    #[must_use]
    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    /// Start of the data window
    #[must_use]
    pub fn epoch(&self) -> DateTime<Utc> {
        self.window.epoch()
    }

    /// Total span of history
    #[must_use]
    pub fn period(&self) -> Duration {
        self.window.period()
    }

    /// Query sub-window size
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.window.interval()
    }

    /// Bucket size
    #[must_use]
    pub fn granularity(&self) -> Duration {
        self.window.granularity()
    }

    /// Fully-qualified field names, sorted and deduplicated
    #[must_use]
    pub fn field_names(&self) -> Vec<String> {
        self.spec
            .data_sources
            .iter()
            .flat_map(rlpod_spec::DataSourceSpec::qualified_field_names)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Action name to body, flattened over sources and pod-level entries
    pub fn actions(&self) -> Result<BTreeMap<String, String>> {
        flatten_actions(&self.spec)
    }

    /// Reward name to body
    pub fn rewards(&self) -> Result<BTreeMap<String, String>> {
        flatten_rewards(&self.spec)
    }

    /// Fetch every source and replace the cached table.
    ///
    /// On failure the previous cache is kept as is.
    pub async fn fetch_new_data(&self, connectors: &ConnectorRegistry) -> Result<MergedTable> {
        let manifest_dir = self.manifest_path.as_deref().and_then(Path::parent);
        let table = SourceAggregator::new(connectors)
            .manifest_dir(manifest_dir)
            .deadline(self.fetch_timeout)
            .aggregate(&self.window, &self.spec.data_sources, &self.catalog)
            .await?;

        *self.cache.write().await = Some(table.clone());
        info!(pod = %self.name, rows = table.len(), "Cached new data");
        Ok(table)
    }

    /// Overlay caller-supplied rows onto the cached table.
    ///
    /// Without a cached table the overlay starts from an empty one.
    /// Undeclared fields fail the whole call and leave the cache unchanged.
    pub async fn add_local_state(&self, states: &[SourceState]) -> Result<()> {
        let mut cache = self.cache.write().await;
        match cache.as_mut() {
            Some(table) => overlay::apply(table, states, &self.catalog, &self.window),
            None => {
                let mut table = MergedTable::new(self.catalog.columns().to_vec());
                overlay::apply(&mut table, states, &self.catalog, &self.window)?;
                *cache = Some(table);
                Ok(())
            }
        }
    }

    /// Snapshot of the cached table
    pub async fn cached_table(&self) -> Option<MergedTable> {
        self.cache.read().await.clone()
    }

    /// Cached table as CSV, or `None` if nothing was fetched or overlaid yet
    pub async fn cached_csv(&self) -> Option<String> {
        self.cache.read().await.as_ref().map(MergedTable::to_csv)
    }
}

fn flatten_actions(spec: &PodSpec) -> Result<BTreeMap<String, String>> {
    let mut actions: BTreeMap<String, String> = BTreeMap::new();
    let mut owners: BTreeMap<&str, String> = BTreeMap::new();

    for source in &spec.data_sources {
        for (name, body) in &source.actions {
            if let Some(owner) = owners.insert(name, source.path()) {
                return Err(PodError::config(format!(
                    "action '{name}' is declared by both '{owner}' and '{}'",
                    source.path()
                )));
            }
            actions.insert(name.clone(), body.clone());
        }
    }

    for action in &spec.actions {
        match &action.body {
            Some(body) => {
                if let Some(owner) = owners.insert(&action.name, "pod".to_string()) {
                    return Err(PodError::config(format!(
                        "action '{}' is declared by both '{owner}' and the pod",
                        action.name
                    )));
                }
                actions.insert(action.name.clone(), body.clone());
            }
            None => {
                actions.entry(action.name.clone()).or_default();
            }
        }
    }
    Ok(actions)
}

fn flatten_rewards(spec: &PodSpec) -> Result<BTreeMap<String, String>> {
    match spec.rewards()? {
        None => Ok(BTreeMap::new()),
        Some(RewardsSpec::Uniform) => Ok(flatten_actions(spec)?
            .into_keys()
            .map(|name| (name, DEFAULT_REWARD_BODY.to_string()))
            .collect()),
        Some(RewardsSpec::Explicit(rewards)) => {
            let mut flattened = BTreeMap::new();
            for reward in rewards {
                if flattened
                    .insert(reward.reward.clone(), reward.with.clone())
                    .is_some()
                {
                    return Err(PodError::config(format!(
                        "reward '{}' is declared more than once",
                        reward.reward
                    )));
                }
            }
            Ok(flattened)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::StaticConnector;
    use crate::state::SourceRow;
    use chrono::TimeZone;
    use rlpod_spec::{DataSourceSpec, FieldSpec, PodActionSpec, RewardSpec, TrainingSpec};
    use std::sync::Arc;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn spec() -> PodSpec {
        PodSpec {
            name: Some("trader".to_string()),
            params: Some(rlpod_spec::PodParamsSpec {
                epoch: Some(rlpod_spec::EpochSpec::Unix(0)),
                period: Some("1h".to_string()),
                interval: Some("1m".to_string()),
                granularity: Some("10s".to_string()),
            }),
            data_sources: vec![
                DataSourceSpec::new("coinbase", "btcusd")
                    .field(FieldSpec::new("close"))
                    .action("sell", "sell body"),
                DataSourceSpec::new("local", "portfolio")
                    .field(FieldSpec::new("usd").with_initializer(100.0))
                    .action("buy", "buy body"),
            ],
            actions: vec![PodActionSpec::new("buy"), PodActionSpec::new("hold")],
            training: None,
        }
    }

    fn pod(spec: PodSpec) -> Result<Pod> {
        Pod::from_spec(spec, "hash".to_string(), None, &RuntimeConfig::default(), at(10_000))
    }

    #[test]
    fn test_actions_flatten_sources_and_pod() {
        let pod = pod(spec()).unwrap();
        let actions = pod.actions().unwrap();
        assert_eq!(actions.len(), 3);
        assert_eq!(actions["buy"], "buy body");
        assert_eq!(actions["sell"], "sell body");
        assert_eq!(actions["hold"], "");
    }

    #[test]
    fn test_source_action_collision_is_rejected() {
        let mut spec = spec();
        spec.data_sources[1] = spec.data_sources[1].clone().action("sell", "other");
        assert!(matches!(pod(spec), Err(PodError::Configuration(_))));
    }

    #[test]
    fn test_pod_body_collision_is_rejected() {
        let mut spec = spec();
        spec.actions.push(PodActionSpec {
            name: "buy".to_string(),
            body: Some("pod buy".to_string()),
        });
        assert!(matches!(pod(spec), Err(PodError::Configuration(_))));
    }

    #[test]
    fn test_rewards_shapes() {
        assert!(pod(spec()).unwrap().rewards().unwrap().is_empty());

        let mut uniform = spec();
        uniform.training = Some(TrainingSpec {
            rewards: Some(RewardsSpec::Uniform.to_value().unwrap()),
            ..TrainingSpec::default()
        });
        let rewards = pod(uniform).unwrap().rewards().unwrap();
        assert_eq!(rewards.keys().collect::<Vec<_>>(), ["buy", "hold", "sell"]);
        assert!(rewards.values().all(|body| body == DEFAULT_REWARD_BODY));

        let mut duplicate = spec();
        duplicate.training = Some(TrainingSpec {
            rewards: Some(
                RewardsSpec::Explicit(vec![RewardSpec::new("buy", "a"), RewardSpec::new("buy", "b")])
                    .to_value()
                    .unwrap(),
            ),
            ..TrainingSpec::default()
        });
        assert!(matches!(pod(duplicate), Err(PodError::Configuration(_))));

        let mut malformed = spec();
        malformed.training = PodSpec::from_yaml("training:\n  rewards: sometimes\n")
            .unwrap()
            .training;
        assert!(matches!(pod(malformed), Err(PodError::Configuration(_))));
    }

    #[test]
    fn test_catalog_is_built_once_per_pod() {
        let pod = pod(spec()).unwrap();
        assert_eq!(pod.catalog().columns(), ["local.portfolio.usd", "coinbase.btcusd.close"]);
        assert_eq!(pod.catalog().initializer("local.portfolio.usd"), Some(100.0));
    }

    #[test]
    fn test_oversized_period_is_configuration_error() {
        let mut spec = spec();
        if let Some(params) = spec.params.as_mut() {
            params.epoch = None;
            params.period = Some("100000000d".to_string());
        }
        assert!(matches!(pod(spec), Err(PodError::Configuration(_))));
    }

    #[test]
    fn test_name_falls_back_to_file_stem() {
        let mut spec = spec();
        spec.name = None;
        let loaded = Pod::from_spec(
            spec.clone(),
            "hash".to_string(),
            Some(PathBuf::from("/pods/cartpole-v1.yaml")),
            &RuntimeConfig::default(),
            at(10_000),
        )
        .unwrap();
        assert_eq!(loaded.name(), "cartpole-v1");
        assert!(matches!(pod(spec), Err(PodError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_cache() {
        let pod = pod(spec()).unwrap();
        assert!(pod.cached_csv().await.is_none());

        let mut connectors = ConnectorRegistry::empty();
        connectors.register_instance(
            "coinbase",
            Arc::new(StaticConnector::new(vec![SourceRow::new(at(20)).with("close", 5.0)])),
        );
        let table = pod.fetch_new_data(&connectors).await.unwrap();
        assert_eq!(table.len(), 1);

        let broken = ConnectorRegistry::empty();
        assert!(pod.fetch_new_data(&broken).await.is_err());
        assert_eq!(pod.cached_table().await, Some(table));
    }

    #[tokio::test]
    async fn test_overlay_without_fetch_builds_table() {
        let pod = pod(spec()).unwrap();
        let states = vec![SourceState::new("coinbase.btcusd").row(SourceRow::new(at(31)).with("close", 7.0))];
        pod.add_local_state(&states).await.unwrap();

        assert_eq!(
            pod.cached_csv().await.unwrap(),
            "time,local.portfolio.usd,coinbase.btcusd.close\n30,100,7\n"
        );
    }
}

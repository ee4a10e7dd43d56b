//! Pod manifest root and pod-level sections

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{DataSourceSpec, Result, RewardSpec, RewardsSpec, SpecError, DEFAULT_REWARD_BODY};

/// Pinned start of the data window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EpochSpec {
    /// Seconds since the Unix epoch
    Unix(i64),
    /// RFC 3339 timestamp
    Timestamp(String),
}

/// Temporal parameters declared by a pod; durations use the `17h` / `1h30m` syntax
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PodParamsSpec {
    /// Start of the data window
    #[serde(default, alias = "epoch_time", skip_serializing_if = "Option::is_none")]
    pub epoch: Option<EpochSpec>,
    /// Total span of history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    /// Query sub-window size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    /// Bucket size timestamps are aligned to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granularity: Option<String>,
}

/// A pod-level action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodActionSpec {
    /// Action name
    pub name: String,
    /// Optional body; without one the action exposes a source action of the
    /// same name, or an empty body
    #[serde(rename = "do", default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl PodActionSpec {
    /// Create an action with no body
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: None,
        }
    }
}

/// The `training` section
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrainingSpec {
    /// Reward declarations as written; read them through [`PodSpec::rewards`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewards: Option<serde_yaml::Value>,
    /// Keys the runtime does not interpret, kept for re-serialization
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Root of a pod manifest
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PodSpec {
    /// Pod name; falls back to the manifest file stem when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Temporal parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<PodParamsSpec>,
    /// Data sources, in declaration order
    #[serde(
        rename = "dataSources",
        alias = "dataspaces",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub data_sources: Vec<DataSourceSpec>,
    /// Pod-level actions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<PodActionSpec>,
    /// Training section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training: Option<TrainingSpec>,
}

impl PodSpec {
    /// Parse a manifest
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse a manifest from raw bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_yaml::from_slice(bytes)?)
    }

    /// Render the manifest
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Declared rewards, if any
    ///
    /// Fails with [`SpecError::MalformedRewards`] when the section is neither
    /// `uniform` nor a list of rewards. An empty `rewards:` key counts as absent.
    pub fn rewards(&self) -> Result<Option<RewardsSpec>> {
        match self.training.as_ref().and_then(|t| t.rewards.as_ref()) {
            None | Some(serde_yaml::Value::Null) => Ok(None),
            Some(value) => RewardsSpec::try_from(value).map(Some),
        }
    }

    /// Append a pod-level action, replacing a pod-level entry of the same name
    #[must_use]
    pub fn with_action(mut self, name: impl Into<String>) -> Self {
        let action = PodActionSpec::new(name);
        self.actions.retain(|a| a.name != action.name);
        self.actions.push(action);
        self
    }

    /// Attach [`DEFAULT_REWARD_BODY`] to each of `action_names`
    ///
    /// A `uniform` section is replaced by the explicit list. Fails when
    /// explicit rewards already exist or `action_names` is empty.
    pub fn with_default_rewards<I, S>(mut self, action_names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.rewards()?.as_ref().is_some_and(RewardsSpec::has_explicit) {
            return Err(SpecError::RewardsAlreadyDefined);
        }

        let rewards: Vec<RewardSpec> = action_names
            .into_iter()
            .map(|name| RewardSpec::new(name, DEFAULT_REWARD_BODY))
            .collect();
        if rewards.is_empty() {
            return Err(SpecError::NoActions);
        }

        self.training
            .get_or_insert_with(TrainingSpec::default)
            .rewards = Some(RewardsSpec::Explicit(rewards).to_value()?);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TRADER: &str = r"
name: trader
params:
  epoch_time: 1605312000
  period: 17h
  interval: 17m
  granularity: 17s
dataSources:
  - from: coinbase
    name: btcusd
    fields:
      - name: close
  - from: local
    name: portfolio
    fields:
      - name: usd_balance
        initializer: 1000000
      - name: btc_balance
        initializer: 0
    actions:
      buy: |-
        local.portfolio.usd_balance -= coinbase.btcusd.close
        local.portfolio.btc_balance += 1
actions:
  - name: buy
  - name: hold
training:
  goal: maximize usd_balance
  rewards: uniform
";

    #[test]
    fn test_parse_manifest() {
        let spec = PodSpec::from_yaml(TRADER).unwrap();
        assert_eq!(spec.name.as_deref(), Some("trader"));

        let params = spec.params.as_ref().unwrap();
        assert_eq!(params.epoch, Some(EpochSpec::Unix(1_605_312_000)));
        assert_eq!(params.period.as_deref(), Some("17h"));

        assert_eq!(spec.data_sources.len(), 2);
        assert_eq!(spec.data_sources[1].fields[1].initializer, Some(0.0));
        assert_eq!(spec.rewards().unwrap(), Some(RewardsSpec::Uniform));
        assert!(spec.training.as_ref().unwrap().extra.contains_key("goal"));
    }

    #[test]
    fn test_yaml_round_trip_keeps_content() {
        let spec = PodSpec::from_yaml(TRADER).unwrap();
        let again = PodSpec::from_yaml(&spec.to_yaml().unwrap()).unwrap();
        assert_eq!(spec, again);
    }

    #[test]
    fn test_with_action_appends_once() {
        let spec = PodSpec::from_yaml(TRADER).unwrap().with_action("jump");
        assert_eq!(spec.actions.last(), Some(&PodActionSpec::new("jump")));

        let spec = spec.with_action("buy");
        assert_eq!(spec.actions.iter().filter(|a| a.name == "buy").count(), 1);
        assert_eq!(spec.actions.len(), 3);
    }

    #[test]
    fn test_default_rewards_replace_uniform() {
        let spec = PodSpec::from_yaml(TRADER)
            .unwrap()
            .with_default_rewards(["buy", "hold"])
            .unwrap();

        assert_eq!(
            spec.rewards().unwrap(),
            Some(RewardsSpec::Explicit(vec![
                RewardSpec::new("buy", "reward = 1"),
                RewardSpec::new("hold", "reward = 1"),
            ]))
        );

        let err = spec.with_default_rewards(["buy"]).unwrap_err();
        assert!(matches!(err, SpecError::RewardsAlreadyDefined));
    }

    #[test]
    fn test_default_rewards_need_actions() {
        let err = PodSpec::default()
            .with_default_rewards(Vec::<String>::new())
            .unwrap_err();
        assert!(matches!(err, SpecError::NoActions));
    }

    #[test]
    fn test_malformed_rewards_kept_until_read() {
        let spec = PodSpec::from_yaml("name: bad\ntraining:\n  rewards: sometimes\n").unwrap();
        assert!(matches!(spec.rewards(), Err(SpecError::MalformedRewards(token)) if token == "sometimes"));
        assert!(matches!(
            spec.with_default_rewards(["buy"]),
            Err(SpecError::MalformedRewards(_))
        ));

        let empty = PodSpec::from_yaml("training:\n  rewards:\n").unwrap();
        assert_eq!(empty.rewards().unwrap(), None);
    }

    #[test]
    fn test_legacy_dataspaces_key() {
        let spec = PodSpec::from_yaml("dataspaces:\n  - from: gym\n    name: CartPole\n").unwrap();
        assert_eq!(spec.data_sources[0].path(), "gym.CartPole");
    }

    proptest! {
        #[test]
        fn prop_with_action_keeps_names_unique(names in prop::collection::vec("[a-d]", 0..12)) {
            let mut spec = PodSpec::default();
            for name in &names {
                spec = spec.with_action(name.as_str());
            }

            let mut seen: Vec<&str> = spec.actions.iter().map(|a| a.name.as_str()).collect();
            let total = seen.len();
            seen.sort_unstable();
            seen.dedup();
            prop_assert_eq!(seen.len(), total);
            if let Some(last) = names.last() {
                prop_assert_eq!(&spec.actions[total - 1].name, last);
            }
        }
    }
}

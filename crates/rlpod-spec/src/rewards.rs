//! Training reward declarations

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::SpecError;

/// Token selecting one uniform reward for every action
pub const UNIFORM_TOKEN: &str = "uniform";

/// Reward body assigned to each action by `uniform` and by default rewards
pub const DEFAULT_REWARD_BODY: &str = "reward = 1";

/// A single reward: the action it scores and the opaque body scoring it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSpec {
    /// Action name this reward applies to
    pub reward: String,
    /// Reward body, stored and returned as text
    #[serde(default)]
    pub with: String,
}

impl RewardSpec {
    /// Create a new reward
    pub fn new(reward: impl Into<String>, with: impl Into<String>) -> Self {
        Self {
            reward: reward.into(),
            with: with.into(),
        }
    }
}

/// The `training.rewards` section, resolved from the raw manifest value
///
/// Manifests spell this either as the literal token `uniform` or as a list
/// of `{reward, with}` pairs. Anything else is reported as
/// [`SpecError::MalformedRewards`] when the section is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "RawRewards")]
pub enum RewardsSpec {
    /// Every action receives [`DEFAULT_REWARD_BODY`]
    Uniform,
    /// Rewards listed one by one
    Explicit(Vec<RewardSpec>),
}

impl RewardsSpec {
    /// Whether explicit rewards have been declared
    #[must_use]
    pub fn has_explicit(&self) -> bool {
        matches!(self, Self::Explicit(rewards) if !rewards.is_empty())
    }

    /// Manifest value for this section
    pub fn to_value(&self) -> crate::Result<Value> {
        Ok(serde_yaml::to_value(self)?)
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum RawRewards {
    Token(String),
    List(Vec<RewardSpec>),
}

impl TryFrom<&Value> for RewardsSpec {
    type Error = SpecError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(token) if token.trim() == UNIFORM_TOKEN => Ok(Self::Uniform),
            Value::Sequence(_) => serde_yaml::from_value(value.clone())
                .map(Self::Explicit)
                .map_err(|e| SpecError::MalformedRewards(e.to_string())),
            Value::String(token) => Err(SpecError::MalformedRewards(token.clone())),
            other => Err(SpecError::MalformedRewards(
                serde_yaml::to_string(other)
                    .map(|text| text.trim().to_string())
                    .unwrap_or_default(),
            )),
        }
    }
}

impl From<RewardsSpec> for RawRewards {
    fn from(rewards: RewardsSpec) -> Self {
        match rewards {
            RewardsSpec::Uniform => Self::Token(UNIFORM_TOKEN.to_string()),
            RewardsSpec::Explicit(list) => Self::List(list),
        }
    }
}

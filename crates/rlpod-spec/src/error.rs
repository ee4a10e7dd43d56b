//! Error types for manifest handling

use thiserror::Error;

/// Errors raised while reading, validating or editing a manifest tree
#[derive(Error, Debug)]
pub enum SpecError {
    /// YAML could not be parsed or produced
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The `rewards` section is neither `uniform` nor a list of rewards
    #[error("Rewards section malformed: 'rewards' must be either 'uniform' or an array of rewards, got '{0}'")]
    MalformedRewards(String),

    /// Explicit rewards already exist
    #[error("Pod already has rewards defined")]
    RewardsAlreadyDefined,

    /// There is nothing to attach default rewards to
    #[error("No actions to add rewards to")]
    NoActions,
}

/// Result type alias for manifest operations
pub type Result<T> = std::result::Result<T, SpecError>;

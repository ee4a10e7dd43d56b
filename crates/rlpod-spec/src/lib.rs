//! In-memory manifest tree for reinforcement-learning pods
//!
//! This crate holds the shape a pod manifest takes once parsed:
//! - Pod-level parameters (epoch, period, interval, granularity)
//! - Data sources with their fields, actions and laws
//! - Pod-level actions and training rewards
//!
//! It also provides the pure edit operations used by the editing commands.
//! Writing the tree back to disk is left to the caller.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod datasource;
pub mod error;
pub mod pod;
pub mod rewards;

pub use datasource::{ConnectorSpec, DataSourceSpec, FieldSpec, LOCAL_SOURCE};
pub use error::{Result, SpecError};
pub use pod::{EpochSpec, PodActionSpec, PodParamsSpec, PodSpec, TrainingSpec};
pub use rewards::{RewardSpec, RewardsSpec, DEFAULT_REWARD_BODY, UNIFORM_TOKEN};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        DataSourceSpec, FieldSpec, PodActionSpec, PodSpec, RewardSpec, RewardsSpec, Result,
        SpecError,
    };
}

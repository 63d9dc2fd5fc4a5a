//! Error types for the pose estimator.
//!
//! Only failures that stop the estimator are represented here. A cycle with no accepted
//! particles and a cycle run on stale inputs are both normal operating conditions; they are
//! reported through [`crate::particle::CycleReport`] and [`crate::estimator::FilterStats`]
//! instead.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    /// A configuration value is out of range. Raised before the first cycle runs.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A sampling distribution could not be built from the supplied parameters.
    #[error("sampling error: {0}")]
    Sampling(String),

    /// A batch of predictions does not line up with the particle set.
    #[error("expected {expected} particle(s), got {actual}")]
    ParticleCountMismatch { expected: usize, actual: usize },

    /// The particle set still held pending particles when it was about to be published.
    #[error("{0} particle(s) left pending at publish time")]
    UnresolvedParticles(usize),
}

impl From<rand_distr::NormalError> for FilterError {
    fn from(e: rand_distr::NormalError) -> Self {
        FilterError::Sampling(e.to_string())
    }
}

impl From<rand::distr::uniform::Error> for FilterError {
    fn from(e: rand::distr::uniform::Error) -> Self {
        FilterError::Sampling(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;

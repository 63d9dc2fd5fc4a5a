//! Output boundary of the estimator: particle sets projected into publishable pose arrays.
//!
//! Aggregation is a direct projection. One position per particle, in particle order, with no
//! filtering, weighting or resampling.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};

/// Frame the published positions are expressed in.
pub const DEFAULT_FRAME_ID: &str = "/base_link";

/// Project a particle set onto an ordered sequence of positions.
pub fn aggregate(particles: &[f64]) -> Vec<f64> {
    particles.to_vec()
}

/// Sample mean and (population) variance of a set of values.
pub fn mean_and_variance(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance))
}

/// Published distribution of a single state component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseArray {
    pub frame_id: String,
    pub positions: Vec<f64>,
}

impl PoseArray {
    pub fn from_particles(particles: &[f64]) -> Self {
        PoseArray {
            frame_id: DEFAULT_FRAME_ID.to_string(),
            positions: aggregate(particles),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Unweighted mean of the published positions.
    pub fn estimate(&self) -> Option<f64> {
        mean_and_variance(&self.positions).map(|(mean, _)| mean)
    }
}

/// Published distribution of the planar pose, one `[x, y, yaw]` per particle index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanarPoseArray {
    pub frame_id: String,
    pub poses: Vec<Vector3<f64>>,
}

impl PlanarPoseArray {
    /// Zip three equally sized per-dimension particle sets into poses.
    pub fn from_particles(x: &[f64], y: &[f64], yaw: &[f64]) -> Result<Self> {
        if y.len() != x.len() || yaw.len() != x.len() {
            return Err(FilterError::ParticleCountMismatch {
                expected: x.len(),
                actual: if y.len() != x.len() { y.len() } else { yaw.len() },
            });
        }
        let poses = x
            .iter()
            .zip(y)
            .zip(yaw)
            .map(|((&x, &y), &yaw)| Vector3::new(x, y, yaw))
            .collect();
        Ok(PlanarPoseArray {
            frame_id: DEFAULT_FRAME_ID.to_string(),
            poses,
        })
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Component-wise unweighted mean pose.
    pub fn estimate(&self) -> Option<Vector3<f64>> {
        if self.poses.is_empty() {
            return None;
        }
        let sum = self
            .poses
            .iter()
            .fold(Vector3::zeros(), |acc: Vector3<f64>, p| acc + p);
        Some(sum / self.poses.len() as f64)
    }
}

//! Particle-filter pose estimator for a ground robot
//!
//! This crate estimates a robot's position from two noisy sources: an odometry stream that
//! supplies a forward velocity and a heading, and an external pose reading (e.g. from an
//! indoor positioning system or a simulator) that is corrupted with Gaussian noise. A fixed
//! set of particles is propagated with the odometry and corrected against the pose reading
//! at a fixed rate, and the resulting particle set is published every cycle.
//!
//! This crate is primarily built off of three additional dependencies:
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provides the seeded random engine and the normal and uniform distributions every particle operation draws from.
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the vector type for planar (x, y, yaw) poses.
//! - [`serde`](https://crates.io/crates/serde): Provides (de)serialization for configuration files and CSV traces.
//!
//! All other functionality is auxiliary (logging, I/O and the command line tool).
//!
//! ## Crate overview
//!
//! This crate is organized into several modules:
//! - [sampling]: The single seeded random engine all draws go through.
//! - [motion]: Motion models that propagate one particle and the dead-reckoning reference track.
//! - [likelihood]: Gaussian likelihood and the per-particle acceptance test.
//! - [particle]: The accept/reject particle filter for one scalar state component.
//! - [aggregate]: Projection of particle sets onto publishable pose arrays.
//! - [inputs]: Latest-value registers that decouple sensor callbacks from the estimator cycle.
//! - [estimator]: The estimator object and its fixed-rate loop.
//! - [config]: Estimator configuration and its file formats.
//! - [sim]: CSV replay and synthetic trace generation.
//!
//! ## Filter cycle
//!
//! Each particle $x^{(i)}$ is propagated with its own process-noise draw
//!
//! $$
//! \hat{x}^{(i)}_k = x^{(i)}_{k-1} + v_k \cos(\psi_k) + \epsilon^{(i)}, \qquad \epsilon^{(i)} \sim \mathcal{N}(0, \sigma_R)
//! $$
//!
//! and scored against the measurement $z_k = r_k + \eta_k$, $\eta_k \sim \mathcal{N}(0, \sigma_Q)$,
//! with the Gaussian density $w^{(i)} = \mathcal{N}(z_k; \hat{x}^{(i)}_k, \sigma_Q)$. A prediction is
//! accepted when $w^{(i)} > \mathcal{N}(\hat{x}^{(i)}_k - 2\sigma_Q; \hat{x}^{(i)}_k, \sigma_Q)$, which
//! amounts to $|z_k - \hat{x}^{(i)}_k| < 2\sigma_Q$. Rejected particles are redrawn from a normal
//! distribution fitted to the accepted ones. When nothing is accepted the filter is *degenerate*
//! and the whole set is redrawn from the previous cycle's distribution.
//!
//! There are no weights carried between cycles and no resampling by weight; the particle set
//! itself is the published distribution.
//!
//! ## Tracking modes
//!
//! In the default scalar mode only the x component is filtered. Planar mode runs three
//! independent filters for x, y and yaw that share one random engine; see [estimator].

pub mod aggregate;
pub mod config;
pub mod error;
pub mod estimator;
pub mod inputs;
pub mod likelihood;
pub mod motion;
pub mod particle;
pub mod sampling;
pub mod sim;

pub use aggregate::{PlanarPoseArray, PoseArray};
pub use config::{EstimatorConfig, FilterConfig};
pub use error::{FilterError, Result};
pub use estimator::{CycleOutput, Estimator, FilterStats, LogSink, PoseSink, VecSink};
pub use inputs::{InputChannels, InputReader, InputSnapshot, OdometryReading, PoseReading};
pub use motion::{ControlInput, MotionModel};
pub use particle::{CycleReport, ParticleFilter};
pub use sampling::RandomSampler;

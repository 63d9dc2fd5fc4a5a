//! Kinematic motion models used to propagate particles.
//!
//! A motion model maps a particle's previous scalar state, the latest control input and a
//! process-noise draw to the predicted state. Each particle draws its own noise, so particles
//! are propagated independently.
//!
//! The forward-velocity model advances the state by the velocity projected onto one axis:
//!
//! $$
//! x_k = x_{k-1} + v \cos(\psi) + \epsilon, \qquad \epsilon \sim \mathcal{N}(0, \sigma_R)
//! $$
//!
//! Note that the displacement is not scaled by the cycle period; this matches the estimator
//! as it is tuned. [`DeadReckoning`] is the time-scaled reference track.

use serde::{Deserialize, Serialize};

/// Control/odometry values consumed by the motion model.
///
/// Stale values (no new odometry since the previous cycle) are reused as-is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlInput {
    /// Forward velocity component (m/s)
    pub velocity: f64,
    /// Heading estimate (radians)
    pub heading: f64,
}

impl ControlInput {
    pub fn new(velocity: f64, heading: f64) -> Self {
        ControlInput { velocity, heading }
    }
}

pub trait MotionModel {
    /// Predict the next state of a single particle.
    fn predict(&self, previous_state: f64, control: &ControlInput, process_noise: f64) -> f64;
}

/// Which component of the heading unit vector the forward velocity is projected onto.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    /// `cos(heading)`, the x axis
    #[default]
    Cosine,
    /// `sin(heading)`, the y axis
    Sine,
}

impl Projection {
    pub fn apply(&self, heading: f64) -> f64 {
        match self {
            Projection::Cosine => heading.cos(),
            Projection::Sine => heading.sin(),
        }
    }
}

/// Forward-velocity motion model: `previous + velocity * projection(heading) + noise`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ForwardVelocityModel {
    pub projection: Projection,
}

impl ForwardVelocityModel {
    pub fn new(projection: Projection) -> Self {
        ForwardVelocityModel { projection }
    }
}

impl MotionModel for ForwardVelocityModel {
    fn predict(&self, previous_state: f64, control: &ControlInput, process_noise: f64) -> f64 {
        previous_state + control.velocity * self.projection.apply(control.heading) + process_noise
    }
}

/// Random-walk motion model: the control input is ignored and only noise is added.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RandomWalkModel;

impl MotionModel for RandomWalkModel {
    fn predict(&self, previous_state: f64, _control: &ControlInput, process_noise: f64) -> f64 {
        previous_state + process_noise
    }
}

/// Enum dispatch over the models the estimator can be configured with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AxisModel {
    ForwardVelocity(ForwardVelocityModel),
    RandomWalk(RandomWalkModel),
}

impl Default for AxisModel {
    fn default() -> Self {
        AxisModel::ForwardVelocity(ForwardVelocityModel::default())
    }
}

impl MotionModel for AxisModel {
    fn predict(&self, previous_state: f64, control: &ControlInput, process_noise: f64) -> f64 {
        match self {
            AxisModel::ForwardVelocity(model) => {
                model.predict(previous_state, control, process_noise)
            }
            AxisModel::RandomWalk(model) => model.predict(previous_state, control, process_noise),
        }
    }
}

/// Noise-free reference track integrated alongside the filter.
///
/// Integrates `x += v * cos(heading) * dt` once per cycle. It is reported for comparison
/// and never feeds back into the particle set.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DeadReckoning {
    position: f64,
    dt: f64,
    projection: Projection,
}

impl DeadReckoning {
    pub fn new(dt: f64, projection: Projection) -> Self {
        DeadReckoning {
            position: 0.0,
            dt,
            projection,
        }
    }

    pub fn advance(&mut self, control: &ControlInput) -> f64 {
        self.position += control.velocity * self.projection.apply(control.heading) * self.dt;
        self.position
    }

    pub fn position(&self) -> f64 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn forward_velocity_along_heading() {
        let model = ForwardVelocityModel::default();
        let control = ControlInput::new(0.3, 0.0);
        assert_approx_eq!(model.predict(1.0, &control, 0.0), 1.3, 1e-12);
        assert_approx_eq!(model.predict(1.0, &control, 0.25), 1.55, 1e-12);

        let reversed = ControlInput::new(0.3, PI);
        assert_approx_eq!(model.predict(1.0, &reversed, 0.0), 0.7, 1e-12);
    }

    #[test]
    fn sine_projection_moves_y_axis() {
        let model = ForwardVelocityModel::new(Projection::Sine);
        let control = ControlInput::new(2.0, FRAC_PI_2);
        assert_approx_eq!(model.predict(0.0, &control, 0.0), 2.0, 1e-12);
        let control = ControlInput::new(2.0, 0.0);
        assert_approx_eq!(model.predict(0.0, &control, 0.0), 0.0, 1e-12);
    }

    #[test]
    fn perpendicular_heading_only_adds_noise() {
        let model = ForwardVelocityModel::default();
        let control = ControlInput::new(5.0, FRAC_PI_2);
        assert_approx_eq!(model.predict(2.0, &control, -0.1), 1.9, 1e-12);
    }

    #[test]
    fn random_walk_ignores_control() {
        let model = AxisModel::RandomWalk(RandomWalkModel);
        let control = ControlInput::new(100.0, 0.0);
        assert_eq!(model.predict(1.0, &control, 0.5), 1.5);
    }

    #[test]
    fn dead_reckoning_scales_by_dt() {
        let mut track = DeadReckoning::new(0.05, Projection::Cosine);
        let control = ControlInput::new(0.3, 0.0);
        for _ in 0..20 {
            track.advance(&control);
        }
        assert_approx_eq!(track.position(), 0.3, 1e-12);
    }
}

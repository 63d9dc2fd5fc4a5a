//! Gaussian measurement likelihood and the acceptance test applied to each particle.
//!
//! A predicted particle is scored by the normal density of the measurement centred on the
//! particle. It is accepted when that weight exceeds the density of the point two standard
//! deviations below the particle's own prediction:
//!
//! $$
//! w_i = \mathcal{N}(z;\ \hat{x}_i, \sigma_Q) \quad > \quad \tau_i = \mathcal{N}(\hat{x}_i - 2\sigma_Q;\ \hat{x}_i, \sigma_Q)
//! $$
//!
//! Because the reference point is measured from the particle itself, the test reduces to
//! accepting particles within about two measurement standard deviations of `z`. This is not
//! an importance-weight comparison and should not be mistaken for one.
//!
//! For headings ([`GaussianLikelihood::angular`]) the residual `z - x̂` is the shortest
//! angular difference, so readings on either side of the 0/2π seam score the same.

use std::f64::consts::{PI, TAU};

/// Normal probability density `1/(σ√(2π)) · exp(−|x−μ|²/(2σ²))`.
pub fn gaussian_pdf(x: f64, mean: f64, sigma: f64) -> f64 {
    1.0 / (sigma * (2.0 * PI).sqrt()) * (-(x - mean).abs().powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Signed shortest difference `a - b` between two angles, in `[-π, π)`.
pub fn angular_difference(a: f64, b: f64) -> f64 {
    (a - b + PI).rem_euclid(TAU) - PI
}

/// Weight, threshold and resulting decision for one particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Verdict {
    pub weight: f64,
    pub threshold: f64,
    pub accepted: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussianLikelihood {
    /// Measurement noise standard deviation σ_Q
    pub sigma: f64,
    /// Residuals are taken as the shortest angular difference
    pub angular: bool,
}

impl GaussianLikelihood {
    pub fn new(sigma: f64) -> Self {
        GaussianLikelihood {
            sigma,
            angular: false,
        }
    }

    /// Likelihood for a heading, where `z` and `x̂` are compared across the 0/2π seam.
    pub fn angular(sigma: f64) -> Self {
        GaussianLikelihood {
            sigma,
            angular: true,
        }
    }

    pub fn weight(&self, measurement: f64, predicted: f64) -> f64 {
        if self.angular {
            gaussian_pdf(angular_difference(measurement, predicted), 0.0, self.sigma)
        } else {
            gaussian_pdf(measurement, predicted, self.sigma)
        }
    }

    pub fn threshold(&self, predicted: f64) -> f64 {
        gaussian_pdf(predicted - 2.0 * self.sigma, predicted, self.sigma)
    }

    /// Score a predicted particle against the measurement. Ties reject.
    pub fn evaluate(&self, measurement: f64, predicted: f64) -> Verdict {
        let weight = self.weight(measurement, predicted);
        let threshold = self.threshold(predicted);
        Verdict {
            weight,
            threshold,
            accepted: weight > threshold,
        }
    }
}

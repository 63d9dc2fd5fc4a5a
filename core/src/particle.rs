//! Accept/reject particle filter for a single scalar state component.
//!
//! Each cycle runs to completion in five stages:
//!
//! 1. **Predict**: every particle is pushed through the motion model with its own
//!    process-noise draw.
//! 2. **Score and decide**: the measurement (reading plus one measurement-noise draw) is
//!    scored against every prediction with [`GaussianLikelihood::evaluate`]. Accepted
//!    predictions replace their particle; rejected ones leave the particle *pending*.
//! 3. **Degeneracy check**: with no accepted particle the whole set is redrawn from the
//!    previous cycle's distribution. Otherwise the mean and variance of the accepted particles
//!    are computed, and pending particles met during the variance pass are drawn from the
//!    previous cycle's distribution.
//! 4. **Reseed**: anything still pending is drawn from the newest distribution.
//! 5. **Publish**: the set is resolved back to plain values. A pending particle is never
//!    published.
//!
//! The acceptance rule compares each particle against a threshold derived from its own
//! prediction rather than against the other particles' weights; see
//! [`crate::likelihood`]. There is no weight normalisation and no resampling by weight.
//!
//! A filter built with [`ParticleFilter::with_angular_state`] tracks a heading: particles,
//! measurements and reseed draws are wrapped into `[0, 2π)`, residuals are angular and the
//! accepted mean is the circular mean.
//!
//! The filter does not own a random engine. The caller passes one [`RandomSampler`] to
//! every call, so several filters can share a single deterministic stream.

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::config::{FilterConfig, ReseedSpread};
use crate::error::{FilterError, Result};
use crate::inputs::wrap_heading;
use crate::likelihood::{GaussianLikelihood, angular_difference};
use crate::motion::{AxisModel, ControlInput, MotionModel};
use crate::sampling::RandomSampler;

/// Mean and variance of the accepted particles of a cycle, used to parameterise reseeding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceStats {
    pub mean: f64,
    pub variance: f64,
}

/// Outcome of one filter cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Number of predictions that passed the acceptance test
    pub accepted: usize,
    /// True when no prediction was accepted and the whole set was redrawn
    pub degenerate: bool,
    /// Mean of the distribution the set was (re)seeded from this cycle
    pub mean: f64,
    /// Variance of the distribution the set was (re)seeded from this cycle
    pub variance: f64,
    /// Number of particles drawn from a reseeding distribution
    pub reseed_draws: usize,
}

#[derive(Clone, Debug)]
pub struct ParticleFilter<M: MotionModel = AxisModel> {
    particles: Vec<f64>,
    model: M,
    likelihood: GaussianLikelihood,
    process_noise_std: f64,
    reseed_spread: ReseedSpread,
    /// Statistics of the most recent cycle that accepted at least one particle
    previous: Option<AcceptanceStats>,
    /// State is a heading in `[0, 2π)`
    angular: bool,
}

impl<M: MotionModel> ParticleFilter<M> {
    /// Create a filter and spawn its particles uniformly over the configured range.
    pub fn new(config: &FilterConfig, model: M, sampler: &mut RandomSampler) -> Result<Self> {
        config.validate()?;
        let particles = (0..config.num_particles)
            .map(|_| sampler.uniform(config.spawn_low, config.spawn_high))
            .collect::<Result<Vec<f64>>>()?;
        Ok(Self::assemble(particles, config, model))
    }

    /// Create a filter from an explicit particle set. The set size overrides
    /// `config.num_particles`.
    pub fn from_particles(particles: Vec<f64>, config: &FilterConfig, model: M) -> Result<Self> {
        FilterConfig {
            num_particles: particles.len(),
            ..config.clone()
        }
        .validate()?;
        Ok(Self::assemble(particles, config, model))
    }

    fn assemble(particles: Vec<f64>, config: &FilterConfig, model: M) -> Self {
        ParticleFilter {
            particles,
            model,
            likelihood: GaussianLikelihood::new(config.measurement_noise_std),
            process_noise_std: config.process_noise_std,
            reseed_spread: config.reseed_spread,
            previous: None,
            angular: false,
        }
    }

    /// Treat the state as a heading. Existing particles are wrapped into `[0, 2π)`.
    pub fn with_angular_state(mut self) -> Self {
        self.angular = true;
        self.likelihood = GaussianLikelihood::angular(self.likelihood.sigma);
        for x in self.particles.iter_mut() {
            *x = wrap_heading(*x);
        }
        self
    }

    pub fn is_angular(&self) -> bool {
        self.angular
    }

    fn settle(&self, x: f64) -> f64 {
        if self.angular { wrap_heading(x) } else { x }
    }

    fn residual(&self, x: f64, mean: f64) -> f64 {
        if self.angular {
            angular_difference(x, mean)
        } else {
            x - mean
        }
    }

    pub fn particles(&self) -> &[f64] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn likelihood(&self) -> &GaussianLikelihood {
        &self.likelihood
    }

    /// Statistics carried over to the next cycle, if any cycle has accepted a particle yet.
    pub fn previous_stats(&self) -> Option<AcceptanceStats> {
        self.previous
    }

    /// Propagate every particle through the motion model with independent process noise.
    pub fn predict(&self, control: &ControlInput, sampler: &mut RandomSampler) -> Result<Vec<f64>> {
        self.particles
            .iter()
            .map(|&x| -> Result<f64> {
                let noise = sampler.normal(0.0, self.process_noise_std)?;
                Ok(self.settle(self.model.predict(x, control, noise)))
            })
            .collect()
    }

    /// Corrupt an external reading with one measurement-noise draw.
    pub fn measure(&self, reading: f64, sampler: &mut RandomSampler) -> Result<f64> {
        Ok(self.settle(reading + sampler.normal(0.0, self.likelihood.sigma)?))
    }

    /// Run a full cycle: predict, measure, then [`ParticleFilter::correct`].
    pub fn step(
        &mut self,
        reading: f64,
        control: &ControlInput,
        sampler: &mut RandomSampler,
    ) -> Result<CycleReport> {
        let predicted = self.predict(control, sampler)?;
        let measurement = self.measure(reading, sampler)?;
        self.correct(&predicted, measurement, sampler)
    }

    /// Score `predicted` against `measurement`, handle degeneracy, reseed and publish.
    pub fn correct(
        &mut self,
        predicted: &[f64],
        measurement: f64,
        sampler: &mut RandomSampler,
    ) -> Result<CycleReport> {
        if predicted.len() != self.particles.len() {
            return Err(FilterError::ParticleCountMismatch {
                expected: self.particles.len(),
                actual: predicted.len(),
            });
        }

        // `None` marks a pending particle.
        let mut slots: Vec<Option<f64>> = Vec::with_capacity(predicted.len());
        let mut sum = 0.0;
        let (mut sin_sum, mut cos_sum) = (0.0, 0.0);
        let mut accepted = 0usize;
        for (i, &x) in predicted.iter().enumerate() {
            let verdict = self.likelihood.evaluate(measurement, x);
            trace!(
                "particle {i}: predicted {x:.6}, weight {:.6e}, threshold {:.6e}",
                verdict.weight, verdict.threshold
            );
            if verdict.accepted {
                sum += x;
                sin_sum += x.sin();
                cos_sum += x.cos();
                accepted += 1;
                slots.push(Some(x));
            } else {
                slots.push(None);
            }
        }

        let mut reseed_draws = 0usize;
        let degenerate = accepted == 0;
        let current = if degenerate {
            let fallback = self.previous.unwrap_or_default();
            warn!(
                "Deprived of particles: none of {} accepted, redrawing from N({:.6}, {:.6})",
                slots.len(),
                fallback.mean,
                fallback.variance
            );
            for slot in slots.iter_mut() {
                *slot = Some(self.draw(fallback, sampler)?);
                reseed_draws += 1;
            }
            fallback
        } else {
            let mean = if self.angular {
                wrap_heading(sin_sum.atan2(cos_sum))
            } else {
                sum / accepted as f64
            };
            let mut squared = 0.0;
            let mut settled = 0usize;
            for slot in slots.iter_mut() {
                match *slot {
                    Some(x) => {
                        squared += self.residual(x, mean).abs().powi(2);
                        settled += 1;
                    }
                    None => {
                        if let Some(previous) = self.previous {
                            *slot = Some(self.draw(previous, sampler)?);
                            reseed_draws += 1;
                        }
                    }
                }
            }
            let stats = AcceptanceStats {
                mean,
                variance: squared / settled as f64,
            };
            self.previous = Some(stats);
            stats
        };

        for slot in slots.iter_mut().filter(|slot| slot.is_none()) {
            *slot = Some(self.draw(current, sampler)?);
            reseed_draws += 1;
        }

        let pending = slots.iter().filter(|slot| slot.is_none()).count();
        self.particles = slots
            .into_iter()
            .collect::<Option<Vec<f64>>>()
            .ok_or(FilterError::UnresolvedParticles(pending))?;

        debug!(
            "accepted {accepted}/{}, mean {:.6}, variance {:.6}, reseeded {reseed_draws}",
            self.particles.len(),
            current.mean,
            current.variance
        );

        Ok(CycleReport {
            accepted,
            degenerate,
            mean: current.mean,
            variance: current.variance,
            reseed_draws,
        })
    }

    fn draw(&self, stats: AcceptanceStats, sampler: &mut RandomSampler) -> Result<f64> {
        let x = sampler.normal(stats.mean, self.reseed_spread.std_dev(stats.variance))?;
        Ok(self.settle(x))
    }
}

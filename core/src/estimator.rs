//! Estimator object and its fixed-rate loop.
//!
//! [`Estimator`] owns everything a cycle touches: the particle filter(s), the shared random
//! engine, the dead-reckoning reference track and the running statistics. No state lives
//! outside of it. One call to [`Estimator::step`] runs one complete cycle on one input
//! snapshot; [`Estimator::run`] repeats that at the configured rate, reading inputs from the
//! latest-value registers in [`crate::inputs`].
//!
//! In [`TrackingMode::Scalar`] only the x component is filtered. [`TrackingMode::Planar`]
//! adds independent filters for y (forward velocity projected with `sin`) and yaw (random
//! walk, wrapped into `[0, 2π)`); each dimension is corrected only by its own pose component.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::aggregate::{PlanarPoseArray, PoseArray};
use crate::config::{EstimatorConfig, HeadingSource, TrackingMode};
use crate::error::Result;
use crate::inputs::{Freshness, InputReader, InputSnapshot};
use crate::motion::{
    AxisModel, ControlInput, DeadReckoning, ForwardVelocityModel, Projection, RandomWalkModel,
};
use crate::particle::{CycleReport, ParticleFilter};
use crate::sampling::RandomSampler;

/// Running counters over the life of an estimator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStats {
    /// Cycles completed
    pub cycles: u64,
    /// Cycles in which at least one dimension accepted no particle
    pub degenerate_cycles: u64,
    /// Cycles run on at least one stale input
    pub stale_cycles: u64,
}

/// Everything published by one cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleOutput {
    /// 1-based cycle index
    pub cycle: u64,
    pub x: CycleReport,
    pub y: Option<CycleReport>,
    pub yaw: Option<CycleReport>,
    pub pose_freshness: Freshness,
    pub odometry_freshness: Freshness,
    /// Noise-free reference x position
    pub dead_reckoning: f64,
    /// Published x distribution
    pub positions: PoseArray,
    /// Published planar distribution, in planar mode
    pub planar: Option<PlanarPoseArray>,
}

impl CycleOutput {
    pub fn degenerate(&self) -> bool {
        self.x.degenerate
            || self.y.is_some_and(|r| r.degenerate)
            || self.yaw.is_some_and(|r| r.degenerate)
    }
}

/// Consumer of published cycle outputs.
pub trait PoseSink {
    fn publish(&mut self, output: &CycleOutput);
}

/// Collects every published output in memory.
#[derive(Clone, Debug, Default)]
pub struct VecSink {
    pub outputs: Vec<CycleOutput>,
}

impl PoseSink for VecSink {
    fn publish(&mut self, output: &CycleOutput) {
        self.outputs.push(output.clone());
    }
}

/// Logs a one-line summary of every published output.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl PoseSink for LogSink {
    fn publish(&mut self, output: &CycleOutput) {
        info!(
            "cycle {}: {} positions, estimate {:.4}, accepted {}, mean {:.4}, var {:.4}, dead reckoning {:.4}",
            output.cycle,
            output.positions.len(),
            output.positions.estimate().unwrap_or(f64::NAN),
            output.x.accepted,
            output.x.mean,
            output.x.variance,
            output.dead_reckoning
        );
    }
}

#[derive(Clone, Debug)]
struct PlanarFilters {
    y: ParticleFilter,
    yaw: ParticleFilter,
}

#[derive(Clone, Debug)]
pub struct Estimator {
    config: EstimatorConfig,
    sampler: RandomSampler,
    x: ParticleFilter,
    planar: Option<PlanarFilters>,
    dead_reckoning: DeadReckoning,
    stats: FilterStats,
}

impl Estimator {
    /// Validate the configuration, seed the random engine and spawn the particles.
    pub fn new(config: EstimatorConfig) -> Result<Self> {
        let sampler = RandomSampler::new(config.seed);
        Self::with_sampler(config, sampler)
    }

    /// Like [`Estimator::new`], with an explicitly provided random engine.
    pub fn with_sampler(config: EstimatorConfig, mut sampler: RandomSampler) -> Result<Self> {
        config.validate()?;
        let x = ParticleFilter::new(
            &config.filter,
            AxisModel::ForwardVelocity(ForwardVelocityModel::new(Projection::Cosine)),
            &mut sampler,
        )?;
        let planar = match config.mode {
            TrackingMode::Scalar => None,
            TrackingMode::Planar => Some(PlanarFilters {
                y: ParticleFilter::new(
                    &config.filter,
                    AxisModel::ForwardVelocity(ForwardVelocityModel::new(Projection::Sine)),
                    &mut sampler,
                )?,
                yaw: ParticleFilter::new(
                    &config.filter,
                    AxisModel::RandomWalk(RandomWalkModel),
                    &mut sampler,
                )?
                .with_angular_state(),
            }),
        };
        info!(
            "Initialized {:?} estimator: {} particles, process noise {}, measurement noise {}, {} Hz",
            config.mode,
            config.filter.num_particles,
            config.filter.process_noise_std,
            config.filter.measurement_noise_std,
            config.rate_hz
        );
        Ok(Estimator {
            dead_reckoning: DeadReckoning::new(config.period(), Projection::Cosine),
            config,
            sampler,
            x,
            planar,
            stats: FilterStats::default(),
        })
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn stats(&self) -> FilterStats {
        self.stats
    }

    /// Current x particle set.
    pub fn particles(&self) -> &[f64] {
        self.x.particles()
    }

    /// Current `(y, yaw)` particle sets, in planar mode.
    pub fn planar_particles(&self) -> Option<(&[f64], &[f64])> {
        self.planar
            .as_ref()
            .map(|p| (p.y.particles(), p.yaw.particles()))
    }

    pub fn dead_reckoning(&self) -> f64 {
        self.dead_reckoning.position()
    }

    /// Control input the motion model sees for `snapshot`.
    pub fn control_input(&self, snapshot: &InputSnapshot) -> ControlInput {
        let heading = match self.config.heading_source {
            HeadingSource::Odometry => snapshot.odometry.yaw,
            HeadingSource::Pose => snapshot.pose.yaw,
        };
        ControlInput::new(snapshot.odometry.vx, heading)
    }

    /// Run one complete cycle on `snapshot` and return what it publishes.
    pub fn step(&mut self, snapshot: &InputSnapshot) -> Result<CycleOutput> {
        let control = self.control_input(snapshot);
        if snapshot.is_stale() {
            self.stats.stale_cycles += 1;
            debug!(
                "cycle {} running on stale input (pose {:?}, odometry {:?})",
                self.stats.cycles + 1,
                snapshot.pose_freshness,
                snapshot.odometry_freshness
            );
        }

        let x = self.x.step(snapshot.pose.x, &control, &mut self.sampler)?;
        let (y, yaw, planar) = match self.planar.as_mut() {
            Some(filters) => {
                let y = filters.y.step(snapshot.pose.y, &control, &mut self.sampler)?;
                let yaw = filters
                    .yaw
                    .step(snapshot.pose.yaw, &control, &mut self.sampler)?;
                let poses = PlanarPoseArray::from_particles(
                    self.x.particles(),
                    filters.y.particles(),
                    filters.yaw.particles(),
                )?;
                (Some(y), Some(yaw), Some(poses))
            }
            None => (None, None, None),
        };
        let dead_reckoning = self.dead_reckoning.advance(&control);

        self.stats.cycles += 1;
        let output = CycleOutput {
            cycle: self.stats.cycles,
            x,
            y,
            yaw,
            pose_freshness: snapshot.pose_freshness,
            odometry_freshness: snapshot.odometry_freshness,
            dead_reckoning,
            positions: PoseArray::from_particles(self.x.particles()),
            planar,
        };
        if output.degenerate() {
            self.stats.degenerate_cycles += 1;
        }
        Ok(output)
    }

    /// Run cycles at `rate_hz` until `stop` is set or `max_cycles` cycles have run.
    ///
    /// Each tick snapshots the registers, runs one cycle and publishes to `sink`. The stop
    /// flag is only checked between ticks. A tick that overruns its deadline is not made up
    /// for; the schedule restarts from the current time.
    pub fn run<S: PoseSink>(
        &mut self,
        reader: &mut InputReader,
        sink: &mut S,
        stop: &AtomicBool,
        max_cycles: Option<u64>,
    ) -> Result<FilterStats> {
        let period = Duration::from_secs_f64(self.config.period());
        info!("Starting estimator loop at {} Hz", self.config.rate_hz);
        let mut completed = 0u64;
        let mut next_tick = Instant::now();
        while !stop.load(Ordering::Relaxed) {
            if max_cycles.is_some_and(|max| completed >= max) {
                break;
            }
            let snapshot = reader.snapshot();
            let output = self.step(&snapshot)?;
            sink.publish(&output);
            completed += 1;

            next_tick += period;
            let now = Instant::now();
            if next_tick > now {
                thread::sleep(next_tick - now);
            } else {
                warn!(
                    "cycle {} overran its period by {:?}",
                    output.cycle,
                    now - next_tick
                );
                next_tick = now;
            }
        }
        info!(
            "Estimator loop stopped after {} cycle(s); {} degenerate, {} on stale input",
            self.stats.cycles, self.stats.degenerate_cycles, self.stats.stale_cycles
        );
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use crate::error::FilterError;
    use crate::inputs::{InputChannels, OdometryReading, PoseReading};
    use assert_approx_eq::assert_approx_eq;
    use std::sync::Arc;

    fn seeded(mode: TrackingMode) -> EstimatorConfig {
        EstimatorConfig {
            seed: Some(5),
            mode,
            ..EstimatorConfig::default()
        }
    }

    fn snapshot(x: f64, vx: f64, yaw: f64) -> InputSnapshot {
        InputSnapshot::fresh(
            PoseReading::new(x, 0.0, yaw),
            OdometryReading::from_velocity(vx, yaw),
        )
    }

    #[test]
    fn invalid_config_is_rejected_before_spawning() {
        let config = EstimatorConfig {
            filter: FilterConfig {
                measurement_noise_std: -1.0,
                ..FilterConfig::default()
            },
            ..EstimatorConfig::default()
        };
        let err = Estimator::new(config).unwrap_err();
        assert!(matches!(err, FilterError::InvalidConfiguration(_)));
    }

    #[test]
    fn scalar_cycle_publishes_full_set() {
        let mut estimator = Estimator::new(seeded(TrackingMode::Scalar)).unwrap();
        assert_eq!(estimator.particles().len(), 100);
        for k in 1..=20 {
            let output = estimator.step(&snapshot(0.3 * k as f64, 0.3, 0.0)).unwrap();
            assert_eq!(output.cycle, k);
            assert_eq!(output.positions.len(), 100);
            assert_eq!(output.positions.positions, estimator.particles());
            assert!(output.y.is_none() && output.planar.is_none());
        }
        assert_eq!(estimator.stats().cycles, 20);
        assert_eq!(estimator.stats().stale_cycles, 0);
    }

    #[test]
    fn planar_cycle_filters_three_dimensions() {
        let mut estimator = Estimator::new(seeded(TrackingMode::Planar)).unwrap();
        let output = estimator.step(&snapshot(0.0, 0.0, 0.5)).unwrap();
        let planar = output.planar.unwrap();
        assert_eq!(planar.len(), 100);
        assert!(output.y.is_some() && output.yaw.is_some());
        let (y, yaw) = estimator.planar_particles().unwrap();
        assert_eq!(y.len(), 100);
        assert_eq!(yaw.len(), 100);
        assert_eq!(planar.poses[7][0], estimator.particles()[7]);
        assert_eq!(planar.poses[7][1], y[7]);
        assert_eq!(planar.poses[7][2], yaw[7]);
    }

    #[test]
    fn planar_yaw_tracks_headings_below_zero() {
        let mut estimator = Estimator::new(EstimatorConfig {
            seed: Some(1),
            mode: TrackingMode::Planar,
            ..EstimatorConfig::default()
        })
        .unwrap();
        for _ in 0..50 {
            let output = estimator.step(&snapshot(0.0, 0.0, -0.3)).unwrap();
            assert!(!output.yaw.unwrap().degenerate);
        }
        let (_, yaw) = estimator.planar_particles().unwrap();
        assert!(yaw.iter().all(|x| (0.0..std::f64::consts::TAU).contains(x)));
        assert!(yaw.iter().any(|&x| x != 0.0));
    }

    #[test]
    fn degenerate_cycles_are_counted() {
        let mut estimator = Estimator::new(seeded(TrackingMode::Scalar)).unwrap();
        let output = estimator.step(&snapshot(1.0e3, 0.0, 0.0)).unwrap();
        assert!(output.degenerate());
        assert_eq!(output.x.accepted, 0);
        assert!(estimator.particles().iter().all(|&x| x == 0.0));
        assert_eq!(estimator.stats().degenerate_cycles, 1);
    }

    #[test]
    fn heading_source_selects_yaw() {
        let config = EstimatorConfig {
            heading_source: HeadingSource::Pose,
            ..seeded(TrackingMode::Scalar)
        };
        let estimator = Estimator::new(config).unwrap();
        let snap = InputSnapshot::fresh(
            PoseReading::new(0.0, 0.0, 1.0),
            OdometryReading::from_velocity(0.3, 2.0),
        );
        assert_eq!(estimator.control_input(&snap), ControlInput::new(0.3, 1.0));

        let estimator = Estimator::new(seeded(TrackingMode::Scalar)).unwrap();
        assert_eq!(estimator.control_input(&snap), ControlInput::new(0.3, 2.0));
    }

    #[test]
    fn dead_reckoning_advances_with_period() {
        let mut estimator = Estimator::new(seeded(TrackingMode::Scalar)).unwrap();
        for _ in 0..20 {
            estimator.step(&snapshot(0.0, 0.3, 0.0)).unwrap();
        }
        assert_approx_eq!(estimator.dead_reckoning(), 0.3, 1e-12);
    }

    #[test]
    fn run_stops_after_max_cycles() {
        let config = EstimatorConfig {
            rate_hz: 1000.0,
            ..seeded(TrackingMode::Scalar)
        };
        let mut estimator = Estimator::new(config).unwrap();
        let channels = InputChannels::new();
        channels.publish_pose(PoseReading::new(0.1, 0.0, 0.0));
        channels.publish_odometry(OdometryReading::from_velocity(0.0, 0.0));
        let mut reader = channels.reader();
        let mut sink = VecSink::default();
        let stop = AtomicBool::new(false);

        let stats = estimator
            .run(&mut reader, &mut sink, &stop, Some(5))
            .unwrap();
        assert_eq!(stats.cycles, 5);
        assert_eq!(sink.outputs.len(), 5);
        assert_eq!(sink.outputs[0].pose_freshness, Freshness::Fresh);
        // Nothing was published after the first snapshot.
        assert!(sink.outputs[1..].iter().all(|o| o.pose_freshness == Freshness::Stale));
        assert_eq!(stats.stale_cycles, 4);
    }

    #[test]
    fn run_honours_stop_flag() {
        let config = EstimatorConfig {
            rate_hz: 200.0,
            ..seeded(TrackingMode::Scalar)
        };
        let mut estimator = Estimator::new(config).unwrap();
        let channels = InputChannels::new();
        let mut reader = channels.reader();
        let stop = Arc::new(AtomicBool::new(false));

        let stopper = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                stop.store(true, Ordering::Relaxed);
            })
        };
        let mut sink = VecSink::default();
        let stats = estimator.run(&mut reader, &mut sink, &stop, None).unwrap();
        stopper.join().unwrap();
        assert!(stats.cycles >= 1);
        assert_eq!(stats.cycles as usize, sink.outputs.len());

        let stop = AtomicBool::new(true);
        let before = estimator.stats().cycles;
        estimator.run(&mut reader, &mut sink, &stop, None).unwrap();
        assert_eq!(estimator.stats().cycles, before);
    }
}

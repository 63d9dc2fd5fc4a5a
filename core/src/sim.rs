//! Replay and synthesis utilities.
//!
//! This module provides:
//! - `InputRecord` for reading and writing per-tick input traces to/from CSV files
//! - `OutputRecord` for storing one published cycle per CSV row
//! - `replay`, which runs an estimator over a recorded trace without sleeping
//! - `synthesize_constant_velocity`, which generates a noisy straight-line trace
//! - `spawn_feeder`, which publishes a trace into the input registers in real time

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info};

use crate::error::Result;
use crate::estimator::{CycleOutput, Estimator};
use crate::inputs::{InputChannels, InputSnapshot, OdometryReading, PoseReading};
use crate::sampling::RandomSampler;

/// One tick of recorded input: the external pose reading and the odometry control.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
    /// Sensed x position (m)
    pub pose_x: f64,
    /// Sensed y position (m)
    pub pose_y: f64,
    /// Sensed yaw (rad)
    pub pose_yaw: f64,
    /// Odometry forward velocity (m/s)
    pub velocity: f64,
    /// Odometry heading (rad)
    pub heading: f64,
}

impl InputRecord {
    /// Reads a CSV file and returns a vector of `InputRecord` structs.
    ///
    /// # Arguments
    /// * `path` - Path to the CSV file to read.
    ///
    /// # Returns
    /// * `Ok(Vec<InputRecord>)` if successful.
    /// * `Err` if the file cannot be read or parsed.
    pub fn from_csv<P: AsRef<Path>>(
        path: P,
    ) -> std::result::Result<Vec<Self>, Box<dyn std::error::Error>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            let record: Self = result?;
            records.push(record);
        }
        Ok(records)
    }

    /// Writes a slice of `InputRecord` structs to a CSV file.
    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn pose(&self) -> PoseReading {
        PoseReading::new(self.pose_x, self.pose_y, self.pose_yaw)
    }

    pub fn odometry(&self) -> OdometryReading {
        OdometryReading::from_velocity(self.velocity, self.heading)
    }

    /// Snapshot of this record with both readings fresh.
    pub fn snapshot(&self) -> InputSnapshot {
        InputSnapshot::fresh(self.pose(), self.odometry())
    }
}

/// One published cycle, flattened into a CSV row. Every column describes the x filter;
/// `positions` holds the published x positions joined with `;`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub cycle: u64,
    pub accepted: usize,
    pub degenerate: bool,
    pub mean: f64,
    pub variance: f64,
    pub dead_reckoning: f64,
    /// Unweighted mean of the published positions
    pub estimate: f64,
    pub positions: String,
}

impl OutputRecord {
    pub fn from_output(output: &CycleOutput) -> Self {
        OutputRecord {
            cycle: output.cycle,
            accepted: output.x.accepted,
            degenerate: output.x.degenerate,
            mean: output.x.mean,
            variance: output.x.variance,
            dead_reckoning: output.dead_reckoning,
            estimate: output.positions.estimate().unwrap_or(f64::NAN),
            positions: output
                .positions
                .positions
                .iter()
                .map(|x| x.to_string())
                .collect::<Vec<String>>()
                .join(";"),
        }
    }

    /// Parse the joined `positions` column back into values.
    pub fn positions(&self) -> std::result::Result<Vec<f64>, std::num::ParseFloatError> {
        if self.positions.is_empty() {
            return Ok(Vec::new());
        }
        self.positions.split(';').map(str::parse).collect()
    }

    pub fn from_csv<P: AsRef<Path>>(
        path: P,
    ) -> std::result::Result<Vec<Self>, Box<dyn std::error::Error>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            let record: Self = result?;
            records.push(record);
        }
        Ok(records)
    }

    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Run `estimator` once per record, back to back, and collect every published output.
///
/// Every record is treated as a fresh reading of both inputs.
pub fn replay(estimator: &mut Estimator, records: &[InputRecord]) -> Result<Vec<CycleOutput>> {
    info!("Replaying {} input records", records.len());
    records
        .iter()
        .map(|record| estimator.step(&record.snapshot()))
        .collect()
}

/// Generate `steps` records of a robot moving in a straight line at constant `velocity`
/// along `heading`, starting from the origin.
///
/// The true position advances by `velocity * dt` per step; the pose readings carry
/// independent zero-mean Gaussian noise with standard deviation `noise_std`.
pub fn synthesize_constant_velocity(
    steps: usize,
    velocity: f64,
    heading: f64,
    dt: f64,
    noise_std: f64,
    seed: Option<u64>,
) -> Result<Vec<InputRecord>> {
    let mut sampler = RandomSampler::new(seed);
    let (mut x, mut y) = (0.0, 0.0);
    let mut records = Vec::with_capacity(steps);
    for _ in 0..steps {
        x += velocity * heading.cos() * dt;
        y += velocity * heading.sin() * dt;
        records.push(InputRecord {
            pose_x: x + sampler.normal(0.0, noise_std)?,
            pose_y: y + sampler.normal(0.0, noise_std)?,
            pose_yaw: heading,
            velocity,
            heading,
        });
    }
    debug!("Synthesized {steps} records ending at ({x:.3}, {y:.3})");
    Ok(records)
}

/// Publish `records` into `channels`, one record per `period`.
///
/// The first record is published before this returns, so a loop started right after sees
/// it on its first tick. The rest follow from a background thread; `done` is set once the
/// last record has been published.
pub fn spawn_feeder(
    records: Vec<InputRecord>,
    channels: InputChannels,
    period: Duration,
    done: Arc<AtomicBool>,
) -> JoinHandle<()> {
    let mut records = records.into_iter();
    if let Some(first) = records.next() {
        publish(&channels, &first);
    }
    thread::spawn(move || {
        for record in records {
            thread::sleep(period);
            publish(&channels, &record);
        }
        done.store(true, Ordering::Relaxed);
    })
}

fn publish(channels: &InputChannels, record: &InputRecord) {
    channels.publish_pose(record.pose());
    channels.publish_odometry(record.odometry());
}

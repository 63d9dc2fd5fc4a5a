//! Latest-value input registers shared between the estimator and its collaborators.
//!
//! Pose and odometry readings arrive at their own cadence from other threads. Each kind of
//! reading lives in a single-slot register that only ever keeps the newest value. The estimator
//! takes a snapshot of both registers at the start of a cycle and never waits for a new value.
//! A register that has not been written since the previous snapshot is reported as
//! [`Freshness::Stale`] and its last value is reused.
//!
//! ```rust
//! use posefilter::inputs::{Freshness, InputChannels, PoseReading};
//!
//! let channels = InputChannels::new();
//! let mut reader = channels.reader();
//! channels.publish_pose(PoseReading::new(1.0, 2.0, 0.0));
//! assert_eq!(reader.snapshot().pose_freshness, Freshness::Fresh);
//! assert_eq!(reader.snapshot().pose_freshness, Freshness::Stale);
//! ```

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::sync::{Arc, Mutex, PoisonError};

/// Map a yaw angle into `[0, 2π)`.
pub fn wrap_heading(yaw: f64) -> f64 {
    let wrapped = yaw.rem_euclid(TAU);
    if wrapped >= TAU { 0.0 } else { wrapped }
}

/// Absolute pose from the external localisation collaborator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseReading {
    /// x position (m)
    pub x: f64,
    /// y position (m)
    pub y: f64,
    /// yaw (rad) in [0, 2π)
    pub yaw: f64,
}

impl PoseReading {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        PoseReading {
            x,
            y,
            yaw: wrap_heading(yaw),
        }
    }
}

/// Odometry from the wheel-odometry collaborator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OdometryReading {
    /// x position (m)
    pub x: f64,
    /// y position (m)
    pub y: f64,
    /// yaw (rad) in [0, 2π)
    pub yaw: f64,
    /// forward linear velocity (m/s)
    pub vx: f64,
    /// lateral linear velocity (m/s)
    pub vy: f64,
    /// angular velocity about z (rad/s)
    pub angular_z: f64,
}

impl OdometryReading {
    /// Odometry reading carrying only a forward velocity and a heading.
    pub fn from_velocity(vx: f64, yaw: f64) -> Self {
        OdometryReading {
            yaw: wrap_heading(yaw),
            vx,
            ..OdometryReading::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Written since the previous snapshot.
    Fresh,
    /// Reused from an earlier snapshot (or never written).
    Stale,
}

/// Thread-safe single-slot register with a publish counter.
#[derive(Debug, Default)]
pub struct LatestValue<T> {
    slot: Mutex<(T, u64)>,
}

impl<T: Copy + Default> LatestValue<T> {
    pub fn new() -> Self {
        LatestValue {
            slot: Mutex::new((T::default(), 0)),
        }
    }

    /// Replace the stored value.
    pub fn publish(&self, value: T) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.0 = value;
        slot.1 += 1;
    }

    /// Current value and the number of publishes so far (0 means never written).
    pub fn read(&self) -> (T, u64) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Readings consumed by one estimator cycle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputSnapshot {
    pub pose: PoseReading,
    pub odometry: OdometryReading,
    pub pose_freshness: Freshness,
    pub odometry_freshness: Freshness,
}

impl InputSnapshot {
    /// Snapshot with both readings marked fresh.
    pub fn fresh(pose: PoseReading, odometry: OdometryReading) -> Self {
        InputSnapshot {
            pose,
            odometry,
            pose_freshness: Freshness::Fresh,
            odometry_freshness: Freshness::Fresh,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.pose_freshness == Freshness::Stale || self.odometry_freshness == Freshness::Stale
    }
}

/// Writer side of the input registers. Cheap to clone and hand to collaborator threads.
#[derive(Clone, Debug, Default)]
pub struct InputChannels {
    pose: Arc<LatestValue<PoseReading>>,
    odometry: Arc<LatestValue<OdometryReading>>,
}

impl InputChannels {
    pub fn new() -> Self {
        InputChannels {
            pose: Arc::new(LatestValue::new()),
            odometry: Arc::new(LatestValue::new()),
        }
    }

    pub fn publish_pose(&self, pose: PoseReading) {
        self.pose.publish(pose);
    }

    pub fn publish_odometry(&self, odometry: OdometryReading) {
        self.odometry.publish(odometry);
    }

    /// A reader that tracks freshness relative to its own previous snapshot.
    pub fn reader(&self) -> InputReader {
        InputReader {
            channels: self.clone(),
            last_pose_sequence: 0,
            last_odometry_sequence: 0,
        }
    }
}

#[derive(Debug)]
pub struct InputReader {
    channels: InputChannels,
    last_pose_sequence: u64,
    last_odometry_sequence: u64,
}

impl InputReader {
    /// Non-blocking read of both registers.
    pub fn snapshot(&mut self) -> InputSnapshot {
        let (pose, pose_sequence) = self.channels.pose.read();
        let (odometry, odometry_sequence) = self.channels.odometry.read();
        let snapshot = InputSnapshot {
            pose,
            odometry,
            pose_freshness: freshness(pose_sequence, self.last_pose_sequence),
            odometry_freshness: freshness(odometry_sequence, self.last_odometry_sequence),
        };
        self.last_pose_sequence = pose_sequence;
        self.last_odometry_sequence = odometry_sequence;
        snapshot
    }
}

fn freshness(sequence: u64, last_seen: u64) -> Freshness {
    if sequence > last_seen {
        Freshness::Fresh
    } else {
        Freshness::Stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::PI;
    use std::thread;

    #[test]
    fn negative_yaw_is_mapped_positive() {
        assert_approx_eq!(wrap_heading(-PI / 2.0), 1.5 * PI, 1e-12);
        assert_eq!(wrap_heading(0.0), 0.0);
        assert_approx_eq!(wrap_heading(PI), PI, 1e-12);
        assert_approx_eq!(wrap_heading(3.0 * PI), PI, 1e-12);
        let tiny = wrap_heading(-1e-20);
        assert!((0.0..TAU).contains(&tiny));
        assert_approx_eq!(PoseReading::new(0.0, 0.0, -PI).yaw, PI, 1e-12);
    }

    #[test]
    fn unwritten_registers_are_stale_zero() {
        let channels = InputChannels::new();
        let mut reader = channels.reader();
        let snapshot = reader.snapshot();
        assert_eq!(snapshot.pose, PoseReading::default());
        assert_eq!(snapshot.odometry, OdometryReading::default());
        assert_eq!(snapshot.pose_freshness, Freshness::Stale);
        assert_eq!(snapshot.odometry_freshness, Freshness::Stale);
        assert!(snapshot.is_stale());
    }

    #[test]
    fn stale_values_are_reused() {
        let channels = InputChannels::new();
        let mut reader = channels.reader();
        channels.publish_pose(PoseReading::new(1.0, 0.0, 0.0));
        channels.publish_odometry(OdometryReading::from_velocity(0.3, 0.2));

        let first = reader.snapshot();
        assert!(!first.is_stale());

        channels.publish_pose(PoseReading::new(2.0, 0.0, 0.0));
        let second = reader.snapshot();
        assert_eq!(second.pose.x, 2.0);
        assert_eq!(second.pose_freshness, Freshness::Fresh);
        assert_eq!(second.odometry_freshness, Freshness::Stale);
        assert_eq!(second.odometry.vx, 0.3);
        assert_eq!(second.odometry.yaw, 0.2);
    }

    #[test]
    fn only_latest_value_is_kept() {
        let channels = InputChannels::new();
        let mut reader = channels.reader();
        for i in 0..10 {
            channels.publish_pose(PoseReading::new(i as f64, 0.0, 0.0));
        }
        let snapshot = reader.snapshot();
        assert_eq!(snapshot.pose.x, 9.0);
        assert_eq!(snapshot.pose_freshness, Freshness::Fresh);
    }

    #[test]
    fn publishes_from_other_threads() {
        let channels = InputChannels::new();
        let mut reader = channels.reader();
        let writers: Vec<_> = (0..4)
            .map(|i| {
                let channels = channels.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        channels.publish_odometry(OdometryReading::from_velocity(i as f64, 0.0));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        let snapshot = reader.snapshot();
        assert_eq!(snapshot.odometry_freshness, Freshness::Fresh);
        assert!((0.0..4.0).contains(&snapshot.odometry.vx));
    }
}

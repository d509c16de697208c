//! PTP-style clock synchronization.
//!
//! One grand master defines the time base. Masters synchronize to the grand
//! master and slaves are spread round-robin over the masters (or hang off the
//! grand master directly when there are none). Each exchange measures the
//! node's offset against its parent; offsets accumulate up the hierarchy so
//! every reported [`ClockOffset`] is relative to the grand master.
//!
//! Readiness is a pure read of the latest offsets and never waits on an
//! exchange in flight.

mod exchange;
mod service;
mod task;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ClockConfig;
use crate::fabric::NodeId;

pub use exchange::{SimulatedTimeExchange, TimeExchange, TimestampQuad};
pub use service::{ClockSyncService, SyncRound};
pub use task::ClockSyncTask;

/// Position of a clock in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockRole {
    GrandMaster,
    Master,
    Slave,
}

/// Latest synchronization state of one node, relative to the grand master.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockOffset {
    pub offset_ns: f64,
    /// Smoothed magnitude of offset change between exchanges.
    pub jitter_ns: f64,
    /// Free-running frequency error.
    pub drift_ppm: f64,
    /// One-way path delay to the parent.
    pub path_delay_ns: f64,
    pub last_sync: Option<DateTime<Utc>>,
    /// 1.0 is a perfect clock.
    pub quality: f64,
}

impl Default for ClockOffset {
    fn default() -> Self {
        Self {
            offset_ns: 0.0,
            jitter_ns: 0.0,
            drift_ppm: 0.0,
            path_delay_ns: 0.0,
            last_sync: None,
            quality: 0.0,
        }
    }
}

impl ClockOffset {
    /// The grand master's own view of itself.
    pub(crate) fn reference(now: DateTime<Utc>) -> Self {
        Self {
            quality: 1.0,
            last_sync: Some(now),
            ..Self::default()
        }
    }

    /// Synchronized, |offset| below the ceiling and quality above the floor.
    pub fn is_acceptable(&self, config: &ClockConfig) -> bool {
        self.last_sync.is_some()
            && self.offset_ns.abs() < config.max_offset_ns
            && self.quality > config.min_quality
    }
}

/// Aggregate clock health.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClockMetrics {
    pub grand_master: Option<NodeId>,
    pub registered: usize,
    pub synchronized: usize,
    /// Nodes whose offset is currently acceptable for ignition.
    pub ready: usize,
    pub max_abs_offset_ns: f64,
    pub mean_jitter_ns: f64,
    pub min_quality: f64,
}

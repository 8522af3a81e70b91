//! Scanner module containing the scan orchestrator and its result types

pub mod engine;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use engine::{Orchestrator, ScanPhase, ScanRequest, ScanSession};

/// Liveness of a host as reported by the discovery phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Up,
    Down,
}

impl HostStatus {
    /// Decode a reported host state; anything but `up` counts as down
    pub fn from_report(state: Option<&str>) -> Self {
        match state {
            Some(s) if s.eq_ignore_ascii_case("up") => HostStatus::Up,
            _ => HostStatus::Down,
        }
    }
}

/// State of a single port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
}

impl PortState {
    /// Decode a reported port state, defaulting to closed when absent
    pub fn from_report(state: Option<&str>) -> Self {
        match state.map(str::trim) {
            None | Some("") | Some("closed") => PortState::Closed,
            Some("open") => PortState::Open,
            // filtered, open|filtered, closed|filtered, unfiltered
            Some(_) => PortState::Filtered,
        }
    }
}

/// A probed port on a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRecord {
    pub protocol: String,
    #[serde(rename = "portid")]
    pub port: u16,
    pub state: PortState,
    /// Service name, empty when unknown
    pub service: String,
    /// Product, version and extra info joined by spaces, empty when unknown
    pub version: String,
}

/// A host with its (open) ports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    #[serde(rename = "addr")]
    pub address: String,
    pub status: HostStatus,
    pub ports: Vec<PortRecord>,
}

impl HostRecord {
    pub fn is_up(&self) -> bool {
        self.status == HostStatus::Up
    }

    pub fn open_ports(&self) -> impl Iterator<Item = &PortRecord> {
        self.ports.iter().filter(|p| p.state == PortState::Open)
    }
}

/// Merged outcome of one scan request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub hosts: Vec<HostRecord>,
    /// Wall-clock time spent, serialized as milliseconds
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl ScanReport {
    pub fn hosts_up(&self) -> usize {
        self.hosts.iter().filter(|h| h.is_up()).count()
    }

    pub fn open_port_count(&self) -> usize {
        self.hosts.iter().map(|h| h.ports.len()).sum()
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

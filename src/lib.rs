//! Lansweep - private-network discovery over HTTP
//!
//! Validates a target range, sweeps it for live hosts with nmap, probes the
//! live subset for open ports and returns the merged result, either in one
//! response or as a stream of progress events.

pub mod api;
pub mod config;
pub mod error;
pub mod output;
pub mod probe;
pub mod scanner;
pub mod utils;

// Re-export commonly used types
pub use config::ServiceConfig;
pub use error::{ProbeCause, ScanError};
pub use output::ScanEvent;
pub use probe::{NmapExecutor, Probe, ProbeExecutor, ProbeRunner};
pub use scanner::{HostRecord, HostStatus, Orchestrator, PortRecord, PortState, ScanReport, ScanRequest};
pub use utils::{BudgetPlanner, ProfileCatalog};

pub type Result<T> = std::result::Result<T, ScanError>;

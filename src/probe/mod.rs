//! Probe layer: running the external scanner and decoding its output
//!
//! [`ProbeExecutor`] launches the tool once and reports what happened.
//! [`Probe`] is the higher-level seam the orchestrator talks to; it adds output
//! recovery and the privilege fallback on top of an executor.

pub mod nmap;
pub mod parser;

use async_trait::async_trait;
use std::time::Duration;

use crate::Result;

pub use nmap::{NmapExecutor, ProbeRunner};
pub use parser::{parse_document, parse_hosts, recover_partial, NmapRun};

/// How a probe process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeExit {
    /// The process ended on its own; `None` when it was killed by a signal
    Exited(Option<i32>),
    /// The timeout elapsed and the process was interrupted
    TimedOut,
}

/// Captured output of a single probe invocation
#[derive(Debug, Clone)]
pub struct ProbeOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit: ProbeExit,
}

impl ProbeOutput {
    pub fn success(&self) -> bool {
        self.exit == ProbeExit::Exited(Some(0))
    }
}

/// Runs the external tool once with the exact arguments given
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    async fn execute(&self, args: &[String], timeout: Duration) -> Result<ProbeOutput>;
}

/// Runs one probe phase and returns the decoded document
#[async_trait]
pub trait Probe: Send + Sync {
    async fn run(&self, args: &[String], timeout: Duration) -> Result<NmapRun>;
}

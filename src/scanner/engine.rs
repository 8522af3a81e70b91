//! Scan orchestrator: single-flight gate, the two probe phases and the merge

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::output::{chunk_events, progress, EventSink, ScanEvent};
use crate::probe::{parse_hosts, Probe};
use crate::scanner::{HostRecord, PortRecord, ScanReport};
use crate::utils::{
    check_size, estimate_host_count, validate, BudgetPlanner, ProfileCatalog, ProfileOverrides,
    ScanProfile, TargetSpec,
};
use crate::{Result, ScanError};

/// Flag that disables reverse DNS; always passed to the probe
const NO_DNS: &str = "-n";

/// A scan as asked for by a caller, before validation
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub target: Option<String>,
    pub profile: Option<String>,
    pub overrides: ProfileOverrides,
}

impl ScanRequest {
    pub fn new(target: impl Into<String>, profile: Option<&str>) -> Self {
        Self {
            target: Some(target.into()),
            profile: profile.map(str::to_string),
            overrides: ProfileOverrides::default(),
        }
    }
}

/// Where a session currently is; phases only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScanPhase {
    Discovery,
    PortScan,
    Merging,
    Done,
    Failed,
}

/// State of one scan request, owned by the task running it
#[derive(Debug)]
pub struct ScanSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    started: Instant,
    phase: ScanPhase,
    pub discovery_result: Option<Vec<HostRecord>>,
    pub port_result: Option<Vec<HostRecord>>,
}

impl ScanSession {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            started: Instant::now(),
            phase: ScanPhase::Discovery,
            discovery_result: None,
            port_result: None,
        }
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn advance(&mut self, next: ScanPhase) -> Result<()> {
        if next <= self.phase || self.phase >= ScanPhase::Done {
            return Err(ScanError::Internal(format!(
                "scan {} cannot move from {:?} to {:?}",
                self.id, self.phase, next
            )));
        }
        log::debug!("[{}] {:?} -> {:?}", self.id, self.phase, next);
        self.phase = next;
        Ok(())
    }

    fn fail(&mut self) {
        if self.phase < ScanPhase::Done {
            self.phase = ScanPhase::Failed;
        }
    }
}

/// A request that passed validation and is ready to probe
#[derive(Debug, Clone)]
struct PreparedScan {
    target: TargetSpec,
    host_estimate: u64,
    profile: ScanProfile,
}

/// Drives validated scan requests through the probe phases
///
/// Cloning is cheap and every clone shares the same single-flight gate.
#[derive(Clone)]
pub struct Orchestrator {
    probe: Arc<dyn Probe>,
    catalog: Arc<ProfileCatalog>,
    planner: BudgetPlanner,
    max_hosts: Option<u64>,
    detail_limit: usize,
    gate: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(probe: Arc<dyn Probe>, catalog: Arc<ProfileCatalog>, config: &ServiceConfig) -> Self {
        Self {
            probe,
            catalog,
            planner: BudgetPlanner::from_config(config),
            max_hosts: config.max_hosts,
            detail_limit: config.error_detail_limit,
            gate: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn catalog(&self) -> &ProfileCatalog {
        &self.catalog
    }

    pub fn detail_limit(&self) -> usize {
        self.detail_limit
    }

    /// True while a scan holds the gate
    pub fn is_busy(&self) -> bool {
        self.gate.available_permits() == 0
    }

    /// Run a scan to completion and return the merged hosts
    pub async fn run(&self, request: &ScanRequest) -> Result<ScanReport> {
        let prepared = self.prepare(request)?;
        let _permit = self.acquire()?;
        self.execute(prepared, None).await
    }

    /// Start a scan whose progress is delivered as events
    ///
    /// Validation and gate failures are returned directly; anything after that
    /// arrives as a terminal error event on the receiver.
    pub fn run_streaming(&self, request: &ScanRequest) -> Result<mpsc::Receiver<ScanEvent>> {
        let prepared = self.prepare(request)?;
        let permit = self.acquire()?;
        let (sink, rx) = EventSink::channel();
        let orchestrator = self.clone();

        tokio::spawn(async move {
            orchestrator.produce_events(prepared, &sink).await;
            // release the gate before the consumer sees the end of the stream
            drop(permit);
            drop(sink);
        });

        Ok(rx)
    }

    async fn produce_events(&self, prepared: PreparedScan, sink: &EventSink) {
        sink.progress(progress::ACCEPTED).await;

        match self.execute(prepared, Some(sink)).await {
            Ok(report) => {
                for event in chunk_events(&report.hosts) {
                    if !sink.send(event).await {
                        return;
                    }
                }
                sink.progress(progress::COMPLETE).await;
            }
            Err(e) => {
                sink.send(ScanEvent::from_error(&e, self.detail_limit)).await;
            }
        }
    }

    fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        self.gate
            .clone()
            .try_acquire_owned()
            .map_err(|_| ScanError::ScanInProgress)
    }

    fn prepare(&self, request: &ScanRequest) -> Result<PreparedScan> {
        let raw_target = request
            .target
            .as_deref()
            .ok_or_else(|| ScanError::InvalidTarget("target is required".to_string()))?;

        let target = validate(raw_target)?;
        let host_estimate = estimate_host_count(&target);
        check_size(host_estimate, self.max_hosts)?;

        let profile = self
            .catalog
            .resolve(request.profile.as_deref())?
            .with_overrides(&request.overrides)?;

        Ok(PreparedScan {
            target,
            host_estimate,
            profile,
        })
    }

    async fn execute(&self, prepared: PreparedScan, events: Option<&EventSink>) -> Result<ScanReport> {
        let mut session = ScanSession::new();
        log::info!(
            "[{}] Starting {} scan of {} (~{} hosts)",
            session.id,
            prepared.profile.name,
            prepared.target,
            prepared.host_estimate
        );

        match self.drive(&mut session, &prepared, events).await {
            Ok(hosts) => {
                session.advance(ScanPhase::Done)?;
                let report = ScanReport {
                    hosts,
                    duration: session.elapsed(),
                };
                log::info!(
                    "[{}] Scan completed in {:.2}s - {} hosts, {} up, {} open ports",
                    session.id,
                    report.duration.as_secs_f64(),
                    report.hosts.len(),
                    report.hosts_up(),
                    report.open_port_count()
                );
                Ok(report)
            }
            Err(e) => {
                session.fail();
                log::error!(
                    "[{}] Scan failed after {:.2}s: {}",
                    session.id,
                    session.elapsed().as_secs_f64(),
                    e
                );
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        session: &mut ScanSession,
        prepared: &PreparedScan,
        events: Option<&EventSink>,
    ) -> Result<Vec<HostRecord>> {
        emit(events, progress::DISCOVERY_STARTED).await;

        let mut discovery_args = prepared.profile.discovery.clone();
        discovery_args.push(NO_DNS.to_string());
        discovery_args.extend(prepared.target.to_args());

        let discovery_timeout = self.planner.plan_discovery_timeout(prepared.host_estimate);
        let discovery_doc = self.probe.run(&discovery_args, discovery_timeout).await?;
        let discovered = parse_hosts(&discovery_doc);
        let live = live_addresses(&discovered);
        log::info!(
            "[{}] Discovery found {} hosts, {} up",
            session.id,
            discovered.len(),
            live.len()
        );
        session.discovery_result = Some(discovered);
        emit(events, progress::DISCOVERY_DONE).await;

        session.advance(ScanPhase::PortScan)?;
        let port_result = if live.is_empty() {
            log::info!("[{}] No live hosts, skipping port scan", session.id);
            Vec::new()
        } else {
            let mut port_args = prepared.profile.ports.clone();
            port_args.push(NO_DNS.to_string());
            port_args.extend(live.iter().cloned());

            let port_timeout = self.planner.plan_port_scan_timeout(live.len());
            let doc = self.probe.run(&port_args, port_timeout).await?;
            parse_hosts(&doc)
        };
        session.port_result = Some(port_result);
        emit(events, progress::PORTS_DONE).await;

        session.advance(ScanPhase::Merging)?;
        let discovered = session.discovery_result.as_deref().unwrap_or_default();
        let scanned = session.port_result.as_deref().unwrap_or_default();
        Ok(merge(discovered, scanned))
    }
}

async fn emit(events: Option<&EventSink>, value: u8) {
    if let Some(sink) = events {
        sink.progress(value).await;
    }
}

/// Addresses of up hosts that can be handed back to the probe as targets
fn live_addresses(hosts: &[HostRecord]) -> Vec<String> {
    hosts
        .iter()
        .filter(|h| h.is_up())
        .filter(|h| h.address.parse::<IpAddr>().is_ok())
        .map(|h| h.address.clone())
        .collect()
}

/// Attach open ports from the port phase to the discovery hosts
///
/// Output order follows `discovered`; down hosts never carry ports.
pub fn merge(discovered: &[HostRecord], scanned: &[HostRecord]) -> Vec<HostRecord> {
    let open_by_address: HashMap<&str, Vec<PortRecord>> = scanned
        .iter()
        .map(|h| (h.address.as_str(), h.open_ports().cloned().collect()))
        .collect();

    discovered
        .iter()
        .map(|host| HostRecord {
            address: host.address.clone(),
            status: host.status,
            ports: if host.is_up() {
                open_by_address
                    .get(host.address.as_str())
                    .cloned()
                    .unwrap_or_default()
            } else {
                Vec::new()
            },
        })
        .collect()
}

//! Time budgeting for the two probe phases

use std::time::Duration;

use crate::config::{DiscoveryTiming, PortScanTiming, ServiceConfig};

/// Derives per-phase probe timeouts from host counts and the request budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetPlanner {
    discovery: DiscoveryTiming,
    port_scan: PortScanTiming,
    total_budget: Duration,
    /// Extra time an interrupted probe may run past its timeout
    interrupt_grace: Duration,
}

impl BudgetPlanner {
    pub fn new(
        discovery: DiscoveryTiming,
        port_scan: PortScanTiming,
        total_budget: Duration,
        interrupt_grace: Duration,
    ) -> Self {
        Self {
            discovery,
            port_scan,
            total_budget,
            interrupt_grace,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            config.discovery,
            config.port_scan,
            Duration::from_millis(config.request_budget_ms),
            config.interrupt_grace(),
        )
    }

    pub fn total_budget(&self) -> Duration {
        self.total_budget
    }

    /// Timeout for the liveness sweep
    ///
    /// Scales with the estimated host count, never drops below the floor unless
    /// the budget ceiling is lower, and always leaves the reserved time free.
    /// The interrupt grace period comes out of the ceiling as well.
    pub fn plan_discovery_timeout(&self, host_count: u64) -> Duration {
        let scaled = host_count.saturating_mul(self.discovery.per_host_ms);
        let ceiling = (self.total_budget.as_millis() as u64)
            .saturating_sub(self.discovery.reserved_ms)
            .saturating_sub(self.interrupt_grace.as_millis() as u64);

        Duration::from_millis(scaled.max(self.discovery.floor_ms).min(ceiling))
    }

    /// Timeout for the port/service phase, independent of the request budget
    pub fn plan_port_scan_timeout(&self, live_host_count: usize) -> Duration {
        let scaled = (live_host_count as u64).saturating_mul(self.port_scan.per_host_ms);

        Duration::from_millis(scaled.clamp(self.port_scan.floor_ms, self.port_scan.ceiling_ms))
    }
}

impl Default for BudgetPlanner {
    fn default() -> Self {
        Self::from_config(&ServiceConfig::default())
    }
}

//! Configuration module for the lansweep service

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default cap on the estimated number of hosts a single request may cover
pub const DEFAULT_MAX_HOSTS: u64 = 4096;

/// Default wall-clock budget for one synchronous request
pub const DEFAULT_REQ_BUDGET_MS: u64 = 55_000;

/// Main configuration structure for the service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to
    pub listen_addr: SocketAddr,

    /// Path to the nmap binary
    pub nmap_path: String,

    /// Optional TOML profile catalog replacing the built-in profiles
    pub profiles_path: Option<PathBuf>,

    /// Upper bound on the estimated host count, `None` disables the cap
    pub max_hosts: Option<u64>,

    /// Total wall-clock budget for a request in milliseconds
    pub request_budget_ms: u64,

    /// Discovery-phase budgeting
    pub discovery: DiscoveryTiming,

    /// Port-phase budgeting
    pub port_scan: PortScanTiming,

    /// How long an interrupted probe may take to flush its output
    pub interrupt_grace_ms: u64,

    /// Maximum length of error details returned to callers
    pub error_detail_limit: usize,
}

/// Timing constants for the discovery phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiscoveryTiming {
    pub per_host_ms: u64,
    pub floor_ms: u64,
    /// Part of the request budget kept free for producing the response
    pub reserved_ms: u64,
}

/// Timing constants for the port/service phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PortScanTiming {
    pub per_host_ms: u64,
    pub floor_ms: u64,
    pub ceiling_ms: u64,
}

impl Default for DiscoveryTiming {
    fn default() -> Self {
        Self {
            per_host_ms: 120,
            floor_ms: 15_000,
            reserved_ms: 5_000,
        }
    }
}

impl Default for PortScanTiming {
    fn default() -> Self {
        Self {
            per_host_ms: 1_200,
            floor_ms: 180_000,
            ceiling_ms: 900_000,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            nmap_path: "nmap".to_string(),
            profiles_path: None,
            max_hosts: Some(DEFAULT_MAX_HOSTS),
            request_budget_ms: DEFAULT_REQ_BUDGET_MS,
            discovery: DiscoveryTiming::default(),
            port_scan: PortScanTiming::default(),
            interrupt_grace_ms: 3_000,
            error_detail_limit: 512,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            crate::ScanError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        toml::from_str(&content)
            .map_err(|e| crate::ScanError::ConfigError(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from the given file, or from `~/.lansweep.toml` when present
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        if let Some(path) = path {
            return Self::from_toml_file(path);
        }

        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let default_path = home_dir.join(".lansweep.toml");
        if default_path.exists() {
            log::info!("Loaded config from {}", default_path.display());
            return Self::from_toml_file(&default_path);
        }

        Ok(Self::default())
    }

    /// Apply `MAX_HOSTS` and `REQ_BUDGET_MS` from the process environment
    pub fn apply_env(&mut self) -> crate::Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides read through `lookup`
    pub fn apply_env_from<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("MAX_HOSTS") {
            let value = parse_env_u64("MAX_HOSTS", &raw)?;
            // 0 switches the cap off
            self.max_hosts = (value > 0).then_some(value);
        }

        if let Some(raw) = lookup("REQ_BUDGET_MS") {
            self.request_budget_ms = parse_env_u64("REQ_BUDGET_MS", &raw)?;
        }

        Ok(())
    }

    /// Grace period granted to an interrupted probe
    pub fn interrupt_grace(&self) -> Duration {
        Duration::from_millis(self.interrupt_grace_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.nmap_path.trim().is_empty() {
            return Err(crate::ScanError::ConfigError(
                "nmap_path cannot be empty".to_string(),
            ));
        }

        let held_back = self.discovery.reserved_ms.saturating_add(self.interrupt_grace_ms);
        if self.request_budget_ms <= held_back {
            return Err(crate::ScanError::ConfigError(format!(
                "request budget ({}ms) must exceed the reserved response time ({}ms) plus the interrupt grace ({}ms)",
                self.request_budget_ms, self.discovery.reserved_ms, self.interrupt_grace_ms
            )));
        }

        if self.port_scan.floor_ms > self.port_scan.ceiling_ms {
            return Err(crate::ScanError::ConfigError(format!(
                "port scan floor ({}ms) is above its ceiling ({}ms)",
                self.port_scan.floor_ms, self.port_scan.ceiling_ms
            )));
        }

        if self.error_detail_limit == 0 {
            return Err(crate::ScanError::ConfigError(
                "error_detail_limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env_u64(key: &str, raw: &str) -> crate::Result<u64> {
    raw.trim().parse::<u64>().map_err(|e| {
        crate::ScanError::ConfigError(format!("{} must be a non-negative integer ({}): {:?}", key, e, raw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_match_reference_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.max_hosts, Some(4096));
        assert_eq!(config.request_budget_ms, 55_000);
        assert_eq!(config.discovery.reserved_ms, 5_000);
        assert_eq!(config.port_scan.ceiling_ms, 900_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[("MAX_HOSTS", "256"), ("REQ_BUDGET_MS", "30000")]);
        let mut config = ServiceConfig::default();
        config.apply_env_from(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.max_hosts, Some(256));
        assert_eq!(config.request_budget_ms, 30_000);
    }

    #[test]
    fn test_zero_max_hosts_disables_cap() {
        let vars = env(&[("MAX_HOSTS", "0")]);
        let mut config = ServiceConfig::default();
        config.apply_env_from(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.max_hosts, None);
    }

    #[test]
    fn test_bad_env_value_is_rejected() {
        let vars = env(&[("REQ_BUDGET_MS", "soon")]);
        let mut config = ServiceConfig::default();
        let result = config.apply_env_from(|k| vars.get(k).cloned());
        assert!(matches!(result, Err(crate::ScanError::ConfigError(_))));
    }

    #[test]
    fn test_budget_must_exceed_reserve() {
        let config = ServiceConfig {
            request_budget_ms: 4_000,
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_grace_counts_against_budget() {
        let config = ServiceConfig {
            request_budget_ms: 12_000,
            interrupt_grace_ms: 8_000,
            ..ServiceConfig::default()
        };
        assert!(matches!(config.validate(), Err(crate::ScanError::ConfigError(msg)) if msg.contains("grace")));

        let config = ServiceConfig {
            request_budget_ms: 14_000,
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "nmap_path = \"/usr/local/bin/nmap\"\nrequest_budget_ms = 40000\n\n[discovery]\nper_host_ms = 300"
        )
        .unwrap();

        let config = ServiceConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.nmap_path, "/usr/local/bin/nmap");
        assert_eq!(config.request_budget_ms, 40_000);
        assert_eq!(config.discovery.per_host_ms, 300);
        assert_eq!(config.discovery.floor_ms, 15_000);
        assert_eq!(config.max_hosts, Some(4096));
    }
}

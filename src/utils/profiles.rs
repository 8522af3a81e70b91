//! Scan profile catalog
//!
//! A profile bundles the argument templates for both probe phases. The catalog
//! is built once at startup, validated, and then shared read-only.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::{Result, ScanError};

/// Profile used when a request does not name one
pub const DEFAULT_PROFILE: &str = "stealth";

/// Flags the probe runner adds itself; profiles must not carry them
const RESERVED_FLAGS: &[&str] = &["-oX", "-oN", "-oG", "-oA", "-oS", "-iL"];

/// Named bundle of probe argument templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProfile {
    #[serde(default)]
    pub name: String,
    pub label: String,
    /// Flags for the liveness phase
    pub discovery: Vec<String>,
    /// Flags for the port/service phase
    pub ports: Vec<String>,
}

impl ScanProfile {
    fn new(name: &str, label: &str, discovery: &[&str], ports: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            discovery: discovery.iter().map(|s| s.to_string()).collect(),
            ports: ports.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Apply per-request toggles, producing a derived profile
    pub fn with_overrides(&self, overrides: &ProfileOverrides) -> Result<ScanProfile> {
        let mut profile = self.clone();

        if let Some(speed) = overrides.speed.as_deref() {
            let flag = timing_flag(speed)?;
            for args in [&mut profile.discovery, &mut profile.ports] {
                args.retain(|a| !is_timing_flag(a));
                args.push(flag.clone());
            }
        }

        let toggles = [
            (overrides.os_detect, "-O"),
            (overrides.service_detect, "-sV"),
            (overrides.skip_ping, "-Pn"),
        ];
        for (enabled, flag) in toggles {
            if enabled && !profile.ports.iter().any(|a| a == flag) {
                profile.ports.push(flag.to_string());
            }
        }

        Ok(profile)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ScanError::ConfigError("profile name cannot be empty".to_string()));
        }

        for (phase, args) in [("discovery", &self.discovery), ("ports", &self.ports)] {
            if args.is_empty() {
                return Err(ScanError::ConfigError(format!(
                    "profile '{}' has no {} arguments",
                    self.name, phase
                )));
            }
            if let Some(flag) = args.iter().find(|a| RESERVED_FLAGS.contains(&a.as_str())) {
                return Err(ScanError::ConfigError(format!(
                    "profile '{}' may not set {} in its {} arguments",
                    self.name, flag, phase
                )));
            }
        }

        Ok(())
    }
}

/// Optional toggles sent alongside a streaming scan request
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileOverrides {
    /// Timing template, `T0` through `T5`
    pub speed: Option<String>,
    pub os_detect: bool,
    pub service_detect: bool,
    pub skip_ping: bool,
}

fn is_timing_flag(arg: &str) -> bool {
    arg.len() == 3 && arg.starts_with("-T") && arg.as_bytes()[2].is_ascii_digit()
}

fn timing_flag(speed: &str) -> Result<String> {
    let speed = speed.trim();
    match speed.as_bytes() {
        [b'T' | b't', level @ b'0'..=b'5'] => Ok(format!("-T{}", *level as char)),
        _ => Err(ScanError::InvalidOption(format!(
            "speed must be one of T0..T5, got '{}'",
            speed
        ))),
    }
}

/// On-disk catalog format
#[derive(Debug, Deserialize)]
struct CatalogFile {
    profiles: HashMap<String, ScanProfile>,
}

/// Immutable name → profile mapping
#[derive(Debug, Clone)]
pub struct ProfileCatalog {
    profiles: HashMap<String, ScanProfile>,
}

impl ProfileCatalog {
    /// Catalog holding the built-in profiles
    pub fn builtin() -> Self {
        let mut profiles = HashMap::new();

        // Low noise: ping sweep, then top ports slowly
        profiles.insert(
            "stealth".to_string(),
            ScanProfile::new(
                "stealth",
                "Stealth (hosts + top ports, low noise)",
                &["-sn", "-T2"],
                &["-sS", "-F", "-T2", "--max-retries", "1", "--scan-delay", "50ms"],
            ),
        );

        profiles.insert(
            "fast".to_string(),
            ScanProfile::new("fast", "Fast (top ports)", &["-sn", "-T4"], &["-sS", "-F", "-T4"]),
        );

        profiles.insert(
            "deep".to_string(),
            ScanProfile::new(
                "deep",
                "Deep (1-1024 TCP)",
                &["-sn", "-T3"],
                &["-sS", "-p1-1024", "-T3"],
            ),
        );

        Self { profiles }
    }

    /// Build a catalog from explicit profiles, validating each one
    pub fn from_profiles(profiles: impl IntoIterator<Item = ScanProfile>) -> Result<Self> {
        let mut map = HashMap::new();
        for profile in profiles {
            profile.validate()?;
            if map.insert(profile.name.clone(), profile).is_some() {
                return Err(ScanError::ConfigError("duplicate profile name".to_string()));
            }
        }

        if map.is_empty() {
            return Err(ScanError::ConfigError("profile catalog is empty".to_string()));
        }
        // requests without a profile fall back to it
        if !map.contains_key(DEFAULT_PROFILE) {
            return Err(ScanError::ConfigError(format!(
                "profile catalog must define '{}'",
                DEFAULT_PROFILE
            )));
        }

        Ok(Self { profiles: map })
    }

    /// Parse a TOML catalog; it must define [`DEFAULT_PROFILE`]
    ///
    /// ```toml
    /// [profiles.stealth]
    /// label = "Stealth"
    /// discovery = ["-sn", "-T2"]
    /// ports = ["-sT", "-F", "-T2"]
    ///
    /// [profiles.quick]
    /// label = "Quick"
    /// discovery = ["-sn", "-T4"]
    /// ports = ["-sT", "-F"]
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)
            .map_err(|e| ScanError::ConfigError(format!("Invalid profile catalog: {}", e)))?;

        Self::from_profiles(file.profiles.into_iter().map(|(key, mut profile)| {
            profile.name = key;
            profile
        }))
    }

    /// Load a catalog file; any problem is fatal at startup
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ScanError::ConfigError(format!(
                "Failed to read profile catalog {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Resolve the profile for a request, defaulting to [`DEFAULT_PROFILE`]
    pub fn resolve(&self, name: Option<&str>) -> Result<&ScanProfile> {
        let name = name.map(str::trim).filter(|n| !n.is_empty()).unwrap_or(DEFAULT_PROFILE);
        self.profiles
            .get(name)
            .ok_or_else(|| ScanError::ProfileNotFound(format!("Profile \"{}\" not found", name)))
    }

    /// Get a profile by name
    pub fn get(&self, name: &str) -> Option<&ScanProfile> {
        self.profiles.get(name)
    }

    /// All profiles sorted by name
    pub fn list(&self) -> Vec<&ScanProfile> {
        let mut profiles: Vec<_> = self.profiles.values().collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for ProfileCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

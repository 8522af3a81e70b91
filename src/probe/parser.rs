//! Nmap XML document schema and host extraction
//!
//! Only the parts of the `-oX` document the orchestrator needs are modelled;
//! everything else is skipped by the deserializer. All defaults for missing
//! attributes are applied in [`parse_hosts`].

use log::{debug, warn};
use serde::Deserialize;

use crate::scanner::{HostRecord, HostStatus, PortRecord, PortState};
use crate::{Result, ScanError};

/// Closing tag of the document root
const ROOT_END: &str = "</nmaprun>";

/// Closing tag of a host entry; `</hosthint>` does not match it
const HOST_END: &str = "</host>";

/// Address types in order of preference when picking a host identity
const ADDRESS_PREFERENCE: [&str; 3] = ["ipv4", "ipv6", "mac"];

/// Root `<nmaprun>` element
#[derive(Debug, Default, Deserialize)]
pub struct NmapRun {
    #[serde(rename = "host", default)]
    pub hosts: Vec<NmapHost>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NmapHost {
    pub status: Option<NmapHostStatus>,
    #[serde(rename = "address", default)]
    pub addresses: Vec<NmapAddress>,
    pub ports: Option<NmapPorts>,
}

#[derive(Debug, Deserialize)]
pub struct NmapHostStatus {
    #[serde(rename = "@state")]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NmapAddress {
    #[serde(rename = "@addr")]
    pub addr: Option<String>,
    #[serde(rename = "@addrtype")]
    pub addr_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NmapPorts {
    #[serde(rename = "port", default)]
    pub ports: Vec<NmapPort>,
}

#[derive(Debug, Deserialize)]
pub struct NmapPort {
    #[serde(rename = "@protocol")]
    pub protocol: Option<String>,
    #[serde(rename = "@portid")]
    pub port_id: Option<String>,
    pub state: Option<NmapPortState>,
    pub service: Option<NmapService>,
}

#[derive(Debug, Deserialize)]
pub struct NmapPortState {
    #[serde(rename = "@state")]
    pub state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NmapService {
    #[serde(rename = "@name")]
    pub name: Option<String>,
    #[serde(rename = "@product")]
    pub product: Option<String>,
    #[serde(rename = "@version")]
    pub version: Option<String>,
    #[serde(rename = "@extrainfo")]
    pub extra_info: Option<String>,
}

impl NmapHost {
    /// Preferred address of the host, if it reported any
    fn identity(&self) -> Option<&str> {
        let usable = |a: &&NmapAddress| a.addr.as_deref().is_some_and(|s| !s.trim().is_empty());

        ADDRESS_PREFERENCE
            .iter()
            .find_map(|kind| {
                self.addresses
                    .iter()
                    .filter(usable)
                    .find(|a| a.addr_type.as_deref() == Some(*kind))
            })
            .or_else(|| self.addresses.iter().find(usable))
            .and_then(|a| a.addr.as_deref())
            .map(str::trim)
    }
}

impl NmapService {
    /// Product, version and extra info joined by single spaces
    fn version_string(&self) -> String {
        [&self.product, &self.version, &self.extra_info]
            .into_iter()
            .filter_map(|part| part.as_deref().map(str::trim))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Decode a complete document
pub fn parse_document(xml: &str) -> Result<NmapRun> {
    quick_xml::de::from_str(xml).map_err(ScanError::from)
}

/// Best-effort decode of the output of an interrupted run
///
/// Closes the root element when the tool was stopped before writing it. Any
/// remaining decode failure yields an empty document.
pub fn recover_partial(xml: &str) -> NmapRun {
    if xml.trim().is_empty() {
        debug!("Interrupted probe produced no output");
        return NmapRun::default();
    }

    let attempt = if xml.contains(ROOT_END) {
        parse_document(xml)
    } else {
        parse_document(&close_root(xml))
    };

    attempt
        .or_else(|e| {
            // cut mid-element: keep every host that was fully written
            let end = xml.rfind(HOST_END).ok_or(e)? + HOST_END.len();
            debug!("Dropping {} bytes after the last complete host", xml.len() - end);
            parse_document(&close_root(&xml[..end]))
        })
        .unwrap_or_else(|e| {
            warn!("Discarding unreadable partial output: {}", e);
            NmapRun::default()
        })
}

fn close_root(xml: &str) -> String {
    let mut closed = String::with_capacity(xml.len() + ROOT_END.len());
    closed.push_str(xml);
    closed.push_str(ROOT_END);
    closed
}

/// Convert a decoded document into host records
pub fn parse_hosts(doc: &NmapRun) -> Vec<HostRecord> {
    doc.hosts
        .iter()
        .filter_map(|host| {
            let address = host.identity()?.to_string();
            let status = HostStatus::from_report(host.status.as_ref().and_then(|s| s.state.as_deref()));
            let ports = host
                .ports
                .as_ref()
                .map(|p| p.ports.iter().filter_map(parse_port).collect())
                .unwrap_or_default();

            Some(HostRecord {
                address,
                status,
                ports,
            })
        })
        .collect()
}

fn parse_port(port: &NmapPort) -> Option<PortRecord> {
    let raw_id = port.port_id.as_deref().unwrap_or("").trim();
    let Ok(port_number) = raw_id.parse::<u16>() else {
        debug!("Skipping port with unusable id {:?}", raw_id);
        return None;
    };

    let service = port.service.as_ref();

    Some(PortRecord {
        protocol: port
            .protocol
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or("tcp")
            .to_string(),
        port: port_number,
        state: PortState::from_report(port.state.as_ref().and_then(|s| s.state.as_deref())),
        service: service
            .and_then(|s| s.name.as_deref())
            .unwrap_or("")
            .trim()
            .to_string(),
        version: service.map(NmapService::version_string).unwrap_or_default(),
    })
}

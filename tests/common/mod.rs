//! Shared stubs for the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use lansweep::probe::{parse_document, NmapRun, ProbeExit, ProbeOutput};
use lansweep::{Orchestrator, Probe, ProbeExecutor, ProfileCatalog, ScanError, ServiceConfig};

/// Discovery answer for 192.168.1.0/24: three hosts up, one down
pub const DISCOVERY_THREE_UP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nmaprun>
<nmaprun scanner="nmap" args="nmap -oX - -sn -T2 -n 192.168.1.0/24" version="7.94">
<host><status state="up" reason="arp-response"/><address addr="192.168.1.1" addrtype="ipv4"/><address addr="AA:BB:CC:00:00:01" addrtype="mac"/></host>
<host><status state="down" reason="no-response"/><address addr="192.168.1.2" addrtype="ipv4"/></host>
<host><status state="up" reason="arp-response"/><address addr="192.168.1.10" addrtype="ipv4"/></host>
<host><status state="up" reason="arp-response"/><address addr="192.168.1.20" addrtype="ipv4"/></host>
<runstats><finished elapsed="4.20" exit="success"/><hosts up="3" down="253" total="256"/></runstats>
</nmaprun>
"#;

/// Port answer: ssh open on 192.168.1.10 only
pub const PORTS_SSH_ON_ONE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nmaprun scanner="nmap" version="7.94">
<host><status state="up"/><address addr="192.168.1.1" addrtype="ipv4"/>
<ports><extraports state="closed" count="100"/></ports></host>
<host><status state="up"/><address addr="192.168.1.10" addrtype="ipv4"/>
<ports><port protocol="tcp" portid="22"><state state="open" reason="syn-ack"/><service name="ssh" product="OpenSSH" version="9.6"/></port>
<port protocol="tcp" portid="80"><state state="closed" reason="reset"/></port></ports></host>
<host><status state="up"/><address addr="192.168.1.20" addrtype="ipv4"/>
<ports><port protocol="tcp" portid="443"><state state="filtered" reason="no-response"/></port></ports></host>
</nmaprun>
"#;

/// Probe returning canned documents, optionally pausing until released
pub struct StubProbe {
    documents: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<Vec<String>>>,
    hold: bool,
    pub entered: Notify,
    pub release: Notify,
}

impl StubProbe {
    pub fn new(documents: &[&str]) -> Arc<Self> {
        Arc::new(Self::build(documents, false))
    }

    /// Every call waits for `release` after signalling `entered`
    pub fn holding(documents: &[&str]) -> Arc<Self> {
        Arc::new(Self::build(documents, true))
    }

    fn build(documents: &[&str], hold: bool) -> Self {
        Self {
            documents: Mutex::new(documents.iter().map(|d| d.to_string()).collect()),
            calls: Mutex::new(Vec::new()),
            hold,
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Probe for StubProbe {
    async fn run(&self, args: &[String], _timeout: Duration) -> lansweep::Result<NmapRun> {
        self.calls.lock().unwrap().push(args.to_vec());
        if self.hold {
            self.entered.notify_one();
            self.release.notified().await;
        }
        let doc = self
            .documents
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ScanError::Internal("stub probe has no document left".into()))?;
        parse_document(&doc)
    }
}

/// Executor replaying scripted process outcomes
pub struct ScriptedExecutor {
    outputs: Mutex<VecDeque<ProbeOutput>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn new(outputs: Vec<ProbeOutput>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProbeExecutor for ScriptedExecutor {
    async fn execute(&self, args: &[String], _timeout: Duration) -> lansweep::Result<ProbeOutput> {
        self.calls.lock().unwrap().push(args.to_vec());
        self.outputs
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ScanError::Internal("no scripted output left".into()))
    }
}

/// Executor wrapper that lets a test keep a handle after handing it to a runner
pub struct SharedExecutor(pub Arc<ScriptedExecutor>);

#[async_trait]
impl ProbeExecutor for SharedExecutor {
    async fn execute(&self, args: &[String], timeout: Duration) -> lansweep::Result<ProbeOutput> {
        self.0.execute(args, timeout).await
    }
}

pub fn exited(stdout: &str, stderr: &str, code: i32) -> ProbeOutput {
    ProbeOutput {
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        exit: ProbeExit::Exited(Some(code)),
    }
}

pub fn timed_out(stdout: &str) -> ProbeOutput {
    ProbeOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit: ProbeExit::TimedOut,
    }
}

pub fn orchestrator_with(probe: Arc<dyn Probe>) -> Orchestrator {
    Orchestrator::new(probe, Arc::new(ProfileCatalog::builtin()), &ServiceConfig::default())
}

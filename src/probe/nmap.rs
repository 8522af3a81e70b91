//! Nmap integration: subprocess control, partial-output recovery and the
//! raw-socket privilege fallback

use async_trait::async_trait;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant as TokioInstant};

use super::parser::{parse_document, recover_partial, NmapRun};
use super::{Probe, ProbeExecutor, ProbeExit, ProbeOutput};
use crate::config::ServiceConfig;
use crate::{Result, ScanError};

/// Stderr phrases nmap prints when a raw-socket technique needs root
static PRIVILEGE_DENIED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)root privileges|failed to open raw socket|are you root")
        .expect("privilege pattern is a valid regex")
});

const SYN_SCAN: &str = "-sS";

/// Minimum time left for reading pipes of a process that has just exited
const PIPE_SETTLE: Duration = Duration::from_millis(250);
const CONNECT_SCAN: &str = "-sT";

/// Spawns the nmap binary
#[derive(Debug, Clone)]
pub struct NmapExecutor {
    nmap_path: String,
    interrupt_grace: Duration,
}

impl NmapExecutor {
    pub fn new(nmap_path: impl Into<String>, interrupt_grace: Duration) -> Self {
        Self {
            nmap_path: nmap_path.into(),
            interrupt_grace,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.nmap_path.clone(), config.interrupt_grace())
    }
}

impl Default for NmapExecutor {
    fn default() -> Self {
        Self::from_config(&ServiceConfig::default())
    }
}

/// Output of one pipe, readable even if the reader never reaches EOF
struct PipeCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    reader: JoinHandle<()>,
}

fn drain<R>(mut pipe: R) -> PipeCapture
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = Arc::new(Mutex::new(Vec::new()));
    let sink = buf.clone();
    let reader = tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    debug!("Probe pipe closed early: {}", e);
                    break;
                }
            }
        }
    });
    PipeCapture { buf, reader }
}

/// Wait for the pipe to close, but no later than `deadline`
///
/// A descendant of the probe can keep the pipe open after the probe itself is
/// gone; whatever arrived before the deadline is returned.
async fn collect(capture: Option<PipeCapture>, deadline: TokioInstant) -> String {
    let Some(mut capture) = capture else {
        return String::new();
    };

    let deadline = deadline.max(TokioInstant::now() + PIPE_SETTLE);
    match timeout_at(deadline, &mut capture.reader).await {
        Ok(Err(e)) => debug!("Output reader failed: {}", e),
        Ok(Ok(())) => {}
        Err(_) => {
            warn!("Probe output still open after the grace period, keeping what arrived");
            capture.reader.abort();
        }
    }

    let bytes = capture.buf.lock().await;
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(unix)]
fn interrupt(pid: u32) {
    // SIGINT lets nmap write out what it has before exiting
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    if rc != 0 {
        debug!("SIGINT to pid {} failed: {}", pid, std::io::Error::last_os_error());
    }
}

#[cfg(not(unix))]
fn interrupt(_pid: u32) {}

#[async_trait]
impl ProbeExecutor for NmapExecutor {
    async fn execute(&self, args: &[String], limit: Duration) -> Result<ProbeOutput> {
        debug!("Executing {} with args: {:?}", self.nmap_path, args);

        let mut child = Command::new(&self.nmap_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ScanError::probe_process(format!("Failed to execute {}: {}", self.nmap_path, e))
            })?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let (exit, deadline) = match timeout(limit, child.wait()).await {
            Ok(status) => {
                let exit = ProbeExit::Exited(status?.code());
                (exit, TokioInstant::now() + self.interrupt_grace)
            }
            Err(_) => {
                warn!(
                    "Probe exceeded {:.1}s, interrupting to collect partial results",
                    limit.as_secs_f64()
                );
                // the grace period covers both the flush and reading the pipes
                let deadline = TokioInstant::now() + self.interrupt_grace;
                if let Some(pid) = child.id() {
                    interrupt(pid);
                }
                if timeout_at(deadline, child.wait()).await.is_err() {
                    warn!("Probe ignored the interrupt, killing it");
                    child.kill().await?;
                }
                (ProbeExit::TimedOut, deadline)
            }
        };

        Ok(ProbeOutput {
            stdout: collect(stdout, deadline).await,
            stderr: collect(stderr, deadline).await,
            exit,
        })
    }
}

/// Turns raw executions into decoded documents
///
/// Every invocation is prefixed with `-oX -` so the document arrives on stdout.
/// A privilege failure of a SYN scan is retried once as a connect scan.
pub struct ProbeRunner<E> {
    executor: E,
}

impl<E: ProbeExecutor> ProbeRunner<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    async fn attempt(&self, args: &[String], limit: Duration) -> Result<(ProbeOutput, NmapRun)> {
        let mut full_args = Vec::with_capacity(args.len() + 2);
        full_args.push("-oX".to_string());
        full_args.push("-".to_string());
        full_args.extend_from_slice(args);

        let output = self.executor.execute(&full_args, limit).await?;
        let doc = match output.exit {
            ProbeExit::TimedOut => recover_partial(&output.stdout),
            ProbeExit::Exited(Some(0)) => parse_document(&output.stdout)?,
            // decoded by the caller once the exit has been classified
            ProbeExit::Exited(_) => NmapRun::default(),
        };

        Ok((output, doc))
    }
}

fn privilege_denied(stderr: &str) -> bool {
    PRIVILEGE_DENIED.is_match(stderr)
}

fn failure_detail(output: &ProbeOutput) -> String {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        match output.exit {
            ProbeExit::Exited(Some(code)) => format!("nmap exited with status {}", code),
            _ => "nmap was terminated by a signal".to_string(),
        }
    } else {
        stderr.to_string()
    }
}

/// Replace the SYN technique with a connect scan, leaving other flags alone
fn with_connect_scan(args: &[String]) -> Vec<String> {
    args.iter()
        .map(|a| if a == SYN_SCAN { CONNECT_SCAN.to_string() } else { a.clone() })
        .collect()
}

#[async_trait]
impl<E: ProbeExecutor> Probe for ProbeRunner<E> {
    async fn run(&self, args: &[String], limit: Duration) -> Result<NmapRun> {
        let started = Instant::now();
        let (output, doc) = self.attempt(args, limit).await?;

        if output.exit == ProbeExit::TimedOut || output.success() {
            debug!("Probe finished in {:.2}s", started.elapsed().as_secs_f64());
            return Ok(doc);
        }

        if !(privilege_denied(&output.stderr) && args.iter().any(|a| a == SYN_SCAN)) {
            return Err(ScanError::probe_process(failure_detail(&output)));
        }

        warn!("Raw-socket scan failed; retrying with {}", CONNECT_SCAN);
        let fallback = with_connect_scan(args);
        let (retry, doc) = self.attempt(&fallback, limit).await?;

        if retry.exit == ProbeExit::TimedOut || retry.success() {
            info!(
                "Connect-scan fallback finished in {:.2}s",
                started.elapsed().as_secs_f64()
            );
            return Ok(doc);
        }

        Err(ScanError::probe_process(failure_detail(&retry)))
    }
}

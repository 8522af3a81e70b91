//! Failure paths: single-flight gate, probe failures and degraded results

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use lansweep::{Probe, ProbeCause, ProbeRunner, ScanError, ScanEvent, ScanRequest};
use tokio::time::timeout;

#[tokio::test]
async fn test_second_scan_is_rejected_while_first_runs() {
    let probe = StubProbe::holding(&["<nmaprun></nmaprun>", "<nmaprun></nmaprun>"]);
    let orchestrator = orchestrator_with(probe.clone());

    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .run(&ScanRequest::new("192.168.1.0/24", None))
                .await
        })
    };

    timeout(Duration::from_secs(5), probe.entered.notified())
        .await
        .expect("first scan should reach the probe");
    assert!(orchestrator.is_busy());

    let err = orchestrator
        .run(&ScanRequest::new("192.168.2.0/24", None))
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::ScanInProgress));
    assert_eq!(probe.calls().len(), 1, "rejected scan must not probe");

    // streaming requests share the gate
    let err = orchestrator
        .run_streaming(&ScanRequest::new("192.168.2.0/24", None))
        .unwrap_err();
    assert!(matches!(err, ScanError::ScanInProgress));

    probe.release.notify_one();
    first.await.unwrap().expect("first scan should finish");
    assert!(!orchestrator.is_busy());

    // accepted again once the first one is done
    let next = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .run(&ScanRequest::new("192.168.2.0/24", None))
                .await
        })
    };
    timeout(Duration::from_secs(5), probe.entered.notified())
        .await
        .expect("second scan should reach the probe");
    probe.release.notify_one();
    next.await.unwrap().expect("second scan should be accepted");
    assert_eq!(probe.calls().len(), 2);
}

#[tokio::test]
async fn test_gate_released_after_probe_failure() {
    let probe = StubProbe::new(&["<nmaprun><host>"]);
    let orchestrator = orchestrator_with(probe.clone());

    let err = orchestrator
        .run(&ScanRequest::new("192.168.1.0/24", None))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ScanError::ProbeFailed {
            cause: ProbeCause::Parse,
            ..
        }
    ));
    assert!(!orchestrator.is_busy());
}

#[tokio::test]
async fn test_fallback_failure_is_fatal() {
    let executor = Arc::new(ScriptedExecutor::new(vec![
        exited(DISCOVERY_THREE_UP, "", 0),
        exited("", "dnet: Failed to open raw socket", 1),
        exited("", "Couldn't open a raw socket. Error: Operation not permitted (1)", 1),
    ]));
    let orchestrator = orchestrator_with(Arc::new(ProbeRunner::new(SharedExecutor(executor.clone()))));

    let err = orchestrator
        .run(&ScanRequest::new("192.168.1.0/24", Some("fast")))
        .await
        .unwrap_err();

    match &err {
        ScanError::ProbeFailed { cause, detail } => {
            assert_eq!(*cause, ProbeCause::Process);
            assert!(detail.contains("Operation not permitted"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(executor.calls().len(), 3, "exactly one fallback attempt");
    assert!(!orchestrator.is_busy());
}

#[tokio::test]
async fn test_interrupted_discovery_keeps_partial_hosts() {
    let truncated = DISCOVERY_THREE_UP
        .split("<runstats>")
        .next()
        .unwrap();
    let executor = Arc::new(ScriptedExecutor::new(vec![
        timed_out(truncated),
        exited(PORTS_SSH_ON_ONE, "", 0),
    ]));
    let orchestrator = orchestrator_with(Arc::new(ProbeRunner::new(SharedExecutor(executor.clone()))));

    let report = orchestrator
        .run(&ScanRequest::new("192.168.1.0/24", None))
        .await
        .expect("timeout recovery is a degraded success");
    assert_eq!(report.hosts.len(), 4);
    assert_eq!(report.open_port_count(), 1);
}

#[tokio::test]
async fn test_interrupted_discovery_without_output() {
    let executor = Arc::new(ScriptedExecutor::new(vec![timed_out("")]));
    let orchestrator = orchestrator_with(Arc::new(ProbeRunner::new(SharedExecutor(executor.clone()))));

    let report = orchestrator
        .run(&ScanRequest::new("192.168.1.0/24", None))
        .await
        .unwrap();
    assert!(report.hosts.is_empty());
    assert_eq!(executor.calls().len(), 1, "nothing live, so no port phase");
}

#[tokio::test]
async fn test_streaming_failure_is_terminal_error_event() {
    let executor = Arc::new(ScriptedExecutor::new(vec![
        exited(DISCOVERY_THREE_UP, "", 0),
        exited("", &"Illegal argument\n".repeat(100), 1),
    ]));
    let orchestrator = orchestrator_with(Arc::new(ProbeRunner::new(SharedExecutor(executor))));

    let mut rx = orchestrator
        .run_streaming(&ScanRequest::new("192.168.1.0/24", None))
        .unwrap();
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert_eq!(events[0], ScanEvent::Progress { value: 0 });
    assert!(!events.iter().any(|e| matches!(e, ScanEvent::Chunk { .. })));
    match events.last() {
        Some(ScanEvent::Error { error, detail }) => {
            assert_eq!(error, "Scan failed");
            assert!(detail.len() <= 515);
            assert!(detail.starts_with("Illegal argument"));
        }
        other => panic!("expected a terminal error event, got {:?}", other),
    }
    assert!(!orchestrator.is_busy());
}

#[tokio::test]
async fn test_missing_binary_reports_process_failure() {
    let runner = ProbeRunner::new(lansweep::NmapExecutor::new(
        "/nonexistent/nmap-for-tests",
        Duration::from_millis(10),
    ));
    let err = runner
        .run(&["-sn".to_string(), "192.168.1.1".to_string()], Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ScanError::ProbeFailed {
            cause: ProbeCause::Process,
            ..
        }
    ));
}

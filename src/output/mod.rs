//! Scan progress events and their wire encoding
//!
//! The streaming endpoint writes one JSON object per event, each followed by a
//! blank line, so dashboards can split the body on `"\n\n"`.

use bytes::Bytes;
use futures::stream::{self, Stream};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{truncate_detail, ScanError};
use crate::scanner::HostRecord;

/// Separator written after every encoded event
pub const EVENT_DELIMITER: &str = "\n\n";

/// Maximum number of host rows carried by one chunk event
pub const CHUNK_SIZE: usize = 10;

/// Events buffered between the scan task and the response body
pub const CHANNEL_CAPACITY: usize = 16;

/// Progress milestones reported during a scan
pub mod progress {
    pub const ACCEPTED: u8 = 0;
    pub const DISCOVERY_STARTED: u8 = 10;
    pub const DISCOVERY_DONE: u8 = 50;
    pub const PORTS_DONE: u8 = 90;
    pub const COMPLETE: u8 = 100;
}

/// One message of the scan event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScanEvent {
    Progress { value: u8 },
    Chunk { rows: Vec<HostRecord> },
    Error { error: String, detail: String },
}

impl ScanEvent {
    /// Terminal event describing a failed scan
    pub fn from_error(err: &ScanError, detail_limit: usize) -> Self {
        ScanEvent::Error {
            error: err.kind().to_string(),
            detail: truncate_detail(&err.detail(), detail_limit),
        }
    }

    /// Serialize the event followed by the delimiter
    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        let mut buf = serde_json::to_vec(self)?;
        buf.extend_from_slice(EVENT_DELIMITER.as_bytes());
        Ok(Bytes::from(buf))
    }
}

/// Split merged rows into chunk events, preserving order
pub fn chunk_events(rows: &[HostRecord]) -> Vec<ScanEvent> {
    rows.chunks(CHUNK_SIZE)
        .map(|chunk| ScanEvent::Chunk {
            rows: chunk.to_vec(),
        })
        .collect()
}

/// Producer side of an event stream
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ScanEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<ScanEvent>) -> Self {
        Self { tx }
    }

    /// Create a bounded sink/receiver pair
    pub fn channel() -> (Self, mpsc::Receiver<ScanEvent>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (Self::new(tx), rx)
    }

    /// Deliver an event, waiting while the consumer is behind
    ///
    /// Returns `false` once the consumer has gone away.
    pub async fn send(&self, event: ScanEvent) -> bool {
        if self.tx.send(event).await.is_err() {
            debug!("Event consumer disconnected");
            return false;
        }
        true
    }

    pub async fn progress(&self, value: u8) -> bool {
        self.send(ScanEvent::Progress { value }).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Adapt a receiver into a stream of encoded body frames
pub fn encoded_stream(
    rx: mpsc::Receiver<ScanEvent>,
) -> impl Stream<Item = Result<Bytes, serde_json::Error>> + Send + 'static {
    stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((event.encode(), rx))
    })
}

/// Parse a complete streamed body back into events
pub fn decode_events(body: &[u8]) -> Result<Vec<ScanEvent>, serde_json::Error> {
    String::from_utf8_lossy(body)
        .split(EVENT_DELIMITER)
        .map(str::trim)
        .filter(|frame| !frame.is_empty())
        .map(serde_json::from_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::HostStatus;
    use futures::StreamExt;

    fn host(n: usize) -> HostRecord {
        HostRecord {
            address: format!("192.168.1.{}", n),
            status: HostStatus::Up,
            ports: Vec::new(),
        }
    }

    #[test]
    fn test_event_wire_format() {
        let bytes = ScanEvent::Progress { value: 50 }.encode().unwrap();
        assert_eq!(&bytes[..], b"{\"type\":\"progress\",\"value\":50}\n\n");

        let chunk = ScanEvent::Chunk { rows: vec![host(1)] }.encode().unwrap();
        let text = std::str::from_utf8(&chunk).unwrap();
        assert!(text.starts_with("{\"type\":\"chunk\",\"rows\":[{\"addr\":\"192.168.1.1\""));
        assert!(text.ends_with("\n\n"));
    }

    #[test]
    fn test_chunking_keeps_order() {
        let rows: Vec<_> = (1..=23).map(host).collect();
        let events = chunk_events(&rows);
        assert_eq!(events.len(), 3);

        let flattened: Vec<HostRecord> = events
            .into_iter()
            .flat_map(|e| match e {
                ScanEvent::Chunk { rows } => {
                    assert!(rows.len() <= CHUNK_SIZE);
                    rows
                }
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(flattened, rows);

        assert!(chunk_events(&[]).is_empty());
    }

    #[test]
    fn test_error_event_is_truncated() {
        let err = ScanError::probe_process("x".repeat(1000));
        match ScanEvent::from_error(&err, 512) {
            ScanEvent::Error { error, detail } => {
                assert_eq!(error, "Scan failed");
                assert_eq!(detail.len(), 515);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_roundtrip_through_channel() {
        let (sink, rx) = EventSink::channel();
        tokio::spawn(async move {
            sink.progress(progress::ACCEPTED).await;
            sink.send(ScanEvent::Chunk { rows: vec![host(7)] }).await;
            sink.progress(progress::COMPLETE).await;
        });

        let frames: Vec<_> = encoded_stream(rx).collect().await;
        let body: Vec<u8> = frames
            .into_iter()
            .map(|f| f.unwrap())
            .flat_map(|b| b.to_vec())
            .collect();

        let events = decode_events(&body).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], ScanEvent::Progress { value: 0 });
        assert_eq!(events[2], ScanEvent::Progress { value: 100 });
    }

    #[tokio::test]
    async fn test_send_after_consumer_dropped() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.progress(10).await);
    }
}

use crate::service::ProtocolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot, Mutex, Notify};

/// Sentinel close code: the server asks us not to reconnect.
pub const CLOSE_NO_RECONNECT: u16 = 3000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeepalivePolicy {
    pub path: String,
    pub interval_secs: u64,
    pub disconnect_on_failure: bool,
}

impl Default for KeepalivePolicy {
    fn default() -> Self {
        Self {
            path: "/v1/keepalive".to_string(),
            interval_secs: 55,
            disconnect_on_failure: true,
        }
    }
}

#[derive(Debug)]
pub struct Responder {
    tx: oneshot::Sender<(u16, String)>,
}

impl Responder {
    pub fn new() -> (Self, oneshot::Receiver<(u16, String)>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn respond(self, status: u16, reason: &str) {
        let _ = self.tx.send((status, reason.to_string()));
    }
}

#[derive(Debug)]
pub struct TransportRequest {
    pub verb: String,
    pub path: String,
    pub body: Vec<u8>,
    pub responder: Responder,
}

#[derive(Debug)]
pub enum TransportEvent {
    Request(TransportRequest),
    Closed { code: u16, reason: String },
    Error(String),
}

/// Bidirectional request/response stream to the delivery endpoint.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn connect(&self, keepalive: KeepalivePolicy) -> Result<(), ProtocolError>;
    async fn next_event(&self) -> Option<TransportEvent>;
    async fn close(&self);
}

/// In-memory transport fed through a channel; peers and tests script the
/// event stream.
pub struct ChannelTransport {
    events: Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
    connects: AtomicUsize,
    closed: AtomicBool,
    shutdown: Notify,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedSender<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                events: Mutex::new(rx),
                connects: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                shutdown: Notify::new(),
            },
            tx,
        )
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageTransport for ChannelTransport {
    async fn connect(&self, _keepalive: KeepalivePolicy) -> Result<(), ProtocolError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        let mut events = self.events.lock().await;
        tokio::select! {
            event = events.recv() => event,
            _ = self.shutdown.notified() => None,
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // A stored permit covers the race with a not-yet-parked reader.
        self.shutdown.notify_one();
    }
}

pub mod attachments;
pub mod backoff;
pub mod config;
pub mod content;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod frame;
pub mod queue;
pub mod service;
pub mod session;
pub mod state;
pub mod transport;

#[cfg(test)]
mod tests;

use attachments::{AttachmentCipher, AttachmentFetcher};
use backoff::Backoff;
use config::ReceiverConfig;
use content::ContentDispatcher;
use dispatch::EnvelopeDispatcher;
use error::ReceiveError;
use event::{EventBus, EventListener};
use futures::future::try_join_all;
use queue::SerialQueue;
use service::{HttpType, Service, ServiceRequest};
use session::{SessionDecryptor, SessionStore};
use state::{ReceiverIdentity, StateError, StateStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use transport::{
    KeepalivePolicy, MessageTransport, TransportEvent, TransportRequest, CLOSE_NO_RECONNECT,
};
use whisperline_api::events::{ErrorEvent, Event, EventKind};
use whisperline_api::wire::{self, CodecError};

pub const MESSAGE_PATH: &str = "/api/v1/message";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Created,
    Connected,
    Reconnecting,
    Closed,
}

pub struct Receiver {
    config: ReceiverConfig,
    identity: ReceiverIdentity,
    service: Arc<dyn Service>,
    dispatcher: EnvelopeDispatcher,
    events: EventBus,
    queue: SerialQueue,
    backoff: Backoff,
    transport: Mutex<Option<Arc<dyn MessageTransport>>>,
    state: StdMutex<LinkState>,
    closed: AtomicBool,
}

impl Receiver {
    /// Resolves the receiver identity from persistent state and wires the
    /// pipeline against the host's collaborators.
    pub fn new(
        config: ReceiverConfig,
        state_store: &dyn StateStore,
        service: Arc<dyn Service>,
        session_store: Arc<dyn SessionStore>,
        attachment_cipher: Arc<dyn AttachmentCipher>,
    ) -> Result<Self, StateError> {
        let identity = state_store.load_identity()?;
        let events = EventBus::new();
        let sessions = SessionDecryptor::new(session_store);
        let fetcher = AttachmentFetcher::new(service.clone(), attachment_cipher);
        let content = ContentDispatcher::new(
            identity.addr.clone(),
            identity.device_id,
            sessions,
            fetcher,
            events.clone(),
        );
        let dispatcher = EnvelopeDispatcher::new(content, events.clone());
        Ok(Self {
            backoff: Backoff::new(config.backoff_base_secs, config.backoff_max_secs),
            config,
            identity,
            service,
            dispatcher,
            events,
            queue: SerialQueue::new(),
            transport: Mutex::new(None),
            state: StdMutex::new(LinkState::Created),
            closed: AtomicBool::new(false),
        })
    }

    pub async fn on(&self, kind: EventKind, listener: Arc<dyn EventListener>) {
        self.events.on(kind, listener).await;
    }

    pub fn event_bus(&self) -> EventBus {
        self.events.clone()
    }

    pub fn state(&self) -> LinkState {
        *self.state.lock().expect("state lock")
    }

    fn set_state(&self, next: LinkState) {
        *self.state.lock().expect("state lock") = next;
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Binds the transport and serves it until the receiver closes or the
    /// server sends the terminal close code. Non-terminal closes probe the
    /// service and reconnect under backoff.
    pub async fn connect(
        &self,
        transport: Arc<dyn MessageTransport>,
    ) -> Result<(), ReceiveError> {
        if self.is_closed() {
            return Ok(());
        }
        *self.transport.lock().await = Some(transport.clone());
        let keepalive = KeepalivePolicy {
            path: self.config.keepalive_path.clone(),
            interval_secs: self.config.keepalive_interval_secs,
            disconnect_on_failure: self.config.keepalive_disconnect_on_failure,
        };
        if let Err(err) = transport.connect(keepalive.clone()).await {
            self.transport.lock().await.take();
            return Err(err.into());
        }
        self.set_state(LinkState::Connected);
        let mut attempt: u32 = 0;
        'link: loop {
            let close_code = self.serve(transport.as_ref()).await;
            if self.is_closed() || close_code.is_none() || close_code == Some(CLOSE_NO_RECONNECT) {
                break;
            }
            self.set_state(LinkState::Reconnecting);
            loop {
                if self.is_closed() {
                    break 'link;
                }
                match self.probe_and_reconnect(transport.as_ref(), &keepalive).await {
                    Ok(()) => {
                        attempt = 0;
                        self.set_state(LinkState::Connected);
                        continue 'link;
                    }
                    Err(err) => {
                        self.events
                            .dispatch(&Event::Error(ErrorEvent {
                                error: err.to_string(),
                                proto: None,
                            }))
                            .await;
                        tokio::time::sleep(self.backoff.next(attempt)).await;
                        attempt = attempt.saturating_add(1);
                    }
                }
            }
        }
        self.transport.lock().await.take();
        self.set_state(LinkState::Closed);
        Ok(())
    }

    async fn probe_and_reconnect(
        &self,
        transport: &dyn MessageTransport,
        keepalive: &KeepalivePolicy,
    ) -> Result<(), ReceiveError> {
        self.service.get_devices().await?;
        transport.connect(keepalive.clone()).await?;
        Ok(())
    }

    async fn serve(&self, transport: &dyn MessageTransport) -> Option<u16> {
        loop {
            if self.is_closed() {
                return None;
            }
            match transport.next_event().await {
                Some(TransportEvent::Request(request)) => {
                    if let Err(error) = self.handle_request(request).await {
                        warn!(%error, "transport request failed");
                    }
                }
                Some(TransportEvent::Closed { code, reason }) => {
                    debug!(code, %reason, "transport closed");
                    return Some(code);
                }
                Some(TransportEvent::Error(message)) => {
                    warn!(%message, "transport error");
                }
                None => return None,
            }
        }
    }

    /// ACK discipline: a frame that fails to decrypt or decode is NACKed
    /// with 500 (the server's fault, must redeliver); once the envelope
    /// decodes, the transport gets 200 no matter how handling ends, so a
    /// poison message cannot wedge the queue.
    pub async fn handle_request(&self, request: TransportRequest) -> Result<(), ReceiveError> {
        let TransportRequest {
            verb,
            path,
            body,
            responder,
        } = request;
        if verb != "PUT" || path != MESSAGE_PATH {
            responder.respond(400, "Bad request");
            return Err(ReceiveError::BadTransportRequest { verb, path });
        }
        let decoded = frame::decrypt_frame(&body, &self.identity.signaling_key)
            .map_err(ReceiveError::from)
            .and_then(|plaintext| Ok(wire::decode_envelope(&plaintext)?));
        let envelope = match decoded {
            Ok(envelope) => envelope,
            Err(error) => {
                responder.respond(500, "Bad encrypted websocket message");
                self.events
                    .dispatch(&Event::Error(ErrorEvent {
                        error: error.to_string(),
                        proto: None,
                    }))
                    .await;
                return Err(error);
            }
        };
        let dispatcher = self.dispatcher.clone();
        let handle = self.queue.push(async move {
            let outcome = dispatcher.handle_envelope(envelope).await;
            responder.respond(200, "OK");
            outcome
        });
        match handle.await {
            Ok(outcome) => outcome,
            // Queue closed during shutdown; the envelope was never started.
            Err(_) => Ok(()),
        }
    }

    /// Polling alternative to the streaming transport: fetch batches, feed
    /// each envelope through the dispatcher in order, delete concurrently.
    pub async fn drain(&self) -> Result<(), ReceiveError> {
        if self.transport.lock().await.is_some() {
            return Err(ReceiveError::DrainWhileConnected);
        }
        loop {
            let listing = self
                .service
                .request(ServiceRequest {
                    call: "messages",
                    http_type: HttpType::Get,
                    url_parameters: String::new(),
                })
                .await?;
            let listing: service::MessageListing = serde_json::from_value(listing)
                .map_err(|_| ReceiveError::Codec(CodecError::Malformed("message listing")))?;
            let more = listing.more;
            let mut deletions = Vec::new();
            for queued in listing.messages {
                let envelope = queued.into_envelope()?;
                let source = envelope.source.clone();
                let timestamp = envelope.timestamp;
                // Handler faults are already surfaced by the dispatcher; the
                // envelope still comes off the server, matching the stream
                // path's unconditional post-decode ACK.
                if let Err(error) = self.dispatcher.handle_envelope(envelope).await {
                    warn!(%error, %source, "drained envelope handler failed");
                }
                deletions.push(self.delete_message(source, timestamp));
            }
            try_join_all(deletions).await?;
            if !more {
                break;
            }
        }
        Ok(())
    }

    async fn delete_message(&self, source: String, timestamp: u64) -> Result<(), ReceiveError> {
        self.service
            .request(ServiceRequest {
                call: "messages",
                http_type: HttpType::Delete,
                url_parameters: format!("/{}/{}", source, timestamp),
            })
            .await?;
        Ok(())
    }

    /// Idempotent. Detaches the transport and prevents further reconnects;
    /// an in-flight handler completes before the queue stops.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.queue.close();
        let transport = self.transport.lock().await.take();
        if let Some(transport) = transport {
            transport.close().await;
        }
        self.set_state(LinkState::Closed);
    }
}

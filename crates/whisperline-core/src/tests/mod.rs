
use crate::attachments::{AttachmentCipher, AttachmentCipherError, AttachmentFetcher};
use crate::config::ReceiverConfig;
use crate::content::ContentDispatcher;
use crate::dispatch::EnvelopeDispatcher;
use crate::event::{EventBus, EventListener, ListenerFault};
use crate::frame::{self, SignalingKey, NONCE_LEN};
use crate::service::{DeviceInfo, HttpType, ProtocolError, Service, ServiceRequest};
use crate::session::{SessionDecryptor, SessionError, SessionStore};
use crate::state::{MemoryStateStore, ReceiverIdentity};
use crate::transport::{Responder, TransportRequest};
use crate::{Receiver, MESSAGE_PATH};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use whisperline_api::events::{
    Event, EventKind, MessageEvent, ReadEvent, ReceiptEvent, SentEvent,
};
use whisperline_api::wire::{
    encode_content, encode_envelope, Content, DataMessage, Envelope, EnvelopeKind,
};

pub const OWN_ADDR: &str = "+15550009999";
pub const OWN_DEVICE: u32 = 1;
pub const PEER: &str = "+15550001111";

pub fn signaling_key() -> SignalingKey {
    SignalingKey::new([7u8; 32])
}

pub enum SessionReply {
    Plaintext(Vec<u8>),
    Untrusted(Vec<u8>),
    Duplicate,
    Failure(String),
}

#[derive(Default)]
pub struct StubSessionStore {
    scripts: Mutex<HashMap<Vec<u8>, VecDeque<SessionReply>>>,
    devices: Mutex<HashMap<String, Vec<u32>>>,
    pub closed: Mutex<Vec<(String, u32)>>,
    pub calls: Mutex<Vec<&'static str>>,
}

impl StubSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, ciphertext: &[u8], replies: Vec<SessionReply>) {
        self.scripts
            .lock()
            .expect("lock")
            .insert(ciphertext.to_vec(), replies.into());
    }

    pub fn set_devices(&self, addr: &str, ids: Vec<u32>) {
        self.devices
            .lock()
            .expect("lock")
            .insert(addr.to_string(), ids);
    }

    pub fn closed_sessions(&self) -> Vec<(String, u32)> {
        self.closed.lock().expect("lock").clone()
    }

    fn reply(&self, kind: &'static str, ciphertext: &[u8]) -> Result<Vec<u8>, SessionError> {
        self.calls.lock().expect("lock").push(kind);
        let mut scripts = self.scripts.lock().expect("lock");
        match scripts.get_mut(ciphertext).and_then(VecDeque::pop_front) {
            Some(SessionReply::Plaintext(plaintext)) => Ok(plaintext),
            Some(SessionReply::Untrusted(identity_key)) => {
                Err(SessionError::UntrustedIdentity { identity_key })
            }
            Some(SessionReply::Duplicate) => Err(SessionError::DuplicateCounter),
            Some(SessionReply::Failure(message)) => Err(SessionError::Failure(message)),
            None => Err(SessionError::Failure("no scripted reply".to_string())),
        }
    }
}

#[async_trait]
impl SessionStore for StubSessionStore {
    async fn decrypt_whisper(
        &self,
        _addr: &str,
        _device_id: u32,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, SessionError> {
        self.reply("whisper", ciphertext)
    }

    async fn decrypt_prekey_whisper(
        &self,
        _addr: &str,
        _device_id: u32,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, SessionError> {
        self.reply("prekey", ciphertext)
    }

    async fn device_ids(&self, addr: &str) -> Result<Vec<u32>, SessionError> {
        Ok(self
            .devices
            .lock()
            .expect("lock")
            .get(addr)
            .cloned()
            .unwrap_or_default())
    }

    async fn close_session(&self, addr: &str, device_id: u32) -> Result<(), SessionError> {
        self.closed
            .lock()
            .expect("lock")
            .push((addr.to_string(), device_id));
        Ok(())
    }
}

#[derive(Default)]
pub struct StubService {
    pub requests: Mutex<Vec<ServiceRequest>>,
    pub listings: Mutex<VecDeque<Value>>,
    pub attachments: Mutex<HashMap<String, Vec<u8>>>,
    pub attachments_fetched: Mutex<Vec<String>>,
    pub device_replies: Mutex<VecDeque<Result<Vec<DeviceInfo>, ProtocolError>>>,
}

impl StubService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded_requests(&self) -> Vec<ServiceRequest> {
        self.requests.lock().expect("lock").clone()
    }

    pub fn push_listing(&self, listing: Value) {
        self.listings.lock().expect("lock").push_back(listing);
    }

    pub fn put_attachment(&self, id: &str, ciphertext: Vec<u8>) {
        self.attachments
            .lock()
            .expect("lock")
            .insert(id.to_string(), ciphertext);
    }

    pub fn push_device_reply(&self, reply: Result<Vec<DeviceInfo>, ProtocolError>) {
        self.device_replies.lock().expect("lock").push_back(reply);
    }
}

#[async_trait]
impl Service for StubService {
    async fn request(&self, request: ServiceRequest) -> Result<Value, ProtocolError> {
        let http_type = request.http_type;
        self.requests.lock().expect("lock").push(request);
        match http_type {
            HttpType::Get => Ok(self
                .listings
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or_else(|| serde_json::json!({ "messages": [], "more": false }))),
            _ => Ok(Value::Null),
        }
    }

    async fn get_devices(&self) -> Result<Vec<DeviceInfo>, ProtocolError> {
        self.device_replies
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Ok(vec![DeviceInfo { id: 1, name: None }]))
    }

    async fn get_attachment(&self, id: &str) -> Result<Vec<u8>, ProtocolError> {
        self.attachments_fetched
            .lock()
            .expect("lock")
            .push(id.to_string());
        self.attachments
            .lock()
            .expect("lock")
            .get(id)
            .cloned()
            .ok_or_else(|| ProtocolError::new(404, "no such attachment"))
    }

    async fn message_stream_url(&self) -> Result<String, ProtocolError> {
        Ok("wss://chat.example.org/v1/websocket/".to_string())
    }
}

pub fn xor(bytes: &[u8], key: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .zip(key.iter().cycle())
        .map(|(byte, key_byte)| byte ^ key_byte)
        .collect()
}

pub struct XorCipher;

#[async_trait]
impl AttachmentCipher for XorCipher {
    async fn decrypt(
        &self,
        key: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, AttachmentCipherError> {
        if key.is_empty() {
            return Err(AttachmentCipherError("empty attachment key".to_string()));
        }
        Ok(xor(ciphertext, key))
    }
}

#[derive(Clone, Debug)]
pub enum Seen {
    Message(MessageEvent),
    Sent(SentEvent),
    Receipt(ReceiptEvent),
    Read(ReadEvent),
    KeyChange { addr: String },
    Error(String),
}

#[derive(Default)]
pub struct Recorder {
    seen: Mutex<Vec<Seen>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Seen> {
        self.seen.lock().expect("lock").clone()
    }

    pub fn messages(&self) -> Vec<MessageEvent> {
        self.events()
            .into_iter()
            .filter_map(|seen| match seen {
                Seen::Message(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    pub fn sent(&self) -> Vec<SentEvent> {
        self.events()
            .into_iter()
            .filter_map(|seen| match seen {
                Seen::Sent(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|seen| match seen {
                Seen::Error(error) => Some(error),
                _ => None,
            })
            .collect()
    }

    pub fn key_changes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|seen| match seen {
                Seen::KeyChange { addr } => Some(addr),
                _ => None,
            })
            .collect()
    }

    pub async fn register(self: Arc<Self>, bus: &EventBus) {
        for kind in [
            EventKind::Message,
            EventKind::Sent,
            EventKind::Receipt,
            EventKind::Read,
            EventKind::KeyChange,
            EventKind::Error,
        ] {
            bus.on(kind, self.clone()).await;
        }
    }
}

#[async_trait]
impl EventListener for Recorder {
    async fn on_event(&self, event: &Event) -> Result<(), ListenerFault> {
        let seen = match event {
            Event::Message(message) => Seen::Message(message.clone()),
            Event::Sent(sent) => Seen::Sent(sent.clone()),
            Event::Receipt(receipt) => Seen::Receipt(receipt.clone()),
            Event::Read(read) => Seen::Read(read.clone()),
            Event::KeyChange(change) => Seen::KeyChange {
                addr: change.addr.clone(),
            },
            Event::Error(error) => Seen::Error(error.error.clone()),
        };
        self.seen.lock().expect("lock").push(seen);
        Ok(())
    }
}

/// Listener that trusts every offered identity key.
pub struct Acceptor;

#[async_trait]
impl EventListener for Acceptor {
    async fn on_event(&self, event: &Event) -> Result<(), ListenerFault> {
        if let Event::KeyChange(change) = event {
            change.accept();
        }
        Ok(())
    }
}

pub struct Fixture {
    pub receiver: Arc<Receiver>,
    pub service: Arc<StubService>,
    pub sessions: Arc<StubSessionStore>,
    pub recorder: Arc<Recorder>,
    pub events: EventBus,
}

pub async fn fixture() -> Fixture {
    let service = Arc::new(StubService::new());
    let sessions = Arc::new(StubSessionStore::new());
    let identity = ReceiverIdentity {
        addr: OWN_ADDR.to_string(),
        device_id: OWN_DEVICE,
        signaling_key: signaling_key(),
    };
    let receiver = Receiver::new(
        ReceiverConfig::default(),
        &MemoryStateStore::new(identity),
        service.clone(),
        sessions.clone(),
        Arc::new(XorCipher),
    )
    .expect("receiver");
    let events = receiver.event_bus();
    let recorder = Recorder::new();
    recorder.clone().register(&events).await;
    Fixture {
        receiver: Arc::new(receiver),
        service,
        sessions,
        recorder,
        events,
    }
}

/// A dispatcher wired straight to the stubs, for asserting raw errors
/// before the taxonomy swallows them.
pub struct DispatcherFixture {
    pub dispatcher: EnvelopeDispatcher,
    pub content: ContentDispatcher,
    pub service: Arc<StubService>,
    pub sessions: Arc<StubSessionStore>,
    pub recorder: Arc<Recorder>,
}

pub async fn dispatcher_fixture() -> DispatcherFixture {
    let service = Arc::new(StubService::new());
    let sessions = Arc::new(StubSessionStore::new());
    let events = EventBus::new();
    let recorder = Recorder::new();
    recorder.clone().register(&events).await;
    let content = ContentDispatcher::new(
        OWN_ADDR.to_string(),
        OWN_DEVICE,
        SessionDecryptor::new(sessions.clone()),
        AttachmentFetcher::new(service.clone(), Arc::new(XorCipher)),
        events.clone(),
    );
    let dispatcher = EnvelopeDispatcher::new(content.clone(), events);
    DispatcherFixture {
        dispatcher,
        content,
        service,
        sessions,
        recorder,
    }
}

pub fn envelope(kind: EnvelopeKind, source: &str, source_device: u32) -> Envelope {
    Envelope {
        kind,
        source: source.to_string(),
        source_device,
        timestamp: 1_700_000_000_000,
        content: None,
        legacy_message: None,
        key_change: false,
    }
}

pub fn data_content(body: &str) -> Content {
    Content {
        data_message: Some(DataMessage {
            body: Some(body.to_string()),
            ..DataMessage::default()
        }),
        sync_message: None,
    }
}

pub fn padded(plaintext: &[u8]) -> Vec<u8> {
    frame::pad(plaintext, plaintext.len() + 8)
}

pub fn padded_content(content: &Content) -> Vec<u8> {
    padded(&encode_content(content).expect("encode content"))
}

pub fn put_request(body: Vec<u8>) -> (TransportRequest, oneshot::Receiver<(u16, String)>) {
    let (responder, rx) = Responder::new();
    (
        TransportRequest {
            verb: "PUT".to_string(),
            path: MESSAGE_PATH.to_string(),
            body,
            responder,
        },
        rx,
    )
}

pub fn sealed_request(
    envelope: &Envelope,
) -> (TransportRequest, oneshot::Receiver<(u16, String)>) {
    let body = frame::encrypt_frame(
        &encode_envelope(envelope).expect("encode envelope"),
        &signaling_key(),
        [9u8; NONCE_LEN],
    )
    .expect("encrypt frame");
    put_request(body)
}

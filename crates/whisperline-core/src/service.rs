use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use whisperline_api::wire::{CodecError, Envelope, EnvelopeKind};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{status}: {message}")]
pub struct ProtocolError {
    pub status: u16,
    pub message: String,
    pub retryable: bool,
}

impl ProtocolError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpType {
    Get,
    Put,
    Delete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceRequest {
    pub call: &'static str,
    pub http_type: HttpType,
    pub url_parameters: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: u32,
    #[serde(default)]
    pub name: Option<String>,
}

/// REST client for the delivery endpoint. HTTP failures surface as typed
/// `ProtocolError`s; timeouts are this collaborator's concern.
#[async_trait]
pub trait Service: Send + Sync {
    async fn request(&self, request: ServiceRequest) -> Result<Value, ProtocolError>;
    async fn get_devices(&self) -> Result<Vec<DeviceInfo>, ProtocolError>;
    async fn get_attachment(&self, id: &str) -> Result<Vec<u8>, ProtocolError>;
    async fn message_stream_url(&self) -> Result<String, ProtocolError>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MessageListing {
    #[serde(default)]
    pub messages: Vec<QueuedMessage>,
    #[serde(default)]
    pub more: bool,
}

/// One envelope as returned by the polling fetch, payloads still base64.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub kind: EnvelopeKind,
    pub source: String,
    pub source_device: u32,
    pub timestamp: u64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl QueuedMessage {
    /// The drain path feeds cleartext-container envelopes to the dispatcher:
    /// whichever payload field is present lands in `legacy_message`.
    pub fn into_envelope(self) -> Result<Envelope, CodecError> {
        let payload = self.content.or(self.message);
        let legacy_message = payload
            .map(|encoded| STANDARD.decode(encoded))
            .transpose()
            .map_err(|_| CodecError::Malformed("base64 payload"))?;
        Ok(Envelope {
            kind: self.kind,
            source: self.source,
            source_device: self.source_device,
            timestamp: self.timestamp,
            content: None,
            legacy_message,
            key_change: false,
        })
    }
}

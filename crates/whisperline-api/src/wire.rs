use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const FLAG_END_SESSION: u32 = 0x1;
pub const FLAG_EXPIRATION_TIMER_UPDATE: u32 = 0x2;
pub const FLAG_PROFILE_KEY_UPDATE: u32 = 0x4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed {0}")]
    Malformed(&'static str),
    #[error("content and legacy_message both present")]
    AmbiguousPayload,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvelopeKind {
    Ciphertext,
    PreKeyBundle,
    Receipt,
    UnidentifiedSender,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    pub source: String,
    pub source_device: u32,
    #[serde(deserialize_with = "wire_timestamp")]
    pub timestamp: u64,
    #[serde(default)]
    pub content: Option<Vec<u8>>,
    #[serde(default)]
    pub legacy_message: Option<Vec<u8>>,
    // Set by the dispatcher on identity-key re-entry, never by the wire.
    #[serde(skip)]
    pub key_change: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Content {
    #[serde(default)]
    pub data_message: Option<DataMessage>,
    #[serde(default)]
    pub sync_message: Option<SyncMessage>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataMessage {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentPointer>,
    #[serde(default)]
    pub group: Option<GroupContext>,
    #[serde(default)]
    pub flags: Option<u32>,
    #[serde(default)]
    pub expire_timer: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttachmentPointer {
    pub id: u64,
    pub key: Vec<u8>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: Option<u32>,
    // Plaintext, filled in after fetch; never carried on the wire.
    #[serde(skip)]
    pub data: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupContext {
    pub id: Vec<u8>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncMessage {
    #[serde(default)]
    pub sent: Option<SentTranscript>,
    #[serde(default)]
    pub read: Vec<ReadReceiptEntry>,
    #[serde(default)]
    pub blocked: Option<BlockedList>,
    #[serde(default)]
    pub contacts: Option<serde_json::Value>,
    #[serde(default)]
    pub groups: Option<serde_json::Value>,
    #[serde(default)]
    pub request: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SentTranscript {
    pub destination: String,
    #[serde(deserialize_with = "wire_timestamp")]
    pub timestamp: u64,
    pub message: DataMessage,
    #[serde(default)]
    pub expiration_start_timestamp: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadReceiptEntry {
    pub sender: String,
    #[serde(deserialize_with = "wire_timestamp")]
    pub timestamp: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockedList {
    #[serde(default)]
    pub numbers: Vec<String>,
}

// 64-bit wire timestamps arrive as either a JSON number or a decimal string.
fn wire_timestamp<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text.parse().map_err(|_| D::Error::custom("timestamp")),
    }
}

pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, CodecError> {
    let envelope: Envelope =
        serde_json::from_slice(bytes).map_err(|_| CodecError::Malformed("envelope"))?;
    if envelope.kind != EnvelopeKind::Receipt
        && envelope.content.is_some()
        && envelope.legacy_message.is_some()
    {
        return Err(CodecError::AmbiguousPayload);
    }
    Ok(envelope)
}

pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(envelope).map_err(|_| CodecError::Malformed("envelope"))
}

pub fn decode_content(bytes: &[u8]) -> Result<Content, CodecError> {
    serde_json::from_slice(bytes).map_err(|_| CodecError::Malformed("content"))
}

pub fn encode_content(content: &Content) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(content).map_err(|_| CodecError::Malformed("content"))
}

pub fn decode_data_message(bytes: &[u8]) -> Result<DataMessage, CodecError> {
    serde_json::from_slice(bytes).map_err(|_| CodecError::Malformed("data message"))
}

pub fn encode_data_message(message: &DataMessage) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(message).map_err(|_| CodecError::Malformed("data message"))
}

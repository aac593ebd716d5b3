use crate::service::ProtocolError;
use thiserror::Error;
use whisperline_api::wire::{CodecError, EnvelopeKind};

#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error("frame authentication failed")]
    FrameAuth,
    #[error("bad padding trailer")]
    Padding,
    #[error("envelope type {0:?} has no session cipher")]
    UnknownEnvelopeType(EnvelopeKind),
    #[error("envelope carries no payload")]
    EmptyEnvelope,
    #[error("content carries neither sync nor data")]
    EmptyContent,
    #[error("sync message carries no variant")]
    EmptySync,
    #[error("sync envelope from foreign source {0}")]
    ForeignSync(String),
    #[error("sync envelope from own device")]
    SelfSync,
    #[error("deprecated sync variant {0}")]
    DeprecatedSync(&'static str),
    #[error("duplicate message counter")]
    MessageCounter,
    #[error("untrusted identity key for {addr}")]
    UntrustedIdentity {
        addr: String,
        ciphertext: Vec<u8>,
        identity_key: Vec<u8>,
    },
    #[error("{0}")]
    Protocol(#[from] ProtocolError),
    #[error("session failure: {0}")]
    Session(String),
    #[error("attachment decrypt failed: {0}")]
    Attachment(String),
    #[error("{0}")]
    Codec(#[from] CodecError),
    #[error("unexpected transport request {verb} {path}")]
    BadTransportRequest { verb: String, path: String },
    #[error("drain requires a detached transport")]
    DrainWhileConnected,
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl ReceiveError {
    /// The generic protocol-error family is the only kind the dispatcher
    /// logs and swallows; every other handler fault surfaces an `error`
    /// event and re-raises.
    pub fn is_protocol_fault(&self) -> bool {
        matches!(self, ReceiveError::Protocol(_))
    }
}

use crate::error::ReceiveError;
use crate::frame;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use whisperline_api::wire::{Envelope, EnvelopeKind};

/// Typed causes from the Signal session store. Identity changes carry the
/// offered key instead of being sniffed out of an error message.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("untrusted identity key")]
    UntrustedIdentity { identity_key: Vec<u8> },
    #[error("duplicate message counter")]
    DuplicateCounter,
    #[error("{0}")]
    Failure(String),
}

/// Per-peer Signal sessions, shared with other protocol users in the
/// process. Each cipher operation is internally atomic.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn decrypt_whisper(
        &self,
        addr: &str,
        device_id: u32,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, SessionError>;
    async fn decrypt_prekey_whisper(
        &self,
        addr: &str,
        device_id: u32,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, SessionError>;
    async fn device_ids(&self, addr: &str) -> Result<Vec<u32>, SessionError>;
    async fn close_session(&self, addr: &str, device_id: u32) -> Result<(), SessionError>;
}

#[derive(Clone)]
pub struct SessionDecryptor {
    store: Arc<dyn SessionStore>,
}

impl SessionDecryptor {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn decrypt(
        &self,
        envelope: &Envelope,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, ReceiveError> {
        let padded = match envelope.kind {
            EnvelopeKind::Ciphertext => {
                self.store
                    .decrypt_whisper(&envelope.source, envelope.source_device, ciphertext)
                    .await
            }
            EnvelopeKind::PreKeyBundle => {
                self.store
                    .decrypt_prekey_whisper(&envelope.source, envelope.source_device, ciphertext)
                    .await
            }
            other => return Err(ReceiveError::UnknownEnvelopeType(other)),
        }
        .map_err(|err| translate(envelope, ciphertext, err))?;
        frame::unpad(&padded).map_err(ReceiveError::from)
    }

    pub async fn close_all_sessions(&self, addr: &str) -> Result<(), ReceiveError> {
        let device_ids = self
            .store
            .device_ids(addr)
            .await
            .map_err(|err| ReceiveError::Session(err.to_string()))?;
        for device_id in device_ids {
            self.store
                .close_session(addr, device_id)
                .await
                .map_err(|err| ReceiveError::Session(err.to_string()))?;
        }
        Ok(())
    }
}

// The ciphertext rides along so the caller can retry after the host accepts
// the new identity key.
fn translate(envelope: &Envelope, ciphertext: &[u8], err: SessionError) -> ReceiveError {
    match err {
        SessionError::UntrustedIdentity { identity_key } => ReceiveError::UntrustedIdentity {
            addr: envelope.source.clone(),
            ciphertext: ciphertext.to_vec(),
            identity_key,
        },
        SessionError::DuplicateCounter => ReceiveError::MessageCounter,
        SessionError::Failure(message) => ReceiveError::Session(message),
    }
}

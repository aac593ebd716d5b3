use crate::error::ReceiveError;
use crate::service::Service;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use whisperline_api::wire::AttachmentPointer;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct AttachmentCipherError(pub String);

/// Content cipher for attachment blobs, provided by the host.
#[async_trait]
pub trait AttachmentCipher: Send + Sync {
    async fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, AttachmentCipherError>;
}

#[derive(Clone)]
pub struct AttachmentFetcher {
    service: Arc<dyn Service>,
    cipher: Arc<dyn AttachmentCipher>,
}

impl AttachmentFetcher {
    pub fn new(service: Arc<dyn Service>, cipher: Arc<dyn AttachmentCipher>) -> Self {
        Self { service, cipher }
    }

    pub async fn fetch(&self, attachment: &mut AttachmentPointer) -> Result<(), ReceiveError> {
        let ciphertext = self
            .service
            .get_attachment(&attachment.id.to_string())
            .await?;
        let plaintext = self
            .cipher
            .decrypt(&attachment.key, &ciphertext)
            .await
            .map_err(|err| ReceiveError::Attachment(err.to_string()))?;
        attachment.data = Some(plaintext);
        Ok(())
    }
}

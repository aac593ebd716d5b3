use crate::attachments::AttachmentFetcher;
use crate::error::ReceiveError;
use crate::event::EventBus;
use crate::session::SessionDecryptor;
use futures::future::try_join_all;
use tracing::warn;
use whisperline_api::events::{Event, MessageEvent, ReadEvent, ReadReceipt, SentEvent};
use whisperline_api::wire::{
    self, DataMessage, Envelope, SentTranscript, SyncMessage, FLAG_END_SESSION,
};

/// Decodes decrypted payloads and routes data vs sync messages.
#[derive(Clone)]
pub struct ContentDispatcher {
    own_addr: String,
    own_device_id: u32,
    sessions: SessionDecryptor,
    fetcher: AttachmentFetcher,
    events: EventBus,
}

impl ContentDispatcher {
    pub fn new(
        own_addr: String,
        own_device_id: u32,
        sessions: SessionDecryptor,
        fetcher: AttachmentFetcher,
        events: EventBus,
    ) -> Self {
        Self {
            own_addr,
            own_device_id,
            sessions,
            fetcher,
            events,
        }
    }

    pub async fn handle_content_message(&self, envelope: &Envelope) -> Result<(), ReceiveError> {
        let ciphertext = envelope
            .content
            .as_deref()
            .ok_or(ReceiveError::EmptyEnvelope)?;
        let plaintext = self.sessions.decrypt(envelope, ciphertext).await?;
        let content = wire::decode_content(&plaintext)?;
        if let Some(sync) = content.sync_message {
            self.handle_sync_message(sync, envelope).await
        } else if let Some(message) = content.data_message {
            self.handle_data_message(message, envelope).await
        } else {
            Err(ReceiveError::EmptyContent)
        }
    }

    pub async fn handle_legacy_message(&self, envelope: &Envelope) -> Result<(), ReceiveError> {
        let ciphertext = envelope
            .legacy_message
            .as_deref()
            .ok_or(ReceiveError::EmptyEnvelope)?;
        let plaintext = self.sessions.decrypt(envelope, ciphertext).await?;
        let message = wire::decode_data_message(&plaintext)?;
        self.handle_data_message(message, envelope).await
    }

    async fn handle_data_message(
        &self,
        message: DataMessage,
        envelope: &Envelope,
    ) -> Result<(), ReceiveError> {
        if message.flags.unwrap_or(0) & FLAG_END_SESSION != 0 {
            self.sessions.close_all_sessions(&envelope.source).await?;
        }
        let message = self.process_decrypted(message, &envelope.source).await?;
        self.events
            .dispatch(&Event::Message(MessageEvent {
                timestamp: envelope.timestamp,
                source: envelope.source.clone(),
                source_device: envelope.source_device,
                message,
                key_change: envelope.key_change,
            }))
            .await;
        Ok(())
    }

    async fn handle_sync_message(
        &self,
        sync: SyncMessage,
        envelope: &Envelope,
    ) -> Result<(), ReceiveError> {
        if envelope.source != self.own_addr {
            return Err(ReceiveError::ForeignSync(envelope.source.clone()));
        }
        if envelope.source_device == self.own_device_id {
            return Err(ReceiveError::SelfSync);
        }
        if let Some(sent) = sync.sent {
            return self.handle_sent_message(sent, envelope).await;
        }
        if !sync.read.is_empty() {
            for entry in sync.read {
                self.events
                    .dispatch(&Event::Read(ReadEvent {
                        timestamp: envelope.timestamp,
                        read: ReadReceipt {
                            timestamp: entry.timestamp,
                            sender: entry.sender,
                            source: envelope.source.clone(),
                            source_device: envelope.source_device,
                        },
                    }))
                    .await;
            }
            return Ok(());
        }
        if sync.blocked.is_some() {
            return Err(ReceiveError::Unsupported("blocked sync"));
        }
        if sync.contacts.is_some() {
            return Err(ReceiveError::DeprecatedSync("contacts"));
        }
        if sync.groups.is_some() {
            return Err(ReceiveError::DeprecatedSync("groups"));
        }
        if sync.request.is_some() {
            return Err(ReceiveError::DeprecatedSync("request"));
        }
        Err(ReceiveError::EmptySync)
    }

    async fn handle_sent_message(
        &self,
        sent: SentTranscript,
        envelope: &Envelope,
    ) -> Result<(), ReceiveError> {
        if sent.message.flags.unwrap_or(0) & FLAG_END_SESSION != 0 {
            self.sessions.close_all_sessions(&sent.destination).await?;
        }
        let message = self.process_decrypted(sent.message, &self.own_addr).await?;
        self.events
            .dispatch(&Event::Sent(SentEvent {
                source: envelope.source.clone(),
                source_device: envelope.source_device,
                timestamp: sent.timestamp,
                destination: sent.destination,
                message,
                expiration_start_timestamp: sent.expiration_start_timestamp,
            }))
            .await;
        Ok(())
    }

    async fn process_decrypted(
        &self,
        mut message: DataMessage,
        source: &str,
    ) -> Result<DataMessage, ReceiveError> {
        let flags = *message.flags.get_or_insert(0);
        message.expire_timer.get_or_insert(0);
        if flags & FLAG_END_SESSION != 0 {
            return Ok(message);
        }
        if message.group.is_some() {
            // Legacy senders still attach a group context; tolerated for now.
            warn!(source, "ignoring legacy group context on data message");
        }
        try_join_all(
            message
                .attachments
                .iter_mut()
                .map(|attachment| self.fetcher.fetch(attachment)),
        )
        .await?;
        Ok(message)
    }
}

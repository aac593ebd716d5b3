use crate::content::ContentDispatcher;
use crate::error::ReceiveError;
use crate::event::EventBus;
use tracing::{debug, warn};
use whisperline_api::events::{ErrorEvent, Event, KeyChangeEvent, ReceiptEvent};
use whisperline_api::wire::{Envelope, EnvelopeKind};

/// Classifies envelopes and applies the error taxonomy. Identity-key
/// re-entry runs as a loop capped at depth one instead of recursing.
#[derive(Clone)]
pub struct EnvelopeDispatcher {
    content: ContentDispatcher,
    events: EventBus,
}

impl EnvelopeDispatcher {
    pub fn new(content: ContentDispatcher, events: EventBus) -> Self {
        Self { content, events }
    }

    pub async fn handle_envelope(&self, mut envelope: Envelope) -> Result<(), ReceiveError> {
        let mut reentrant = false;
        loop {
            let err = match self.classify(&envelope).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            match err {
                ReceiveError::MessageCounter => {
                    debug!(source = %envelope.source, "dropping envelope with duplicate counter");
                    return Ok(());
                }
                ReceiveError::UntrustedIdentity {
                    addr, identity_key, ..
                } if !reentrant => {
                    let event = Event::KeyChange(KeyChangeEvent::new(addr, identity_key));
                    self.events.dispatch(&event).await;
                    let accepted = match &event {
                        Event::KeyChange(change) => change.accepted(),
                        _ => false,
                    };
                    if !accepted {
                        debug!(source = %envelope.source, "identity key change rejected, dropping envelope");
                        return Ok(());
                    }
                    envelope.key_change = true;
                    reentrant = true;
                }
                err if err.is_protocol_fault() => {
                    warn!(source = %envelope.source, error = %err, "protocol fault while handling envelope");
                    return Ok(());
                }
                err => {
                    self.events
                        .dispatch(&Event::Error(ErrorEvent {
                            error: err.to_string(),
                            proto: Some(envelope.clone()),
                        }))
                        .await;
                    return Err(err);
                }
            }
        }
    }

    async fn classify(&self, envelope: &Envelope) -> Result<(), ReceiveError> {
        if envelope.kind == EnvelopeKind::Receipt {
            self.events
                .dispatch(&Event::Receipt(ReceiptEvent {
                    proto: envelope.clone(),
                }))
                .await;
            return Ok(());
        }
        if envelope.content.is_some() {
            return self.content.handle_content_message(envelope).await;
        }
        if envelope.legacy_message.is_some() {
            return self.content.handle_legacy_message(envelope).await;
        }
        Err(ReceiveError::EmptyEnvelope)
    }
}

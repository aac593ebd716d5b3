use crate::frame::SignalingKey;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("missing {0}")]
    Missing(&'static str),
}

/// Immutable for a receiver's lifetime.
#[derive(Clone, Debug)]
pub struct ReceiverIdentity {
    pub addr: String,
    pub device_id: u32,
    pub signaling_key: SignalingKey,
}

pub trait StateStore: Send + Sync {
    fn load_identity(&self) -> Result<ReceiverIdentity, StateError>;
}

pub struct MemoryStateStore {
    identity: ReceiverIdentity,
}

impl MemoryStateStore {
    pub fn new(identity: ReceiverIdentity) -> Self {
        Self { identity }
    }
}

impl StateStore for MemoryStateStore {
    fn load_identity(&self) -> Result<ReceiverIdentity, StateError> {
        Ok(self.identity.clone())
    }
}

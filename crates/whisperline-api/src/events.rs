use crate::wire::{DataMessage, Envelope};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    Sent,
    Receipt,
    Read,
    KeyChange,
    Error,
}

#[derive(Debug)]
pub enum Event {
    Message(MessageEvent),
    Sent(SentEvent),
    Receipt(ReceiptEvent),
    Read(ReadEvent),
    KeyChange(KeyChangeEvent),
    Error(ErrorEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Message(_) => EventKind::Message,
            Event::Sent(_) => EventKind::Sent,
            Event::Receipt(_) => EventKind::Receipt,
            Event::Read(_) => EventKind::Read,
            Event::KeyChange(_) => EventKind::KeyChange,
            Event::Error(_) => EventKind::Error,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub timestamp: u64,
    pub source: String,
    pub source_device: u32,
    pub message: DataMessage,
    pub key_change: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentEvent {
    pub source: String,
    pub source_device: u32,
    pub timestamp: u64,
    pub destination: String,
    pub message: DataMessage,
    pub expiration_start_timestamp: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiptEvent {
    pub proto: Envelope,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadEvent {
    pub timestamp: u64,
    pub read: ReadReceipt,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadReceipt {
    pub timestamp: u64,
    pub sender: String,
    pub source: String,
    pub source_device: u32,
}

/// A listener that trusts the new identity key calls `accept`; the
/// dispatcher reads the decision back after dispatch returns.
#[derive(Debug)]
pub struct KeyChangeEvent {
    pub addr: String,
    pub identity_key: Vec<u8>,
    accepted: AtomicBool,
}

impl KeyChangeEvent {
    pub fn new(addr: String, identity_key: Vec<u8>) -> Self {
        Self {
            addr,
            identity_key,
            accepted: AtomicBool::new(false),
        }
    }

    pub fn accept(&self) {
        self.accepted.store(true, Ordering::SeqCst);
    }

    pub fn accepted(&self) -> bool {
        self.accepted.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct ErrorEvent {
    pub error: String,
    pub proto: Option<Envelope>,
}

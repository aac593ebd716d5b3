use crate::error::ReceiveError;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;

const CONTEXT: &[u8] = b"whisperline:frame:v1";
pub const FRAME_VERSION: u8 = 1;
pub const NONCE_LEN: usize = 24;
const PADDING_SENTINEL: u8 = 0x80;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame authentication failed")]
    Auth,
    #[error("malformed frame")]
    Malformed,
    #[error("derive")]
    Derive,
    #[error("bad padding trailer")]
    Padding,
}

impl From<FrameError> for ReceiveError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Padding => ReceiveError::Padding,
            _ => ReceiveError::FrameAuth,
        }
    }
}

/// Symmetric material shared with the delivery endpoint, used only at the
/// transport-frame layer. Distinct from per-peer Signal sessions.
#[derive(Clone)]
pub struct SignalingKey([u8; 32]);

impl SignalingKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Self)
    }
}

impl std::fmt::Debug for SignalingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SignalingKey(..)")
    }
}

fn derive_frame_key(key: &SignalingKey) -> Result<[u8; 32], FrameError> {
    let hkdf = Hkdf::<Sha256>::new(None, &key.0);
    let mut out = [0u8; 32];
    hkdf.expand(CONTEXT, &mut out).map_err(|_| FrameError::Derive)?;
    Ok(out)
}

pub fn encrypt_frame(
    plaintext: &[u8],
    key: &SignalingKey,
    nonce: [u8; NONCE_LEN],
) -> Result<Vec<u8>, FrameError> {
    let cipher = XChaCha20Poly1305::new_from_slice(&derive_frame_key(key)?)
        .map_err(|_| FrameError::Malformed)?;
    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &[FRAME_VERSION],
            },
        )
        .map_err(|_| FrameError::Auth)?;
    let mut frame = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
    frame.push(FRAME_VERSION);
    frame.extend_from_slice(&nonce);
    frame.extend_from_slice(&ciphertext);
    Ok(frame)
}

pub fn decrypt_frame(body: &[u8], key: &SignalingKey) -> Result<Vec<u8>, FrameError> {
    if body.len() < 1 + NONCE_LEN {
        return Err(FrameError::Malformed);
    }
    if body[0] != FRAME_VERSION {
        return Err(FrameError::Malformed);
    }
    let (nonce, ciphertext) = body[1..].split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new_from_slice(&derive_frame_key(key)?)
        .map_err(|_| FrameError::Malformed)?;
    cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: &[FRAME_VERSION],
            },
        )
        .map_err(|_| FrameError::Auth)
}

pub fn pad(plaintext: &[u8], padded_len: usize) -> Vec<u8> {
    let mut padded = Vec::with_capacity(padded_len.max(plaintext.len() + 1));
    padded.extend_from_slice(plaintext);
    padded.push(PADDING_SENTINEL);
    while padded.len() < padded_len {
        padded.push(0x00);
    }
    padded
}

/// Scan from the tail: the first non-zero byte must be the 0x80 sentinel and
/// marks the end of plaintext. An all-zero buffer is empty plaintext.
pub fn unpad(padded: &[u8]) -> Result<Vec<u8>, FrameError> {
    for (idx, byte) in padded.iter().enumerate().rev() {
        match *byte {
            0x00 => continue,
            PADDING_SENTINEL => return Ok(padded[..idx].to_vec()),
            _ => return Err(FrameError::Padding),
        }
    }
    Ok(Vec::new())
}

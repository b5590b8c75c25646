//! Binary codec for encoding and decoding screenhop protocol messages.
//!
//! Wire format:
//! ```text
//! [version:1][msg_type:1][reserved:2][payload_len:4][payload:N]
//! ```
//! Total header size: 8 bytes. All multi-byte integers are big-endian.
//!
//! Two layers are provided: plain `encode_message`/`decode_message` over byte
//! slices, and [`WireCodec`], a `tokio_util` [`Decoder`]/[`Encoder`] pair used
//! with `Framed` streams by the connection workers.

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::messages::{
    ButtonId, ClipboardGrabMessage, ClipboardId, ClipboardSetMessage, EnterMessage, HelloMessage,
    HelloReplyMessage, InfoMessage, KeyId, MessageType, ModifierMask, WireMessage, HEADER_SIZE,
    PROTOCOL_VERSION,
};

/// Largest frame accepted on the wire. Clipboard transfers dominate frame
/// size; anything beyond this is treated as a protocol violation.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The message type byte in the header is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The payload could not be parsed (field value out of range, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The encoded payload length field does not match the actual data available.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// The frame exceeds [`MAX_FRAME_SIZE`].
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`WireMessage`] into a byte vector including the 8-byte header.
///
/// # Examples
///
/// ```rust
/// use screenhop_core::protocol::{decode_message, encode_message};
/// use screenhop_core::protocol::messages::WireMessage;
///
/// let bytes = encode_message(&WireMessage::Leave);
/// let (decoded, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(decoded, WireMessage::Leave);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(msg: &WireMessage) -> Vec<u8> {
    let payload = encode_payload(msg);
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());

    buf.push(PROTOCOL_VERSION);
    buf.push(msg.message_type() as u8);
    buf.push(0x00); // reserved
    buf.push(0x00); // reserved
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    buf
}

/// Decodes one [`WireMessage`] from the beginning of `bytes`.
///
/// Returns the decoded message and the total number of bytes consumed
/// (header + payload), so the caller can advance their read cursor.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed.
pub fn decode_message(bytes: &[u8]) -> Result<(WireMessage, usize), ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let msg_type_byte = bytes[1];
    let msg_type = MessageType::try_from(msg_type_byte)
        .map_err(|_| ProtocolError::UnknownMessageType(msg_type_byte))?;

    // bytes[2..4] are reserved – ignored on decode

    let payload_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    if payload_len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: payload_len,
            max: MAX_FRAME_SIZE,
        });
    }

    let total_needed = HEADER_SIZE + payload_len;
    if bytes.len() < total_needed {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared: payload_len,
            available: bytes.len() - HEADER_SIZE,
        });
    }

    let payload = &bytes[HEADER_SIZE..total_needed];
    let msg = decode_payload(msg_type, payload)?;
    Ok((msg, total_needed))
}

// ── Framed codec ──────────────────────────────────────────────────────────────

/// Length-prefixed frame codec for `tokio_util::codec::Framed` streams.
///
/// Decoding waits for a complete frame before yielding; a partial frame
/// returns `Ok(None)` so the transport reads more bytes.
#[derive(Debug, Default)]
pub struct WireCodec;

impl Decoder for WireCodec {
    type Item = WireMessage;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<WireMessage>, ProtocolError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let payload_len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if payload_len > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: MAX_FRAME_SIZE,
            });
        }

        let total = HEADER_SIZE + payload_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let (msg, consumed) = decode_message(&src[..total])?;
        src.advance(consumed);
        Ok(Some(msg))
    }
}

impl Encoder<WireMessage> for WireCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: WireMessage, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let bytes = encode_message(&item);
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}

// `Framed` surfaces transport errors through the codec error type.
impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        ProtocolError::MalformedPayload(format!("transport error: {e}"))
    }
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(msg: &WireMessage) -> Vec<u8> {
    let mut buf = Vec::new();
    match msg {
        WireMessage::Hello(m) => buf.push(m.version),
        WireMessage::HelloReply(m) => {
            buf.push(m.version);
            write_length_prefixed_string(&mut buf, &m.name);
        }
        WireMessage::QueryInfo
        | WireMessage::Noop
        | WireMessage::Error
        | WireMessage::Close
        | WireMessage::Leave => {} // empty payload
        WireMessage::Info(m) => {
            for v in [m.x, m.y, m.w, m.h, m.zone_size, m.mx, m.my] {
                buf.extend_from_slice(&v.to_be_bytes());
            }
        }
        WireMessage::Enter(m) => {
            buf.extend_from_slice(&m.x.to_be_bytes());
            buf.extend_from_slice(&m.y.to_be_bytes());
            buf.extend_from_slice(&m.seq_num.to_be_bytes());
            buf.extend_from_slice(&m.mask.0.to_be_bytes());
        }
        WireMessage::KeyDown { key, mask } | WireMessage::KeyUp { key, mask } => {
            buf.extend_from_slice(&key.0.to_be_bytes());
            buf.extend_from_slice(&mask.0.to_be_bytes());
        }
        WireMessage::KeyRepeat { key, mask, count } => {
            buf.extend_from_slice(&key.0.to_be_bytes());
            buf.extend_from_slice(&mask.0.to_be_bytes());
            buf.extend_from_slice(&count.to_be_bytes());
        }
        WireMessage::MouseDown { button } | WireMessage::MouseUp { button } => {
            buf.push(button.0);
        }
        WireMessage::MouseMoveRel { dx, dy } => {
            buf.extend_from_slice(&dx.to_be_bytes());
            buf.extend_from_slice(&dy.to_be_bytes());
        }
        WireMessage::MouseWheel { delta } => {
            buf.extend_from_slice(&delta.to_be_bytes());
        }
        WireMessage::ClipboardGrab(m) => {
            buf.push(m.id as u8);
            buf.extend_from_slice(&m.seq_num.to_be_bytes());
        }
        WireMessage::ClipboardSet(m) => {
            buf.push(m.id as u8);
            buf.extend_from_slice(&m.seq_num.to_be_bytes());
            buf.extend_from_slice(&(m.data.len() as u32).to_be_bytes());
            buf.extend_from_slice(&m.data);
        }
    }
    buf
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_payload(msg_type: MessageType, p: &[u8]) -> Result<WireMessage, ProtocolError> {
    match msg_type {
        MessageType::Hello => {
            require_len(p, 1, "Hello")?;
            Ok(WireMessage::Hello(HelloMessage { version: p[0] }))
        }
        MessageType::HelloReply => {
            require_len(p, 3, "HelloReply")?;
            let version = p[0];
            let (name, _) = read_length_prefixed_string(p, 1)?;
            Ok(WireMessage::HelloReply(HelloReplyMessage { version, name }))
        }
        MessageType::QueryInfo => Ok(WireMessage::QueryInfo),
        MessageType::Noop => Ok(WireMessage::Noop),
        MessageType::Error => Ok(WireMessage::Error),
        MessageType::Close => Ok(WireMessage::Close),
        MessageType::Leave => Ok(WireMessage::Leave),
        MessageType::Info => {
            require_len(p, 28, "Info")?;
            Ok(WireMessage::Info(InfoMessage {
                x: read_i32(p, 0)?,
                y: read_i32(p, 4)?,
                w: read_i32(p, 8)?,
                h: read_i32(p, 12)?,
                zone_size: read_i32(p, 16)?,
                mx: read_i32(p, 20)?,
                my: read_i32(p, 24)?,
            }))
        }
        MessageType::Enter => {
            require_len(p, 16, "Enter")?;
            Ok(WireMessage::Enter(EnterMessage {
                x: read_i32(p, 0)?,
                y: read_i32(p, 4)?,
                seq_num: read_u32(p, 8)?,
                mask: ModifierMask(read_u32(p, 12)?),
            }))
        }
        MessageType::KeyDown => {
            require_len(p, 8, "KeyDown")?;
            Ok(WireMessage::KeyDown {
                key: KeyId(read_u32(p, 0)?),
                mask: ModifierMask(read_u32(p, 4)?),
            })
        }
        MessageType::KeyUp => {
            require_len(p, 8, "KeyUp")?;
            Ok(WireMessage::KeyUp {
                key: KeyId(read_u32(p, 0)?),
                mask: ModifierMask(read_u32(p, 4)?),
            })
        }
        MessageType::KeyRepeat => {
            require_len(p, 12, "KeyRepeat")?;
            Ok(WireMessage::KeyRepeat {
                key: KeyId(read_u32(p, 0)?),
                mask: ModifierMask(read_u32(p, 4)?),
                count: read_i32(p, 8)?,
            })
        }
        MessageType::MouseDown => {
            require_len(p, 1, "MouseDown")?;
            Ok(WireMessage::MouseDown { button: ButtonId(p[0]) })
        }
        MessageType::MouseUp => {
            require_len(p, 1, "MouseUp")?;
            Ok(WireMessage::MouseUp { button: ButtonId(p[0]) })
        }
        MessageType::MouseMoveRel => {
            require_len(p, 8, "MouseMoveRel")?;
            Ok(WireMessage::MouseMoveRel {
                dx: read_i32(p, 0)?,
                dy: read_i32(p, 4)?,
            })
        }
        MessageType::MouseWheel => {
            require_len(p, 4, "MouseWheel")?;
            Ok(WireMessage::MouseWheel { delta: read_i32(p, 0)? })
        }
        MessageType::ClipboardGrab => {
            require_len(p, 5, "ClipboardGrab")?;
            let id = clipboard_id(p[0])?;
            Ok(WireMessage::ClipboardGrab(ClipboardGrabMessage {
                id,
                seq_num: read_u32(p, 1)?,
            }))
        }
        MessageType::ClipboardSet => {
            require_len(p, 9, "ClipboardSet")?;
            let id = clipboard_id(p[0])?;
            let seq_num = read_u32(p, 1)?;
            let data_len = read_u32(p, 5)? as usize;
            require_len(p, 9 + data_len, "ClipboardSet.data")?;
            Ok(WireMessage::ClipboardSet(ClipboardSetMessage {
                id,
                seq_num,
                data: p[9..9 + data_len].to_vec(),
            }))
        }
    }
}

// ── Read/write helpers ────────────────────────────────────────────────────────

fn require_len(p: &[u8], needed: usize, what: &str) -> Result<(), ProtocolError> {
    if p.len() < needed {
        return Err(ProtocolError::MalformedPayload(format!(
            "{what}: need {needed} bytes, got {}",
            p.len()
        )));
    }
    Ok(())
}

fn read_u32(p: &[u8], off: usize) -> Result<u32, ProtocolError> {
    require_len(p, off + 4, "u32")?;
    Ok(u32::from_be_bytes([p[off], p[off + 1], p[off + 2], p[off + 3]]))
}

fn read_i32(p: &[u8], off: usize) -> Result<i32, ProtocolError> {
    Ok(read_u32(p, off)? as i32)
}

fn clipboard_id(byte: u8) -> Result<ClipboardId, ProtocolError> {
    ClipboardId::try_from(byte)
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown clipboard id: {byte}")))
}

fn write_length_prefixed_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u16).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn read_length_prefixed_string(p: &[u8], off: usize) -> Result<(String, usize), ProtocolError> {
    require_len(p, off + 2, "string length")?;
    let len = u16::from_be_bytes([p[off], p[off + 1]]) as usize;
    let end = off + 2 + len;
    require_len(p, end, "string")?;
    let s = std::str::from_utf8(&p[off + 2..end])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8 string: {e}")))?;
    Ok((s.to_string(), end))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

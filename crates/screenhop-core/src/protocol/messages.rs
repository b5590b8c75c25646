//! All screenhop wire message types.
//!
//! The server owns the primary screen; clients own secondary screens and dial
//! in over TCP. Every message below travels inside a length-prefixed frame
//! (see [`crate::protocol::codec`]). Integers are big-endian on the wire.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Size of the common frame header in bytes:
/// `[version:1][msg_type:1][reserved:2][payload_len:4]`.
pub const HEADER_SIZE: usize = 8;

// ── Message type codes ────────────────────────────────────────────────────────

/// All message type codes on the wire.
///
/// Codes are grouped by concern: session control (0x00–0x1F), screen
/// switching (0x20–0x3F), input forwarding (0x40–0x5F), and clipboard
/// (0x60–0x7F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Session control
    Hello = 0x01,
    HelloReply = 0x02,
    QueryInfo = 0x03,
    Info = 0x04,
    Noop = 0x05,
    Error = 0x06,
    Close = 0x07,
    // Screen switching
    Enter = 0x20,
    Leave = 0x21,
    // Input forwarding
    KeyDown = 0x40,
    KeyUp = 0x41,
    KeyRepeat = 0x42,
    MouseDown = 0x43,
    MouseUp = 0x44,
    MouseMoveRel = 0x45,
    MouseWheel = 0x46,
    // Clipboard
    ClipboardGrab = 0x60,
    ClipboardSet = 0x61,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::Hello),
            0x02 => Ok(MessageType::HelloReply),
            0x03 => Ok(MessageType::QueryInfo),
            0x04 => Ok(MessageType::Info),
            0x05 => Ok(MessageType::Noop),
            0x06 => Ok(MessageType::Error),
            0x07 => Ok(MessageType::Close),
            0x20 => Ok(MessageType::Enter),
            0x21 => Ok(MessageType::Leave),
            0x40 => Ok(MessageType::KeyDown),
            0x41 => Ok(MessageType::KeyUp),
            0x42 => Ok(MessageType::KeyRepeat),
            0x43 => Ok(MessageType::MouseDown),
            0x44 => Ok(MessageType::MouseUp),
            0x45 => Ok(MessageType::MouseMoveRel),
            0x46 => Ok(MessageType::MouseWheel),
            0x60 => Ok(MessageType::ClipboardGrab),
            0x61 => Ok(MessageType::ClipboardSet),
            _ => Err(()),
        }
    }
}

// ── Field newtypes ────────────────────────────────────────────────────────────

/// Platform-independent key identifier forwarded verbatim from the primary
/// driver. The driver and the client agree on the key space; the server only
/// routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId(pub u32);

/// Modifier key bitmask carried with key events and `Enter`.
///
/// Bit layout:
/// - Bit 0: Shift
/// - Bit 1: Control
/// - Bit 2: Alt
/// - Bit 3: Meta
/// - Bit 4: Super
/// - Bit 12: Caps Lock
/// - Bit 13: Num Lock
/// - Bit 14: Scroll Lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModifierMask(pub u32);

impl ModifierMask {
    pub const SHIFT: u32 = 1 << 0;
    pub const CONTROL: u32 = 1 << 1;
    pub const ALT: u32 = 1 << 2;
    pub const META: u32 = 1 << 3;
    pub const SUPER: u32 = 1 << 4;
    pub const CAPS_LOCK: u32 = 1 << 12;
    pub const NUM_LOCK: u32 = 1 << 13;
    pub const SCROLL_LOCK: u32 = 1 << 14;

    /// Returns `true` if Scroll Lock is latched in this mask.
    pub fn scroll_lock(&self) -> bool {
        self.0 & Self::SCROLL_LOCK != 0
    }
}

/// Mouse button identifier. 1 = left, 2 = middle, 3 = right; higher values
/// are extra buttons passed through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonId(pub u8);

impl ButtonId {
    pub const LEFT: ButtonId = ButtonId(1);
    pub const MIDDLE: ButtonId = ButtonId(2);
    pub const RIGHT: ButtonId = ButtonId(3);
}

/// Identifies one of the mirrored clipboards.
///
/// The set is closed: the system clipboard and the X11-style primary
/// selection. `COUNT` sizes the per-screen `got_clipboard` arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ClipboardId {
    Clipboard = 0,
    Selection = 1,
}

impl ClipboardId {
    /// Number of distinct clipboards.
    pub const COUNT: usize = 2;

    /// All clipboard ids, in index order.
    pub const ALL: [ClipboardId; ClipboardId::COUNT] =
        [ClipboardId::Clipboard, ClipboardId::Selection];

    /// Returns the array index for this clipboard.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for ClipboardId {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(ClipboardId::Clipboard),
            1 => Ok(ClipboardId::Selection),
            _ => Err(()),
        }
    }
}

// ── Per-message payload structs ───────────────────────────────────────────────

/// HELLO (0x01): sent by the server immediately after accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloMessage {
    /// Protocol version the server speaks.
    pub version: u8,
}

/// HELLO_REPLY (0x02): the client identifies itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReplyMessage {
    /// Protocol version the client speaks; must match the server's.
    pub version: u8,
    /// The screen name this client claims. Checked against the configuration
    /// before the connection is admitted.
    pub name: String,
}

/// ENTER (0x20): the receiving screen becomes the active screen.
///
/// `seq_num` lets the client correlate a later clipboard grab with the most
/// recent entry; a grab carrying a sequence at or above the one in the last
/// `Enter` supersedes the server's current clipboard owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnterMessage {
    /// Entry X position in the destination screen's local coordinate space.
    pub x: i32,
    /// Entry Y position in the destination screen's local coordinate space.
    pub y: i32,
    /// Sequence number of this entry; strictly increasing over the session.
    pub seq_num: u32,
    /// Modifier state at the moment of the switch.
    pub mask: ModifierMask,
}

/// INFO (0x04): a screen reports its shape.
///
/// `x`/`y` place the screen in the shared virtual coordinate space; `w`/`h`
/// are the size, `zone_size` the jump-zone thickness, and `mx`/`my` the
/// current cursor position on that screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoMessage {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub zone_size: i32,
    pub mx: i32,
    pub my: i32,
}

/// CLIPBOARD_GRAB (0x60): a screen announces it now owns a clipboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardGrabMessage {
    pub id: ClipboardId,
    /// Sequence number of the `Enter` the grabbing screen last saw.
    pub seq_num: u32,
}

/// CLIPBOARD_SET (0x61): serialized clipboard contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardSetMessage {
    pub id: ClipboardId,
    pub seq_num: u32,
    /// Serialized contents, opaque to the server.
    pub data: Vec<u8>,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// All valid screenhop messages, discriminated by type.
///
/// The same enum is used in both directions; which kinds are legal on which
/// side is enforced by the connection workers, not the codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireMessage {
    Hello(HelloMessage),
    HelloReply(HelloReplyMessage),
    QueryInfo,
    Info(InfoMessage),
    Noop,
    Error,
    Close,
    Enter(EnterMessage),
    Leave,
    KeyDown { key: KeyId, mask: ModifierMask },
    KeyUp { key: KeyId, mask: ModifierMask },
    KeyRepeat { key: KeyId, mask: ModifierMask, count: i32 },
    MouseDown { button: ButtonId },
    MouseUp { button: ButtonId },
    MouseMoveRel { dx: i32, dy: i32 },
    MouseWheel { delta: i32 },
    ClipboardGrab(ClipboardGrabMessage),
    ClipboardSet(ClipboardSetMessage),
}

impl WireMessage {
    /// Returns the [`MessageType`] discriminant for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            WireMessage::Hello(_) => MessageType::Hello,
            WireMessage::HelloReply(_) => MessageType::HelloReply,
            WireMessage::QueryInfo => MessageType::QueryInfo,
            WireMessage::Info(_) => MessageType::Info,
            WireMessage::Noop => MessageType::Noop,
            WireMessage::Error => MessageType::Error,
            WireMessage::Close => MessageType::Close,
            WireMessage::Enter(_) => MessageType::Enter,
            WireMessage::Leave => MessageType::Leave,
            WireMessage::KeyDown { .. } => MessageType::KeyDown,
            WireMessage::KeyUp { .. } => MessageType::KeyUp,
            WireMessage::KeyRepeat { .. } => MessageType::KeyRepeat,
            WireMessage::MouseDown { .. } => MessageType::MouseDown,
            WireMessage::MouseUp { .. } => MessageType::MouseUp,
            WireMessage::MouseMoveRel { .. } => MessageType::MouseMoveRel,
            WireMessage::MouseWheel { .. } => MessageType::MouseWheel,
            WireMessage::ClipboardGrab(_) => MessageType::ClipboardGrab,
            WireMessage::ClipboardSet(_) => MessageType::ClipboardSet,
        }
    }
}

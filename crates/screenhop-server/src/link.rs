//! Protocol handles: how the server talks to a screen.
//!
//! Every screen record owns exactly one [`ScreenLink`]. For secondaries the
//! link enqueues frames onto the connection worker's outbound channel; for
//! the primary it calls into the local driver. Sends are non-blocking by
//! contract — the server mutex is routinely held while sending, and a slow
//! network must never stall event dispatch (the per-client writer drains the
//! queue outside the lock).

use std::sync::Arc;

use screenhop_core::protocol::messages::{
    ButtonId, ClipboardGrabMessage, ClipboardId, ClipboardSetMessage, EnterMessage, KeyId,
    ModifierMask, WireMessage,
};
use tokio::sync::mpsc;

use crate::primary::PrimaryScreen;

/// Send half of a screen connection.
///
/// Implementations must not block: delivery failures (a closing connection)
/// are swallowed here and surface through the connection worker's own exit.
pub trait ScreenLink: Send + Sync {
    fn send(&self, msg: WireMessage);

    // ── Convenience wrappers ──────────────────────────────────────────────────

    fn enter(&self, x: i32, y: i32, seq_num: u32, mask: ModifierMask) {
        self.send(WireMessage::Enter(EnterMessage { x, y, seq_num, mask }));
    }

    fn leave(&self) {
        self.send(WireMessage::Leave);
    }

    fn key_down(&self, key: KeyId, mask: ModifierMask) {
        self.send(WireMessage::KeyDown { key, mask });
    }

    fn key_up(&self, key: KeyId, mask: ModifierMask) {
        self.send(WireMessage::KeyUp { key, mask });
    }

    fn key_repeat(&self, key: KeyId, mask: ModifierMask, count: i32) {
        self.send(WireMessage::KeyRepeat { key, mask, count });
    }

    fn mouse_down(&self, button: ButtonId) {
        self.send(WireMessage::MouseDown { button });
    }

    fn mouse_up(&self, button: ButtonId) {
        self.send(WireMessage::MouseUp { button });
    }

    fn mouse_move_rel(&self, dx: i32, dy: i32) {
        self.send(WireMessage::MouseMoveRel { dx, dy });
    }

    fn mouse_wheel(&self, delta: i32) {
        self.send(WireMessage::MouseWheel { delta });
    }

    fn clipboard_grab(&self, id: ClipboardId, seq_num: u32) {
        self.send(WireMessage::ClipboardGrab(ClipboardGrabMessage { id, seq_num }));
    }

    fn clipboard_set(&self, id: ClipboardId, seq_num: u32, data: Vec<u8>) {
        self.send(WireMessage::ClipboardSet(ClipboardSetMessage { id, seq_num, data }));
    }

    fn query_info(&self) {
        self.send(WireMessage::QueryInfo);
    }

    fn close(&self) {
        self.send(WireMessage::Close);
    }
}

/// Link to a secondary screen: frames are queued for the connection worker's
/// writer. A closed channel means the worker is already tearing down and the
/// registry entry is about to disappear, so lost frames are fine.
pub struct RemoteLink {
    tx: mpsc::UnboundedSender<WireMessage>,
}

impl RemoteLink {
    pub fn new(tx: mpsc::UnboundedSender<WireMessage>) -> Self {
        Self { tx }
    }
}

impl ScreenLink for RemoteLink {
    fn send(&self, msg: WireMessage) {
        let _ = self.tx.send(msg);
    }
}

/// Link to the primary screen: protocol operations translate into local
/// driver calls instead of network frames. Input events are not replayed —
/// the primary generated them in the first place.
pub struct PrimaryLink {
    driver: Arc<dyn PrimaryScreen>,
}

impl PrimaryLink {
    pub fn new(driver: Arc<dyn PrimaryScreen>) -> Self {
        Self { driver }
    }
}

impl ScreenLink for PrimaryLink {
    fn send(&self, msg: WireMessage) {
        match msg {
            WireMessage::Enter(m) => self.driver.enter(m.x, m.y),
            WireMessage::Leave => self.driver.leave(),
            WireMessage::ClipboardSet(m) => self.driver.write_clipboard(m.id, &m.data),
            // The primary's own input and clipboard announcements originate
            // locally; everything else has no local counterpart.
            _ => {}
        }
    }
}

//! Headless primary driver.
//!
//! Used when no platform capture backend is compiled in: the server runs,
//! accepts clients, and exercises the full switching machinery, but local
//! input capture and the OS clipboard are stand-ins. Shape comes from the
//! configuration.

use std::sync::Mutex;

use screenhop_core::domain::geometry::ScreenShape;
use screenhop_core::protocol::messages::ClipboardId;
use tracing::debug;

use super::{PrimaryError, PrimaryScreen};

/// A driver with no OS hooks. Tracks cursor and clipboard state in memory.
pub struct HeadlessPrimary {
    shape: ScreenShape,
    cursor: Mutex<(i32, i32)>,
    clipboards: Mutex<[Vec<u8>; ClipboardId::COUNT]>,
}

impl HeadlessPrimary {
    pub fn new(shape: ScreenShape) -> Self {
        Self {
            shape,
            cursor: Mutex::new((shape.w / 2, shape.h / 2)),
            clipboards: Mutex::new(Default::default()),
        }
    }
}

impl PrimaryScreen for HeadlessPrimary {
    fn open(&self) -> Result<(), PrimaryError> {
        debug!("headless primary opened");
        Ok(())
    }

    fn close(&self) {
        debug!("headless primary closed");
    }

    fn shape(&self) -> ScreenShape {
        self.shape
    }

    fn cursor_pos(&self) -> (i32, i32) {
        *self.cursor.lock().expect("lock poisoned")
    }

    fn enter(&self, x: i32, y: i32) {
        debug!(x, y, "primary enter");
        *self.cursor.lock().expect("lock poisoned") = (x, y);
    }

    fn leave(&self) {
        debug!("primary leave");
    }

    fn warp_cursor(&self, x: i32, y: i32) {
        *self.cursor.lock().expect("lock poisoned") = (x, y);
    }

    fn read_clipboard(&self, id: ClipboardId) -> Vec<u8> {
        self.clipboards.lock().expect("lock poisoned")[id.index()].clone()
    }

    fn write_clipboard(&self, id: ClipboardId, data: &[u8]) {
        debug!(id = ?id, len = data.len(), "primary clipboard write");
        self.clipboards.lock().expect("lock poisoned")[id.index()] = data.to_vec();
    }
}

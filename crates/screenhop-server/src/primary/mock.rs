//! Mock primary driver for unit testing.
//!
//! Records every driver call so tests can assert on enter/leave/warp
//! sequences without OS hooks, and can be configured to fail `open()` to
//! exercise the `PrimaryUnavailable` path.

use std::sync::Mutex;

use screenhop_core::domain::geometry::ScreenShape;
use screenhop_core::protocol::messages::ClipboardId;

use super::{PrimaryError, PrimaryScreen};

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryCall {
    Open,
    Close,
    Enter { x: i32, y: i32 },
    Leave,
    Warp { x: i32, y: i32 },
    WriteClipboard { id: ClipboardId, data: Vec<u8> },
}

/// A recording implementation of [`PrimaryScreen`].
pub struct MockPrimary {
    shape: ScreenShape,
    fail_open: bool,
    calls: Mutex<Vec<PrimaryCall>>,
    cursor: Mutex<(i32, i32)>,
    clipboards: Mutex<[Vec<u8>; ClipboardId::COUNT]>,
}

impl MockPrimary {
    /// Creates a mock with the given shape.
    pub fn new(shape: ScreenShape) -> Self {
        Self {
            shape,
            fail_open: false,
            calls: Mutex::new(Vec::new()),
            cursor: Mutex::new((0, 0)),
            clipboards: Mutex::new(Default::default()),
        }
    }

    /// Creates a mock whose `open()` fails, simulating a driver already held
    /// by another instance.
    pub fn unavailable(shape: ScreenShape) -> Self {
        Self { fail_open: true, ..Self::new(shape) }
    }

    /// Pre-loads clipboard contents, as if the user had copied something.
    pub fn preload_clipboard(&self, id: ClipboardId, data: Vec<u8>) {
        self.clipboards.lock().expect("lock poisoned")[id.index()] = data;
    }

    /// Snapshot of all recorded calls.
    pub fn calls(&self) -> Vec<PrimaryCall> {
        self.calls.lock().expect("lock poisoned").clone()
    }

    fn record(&self, call: PrimaryCall) {
        self.calls.lock().expect("lock poisoned").push(call);
    }
}

impl PrimaryScreen for MockPrimary {
    fn open(&self) -> Result<(), PrimaryError> {
        self.record(PrimaryCall::Open);
        if self.fail_open {
            return Err(PrimaryError::Unavailable("held by another instance".to_string()));
        }
        Ok(())
    }

    fn close(&self) {
        self.record(PrimaryCall::Close);
    }

    fn shape(&self) -> ScreenShape {
        self.shape
    }

    fn cursor_pos(&self) -> (i32, i32) {
        *self.cursor.lock().expect("lock poisoned")
    }

    fn enter(&self, x: i32, y: i32) {
        *self.cursor.lock().expect("lock poisoned") = (x, y);
        self.record(PrimaryCall::Enter { x, y });
    }

    fn leave(&self) {
        self.record(PrimaryCall::Leave);
    }

    fn warp_cursor(&self, x: i32, y: i32) {
        *self.cursor.lock().expect("lock poisoned") = (x, y);
        self.record(PrimaryCall::Warp { x, y });
    }

    fn read_clipboard(&self, id: ClipboardId) -> Vec<u8> {
        self.clipboards.lock().expect("lock poisoned")[id.index()].clone()
    }

    fn write_clipboard(&self, id: ClipboardId, data: &[u8]) {
        self.clipboards.lock().expect("lock poisoned")[id.index()] = data.to_vec();
        self.record(PrimaryCall::WriteClipboard { id, data: data.to_vec() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> ScreenShape {
        ScreenShape { x: 0, y: 0, w: 100, h: 100, zone_size: 5 }
    }

    #[test]
    fn test_mock_records_calls_in_order() {
        let mock = MockPrimary::new(shape());
        mock.leave();
        mock.enter(3, 4);
        assert_eq!(
            mock.calls(),
            vec![PrimaryCall::Leave, PrimaryCall::Enter { x: 3, y: 4 }]
        );
    }

    #[test]
    fn test_unavailable_mock_fails_open() {
        let mock = MockPrimary::unavailable(shape());
        assert!(matches!(mock.open(), Err(PrimaryError::Unavailable(_))));
    }

    #[test]
    fn test_enter_moves_cursor() {
        let mock = MockPrimary::new(shape());
        mock.enter(42, 7);
        assert_eq!(mock.cursor_pos(), (42, 7));
    }

    #[test]
    fn test_clipboard_round_trip() {
        let mock = MockPrimary::new(shape());
        mock.write_clipboard(ClipboardId::Selection, b"hello");
        assert_eq!(mock.read_clipboard(ClipboardId::Selection), b"hello");
        assert!(mock.read_clipboard(ClipboardId::Clipboard).is_empty());
    }
}

//! Primary screen driver interface.
//!
//! The driver owns the machine's real keyboard, mouse, and clipboard: it
//! captures input while a secondary screen is active, warps the physical
//! cursor, and reads/writes the OS clipboard. Platform backends live outside
//! this crate; the server only depends on this trait.
//!
//! The driver is a single-writer resource: the server acquires it in
//! `open()` and releases it in `quit()`/`shutdown()`, and a second server
//! instance must fail to open.

use screenhop_core::domain::geometry::ScreenShape;
use screenhop_core::protocol::messages::ClipboardId;
use thiserror::Error;

pub mod headless;
pub mod mock;

/// Error type for primary driver operations.
#[derive(Debug, Error)]
pub enum PrimaryError {
    /// The driver could not be acquired (typically: another instance holds it).
    #[error("primary screen unavailable: {0}")]
    Unavailable(String),
}

/// Driver for the screen attached to this machine.
///
/// All operations are synchronous and cheap; implementations defer real work
/// to their own threads. Calls may arrive while the server mutex is held.
pub trait PrimaryScreen: Send + Sync {
    /// Acquires the input hooks and clipboard watcher.
    ///
    /// # Errors
    ///
    /// Returns [`PrimaryError::Unavailable`] if the driver is held elsewhere.
    fn open(&self) -> Result<(), PrimaryError>;

    /// Releases everything acquired by [`open`](PrimaryScreen::open).
    /// Idempotent.
    fn close(&self);

    /// Shape of the primary screen, including its jump-zone thickness.
    fn shape(&self) -> ScreenShape;

    /// Current physical cursor position in primary-local coordinates.
    fn cursor_pos(&self) -> (i32, i32);

    /// The cursor returns to the primary: warp it to `(x, y)` and stop
    /// suppressing local input.
    fn enter(&self, x: i32, y: i32);

    /// The cursor leaves the primary: start capturing and suppressing local
    /// input so it can be forwarded.
    fn leave(&self);

    /// Warps the physical cursor without changing capture state.
    fn warp_cursor(&self, x: i32, y: i32);

    /// Reads the current OS clipboard contents, serialized.
    fn read_clipboard(&self, id: ClipboardId) -> Vec<u8>;

    /// Replaces the OS clipboard contents.
    fn write_clipboard(&self, id: ClipboardId, data: &[u8]);
}

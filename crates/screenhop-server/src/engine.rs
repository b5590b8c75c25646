//! The switch engine and event router.
//!
//! One coarse mutex guards everything the concurrent actors share: the
//! registry, the active-screen pointer, the cursor, the clipboards, and the
//! edge map. Primary input handlers, connection workers, and the control
//! surface all dispatch through [`Engine`], so event order on any screen's
//! link equals call order — a switch is itself just another dispatch under
//! the same lock, which is what makes the switching invariant cheap: no event
//! can ever observe the active pointer and cursor mid-update.
//!
//! Event flow:
//!
//! ```text
//! primary driver (hooks)                 network (per-client workers)
//!   └─ on_key_*, on_mouse_*               └─ handle_info / grab_clipboard /
//!        └─ Engine ── lock ──┐                 set_clipboard / remove_screen
//!                            ├─ registry / clipboards / edge map
//!                            └─ active screen's ScreenLink
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use screenhop_core::domain::geometry::ScreenShape;
use screenhop_core::domain::topology::{
    jump_direction, leave_direction, project, EdgeMap, ShapeSource,
};
use screenhop_core::protocol::messages::{
    ButtonId, ClipboardId, InfoMessage, KeyId, ModifierMask,
};
use screenhop_core::protocol::sequence::SequenceCounter;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::clipboard::ClipboardManager;
use crate::link::ScreenLink;
use crate::registry::{RegistryError, ScreenRegistry};

/// How many recent switch/connection events the status surface remembers.
const RECENT_EVENTS: usize = 32;

/// Modifier bits that participate in command-key matching; lock-state bits
/// (caps/num/scroll) are ignored so a latched Num Lock does not break
/// hotkeys.
const COMMAND_MODS: u32 = ModifierMask::SHIFT
    | ModifierMask::CONTROL
    | ModifierMask::ALT
    | ModifierMask::META
    | ModifierMask::SUPER;

/// Error raised for a protocol-violating `Info` report.
#[derive(Debug, Error, PartialEq)]
pub enum ScreenInfoError {
    /// A screen reported zero or negative extent; the client is disconnected.
    #[error("screen {name:?} reported a degenerate shape {w}x{h}")]
    DegenerateShape { name: String, w: i32, h: i32 },
}

/// Action bound to a command key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    /// Jump the cursor to the named screen, entering at its center.
    SwitchTo(String),
    /// Toggle the cursor lock, pinning input to the current screen.
    LockCursorToggle,
}

/// A user-configured hotkey intercepted before forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandKey {
    pub key: KeyId,
    pub mask: ModifierMask,
    pub action: CommandAction,
}

/// Per-screen entry in a [`StatusSnapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct ScreenStatus {
    pub name: String,
    pub ready: bool,
    pub active: bool,
    pub shape: Option<ScreenShape>,
}

/// Read-only state snapshot served by the HTTP status surface.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub active: String,
    pub screens: Vec<ScreenStatus>,
    pub recent: Vec<String>,
}

// ── Engine state ──────────────────────────────────────────────────────────────

struct EngineState {
    registry: ScreenRegistry,
    clipboards: ClipboardManager,
    edges: EdgeMap,
    command_keys: Vec<CommandKey>,
    /// Name of the screen currently receiving input. Always a registered,
    /// ready screen; falls back to the primary whenever its screen goes away.
    active: String,
    /// Cursor position in the active screen's local coordinate space.
    cursor: (i32, i32),
    /// Last cursor position seen on the primary; re-entry point when the
    /// active screen disappears.
    last_primary_pos: (i32, i32),
    /// Modifier view maintained from primary key events.
    mask: ModifierMask,
    /// Bitmask of currently held mouse buttons. Switching is suppressed
    /// mid-drag so a button release cannot land on a different screen than
    /// its press.
    buttons_down: u32,
    /// Cursor lock toggled by command key.
    cursor_locked: bool,
    /// Whether a latched Scroll Lock pins the cursor (config policy).
    scroll_lock_locks: bool,
    recent: VecDeque<String>,
}

impl EngineState {
    fn is_locked_to_screen(&self) -> bool {
        self.cursor_locked
            || (self.scroll_lock_locks && self.mask.scroll_lock())
            || self.buttons_down != 0
    }

    fn note(&mut self, event: String) {
        if self.recent.len() == RECENT_EVENTS {
            self.recent.pop_front();
        }
        self.recent.push_back(event);
    }

    /// Switches the active screen. Leave, pointer+cursor update, enter, and
    /// clipboard catch-up all happen inside the caller's critical section.
    fn switch_to(&mut self, seq: &SequenceCounter, to: &str, x: i32, y: i32) {
        let seq_num = seq.next();
        let mask = self.mask;

        if let Some(old) = self.registry.lookup(&self.active) {
            old.link.leave();
        }

        self.active = to.to_string();
        self.cursor = (x, y);

        if let Some(new) = self.registry.lookup(to) {
            new.link.enter(x, y, seq_num, mask);
        }

        let EngineState { clipboards, registry, .. } = self;
        clipboards.on_screen_activated(to, registry);

        self.note(format!("enter {to} ({x},{y}) seq={seq_num}"));
        info!(to, x, y, seq_num, "active screen switched");
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Shared handle onto the server's coordination state.
///
/// Cloning is cheap; all clones address the same state.
#[derive(Clone)]
pub struct Engine {
    state: Arc<Mutex<EngineState>>,
    seq: Arc<SequenceCounter>,
    primary_name: String,
}

impl Engine {
    /// Creates the engine with the primary record seeded in the registry and
    /// active. The cursor starts at the primary's current position.
    pub fn new(
        primary_name: &str,
        primary_shape: ScreenShape,
        primary_cursor: (i32, i32),
        primary_link: Arc<dyn ScreenLink>,
        edges: EdgeMap,
    ) -> Self {
        let state = EngineState {
            registry: ScreenRegistry::new(primary_name, primary_shape, primary_link),
            clipboards: ClipboardManager::new(primary_name),
            edges,
            command_keys: Vec::new(),
            active: primary_name.to_string(),
            cursor: primary_cursor,
            last_primary_pos: primary_cursor,
            mask: ModifierMask::default(),
            buttons_down: 0,
            cursor_locked: false,
            scroll_lock_locks: true,
            recent: VecDeque::new(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            seq: Arc::new(SequenceCounter::new()),
            primary_name: primary_name.to_string(),
        }
    }

    pub fn primary_name(&self) -> &str {
        &self.primary_name
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().expect("server mutex poisoned")
    }

    // ── Registry lifecycle ────────────────────────────────────────────────────

    /// Registers a screen after a successful handshake.
    pub fn add_screen(&self, name: &str, link: Arc<dyn ScreenLink>) -> Result<(), RegistryError> {
        let mut s = self.lock();
        s.registry.add(name, link)?;
        s.note(format!("connected {name}"));
        info!(name, "screen connected");
        Ok(())
    }

    /// Removes a screen when its worker exits. If it was active, the active
    /// pointer reverts to the primary *before* the record disappears, with a
    /// synthetic local enter at the last known primary position.
    pub fn remove_screen(&self, name: &str) {
        let mut s = self.lock();
        if name == self.primary_name || !s.registry.contains(name) {
            return;
        }
        if s.active == name {
            let (px, py) = s.last_primary_pos;
            let primary = self.primary_name.clone();
            s.switch_to(&self.seq, &primary, px, py);
        }
        s.registry.remove(name);
        s.note(format!("disconnected {name}"));
        info!(name, "screen removed");
    }

    /// Applies an `Info` report from a screen (or the primary driver).
    ///
    /// # Errors
    ///
    /// Returns [`ScreenInfoError::DegenerateShape`] for zero-area reports;
    /// the connection worker disconnects that client.
    pub fn handle_info(&self, name: &str, info: InfoMessage) -> Result<(), ScreenInfoError> {
        let shape = ScreenShape {
            x: info.x,
            y: info.y,
            w: info.w,
            h: info.h,
            zone_size: info.zone_size.max(0),
        };
        if !shape.is_valid() {
            return Err(ScreenInfoError::DegenerateShape {
                name: name.to_string(),
                w: info.w,
                h: info.h,
            });
        }

        let mut s = self.lock();
        s.registry.set_shape(name, shape);
        if name == self.primary_name {
            s.last_primary_pos = (info.mx, info.my);
        }
        if s.active == name {
            let (cx, cy) = shape.clamp_local(s.cursor.0, s.cursor.1);
            s.cursor = (cx, cy);
        }
        debug!(name, ?shape, "screen info updated");
        Ok(())
    }

    // ── Primary event handlers ────────────────────────────────────────────────

    /// Absolute mouse motion on the primary. Returns `true` iff the motion
    /// entered a jump zone and the cursor jumped to a neighbor.
    pub fn on_mouse_move_primary(&self, x: i32, y: i32) -> bool {
        let mut s = self.lock();
        if s.active != self.primary_name {
            return false;
        }
        s.last_primary_pos = (x, y);

        let Some(shape) = ShapeSource::shape(&s.registry, &self.primary_name) else {
            return false;
        };

        if s.is_locked_to_screen() {
            s.cursor = shape.clamp_local(x, y);
            return false;
        }

        let Some(dir) = jump_direction(&shape, x, y) else {
            s.cursor = (x, y);
            return false;
        };

        // Projection only sees ready screens; an unready or unknown neighbor
        // yields None and the cursor stays clamped to the primary.
        match project(&s.registry, &s.edges, &self.primary_name, dir, x, y) {
            Some(p) => {
                s.switch_to(&self.seq, &p.to, p.x, p.y);
                true
            }
            None => {
                s.cursor = shape.clamp_local(x, y);
                false
            }
        }
    }

    /// Relative mouse motion while a secondary screen is active.
    pub fn on_mouse_move_secondary(&self, dx: i32, dy: i32) {
        let mut s = self.lock();
        if s.active == self.primary_name {
            return;
        }
        let active = s.active.clone();
        let Some(shape) = ShapeSource::shape(&s.registry, &active) else {
            return;
        };

        let (nx, ny) = (s.cursor.0 + dx, s.cursor.1 + dy);

        if shape.contains_local(nx, ny) {
            s.cursor = (nx, ny);
            if let Some(record) = s.registry.lookup(&active) {
                record.link.mouse_move_rel(dx, dy);
            }
            return;
        }

        // The delta leaves the active rectangle: either a crossing or a clamp.
        if !s.is_locked_to_screen() {
            if let Some(dir) = leave_direction(&shape, nx, ny) {
                if let Some(p) = project(&s.registry, &s.edges, &active, dir, nx, ny) {
                    s.switch_to(&self.seq, &p.to, p.x, p.y);
                    return;
                }
            }
        }

        let (cx, cy) = shape.clamp_local(nx, ny);
        let (rdx, rdy) = (cx - s.cursor.0, cy - s.cursor.1);
        s.cursor = (cx, cy);
        if (rdx, rdy) != (0, 0) {
            if let Some(record) = s.registry.lookup(&active) {
                record.link.mouse_move_rel(rdx, rdy);
            }
        }
    }

    pub fn on_key_down(&self, key: KeyId, mask: ModifierMask) {
        let mut s = self.lock();
        s.mask = mask;
        if self.run_command_key(&mut s, key, mask) {
            return;
        }
        if let Some(record) = s.registry.lookup(&s.active) {
            record.link.key_down(key, mask);
        }
    }

    pub fn on_key_up(&self, key: KeyId, mask: ModifierMask) {
        let mut s = self.lock();
        s.mask = mask;
        if let Some(record) = s.registry.lookup(&s.active) {
            record.link.key_up(key, mask);
        }
    }

    pub fn on_key_repeat(&self, key: KeyId, mask: ModifierMask, count: i32) {
        let s = self.lock();
        if let Some(record) = s.registry.lookup(&s.active) {
            record.link.key_repeat(key, mask, count);
        }
    }

    pub fn on_mouse_down(&self, button: ButtonId) {
        let mut s = self.lock();
        s.buttons_down |= button_bit(button);
        if let Some(record) = s.registry.lookup(&s.active) {
            record.link.mouse_down(button);
        }
    }

    pub fn on_mouse_up(&self, button: ButtonId) {
        let mut s = self.lock();
        s.buttons_down &= !button_bit(button);
        if let Some(record) = s.registry.lookup(&s.active) {
            record.link.mouse_up(button);
        }
    }

    pub fn on_mouse_wheel(&self, delta: i32) {
        let s = self.lock();
        if let Some(record) = s.registry.lookup(&s.active) {
            record.link.mouse_wheel(delta);
        }
    }

    /// Runs the command-key hook. Returns `true` if the event was consumed
    /// and must not be forwarded.
    fn run_command_key(&self, s: &mut EngineState, key: KeyId, mask: ModifierMask) -> bool {
        let action = s
            .command_keys
            .iter()
            .find(|ck| ck.key == key && ck.mask.0 & COMMAND_MODS == mask.0 & COMMAND_MODS)
            .map(|ck| ck.action.clone());

        match action {
            Some(CommandAction::SwitchTo(target)) => {
                if target != s.active && !s.is_locked_to_screen() {
                    if let Some(shape) = ShapeSource::shape(&s.registry, &target) {
                        s.switch_to(&self.seq, &target, shape.w / 2, shape.h / 2);
                    }
                }
                true
            }
            Some(CommandAction::LockCursorToggle) => {
                s.cursor_locked = !s.cursor_locked;
                info!(locked = s.cursor_locked, "cursor lock toggled");
                true
            }
            None => false,
        }
    }

    // ── Clipboard ─────────────────────────────────────────────────────────────

    /// A screen reports it grabbed a clipboard (from its connection worker).
    pub fn grab_clipboard(&self, name: &str, id: ClipboardId, seq_num: u32) {
        let mut s = self.lock();
        let EngineState { clipboards, registry, .. } = &mut *s;
        clipboards.grab(id, seq_num, name, registry);
    }

    /// A screen delivers clipboard contents.
    pub fn set_clipboard(&self, name: &str, id: ClipboardId, seq_num: u32, data: Vec<u8>) {
        let mut s = self.lock();
        let EngineState { clipboards, registry, active, .. } = &mut *s;
        clipboards.set_data(id, seq_num, name, data, registry, active);
    }

    /// The primary driver reclaimed the OS clipboard. Advances the sequence
    /// counter so the primary's ownership supersedes any in-flight client
    /// grab.
    pub fn update_primary_clipboard(&self, id: ClipboardId, data: Vec<u8>) {
        let mut s = self.lock();
        let seq_num = self.seq.next();
        let EngineState { clipboards, registry, active, .. } = &mut *s;
        clipboards.update_from_primary(id, seq_num, data, registry, active);
    }

    // ── Configuration / introspection ─────────────────────────────────────────

    /// Atomically installs a new topology. Screens absent from `known` are
    /// told to close; if the active screen is among them the cursor reverts
    /// to the primary first.
    pub fn apply_topology(
        &self,
        edges: EdgeMap,
        command_keys: Vec<CommandKey>,
        scroll_lock_locks: bool,
        known: &[String],
    ) {
        let mut s = self.lock();
        s.edges = edges;
        s.command_keys = command_keys;
        s.scroll_lock_locks = scroll_lock_locks;

        if s.active != self.primary_name && !known.contains(&s.active) {
            let (px, py) = s.last_primary_pos;
            let primary = self.primary_name.clone();
            s.switch_to(&self.seq, &primary, px, py);
        }

        let dropped: Vec<String> = s
            .registry
            .iter()
            .filter(|r| r.name != self.primary_name && !known.contains(&r.name))
            .map(|r| r.name.clone())
            .collect();
        for name in dropped {
            if let Some(record) = s.registry.lookup(&name) {
                record.link.close();
            }
            s.note(format!("closing {name}: no longer configured"));
        }
    }

    /// Returns `true` while switching away from the active screen is
    /// suppressed.
    pub fn is_locked_to_screen(&self) -> bool {
        self.lock().is_locked_to_screen()
    }

    pub fn active_screen(&self) -> String {
        self.lock().active.clone()
    }

    pub fn cursor(&self) -> (i32, i32) {
        self.lock().cursor
    }

    /// Bitmask of the primary's sides that have configured neighbors.
    pub fn active_primary_sides(&self) -> u32 {
        self.lock().edges.active_sides(&self.primary_name)
    }

    /// Sends `Close` to every secondary (graceful shutdown).
    pub fn broadcast_close(&self) {
        let s = self.lock();
        for record in s.registry.iter() {
            if record.name != self.primary_name {
                record.link.close();
            }
        }
    }

    /// Snapshot for the HTTP status surface.
    pub fn status_snapshot(&self) -> StatusSnapshot {
        let s = self.lock();
        StatusSnapshot {
            active: s.active.clone(),
            screens: s
                .registry
                .iter()
                .map(|r| ScreenStatus {
                    name: r.name.clone(),
                    ready: r.ready,
                    active: r.name == s.active,
                    shape: r.shape,
                })
                .collect(),
            recent: s.recent.iter().cloned().collect(),
        }
    }

    #[cfg(test)]
    fn clipboard_owner(&self, id: ClipboardId) -> String {
        self.lock().clipboards.entry(id).owner.clone()
    }
}

fn button_bit(button: ButtonId) -> u32 {
    1u32 << (u32::from(button.0) & 31)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

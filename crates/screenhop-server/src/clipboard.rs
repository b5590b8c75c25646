//! Clipboard ownership and fan-out.
//!
//! Every mirrored clipboard has exactly one owning screen at a time. A
//! screen that takes the OS clipboard on its machine reports a grab stamped
//! with the sequence number from its latest `Enter`; the server accepts the
//! grab only if that sequence is strictly newer than the current owner's.
//! Contents arrive separately (`set_data`) and are pushed lazily: a screen
//! receives them when it becomes active and does not already hold them,
//! tracked by the per-record `got_clipboard` flags.
//!
//! All methods run under the server mutex; the registry is passed in so flag
//! sweeps and fan-out stay in the same critical section as the ownership
//! change.

use screenhop_core::protocol::messages::ClipboardId;
use tracing::debug;

use crate::registry::ScreenRegistry;

/// State of one mirrored clipboard.
#[derive(Debug, Clone)]
pub struct ClipboardEntry {
    /// Serialized contents; meaningful only when `ready`.
    pub data: Vec<u8>,
    /// Name of the owning screen.
    pub owner: String,
    /// Sequence number under which ownership was taken.
    pub seq_num: u32,
    /// `true` once contents are known, `false` between a grab announcement
    /// and the matching `set_data`.
    pub ready: bool,
}

/// Ownership, sequencing, and fan-out for all mirrored clipboards.
pub struct ClipboardManager {
    entries: [ClipboardEntry; ClipboardId::COUNT],
}

impl ClipboardManager {
    /// Creates the manager with every clipboard owned by the primary at
    /// sequence 0 and no known contents.
    pub fn new(primary_name: &str) -> Self {
        let entry = ClipboardEntry {
            data: Vec::new(),
            owner: primary_name.to_string(),
            seq_num: 0,
            ready: false,
        };
        Self {
            entries: std::array::from_fn(|_| entry.clone()),
        }
    }

    pub fn entry(&self, id: ClipboardId) -> &ClipboardEntry {
        &self.entries[id.index()]
    }

    /// A screen announces it owns clipboard `id` as of `seq_num`.
    ///
    /// Accepted only when `seq_num` is strictly greater than the recorded
    /// one; two racing grabs with equal sequence resolve to whichever the
    /// lock admitted first, and the loser is dropped silently. On success
    /// every other screen's `got_clipboard` flag is cleared — their cached
    /// contents are now stale.
    ///
    /// Returns `true` if ownership changed.
    pub fn grab(
        &mut self,
        id: ClipboardId,
        seq_num: u32,
        owner: &str,
        registry: &mut ScreenRegistry,
    ) -> bool {
        let entry = &mut self.entries[id.index()];
        if seq_num <= entry.seq_num {
            debug!(
                id = ?id,
                seq_num,
                current = entry.seq_num,
                "stale clipboard grab dropped"
            );
            return false;
        }

        entry.owner = owner.to_string();
        entry.seq_num = seq_num;
        entry.ready = false;

        for record in registry.iter_mut() {
            record.got_clipboard[id.index()] = record.name == owner;
        }

        debug!(id = ?id, owner, seq_num, "clipboard grabbed");
        true
    }

    /// The owner delivers the contents announced by an earlier grab.
    ///
    /// Dropped unless the sequence still matches the entry and `sender` is
    /// still the recorded owner — a newer grab in between makes this data
    /// stale. On success the contents are pushed to the active screen if it
    /// does not yet hold them.
    pub fn set_data(
        &mut self,
        id: ClipboardId,
        seq_num: u32,
        sender: &str,
        data: Vec<u8>,
        registry: &mut ScreenRegistry,
        active: &str,
    ) {
        let entry = &mut self.entries[id.index()];
        if seq_num != entry.seq_num || sender != entry.owner {
            debug!(
                id = ?id,
                seq_num,
                current = entry.seq_num,
                sender,
                "stale clipboard data dropped"
            );
            return;
        }

        entry.data = data;
        entry.ready = true;
        self.send_if_missing(id, registry, active);
    }

    /// The primary driver reclaimed the OS clipboard: take ownership and
    /// install the contents in one step.
    ///
    /// `seq_num` must come freshly advanced from the server's sequence
    /// counter, which is what lets the primary supersede a client grab whose
    /// contents are still in flight.
    pub fn update_from_primary(
        &mut self,
        id: ClipboardId,
        seq_num: u32,
        data: Vec<u8>,
        registry: &mut ScreenRegistry,
        active: &str,
    ) {
        let primary = registry.primary_name().to_string();
        let entry = &mut self.entries[id.index()];
        entry.owner = primary.clone();
        entry.seq_num = seq_num;
        entry.data = data;
        entry.ready = true;

        for record in registry.iter_mut() {
            record.got_clipboard[id.index()] = record.name == primary;
        }

        debug!(id = ?id, seq_num, "primary reclaimed clipboard");
        self.send_if_missing(id, registry, active);
    }

    /// A screen just became active: deliver every clipboard it lacks.
    pub fn on_screen_activated(&self, name: &str, registry: &mut ScreenRegistry) {
        for id in ClipboardId::ALL {
            self.send_if_missing(id, registry, name);
        }
    }

    fn send_if_missing(&self, id: ClipboardId, registry: &mut ScreenRegistry, name: &str) {
        let entry = &self.entries[id.index()];
        if !entry.ready {
            return;
        }
        if let Some(record) = registry.lookup_mut(name) {
            if !record.got_clipboard[id.index()] {
                record
                    .link
                    .clipboard_set(id, entry.seq_num, entry.data.clone());
                record.got_clipboard[id.index()] = true;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use screenhop_core::domain::geometry::ScreenShape;
    use screenhop_core::protocol::messages::WireMessage;

    use crate::link::ScreenLink;

    #[derive(Default)]
    struct RecordingLink {
        sent: Mutex<Vec<WireMessage>>,
    }

    impl ScreenLink for RecordingLink {
        fn send(&self, msg: WireMessage) {
            self.sent.lock().unwrap().push(msg);
        }
    }

    impl RecordingLink {
        fn sent(&self) -> Vec<WireMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    fn shape() -> ScreenShape {
        ScreenShape { x: 0, y: 0, w: 100, h: 100, zone_size: 5 }
    }

    struct Fixture {
        registry: ScreenRegistry,
        clipboards: ClipboardManager,
        right: Arc<RecordingLink>,
    }

    /// Registry with a primary and one ready secondary named "right".
    fn make_fixture() -> Fixture {
        let primary_link = Arc::new(RecordingLink::default());
        let mut registry = ScreenRegistry::new("primary", shape(), primary_link);
        let right = Arc::new(RecordingLink::default());
        registry.add("right", Arc::clone(&right) as Arc<dyn ScreenLink>).unwrap();
        registry.set_shape("right", shape());
        Fixture {
            clipboards: ClipboardManager::new("primary"),
            registry,
            right,
        }
    }

    const ID: ClipboardId = ClipboardId::Clipboard;

    #[test]
    fn test_grab_with_newer_sequence_takes_ownership() {
        let mut f = make_fixture();
        assert!(f.clipboards.grab(ID, 5, "right", &mut f.registry));
        let entry = f.clipboards.entry(ID);
        assert_eq!(entry.owner, "right");
        assert_eq!(entry.seq_num, 5);
        assert!(!entry.ready);
    }

    #[test]
    fn test_racing_grab_with_equal_sequence_is_dropped() {
        // Two clients race a grab at sequence 5; the lock serializes them and
        // the second is not strictly newer.
        let mut f = make_fixture();
        f.registry.add("other", Arc::new(RecordingLink::default())).unwrap();

        assert!(f.clipboards.grab(ID, 5, "right", &mut f.registry));
        assert!(!f.clipboards.grab(ID, 5, "other", &mut f.registry));
        assert_eq!(f.clipboards.entry(ID).owner, "right");
    }

    #[test]
    fn test_grab_clears_got_flags_except_new_owner() {
        let mut f = make_fixture();
        f.registry.lookup_mut("primary").unwrap().got_clipboard[ID.index()] = true;

        f.clipboards.grab(ID, 1, "right", &mut f.registry);

        assert!(!f.registry.lookup("primary").unwrap().got_clipboard[ID.index()]);
        assert!(f.registry.lookup("right").unwrap().got_clipboard[ID.index()]);
    }

    #[test]
    fn test_set_data_installs_and_pushes_to_active() {
        let mut f = make_fixture();
        f.clipboards.grab(ID, 3, "right", &mut f.registry);

        // Primary is active and does not hold the contents yet.
        f.clipboards
            .set_data(ID, 3, "right", b"hello".to_vec(), &mut f.registry, "primary");

        let entry = f.clipboards.entry(ID);
        assert!(entry.ready);
        assert_eq!(entry.data, b"hello");
        assert!(f.registry.lookup("primary").unwrap().got_clipboard[ID.index()]);
    }

    #[test]
    fn test_set_data_with_stale_sequence_is_dropped() {
        // Owner grabs at 10, primary reclaims at 11, then the owner's data
        // for 10 arrives late.
        let mut f = make_fixture();
        f.clipboards.grab(ID, 10, "right", &mut f.registry);
        f.clipboards
            .update_from_primary(ID, 11, b"fresh".to_vec(), &mut f.registry, "primary");

        f.clipboards
            .set_data(ID, 10, "right", b"hello".to_vec(), &mut f.registry, "primary");

        let entry = f.clipboards.entry(ID);
        assert_eq!(entry.owner, "primary");
        assert_eq!(entry.data, b"fresh");
    }

    #[test]
    fn test_set_data_from_non_owner_is_dropped() {
        let mut f = make_fixture();
        f.clipboards.grab(ID, 4, "right", &mut f.registry);
        f.clipboards
            .set_data(ID, 4, "primary", b"forged".to_vec(), &mut f.registry, "primary");
        assert!(!f.clipboards.entry(ID).ready);
    }

    #[test]
    fn test_on_screen_activated_sends_only_missing_clipboards() {
        let mut f = make_fixture();
        f.clipboards
            .update_from_primary(ID, 1, b"abc".to_vec(), &mut f.registry, "primary");
        // Selection clipboard has no contents yet; only ID should be sent.

        f.clipboards.on_screen_activated("right", &mut f.registry);

        let sent = f.right.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            WireMessage::ClipboardSet(m) => {
                assert_eq!(m.id, ID);
                assert_eq!(m.data, b"abc");
            }
            other => panic!("expected ClipboardSet, got {other:?}"),
        }
        assert!(f.registry.lookup("right").unwrap().got_clipboard[ID.index()]);
    }

    #[test]
    fn test_on_screen_activated_skips_screen_that_already_has_contents() {
        let mut f = make_fixture();
        f.clipboards
            .update_from_primary(ID, 1, b"abc".to_vec(), &mut f.registry, "primary");
        f.clipboards.on_screen_activated("right", &mut f.registry);
        let first = f.right.sent().len();

        f.clipboards.on_screen_activated("right", &mut f.registry);
        assert_eq!(f.right.sent().len(), first, "no resend once flag is set");
    }

    #[test]
    fn test_update_from_primary_supersedes_pending_client_grab() {
        let mut f = make_fixture();
        f.clipboards.grab(ID, 7, "right", &mut f.registry);
        f.clipboards
            .update_from_primary(ID, 8, b"mine".to_vec(), &mut f.registry, "primary");

        let entry = f.clipboards.entry(ID);
        assert_eq!(entry.owner, "primary");
        assert_eq!(entry.seq_num, 8);
        assert!(entry.ready);
        assert!(!f.registry.lookup("right").unwrap().got_clipboard[ID.index()]);
    }
}

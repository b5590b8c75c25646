//! Screen registry: name → live connection record.
//!
//! The registry is part of the single-lock server state; none of these
//! methods synchronize on their own. A record exists from the moment a
//! client's handshake succeeds (or, for the primary, from server open) until
//! its connection worker exits.

use std::collections::BTreeMap;
use std::sync::Arc;

use screenhop_core::domain::geometry::ScreenShape;
use screenhop_core::domain::topology::ShapeSource;
use screenhop_core::protocol::messages::ClipboardId;
use thiserror::Error;

use crate::link::ScreenLink;

/// Error type for registry operations.
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    /// A connection claimed a name that is already registered.
    #[error("screen name already in use: {0}")]
    NameInUse(String),
}

/// Live record for one screen.
pub struct ScreenRecord {
    pub name: String,
    /// Shape in the shared virtual coordinate space. `None` until the first
    /// `Info` report arrives.
    pub shape: Option<ScreenShape>,
    /// A screen is visible to the router only once ready (shape known).
    pub ready: bool,
    /// Whether this screen already holds the current contents of each
    /// clipboard.
    pub got_clipboard: [bool; ClipboardId::COUNT],
    /// Send half of the connection (or the primary driver adapter).
    pub link: Arc<dyn ScreenLink>,
}

impl ScreenRecord {
    fn new(name: &str, link: Arc<dyn ScreenLink>) -> Self {
        Self {
            name: name.to_string(),
            shape: None,
            ready: false,
            got_clipboard: [false; ClipboardId::COUNT],
            link,
        }
    }
}

/// Mapping from screen name to its live record. The primary record is always
/// present while the server runs.
pub struct ScreenRegistry {
    primary_name: String,
    screens: BTreeMap<String, ScreenRecord>,
}

impl ScreenRegistry {
    /// Creates a registry seeded with the primary record. The primary is
    /// ready from the start; its shape comes from the local driver.
    pub fn new(primary_name: &str, shape: ScreenShape, link: Arc<dyn ScreenLink>) -> Self {
        let mut record = ScreenRecord::new(primary_name, link);
        record.shape = Some(shape);
        record.ready = true;
        let mut screens = BTreeMap::new();
        screens.insert(primary_name.to_string(), record);
        Self {
            primary_name: primary_name.to_string(),
            screens,
        }
    }

    pub fn primary_name(&self) -> &str {
        &self.primary_name
    }

    /// Registers a newly connected screen.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NameInUse`] if the name is taken — including
    /// by the primary. The second of two clients claiming one name loses.
    pub fn add(&mut self, name: &str, link: Arc<dyn ScreenLink>) -> Result<(), RegistryError> {
        if self.screens.contains_key(name) {
            return Err(RegistryError::NameInUse(name.to_string()));
        }
        self.screens.insert(name.to_string(), ScreenRecord::new(name, link));
        Ok(())
    }

    /// Removes a screen. Idempotent; the primary cannot be removed.
    pub fn remove(&mut self, name: &str) {
        if name == self.primary_name {
            return;
        }
        self.screens.remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.screens.contains_key(name)
    }

    pub fn lookup(&self, name: &str) -> Option<&ScreenRecord> {
        self.screens.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut ScreenRecord> {
        self.screens.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScreenRecord> {
        self.screens.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ScreenRecord> {
        self.screens.values_mut()
    }

    /// Applies an `Info` report. Marks the screen ready.
    ///
    /// The shape must be valid; callers reject degenerate reports at the
    /// protocol layer before getting here.
    pub fn set_shape(&mut self, name: &str, shape: ScreenShape) {
        debug_assert!(shape.is_valid());
        if let Some(record) = self.screens.get_mut(name) {
            record.shape = Some(shape);
            record.ready = true;
        }
    }

    /// Returns `true` if the named screen is ready to receive input.
    pub fn is_ready(&self, name: &str) -> bool {
        self.screens.get(name).is_some_and(|r| r.ready)
    }
}

// Projection only ever sees ready screens: a neighbor that has not reported
// its shape yet does not exist as far as routing is concerned.
impl ShapeSource for ScreenRegistry {
    fn shape(&self, name: &str) -> Option<ScreenShape> {
        self.screens
            .get(name)
            .filter(|r| r.ready)
            .and_then(|r| r.shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screenhop_core::protocol::messages::WireMessage;

    struct NullLink;

    impl ScreenLink for NullLink {
        fn send(&self, _msg: WireMessage) {}
    }

    fn shape() -> ScreenShape {
        ScreenShape { x: 0, y: 0, w: 1920, h: 1080, zone_size: 1 }
    }

    fn make_registry() -> ScreenRegistry {
        ScreenRegistry::new("primary", shape(), Arc::new(NullLink))
    }

    #[test]
    fn test_new_registry_contains_ready_primary() {
        let registry = make_registry();
        assert!(registry.contains("primary"));
        assert!(registry.is_ready("primary"));
        assert_eq!(registry.iter().count(), 1);
    }

    #[test]
    fn test_add_rejects_duplicate_name() {
        let mut registry = make_registry();
        registry.add("laptop", Arc::new(NullLink)).unwrap();
        assert_eq!(
            registry.add("laptop", Arc::new(NullLink)),
            Err(RegistryError::NameInUse("laptop".to_string()))
        );
    }

    #[test]
    fn test_add_rejects_primary_name() {
        let mut registry = make_registry();
        assert_eq!(
            registry.add("primary", Arc::new(NullLink)),
            Err(RegistryError::NameInUse("primary".to_string()))
        );
    }

    #[test]
    fn test_new_screen_is_not_ready_until_info() {
        let mut registry = make_registry();
        registry.add("laptop", Arc::new(NullLink)).unwrap();
        assert!(!registry.is_ready("laptop"));
        assert_eq!(ShapeSource::shape(&registry, "laptop"), None);

        registry.set_shape("laptop", shape());
        assert!(registry.is_ready("laptop"));
        assert!(ShapeSource::shape(&registry, "laptop").is_some());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = make_registry();
        registry.add("laptop", Arc::new(NullLink)).unwrap();
        registry.remove("laptop");
        registry.remove("laptop");
        assert!(!registry.contains("laptop"));
    }

    #[test]
    fn test_remove_never_evicts_primary() {
        let mut registry = make_registry();
        registry.remove("primary");
        assert!(registry.contains("primary"));
    }
}

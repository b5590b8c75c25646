//! TOML server configuration.
//!
//! The configuration names the primary screen, the listen addresses, every
//! screen allowed to connect (with aliases), the edge links forming the
//! topology, the clipboards to mirror, and the command-key bindings. Fields
//! carry `#[serde(default)]` so a partial file — or none at all — yields a
//! working server.
//!
//! The parsed struct is kept verbatim in server state: `get_config` returns
//! exactly what `set_config` accepted, so a get/set round-trip never mutates
//! anything.

use std::path::{Path, PathBuf};

use screenhop_core::domain::topology::{validate, Direction, EdgeMap, TopologyError};
use screenhop_core::protocol::messages::{ClipboardId, KeyId, ModifierMask};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::engine::{CommandAction, CommandKey};

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The configuration is structurally invalid. The state it would have
    /// replaced is untouched.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Name of the primary screen (this machine).
    #[serde(default = "default_name")]
    pub name: String,
    /// TCP listen address for client connections.
    #[serde(default = "default_address")]
    pub address: String,
    /// How long `run` keeps retrying a failing bind, in seconds.
    #[serde(default = "default_bind_timeout")]
    pub bind_timeout_secs: u64,
    /// Whether a latched Scroll Lock pins the cursor to the current screen.
    #[serde(default = "default_true")]
    pub scroll_lock_locks_cursor: bool,
    /// Which clipboards to mirror between screens.
    #[serde(default = "default_clipboards")]
    pub clipboards: Vec<ClipboardId>,
    #[serde(default)]
    pub primary: PrimaryConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// Screens allowed to connect, beyond the primary.
    #[serde(default)]
    pub screens: Vec<ScreenEntry>,
    /// Directed edge links forming the topology.
    #[serde(default)]
    pub links: Vec<LinkEntry>,
    /// Hotkeys intercepted by the command-key hook.
    #[serde(default)]
    pub command_keys: Vec<CommandKeyEntry>,
}

/// Shape used for the primary when the driver cannot report one itself
/// (headless backend).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrimaryConfig {
    #[serde(default = "default_screen_width")]
    pub width: i32,
    #[serde(default = "default_screen_height")]
    pub height: i32,
    #[serde(default = "default_zone_size")]
    pub zone_size: i32,
}

/// Settings for the read-only HTTP status surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_http_address")]
    pub address: String,
    /// Maximum number of simultaneously served requests; excess connections
    /// receive 503.
    #[serde(default = "default_http_max_in_flight")]
    pub max_in_flight: usize,
}

/// One screen allowed to connect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreenEntry {
    pub name: String,
    /// Alternative names (e.g. FQDNs) resolving to this screen.
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// One directed topology link: leaving `screen` by `direction` lands on
/// `target`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkEntry {
    pub screen: String,
    pub direction: Direction,
    pub target: String,
}

/// One command-key binding. Exactly one of `switch_to`/`lock_toggle` should
/// be set; `lock_toggle` wins if both are.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandKeyEntry {
    /// Key identifier, matching the primary driver's key space.
    pub key: u32,
    /// Required modifier bits (see [`ModifierMask`]).
    #[serde(default)]
    pub mask: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_to: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub lock_toggle: bool,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_name() -> String {
    "primary".to_string()
}
fn default_address() -> String {
    "0.0.0.0:24800".to_string()
}
fn default_bind_timeout() -> u64 {
    10
}
fn default_true() -> bool {
    true
}
fn default_clipboards() -> Vec<ClipboardId> {
    ClipboardId::ALL.to_vec()
}
fn default_screen_width() -> i32 {
    1920
}
fn default_screen_height() -> i32 {
    1080
}
fn default_zone_size() -> i32 {
    1
}
fn default_http_address() -> String {
    "127.0.0.1:24810".to_string()
}
fn default_http_max_in_flight() -> usize {
    4
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            address: default_address(),
            bind_timeout_secs: default_bind_timeout(),
            scroll_lock_locks_cursor: true,
            clipboards: default_clipboards(),
            primary: PrimaryConfig::default(),
            http: HttpConfig::default(),
            screens: Vec::new(),
            links: Vec::new(),
            command_keys: Vec::new(),
        }
    }
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            width: default_screen_width(),
            height: default_screen_height(),
            zone_size: default_zone_size(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_http_address(),
            max_in_flight: default_http_max_in_flight(),
        }
    }
}

// ── Loading and derivation ────────────────────────────────────────────────────

impl ServerConfig {
    /// Loads the configuration from `path`, returning defaults if the file
    /// does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] for file-system errors other than "not
    /// found", and [`ConfigError::Parse`] if the TOML is malformed.
    pub fn load(path: &Path) -> Result<ServerConfig, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
            Err(e) => Err(ConfigError::Io { path: path.to_path_buf(), source: e }),
        }
    }

    /// All screen names this configuration admits: the primary plus declared
    /// secondaries.
    pub fn known_names(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        names.extend(self.screens.iter().map(|s| s.name.clone()));
        names
    }

    /// Resolves a client's claimed name (or alias) to its canonical screen
    /// name. `None` means the configuration does not admit this client.
    pub fn resolve_name(&self, claimed: &str) -> Option<String> {
        self.screens
            .iter()
            .find(|s| s.name == claimed || s.aliases.iter().any(|a| a == claimed))
            .map(|s| s.name.clone())
    }

    /// Builds the edge map from the link entries.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for self-links.
    pub fn build_edges(&self) -> Result<EdgeMap, ConfigError> {
        let mut edges = EdgeMap::new();
        for link in &self.links {
            edges
                .link(&link.screen, link.direction, &link.target)
                .map_err(|e: TopologyError| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(edges)
    }

    /// Converts the command-key entries into engine bindings.
    pub fn command_keys(&self) -> Vec<CommandKey> {
        self.command_keys
            .iter()
            .filter_map(|entry| {
                let action = if entry.lock_toggle {
                    CommandAction::LockCursorToggle
                } else {
                    CommandAction::SwitchTo(entry.switch_to.clone()?)
                };
                Some(CommandKey {
                    key: KeyId(entry.key),
                    mask: ModifierMask(entry.mask),
                    action,
                })
            })
            .collect()
    }

    /// Structural validation: parseable addresses, unique screen names, a
    /// non-empty primary name, and topology rules. Fatal topology issues
    /// reject the configuration; edges to not-yet-declared screens only log
    /// a warning and stay inactive.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing every fatal problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.name.is_empty() {
            problems.push("primary screen name must not be empty".to_string());
        }
        if self.address.parse::<std::net::SocketAddr>().is_err() {
            problems.push(format!("listen address {:?} is not host:port", self.address));
        }
        if self.http.enabled && self.http.address.parse::<std::net::SocketAddr>().is_err() {
            problems.push(format!("http address {:?} is not host:port", self.http.address));
        }

        let mut seen = std::collections::BTreeSet::new();
        for entry in &self.screens {
            if entry.name == self.name {
                problems.push(format!("screen {:?} duplicates the primary name", entry.name));
            }
            if !seen.insert(entry.name.as_str()) {
                problems.push(format!("screen {:?} declared twice", entry.name));
            }
        }

        match self.build_edges() {
            Err(e) => problems.push(e.to_string()),
            Ok(edges) if !edges.is_empty() => {
                let known = self.known_names();
                for issue in validate(&edges, known.iter().map(String::as_str), &self.name) {
                    if issue.is_fatal() {
                        problems.push(issue.to_string());
                    } else {
                        warn!(%issue, "configuration warning");
                    }
                }
            }
            Ok(_) => {}
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

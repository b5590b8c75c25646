//! Screen topology: the user-configured edge map and cursor projection.
//!
//! The topology is pure and stateless. The configuration names directed
//! links between screen edges (`("alpha", Right) -> "beta"`); shapes arrive
//! separately, via each screen's `Info` report. Projection combines the two:
//! given a cursor position crossing an edge of one screen, it decides which
//! screen the cursor lands on and where, chaining across intermediate screens
//! when the motion overshoots an entire screen in one tick.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::geometry::ScreenShape;

// ── Directions ────────────────────────────────────────────────────────────────

/// The four directions the cursor can leave a screen in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    /// Bitmask values used by `active_sides` reports.
    pub const LEFT_MASK: u32 = 1 << 0;
    pub const RIGHT_MASK: u32 = 1 << 1;
    pub const UP_MASK: u32 = 1 << 2;
    pub const DOWN_MASK: u32 = 1 << 3;

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::Left | Direction::Right)
    }

    pub fn mask(self) -> u32 {
        match self {
            Direction::Left => Self::LEFT_MASK,
            Direction::Right => Self::RIGHT_MASK,
            Direction::Up => Self::UP_MASK,
            Direction::Down => Self::DOWN_MASK,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Up => "up",
            Direction::Down => "down",
        };
        f.write_str(s)
    }
}

// ── Edge map ──────────────────────────────────────────────────────────────────

/// Error raised when building an edge map.
#[derive(Debug, Error, PartialEq)]
pub enum TopologyError {
    /// An edge pointing back at its own screen is never meaningful.
    #[error("screen {screen:?} links {direction} to itself")]
    SelfEdge { screen: String, direction: Direction },
}

/// Directed links between screen edges, keyed by `(source screen, direction)`.
///
/// A `BTreeMap` keeps iteration deterministic, which keeps `getConfig`
/// round-trips and validation reports stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeMap {
    edges: BTreeMap<(String, Direction), String>,
}

impl EdgeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Links `from`'s `direction` edge to `to`, replacing any previous link
    /// for that edge.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::SelfEdge`] if `from == to`.
    pub fn link(&mut self, from: &str, direction: Direction, to: &str) -> Result<(), TopologyError> {
        if from == to {
            return Err(TopologyError::SelfEdge {
                screen: from.to_string(),
                direction,
            });
        }
        self.edges.insert((from.to_string(), direction), to.to_string());
        Ok(())
    }

    /// Returns the screen linked to `from`'s `direction` edge, if any.
    pub fn neighbor(&self, from: &str, direction: Direction) -> Option<&str> {
        self.edges
            .get(&(from.to_string(), direction))
            .map(String::as_str)
    }

    /// Bitmask of `from`'s sides that have neighbors (see [`Direction`] masks).
    pub fn active_sides(&self, from: &str) -> u32 {
        [Direction::Left, Direction::Right, Direction::Up, Direction::Down]
            .into_iter()
            .filter(|d| self.neighbor(from, *d).is_some())
            .fold(0, |acc, d| acc | d.mask())
    }

    /// Iterates all links as `(from, direction, to)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Direction, &str)> {
        self.edges
            .iter()
            .map(|((from, dir), to)| (from.as_str(), *dir, to.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

/// One finding from [`validate`]. Fatal issues reject the configuration;
/// warnings are logged and tolerated (the edge stays inactive until the named
/// screen connects).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyIssue {
    /// An edge links a screen to itself.
    SelfEdge { screen: String, direction: Direction },
    /// An edge references a screen name absent from the configured screen set.
    UnknownScreen { name: String },
    /// The primary screen appears nowhere in the topology.
    PrimaryUnlinked { primary: String },
}

impl TopologyIssue {
    pub fn is_fatal(&self) -> bool {
        match self {
            TopologyIssue::SelfEdge { .. } | TopologyIssue::PrimaryUnlinked { .. } => true,
            TopologyIssue::UnknownScreen { .. } => false,
        }
    }
}

impl std::fmt::Display for TopologyIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyIssue::SelfEdge { screen, direction } => {
                write!(f, "screen {screen:?} links {direction} to itself")
            }
            TopologyIssue::UnknownScreen { name } => {
                write!(f, "edge references unknown screen {name:?}")
            }
            TopologyIssue::PrimaryUnlinked { primary } => {
                write!(f, "primary screen {primary:?} has no links")
            }
        }
    }
}

/// Checks an edge map against the configured screen set.
///
/// `known` is the set of screen names the configuration admits (the primary
/// plus declared secondaries). An empty edge map is valid but yields
/// [`TopologyIssue::PrimaryUnlinked`], since a server nobody can reach the
/// primary from is almost certainly a configuration mistake.
pub fn validate<'a, I>(edges: &EdgeMap, known: I, primary: &str) -> Vec<TopologyIssue>
where
    I: IntoIterator<Item = &'a str>,
{
    let known: std::collections::BTreeSet<&str> = known.into_iter().collect();
    let mut issues = Vec::new();
    let mut primary_seen = false;

    for (from, direction, to) in edges.iter() {
        if from == to {
            issues.push(TopologyIssue::SelfEdge {
                screen: from.to_string(),
                direction,
            });
        }
        for name in [from, to] {
            if name == primary {
                primary_seen = true;
            } else if !known.contains(name) {
                issues.push(TopologyIssue::UnknownScreen { name: name.to_string() });
            }
        }
    }

    if !primary_seen {
        issues.push(TopologyIssue::PrimaryUnlinked { primary: primary.to_string() });
    }

    issues
}

// ── Shape lookup ──────────────────────────────────────────────────────────────

/// Source of screen shapes for projection. The server's registry implements
/// this over *ready* screens; tests use a plain map.
pub trait ShapeSource {
    fn shape(&self, name: &str) -> Option<ScreenShape>;
}

impl ShapeSource for BTreeMap<String, ScreenShape> {
    fn shape(&self, name: &str) -> Option<ScreenShape> {
        self.get(name).copied()
    }
}

impl ShapeSource for std::collections::HashMap<String, ScreenShape> {
    fn shape(&self, name: &str) -> Option<ScreenShape> {
        self.get(name).copied()
    }
}

// ── Direction detection ───────────────────────────────────────────────────────

/// Detects whether a local position on `shape` lies inside a jump zone.
///
/// Horizontal edges take precedence over vertical ones, so a position in a
/// corner resolves to Left/Right rather than Up/Down. A zone size of zero
/// means the screen never initiates a jump.
pub fn jump_direction(shape: &ScreenShape, x: i32, y: i32) -> Option<Direction> {
    if x < shape.zone_size {
        Some(Direction::Left)
    } else if x >= shape.w - shape.zone_size {
        Some(Direction::Right)
    } else if y < shape.zone_size {
        Some(Direction::Up)
    } else if y >= shape.h - shape.zone_size {
        Some(Direction::Down)
    } else {
        None
    }
}

/// Detects which edge an out-of-rectangle local position left `shape` by.
///
/// Used for secondary-screen motion, where deltas may push the cursor past
/// any edge. Same horizontal-first tie-break as [`jump_direction`].
pub fn leave_direction(shape: &ScreenShape, x: i32, y: i32) -> Option<Direction> {
    if x < 0 {
        Some(Direction::Left)
    } else if x >= shape.w {
        Some(Direction::Right)
    } else if y < 0 {
        Some(Direction::Up)
    } else if y >= shape.h {
        Some(Direction::Down)
    } else {
        None
    }
}

// ── Projection ────────────────────────────────────────────────────────────────

/// Result of projecting a cursor across a screen edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    /// Destination screen name.
    pub to: String,
    /// Entry X position in the destination's local space.
    pub x: i32,
    /// Entry Y position in the destination's local space.
    pub y: i32,
}

/// Projects a local position on `from` across its `direction` edge.
///
/// The crossing depth is the distance between the position and the edge —
/// for a jump-zone trigger that is the remaining gap to the edge (the cursor
/// enters the neighbor as deep as it was into the zone), and for an
/// overshooting delta it is the distance already travelled past the edge.
/// When the depth exceeds the adjacent screen's extent the projection chains
/// into *its* neighbor, consuming one extent per hop. The perpendicular
/// coordinate is carried through the shared virtual space and clamped into
/// the destination.
///
/// Returns `None` when the chain terminates at an edge with no neighbor or a
/// neighbor without a known shape; the caller clamps and stays put.
pub fn project<S: ShapeSource>(
    shapes: &S,
    edges: &EdgeMap,
    from: &str,
    direction: Direction,
    x: i32,
    y: i32,
) -> Option<Projection> {
    let from_shape = shapes.shape(from)?;

    let mut depth = match direction {
        Direction::Left => x.abs(),
        Direction::Right => (x - from_shape.w).abs(),
        Direction::Up => y.abs(),
        Direction::Down => (y - from_shape.h).abs(),
    };

    // Perpendicular coordinate in virtual space, invariant across hops.
    let perp = if direction.is_horizontal() {
        y + from_shape.y
    } else {
        x + from_shape.x
    };

    let mut cur = from.to_string();
    loop {
        let to = edges.neighbor(&cur, direction)?.to_string();
        let to_shape = shapes.shape(&to)?;
        if !to_shape.is_valid() {
            return None;
        }

        let extent = if direction.is_horizontal() { to_shape.w } else { to_shape.h };
        if depth < extent {
            let (entry_x, entry_y) = match direction {
                Direction::Right => {
                    (depth, (perp - to_shape.y).clamp(0, to_shape.h - 1))
                }
                Direction::Left => {
                    ((to_shape.w - depth).min(to_shape.w - 1), (perp - to_shape.y).clamp(0, to_shape.h - 1))
                }
                Direction::Down => {
                    ((perp - to_shape.x).clamp(0, to_shape.w - 1), depth)
                }
                Direction::Up => {
                    ((perp - to_shape.x).clamp(0, to_shape.w - 1), (to_shape.h - depth).min(to_shape.h - 1))
                }
            };
            return Some(Projection { to, x: entry_x, y: entry_y });
        }

        depth -= extent;
        cur = to;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn shape_at(x: i32, y: i32, w: i32, h: i32, zone: i32) -> ScreenShape {
        ScreenShape { x, y, w, h, zone_size: zone }
    }

    /// Primary 100×100 at origin with a same-size neighbor to the right.
    fn two_screen_row() -> (BTreeMap<String, ScreenShape>, EdgeMap) {
        let mut shapes = BTreeMap::new();
        shapes.insert("primary".to_string(), shape_at(0, 0, 100, 100, 5));
        shapes.insert("right".to_string(), shape_at(100, 0, 100, 100, 5));
        let mut edges = EdgeMap::new();
        edges.link("primary", Direction::Right, "right").unwrap();
        edges.link("right", Direction::Left, "primary").unwrap();
        (shapes, edges)
    }

    // ── EdgeMap ───────────────────────────────────────────────────────────────

    #[test]
    fn test_link_rejects_self_edge() {
        let mut edges = EdgeMap::new();
        let result = edges.link("alpha", Direction::Left, "alpha");
        assert_eq!(
            result,
            Err(TopologyError::SelfEdge {
                screen: "alpha".to_string(),
                direction: Direction::Left,
            })
        );
    }

    #[test]
    fn test_link_replaces_existing_edge() {
        let mut edges = EdgeMap::new();
        edges.link("a", Direction::Right, "b").unwrap();
        edges.link("a", Direction::Right, "c").unwrap();
        assert_eq!(edges.neighbor("a", Direction::Right), Some("c"));
    }

    #[test]
    fn test_active_sides_reports_linked_directions() {
        let (_, edges) = two_screen_row();
        assert_eq!(edges.active_sides("primary"), Direction::RIGHT_MASK);
        assert_eq!(edges.active_sides("right"), Direction::LEFT_MASK);
        assert_eq!(edges.active_sides("nowhere"), 0);
    }

    // ── Direction detection ───────────────────────────────────────────────────

    #[test]
    fn test_jump_direction_detects_right_zone() {
        let s = shape_at(0, 0, 100, 100, 5);
        assert_eq!(jump_direction(&s, 98, 50), Some(Direction::Right));
        assert_eq!(jump_direction(&s, 94, 50), None);
    }

    #[test]
    fn test_jump_direction_corner_prefers_horizontal() {
        let s = shape_at(0, 0, 100, 100, 5);
        // Bottom-right corner: both Right and Down zones apply.
        assert_eq!(jump_direction(&s, 99, 99), Some(Direction::Right));
        // Top-left corner: Left wins over Up.
        assert_eq!(jump_direction(&s, 0, 0), Some(Direction::Left));
    }

    #[test]
    fn test_jump_direction_zero_zone_never_fires() {
        let s = shape_at(0, 0, 100, 100, 0);
        assert_eq!(jump_direction(&s, 0, 50), None);
        assert_eq!(jump_direction(&s, 99, 50), None);
    }

    #[test]
    fn test_leave_direction_detects_overshoot() {
        let s = shape_at(100, 0, 100, 100, 5);
        assert_eq!(leave_direction(&s, -8, 50), Some(Direction::Left));
        assert_eq!(leave_direction(&s, 104, 50), Some(Direction::Right));
        assert_eq!(leave_direction(&s, 50, 120), Some(Direction::Down));
        assert_eq!(leave_direction(&s, 50, 50), None);
    }

    #[test]
    fn test_leave_direction_corner_prefers_horizontal() {
        let s = shape_at(0, 0, 100, 100, 5);
        assert_eq!(leave_direction(&s, -3, -3), Some(Direction::Left));
    }

    // ── Projection ────────────────────────────────────────────────────────────

    #[test]
    fn test_project_right_enters_neighbor_at_zone_depth() {
        let (shapes, edges) = two_screen_row();
        // Cursor 2 pixels shy of the right edge enters 2 pixels into the
        // neighbor.
        let p = project(&shapes, &edges, "primary", Direction::Right, 98, 50).unwrap();
        assert_eq!(p, Projection { to: "right".to_string(), x: 2, y: 50 });
    }

    #[test]
    fn test_project_left_overshoot_carries_into_neighbor() {
        let (shapes, edges) = two_screen_row();
        // 8 pixels past the left edge of "right" lands 8 pixels inside
        // primary's right edge.
        let p = project(&shapes, &edges, "right", Direction::Left, -8, 50).unwrap();
        assert_eq!(p, Projection { to: "primary".to_string(), x: 92, y: 50 });
    }

    #[test]
    fn test_project_returns_none_without_neighbor() {
        let (shapes, edges) = two_screen_row();
        assert_eq!(project(&shapes, &edges, "primary", Direction::Left, 2, 50), None);
        assert_eq!(project(&shapes, &edges, "right", Direction::Right, 104, 50), None);
    }

    #[test]
    fn test_project_returns_none_for_neighbor_without_shape() {
        let (mut shapes, edges) = two_screen_row();
        shapes.remove("right");
        assert_eq!(project(&shapes, &edges, "primary", Direction::Right, 98, 50), None);
    }

    #[test]
    fn test_project_chains_across_multiple_screens() {
        // Row of three: primary, mid (width 60), far.
        let mut shapes = BTreeMap::new();
        shapes.insert("primary".to_string(), shape_at(0, 0, 100, 100, 5));
        shapes.insert("mid".to_string(), shape_at(100, 0, 60, 100, 5));
        shapes.insert("far".to_string(), shape_at(160, 0, 100, 100, 5));
        let mut edges = EdgeMap::new();
        edges.link("primary", Direction::Right, "mid").unwrap();
        edges.link("mid", Direction::Right, "far").unwrap();

        // Overshoot of 75 from primary's right edge: consumes mid's 60-pixel
        // width and lands 15 pixels into far.
        let p = project(&shapes, &edges, "primary", Direction::Right, 175, 50).unwrap();
        assert_eq!(p, Projection { to: "far".to_string(), x: 15, y: 50 });
    }

    #[test]
    fn test_project_chain_stops_at_unlinked_edge() {
        let (shapes, edges) = two_screen_row();
        // Depth beyond "right"'s width with no further neighbor.
        assert_eq!(project(&shapes, &edges, "primary", Direction::Right, 250, 50), None);
    }

    #[test]
    fn test_project_down_translates_perpendicular_through_virtual_space() {
        let mut shapes = BTreeMap::new();
        shapes.insert("primary".to_string(), shape_at(0, 0, 100, 100, 5));
        // Below, shifted 30 to the right in virtual space.
        shapes.insert("below".to_string(), shape_at(30, 100, 100, 100, 5));
        let mut edges = EdgeMap::new();
        edges.link("primary", Direction::Down, "below").unwrap();

        let p = project(&shapes, &edges, "primary", Direction::Down, 50, 98).unwrap();
        assert_eq!(p.to, "below");
        assert_eq!(p.x, 20, "virtual x 50 is local 20 on the shifted screen");
        assert_eq!(p.y, 2);
    }

    #[test]
    fn test_project_clamps_perpendicular_into_destination() {
        let mut shapes = BTreeMap::new();
        shapes.insert("primary".to_string(), shape_at(0, 0, 100, 100, 5));
        // Shorter neighbor: y range 0..50 in virtual space.
        shapes.insert("short".to_string(), shape_at(100, 0, 100, 50, 5));
        let mut edges = EdgeMap::new();
        edges.link("primary", Direction::Right, "short").unwrap();

        let p = project(&shapes, &edges, "primary", Direction::Right, 98, 90).unwrap();
        assert_eq!(p.y, 49, "perpendicular must clamp to the destination extent");
    }

    #[test]
    fn test_project_left_entry_at_edge_stays_inside() {
        let (shapes, edges) = two_screen_row();
        // Depth 0 (cursor exactly on the edge) must not map to x == w.
        let p = project(&shapes, &edges, "right", Direction::Left, 0, 50).unwrap();
        assert_eq!(p.x, 99);
    }

    // ── validate ──────────────────────────────────────────────────────────────

    #[test]
    fn test_validate_accepts_symmetric_pair() {
        let (_, edges) = two_screen_row();
        let issues = validate(&edges, ["primary", "right"], "primary");
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");
    }

    #[test]
    fn test_validate_flags_unknown_screen_as_warning() {
        let mut edges = EdgeMap::new();
        edges.link("primary", Direction::Right, "ghost").unwrap();
        let issues = validate(&edges, ["primary"], "primary");
        assert_eq!(
            issues,
            vec![TopologyIssue::UnknownScreen { name: "ghost".to_string() }]
        );
        assert!(!issues[0].is_fatal());
    }

    #[test]
    fn test_validate_flags_missing_primary_as_fatal() {
        let mut edges = EdgeMap::new();
        edges.link("a", Direction::Right, "b").unwrap();
        let issues = validate(&edges, ["a", "b"], "primary");
        assert!(issues.contains(&TopologyIssue::PrimaryUnlinked { primary: "primary".to_string() }));
        assert!(issues.iter().any(|i| i.is_fatal()));
    }
}

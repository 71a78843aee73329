//! Virtual screen geometry and layout types.
//!
//! Every machine contributes one [`VirtualScreenInfo`] describing its
//! physical display. The server arranges the known screens in a shared
//! integer plane via [`VirtualScreenConfig`] entries; gaps between
//! rectangles are allowed and act as impassable borders.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// A screen edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}

impl Edge {
    /// The opposite edge; where the cursor enters on the neighboring screen.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            Self::Top => Self::Bottom,
            Self::Bottom => Self::Top,
        }
    }

    /// Which edge, if any, a clamped cursor position is touching.
    ///
    /// Positions are clamped to `[0, width] x [0, height]`, so touching
    /// means `<= 0` or `>= extent`. Horizontal edges win over vertical
    /// ones when the cursor sits exactly in a corner.
    #[must_use]
    pub fn check(x: i32, y: i32, width: i32, height: i32) -> Option<Self> {
        if x <= 0 {
            Some(Self::Left)
        } else if x >= width {
            Some(Self::Right)
        } else if y <= 0 {
            Some(Self::Top)
        } else if y >= height {
            Some(Self::Bottom)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
            Self::Top => write!(f, "top"),
            Self::Bottom => write!(f, "bottom"),
        }
    }
}

/// An integer point in the shared layout plane.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode,
)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in the shared layout plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Inclusive containment on all four sides.
    ///
    /// A screen of width `w` occupies `[x, x + w]`; the exit point computed
    /// one pixel past a border must land inside the neighbor's rectangle
    /// even when the screens abut exactly.
    #[must_use]
    pub fn contains(&self, pt: Point) -> bool {
        pt.x >= self.x
            && pt.x <= self.x + self.width
            && pt.y >= self.y
            && pt.y <= self.y + self.height
    }
}

/// A machine's physical display as announced over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct VirtualScreenInfo {
    /// Unique within the cluster.
    pub name: String,
    /// Assigned by the owning machine.
    pub screen_id: u32,
    pub width: u32,
    pub height: u32,
    /// Milliseconds since the Unix epoch at announcement time.
    pub timestamp: u64,
}

/// Placement of one screen in the shared layout plane. Persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct VirtualScreenConfig {
    pub name: String,
    pub pos_x: i32,
    pub pos_y: i32,
    pub width: i32,
    pub height: i32,
}

impl VirtualScreenConfig {
    #[must_use]
    pub fn rect(&self) -> Rect {
        Rect::new(self.pos_x, self.pos_y, self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_opposites() {
        assert_eq!(Edge::Left.opposite(), Edge::Right);
        assert_eq!(Edge::Right.opposite(), Edge::Left);
        assert_eq!(Edge::Top.opposite(), Edge::Bottom);
        assert_eq!(Edge::Bottom.opposite(), Edge::Top);
    }

    #[test]
    fn edge_check_interior() {
        assert_eq!(Edge::check(500, 500, 1920, 1080), None);
        assert_eq!(Edge::check(1, 1, 1920, 1080), None);
        assert_eq!(Edge::check(1919, 1079, 1920, 1080), None);
    }

    #[test]
    fn edge_check_boundaries() {
        assert_eq!(Edge::check(0, 500, 1920, 1080), Some(Edge::Left));
        assert_eq!(Edge::check(1920, 500, 1920, 1080), Some(Edge::Right));
        assert_eq!(Edge::check(500, 0, 1920, 1080), Some(Edge::Top));
        assert_eq!(Edge::check(500, 1080, 1920, 1080), Some(Edge::Bottom));
    }

    #[test]
    fn edge_check_corner_prefers_horizontal() {
        assert_eq!(Edge::check(0, 0, 1920, 1080), Some(Edge::Left));
        assert_eq!(Edge::check(1920, 1080, 1920, 1080), Some(Edge::Right));
    }

    #[test]
    fn rect_contains_is_inclusive() {
        let rect = Rect::new(1920, 0, 1920, 1080);
        assert!(rect.contains(Point::new(1920, 0)));
        assert!(rect.contains(Point::new(3840, 1080)));
        assert!(rect.contains(Point::new(2000, 500)));
        assert!(!rect.contains(Point::new(1919, 500)));
        assert!(!rect.contains(Point::new(3841, 500)));
    }

    #[test]
    fn screen_config_rect() {
        let config = VirtualScreenConfig {
            name: "laptop".to_string(),
            pos_x: -1920,
            pos_y: 0,
            width: 1920,
            height: 1080,
        };
        assert!(config.rect().contains(Point::new(-1, 500)));
        assert!(!config.rect().contains(Point::new(1, 500)));
    }

    #[test]
    fn screen_info_json_roundtrip() {
        let info = VirtualScreenInfo {
            name: "desk".to_string(),
            screen_id: 3,
            width: 2560,
            height: 1440,
            timestamp: 1_700_000_000_000,
        };
        let json = serde_json::to_string(&info).unwrap();
        let decoded: VirtualScreenInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(info, decoded);
    }
}

//! Edge-proximity classification used as the swipe aim of a gesture.

use crate::geometry::{Point, Size};
use std::fmt;

/// Distance from an edge, in view units, inside which a touch counts as an
/// edge swipe.
pub const EDGE_THRESHOLD: f64 = 32.0;

/// Edge a gesture is aimed at. Discriminants are the guest's edge codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SwipeAim {
    #[default]
    None = 0,
    Top = 1,
    Bottom = 2,
    Right = 4,
    Left = 8,
}

impl SwipeAim {
    /// Edge code carried in a touch record.
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SwipeAim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwipeAim::None => write!(f, "none"),
            SwipeAim::Top => write!(f, "top"),
            SwipeAim::Bottom => write!(f, "bottom"),
            SwipeAim::Right => write!(f, "right"),
            SwipeAim::Left => write!(f, "left"),
        }
    }
}

/// Classify which edge, if any, a view-local point is close to.
///
/// Left and right are compared first (a tie goes to left). The edge at
/// `y = 0` and then the edge at `y = height` replace the current pick only
/// when strictly closer. The `y = 0` edge is `Top` in an unflipped view and
/// `Bottom` in a flipped one.
pub fn classify_edge(point: Point, bounds: Size, flipped: bool) -> SwipeAim {
    let dist_left = point.x;
    let dist_right = bounds.width - point.x;

    let (mut min_dist, mut aim) = if dist_right < dist_left {
        (dist_right, SwipeAim::Right)
    } else {
        (dist_left, SwipeAim::Left)
    };

    let (origin_edge, far_edge) = if flipped {
        (SwipeAim::Bottom, SwipeAim::Top)
    } else {
        (SwipeAim::Top, SwipeAim::Bottom)
    };

    let dist_origin = point.y;
    if dist_origin < min_dist {
        min_dist = dist_origin;
        aim = origin_edge;
    }

    let dist_far = bounds.height - point.y;
    if dist_far < min_dist {
        min_dist = dist_far;
        aim = far_edge;
    }

    if min_dist < EDGE_THRESHOLD {
        aim
    } else {
        SwipeAim::None
    }
}

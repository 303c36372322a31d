//! View geometry and coordinate normalization.

/// A point in view-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Width and height of a view's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Whether both dimensions are strictly positive.
    pub fn is_usable(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Bounds and coordinate convention of the view receiving pointer input.
///
/// A flipped view has its origin at the top-left corner with y growing
/// downward; an unflipped view has its origin at the bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewGeometry {
    pub bounds: Size,
    pub flipped: bool,
}

impl ViewGeometry {
    pub fn new(width: f64, height: f64, flipped: bool) -> Self {
        Self {
            bounds: Size::new(width, height),
            flipped,
        }
    }
}

/// A point in the guest's unit square, y growing downward.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

impl NormalizedPoint {
    pub const ORIGIN: NormalizedPoint = NormalizedPoint { x: 0.0, y: 0.0 };
}

/// Map a view-local point into `[0, 1] x [0, 1]`.
///
/// Returns `None` when either bound dimension is non-positive. Points outside
/// the bounds are clamped onto the nearest edge. The y axis is inverted for
/// unflipped views so that normalized y always grows toward the bottom of
/// the screen.
pub fn normalize(point: Point, bounds: Size, flipped: bool) -> Option<NormalizedPoint> {
    if !bounds.is_usable() {
        return None;
    }

    let x = (point.x / bounds.width).clamp(0.0, 1.0);
    let mut y = (point.y / bounds.height).clamp(0.0, 1.0);

    if !flipped {
        y = 1.0 - y;
    }

    Some(NormalizedPoint { x, y })
}

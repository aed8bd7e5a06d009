//! Basic rectangle geometry shared by scissor computation and atlas packing.

/// An axis-aligned rectangle in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// A rectangle has zero coverage when either extent is non-positive.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Intersection of two rectangles, clamped to non-negative extents.
    ///
    /// A negative intersection never escapes this function; a disjoint pair
    /// produces a zero-area rectangle so callers can treat "empty" uniformly
    /// instead of handling inverted extents.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let min_x = self.x.max(other.x);
        let min_y = self.y.max(other.y);
        let max_x = self.right().min(other.right());
        let max_y = self.bottom().min(other.bottom());

        Rect {
            x: min_x,
            y: min_y,
            width: (max_x - min_x).max(0.0),
            height: (max_y - min_y).max(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_overlapping() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let b = Rect::new(50.0, 25.0, 100.0, 100.0);
        let c = a.intersect(&b);
        assert_eq!(c, Rect::new(50.0, 25.0, 50.0, 75.0));
    }

    #[test]
    fn intersect_disjoint_clamps_to_zero() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 10.0, 10.0);
        let c = a.intersect(&b);
        assert!(c.is_empty());
        assert_eq!(c.width, 0.0);
        assert_eq!(c.height, 0.0);
    }

    #[test]
    fn intersect_contained() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let b = Rect::new(10.0, 10.0, 20.0, 20.0);
        assert_eq!(a.intersect(&b), b);
    }
}

//! Integer screen coordinates shared by vision, session and flow.

use serde::{Deserialize, Serialize};

/// A point in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Translate by `(dx, dy)`, clamping at the `i32` range.
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }

    /// Euclidean distance to `other`.
    pub fn distance(self, other: Point) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        (dx * dx + dy * dy).sqrt()
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// An axis-aligned rectangle: `x..x+width`, `y..y+height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, p: Point) -> bool {
        let within = |v: i32, start: i32, len: i32| {
            let v = i64::from(v);
            let start = i64::from(start);
            v >= start && v < start + i64::from(len)
        };
        within(p.x, self.x, self.width) && within(p.y, self.y, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_containment_is_half_open() {
        let r = Rect::new(10, 10, 20, 20);
        assert!(r.contains(Point::new(10, 10)));
        assert!(r.contains(Point::new(29, 29)));
        assert!(!r.contains(Point::new(30, 10)));
        assert!(!r.contains(Point::new(9, 15)));
    }

    #[test]
    fn distance_and_offset() {
        let p = Point::new(0, 0).offset(3, 4);
        assert_eq!(p, Point::new(3, 4));
        assert!((p.distance(Point::default()) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn extreme_coordinates_do_not_overflow() {
        let edge = Point::new(i32::MAX - 1, i32::MIN + 1);
        assert_eq!(edge.offset(10, -10), Point::new(i32::MAX, i32::MIN));

        let wide = Rect::new(i32::MAX - 5, i32::MIN, 100, 100);
        assert!(wide.contains(Point::new(i32::MAX, i32::MIN + 99)));
        assert!(!wide.contains(Point::new(i32::MAX - 6, i32::MIN)));
        assert!(!wide.contains(Point::new(i32::MAX, i32::MIN + 100)));

        let far = Point::new(i32::MIN, 0).distance(Point::new(i32::MAX, 0));
        assert_eq!(far, f64::from(u32::MAX));
    }
}

use std::fmt::Debug;

// Screen rectangle of a view inside the host window. Used for mouse and scroll routing
#[derive(Clone, Copy, Default, Eq, PartialEq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Debug for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Viewport {{ x: {}, y: {}, width: {}, height: {} }}", self.x, self.y, self.width, self.height)
    }
}

impl Viewport {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Only the all-zero viewport hides the view.
    pub fn is_hidden(&self) -> bool {
        *self == Self::default()
    }

    /// A viewport without an area accepts input anywhere on screen.
    pub fn is_unrestricted(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn translate(&mut self, x: i32, y: i32) {
        self.x = x;
        self.y = y;
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        if self.is_hidden() {
            return false;
        }
        if self.is_unrestricted() {
            return true;
        }
        let (x, y) = (i64::from(x), i64::from(y));
        let (left, top) = (i64::from(self.x), i64::from(self.y));
        x >= left
            && y >= top
            && x < left + i64::from(self.width)
            && y < top + i64::from(self.height)
    }

    /// Converts screen coordinates into view-local ones. Unrestricted viewports pass them through.
    pub fn to_local(&self, x: i32, y: i32) -> (i32, i32) {
        if self.is_unrestricted() {
            return (x, y);
        }
        (x.saturating_sub(self.x), y.saturating_sub(self.y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_and_local() {
        let vp = Viewport::new(100, 50, 200, 100);
        assert!(vp.contains(100, 50));
        assert!(vp.contains(299, 149));
        assert!(!vp.contains(300, 149));
        assert!(!vp.contains(99, 60));
        assert_eq!(vp.to_local(150, 70), (50, 20));
    }

    #[test]
    fn hidden_viewport_contains_nothing() {
        let vp = Viewport::default();
        assert!(vp.is_hidden());
        assert!(!vp.contains(0, 0));
    }

    #[test]
    fn zero_area_viewport_takes_input_everywhere() {
        let vp = Viewport::new(10, 10, 0, 0);
        assert!(!vp.is_hidden());
        assert!(vp.contains(0, 0));
        assert!(vp.contains(500, 300));
        assert_eq!(vp.to_local(40, 30), (40, 30));

        let flat = Viewport::new(0, 0, 64, 0);
        assert!(!flat.is_hidden());
        assert!(flat.contains(3, 4));
    }
}

pub use glam::IVec2;

/// 2D vector type used for velocities, accelerations and sub-pixel remainders.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Component-wise round half away from zero.
    pub fn round(self) -> Self {
        Self::new(self.x.round(), self.y.round())
    }
}

impl From<(f32, f32)> for Vec2 {
    fn from(value: (f32, f32)) -> Self {
        Self {
            x: value.0,
            y: value.1,
        }
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl std::ops::MulAssign<f32> for Vec2 {
    fn mul_assign(&mut self, rhs: f32) {
        self.x *= rhs;
        self.y *= rhs;
    }
}

/// Integer axis-aligned rectangle. `max_*` edges are exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x + width,
            max_y: y + height,
        }
    }

    pub fn width(&self) -> i32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> i32 {
        self.max_y - self.min_y
    }

    /// Overlap test; touching edges do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self {
            min_x: self.min_x + dx,
            min_y: self.min_y + dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }

    /// Mirror horizontally inside a canvas of the given width.
    pub fn flipped_x(&self, canvas_width: i32) -> Self {
        Self {
            min_x: canvas_width - self.max_x,
            min_y: self.min_y,
            max_x: canvas_width - self.min_x,
            max_y: self.max_y,
        }
    }

    /// This rectangle's X span combined with `other`'s Y span.
    pub fn with_y_of(&self, other: &Rect) -> Self {
        Self {
            min_y: other.min_y,
            max_y: other.max_y,
            ..*self
        }
    }

    /// This rectangle's Y span combined with `other`'s X span.
    pub fn with_x_of(&self, other: &Rect) -> Self {
        Self {
            min_x: other.min_x,
            max_x: other.max_x,
            ..*self
        }
    }
}

/// Camera describing which part of the level is on screen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera2D {
    /// World position of the top-left corner of the view.
    pub position: Vec2,
    /// Size of the view in world pixels.
    pub view_size: Vec2,
}

impl Camera2D {
    pub fn new(view_width: f32, view_height: f32) -> Self {
        Self {
            position: Vec2::ZERO,
            view_size: Vec2::new(view_width, view_height),
        }
    }

    /// Center the view on `target`, clamped so it never shows past the level edges.
    pub fn follow(&mut self, target: IVec2, level_width: i32, level_height: i32) {
        let max_x = (level_width as f32 - self.view_size.x).max(0.0);
        let max_y = (level_height as f32 - self.view_size.y).max(0.0);
        self.position = Vec2::new(
            (target.x as f32 - self.view_size.x * 0.5).clamp(0.0, max_x).floor(),
            (target.y as f32 - self.view_size.y * 0.5).clamp(0.0, max_y).floor(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_rects_do_not_intersect() {
        let a = Rect::new(0, 0, 16, 16);
        let b = Rect::new(16, 0, 16, 16);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&b.translated(-1, 0)));
    }

    #[test]
    fn flip_mirrors_inside_canvas() {
        let hitbox = Rect {
            min_x: 2,
            min_y: 1,
            max_x: 6,
            max_y: 9,
        };
        let flipped = hitbox.flipped_x(16);
        assert_eq!((flipped.min_x, flipped.max_x), (10, 14));
        assert_eq!((flipped.min_y, flipped.max_y), (1, 9));
    }

    #[test]
    fn camera_clamps_to_level() {
        let mut camera = Camera2D::new(100.0, 50.0);
        camera.follow(IVec2::new(10, 10), 400, 200);
        assert_eq!(camera.position, Vec2::ZERO);

        camera.follow(IVec2::new(390, 190), 400, 200);
        assert_eq!(camera.position, Vec2::new(300.0, 150.0));
    }
}

use glam::Vec2;

/// A single scanner sample with position, color and focus.
///
/// `z` is not a depth coordinate: it marks beam points. A value of 0 is a
/// normal scan point, anything above 0 is a held beam whose value is the
/// synthetic beam intensity. Color channels and focus live in 0..1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaserPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub focus: f32,
}

pub(crate) const EPSILON: f32 = 0.0001;

impl Default for LaserPoint {
    fn default() -> Self {
        Self::ZERO
    }
}

impl LaserPoint {
    pub const ZERO: LaserPoint = LaserPoint {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        r: 0.0,
        g: 0.0,
        b: 0.0,
        focus: 0.0,
    };

    /// A blank (unlit) point at the given position.
    pub fn xy(x: f32, y: f32) -> Self {
        Self { x, y, ..Self::ZERO }
    }

    pub fn with_rgb(x: f32, y: f32, r: f32, g: f32, b: f32) -> Self {
        Self { x, y, z: 0.0, r, g, b, focus: 0.0 }
    }

    pub fn with_focus(&self, focus: f32) -> Self {
        Self { focus, ..*self }
    }

    /// Copy of this point carrying the given beam marker.
    pub fn with_beam(&self, z: f32) -> Self {
        Self { z, ..*self }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn is_beam(&self) -> bool {
        self.z > 0.0
    }

    /// A point with no visible color (laser off).
    pub fn is_blank(&self) -> bool {
        self.r.max(self.g).max(self.b) <= EPSILON
    }

    /// Position-only comparison; color, focus and beam marker are ignored.
    pub fn is_same_position(&self, other: &LaserPoint) -> bool {
        (self.x - other.x).abs() < EPSILON && (self.y - other.y).abs() < EPSILON
    }

    /// Clamp color and focus into 0..1.
    pub fn clamp_colour(&mut self) {
        self.r = self.r.clamp(0.0, 1.0);
        self.g = self.g.clamp(0.0, 1.0);
        self.b = self.b.clamp(0.0, 1.0);
        self.focus = self.focus.clamp(0.0, 1.0);
    }

    /// Linear blend towards `other`.
    ///
    /// The beam marker only blends when this point is itself a beam point;
    /// otherwise it stays 0 so beam markers never leak into scan segments.
    pub fn lerp(&self, other: &LaserPoint, t: f32) -> LaserPoint {
        LaserPoint {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: if self.z > 0.0 { self.z + (other.z - self.z) * t } else { 0.0 },
            r: self.r + (other.r - self.r) * t,
            g: self.g + (other.g - self.g) * t,
            b: self.b + (other.b - self.b) * t,
            focus: self.focus + (other.focus - self.focus) * t,
        }
    }

    /// Every field within `EPSILON` of `other`.
    #[cfg(test)]
    pub(crate) fn approx_eq(&self, other: &LaserPoint) -> bool {
        (self.x - other.x).abs() < EPSILON
            && (self.y - other.y).abs() < EPSILON
            && (self.z - other.z).abs() < EPSILON
            && (self.r - other.r).abs() < EPSILON
            && (self.g - other.g).abs() < EPSILON
            && (self.b - other.b).abs() < EPSILON
            && (self.focus - other.focus).abs() < EPSILON
    }
}

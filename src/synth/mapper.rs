//! Square <-> disc mapping for the pitch controller.
//!
//! Uses the elliptical grid mapping: the square's edge lands on the disc's
//! rim and the map is close to identity near the centre, so equal travel on
//! the round control surface means equal bend in every direction. Inputs
//! outside the domain are clamped, never rejected.

use std::f32::consts::SQRT_2;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Shrinks `p` onto the disc of `radius` if it lies outside.
pub fn clamp_magnitude(p: Vec2, radius: f32) -> Vec2 {
    let len = p.length();
    if len <= radius || len == 0.0 {
        return p;
    }
    let k = radius / len;
    Vec2::new(p.x * k, p.y * k)
}

pub fn square_to_disc(p: Vec2, square_half_size: f32, disc_radius: f32) -> Vec2 {
    if !p.is_finite() || square_half_size <= 0.0 || disc_radius <= 0.0 {
        return Vec2::ZERO;
    }
    let x = p.x.clamp(-square_half_size, square_half_size) / square_half_size;
    let y = p.y.clamp(-square_half_size, square_half_size) / square_half_size;
    Vec2::new(
        disc_radius * x * (1.0 - y * y / 2.0).sqrt(),
        disc_radius * y * (1.0 - x * x / 2.0).sqrt(),
    )
}

/// Exact inverse of [`square_to_disc`]. The shortcut `h * x / sqrt(1 - y^2 / 2)`
/// only agrees with it on the axes and misses the square's corners.
pub fn disc_to_square(p: Vec2, disc_radius: f32, square_half_size: f32) -> Vec2 {
    if !p.is_finite() || square_half_size <= 0.0 || disc_radius <= 0.0 {
        return Vec2::ZERO;
    }
    let q = clamp_magnitude(p, disc_radius);
    let u = q.x / disc_radius;
    let v = q.y / disc_radius;

    let uv = u * u - v * v;
    let two_root2_u = 2.0 * SQRT_2 * u;
    let two_root2_v = 2.0 * SQRT_2 * v;
    let x = 0.5 * (2.0 + uv + two_root2_u).max(0.0).sqrt()
        - 0.5 * (2.0 + uv - two_root2_u).max(0.0).sqrt();
    let y = 0.5 * (2.0 - uv + two_root2_v).max(0.0).sqrt()
        - 0.5 * (2.0 - uv - two_root2_v).max(0.0).sqrt();

    Vec2::new(
        square_half_size * x.clamp(-1.0, 1.0),
        square_half_size * y.clamp(-1.0, 1.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec2, b: Vec2, tol: f32) -> bool {
        (a.x - b.x).abs() < tol && (a.y - b.y).abs() < tol
    }

    #[test]
    fn square_corners_land_on_the_rim() {
        let d = square_to_disc(Vec2::new(50.0, 50.0), 50.0, 10.0);
        assert!((d.length() - 10.0).abs() < 1e-4);
        let d = square_to_disc(Vec2::new(-50.0, 0.0), 50.0, 10.0);
        assert!(close(d, Vec2::new(-10.0, 0.0), 1e-5));
    }

    #[test]
    fn axes_match_the_simple_inverse() {
        // on an axis the other coordinate is zero, so the inverse is a plain rescale
        let s = disc_to_square(Vec2::new(0.6, 0.0), 1.0, 1.0);
        assert!(close(s, Vec2::new(0.6, 0.0), 1e-5));
        let s = disc_to_square(Vec2::new(0.0, -4.0), 8.0, 2.0);
        assert!(close(s, Vec2::new(0.0, -1.0), 1e-5));
    }

    #[test]
    fn round_trip_inside_the_square() {
        let h = 1.0;
        for i in -9..=9 {
            for j in -9..=9 {
                let p = Vec2::new(i as f32 / 10.0, j as f32 / 10.0);
                let back = disc_to_square(square_to_disc(p, h, 1.0), 1.0, h);
                assert!(close(back, p, 1e-4), "{p:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn diagonal_rim_reaches_the_corner() {
        let d = std::f32::consts::FRAC_1_SQRT_2;
        let s = disc_to_square(Vec2::new(d, -d), 1.0, 2.0);
        assert!(close(s, Vec2::new(2.0, -2.0), 1e-3), "{s:?}");

        // the axis-wise shortcut stops well short of it
        let shortcut = d / (1.0 - d * d / 2.0).sqrt();
        assert!(shortcut < 0.9);
    }

    #[test]
    fn round_trip_with_different_scales() {
        let p = Vec2::new(12.0, -30.0);
        let disc = square_to_disc(p, 40.0, 3.0);
        let back = disc_to_square(disc, 3.0, 40.0);
        assert!(close(back, p, 1e-3));
    }

    #[test]
    fn out_of_range_is_clamped() {
        let s = square_to_disc(Vec2::new(500.0, 0.0), 1.0, 1.0);
        assert!(close(s, Vec2::new(1.0, 0.0), 1e-6));

        let s = disc_to_square(Vec2::new(3.0, 4.0), 1.0, 1.0);
        assert!(s.x.abs() <= 1.0 && s.y.abs() <= 1.0);
        assert!(s.x > 0.0 && s.y > 0.0);

        let rim = disc_to_square(Vec2::new(1.0, 0.0), 1.0, 1.0);
        assert!(close(rim, Vec2::new(1.0, 0.0), 1e-5));
    }

    #[test]
    fn degenerate_sizes_map_to_origin() {
        assert_eq!(square_to_disc(Vec2::new(1.0, 1.0), 0.0, 1.0), Vec2::ZERO);
        assert_eq!(disc_to_square(Vec2::new(1.0, 1.0), -1.0, 1.0), Vec2::ZERO);
        assert_eq!(disc_to_square(Vec2::new(f32::NAN, 0.0), 1.0, 1.0), Vec2::ZERO);
    }
}

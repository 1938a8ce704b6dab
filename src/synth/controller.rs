use super::mapper::{Vec2, disc_to_square};

// full deflection on each axis
pub const OCTAVE_CENTS: f32 = 1200.0;
pub const FIFTH_CENTS: f32 = 700.0;

/// Position of a board's pitch controller in the unit square.
/// Vertical bends by octaves, horizontal by fifths, and the two add up.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ControllerPosition {
    pub x: f32,
    pub y: f32,
}

impl ControllerPosition {
    pub const CENTER: ControllerPosition = ControllerPosition { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        let clamp = |v: f32| if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 };
        Self { x: clamp(x), y: clamp(y) }
    }

    /// Discrete input pins each axis to -1, 0 or +1. When both keys on an
    /// axis are held, left beats right and up beats down.
    pub fn from_arrow_keys(left: bool, right: bool, up: bool, down: bool) -> Self {
        let x = if left {
            -1.0
        } else if right {
            1.0
        } else {
            0.0
        };
        let y = if up {
            1.0
        } else if down {
            -1.0
        } else {
            0.0
        };
        Self { x, y }
    }

    /// Pointer drag on the round control surface, relative to its centre.
    /// Screen y grows downward, so it is flipped here.
    pub fn from_disc_drag(offset: Vec2, radius: f32) -> Self {
        let p = disc_to_square(Vec2::new(offset.x, -offset.y), radius, 1.0);
        Self::new(p.x, p.y)
    }

    pub fn detune_cents(&self) -> f32 {
        self.y * OCTAVE_CENTS + self.x * FIFTH_CENTS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrow_keys_pin_axes() {
        let cents = |l, r, u, d| ControllerPosition::from_arrow_keys(l, r, u, d).detune_cents();
        assert_eq!(cents(false, true, false, false), 700.0);
        assert_eq!(cents(true, false, false, false), -700.0);
        assert_eq!(cents(false, false, true, false), 1200.0);
        assert_eq!(cents(false, false, false, true), -1200.0);
        assert_eq!(cents(true, false, true, false), 500.0);
        assert_eq!(cents(false, false, false, false), 0.0);
    }

    #[test]
    fn opposite_keys_resolve_left_and_up() {
        let p = ControllerPosition::from_arrow_keys(true, true, true, true);
        assert_eq!(p, ControllerPosition { x: -1.0, y: 1.0 });
    }

    #[test]
    fn drag_reaches_full_bend_at_the_rim() {
        let right = ControllerPosition::from_disc_drag(Vec2::new(40.0, 0.0), 40.0);
        assert!((right.detune_cents() - 700.0).abs() < 0.01);

        // dragging up the screen bends up an octave
        let up = ControllerPosition::from_disc_drag(Vec2::new(0.0, -40.0), 40.0);
        assert!((up.detune_cents() - 1200.0).abs() < 0.01);

        // past the rim stays pinned
        let far = ControllerPosition::from_disc_drag(Vec2::new(0.0, 400.0), 40.0);
        assert!((far.detune_cents() + 1200.0).abs() < 0.01);
    }

    #[test]
    fn new_clamps_and_sanitizes() {
        assert_eq!(ControllerPosition::new(3.0, -2.0), ControllerPosition { x: 1.0, y: -1.0 });
        assert_eq!(ControllerPosition::new(f32::NAN, 0.5), ControllerPosition { x: 0.0, y: 0.5 });
    }
}

//! Click-free gain transitions.
//!
//! Every gain change in the instrument goes through [`ramp_gain`]. An
//! exponential segment cannot reach zero, so silence is approached as
//! [`EPSILON`] and pinned to the exact target once the window ends.

use crate::audio::{AudioEngine, Completion, NodeId, ParamId};

pub const EPSILON: f32 = 0.001;

/// Ramps the gain of `node` from wherever it is at `at` to `to`, finishing at
/// `at + window`. Any automation already scheduled past `at` is cancelled.
pub fn ramp_gain(
    engine: &mut AudioEngine,
    node: NodeId,
    to: f32,
    at: f64,
    window: f64,
) -> Completion {
    let window = window.max(0.0);
    let done = Completion::at_time(at + window);
    let Some(gain) = engine.param_mut(node, ParamId::Gain) else {
        log::warn!("gain ramp on missing node {node:?}");
        return done;
    };

    gain.cancel_and_hold_at_time(at);
    if gain.value_at(at) < EPSILON {
        gain.set_value_at_time(EPSILON, at);
    }
    gain.exponential_ramp_to_value_at_time(to.max(EPSILON), at + window * 2.0 / 3.0);
    gain.set_value_at_time(to, at + window);
    done
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gain_at(engine: &AudioEngine, node: NodeId, t: f64) -> f32 {
        engine.param(node, ParamId::Gain).unwrap().value_at(t)
    }

    #[test]
    fn ramps_up_from_silence() {
        let mut engine = AudioEngine::with_seed(48_000, 0);
        let node = engine.create_gain(0.0);
        let done = ramp_gain(&mut engine, node, 0.5, 0.0, 0.03);

        assert_eq!(done.at(), 0.03);
        assert_eq!(gain_at(&engine, node, 0.0), EPSILON);
        let mid = gain_at(&engine, node, 0.01);
        assert!(mid > EPSILON && mid < 0.5);
        assert!((gain_at(&engine, node, 0.02) - 0.5).abs() < 1e-5);
        assert_eq!(gain_at(&engine, node, 0.03), 0.5);
    }

    #[test]
    fn ramps_down_to_exact_zero() {
        let mut engine = AudioEngine::with_seed(48_000, 0);
        let node = engine.create_gain(0.8);
        ramp_gain(&mut engine, node, 0.0, 0.0, 0.03);

        assert_eq!(gain_at(&engine, node, 0.0), 0.8);
        assert!((gain_at(&engine, node, 0.02) - EPSILON).abs() < 1e-6);
        assert_eq!(gain_at(&engine, node, 0.03), 0.0);
    }

    #[test]
    fn new_ramp_overrides_pending_one() {
        let mut engine = AudioEngine::with_seed(48_000, 0);
        let node = engine.create_gain(0.0);
        ramp_gain(&mut engine, node, 1.0, 0.0, 0.03);
        // interrupt halfway, heading back down
        let held = gain_at(&engine, node, 0.015);
        ramp_gain(&mut engine, node, 0.0, 0.015, 0.03);

        assert!((gain_at(&engine, node, 0.015) - held).abs() < 1e-6);
        assert!(gain_at(&engine, node, 0.02) < held);
        assert_eq!(gain_at(&engine, node, 0.045), 0.0);
        assert_eq!(engine.param(node, ParamId::Gain).unwrap().final_value(), 0.0);
    }

    #[test]
    fn missing_node_is_harmless() {
        let mut engine = AudioEngine::with_seed(48_000, 0);
        let node = engine.create_gain(0.0);
        engine.remove(node);
        let done = ramp_gain(&mut engine, node, 1.0, 0.5, 0.05);
        assert!((done.at() - 0.55).abs() < 1e-12);
    }
}

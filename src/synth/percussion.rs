//! One-shot drum recipes.
//!
//! Each hit builds a small graph, schedules every source to start now and
//! stop at a fixed offset, and registers a continuation that removes all of
//! its nodes once the longest tail has played. Nothing outlives the hit.

use rand::Rng;

use crate::audio::{AudioEngine, Completion, FilterKind, NodeId, ParamId};
use crate::shared::{PercussionKind, WaveformKind};

// a noise burst plays one second of white noise at most
const NOISE_SECS: f64 = 1.0;

// inharmonic partials of a struck metal plate
const METAL_RATIOS: [f32; 6] = [2.0, 3.0, 4.16, 5.43, 6.79, 8.21];

/// The hi-hat and cymbals are the same recipe with different constants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetalRecipe {
    pub fundamental: f32,
    pub spread: f32, // random extra on the fundamental
    pub bandpass: f32,
    pub highpass: f32,
    pub decay: f64,
    pub stop: f64,
}

impl MetalRecipe {
    pub fn for_kind(kind: PercussionKind) -> Option<MetalRecipe> {
        let recipe = match kind {
            PercussionKind::Hihat => MetalRecipe {
                fundamental: 40.0,
                spread: 0.0,
                bandpass: 10_000.0,
                highpass: 7_000.0,
                decay: 0.3,
                stop: 0.3,
            },
            PercussionKind::Cymbal1 => MetalRecipe {
                fundamental: 50.0,
                spread: 1.0,
                bandpass: 8_000.0,
                highpass: 7_000.0,
                decay: 1.5,
                stop: 2.0,
            },
            PercussionKind::Cymbal2 => MetalRecipe {
                fundamental: 100.0,
                spread: 2.0,
                bandpass: 10_000.0,
                highpass: 7_000.0,
                decay: 1.5,
                stop: 2.0,
            },
            PercussionKind::Cymbal3 => MetalRecipe {
                fundamental: 20.0,
                spread: 1.0,
                bandpass: 5_000.0,
                highpass: 3_000.0,
                decay: 2.5,
                stop: 3.0,
            },
            _ => return None,
        };
        Some(recipe)
    }
}

/// How long a hit of `kind` keeps nodes alive.
pub fn tail_secs(kind: PercussionKind) -> f64 {
    match kind {
        PercussionKind::Kick => 0.5,
        PercussionKind::Snare => 0.2,
        PercussionKind::Tom1 => 0.3,
        PercussionKind::Tom2 => 0.2,
        PercussionKind::Tom3 => 1.5,
        metal => MetalRecipe::for_kind(metal).map_or(0.0, |m| m.stop),
    }
}

// Collects every node a hit creates so they can all be torn down together.
struct Hit<'a> {
    engine: &'a mut AudioEngine,
    now: f64,
    nodes: Vec<NodeId>,
}

impl<'a> Hit<'a> {
    fn new(engine: &'a mut AudioEngine) -> Self {
        let now = engine.current_time();
        Self { engine, now, nodes: Vec::with_capacity(16) }
    }

    fn random(&mut self) -> f32 {
        self.engine.rng().gen_range(0.0..1.0)
    }

    fn keep(&mut self, id: NodeId) -> NodeId {
        self.nodes.push(id);
        id
    }

    fn gain(&mut self, value: f32) -> NodeId {
        let id = self.engine.create_gain(value);
        self.set(id, ParamId::Gain, value, 0.0);
        self.keep(id)
    }

    fn filter(&mut self, kind: FilterKind, frequency: f32) -> NodeId {
        let id = self.engine.create_filter(kind, frequency);
        self.keep(id)
    }

    fn osc(&mut self, waveform: WaveformKind, frequency: f32, stop: f64) -> NodeId {
        let id = self.engine.create_oscillator(waveform, frequency);
        self.set(id, ParamId::Frequency, frequency, 0.0);
        self.play(id, stop);
        self.keep(id)
    }

    fn noise(&mut self, stop: f64) -> NodeId {
        let id = self.engine.create_noise(NOISE_SECS);
        self.play(id, stop);
        self.keep(id)
    }

    fn play(&mut self, id: NodeId, stop: f64) {
        self.engine.start_at(id, self.now);
        self.engine.stop_at(id, self.now + stop);
    }

    fn chain(&mut self, nodes: &[NodeId]) {
        for pair in nodes.windows(2) {
            self.engine.connect(pair[0], pair[1]);
        }
    }

    fn set(&mut self, id: NodeId, param: ParamId, value: f32, offset: f64) {
        if let Some(p) = self.engine.param_mut(id, param) {
            p.set_value_at_time(value, self.now + offset);
        }
    }

    fn exp(&mut self, id: NodeId, param: ParamId, value: f32, offset: f64) {
        if let Some(p) = self.engine.param_mut(id, param) {
            p.exponential_ramp_to_value_at_time(value, self.now + offset);
        }
    }

    fn linear(&mut self, id: NodeId, param: ParamId, value: f32, offset: f64) {
        if let Some(p) = self.engine.param_mut(id, param) {
            p.linear_ramp_to_value_at_time(value, self.now + offset);
        }
    }

    fn finish(self, tail: f64) -> Completion {
        let done = Completion::at_time(self.now + tail);
        let nodes = self.nodes;
        self.engine.then(done, move |engine| {
            for id in nodes {
                engine.remove(id);
            }
        });
        done
    }
}

/// Plays one hit of `kind` into `destination`. The returned completion
/// marks when the hit's nodes are torn down.
pub fn trigger(kind: PercussionKind, engine: &mut AudioEngine, destination: NodeId) -> Completion {
    let mut hit = Hit::new(engine);
    match kind {
        PercussionKind::Kick => kick(&mut hit, destination),
        PercussionKind::Snare => snare(&mut hit, destination),
        PercussionKind::Tom1 => tom1(&mut hit, destination),
        PercussionKind::Tom2 => tom2(&mut hit, destination),
        PercussionKind::Tom3 => tom3(&mut hit, destination),
        metal => {
            if let Some(recipe) = MetalRecipe::for_kind(metal) {
                metallic(&mut hit, destination, recipe);
            }
        }
    }
    log::debug!("{kind:?} hit, {} nodes", hit.nodes.len());
    hit.finish(tail_secs(kind))
}

fn kick(hit: &mut Hit, destination: NodeId) {
    let osc_mix = hit.gain(0.5);
    let noise_mix = hit.gain(5.0);
    hit.engine.connect(osc_mix, destination);
    hit.engine.connect(noise_mix, destination);

    // body: a fixed and a randomly coloured sine, both diving in pitch
    let color = 100.0 + 100.0 * hit.random();
    let body = hit.osc(WaveformKind::Sine, 150.0, 0.5);
    let colored = hit.osc(WaveformKind::Sine, color, 0.5);
    hit.exp(body, ParamId::Frequency, 0.001, 0.5);
    hit.exp(colored, ParamId::Frequency, 0.001, 0.5);

    let env = hit.gain(1.0);
    hit.exp(env, ParamId::Gain, 0.001, 0.5);
    hit.chain(&[body, env, osc_mix]);
    hit.engine.connect(colored, env);

    // click: low-passed noise with a very short envelope
    let noise = hit.noise(0.5);
    let lowpass = hit.filter(FilterKind::Lowpass, 100.0);
    let noise_env = hit.gain(1.0);
    hit.exp(noise_env, ParamId::Gain, 0.001, 0.1);
    hit.chain(&[noise, lowpass, noise_env, noise_mix]);
}

fn snare(hit: &mut Hit, destination: NodeId) {
    let mix = hit.gain(0.4);
    hit.engine.connect(mix, destination);

    let noise = hit.noise(0.2);
    let highpass = hit.filter(FilterKind::Highpass, 1000.0);
    let noise_env = hit.gain(1.0);
    hit.exp(noise_env, ParamId::Gain, 0.01, 0.2);
    hit.chain(&[noise, highpass, noise_env, mix]);

    let pitch = 100.0 + 15.0 * hit.random();
    let body = hit.osc(WaveformKind::Triangle, pitch, 0.2);
    let body_env = hit.gain(0.7);
    hit.exp(body_env, ParamId::Gain, 0.01, 0.1);
    hit.chain(&[body, body_env, mix]);
}

fn metallic(hit: &mut Hit, destination: NodeId, recipe: MetalRecipe) {
    let mix = hit.gain(2.0);
    hit.engine.connect(mix, destination);

    let bandpass = hit.filter(FilterKind::Bandpass, recipe.bandpass);
    let highpass = hit.filter(FilterKind::Highpass, recipe.highpass);
    let env = hit.gain(0.00001);
    hit.chain(&[bandpass, highpass, env, mix]);

    let fundamental = recipe.fundamental + recipe.spread * hit.random();
    for ratio in METAL_RATIOS {
        let osc = hit.osc(WaveformKind::Square, fundamental * ratio, recipe.stop);
        hit.engine.connect(osc, bandpass);
    }

    hit.exp(env, ParamId::Gain, 1.0, 0.02);
    hit.exp(env, ParamId::Gain, 0.3, 0.03);
    hit.exp(env, ParamId::Gain, 0.00001, recipe.decay);
}

fn tom1(hit: &mut Hit, destination: NodeId) {
    let mix = hit.gain(3.0);
    hit.engine.connect(mix, destination);

    let pitch = 150.0 + hit.random();
    let osc = hit.osc(WaveformKind::Triangle, pitch, 0.3);
    let highpass = hit.filter(FilterKind::Highpass, 1500.0);
    let env = hit.gain(1.0);
    hit.exp(env, ParamId::Gain, 0.01, 0.3);
    hit.chain(&[osc, highpass, env, mix]);
}

fn tom2(hit: &mut Hit, destination: NodeId) {
    let mix = hit.gain(3.0);
    hit.engine.connect(mix, destination);

    let pitch = 120.0 + 5.0 * hit.random();
    let osc = hit.osc(WaveformKind::Triangle, pitch, 0.2);
    hit.exp(osc, ParamId::Frequency, 80.0, 0.1);
    let highpass = hit.filter(FilterKind::Highpass, 1500.0);
    let env = hit.gain(2.0);
    hit.exp(env, ParamId::Gain, 0.01, 0.2);
    hit.chain(&[osc, highpass, env, mix]);
}

fn tom3(hit: &mut Hit, destination: NodeId) {
    let mix = hit.gain(1.0);
    hit.engine.connect(mix, destination);

    let cutoff = 300.0 + 20.0 * hit.random();
    let lowpass = hit.filter(FilterKind::Lowpass, cutoff);
    hit.set(lowpass, ParamId::Frequency, cutoff, 0.0);
    hit.linear(lowpass, ParamId::Frequency, 50.0, 0.5);

    let pitch = 50.0 + hit.random();
    let osc = hit.osc(WaveformKind::Triangle, pitch, 1.5);
    let env = hit.gain(1.0);
    hit.exp(env, ParamId::Gain, 0.001, 1.5);
    hit.chain(&[osc, lowpass, env, mix]);

    // soft noise layer for the attack
    let noise_mix = hit.gain(0.2);
    hit.engine.connect(noise_mix, destination);
    let noise = hit.noise(1.5);
    let noise_lowpass = hit.filter(FilterKind::Lowpass, 500.0);
    let noise_env = hit.gain(0.5);
    hit.exp(noise_env, ParamId::Gain, 0.001, 0.5);
    hit.chain(&[noise, noise_lowpass, noise_env, noise_mix]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (AudioEngine, NodeId) {
        let mut engine = AudioEngine::with_seed(48_000, 11);
        let bus = engine.create_gain(1.0);
        engine.connect(bus, engine.master());
        (engine, bus)
    }

    #[test]
    fn every_hit_makes_sound_and_cleans_up() {
        for kind in PercussionKind::ALL {
            let (mut engine, bus) = setup();
            let baseline = engine.node_count();
            let done = trigger(kind, &mut engine, bus);
            assert!(engine.node_count() > baseline, "{kind:?} built nothing");
            assert!((done.at() - tail_secs(kind)).abs() < 1e-9);

            let out = engine.run_for(0.05);
            assert!(out.iter().any(|s| s.abs() > 1e-4), "{kind:?} is silent");

            engine.run_for(tail_secs(kind));
            assert_eq!(engine.node_count(), baseline, "{kind:?} leaked nodes");
            assert_eq!(engine.pending_tasks(), 0);
        }
    }

    #[test]
    fn metal_kinds_share_one_recipe() {
        let metals: Vec<_> = PercussionKind::ALL
            .into_iter()
            .filter_map(MetalRecipe::for_kind)
            .collect();
        assert_eq!(metals.len(), 4);
        assert!(MetalRecipe::for_kind(PercussionKind::Kick).is_none());

        let cymbal3 = MetalRecipe::for_kind(PercussionKind::Cymbal3).unwrap();
        assert_eq!(cymbal3.decay, 2.5);
        assert_eq!(tail_secs(PercussionKind::Cymbal3), 3.0);
    }

    #[test]
    fn hihat_builds_six_partials() {
        let (mut engine, bus) = setup();
        let baseline = engine.node_count();
        trigger(PercussionKind::Hihat, &mut engine, bus);
        // mix, band-pass, high-pass, envelope and six oscillators
        assert_eq!(engine.node_count() - baseline, 10);
    }

    #[test]
    fn overlapping_hits_tear_down_independently() {
        let (mut engine, bus) = setup();
        let baseline = engine.node_count();
        trigger(PercussionKind::Kick, &mut engine, bus);
        let after_kick = engine.node_count();
        trigger(PercussionKind::Cymbal3, &mut engine, bus);

        engine.run_for(0.6);
        let remaining = engine.node_count();
        assert!(remaining < after_kick + 10);
        assert!(remaining > baseline);

        engine.run_for(3.0);
        assert_eq!(engine.node_count(), baseline);
    }
}

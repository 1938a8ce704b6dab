//! Processing nodes for the scheduled graph.
//!
//! Every node renders one mono quantum at a time. Sources ignore their input;
//! everything else reads the sum of its upstream nodes.

use crossbeam_channel::Sender;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::convolver::PartitionedConvolver;
use super::filter::BiquadCoeffs;
use super::param::Param;
use crate::shared::WaveformKind;

pub const QUANTUM: usize = 128;

#[derive(Clone, Copy, Debug)]
pub struct ProcessContext {
    /// Engine time of the first frame in this quantum, in seconds.
    pub start_time: f64,
    pub sample_rate: f32,
}

impl ProcessContext {
    #[inline]
    pub fn time_of(&self, frame: usize) -> f64 {
        self.start_time + frame as f64 / self.sample_rate as f64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamId {
    Gain,
    Frequency,
    Detune,
}

/// A node in the audio graph.
pub trait Node: Send {
    fn process(&mut self, ctx: &ProcessContext, input: &[f32], output: &mut [f32]);

    fn param(&self, _id: ParamId) -> Option<&Param> {
        None
    }

    fn param_mut(&mut self, _id: ParamId) -> Option<&mut Param> {
        None
    }

    // sources only
    fn start(&mut self, _at: f64) {}
    fn stop(&mut self, _at: f64) {}

    /// Swaps in new convolution state. Nodes that don't convolve hand it back.
    fn install_convolver(
        &mut self,
        conv: Box<PartitionedConvolver>,
    ) -> Result<(), Box<PartitionedConvolver>> {
        Err(conv)
    }
}

// start/stop window shared by the source nodes
#[derive(Clone, Copy, Debug)]
struct Playing {
    start_at: f64,
    stop_at: f64,
}

impl Playing {
    fn idle() -> Self {
        Self {
            start_at: f64::INFINITY,
            stop_at: f64::INFINITY,
        }
    }

    #[inline]
    fn is_sounding(&self, t: f64) -> bool {
        t >= self.start_at && t < self.stop_at
    }
}

// ── Oscillator ─────────────────────────────────────────────────────

pub struct Oscillator {
    waveform: WaveformKind,
    frequency: Param,
    detune: Param,
    phase: f32,
    playing: Playing,
    freq_buf: [f32; QUANTUM],
    detune_buf: [f32; QUANTUM],
}

impl Oscillator {
    pub fn new(waveform: WaveformKind, frequency: f32, now: f64) -> Self {
        Self {
            waveform,
            frequency: Param::new(frequency, now),
            detune: Param::new(0.0, now),
            phase: 0.0,
            playing: Playing::idle(),
            freq_buf: [0.0; QUANTUM],
            detune_buf: [0.0; QUANTUM],
        }
    }
}

impl Node for Oscillator {
    fn process(&mut self, ctx: &ProcessContext, _input: &[f32], output: &mut [f32]) {
        let frames = output.len().min(QUANTUM);
        self.frequency.prune(ctx.start_time);
        self.detune.prune(ctx.start_time);
        self.frequency.fill(ctx.start_time, ctx.sample_rate, &mut self.freq_buf[..frames]);
        self.detune.fill(ctx.start_time, ctx.sample_rate, &mut self.detune_buf[..frames]);

        // detune only moves on controller input, so cache the ratio
        let mut last_cents = f32::NAN;
        let mut ratio = 1.0;
        for (i, out) in output.iter_mut().enumerate().take(frames) {
            if !self.playing.is_sounding(ctx.time_of(i)) {
                *out = 0.0;
                continue;
            }
            let cents = self.detune_buf[i];
            if cents != last_cents {
                ratio = 2.0_f32.powf(cents / 1200.0);
                last_cents = cents;
            }
            *out = self.waveform.sample(self.phase);
            let inc = self.freq_buf[i] * ratio / ctx.sample_rate;
            self.phase = (self.phase + inc).rem_euclid(1.0);
        }
    }

    fn param(&self, id: ParamId) -> Option<&Param> {
        match id {
            ParamId::Frequency => Some(&self.frequency),
            ParamId::Detune => Some(&self.detune),
            ParamId::Gain => None,
        }
    }

    fn param_mut(&mut self, id: ParamId) -> Option<&mut Param> {
        match id {
            ParamId::Frequency => Some(&mut self.frequency),
            ParamId::Detune => Some(&mut self.detune),
            ParamId::Gain => None,
        }
    }

    fn start(&mut self, at: f64) {
        self.playing.start_at = at;
    }

    fn stop(&mut self, at: f64) {
        self.playing.stop_at = at;
    }
}

// ── Noise ──────────────────────────────────────────────────────────

/// White noise that runs for `length` seconds after it starts, like a
/// one-shot noise buffer.
pub struct Noise {
    rng: SmallRng,
    length: f64,
    playing: Playing,
}

impl Noise {
    pub fn new(seed: u64, length: f64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            length,
            playing: Playing::idle(),
        }
    }
}

impl Node for Noise {
    fn process(&mut self, ctx: &ProcessContext, _input: &[f32], output: &mut [f32]) {
        let end = self.playing.stop_at.min(self.playing.start_at + self.length);
        for (i, out) in output.iter_mut().enumerate() {
            let t = ctx.time_of(i);
            *out = if t >= self.playing.start_at && t < end {
                self.rng.gen_range(-1.0..1.0)
            } else {
                0.0
            };
        }
    }

    fn start(&mut self, at: f64) {
        self.playing.start_at = at;
    }

    fn stop(&mut self, at: f64) {
        self.playing.stop_at = at;
    }
}

// ── Gain ───────────────────────────────────────────────────────────

pub struct Gain {
    gain: Param,
    gain_buf: [f32; QUANTUM],
}

impl Gain {
    pub fn new(gain: f32, now: f64) -> Self {
        Self {
            gain: Param::new(gain, now),
            gain_buf: [0.0; QUANTUM],
        }
    }
}

impl Node for Gain {
    fn process(&mut self, ctx: &ProcessContext, input: &[f32], output: &mut [f32]) {
        let frames = output.len().min(QUANTUM);
        self.gain.prune(ctx.start_time);
        self.gain.fill(ctx.start_time, ctx.sample_rate, &mut self.gain_buf[..frames]);
        for ((out, x), g) in output.iter_mut().zip(input).zip(&self.gain_buf[..frames]) {
            *out = x * g;
        }
    }

    fn param(&self, id: ParamId) -> Option<&Param> {
        (id == ParamId::Gain).then_some(&self.gain)
    }

    fn param_mut(&mut self, id: ParamId) -> Option<&mut Param> {
        (id == ParamId::Gain).then_some(&mut self.gain)
    }
}

// ── Biquad ─────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    Lowpass,
    Highpass,
    Bandpass,
}

// butterworth for low/high-pass
const PASS_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;
const BAND_Q: f64 = 1.0;

pub struct Biquad {
    kind: FilterKind,
    frequency: Param,
    coeffs: BiquadCoeffs,
    coeff_freq: f32,
    coeff_rate: f32,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
    freq_buf: [f32; QUANTUM],
}

impl Biquad {
    pub fn new(kind: FilterKind, frequency: f32, now: f64) -> Self {
        Self {
            kind,
            frequency: Param::new(frequency, now),
            coeffs: BiquadCoeffs::identity(),
            coeff_freq: f32::NAN,
            coeff_rate: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
            freq_buf: [0.0; QUANTUM],
        }
    }

    fn update_coeffs(&mut self, freq: f32, sample_rate: f32) {
        if freq == self.coeff_freq && sample_rate == self.coeff_rate {
            return;
        }
        self.coeff_freq = freq;
        self.coeff_rate = sample_rate;
        let sr = sample_rate as f64;
        let cutoff = (freq as f64).clamp(10.0, sr * 0.49);
        self.coeffs = match self.kind {
            FilterKind::Lowpass => BiquadCoeffs::lowpass(cutoff, PASS_Q, sr),
            FilterKind::Highpass => BiquadCoeffs::highpass(cutoff, PASS_Q, sr),
            FilterKind::Bandpass => BiquadCoeffs::bandpass(cutoff, BAND_Q, sr),
        };
    }
}

impl Node for Biquad {
    fn process(&mut self, ctx: &ProcessContext, input: &[f32], output: &mut [f32]) {
        let frames = output.len().min(QUANTUM);
        self.frequency.prune(ctx.start_time);
        self.frequency.fill(ctx.start_time, ctx.sample_rate, &mut self.freq_buf[..frames]);
        for i in 0..frames {
            self.update_coeffs(self.freq_buf[i], ctx.sample_rate);
            let c = self.coeffs;
            let x = input.get(i).copied().unwrap_or(0.0) as f64;
            let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
            self.x2 = self.x1;
            self.x1 = x;
            self.y2 = self.y1;
            self.y1 = y;
            output[i] = y as f32;
        }
    }

    fn param(&self, id: ParamId) -> Option<&Param> {
        (id == ParamId::Frequency).then_some(&self.frequency)
    }

    fn param_mut(&mut self, id: ParamId) -> Option<&mut Param> {
        (id == ParamId::Frequency).then_some(&mut self.frequency)
    }
}

// ── Convolver ──────────────────────────────────────────────────────

// swaps that can ring out at once before `tails` has to grow
const TAIL_SLOTS: usize = 4;

/// Convolution reverb node. With nothing installed it outputs silence.
///
/// Installing new state doesn't cut the old one off: the previous convolver
/// keeps running on silence until its tail has rung out, so the wet signal
/// never drops out during a swap. Finished convolvers are sent to `retire`
/// so their buffers are freed off the audio thread.
pub struct Convolver {
    active: Option<Box<PartitionedConvolver>>,
    tails: Vec<(Box<PartitionedConvolver>, usize)>,
    retire: Option<Sender<Box<PartitionedConvolver>>>,
}

impl Default for Convolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Convolver {
    pub fn new() -> Self {
        Self {
            active: None,
            tails: Vec::with_capacity(TAIL_SLOTS),
            retire: None,
        }
    }

    pub fn with_retire(retire: Sender<Box<PartitionedConvolver>>) -> Self {
        Self {
            retire: Some(retire),
            ..Self::new()
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.active.is_some()
    }

    pub fn ringing_tails(&self) -> usize {
        self.tails.len()
    }

    // a full retire queue keeps the rest for the next quantum
    fn retire_finished(&mut self) {
        while let Some(pos) = self.tails.iter().position(|(_, remaining)| *remaining == 0) {
            let (conv, _) = self.tails.swap_remove(pos);
            let Some(retire) = self.retire.as_ref() else {
                continue;
            };
            if let Err(e) = retire.try_send(conv) {
                self.tails.push((e.into_inner(), 0));
                return;
            }
        }
    }
}

impl Node for Convolver {
    fn process(&mut self, _ctx: &ProcessContext, input: &[f32], output: &mut [f32]) {
        output.fill(0.0);
        if let Some(conv) = self.active.as_mut() {
            if conv.kernel().block() == output.len() && input.len() == output.len() {
                conv.process_block(input, output);
            }
        }

        let silence = [0.0; QUANTUM];
        for (conv, remaining) in self.tails.iter_mut() {
            if conv.kernel().block() == output.len() && output.len() <= QUANTUM {
                conv.process_block(&silence[..output.len()], output);
            }
            *remaining = remaining.saturating_sub(1);
        }
        self.retire_finished();
    }

    fn install_convolver(
        &mut self,
        conv: Box<PartitionedConvolver>,
    ) -> Result<(), Box<PartitionedConvolver>> {
        if let Some(old) = self.active.replace(conv) {
            let blocks = old.kernel().tail_blocks();
            self.tails.push((old, blocks));
            self.retire_finished();
        }
        Ok(())
    }
}

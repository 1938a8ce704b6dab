use crate::audio::{AudioEngine, Completion, NodeId, ParamId};
use crate::error::CoreError;
use crate::shared::WaveformKind;

use super::pitch::is_playable;
use super::ramp::{EPSILON, ramp_gain};

pub const DEFAULT_ATTACK_SECS: f64 = 0.03;

/// Rejects detune that would leave the oscillator without a real pitch.
pub fn check_detune(frequency: f32, cents: f32) -> Result<(), CoreError> {
    if cents.is_finite() {
        Ok(())
    } else {
        Err(CoreError::InvalidFrequency { freq: frequency * (cents / 1200.0).exp2() })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Starting,
    Sustaining,
    Stopping,
    Disposed,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteSpec {
    pub waveform: WaveformKind,
    pub frequency: f32,
    pub detune_cents: f32,
    pub gain: f32,
}

#[derive(Clone, Copy, Debug)]
struct VoiceNodes {
    osc: NodeId,
    gain: NodeId,
}

/// One oscillator and its gain stage. Starts once, stops once.
#[derive(Debug)]
pub struct Voice {
    waveform: WaveformKind,
    base_frequency: f32,
    detune_cents: f32,
    target_gain: f32,
    state: VoiceState,
    attack: f64,
    nodes: Option<VoiceNodes>,
    settles: Option<Completion>, // end of the current start/stop ramp
}

impl Voice {
    pub fn new(waveform: WaveformKind, attack: f64) -> Self {
        Self {
            waveform,
            base_frequency: 0.0,
            detune_cents: 0.0,
            target_gain: 0.0,
            state: VoiceState::Idle,
            attack,
            nodes: None,
            settles: None,
        }
    }

    pub fn waveform(&self) -> WaveformKind {
        self.waveform
    }

    pub fn base_frequency(&self) -> f32 {
        self.base_frequency
    }

    pub fn detune_cents(&self) -> f32 {
        self.detune_cents
    }

    pub fn target_gain(&self) -> f32 {
        self.target_gain
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        matches!(self.state, VoiceState::Starting | VoiceState::Sustaining)
    }

    // (oscillator, gain stage) while the voice owns nodes
    pub fn nodes(&self) -> Option<(NodeId, NodeId)> {
        self.nodes.map(|n| (n.osc, n.gain))
    }

    pub fn start(
        &mut self,
        engine: &mut AudioEngine,
        destination: NodeId,
        spec: NoteSpec,
    ) -> Result<(), CoreError> {
        if self.state != VoiceState::Idle {
            log::debug!("{:?} voice already {:?}, start ignored", self.waveform, self.state);
            return Ok(());
        }
        if !is_playable(spec.frequency) {
            return Err(CoreError::InvalidFrequency { freq: spec.frequency });
        }
        check_detune(spec.frequency, spec.detune_cents)?;

        let now = engine.current_time();
        let osc = engine.create_oscillator(self.waveform, spec.frequency);
        if let Some(detune) = engine.param_mut(osc, ParamId::Detune) {
            detune.set_value_at_time(spec.detune_cents, now);
        }
        let gain = engine.create_gain(EPSILON);
        engine.connect(osc, gain);
        engine.connect(gain, destination);
        engine.start_at(osc, now);

        self.settles = Some(ramp_gain(engine, gain, spec.gain, now, self.attack));
        self.nodes = Some(VoiceNodes { osc, gain });
        self.base_frequency = spec.frequency;
        self.detune_cents = spec.detune_cents;
        self.target_gain = spec.gain;
        self.state = VoiceState::Starting;
        Ok(())
    }

    // detune is a continuous controller: applied at once, no ramp
    pub fn update_detune(
        &mut self,
        engine: &mut AudioEngine,
        cents: f32,
    ) -> Result<(), CoreError> {
        if !self.is_live() {
            return Ok(());
        }
        check_detune(self.base_frequency, cents)?;
        self.detune_cents = cents;
        let Some(nodes) = self.nodes else { return Ok(()) };
        let now = engine.current_time();
        match engine.param_mut(nodes.osc, ParamId::Detune) {
            Some(detune) => detune.set_value_at_time(cents, now),
            None => log::warn!("voice oscillator {:?} is gone", nodes.osc),
        }
        Ok(())
    }

    /// Fades out over the attack window, then stops the oscillator and
    /// removes both nodes.
    pub fn stop(&mut self, engine: &mut AudioEngine) {
        if !self.is_live() {
            return;
        }
        let Some(nodes) = self.nodes else { return };
        let now = engine.current_time();
        let done = ramp_gain(engine, nodes.gain, 0.0, now, self.attack);
        engine.stop_at(nodes.osc, done.at());
        engine.then(done, move |engine| {
            engine.remove(nodes.osc);
            engine.remove(nodes.gain);
        });
        self.settles = Some(done);
        self.state = VoiceState::Stopping;
    }

    /// Moves the state machine along once pending ramps have finished.
    pub fn refresh(&mut self, engine: &AudioEngine) {
        let settled = self.settles.is_some_and(|c| engine.is_complete(c));
        match self.state {
            VoiceState::Starting if settled => self.state = VoiceState::Sustaining,
            VoiceState::Stopping if settled => {
                self.state = VoiceState::Disposed;
                self.nodes = None;
            }
            _ => {}
        }
    }
}

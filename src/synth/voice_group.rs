use crate::audio::{AudioEngine, NodeId};
use crate::error::CoreError;
use crate::shared::{WaveformKind, WaveformSet};

use super::pitch::is_playable;
use super::voice::{NoteSpec, Voice, VoiceState, check_detune};

/// The voices sounding for one pressed pad: at most one per waveform kind.
#[derive(Debug)]
pub struct PadVoiceGroup {
    live: [Option<Voice>; 4], // indexed by WaveformKind::index
    releasing: Vec<Voice>,
    attack: f64,
}

impl PadVoiceGroup {
    pub fn new(attack: f64) -> Self {
        Self {
            live: Default::default(),
            releasing: Vec::new(),
            attack,
        }
    }

    /// Starts a voice for each enabled kind that isn't already sounding.
    /// Loudness is split across the enabled set so adding waveforms doesn't
    /// make the note louder. Returns how many voices were started.
    pub fn trigger(
        &mut self,
        engine: &mut AudioEngine,
        destination: NodeId,
        waveforms: WaveformSet,
        frequency: f32,
        detune_cents: f32,
    ) -> Result<usize, CoreError> {
        self.reap(engine);
        if !is_playable(frequency) {
            return Err(CoreError::InvalidFrequency { freq: frequency });
        }
        check_detune(frequency, detune_cents)?;

        let count = waveforms.len() as f32;
        let mut started = 0;
        for kind in waveforms.iter() {
            let slot = &mut self.live[kind.index()];
            if slot.is_some() {
                log::debug!("{kind:?} already sounding, retrigger ignored");
                continue;
            }
            let mut voice = Voice::new(kind, self.attack);
            let spec = NoteSpec {
                waveform: kind,
                frequency,
                detune_cents,
                gain: kind.mix_weight() / count,
            };
            voice.start(engine, destination, spec)?;
            *slot = Some(voice);
            started += 1;
        }
        Ok(started)
    }

    pub fn release(&mut self, engine: &mut AudioEngine) {
        for slot in self.live.iter_mut() {
            if let Some(mut voice) = slot.take() {
                voice.stop(engine);
                self.releasing.push(voice);
            }
        }
    }

    pub fn update_detune(
        &mut self,
        engine: &mut AudioEngine,
        cents: f32,
    ) -> Result<(), CoreError> {
        for voice in self.live.iter_mut().flatten() {
            voice.update_detune(engine, cents)?;
        }
        Ok(())
    }

    /// Advances voice states and forgets voices whose teardown has finished.
    pub fn reap(&mut self, engine: &AudioEngine) {
        for voice in self.live.iter_mut().flatten() {
            voice.refresh(engine);
        }
        for voice in self.releasing.iter_mut() {
            voice.refresh(engine);
        }
        self.releasing.retain(|v| v.state() != VoiceState::Disposed);
    }

    pub fn voice(&self, kind: WaveformKind) -> Option<&Voice> {
        self.live[kind.index()].as_ref()
    }

    pub fn live_voices(&self) -> impl Iterator<Item = &Voice> {
        self.live.iter().flatten()
    }

    pub fn live_count(&self) -> usize {
        self.live_voices().count()
    }

    pub fn releasing_count(&self) -> usize {
        self.releasing.len()
    }

    pub fn is_silent(&self) -> bool {
        self.live_count() == 0 && self.releasing.is_empty()
    }
}

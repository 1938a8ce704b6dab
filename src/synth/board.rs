use crate::audio::{AudioEngine, NodeId};
use crate::config::BoardConfig;
use crate::error::CoreError;
use crate::shared::{BoardId, PADS_PER_BOARD, WaveformKind, WaveformSet};

use super::controller::ControllerPosition;
use super::pitch::PitchTable;
use super::reverb::ReverbBus;
use super::voice::check_detune;
use super::voice_group::PadVoiceGroup;

/// Runtime state of one pad board: its reverb bus, a voice group per pad,
/// the controller position and the waveforms pads play with.
pub struct PadBoard {
    id: BoardId,
    reverb: ReverbBus,
    groups: [PadVoiceGroup; PADS_PER_BOARD],
    position: ControllerPosition,
    waveforms: WaveformSet,
    base_note: i32,
}

impl PadBoard {
    pub fn new(
        id: BoardId,
        engine: &mut AudioEngine,
        destination: NodeId,
        config: &BoardConfig,
        attack: f64,
        mix_ramp: f64,
    ) -> Self {
        Self {
            id,
            reverb: ReverbBus::new(engine, destination, &config.bus(), mix_ramp),
            groups: std::array::from_fn(|_| PadVoiceGroup::new(attack)),
            position: ControllerPosition::CENTER,
            waveforms: WaveformSet::all(),
            base_note: config.base_note,
        }
    }

    pub fn id(&self) -> BoardId {
        self.id
    }

    pub fn reverb(&self) -> &ReverbBus {
        &self.reverb
    }

    pub fn reverb_mut(&mut self) -> &mut ReverbBus {
        &mut self.reverb
    }

    pub fn group(&self, pad: u8) -> Option<&PadVoiceGroup> {
        self.groups.get(pad as usize)
    }

    pub fn position(&self) -> ControllerPosition {
        self.position
    }

    pub fn detune_cents(&self) -> f32 {
        self.position.detune_cents()
    }

    pub fn base_note(&self) -> i32 {
        self.base_note
    }

    pub fn live_voices(&self) -> usize {
        self.groups.iter().map(|g| g.live_count()).sum()
    }

    /// Plays `note_index` on `pad` with an explicit waveform set and detune.
    pub fn trigger_note(
        &mut self,
        engine: &mut AudioEngine,
        pitch: &PitchTable,
        pad: u8,
        note_index: i32,
        waveforms: WaveformSet,
        detune_cents: f32,
    ) -> Result<usize, CoreError> {
        let destination = self.reverb.input();
        let Some(group) = self.groups.get_mut(pad as usize) else {
            log::warn!("board {:?} has no pad {pad}", self.id);
            return Ok(0);
        };
        let frequency = pitch.frequency_of(note_index);
        group.trigger(engine, destination, waveforms, frequency, detune_cents)
    }

    /// Plays a pad the way the board is currently set up: base note plus the
    /// pad's offset, the enabled waveforms and the controller's detune.
    pub fn press_pad(
        &mut self,
        engine: &mut AudioEngine,
        pitch: &PitchTable,
        pad: u8,
    ) -> Result<usize, CoreError> {
        let note = self.base_note + pad as i32;
        let (waveforms, detune) = (self.waveforms, self.detune_cents());
        self.trigger_note(engine, pitch, pad, note, waveforms, detune)
    }

    pub fn release_note(&mut self, engine: &mut AudioEngine, pad: u8) {
        match self.groups.get_mut(pad as usize) {
            Some(group) => group.release(engine),
            None => log::warn!("board {:?} has no pad {pad}", self.id),
        }
    }

    /// Retunes every sounding voice on the board. A position without a
    /// finite bend is refused and the board keeps its current one.
    pub fn set_controller_position(
        &mut self,
        engine: &mut AudioEngine,
        position: ControllerPosition,
    ) -> Result<(), CoreError> {
        let cents = position.detune_cents();
        check_detune(0.0, cents)?;
        self.position = position;
        for group in self.groups.iter_mut() {
            group.update_detune(engine, cents)?;
        }
        Ok(())
    }

    // only affects pads pressed afterwards
    pub fn toggle_waveform(&mut self, kind: WaveformKind) {
        self.waveforms.toggle(kind);
    }

    pub fn set_base_note(&mut self, note: i32) {
        self.base_note = note;
    }

    pub fn reap(&mut self, engine: &AudioEngine) {
        for group in self.groups.iter_mut() {
            group.reap(engine);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::voice::DEFAULT_ATTACK_SECS;

    fn setup() -> (AudioEngine, PadBoard, PitchTable) {
        let mut engine = AudioEngine::with_seed(48_000, 2);
        let master = engine.master();
        let board = PadBoard::new(
            BoardId(0),
            &mut engine,
            master,
            &BoardConfig::default(),
            DEFAULT_ATTACK_SECS,
            0.05,
        );
        (engine, board, PitchTable::default())
    }

    #[test]
    fn press_uses_base_note_and_board_state() {
        let (mut engine, mut board, pitch) = setup();
        board.toggle_waveform(WaveformKind::Square);
        board.toggle_waveform(WaveformKind::Sawtooth);
        board.set_base_note(57);

        let started = board.press_pad(&mut engine, &pitch, 0).unwrap();
        assert_eq!(started, 2);
        let group = board.group(0).unwrap();
        let sine = group.voice(WaveformKind::Sine).unwrap();
        assert!((sine.base_frequency() - 220.0).abs() < 1e-3);
        assert!(group.voice(WaveformKind::Square).is_none());
    }

    #[test]
    fn controller_retunes_live_voices() {
        let (mut engine, mut board, pitch) = setup();
        board.press_pad(&mut engine, &pitch, 3).unwrap();
        board.press_pad(&mut engine, &pitch, 7).unwrap();
        board.set_controller_position(&mut engine, ControllerPosition::new(1.0, 0.0)).unwrap();

        for pad in [3, 7] {
            let group = board.group(pad).unwrap();
            assert!(group.live_voices().all(|v| v.detune_cents() == 700.0));
        }

        // pads pressed later pick up the current bend
        board.press_pad(&mut engine, &pitch, 5).unwrap();
        let group = board.group(5).unwrap();
        assert!(group.live_voices().all(|v| v.detune_cents() == 700.0));
    }

    #[test]
    fn non_finite_position_keeps_the_current_bend() {
        let (mut engine, mut board, pitch) = setup();
        board.press_pad(&mut engine, &pitch, 2).unwrap();
        board.set_controller_position(&mut engine, ControllerPosition::new(0.0, 1.0)).unwrap();

        let raw = ControllerPosition { x: f32::NAN, y: 0.0 };
        assert!(board.set_controller_position(&mut engine, raw).is_err());
        assert_eq!(board.detune_cents(), 1200.0);
        let group = board.group(2).unwrap();
        assert!(group.live_voices().all(|v| v.detune_cents() == 1200.0));

        // later presses still get a real pitch
        assert_eq!(board.press_pad(&mut engine, &pitch, 6).unwrap(), 4);
    }

    #[test]
    fn unknown_pad_is_ignored() {
        let (mut engine, mut board, pitch) = setup();
        assert_eq!(board.press_pad(&mut engine, &pitch, 40).unwrap(), 0);
        board.release_note(&mut engine, 40);
        assert_eq!(board.live_voices(), 0);
    }

    #[test]
    fn release_silences_only_that_pad() {
        let (mut engine, mut board, pitch) = setup();
        board.press_pad(&mut engine, &pitch, 0).unwrap();
        board.press_pad(&mut engine, &pitch, 4).unwrap();
        board.release_note(&mut engine, 0);
        assert_eq!(board.group(0).unwrap().live_count(), 0);
        assert_eq!(board.group(4).unwrap().live_count(), 4);

        engine.run_for(0.1);
        board.reap(&engine);
        assert!(board.group(0).unwrap().is_silent());
    }
}

//! Everything that lives on the audio thread.
//!
//! The instrument owns the engine, two pad boards (each with its own reverb
//! bus) and the drum bus. Commands from the control side are applied between
//! buffers by [`Instrument::handle_cmd`].

use crate::audio::{AudioEngine, Completion, PartitionedConvolver, RequestId, StereoFrame};
use crate::audio_api::AudioCommand;
use crate::config::InstrumentConfig;
use crate::error::CoreError;
use crate::shared::{BoardId, BusId, NUM_BOARDS, PadId, PercussionKind, WaveformKind, WaveformSet};
use crate::synth::{ControllerPosition, PadBoard, PitchTable, ReverbBus, percussion};

pub struct Instrument {
    engine: AudioEngine,
    pitch: PitchTable,
    boards: [PadBoard; NUM_BOARDS],
    drums: ReverbBus,
}

impl Instrument {
    pub fn new(config: &InstrumentConfig) -> Self {
        let mut engine = match config.seed {
            Some(seed) => AudioEngine::with_seed(config.sample_rate, seed),
            None => AudioEngine::new(config.sample_rate),
        };
        let master = engine.master();
        let attack = config.attack_secs();
        let ramp = config.mix_ramp_secs();

        let boards = std::array::from_fn(|i| {
            PadBoard::new(BoardId(i as u8), &mut engine, master, &config.board, attack, ramp)
        });
        let drums = ReverbBus::new(&mut engine, master, &config.percussion, ramp);

        Self {
            engine,
            pitch: PitchTable::new(config.reference_index, config.reference_frequency),
            boards,
            drums,
        }
    }

    pub fn engine(&self) -> &AudioEngine {
        &self.engine
    }

    pub fn board(&self, id: BoardId) -> Option<&PadBoard> {
        self.boards.get(id.0 as usize)
    }

    pub fn bus(&self, bus: BusId) -> Option<&ReverbBus> {
        match bus {
            BusId::Board(id) => self.board(id).map(|b| b.reverb()),
            BusId::Percussion => Some(&self.drums),
        }
    }

    // ── notes ──

    pub fn trigger_note(
        &mut self,
        pad: PadId,
        note_index: i32,
        waveforms: WaveformSet,
        detune_cents: f32,
    ) -> Result<usize, CoreError> {
        let Some(board) = board_slot(&mut self.boards, pad.board) else {
            return Ok(0);
        };
        let pitch = &self.pitch;
        board.trigger_note(&mut self.engine, pitch, pad.index, note_index, waveforms, detune_cents)
    }

    pub fn press_pad(&mut self, pad: PadId) -> Result<usize, CoreError> {
        let Some(board) = board_slot(&mut self.boards, pad.board) else {
            return Ok(0);
        };
        board.press_pad(&mut self.engine, &self.pitch, pad.index)
    }

    pub fn release_note(&mut self, pad: PadId) {
        if let Some(board) = board_slot(&mut self.boards, pad.board) {
            board.release_note(&mut self.engine, pad.index);
        }
    }

    pub fn set_controller_position(
        &mut self,
        board: BoardId,
        position: ControllerPosition,
    ) -> Result<(), CoreError> {
        match board_slot(&mut self.boards, board) {
            Some(b) => b.set_controller_position(&mut self.engine, position),
            None => Ok(()),
        }
    }

    pub fn toggle_waveform(&mut self, board: BoardId, kind: WaveformKind) {
        if let Some(b) = board_slot(&mut self.boards, board) {
            b.toggle_waveform(kind);
        }
    }

    pub fn set_base_note(&mut self, board: BoardId, note: i32) {
        if let Some(b) = board_slot(&mut self.boards, board) {
            b.set_base_note(note);
        }
    }

    pub fn trigger_percussion(&mut self, kind: PercussionKind) -> Completion {
        percussion::trigger(kind, &mut self.engine, self.drums.input())
    }

    // ── reverb ──

    pub fn set_reverb_wet_gain(&mut self, bus: BusId, value: f32) {
        let Some(reverb) = bus_slot(&mut self.boards, &mut self.drums, bus) else { return };
        reverb.set_wet_gain(&mut self.engine, value);
    }

    pub fn set_reverb_dry_gain(&mut self, bus: BusId, value: f32) {
        let Some(reverb) = bus_slot(&mut self.boards, &mut self.drums, bus) else { return };
        reverb.set_dry_gain(&mut self.engine, value);
    }

    pub fn set_reverb_enabled(&mut self, bus: BusId, enabled: bool) {
        let Some(reverb) = bus_slot(&mut self.boards, &mut self.drums, bus) else { return };
        reverb.set_enabled(&mut self.engine, enabled);
    }

    pub fn begin_impulse_request(&mut self, bus: BusId, id: RequestId) {
        if let Some(reverb) = bus_slot(&mut self.boards, &mut self.drums, bus) {
            reverb.begin_impulse_request(id);
        }
    }

    pub fn install_impulse(
        &mut self,
        bus: BusId,
        id: RequestId,
        convolver: Box<PartitionedConvolver>,
        loudness: f32,
    ) -> bool {
        let Some(reverb) = bus_slot(&mut self.boards, &mut self.drums, bus) else {
            self.engine.retire(convolver);
            return false;
        };
        reverb.set_impulse_response(&mut self.engine, id, convolver, loudness)
    }

    // ── audio thread ──

    pub fn handle_cmd(&mut self, cmd: AudioCommand) {
        match cmd {
            AudioCommand::TriggerNote { pad, note_index, waveforms, detune_cents } => {
                if let Err(e) = self.trigger_note(pad, note_index, waveforms, detune_cents) {
                    log::debug!("{pad:?} not triggered: {e}");
                }
            }
            AudioCommand::PressPad(pad) => {
                if let Err(e) = self.press_pad(pad) {
                    log::debug!("{pad:?} not triggered: {e}");
                }
            }
            AudioCommand::ReleaseNote(pad) => self.release_note(pad),
            AudioCommand::SetControllerPosition { board, position } => {
                if let Err(e) = self.set_controller_position(board, position) {
                    log::debug!("{board:?} controller unchanged: {e}");
                }
            }
            AudioCommand::TriggerPercussion(kind) => {
                self.trigger_percussion(kind);
            }
            AudioCommand::SetReverbWetGain { bus, value } => self.set_reverb_wet_gain(bus, value),
            AudioCommand::SetReverbDryGain { bus, value } => self.set_reverb_dry_gain(bus, value),
            AudioCommand::SetReverbEnabled { bus, enabled } => {
                self.set_reverb_enabled(bus, enabled)
            }
            AudioCommand::ToggleWaveform { board, kind } => self.toggle_waveform(board, kind),
            AudioCommand::SetBaseNote { board, note } => self.set_base_note(board, note),
            AudioCommand::BeginImpulseRequest { bus, id } => self.begin_impulse_request(bus, id),
            AudioCommand::InstallImpulse { bus, id, convolver, loudness } => {
                self.install_impulse(bus, id, convolver, loudness);
            }
        }
    }

    pub fn render_block(&mut self, out: &mut [StereoFrame]) {
        self.engine.render_block(out);
        for board in self.boards.iter_mut() {
            board.reap(&self.engine);
        }
    }

    /// Renders `seconds` offline and returns the left channel.
    pub fn run_for(&mut self, seconds: f64) -> Vec<f32> {
        let frames = (seconds * self.engine.sample_rate() as f64).ceil().max(0.0) as usize;
        let mut out = vec![StereoFrame::zero(); frames];
        self.render_block(&mut out);
        out.into_iter().map(|f| f.left).collect()
    }
}

// borrow only the boards, the engine stays free for the caller
fn board_slot(boards: &mut [PadBoard; NUM_BOARDS], id: BoardId) -> Option<&mut PadBoard> {
    let board = boards.get_mut(id.0 as usize);
    if board.is_none() {
        log::warn!("no board {id:?}");
    }
    board
}

fn bus_slot<'a>(
    boards: &'a mut [PadBoard; NUM_BOARDS],
    drums: &'a mut ReverbBus,
    bus: BusId,
) -> Option<&'a mut ReverbBus> {
    match bus {
        BusId::Board(id) => board_slot(boards, id).map(|b| b.reverb_mut()),
        BusId::Percussion => Some(drums),
    }
}

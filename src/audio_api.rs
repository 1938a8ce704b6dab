pub use crate::audio::{PartitionedConvolver, RequestId};
use crate::shared::{BoardId, BusId, PadId, PercussionKind, WaveformKind, WaveformSet};
use crate::synth::ControllerPosition;

#[derive(Debug)]
pub enum AudioCommand {
    TriggerNote {
        pad: PadId,
        note_index: i32,
        waveforms: WaveformSet,
        detune_cents: f32,
    },
    // plays the pad with its board's base note, waveforms and detune
    PressPad(PadId),
    ReleaseNote(PadId),
    SetControllerPosition { board: BoardId, position: ControllerPosition },
    TriggerPercussion(PercussionKind),

    SetReverbWetGain { bus: BusId, value: f32 },
    SetReverbDryGain { bus: BusId, value: f32 },
    SetReverbEnabled { bus: BusId, enabled: bool },

    ToggleWaveform { board: BoardId, kind: WaveformKind },
    SetBaseNote { board: BoardId, note: i32 },

    // Impulse responses are decoded off the audio thread. The request id is
    // registered first so a slower, older decode can't land on top of a
    // newer one.
    BeginImpulseRequest { bus: BusId, id: RequestId },
    InstallImpulse {
        bus: BusId,
        id: RequestId,
        convolver: Box<PartitionedConvolver>,
        loudness: f32,
    },
}

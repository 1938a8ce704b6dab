// ids, enums and constants shared between the control side and the audio thread.
//
// Layout of one board (12 pads, indexed 0-11 as semitones above the board's base note):
//
//   1   3       8   10        (flats / sharps)
//     0   4   7   11          (1 / 3 / 5 / 7)
//       2   5   6   9         (2 / 4 / 5- / 6)
//
// Two boards can play at once (left hand / right hand), each with its own reverb bus.
// Percussion has a bus of its own.

use serde::{Deserialize, Serialize};

pub const NUM_BOARDS: usize = 2;
pub const PADS_PER_BOARD: usize = 12;

// playable band for pitched voices, percussion literals are exempt
pub const MIN_FREQUENCY: f32 = 20.0;
pub const MAX_FREQUENCY: f32 = 20_000.0;

// C2
pub const DEFAULT_BASE_NOTE: i32 = 36;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoardId(pub u8);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PadId {
    pub board: BoardId,
    pub index: u8, // 0..PADS_PER_BOARD
}

impl PadId {
    pub fn new(board: u8, index: u8) -> Self {
        Self { board: BoardId(board), index }
    }
}

// which reverb bus a mix command targets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BusId {
    Board(BoardId),
    Percussion,
}

impl From<BoardId> for BusId {
    fn from(board: BoardId) -> Self {
        BusId::Board(board)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveformKind {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl WaveformKind {
    pub const ALL: [WaveformKind; 4] = [
        WaveformKind::Sine,
        WaveformKind::Square,
        WaveformKind::Sawtooth,
        WaveformKind::Triangle,
    ];

    pub fn index(self) -> usize {
        match self {
            WaveformKind::Sine => 0,
            WaveformKind::Square => 1,
            WaveformKind::Sawtooth => 2,
            WaveformKind::Triangle => 3,
        }
    }

    // Relative loudness of each waveform in a pad's blend. Square and saw carry
    // far more harmonics, so they sit much lower than sine and triangle.
    pub fn mix_weight(self) -> f32 {
        match self {
            WaveformKind::Sine | WaveformKind::Triangle => 1.0,
            WaveformKind::Square | WaveformKind::Sawtooth => 0.15,
        }
    }

    // phase in [0, 1)
    #[inline]
    pub fn sample(self, phase: f32) -> f32 {
        match self {
            WaveformKind::Sine => (phase * std::f32::consts::TAU).sin(),
            WaveformKind::Square => {
                if phase < 0.5 { 1.0 } else { -1.0 }
            }
            WaveformKind::Sawtooth => 2.0 * phase - 1.0,
            WaveformKind::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

/// Fixed-size set of enabled waveforms, one bit per [`WaveformKind`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct WaveformSet(u8);

impl WaveformSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(0b1111)
    }

    pub fn only(kind: WaveformKind) -> Self {
        Self(1 << kind.index())
    }

    pub fn contains(self, kind: WaveformKind) -> bool {
        self.0 & (1 << kind.index()) != 0
    }

    pub fn insert(&mut self, kind: WaveformKind) {
        self.0 |= 1 << kind.index();
    }

    pub fn remove(&mut self, kind: WaveformKind) {
        self.0 &= !(1 << kind.index());
    }

    pub fn toggle(&mut self, kind: WaveformKind) {
        self.0 ^= 1 << kind.index();
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = WaveformKind> {
        WaveformKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl FromIterator<WaveformKind> for WaveformSet {
    fn from_iter<I: IntoIterator<Item = WaveformKind>>(iter: I) -> Self {
        let mut set = WaveformSet::empty();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PercussionKind {
    Kick,
    Snare,
    Hihat,
    Cymbal1,
    Cymbal2,
    Cymbal3,
    Tom1,
    Tom2,
    Tom3,
}

impl PercussionKind {
    pub const ALL: [PercussionKind; 9] = [
        PercussionKind::Kick,
        PercussionKind::Snare,
        PercussionKind::Hihat,
        PercussionKind::Cymbal1,
        PercussionKind::Cymbal2,
        PercussionKind::Cymbal3,
        PercussionKind::Tom1,
        PercussionKind::Tom2,
        PercussionKind::Tom3,
    ];
}

// one impulse response per reverb character
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpulseKind {
    SmallRoom,
    LargeHall,
    Bathroom,
    Pipe,
}

impl ImpulseKind {
    pub const ALL: [ImpulseKind; 4] = [
        ImpulseKind::SmallRoom,
        ImpulseKind::LargeHall,
        ImpulseKind::Bathroom,
        ImpulseKind::Pipe,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            ImpulseKind::SmallRoom => "IR_basement.wav",
            ImpulseKind::LargeHall => "IR_church.wav",
            ImpulseKind::Bathroom => "IR_bathroom.wav",
            ImpulseKind::Pipe => "IR_pipe.wav",
        }
    }

    // the bathroom and pipe recordings are much quieter than the rooms
    pub fn loudness_factor(self) -> f32 {
        match self {
            ImpulseKind::SmallRoom | ImpulseKind::LargeHall => 1.0,
            ImpulseKind::Bathroom | ImpulseKind::Pipe => 5.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waveform_set_membership_and_toggle() {
        let mut set = WaveformSet::empty();
        assert!(set.is_empty());
        set.insert(WaveformKind::Sine);
        set.insert(WaveformKind::Square);
        assert_eq!(set.len(), 2);
        assert!(set.contains(WaveformKind::Square));
        assert!(!set.contains(WaveformKind::Triangle));

        set.toggle(WaveformKind::Square);
        assert!(!set.contains(WaveformKind::Square));
        set.toggle(WaveformKind::Triangle);
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![WaveformKind::Sine, WaveformKind::Triangle]
        );

        set.remove(WaveformKind::Sine);
        assert_eq!(set, WaveformSet::only(WaveformKind::Triangle));
        assert_eq!(WaveformSet::all().len(), 4);
    }

    #[test]
    fn waveform_shapes_stay_in_range() {
        for kind in WaveformKind::ALL {
            for i in 0..100 {
                let s = kind.sample(i as f32 / 100.0);
                assert!((-1.0..=1.0).contains(&s), "{kind:?} produced {s}");
            }
        }
        assert_eq!(WaveformKind::Triangle.sample(0.5), 1.0);
        assert_eq!(WaveformKind::Sawtooth.sample(0.0), -1.0);
    }
}

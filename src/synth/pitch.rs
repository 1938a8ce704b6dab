//! 12-tone equal temperament.

use crate::shared::{MAX_FREQUENCY, MIN_FREQUENCY};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Note {
    pub index: i32,
    pub frequency: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PitchTable {
    reference_index: i32,
    reference_frequency: f32,
}

impl Default for PitchTable {
    // MIDI numbering, A4 = 69 = 440 Hz
    fn default() -> Self {
        Self::new(69, 440.0)
    }
}

impl PitchTable {
    pub fn new(reference_index: i32, reference_frequency: f32) -> Self {
        Self { reference_index, reference_frequency }
    }

    pub fn frequency_of(&self, note_index: i32) -> f32 {
        let semitones = (note_index as f64 - self.reference_index as f64) / 12.0;
        (self.reference_frequency as f64 * semitones.exp2()) as f32
    }

    pub fn note(&self, index: i32) -> Note {
        Note { index, frequency: self.frequency_of(index) }
    }
}

/// Whether a pitched voice may play at `freq`.
pub fn is_playable(freq: f32) -> bool {
    (MIN_FREQUENCY..=MAX_FREQUENCY).contains(&freq)
}

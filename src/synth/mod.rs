mod board;
mod controller;
mod mapper;
pub mod percussion;
mod pitch;
mod ramp;
mod reverb;
pub mod voice;
mod voice_group;

pub use board::PadBoard;
pub use controller::{ControllerPosition, FIFTH_CENTS, OCTAVE_CENTS};
pub use mapper::{Vec2, clamp_magnitude, disc_to_square, square_to_disc};
pub use pitch::{Note, PitchTable, is_playable};
pub use ramp::{EPSILON, ramp_gain};
pub use reverb::ReverbBus;
pub use voice::{NoteSpec, Voice, VoiceState};
pub use voice_group::PadVoiceGroup;

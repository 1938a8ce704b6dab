//! Pad-and-drum instrument core: a scheduled audio graph, pad voices with
//! a pitch controller, synthesized percussion and convolution reverb buses.

pub mod audio;
pub mod audio_api;
pub mod config;
pub mod error;
pub mod instrument;
pub mod loader;
pub mod shared;
pub mod synth;

pub use audio::{AudioHandle, start_audio};
pub use audio_api::AudioCommand;
pub use config::{InstrumentConfig, load_config};
pub use error::CoreError;
pub use instrument::Instrument;

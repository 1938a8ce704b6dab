// instrument settings, read once at startup from an optional json file
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::shared::{DEFAULT_BASE_NOTE, ImpulseKind};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub dry: f32,
    pub wet: f32,
    pub impulse: Option<ImpulseKind>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            dry: 0.5,
            wet: 0.2,
            impulse: Some(ImpulseKind::SmallRoom),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub dry: f32,
    pub wet: f32,
    pub impulse: Option<ImpulseKind>,
    pub base_note: i32,
}

impl BoardConfig {
    pub fn bus(&self) -> BusConfig {
        BusConfig {
            dry: self.dry,
            wet: self.wet,
            impulse: self.impulse,
        }
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        let bus = BusConfig::default();
        Self {
            dry: bus.dry,
            wet: bus.wet,
            impulse: bus.impulse,
            base_note: DEFAULT_BASE_NOTE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    pub sample_rate: u32,
    pub ir_dir: PathBuf,
    pub attack_ms: f32,
    pub mix_ramp_ms: f32,
    pub reference_index: i32,
    pub reference_frequency: f32,
    pub board: BoardConfig,
    pub percussion: BusConfig,
    // None seeds the noise generators from entropy
    pub seed: Option<u64>,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            ir_dir: PathBuf::from("IR"),
            attack_ms: 30.0,
            mix_ramp_ms: 50.0,
            reference_index: 69,
            reference_frequency: 440.0,
            board: BoardConfig::default(),
            // drums sit almost dry
            percussion: BusConfig {
                wet: 0.06,
                ..BusConfig::default()
            },
            seed: None,
        }
    }
}

impl InstrumentConfig {
    pub fn attack_secs(&self) -> f64 {
        self.attack_ms as f64 / 1000.0
    }

    pub fn mix_ramp_secs(&self) -> f64 {
        self.mix_ramp_ms as f64 / 1000.0
    }

    pub fn from_json(data: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(data)?)
    }
}

// Missing or unreadable files give None so callers can fall back to defaults.
pub fn load_config(path: &Path) -> Option<InstrumentConfig> {
    let data = std::fs::read_to_string(path).ok()?;
    match InstrumentConfig::from_json(&data) {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!("ignoring {}: {e}", path.display());
            None
        }
    }
}

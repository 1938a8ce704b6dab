//! Convolution reverb send bus.
//!
//! ```text
//! input ─┬─> dry ────────────────────────┬─> destination
//!        └─> convolver ─> wet ─> loudness ┘
//! ```
//!
//! Every level change is a ramp. Turning the reverb off ramps the wet stage
//! to zero and leaves the convolver connected, so turning it back on is
//! immediate and returns to the stored wet level.

use crate::audio::{AudioEngine, NodeId, PartitionedConvolver, RequestId};
use crate::config::BusConfig;

use super::ramp::ramp_gain;

pub struct ReverbBus {
    input: NodeId,
    dry: NodeId,
    convolver: NodeId,
    wet: NodeId,
    loudness: NodeId,
    dry_level: f32,
    wet_level: f32,
    loudness_factor: f32,
    enabled: bool,
    ramp: f64,
    latest_request: RequestId,
    installed: Option<RequestId>,
}

fn unit_level(v: f32) -> Option<f32> {
    v.is_finite().then(|| v.clamp(0.0, 1.0))
}

impl ReverbBus {
    pub fn new(
        engine: &mut AudioEngine,
        destination: NodeId,
        config: &BusConfig,
        ramp: f64,
    ) -> Self {
        let input = engine.create_gain(1.0);
        let dry = engine.create_gain(0.0);
        let convolver = engine.create_convolver();
        let wet = engine.create_gain(0.0);
        let loudness = engine.create_gain(1.0);

        engine.connect(input, dry);
        engine.connect(dry, destination);
        engine.connect(input, convolver);
        engine.connect(convolver, wet);
        engine.connect(wet, loudness);
        engine.connect(loudness, destination);

        let mut bus = Self {
            input,
            dry,
            convolver,
            wet,
            loudness,
            dry_level: 0.0,
            wet_level: 0.0,
            loudness_factor: 1.0,
            enabled: true,
            ramp,
            latest_request: RequestId::default(),
            installed: None,
        };
        bus.set_dry_gain(engine, config.dry);
        bus.set_wet_gain(engine, config.wet);
        bus
    }

    /// Where voices and percussion connect.
    pub fn input(&self) -> NodeId {
        self.input
    }

    pub fn dry_node(&self) -> NodeId {
        self.dry
    }

    pub fn wet_node(&self) -> NodeId {
        self.wet
    }

    pub fn loudness_node(&self) -> NodeId {
        self.loudness
    }

    pub fn convolver_node(&self) -> NodeId {
        self.convolver
    }

    pub fn dry_level(&self) -> f32 {
        self.dry_level
    }

    pub fn wet_level(&self) -> f32 {
        self.wet_level
    }

    pub fn loudness_factor(&self) -> f32 {
        self.loudness_factor
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn has_impulse_response(&self) -> bool {
        self.installed.is_some()
    }

    pub fn installed_request(&self) -> Option<RequestId> {
        self.installed
    }

    pub fn latest_request(&self) -> RequestId {
        self.latest_request
    }

    pub fn set_dry_gain(&mut self, engine: &mut AudioEngine, value: f32) {
        let Some(level) = unit_level(value) else {
            log::warn!("ignoring dry gain {value}");
            return;
        };
        self.dry_level = level;
        let now = engine.current_time();
        ramp_gain(engine, self.dry, level, now, self.ramp);
    }

    // stored even while disabled, so enabling picks it up
    pub fn set_wet_gain(&mut self, engine: &mut AudioEngine, value: f32) {
        let Some(level) = unit_level(value) else {
            log::warn!("ignoring wet gain {value}");
            return;
        };
        self.wet_level = level;
        if self.enabled {
            let now = engine.current_time();
            ramp_gain(engine, self.wet, level, now, self.ramp);
        }
    }

    pub fn set_enabled(&mut self, engine: &mut AudioEngine, enabled: bool) {
        if enabled == self.enabled {
            return;
        }
        self.enabled = enabled;
        let target = if enabled { self.wet_level } else { 0.0 };
        let now = engine.current_time();
        ramp_gain(engine, self.wet, target, now, self.ramp);
    }

    pub fn toggle(&mut self, engine: &mut AudioEngine) -> bool {
        self.set_enabled(engine, !self.enabled);
        self.enabled
    }

    /// Records `id` as the newest impulse-response request for this bus.
    /// Anything older that arrives later is dropped.
    pub fn begin_impulse_request(&mut self, id: RequestId) {
        if id > self.latest_request {
            self.latest_request = id;
        }
    }

    /// Installs a prepared convolver if `id` is still the newest request.
    /// The previous response keeps ringing out its tail, and the loudness
    /// stage ramps to the new compensation factor.
    pub fn set_impulse_response(
        &mut self,
        engine: &mut AudioEngine,
        id: RequestId,
        conv: Box<PartitionedConvolver>,
        loudness: f32,
    ) -> bool {
        if id < self.latest_request {
            log::warn!(
                "dropping stale impulse response {id:?}, newest is {:?}",
                self.latest_request
            );
            engine.retire(conv);
            return false;
        }
        self.latest_request = id;
        if !engine.install_convolver(self.convolver, conv) {
            log::warn!("reverb convolver {:?} is gone", self.convolver);
            return false;
        }
        let loudness = if loudness.is_finite() && loudness > 0.0 { loudness } else { 1.0 };
        let now = engine.current_time();
        ramp_gain(engine, self.loudness, loudness, now, self.ramp);
        self.loudness_factor = loudness;
        self.installed = Some(id);
        log::info!("installed impulse response {id:?} (loudness x{loudness})");
        true
    }
}

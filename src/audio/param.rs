//! Automatable node parameters.
//!
//! A [`Param`] holds a timeline of scheduled value changes, evaluated per
//! sample while the graph renders. Times are absolute engine seconds.
//! Ramps interpolate from the previous event (or the anchor, which stands in
//! for events that already completed) to the ramp's own time and value.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RampKind {
    Set,
    Linear,
    Exponential,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamEvent {
    pub time: f64,
    pub value: f32,
    pub kind: RampKind,
}

#[derive(Clone, Debug)]
pub struct Param {
    anchor_time: f64,
    anchor_value: f32,
    events: Vec<ParamEvent>,
}

impl Param {
    pub fn new(value: f32, now: f64) -> Self {
        Self {
            anchor_time: now,
            anchor_value: value,
            events: Vec::new(),
        }
    }

    pub fn events(&self) -> &[ParamEvent] {
        &self.events
    }

    // events at the same time keep their insertion order
    fn insert(&mut self, event: ParamEvent) {
        let at = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(at, event);
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(ParamEvent { time, value, kind: RampKind::Set });
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(ParamEvent { time, value, kind: RampKind::Linear });
    }

    pub fn exponential_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(ParamEvent { time, value, kind: RampKind::Exponential });
    }

    /// Drops every event at or after `time` and pins the value the timeline
    /// had at that instant. A ramp that was in flight is cut short so the
    /// curve up to `time` is unchanged.
    pub fn cancel_and_hold_at_time(&mut self, time: f64) {
        let held = self.value_at(time);
        let idx = self.events.partition_point(|e| e.time < time);
        let cut = self
            .events
            .get(idx)
            .filter(|e| e.kind != RampKind::Set && e.time > time)
            .map(|e| e.kind);
        self.events.truncate(idx);
        let kind = cut.unwrap_or(RampKind::Set);
        self.events.push(ParamEvent { time, value: held, kind });
    }

    pub fn value_at(&self, t: f64) -> f32 {
        let idx = self.events.partition_point(|e| e.time <= t);
        let (t0, v0) = match idx.checked_sub(1) {
            Some(prev) => (self.events[prev].time, self.events[prev].value),
            None => (self.anchor_time, self.anchor_value),
        };
        match self.events.get(idx) {
            Some(next) if next.kind != RampKind::Set => {
                interpolate(next.kind, t0, v0, next.time, next.value, t)
            }
            _ => v0,
        }
    }

    /// Value once every scheduled event has played out.
    pub fn final_value(&self) -> f32 {
        self.events.last().map_or(self.anchor_value, |e| e.value)
    }

    pub fn is_automated(&self) -> bool {
        !self.events.is_empty()
    }

    /// Writes one value per frame starting at `start`.
    pub fn fill(&self, start: f64, sample_rate: f32, out: &mut [f32]) {
        if self.events.is_empty() {
            out.fill(self.anchor_value);
            return;
        }
        let dt = 1.0 / sample_rate as f64;
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.value_at(start + i as f64 * dt);
        }
    }

    /// Folds events that finished before `now` into the anchor.
    pub fn prune(&mut self, now: f64) {
        let idx = self.events.partition_point(|e| e.time <= now);
        if idx > 0 {
            let last = self.events[idx - 1];
            self.anchor_time = last.time;
            self.anchor_value = last.value;
            self.events.drain(..idx);
        }
        if self.events.is_empty() {
            self.anchor_time = now;
        }
    }
}

fn interpolate(kind: RampKind, t0: f64, v0: f32, t1: f64, v1: f32, t: f64) -> f32 {
    let span = t1 - t0;
    if span <= 0.0 {
        return v1;
    }
    let frac = ((t - t0) / span).clamp(0.0, 1.0) as f32;
    match kind {
        RampKind::Set => v0,
        RampKind::Linear => v0 + (v1 - v0) * frac,
        // no exponential path through zero or across a sign change
        RampKind::Exponential if v0 * v1 <= 0.0 => v0,
        RampKind::Exponential => v0 * (v1 / v0).powf(frac),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn set_value_steps_at_its_time() {
        let mut p = Param::new(1.0, 0.0);
        p.set_value_at_time(0.5, 1.0);
        assert_eq!(p.value_at(0.999), 1.0);
        assert_eq!(p.value_at(1.0), 0.5);
        assert_eq!(p.value_at(5.0), 0.5);
    }

    #[test]
    fn linear_ramp_runs_from_previous_event() {
        let mut p = Param::new(0.0, 0.0);
        p.set_value_at_time(0.0, 1.0);
        p.linear_ramp_to_value_at_time(1.0, 2.0);
        assert!(close(p.value_at(1.5), 0.5));
        assert!(close(p.value_at(2.0), 1.0));
        assert!(close(p.value_at(3.0), 1.0));
    }

    #[test]
    fn exponential_ramp_is_geometric() {
        let mut p = Param::new(1.0, 0.0);
        p.set_value_at_time(1.0, 0.0);
        p.exponential_ramp_to_value_at_time(0.01, 1.0);
        assert!(close(p.value_at(0.5), 0.1));
        assert!(close(p.value_at(1.0), 0.01));
    }

    #[test]
    fn exponential_from_zero_holds() {
        let mut p = Param::new(0.0, 0.0);
        p.exponential_ramp_to_value_at_time(1.0, 1.0);
        assert_eq!(p.value_at(0.5), 0.0);
        assert_eq!(p.value_at(1.0), 1.0);
    }

    #[test]
    fn cancel_and_hold_cuts_ramp_in_flight() {
        let mut p = Param::new(0.0, 0.0);
        p.set_value_at_time(0.0, 0.0);
        p.linear_ramp_to_value_at_time(1.0, 1.0);
        p.set_value_at_time(5.0, 2.0);
        p.cancel_and_hold_at_time(0.5);

        assert!(close(p.value_at(0.25), 0.25));
        assert!(close(p.value_at(0.5), 0.5));
        assert!(close(p.value_at(3.0), 0.5));
        assert_eq!(p.events().len(), 2);
    }

    #[test]
    fn cancel_after_everything_pins_final_value() {
        let mut p = Param::new(0.2, 0.0);
        p.set_value_at_time(0.7, 0.1);
        p.cancel_and_hold_at_time(1.0);
        assert!(close(p.final_value(), 0.7));
        assert!(close(p.value_at(2.0), 0.7));
    }

    #[test]
    fn prune_keeps_ramp_start() {
        let mut p = Param::new(0.0, 0.0);
        p.set_value_at_time(0.0, 0.0);
        p.linear_ramp_to_value_at_time(1.0, 1.0);
        p.prune(0.5);
        assert!(close(p.value_at(0.75), 0.75));
        p.prune(2.0);
        assert!(!p.is_automated());
        assert_eq!(p.value_at(10.0), 1.0);
    }

    #[test]
    fn fill_samples_the_timeline() {
        let mut p = Param::new(0.0, 0.0);
        p.set_value_at_time(1.0, 2.0 / 4.0);
        let mut out = [9.0; 4];
        p.fill(0.0, 4.0, &mut out);
        assert_eq!(out, [0.0, 0.0, 1.0, 1.0]);
    }
}

use crossbeam_channel::{Receiver, Sender};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

use super::convolver::PartitionedConvolver;
use super::frame::StereoFrame;
use super::graph::{Graph, NodeId};
use super::nodes::{
    Biquad, Convolver, FilterKind, Gain, Node, Noise, Oscillator, ParamId, ProcessContext,
    QUANTUM,
};
use super::param::Param;
use crate::shared::WaveformKind;

/// A point on the engine clock that some scheduled change finishes at.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Completion {
    at: f64,
}

impl Completion {
    pub fn at_time(at: f64) -> Self {
        Self { at }
    }

    pub fn at(self) -> f64 {
        self.at
    }
}

type Task = Box<dyn FnOnce(&mut AudioEngine) + Send>;

// convolvers waiting to be dropped by the control side
const RETIRE_CAPACITY: usize = 16;
const DEFERRED_SLOTS: usize = 256;

struct Deferred {
    at: f64,
    seq: u64,
    task: Task,
}

/// Owns the graph and the sample clock. Lives on the audio thread; every
/// component that schedules sound is handed a `&mut AudioEngine`.
pub struct AudioEngine {
    sample_rate: f32,
    frames: u64, // frames rendered so far
    graph: Graph,
    master: NodeId,
    deferred: Vec<Deferred>,
    next_seq: u64,
    rng: SmallRng,
    block: [f32; QUANTUM],
    block_pos: usize,
    retire_tx: Sender<Box<PartitionedConvolver>>,
    retire_rx: Receiver<Box<PartitionedConvolver>>,
}

impl AudioEngine {
    pub fn new(sample_rate: u32) -> Self {
        Self::build(sample_rate, SmallRng::from_entropy())
    }

    pub fn with_seed(sample_rate: u32, seed: u64) -> Self {
        Self::build(sample_rate, SmallRng::seed_from_u64(seed))
    }

    fn build(sample_rate: u32, rng: SmallRng) -> Self {
        let mut graph = Graph::new();
        let master = graph.add(Box::new(Gain::new(1.0, 0.0)));
        graph.set_output(master);
        let (retire_tx, retire_rx) = crossbeam_channel::bounded(RETIRE_CAPACITY);
        Self {
            sample_rate: sample_rate.max(1) as f32,
            frames: 0,
            graph,
            master,
            deferred: Vec::with_capacity(DEFERRED_SLOTS),
            next_seq: 0,
            rng,
            block: [0.0; QUANTUM],
            block_pos: QUANTUM,
            retire_tx,
            retire_rx,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Engine time in seconds: the start of the next quantum to be rendered.
    pub fn current_time(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    pub fn master(&self) -> NodeId {
        self.master
    }

    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    pub fn node_count(&self) -> usize {
        self.graph.len()
    }

    // ── node factories ──

    fn add(&mut self, node: impl Node + 'static) -> NodeId {
        self.graph.add(Box::new(node))
    }

    pub fn create_oscillator(&mut self, waveform: WaveformKind, frequency: f32) -> NodeId {
        let now = self.current_time();
        self.add(Oscillator::new(waveform, frequency, now))
    }

    pub fn create_noise(&mut self, length: f64) -> NodeId {
        let seed = self.rng.next_u64();
        self.add(Noise::new(seed, length))
    }

    pub fn create_gain(&mut self, gain: f32) -> NodeId {
        let now = self.current_time();
        self.add(Gain::new(gain, now))
    }

    pub fn create_filter(&mut self, kind: FilterKind, frequency: f32) -> NodeId {
        let now = self.current_time();
        self.add(Biquad::new(kind, frequency, now))
    }

    pub fn create_convolver(&mut self) -> NodeId {
        let retire = self.retire_tx.clone();
        self.add(Convolver::with_retire(retire))
    }

    // ── topology ──

    pub fn connect(&mut self, src: NodeId, dst: NodeId) -> bool {
        let ok = self.graph.connect(src, dst);
        if !ok {
            log::warn!("connect {src:?} -> {dst:?}: node missing");
        }
        ok
    }

    pub fn disconnect(&mut self, src: NodeId, dst: NodeId) -> bool {
        self.graph.disconnect(src, dst)
    }

    pub fn is_connected(&self, src: NodeId, dst: NodeId) -> bool {
        self.graph.is_connected(src, dst)
    }

    pub fn remove(&mut self, id: NodeId) -> bool {
        self.graph.remove(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.graph.contains(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&(dyn Node + 'static)> {
        self.graph.node(id)
    }

    pub fn param(&self, id: NodeId, param: ParamId) -> Option<&Param> {
        self.graph.node(id).and_then(|n| n.param(param))
    }

    pub fn param_mut(&mut self, id: NodeId, param: ParamId) -> Option<&mut Param> {
        self.graph.node_mut(id).and_then(|n| n.param_mut(param))
    }

    pub fn start_at(&mut self, id: NodeId, at: f64) {
        match self.graph.node_mut(id) {
            Some(node) => node.start(at),
            None => log::warn!("start on missing node {id:?}"),
        }
    }

    pub fn stop_at(&mut self, id: NodeId, at: f64) {
        match self.graph.node_mut(id) {
            Some(node) => node.stop(at),
            None => log::warn!("stop on missing node {id:?}"),
        }
    }

    pub fn install_convolver(&mut self, id: NodeId, conv: Box<PartitionedConvolver>) -> bool {
        let result = match self.graph.node_mut(id) {
            Some(node) => node.install_convolver(conv),
            None => Err(conv),
        };
        match result {
            Ok(()) => true,
            Err(conv) => {
                self.retire(conv);
                false
            }
        }
    }

    /// Queues a convolver the audio thread is done with. Whoever holds
    /// [`AudioEngine::retired_convolvers`] drops it.
    pub fn retire(&self, conv: Box<PartitionedConvolver>) {
        if let Err(e) = self.retire_tx.try_send(conv) {
            log::warn!("retire queue full, freeing a convolver on the audio thread");
            drop(e.into_inner());
        }
    }

    pub fn retired_convolvers(&self) -> Receiver<Box<PartitionedConvolver>> {
        self.retire_rx.clone()
    }

    // ── deferred work ──

    /// Runs `task` once the clock reaches `completion`, before the quantum
    /// that starts at or after that time is rendered.
    pub fn then<F>(&mut self, completion: Completion, task: F)
    where
        F: FnOnce(&mut AudioEngine) + Send + 'static,
    {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.deferred.push(Deferred { at: completion.at, seq, task: Box::new(task) });
    }

    pub fn is_complete(&self, completion: Completion) -> bool {
        self.current_time() >= completion.at
    }

    pub fn pending_tasks(&self) -> usize {
        self.deferred.len()
    }

    // earliest due task first, ties in registration order
    fn next_due(&self) -> Option<usize> {
        let now = self.current_time();
        self.deferred
            .iter()
            .enumerate()
            .filter(|(_, d)| d.at <= now)
            .min_by(|(_, a), (_, b)| a.at.total_cmp(&b.at).then(a.seq.cmp(&b.seq)))
            .map(|(i, _)| i)
    }

    fn run_due(&mut self) {
        while let Some(i) = self.next_due() {
            let deferred = self.deferred.swap_remove(i);
            (deferred.task)(self);
        }
    }

    // ── rendering ──

    fn render_quantum(&mut self) {
        self.run_due();
        let ctx = ProcessContext {
            start_time: self.current_time(),
            sample_rate: self.sample_rate,
        };
        self.graph.process(&ctx, &mut self.block);
        self.frames += QUANTUM as u64;
        self.run_due();
    }

    /// Fills `out` from the graph, rendering new quanta as needed.
    pub fn render_block(&mut self, out: &mut [StereoFrame]) {
        for frame in out.iter_mut() {
            if self.block_pos == QUANTUM {
                self.render_quantum();
                self.block_pos = 0;
            }
            *frame = StereoFrame::mono(self.block[self.block_pos].clamp(-1.0, 1.0));
            self.block_pos += 1;
        }
    }

    /// Renders `seconds` of audio and returns the left channel.
    pub fn run_for(&mut self, seconds: f64) -> Vec<f32> {
        let frames = (seconds * self.sample_rate as f64).ceil().max(0.0) as usize;
        let mut out = vec![StereoFrame::zero(); frames];
        self.render_block(&mut out);
        out.into_iter().map(|f| f.left).collect()
    }
}

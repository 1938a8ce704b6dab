//! Two-stage partitioned overlap-save convolution.
//!
//! The head of the impulse response is split into blocks of `block` samples,
//! the rest into much larger tail blocks. Each partition is zero-padded to
//! twice its block size and transformed once up front. Input spectra go
//! through a frequency-domain delay line per stage; multiplying them against
//! the partition spectra and transforming back gives the output.
//!
//! The head stage runs every block and covers the first tail block of the
//! response, which is exactly the time the tail stage needs to collect a
//! full block of input. The tail's result for one block therefore lands just
//! as it is due, and output stays aligned with input. The tail's per-block
//! work is spread over the quanta of the block, so only its two transforms
//! fall on a single quantum.
//!
//! A convolver whose input has been silent for longer than its response
//! skips all work until sound comes back.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

// tail blocks are this many head blocks long
const TAIL_RATIO: usize = 32;

const ZERO: Complex<f32> = Complex { re: 0.0, im: 0.0 };

// one uniformly partitioned stage
struct Stage {
    block: usize,
    partitions: Vec<Vec<Complex<f32>>>,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
}

impl Stage {
    fn new(planner: &mut FftPlanner<f32>, impulse: &[f32], block: usize) -> Self {
        let size = block * 2;
        let fft = planner.plan_fft_forward(size);
        let ifft = planner.plan_fft_inverse(size);

        let partitions = impulse
            .chunks(block)
            .map(|chunk| {
                let mut spectrum = vec![ZERO; size];
                for (slot, &s) in spectrum.iter_mut().zip(chunk) {
                    slot.re = s;
                }
                fft.process(&mut spectrum);
                spectrum
            })
            .collect();

        Self { block, partitions, fft, ifft }
    }

    fn scratch_len(&self) -> usize {
        self.fft
            .get_inplace_scratch_len()
            .max(self.ifft.get_inplace_scratch_len())
    }
}

pub struct ConvolutionKernel {
    len: usize,
    head: Stage,
    tail: Option<Stage>,
}

impl ConvolutionKernel {
    pub fn new(impulse: &[f32], block: usize) -> Self {
        let block = block.max(1);
        Self::with_tail_block(impulse, block, block * TAIL_RATIO)
    }

    /// Like [`ConvolutionKernel::new`] with an explicit tail block size,
    /// rounded up to a whole number of blocks.
    pub fn with_tail_block(impulse: &[f32], block: usize, tail_block: usize) -> Self {
        let block = block.max(1);
        let tail_block = tail_block.max(block).div_ceil(block) * block;
        let mut planner = FftPlanner::<f32>::new();

        let split = impulse.len().min(tail_block);
        let head = Stage::new(&mut planner, &impulse[..split], block);
        let tail = (impulse.len() > tail_block)
            .then(|| Stage::new(&mut planner, &impulse[tail_block..], tail_block));

        Self { len: impulse.len(), head, tail }
    }

    pub fn block(&self) -> usize {
        self.head.block
    }

    pub fn tail_block(&self) -> Option<usize> {
        self.tail.as_ref().map(|t| t.block)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn partition_count(&self) -> usize {
        self.head.partitions.len() + self.tail.as_ref().map_or(0, |t| t.partitions.len())
    }

    // blocks of silence it takes for the last input to ring out completely
    pub fn tail_blocks(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.len.div_ceil(self.head.block) + 1
        }
    }

    /// Spectral multiply-adds per block, averaged over a tail block.
    pub fn macs_per_block(&self) -> usize {
        let head = self.head.partitions.len() * 2 * self.head.block;
        let tail = self.tail.as_ref().map_or(0, |t| {
            let steps = t.block / self.head.block;
            t.partitions.len() * 2 * t.block / steps
        });
        head + tail
    }
}

impl fmt::Debug for ConvolutionKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvolutionKernel")
            .field("len", &self.len)
            .field("block", &self.head.block)
            .field("tail_block", &self.tail_block())
            .field("partitions", &self.partition_count())
            .finish()
    }
}

// delay line and accumulator for one stage
struct StageState {
    // previous input block followed by the current one
    window: Vec<f32>,
    // input spectra, newest at `head`
    history: Vec<Vec<Complex<f32>>>,
    head: usize,
    acc: Vec<Complex<f32>>,
    work: Vec<Complex<f32>>,
}

impl StageState {
    fn new(stage: &Stage) -> Self {
        let size = stage.block * 2;
        let depth = stage.partitions.len().max(1);
        Self {
            window: vec![0.0; size],
            history: vec![vec![ZERO; size]; depth],
            head: 0,
            acc: vec![ZERO; size],
            work: vec![ZERO; size],
        }
    }

    fn clear(&mut self) {
        self.window.fill(0.0);
        for spectrum in self.history.iter_mut() {
            spectrum.fill(ZERO);
        }
        self.acc.fill(ZERO);
    }

    // transforms the window into the newest history slot
    fn push(&mut self, stage: &Stage, scratch: &mut [Complex<f32>]) {
        let depth = self.history.len();
        self.head = (self.head + 1) % depth;
        let current = &mut self.history[self.head];
        for (slot, &s) in current.iter_mut().zip(&self.window) {
            *slot = Complex::new(s, 0.0);
        }
        stage.fft.process_with_scratch(current, scratch);
    }

    // partition j meets the spectrum pushed `j - lag` blocks ago
    fn accumulate(&mut self, stage: &Stage, parts: Range<usize>, lag: usize) {
        let depth = self.history.len();
        for j in parts {
            let spectrum = &self.history[(self.head + depth - (j - lag)) % depth];
            for ((a, x), h) in self.acc.iter_mut().zip(spectrum).zip(&stage.partitions[j]) {
                *a += x * h;
            }
        }
    }

    // adds the second half of the inverse transform into `out`
    fn finish(&mut self, stage: &Stage, scratch: &mut [Complex<f32>], out: &mut [f32]) {
        self.work.copy_from_slice(&self.acc);
        stage.ifft.process_with_scratch(&mut self.work, scratch);
        self.acc.fill(ZERO);

        // rustfft leaves the inverse unnormalized
        let norm = 1.0 / (2 * stage.block) as f32;
        for (o, y) in out.iter_mut().zip(&self.work[stage.block..]) {
            *o += y.re * norm;
        }
    }
}

struct TailState {
    state: StageState,
    // input samples collected into the current tail block
    filled: usize,
    // tail output for the block being played
    out: Vec<f32>,
}

impl TailState {
    fn new(stage: &Stage) -> Self {
        Self {
            state: StageState::new(stage),
            filled: 0,
            out: vec![0.0; stage.block],
        }
    }

    fn clear(&mut self) {
        self.state.clear();
        self.filled = 0;
        self.out.fill(0.0);
    }

    fn process(
        &mut self,
        stage: &Stage,
        input: &[f32],
        output: &mut [f32],
        scratch: &mut [Complex<f32>],
    ) {
        let block = input.len();
        let tail = stage.block;
        let at = self.filled;

        for (o, y) in output.iter_mut().zip(&self.out[at..at + block]) {
            *o += y;
        }
        self.state.window[tail + at..tail + at + block].copy_from_slice(input);

        // older partitions only need spectra we already have
        let parts = stage.partitions.len();
        let chunk = parts.saturating_sub(1).div_ceil(tail / block);
        let step = at / block;
        let from = (1 + step * chunk).min(parts);
        let to = (1 + (step + 1) * chunk).min(parts);
        self.state.accumulate(stage, from..to, 1);

        self.filled += block;
        if self.filled == tail {
            self.filled = 0;
            self.state.push(stage, scratch);
            self.state.accumulate(stage, 0..parts.min(1), 0);
            self.out.fill(0.0);
            self.state.finish(stage, scratch, &mut self.out);
            self.state.window.copy_within(tail.., 0);
        }
    }
}

/// Running convolution state for one kernel. All buffers are allocated in
/// [`PartitionedConvolver::new`], so `process_block` never allocates.
pub struct PartitionedConvolver {
    kernel: Arc<ConvolutionKernel>,
    head: StageState,
    tail: Option<TailState>,
    scratch: Vec<Complex<f32>>,
    silent_blocks: usize,
}

impl PartitionedConvolver {
    pub fn new(kernel: Arc<ConvolutionKernel>) -> Self {
        let scratch_len = kernel
            .head
            .scratch_len()
            .max(kernel.tail.as_ref().map_or(0, Stage::scratch_len));
        Self {
            head: StageState::new(&kernel.head),
            tail: kernel.tail.as_ref().map(TailState::new),
            scratch: vec![ZERO; scratch_len],
            silent_blocks: 0,
            kernel,
        }
    }

    pub fn kernel(&self) -> &Arc<ConvolutionKernel> {
        &self.kernel
    }

    /// True once the input has been silent long enough that the output is
    /// silent too and blocks are skipped.
    pub fn is_idle(&self) -> bool {
        self.silent_blocks > self.kernel.tail_blocks()
    }

    fn reset(&mut self) {
        self.head.clear();
        if let Some(tail) = self.tail.as_mut() {
            tail.clear();
        }
    }

    /// Convolves one block of input and adds the result into `output`.
    /// Both slices must be exactly one block long.
    pub fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        let block = self.kernel.head.block;
        debug_assert_eq!(input.len(), block);
        debug_assert_eq!(output.len(), block);
        if self.kernel.is_empty() {
            return;
        }

        if input.iter().all(|s| *s == 0.0) {
            self.silent_blocks = self.silent_blocks.saturating_add(1);
            if self.is_idle() {
                return;
            }
        } else {
            if self.is_idle() {
                self.reset();
            }
            self.silent_blocks = 0;
        }

        let kernel = &self.kernel;
        self.head.window.copy_within(block.., 0);
        self.head.window[block..].copy_from_slice(input);
        self.head.push(&kernel.head, &mut self.scratch);
        self.head.accumulate(&kernel.head, 0..kernel.head.partitions.len(), 0);
        self.head.finish(&kernel.head, &mut self.scratch, output);

        if let (Some(stage), Some(tail)) = (kernel.tail.as_ref(), self.tail.as_mut()) {
            tail.process(stage, input, output, &mut self.scratch);
        }
    }
}

impl fmt::Debug for PartitionedConvolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionedConvolver")
            .field("kernel", &self.kernel)
            .field("idle", &self.is_idle())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(signal: &[f32], impulse: &[f32]) -> Vec<f32> {
        let mut out = vec![0.0; signal.len()];
        for (n, slot) in out.iter_mut().enumerate() {
            for (k, &h) in impulse.iter().enumerate() {
                if k <= n {
                    *slot += signal[n - k] * h;
                }
            }
        }
        out
    }

    fn run(conv: &mut PartitionedConvolver, signal: &[f32], block: usize) -> Vec<f32> {
        let mut out = vec![0.0; signal.len()];
        for (inp, outp) in signal.chunks(block).zip(out.chunks_mut(block)) {
            conv.process_block(inp, outp);
        }
        out
    }

    fn assert_close(got: &[f32], want: &[f32]) {
        for (i, (g, w)) in got.iter().zip(want).enumerate() {
            assert!((g - w).abs() < 1e-4, "sample {i}: {g} vs {w}");
        }
    }

    #[test]
    fn matches_direct_convolution() {
        let block = 8;
        let impulse: Vec<f32> = (0..21).map(|i| ((i * 7 % 5) as f32 - 2.0) * 0.1).collect();
        let signal: Vec<f32> = (0..64).map(|i| ((i * 3 % 11) as f32 - 5.0) * 0.05).collect();

        let kernel = Arc::new(ConvolutionKernel::new(&impulse, block));
        assert_eq!(kernel.partition_count(), 3);
        assert_eq!(kernel.tail_block(), None);
        let mut conv = PartitionedConvolver::new(kernel);
        let got = run(&mut conv, &signal, block);
        assert_close(&got, &direct(&signal, &impulse));
    }

    #[test]
    fn long_response_matches_direct_convolution_across_stages() {
        let block = 4;
        let impulse: Vec<f32> = (0..100).map(|i| ((i * 13 % 7) as f32 - 3.0) * 0.05).collect();
        let signal: Vec<f32> = (0..256).map(|i| ((i * 5 % 9) as f32 - 4.0) * 0.05).collect();

        let kernel = Arc::new(ConvolutionKernel::with_tail_block(&impulse, block, 16));
        assert_eq!(kernel.tail_block(), Some(16));
        // 16 head samples in 4 blocks, 84 tail samples in 6
        assert_eq!(kernel.partition_count(), 10);
        let mut conv = PartitionedConvolver::new(kernel);
        let got = run(&mut conv, &signal, block);
        assert_close(&got, &direct(&signal, &impulse));
    }

    #[test]
    fn resumes_cleanly_after_going_idle() {
        let block = 4;
        let impulse: Vec<f32> = (0..40).map(|i| 1.0 / (1 + i) as f32).collect();
        let mut signal = vec![0.0; 400];
        for (i, s) in signal.iter_mut().enumerate().take(24) {
            *s = ((i % 5) as f32 - 2.0) * 0.2;
        }
        signal[300] = 1.0;
        signal[305] = -0.5;

        let kernel = Arc::new(ConvolutionKernel::with_tail_block(&impulse, block, 8));
        let mut conv = PartitionedConvolver::new(kernel);

        let got = run(&mut conv, &signal[..300], block);
        assert!(conv.is_idle());
        let rest = run(&mut conv, &signal[300..], block);
        assert!(!conv.is_idle());

        let want = direct(&signal, &impulse);
        assert_close(&got, &want[..300]);
        assert_close(&rest, &want[300..]);
    }

    #[test]
    fn tail_rings_for_tail_blocks_then_stops() {
        let block = 4;
        let impulse = vec![1.0; 10];
        let kernel = Arc::new(ConvolutionKernel::new(&impulse, block));
        let tail = kernel.tail_blocks();
        let mut conv = PartitionedConvolver::new(kernel);

        let mut out = vec![0.0; block];
        conv.process_block(&[1.0, 0.0, 0.0, 0.0], &mut out);
        assert!((out[0] - 1.0).abs() < 1e-5);

        let mut energy_after = Vec::new();
        for _ in 0..tail + 1 {
            let mut out = vec![0.0; block];
            conv.process_block(&[0.0; 4], &mut out);
            energy_after.push(out.iter().map(|s| s.abs()).sum::<f32>());
        }
        assert!(energy_after[0] > 0.5);
        assert!(energy_after[tail - 1] < 1e-4);
        assert!(energy_after[tail] < 1e-4);
        assert!(conv.is_idle());
    }

    #[test]
    fn long_responses_cost_a_fraction_of_uniform_partitioning() {
        // three seconds at 48 kHz
        let impulse = vec![0.01; 144_000];
        let kernel = ConvolutionKernel::new(&impulse, 128);
        assert_eq!(kernel.tail_block(), Some(4096));

        let uniform = impulse.len().div_ceil(128) * 2 * 128;
        assert!(kernel.macs_per_block() * 10 < uniform, "{}", kernel.macs_per_block());
    }

    #[test]
    fn empty_impulse_is_silent() {
        let kernel = Arc::new(ConvolutionKernel::new(&[], 4));
        assert_eq!(kernel.tail_blocks(), 0);
        let mut conv = PartitionedConvolver::new(kernel);
        let mut out = vec![0.0; 4];
        conv.process_block(&[1.0; 4], &mut out);
        assert_eq!(out, vec![0.0; 4]);
    }
}

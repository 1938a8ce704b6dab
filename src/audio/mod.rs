use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};

use crate::audio_api::AudioCommand;
use crate::config::InstrumentConfig;
use crate::error::CoreError;
use crate::instrument::Instrument;
use crate::loader::ir_loader;
use crate::shared::{BoardId, BusId, ImpulseKind, PadId, PercussionKind, WaveformKind, WaveformSet};
use crate::synth::ControllerPosition;

mod convolver;
mod engine;
mod filter;
mod frame;
mod graph;
mod nodes;
mod param;
mod request_id;
mod sample_buffer;

pub use convolver::{ConvolutionKernel, PartitionedConvolver};
pub use engine::{AudioEngine, Completion};
pub use filter::BiquadCoeffs;
pub use frame::StereoFrame;
pub use graph::NodeId;
pub use nodes::{FilterKind, Node, ParamId, ProcessContext, QUANTUM};
pub use param::{Param, ParamEvent, RampKind};
pub use request_id::{RequestId, next_request_id};
pub use sample_buffer::ImpulseResponse;

#[cfg(test)]
pub(crate) use sample_buffer::tests::wav_bytes as wav_fixture;

const COMMAND_CAPACITY: usize = 1024;

/// Control side of a running instrument. Every call is queued for the audio
/// thread and returns immediately.
pub struct AudioHandle {
    tx: Sender<AudioCommand>,
    _stream: cpal::Stream,
    sample_rate: u32,
    ir_dir: PathBuf,
}

impl AudioHandle {
    pub fn send(&self, cmd: AudioCommand) {
        if let Err(e) = self.tx.try_send(cmd) {
            log::warn!("dropping command: {e}");
        }
    }

    pub fn trigger_note(
        &self,
        pad: PadId,
        note_index: i32,
        waveforms: WaveformSet,
        detune_cents: f32,
    ) {
        self.send(AudioCommand::TriggerNote { pad, note_index, waveforms, detune_cents });
    }

    pub fn press_pad(&self, pad: PadId) {
        self.send(AudioCommand::PressPad(pad));
    }

    pub fn release_note(&self, pad: PadId) {
        self.send(AudioCommand::ReleaseNote(pad));
    }

    pub fn set_controller_position(&self, board: BoardId, position: ControllerPosition) {
        self.send(AudioCommand::SetControllerPosition { board, position });
    }

    pub fn trigger_percussion(&self, kind: PercussionKind) {
        self.send(AudioCommand::TriggerPercussion(kind));
    }

    pub fn set_reverb_wet_gain(&self, bus: BusId, value: f32) {
        self.send(AudioCommand::SetReverbWetGain { bus, value });
    }

    pub fn set_reverb_dry_gain(&self, bus: BusId, value: f32) {
        self.send(AudioCommand::SetReverbDryGain { bus, value });
    }

    pub fn set_reverb_enabled(&self, bus: BusId, enabled: bool) {
        self.send(AudioCommand::SetReverbEnabled { bus, enabled });
    }

    pub fn toggle_waveform(&self, board: BoardId, kind: WaveformKind) {
        self.send(AudioCommand::ToggleWaveform { board, kind });
    }

    pub fn set_base_note(&self, board: BoardId, note: i32) {
        self.send(AudioCommand::SetBaseNote { board, note });
    }

    /// Loads `kind` for `bus` in the background. Only the most recent request
    /// per bus is ever installed; the join handle reports decode failures.
    pub fn set_reverb_impulse_response(
        &self,
        bus: BusId,
        kind: ImpulseKind,
    ) -> JoinHandle<Result<(), CoreError>> {
        request_impulse_response(&self.tx, &self.ir_dir, self.sample_rate, bus, kind)
    }
}

/// Registers a new impulse-response request with the audio thread, then
/// reads, decodes and partitions the file on a worker thread and sends the
/// result back to be installed.
pub fn request_impulse_response(
    tx: &Sender<AudioCommand>,
    ir_dir: &Path,
    sample_rate: u32,
    bus: BusId,
    kind: ImpulseKind,
) -> JoinHandle<Result<(), CoreError>> {
    let id = next_request_id();
    if tx.try_send(AudioCommand::BeginImpulseRequest { bus, id }).is_err() {
        log::warn!("could not register impulse request {id:?} for {bus:?}");
    }

    let tx = tx.clone();
    let ir_dir = ir_dir.to_path_buf();
    std::thread::spawn(move || {
        let prepared = ir_loader::load_prepared(&ir_dir, kind, sample_rate).inspect_err(|e| {
            log::warn!("{bus:?} keeps its current impulse response: {e}");
        })?;
        log::debug!("decoded {kind:?} ({} frames) for {bus:?}", prepared.frames);
        tx.send(AudioCommand::InstallImpulse {
            bus,
            id,
            convolver: prepared.convolver,
            loudness: prepared.loudness,
        })
        .map_err(|_| CoreError::Disconnected)
    })
}

pub fn start_audio(config: &InstrumentConfig) -> anyhow::Result<AudioHandle> {
    let (tx, rx) = crossbeam_channel::bounded::<AudioCommand>(COMMAND_CAPACITY);

    let host = cpal::default_host();
    let device = host.default_output_device().context("no default output device")?;
    let supported = device.default_output_config().context("no default output config")?;

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    if sample_rate != config.sample_rate {
        log::info!("device runs at {sample_rate} Hz, configured {} Hz", config.sample_rate);
    }

    match supported.sample_format() {
        cpal::SampleFormat::F32 => {
            let instrument = Instrument::new(&InstrumentConfig {
                sample_rate,
                ..config.clone()
            });
            spawn_retire_thread(instrument.engine().retired_convolvers())?;
            let stream =
                build_output_stream_f32(&device, &supported.into(), rx, instrument, channels)?;
            stream.play().context("failed to play output stream")?;
            log::info!("audio running at {sample_rate} Hz, {channels} channels");

            Ok(AudioHandle {
                tx,
                _stream: stream,
                sample_rate,
                ir_dir: config.ir_dir.clone(),
            })
        }
        other => anyhow::bail!("unsupported sample format {other:?} (only f32 supported for now)"),
    }
}

// frees convolvers the audio thread has finished with; exits with the stream
fn spawn_retire_thread(retired: Receiver<Box<PartitionedConvolver>>) -> anyhow::Result<()> {
    std::thread::Builder::new()
        .name("thalia-retire".into())
        .spawn(move || {
            for conv in retired {
                log::trace!("freeing {conv:?}");
            }
        })
        .context("failed to spawn retire thread")?;
    Ok(())
}

fn build_output_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    rx: Receiver<AudioCommand>,
    mut instrument: Instrument,
    channels: usize,
) -> anyhow::Result<cpal::Stream> {
    // only used when the device isn't plain stereo
    let mut scratch: Vec<StereoFrame> = Vec::new();

    let err_fn = |err| log::error!("audio output stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _info| {
            while let Ok(cmd) = rx.try_recv() {
                instrument.handle_cmd(cmd);
            }

            let n_frames = data.len() / channels.max(1);
            if channels == 2 {
                // StereoFrame is two packed f32s
                let frames: &mut [StereoFrame] = unsafe {
                    std::slice::from_raw_parts_mut(data.as_mut_ptr() as *mut StereoFrame, n_frames)
                };
                instrument.render_block(frames);
            } else {
                if scratch.len() < n_frames {
                    scratch.resize(n_frames, StereoFrame::zero());
                }
                instrument.render_block(&mut scratch[..n_frames]);
                for (out, frame) in data.chunks_exact_mut(channels).zip(&scratch) {
                    for (ch, sample) in out.iter_mut().enumerate() {
                        *sample = if ch % 2 == 0 { frame.left } else { frame.right };
                    }
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

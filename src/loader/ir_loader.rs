use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audio::{ConvolutionKernel, ImpulseResponse, PartitionedConvolver, QUANTUM};
use crate::error::CoreError;
use crate::shared::ImpulseKind;

/// An impulse response ready to hand to the audio thread.
#[derive(Debug)]
pub struct PreparedImpulse {
    pub kind: ImpulseKind,
    pub frames: usize,
    pub loudness: f32,
    pub convolver: Box<PartitionedConvolver>,
}

// <ir_dir>/IR_church.wav etc.
pub fn impulse_path(ir_dir: &Path, kind: ImpulseKind) -> PathBuf {
    ir_dir.join(kind.file_name())
}

// Read an impulse response off disk and decode it for the engine's rate.
pub fn load(
    ir_dir: &Path,
    kind: ImpulseKind,
    target_rate: u32,
) -> Result<ImpulseResponse, CoreError> {
    let path = impulse_path(ir_dir, kind);
    let name = path.display().to_string();
    let bytes = std::fs::read(&path).map_err(|e| CoreError::decode(name.as_str(), e))?;
    ImpulseResponse::decode_wav(&name, &bytes, target_rate)
}

// Partition and transform the response so installing it costs nothing.
pub fn prepare(kind: ImpulseKind, ir: &ImpulseResponse) -> PreparedImpulse {
    let kernel = Arc::new(ConvolutionKernel::new(&ir.data, QUANTUM));
    PreparedImpulse {
        kind,
        frames: ir.len(),
        loudness: kind.loudness_factor(),
        convolver: Box::new(PartitionedConvolver::new(kernel)),
    }
}

pub fn load_prepared(
    ir_dir: &Path,
    kind: ImpulseKind,
    target_rate: u32,
) -> Result<PreparedImpulse, CoreError> {
    let ir = load(ir_dir, kind, target_rate)?;
    Ok(prepare(kind, &ir))
}

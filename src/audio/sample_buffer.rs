use std::io::Cursor;

use crate::error::CoreError;

/// A decoded impulse response: mono, at the engine's sample rate.
#[derive(Clone, Debug)]
pub struct ImpulseResponse {
    pub data: Vec<f32>,
    pub sample_rate: u32,
}

impl ImpulseResponse {
    // Decode encoded WAV bytes, fold to mono and resample for the engine.
    // `name` only shows up in errors.
    pub fn decode_wav(name: &str, bytes: &[u8], target_rate: u32) -> Result<Self, CoreError> {
        let reader =
            hound::WavReader::new(Cursor::new(bytes)).map_err(|e| CoreError::decode(name, e))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader // float, just pass it through
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| CoreError::decode(name, e))?,
            hound::SampleFormat::Int => {
                // int, scale into [-1, 1]
                let max = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|x| x as f32 / max))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| CoreError::decode(name, e))?
            }
        };

        // average the channels down
        let mono: Vec<f32> = samples
            .chunks_exact(channels)
            .map(|c| c.iter().sum::<f32>() / channels as f32)
            .collect();
        if mono.is_empty() {
            return Err(CoreError::decode(name, "no audio frames"));
        }

        let data = resample_linear(&mono, spec.sample_rate, target_rate);
        Ok(Self { data, sample_rate: target_rate })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// simple linear resampler, fine for reverb tails
fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || source_rate == 0 || target_rate == 0 {
        return samples.to_vec();
    }
    let ratio = target_rate as f64 / source_rate as f64;
    let out_len = (samples.len() as f64 * ratio).ceil() as usize;
    let last = samples.last().copied().unwrap_or(0.0);

    (0..out_len)
        .map(|i| {
            // fractional position in the source buffer
            let src_pos = i as f64 / ratio; // ex. 3.7
            let idx = src_pos.floor() as usize; // ex. 3
            let frac = (src_pos - idx as f64) as f32; // ex. 0.7
            if idx + 1 >= samples.len() {
                last
            } else {
                samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn wav_bytes(channels: u16, sample_rate: u32, frames: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in frames {
                writer.write_sample(*s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn stereo_is_folded_to_mono() {
        let bytes = wav_bytes(2, 48_000, &[16384, 0, -16384, -16384]);
        let ir = ImpulseResponse::decode_wav("ir", &bytes, 48_000).unwrap();
        assert_eq!(ir.len(), 2);
        assert!((ir.data[0] - 0.25).abs() < 1e-4);
        assert!((ir.data[1] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn resamples_to_engine_rate() {
        let frames: Vec<i16> = vec![1000; 100];
        let bytes = wav_bytes(1, 24_000, &frames);
        let ir = ImpulseResponse::decode_wav("ir", &bytes, 48_000).unwrap();
        assert_eq!(ir.len(), 200);
        assert_eq!(ir.sample_rate, 48_000);
    }

    #[test]
    fn garbage_is_a_decode_failure() {
        let err = ImpulseResponse::decode_wav("IR_pipe.wav", b"not a wav", 48_000).unwrap_err();
        match err {
            CoreError::DecodeFailure { name, .. } => assert_eq!(name, "IR_pipe.wav"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn linear_resample_interpolates() {
        let out = resample_linear(&[0.0, 1.0], 1, 2);
        assert_eq!(out, vec![0.0, 0.5, 1.0, 1.0]);
    }
}

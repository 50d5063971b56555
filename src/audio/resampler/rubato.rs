//! FFT resampler backed by the Rubato library.
//!
//! Each call converts one complete buffer: the signal is padded to the resampler's
//! input chunk, flushed, and the filter delay is trimmed so the output length tracks
//! `frames * out_rate / in_rate`.

use async_trait::async_trait;
use bytemuck::cast_slice;
use rubato::{FftFixedIn, Resampler};

use super::base::{BaseAudioResampler, ResamplerResult};

pub struct RubatoAudioResampler {
    channels: usize,
}

impl RubatoAudioResampler {
    pub fn new() -> Self {
        Self { channels: 1 }
    }

    /// Resample interleaved audio with `channels` channels.
    pub fn with_channels(channels: u16) -> Self {
        Self {
            channels: channels.max(1) as usize,
        }
    }

    fn deinterleave(&self, audio: &[u8]) -> Vec<Vec<f64>> {
        let mut planes = vec![Vec::with_capacity(audio.len() / 2 / self.channels); self.channels];
        // Decoded byte-wise: the input buffer carries no i16 alignment guarantee.
        for (i, sample) in audio.chunks_exact(2).enumerate() {
            let value = i16::from_le_bytes([sample[0], sample[1]]);
            planes[i % self.channels].push(value as f64 / i16::MAX as f64);
        }
        planes
    }

    fn interleave(planes: &[Vec<f64>]) -> Vec<i16> {
        let frames = planes.iter().map(Vec::len).min().unwrap_or(0);
        let mut samples = Vec::with_capacity(frames * planes.len());
        for frame in 0..frames {
            for plane in planes {
                let s = (plane[frame] * i16::MAX as f64).clamp(i16::MIN as f64, i16::MAX as f64);
                samples.push(s as i16);
            }
        }
        samples
    }
}

impl Default for RubatoAudioResampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseAudioResampler for RubatoAudioResampler {
    async fn resample(
        &self,
        audio: Vec<u8>,
        in_rate: u32,
        out_rate: u32,
    ) -> ResamplerResult<Vec<u8>> {
        if in_rate == 0 || out_rate == 0 {
            return Err("Sample rates must be greater than zero".into());
        }

        if in_rate == out_rate {
            return Ok(audio);
        }

        if audio.len() % (2 * self.channels) != 0 {
            return Err(format!(
                "Audio data length {} is not a whole number of {}-channel 16-bit frames",
                audio.len(),
                self.channels
            )
            .into());
        }

        if audio.is_empty() {
            return Ok(Vec::new());
        }

        let mut planes = self.deinterleave(&audio);
        let frames = planes[0].len();

        let mut resampler = FftFixedIn::<f64>::new(
            in_rate as usize,
            out_rate as usize,
            frames.max(64),
            2,
            self.channels,
        )
        .map_err(|e| format!("Failed to create resampler: {}", e))?;

        let needed = resampler.input_frames_next();
        for plane in planes.iter_mut() {
            plane.resize(needed, 0.0);
        }

        let mut output = resampler
            .process(&planes, None)
            .map_err(|e| format!("Failed to resample audio: {}", e))?;
        let tail = resampler
            .process_partial(None::<&[Vec<f64>]>, None)
            .map_err(|e| format!("Failed to flush resampler: {}", e))?;
        for (plane, rest) in output.iter_mut().zip(tail) {
            plane.extend(rest);
        }

        let delay = resampler.output_delay();
        let expected = (frames as u64 * out_rate as u64 / in_rate as u64) as usize;
        let trimmed: Vec<Vec<f64>> = output
            .into_iter()
            .map(|plane| plane.into_iter().skip(delay).take(expected).collect())
            .collect();

        let samples = Self::interleave(&trimmed);
        Ok(cast_slice::<i16, u8>(&samples).to_vec())
    }
}

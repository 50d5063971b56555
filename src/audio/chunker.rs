//! Fixed-size slicing of resampled PCM.

use std::collections::VecDeque;

const BYTES_PER_SAMPLE: usize = 2;

/// Bytes in one output chunk: `10ms_chunks` blocks of 10ms, 16-bit samples.
pub fn audio_chunk_size(sample_rate: u32, channels: u16, chunks_10ms: u32) -> usize {
    (sample_rate as usize / 100) * channels as usize * BYTES_PER_SAMPLE * chunks_10ms as usize
}

/// Buffer of resampled audio waiting to be cut into chunks.
///
/// Only a sub-chunk remainder stays buffered between calls to [`drain_chunks`](Self::drain_chunks).
#[derive(Debug, Default)]
pub struct AudioAccumulator {
    buffer: VecDeque<u8>,
}

impl AudioAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, audio: &[u8]) {
        self.buffer.extend(audio);
    }

    /// Take the next `chunk_size` bytes if that many are buffered.
    pub fn next_chunk(&mut self, chunk_size: usize) -> Option<Vec<u8>> {
        if chunk_size == 0 || self.buffer.len() < chunk_size {
            return None;
        }
        Some(self.buffer.drain(..chunk_size).collect())
    }

    /// Append `audio` and return every full chunk now available, in order.
    pub fn drain_chunks(&mut self, audio: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
        self.extend(audio);
        let mut chunks = Vec::new();
        while let Some(chunk) = self.next_chunk(chunk_size) {
            chunks.push(chunk);
        }
        chunks
    }

    pub fn remainder(&self) -> Vec<u8> {
        self.buffer.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

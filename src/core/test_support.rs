//! Plugins and helpers used by the unit tests.

use crate::core::audio_buffer::{AudioBlock, AudioBuffer};
use crate::core::plugin::Plugin;
use crate::core::process_spec::ProcessSpec;
use crate::error::Result;
use std::collections::VecDeque;

/// Ramp per channel, offset so channels differ.
pub fn ramp(num_channels: usize, num_samples: usize) -> AudioBuffer {
    let mut buffer = AudioBuffer::new(num_channels, num_samples);
    for c in 0..num_channels {
        for (i, s) in buffer.channel_mut(c).iter_mut().enumerate() {
            *s = (i + 1) as f32 + c as f32 * 0.5;
        }
    }
    buffer
}

/// Collects input and only releases it in whole chunks, the way an FFT
/// based processor would. Output is the input stream, delayed.
pub struct BlockBuffered {
    chunk: usize,
    pending_in: Vec<VecDeque<f32>>,
    pending_out: Vec<VecDeque<f32>>,
}

impl BlockBuffered {
    pub fn new(chunk: usize) -> Self {
        BlockBuffered {
            chunk,
            pending_in: Vec::new(),
            pending_out: Vec::new(),
        }
    }
}

impl Plugin for BlockBuffered {
    fn prepare(&mut self, spec: &ProcessSpec) -> Result<()> {
        self.pending_in.resize_with(spec.channels(), VecDeque::new);
        self.pending_out.resize_with(spec.channels(), VecDeque::new);
        Ok(())
    }

    fn process(&mut self, block: &mut AudioBlock<'_>) -> Result<usize> {
        let n = block.num_samples();
        let mut produced = 0;
        for c in 0..block.num_channels() {
            let input = &mut self.pending_in[c];
            let output = &mut self.pending_out[c];
            input.extend(block.channel(c).iter().copied());
            while input.len() >= self.chunk {
                output.extend(input.drain(..self.chunk));
            }

            produced = n.min(output.len());
            let samples = block.channel_mut(c);
            samples.fill(0.0);
            for s in samples[n - produced..].iter_mut() {
                *s = output.pop_front().unwrap_or(0.0);
            }
        }
        Ok(produced)
    }

    fn reset(&mut self) -> Result<()> {
        self.pending_in.iter_mut().for_each(VecDeque::clear);
        self.pending_out.iter_mut().for_each(VecDeque::clear);
        Ok(())
    }

    fn latency_hint(&self) -> Result<usize> {
        Ok(self.chunk)
    }

    fn name(&self) -> &str {
        "BlockBuffered"
    }
}

/// Claims one more sample than it was given.
pub struct Overproducer;

impl Plugin for Overproducer {
    fn prepare(&mut self, _spec: &ProcessSpec) -> Result<()> {
        Ok(())
    }

    fn process(&mut self, block: &mut AudioBlock<'_>) -> Result<usize> {
        Ok(block.num_samples() + 1)
    }

    fn name(&self) -> &str {
        "Overproducer"
    }
}

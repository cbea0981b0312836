//! Constant-memory streaming sample-rate conversion.
//!
//! The output length is driven by the cumulative input length, not by the
//! size of each chunk: after `n` input samples exactly
//! `floor(n * target / source)` raw outputs have been produced (the kernel
//! permitting). That makes the output independent of how the input is
//! chunked, and lets a seek be computed by replaying the phase walk.

use crate::core::audio_buffer::AudioBuffer;
use crate::error::{Error, Result};
use crate::resample::interpolator::{advance_phase, Interpolator};
use crate::resample::quality::Quality;
use tracing::trace;

/// Where to restart the upstream stream for a seek, and the resampler state
/// to restore once the kernel history has been primed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SeekPlan {
    /// Output sample the resampler will produce next.
    pub output_position: u64,
    /// First upstream sample to feed to [`StreamResampler::prime`].
    pub upstream_start: u64,
    /// One past the last upstream sample to prime with. Normal processing
    /// continues from here.
    pub upstream_end: u64,
    raw_outputs: u64,
    phase: f64,
}

impl SeekPlan {
    /// Number of upstream samples `prime()` expects.
    pub fn upstream_len(&self) -> usize {
        (self.upstream_end - self.upstream_start) as usize
    }
}

/// Resamples a multi-channel stream chunk by chunk.
pub struct StreamResampler {
    source_rate: f64,
    target_rate: f64,
    num_channels: usize,
    quality: Quality,
    interpolators: Vec<Interpolator>,
    /// Input received but not consumed yet, per channel.
    carry: Vec<Vec<f32>>,
    total_in: u64,
    total_out: u64,
    skip_remaining: u64,
    flushed: bool,
}

impl StreamResampler {
    pub fn new(source_rate: f64, target_rate: f64, num_channels: usize, quality: Quality) -> Result<Self> {
        for (name, rate) in [("source_sample_rate", source_rate), ("target_sample_rate", target_rate)] {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(Error::invalid(name, format!("must be a positive number, got {rate}")));
            }
        }
        if num_channels == 0 {
            return Err(Error::invalid("num_channels", "must be at least 1"));
        }

        let mut resampler = StreamResampler {
            source_rate,
            target_rate,
            num_channels,
            quality,
            interpolators: vec![Interpolator::new(quality); num_channels],
            carry: vec![Vec::new(); num_channels],
            total_in: 0,
            total_out: 0,
            skip_remaining: 0,
            flushed: false,
        };
        resampler.reset();
        Ok(resampler)
    }

    pub fn source_sample_rate(&self) -> f64 {
        self.source_rate
    }

    pub fn target_sample_rate(&self) -> f64 {
        self.target_rate
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Kernel delay in input samples. Compensated internally.
    pub fn input_latency(&self) -> usize {
        self.quality.latency()
    }

    /// Kernel delay in output samples. Compensated internally.
    pub fn output_latency(&self) -> f64 {
        self.quality.latency() as f64 * self.ratio()
    }

    fn ratio(&self) -> f64 {
        self.target_rate / self.source_rate
    }

    fn speed(&self) -> f64 {
        self.source_rate / self.target_rate
    }

    /// Raw outputs dropped at the start of the stream to cancel the kernel
    /// delay.
    fn initial_skip(&self) -> u64 {
        libm::round(self.output_latency()) as u64
    }

    pub fn reset(&mut self) {
        for interpolator in &mut self.interpolators {
            interpolator.reset();
        }
        for carry in &mut self.carry {
            carry.clear();
        }
        self.total_in = 0;
        self.total_out = 0;
        self.skip_remaining = self.initial_skip();
        self.flushed = false;
    }

    /// Resamples the next chunk. `None` flushes: the kernel's lookahead is
    /// filled with silence so the end of the stream comes out.
    pub fn process(&mut self, input: Option<&AudioBuffer>) -> Result<AudioBuffer> {
        match input {
            Some(chunk) => {
                if chunk.num_channels() != self.num_channels {
                    return Err(Error::ChannelMismatch {
                        expected: self.num_channels,
                        actual: chunk.num_channels(),
                    });
                }
                Ok(self.feed(chunk))
            }
            None => {
                let silence = AudioBuffer::new(self.num_channels, self.quality.latency());
                let output = self.feed(&silence);
                self.flushed = true;
                Ok(output)
            }
        }
    }

    fn feed(&mut self, chunk: &AudioBuffer) -> AudioBuffer {
        let new_len = chunk.num_samples() as u64;
        let target_total = libm::floor((self.total_in + new_len) as f64 * self.ratio()) as u64;
        let expected = target_total.saturating_sub(self.total_out) as usize;
        let speed = self.speed();

        let mut output = AudioBuffer::new(self.num_channels, expected);
        let mut consumed = 0;
        let mut produced = 0;
        for c in 0..self.num_channels {
            let carry = &self.carry[c];
            let input = carry.iter().copied().chain(chunk.channel(c).iter().copied());
            (consumed, produced) = self.interpolators[c].process(speed, input, output.channel_mut(c));
        }

        for (c, carry) in self.carry.iter_mut().enumerate() {
            let samples = chunk.channel(c);
            if consumed <= carry.len() {
                carry.drain(..consumed);
                carry.extend_from_slice(samples);
            } else {
                let from_chunk = consumed - carry.len();
                carry.clear();
                carry.extend_from_slice(&samples[from_chunk..]);
            }
        }

        self.total_in += new_len;
        self.total_out += produced as u64;

        let skip = (self.skip_remaining as usize).min(produced);
        self.skip_remaining -= skip as u64;
        output.set_num_samples(produced);
        output.shift_left(skip, produced - skip);
        output.set_num_samples(produced - skip);

        trace!(
            input = new_len,
            consumed,
            produced,
            skipped = skip,
            carry = self.carry[0].len(),
            "resampled chunk"
        );
        output
    }

    /// Replays the phase walk for `raw_outputs` more outputs from the current
    /// state and returns how many input samples that would consume.
    pub fn advance_resampler_state(&self, raw_outputs: u64) -> u64 {
        advance_phase(self.interpolators[0].phase(), self.speed(), raw_outputs).0
    }

    /// Plans a seek to `output_position` (counted after the start-of-stream
    /// skip).
    ///
    /// Seeking forward from an unflushed stream continues the walk from the
    /// current state; anything else replays it from the start. Both walk the
    /// phase one output at a time, exactly as processing does, so the seeked
    /// output is bit-identical to the unseeked output. A closed-form jump
    /// would be O(1) but round differently.
    pub fn seek_plan(&self, output_position: u64) -> SeekPlan {
        let raw_outputs = output_position + self.initial_skip();
        let pending = self.carry[0].len() as u64;

        let (base_consumed, base_phase, base_outputs) =
            if !self.flushed && raw_outputs >= self.total_out {
                (self.total_in - pending, self.interpolators[0].phase(), self.total_out)
            } else {
                (0, 1.0, 0)
            };

        let (walked, phase) = advance_phase(base_phase, self.speed(), raw_outputs - base_outputs);
        let upstream_end = base_consumed + walked;

        SeekPlan {
            output_position,
            upstream_start: upstream_end.saturating_sub(self.quality.width() as u64),
            upstream_end,
            raw_outputs,
            phase,
        }
    }

    /// Completes a seek: loads the kernel history with upstream samples
    /// `[plan.upstream_start, plan.upstream_end)` and restores the planned
    /// state. Upstream samples past the end of the stream must be passed as
    /// silence.
    pub fn prime(&mut self, plan: &SeekPlan, history: &AudioBuffer) -> Result<()> {
        if history.num_channels() != self.num_channels {
            return Err(Error::ChannelMismatch {
                expected: self.num_channels,
                actual: history.num_channels(),
            });
        }
        if history.num_samples() != plan.upstream_len() {
            return Err(Error::invalid(
                "history",
                format!(
                    "seek needs {} upstream samples, got {}",
                    plan.upstream_len(),
                    history.num_samples()
                ),
            ));
        }

        for (c, interpolator) in self.interpolators.iter_mut().enumerate() {
            interpolator.reset();
            for &sample in history.channel(c) {
                interpolator.push(sample);
            }
            interpolator.set_phase(plan.phase);
        }
        for carry in &mut self.carry {
            carry.clear();
        }

        self.total_in = plan.upstream_end;
        self.total_out = plan.raw_outputs;
        self.skip_remaining = self.initial_skip().saturating_sub(plan.raw_outputs);
        self.flushed = false;
        Ok(())
    }
}

use crate::core::audio_buffer::AudioBlock;
use crate::core::process_spec::ProcessSpec;
use crate::error::Result;
use crate::Plugin;

/// An integer-sample delay line.
///
/// By default every block comes back full length, starting with `delay`
/// samples of silence. With compensation enabled the delay is reported to
/// the host as output shortfall instead: warm-up silence is never returned,
/// and the host removes the delay from the stream.
pub struct Delay {
    delay: usize,
    compensated: bool,
    lines: Vec<Vec<f32>>,
    write_ptr: usize,
    samples_seen: u64,
}

impl Delay {
    /// Creates a new Delay.
    ///
    /// # Arguments
    /// * `delay` - Delay time in samples.
    pub fn new(delay: usize) -> Self {
        Delay {
            delay,
            compensated: false,
            lines: Vec::new(),
            write_ptr: 0,
            samples_seen: 0,
        }
    }

    /// Report the delay as output shortfall rather than padding with zeros.
    pub fn with_compensation(mut self, compensated: bool) -> Self {
        self.compensated = compensated;
        self
    }

    pub fn delay(&self) -> usize {
        self.delay
    }
}

impl Plugin for Delay {
    fn prepare(&mut self, spec: &ProcessSpec) -> Result<()> {
        let channels = spec.channels();
        if self.lines.len() != channels || self.lines.iter().any(|l| l.len() != self.delay) {
            self.lines = vec![vec![0.0; self.delay]; channels];
            self.write_ptr = 0;
            self.samples_seen = 0;
        }
        Ok(())
    }

    fn process(&mut self, block: &mut AudioBlock<'_>) -> Result<usize> {
        let n = block.num_samples();
        let seen = self.samples_seen;
        self.samples_seen += n as u64;

        if self.delay > 0 {
            for (c, line) in self.lines.iter_mut().enumerate().take(block.num_channels()) {
                let mut ptr = self.write_ptr;
                for sample in block.channel_mut(c) {
                    let delayed = line[ptr];
                    line[ptr] = *sample;
                    *sample = delayed;
                    ptr += 1;
                    if ptr == self.delay {
                        ptr = 0;
                    }
                }
            }
            self.write_ptr = (self.write_ptr + n) % self.delay;
        }

        if !self.compensated {
            return Ok(n);
        }

        // Stream time of the block end minus the delay is how many real
        // samples have come out so far; only the ones in this block count.
        let emitted = (seen + n as u64).saturating_sub(self.delay as u64);
        Ok((n as u64).min(emitted) as usize)
    }

    fn reset(&mut self) -> Result<()> {
        for line in &mut self.lines {
            line.fill(0.0);
        }
        self.write_ptr = 0;
        self.samples_seen = 0;
        Ok(())
    }

    fn latency_hint(&self) -> Result<usize> {
        Ok(self.delay)
    }

    fn name(&self) -> &str {
        "Delay"
    }
}

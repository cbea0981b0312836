use blockdsp_core::AudioBuffer;

/// A plucked-ish test tone: a decaying sine retriggered every `period`
/// samples, identical in every channel.
pub struct Tone {
    sample_rate: f32,
    freq: f32,
    period: u64,
    clock: u64,
}

impl Tone {
    pub fn new(sample_rate: f32, freq: f32, period_seconds: f32) -> Self {
        Tone {
            sample_rate,
            freq,
            period: (period_seconds * sample_rate).max(1.0) as u64,
            clock: 0,
        }
    }

    /// Overwrites every channel of `buffer` with the next samples.
    pub fn fill(&mut self, buffer: &mut AudioBuffer) {
        let start = self.clock;
        for c in 0..buffer.num_channels() {
            for (i, s) in buffer.channel_mut(c).iter_mut().enumerate() {
                *s = self.sample_at(start + i as u64);
            }
        }
        self.clock += buffer.num_samples() as u64;
    }

    fn sample_at(&self, n: u64) -> f32 {
        let t = (n % self.period) as f32 / self.sample_rate;
        let envelope = libm::expf(-t * 6.0);
        0.4 * envelope * libm::sinf(2.0 * core::f32::consts::PI * self.freq * t)
    }

    /// Renders `seconds` of the tone.
    pub fn render(sample_rate: f32, freq: f32, channels: usize, seconds: f32) -> AudioBuffer {
        let mut tone = Tone::new(sample_rate, freq, 0.5);
        let mut buffer = AudioBuffer::new(channels, (seconds * sample_rate) as usize);
        tone.fill(&mut buffer);
        buffer
    }
}

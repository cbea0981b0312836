use crate::core::audio_buffer::{AudioBlock, AudioBuffer};
use crate::core::plugin::{Plugin, PluginHandle};
use crate::core::process_spec::ProcessSpec;
use crate::core::ring_buffer::RingBuffer;
use crate::error::{Error, InternalError, Result};
use crate::resample::interpolator::Interpolator;
use crate::resample::quality::Quality;
use tracing::{debug, warn};

/// Runs a plugin at a different sample rate.
///
/// Audio is resampled to the target rate, processed by the nested plugin,
/// and resampled back. Without a nested plugin this is a rate-degradation
/// effect: the signal is band-limited to the target rate's Nyquist
/// frequency.
///
/// Audio moves through four bounded rings: native-rate input waiting for the
/// forward interpolators, target-rate audio waiting for the nested plugin,
/// its output waiting for the inverse interpolators, and native-rate output
/// waiting to be emitted. Their capacities follow from the block size and the
/// latency hint; overflowing one is an internal error.
pub struct Resample {
    inner: Option<PluginHandle>,
    target_rate: f64,
    quality: Quality,
    spec: Option<ProcessSpec>,
    inner_block: usize,
    inner_latency: usize,
    forward: Vec<Interpolator>,
    inverse: Vec<Interpolator>,
    input_reservoir: RingBuffer,
    resampled: RingBuffer,
    processed: RingBuffer,
    output_reservoir: RingBuffer,
    scratch: AudioBuffer,
    native_in: u64,
    forward_out: u64,
    forward_skip: u64,
    target_in: u64,
    inverse_out: u64,
    inverse_skip: u64,
}

impl Resample {
    /// Creates a rate-degradation effect.
    pub fn new(target_sample_rate: f64, quality: Quality) -> Result<Self> {
        Resample::wrapping_handle(None, target_sample_rate, quality)
    }

    /// Wraps `plugin`, which will run at `target_sample_rate`.
    pub fn wrapping(plugin: impl Plugin + 'static, target_sample_rate: f64, quality: Quality) -> Result<Self> {
        Resample::wrapping_handle(Some(PluginHandle::new(plugin)), target_sample_rate, quality)
    }

    pub fn wrapping_handle(
        inner: Option<PluginHandle>,
        target_sample_rate: f64,
        quality: Quality,
    ) -> Result<Self> {
        if !target_sample_rate.is_finite() || target_sample_rate <= 0.0 {
            return Err(Error::invalid(
                "target_sample_rate",
                format!("must be a positive number, got {target_sample_rate}"),
            ));
        }
        Ok(Resample {
            inner,
            target_rate: target_sample_rate,
            quality,
            spec: None,
            inner_block: 0,
            inner_latency: 0,
            forward: Vec::new(),
            inverse: Vec::new(),
            input_reservoir: RingBuffer::new("input reservoir", 0, 0),
            resampled: RingBuffer::new("resampled buffer", 0, 0),
            processed: RingBuffer::new("processed buffer", 0, 0),
            output_reservoir: RingBuffer::new("output reservoir", 0, 0),
            scratch: AudioBuffer::default(),
            native_in: 0,
            forward_out: 0,
            forward_skip: 0,
            target_in: 0,
            inverse_out: 0,
            inverse_skip: 0,
        })
    }

    pub fn target_sample_rate(&self) -> f64 {
        self.target_rate
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn inner(&self) -> Option<&PluginHandle> {
        self.inner.as_ref()
    }

    /// Target samples per native sample.
    fn up(&self, native_rate: f64) -> f64 {
        self.target_rate / native_rate
    }

    fn latency_for(&self, native_rate: f64) -> usize {
        let down = native_rate / self.target_rate;
        let kernel = self.quality.latency();
        kernel
            + 1
            + ceil(kernel as f64 * down)
            + 1
            + ceil(self.inner_latency as f64 * down)
            + ceil(down)
            + 2
    }

    fn restart(&mut self) {
        for interpolator in self.forward.iter_mut().chain(self.inverse.iter_mut()) {
            interpolator.reset();
        }
        for ring in [
            &mut self.input_reservoir,
            &mut self.resampled,
            &mut self.processed,
            &mut self.output_reservoir,
        ] {
            ring.clear();
        }

        let (forward_skip, inverse_skip) = match self.spec {
            Some(spec) => {
                let up = self.up(spec.sample_rate);
                let kernel = self.quality.latency() as f64;
                (libm::round(kernel * up) as u64, libm::round(kernel / up) as u64)
            }
            None => (0, 0),
        };
        self.native_in = 0;
        self.forward_out = 0;
        self.forward_skip = forward_skip;
        self.target_in = 0;
        self.inverse_out = 0;
        self.inverse_skip = inverse_skip;
    }
}

fn ceil(x: f64) -> usize {
    libm::ceil(x) as usize
}

/// Resamples everything `from` can supply up to the cumulative target, drops
/// warm-up samples, and queues the rest on `to`. Returns the raw output count.
fn convert(
    interpolators: &mut [Interpolator],
    speed: f64,
    from: &mut RingBuffer,
    to: &mut RingBuffer,
    scratch: &mut AudioBuffer,
    expected: usize,
    skip: &mut u64,
) -> Result<usize> {
    if expected == 0 {
        return Ok(0);
    }
    if scratch.set_num_samples(expected) {
        warn!(expected, "resampler scratch buffer reallocated");
    }

    let mut consumed = 0;
    let mut produced = 0;
    for (c, interpolator) in interpolators.iter_mut().enumerate() {
        (consumed, produced) = interpolator.process(speed, from.channel_iter(c), scratch.channel_mut(c));
    }
    from.discard(consumed)?;

    let dropped = (*skip).min(produced as u64) as usize;
    *skip -= dropped as u64;
    to.push_buffer(scratch, dropped, produced - dropped)?;
    Ok(produced)
}

impl Plugin for Resample {
    fn prepare(&mut self, spec: &ProcessSpec) -> Result<()> {
        spec.validate()?;
        let channels = spec.channels();
        let native_rate = spec.sample_rate;
        let up = self.up(native_rate);
        let down = 1.0 / up;
        let m = spec.block_size();

        let input_cap = m + ceil(down) + 8;
        let resampled_cap = ceil(input_cap as f64 * up) + 8;
        let processed_cap = resampled_cap + ceil(up) + 8;

        self.inner_block = resampled_cap;
        if let Some(inner) = &self.inner {
            let inner_spec = ProcessSpec::new(self.target_rate, resampled_cap as u32, spec.num_channels);
            inner.prepare(&inner_spec)?;
            self.inner_latency = inner.latency_hint()?;
        } else {
            self.inner_latency = 0;
        }

        if self.spec == Some(*spec) && self.forward.len() == channels {
            return Ok(());
        }

        let output_cap = 2 * (m + self.latency_for(native_rate)) + 16;
        let scratch_cap = resampled_cap.max(ceil(processed_cap as f64 * down) + 8);

        self.forward = vec![Interpolator::new(self.quality); channels];
        self.inverse = vec![Interpolator::new(self.quality); channels];
        self.input_reservoir.resize(channels, input_cap);
        self.resampled.resize(channels, resampled_cap);
        self.processed.resize(channels, processed_cap);
        self.output_reservoir.resize(channels, output_cap);
        self.scratch = AudioBuffer::with_capacity(channels, scratch_cap);

        self.spec = Some(*spec);
        self.restart();

        debug!(
            native_rate,
            target_rate = self.target_rate,
            quality = %self.quality,
            input_cap,
            resampled_cap,
            processed_cap,
            output_cap,
            "prepared resampler"
        );
        Ok(())
    }

    fn process(&mut self, block: &mut AudioBlock<'_>) -> Result<usize> {
        let spec = self
            .spec
            .ok_or_else(|| Error::invalid("spec", "Resample::process() called before prepare()"))?;
        if block.num_channels() != spec.channels() {
            return Err(Error::ChannelMismatch {
                expected: spec.channels(),
                actual: block.num_channels(),
            });
        }

        let n = block.num_samples();
        let up = self.up(spec.sample_rate);
        let down = spec.sample_rate / self.target_rate;

        self.input_reservoir.push_block(block)?;
        self.native_in += n as u64;

        let expected = (libm::floor(self.native_in as f64 * up) as u64).saturating_sub(self.forward_out);
        self.forward_out += convert(
            &mut self.forward,
            down,
            &mut self.input_reservoir,
            &mut self.resampled,
            &mut self.scratch,
            expected as usize,
            &mut self.forward_skip,
        )? as u64;

        while !self.resampled.is_empty() {
            let chunk = self.resampled.available().min(self.inner_block);
            self.scratch.set_num_samples(chunk);
            self.resampled.pop_into(&mut self.scratch.as_block_mut())?;

            let produced = match &self.inner {
                Some(inner) => {
                    let produced = inner.with(|p| p.process(&mut self.scratch.as_block_mut()))??;
                    if produced > chunk {
                        return Err(InternalError::TooManySamples {
                            plugin: inner.name(),
                            produced,
                            requested: chunk,
                        }
                        .into());
                    }
                    produced
                }
                None => chunk,
            };
            self.processed.push_buffer(&self.scratch, chunk - produced, produced)?;
            self.target_in += produced as u64;
        }

        let expected = (libm::floor(self.target_in as f64 * down) as u64).saturating_sub(self.inverse_out);
        self.inverse_out += convert(
            &mut self.inverse,
            up,
            &mut self.processed,
            &mut self.output_reservoir,
            &mut self.scratch,
            expected as usize,
            &mut self.inverse_skip,
        )? as u64;

        let emitted = n.min(self.output_reservoir.available());
        block.clear();
        self.output_reservoir.pop_into(&mut block.sub_block(n - emitted, emitted))?;
        Ok(emitted)
    }

    fn reset(&mut self) -> Result<()> {
        self.restart();
        match &self.inner {
            Some(inner) => inner.reset(),
            None => Ok(()),
        }
    }

    fn latency_hint(&self) -> Result<usize> {
        Ok(self.spec.map_or(0, |spec| self.latency_for(spec.sample_rate)))
    }

    fn children(&self) -> Vec<PluginHandle> {
        self.inner.iter().cloned().collect()
    }

    fn name(&self) -> &str {
        "Resample"
    }

    #[cfg(feature = "debug_visualize")]
    fn visualize(&self, indent: usize) -> String {
        let spaces = " ".repeat(indent);
        let mut output = format!("{}Resample ({} Hz, {})\n", spaces, self.target_rate, self.quality);
        if let Some(inner) = &self.inner {
            output.push_str(
                &inner
                    .with(|p| p.visualize(indent + 2))
                    .unwrap_or_else(|_| format!("{}  {}\n", spaces, inner.name())),
            );
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chain::Chain;
    use crate::core::offline::render;
    use crate::core::test_support::{ramp, BlockBuffered};
    use crate::effects::time::delay::Delay;
    use crate::effects::utility::gain::Gain;

    fn sine(channels: usize, len: usize, rate: f32, freq: f32) -> AudioBuffer {
        let mut buffer = AudioBuffer::new(channels, len);
        for c in 0..channels {
            for (i, s) in buffer.channel_mut(c).iter_mut().enumerate() {
                let phase = 2.0 * std::f32::consts::PI * freq * i as f32 / rate;
                *s = 0.5 * libm::sinf(phase + c as f32);
            }
        }
        buffer
    }

    #[test]
    fn test_same_rate_is_identity() {
        let input = ramp(2, 700);
        for quality in Quality::ALL {
            let units = vec![Some(PluginHandle::new(Resample::new(44100.0, quality).unwrap()))];
            let out = render(&input, 44100.0, &units, 64, true).unwrap();
            assert_eq!(out.to_channels(), input.to_channels(), "{quality}");
        }
    }

    #[test]
    fn test_round_trip_keeps_low_frequencies() {
        let input = sine(1, 4000, 44100.0, 440.0);
        let units = vec![Some(PluginHandle::new(
            Resample::new(22050.0, Quality::WindowedSinc32).unwrap(),
        ))];
        let out = render(&input, 44100.0, &units, 256, true).unwrap();

        assert_eq!(out.num_samples(), 4000);
        for (i, (&y, &x)) in out.channel(0).iter().zip(input.channel(0)).enumerate().skip(200).take(3600) {
            assert!((y - x).abs() < 0.02, "sample {i}: {y} vs {x}");
        }
    }

    #[test]
    fn test_block_size_independence() {
        let input = sine(2, 3000, 44100.0, 1000.0);
        let make_units = || {
            let inner = Chain::new()
                .and(Gain::new(0.5))
                .and(Delay::new(7).with_compensation(true))
                .and(BlockBuffered::new(40));
            vec![Some(PluginHandle::new(
                Resample::wrapping(inner, 22050.0, Quality::Lagrange).unwrap(),
            ))]
        };

        let reference = render(&input, 44100.0, &make_units(), 8192, true).unwrap();
        assert_eq!(reference.num_samples(), 3000);
        for &block_size in &[1u32, 7, 64, 4096] {
            let out = render(&input, 44100.0, &make_units(), block_size, true).unwrap();
            assert_eq!(out.to_channels(), reference.to_channels(), "block size {block_size}");
        }
    }

    #[test]
    fn test_shortfall_never_exceeds_latency_hint() {
        for &(target, inner_delay) in &[(22050.0, 0usize), (48000.0, 13), (88200.0, 100), (16000.0, 5)] {
            let inner = Delay::new(inner_delay).with_compensation(true);
            let mut resample = Resample::wrapping(inner, target, Quality::WindowedSinc16).unwrap();
            resample.prepare(&ProcessSpec::new(44100.0, 64, 1)).unwrap();
            let hint = resample.latency_hint().unwrap();

            let mut pushed = 0;
            let mut emitted = 0;
            for _ in 0..100 {
                let mut data = vec![0.25; 64];
                emitted += resample.process(&mut AudioBlock::from_planar(&mut data, 1)).unwrap();
                pushed += 64;
                assert!(pushed - emitted <= hint, "{target} Hz: shortfall {} > hint {hint}", pushed - emitted);
            }
        }
    }

    #[test]
    fn test_oversized_block_is_capacity_error() {
        let mut resample = Resample::new(22050.0, Quality::Linear).unwrap();
        resample.prepare(&ProcessSpec::new(44100.0, 64, 1)).unwrap();

        let mut data = vec![0.0; 4096];
        let err = resample.process(&mut AudioBlock::from_planar(&mut data, 1)).unwrap_err();
        assert!(matches!(err, Error::Internal(InternalError::CapacityExceeded { .. })));
    }

    #[test]
    fn test_children_and_hint_include_inner() {
        let inner = PluginHandle::new(Delay::new(100));
        let mut resample = Resample::wrapping_handle(Some(inner.clone()), 22050.0, Quality::Linear).unwrap();
        resample.prepare(&ProcessSpec::new(44100.0, 64, 1)).unwrap();

        assert!(resample.children()[0].ptr_eq(&inner));
        assert!(resample.latency_hint().unwrap() >= 200);

        let bare = {
            let mut r = Resample::new(22050.0, Quality::Linear).unwrap();
            r.prepare(&ProcessSpec::new(44100.0, 64, 1)).unwrap();
            r
        };
        assert!(bare.children().is_empty());
        assert!(bare.latency_hint().unwrap() < resample.latency_hint().unwrap());
    }

    #[test]
    fn test_reset_and_repeat_give_same_output() {
        let input = sine(1, 1000, 48000.0, 300.0);
        let units = vec![Some(PluginHandle::new(Resample::new(32000.0, Quality::CatmullRom).unwrap()))];
        let first = render(&input, 48000.0, &units, 128, true).unwrap();
        let second = render(&input, 48000.0, &units, 128, true).unwrap();
        assert_eq!(first.to_channels(), second.to_channels());
    }

    #[test]
    fn test_invalid_target_rate() {
        assert!(matches!(
            Resample::new(-1.0, Quality::Linear),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_unreachable_inner_fails_reset() {
        let inner = PluginHandle::new(Delay::new(3));
        let mut resample = Resample::wrapping_handle(Some(inner.clone()), 22050.0, Quality::Linear).unwrap();

        let reset = inner.with(|_| resample.reset()).unwrap();
        assert!(reset.unwrap_err().is_internal());
    }
}

//! Latency-compensating block processing.
//!
//! Plugins may report fewer output samples than they were given (their
//! output is delayed). The engine keeps track of that shortfall for every
//! plugin and lines the output of each plugin up so that the next plugin,
//! and finally the caller, sees one contiguous stream regardless of block
//! size.

use crate::core::audio_buffer::AudioBuffer;
use crate::core::plugin::PluginHandle;
use crate::core::process_spec::ProcessSpec;
use crate::error::{Error, InternalError, Result};
use tracing::{debug, trace};

/// Runs `units` over `buffer` in blocks of at most `spec.maximum_block_size`.
///
/// Returns the number of valid output samples, which start at offset 0 of
/// `buffer`. Anything after them is latency padding to be discarded.
///
/// # The `is_likely_last_call` hint
///
/// The engine cannot tell on its own whether more audio will follow. The
/// caller must say so:
/// * `false`: latency stays inside the plugins and is emitted by later calls.
///   The returned count may be smaller than the input length.
/// * `true`: the buffer is grown by the plugins' latency hints and padded
///   with silence. Every sample a plugin holds back during this call is
///   flushed out, so the returned count equals the input length. Passing
///   `true` too early inserts silence into the stream; never passing it loses
///   the tail of a single-call render.
///
/// `None` entries are skipped.
pub fn process(
    buffer: &mut AudioBuffer,
    spec: &ProcessSpec,
    units: &[Option<PluginHandle>],
    is_likely_last_call: bool,
) -> Result<usize> {
    let valid = process_in_place(buffer, spec, units, is_likely_last_call)?;
    let padding = buffer.num_samples() - valid;
    buffer.shift_left(padding, valid);
    Ok(valid)
}

/// Same as [`process`], but leaves the valid output right-aligned, ending at
/// `buffer.num_samples()`. This is the layout the plugin contract uses.
pub fn process_in_place(
    buffer: &mut AudioBuffer,
    spec: &ProcessSpec,
    units: &[Option<PluginHandle>],
    is_likely_last_call: bool,
) -> Result<usize> {
    run(buffer, spec, units, is_likely_last_call, Acquire::Block).map(|pass| pass.valid)
}

/// How the engine gets hold of each unit.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Acquire<'a> {
    /// Wait for the unit's lock.
    Block,
    /// Leave out a unit unless every lock in its set can be taken right
    /// away. `SkipBusy(sets)[i]` is the lock set of `units[i]`: the unit and
    /// everything nested in it, in identity order. A unit without a set is
    /// its own set.
    SkipBusy(&'a [Vec<PluginHandle>]),
}

/// Outcome of one engine pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Pass {
    /// Valid samples, right-aligned.
    pub valid: usize,
    /// Units left out because they were busy.
    pub skipped: usize,
}

pub(crate) fn run(
    buffer: &mut AudioBuffer,
    spec: &ProcessSpec,
    units: &[Option<PluginHandle>],
    is_likely_last_call: bool,
    acquire: Acquire<'_>,
) -> Result<Pass> {
    spec.validate()?;
    if buffer.num_channels() != spec.channels() {
        return Err(Error::ChannelMismatch {
            expected: spec.channels(),
            actual: buffer.num_channels(),
        });
    }

    if buffer.num_samples() == 0 {
        return Ok(Pass::default());
    }

    let block_size = spec.block_size();
    let intended_output_size = buffer.num_samples();
    let mut expected_latency = 0;

    if is_likely_last_call {
        for unit in units.iter().flatten() {
            expected_latency += unit.latency_hint()?;
        }
        if expected_latency > 0 {
            // Room for the delayed tail. Only the physical size grows here;
            // the intended size follows the shortfall each plugin reports.
            buffer.set_num_samples(intended_output_size + expected_latency);
        }
    }

    let mut cursor = Cursor {
        start_of_output: 0,
        intended_output_size,
        expected_latency,
        is_likely_last_call,
    };
    let mut skipped = 0;

    for (index, slot) in units.iter().enumerate() {
        let Some(unit) = slot else { continue };
        let outcome = match acquire {
            Acquire::Block => Some(cursor.drive(unit, buffer, block_size)),
            Acquire::SkipBusy(lock_sets) => {
                let set = lock_sets
                    .get(index)
                    .map_or(std::slice::from_ref(unit), Vec::as_slice);
                with_all_locked(set, || cursor.drive(unit, buffer, block_size))
            }
        };

        match outcome {
            Some(result) => result?,
            None => skipped += 1,
        }
    }

    let Cursor {
        start_of_output,
        intended_output_size,
        ..
    } = cursor;
    buffer.set_num_samples(intended_output_size);
    Ok(Pass {
        valid: intended_output_size - start_of_output,
        skipped,
    })
}

/// Where one engine pass stands between units.
struct Cursor {
    /// Where the previous plugin's output starts. Everything before it is
    /// latency padding, so this is also the total latency so far.
    start_of_output: usize,
    intended_output_size: usize,
    expected_latency: usize,
    is_likely_last_call: bool,
}

impl Cursor {
    /// Runs `unit` over the valid region of `buffer`, block by block.
    fn drive(&mut self, unit: &PluginHandle, buffer: &mut AudioBuffer, block_size: usize) -> Result<()> {
        let guard = unit.lock();
        let mut received = 0;
        let mut block_start = self.start_of_output;

        while block_start < self.intended_output_size {
            let block_end = (block_start + block_size).min(self.intended_output_size);
            let requested = block_end - block_start;

            let produced = guard.with(|plugin| {
                let mut block = buffer.block_mut(block_start, requested);
                plugin.process(&mut block)
            })??;

            if produced > requested {
                return Err(InternalError::TooManySamples {
                    plugin: unit.name(),
                    produced,
                    requested,
                }
                .into());
            }

            let missing = requested - produced;
            if missing > 0 {
                if received > 0 {
                    // The output of earlier blocks ends at block_start; the
                    // new output starts `missing` samples later. Close the gap.
                    let earlier = block_start - received;
                    buffer.move_within(earlier, received, earlier + missing);
                }

                self.start_of_output += missing;

                if self.is_likely_last_call {
                    self.intended_output_size += missing;
                    if self.intended_output_size > buffer.num_samples() {
                        debug!(
                            plugin = %unit.name(),
                            needed = self.intended_output_size,
                            expected_latency = self.expected_latency,
                            "latency hint was too low; growing buffer mid-stream"
                        );
                        buffer.set_num_samples(self.intended_output_size);
                    }
                }
            }

            received += produced;
            block_start = block_end;
        }

        trace!(
            plugin = %unit.name(),
            received,
            latency = self.start_of_output,
            "plugin pass complete"
        );
        Ok(())
    }
}

/// Try-locks every handle in `set` and runs `f` while holding all of them.
///
/// Returns `None` without running `f` as soon as one lock is held by another
/// thread; the locks taken so far are released on the way out. The guards
/// live on the stack, so nothing is allocated.
fn with_all_locked<R>(set: &[PluginHandle], f: impl FnOnce() -> R) -> Option<R> {
    match set.split_first() {
        None => Some(f()),
        Some((first, rest)) => {
            let _guard = first.try_lock()?;
            with_all_locked(rest, f)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{ramp, BlockBuffered, Overproducer};
    use crate::effects::time::delay::Delay;
    use crate::effects::utility::gain::Gain;

    fn prepared(units: &[Option<PluginHandle>], spec: &ProcessSpec) {
        for unit in units.iter().flatten() {
            unit.prepare(spec).unwrap();
        }
    }

    fn run_streaming(
        input: &AudioBuffer,
        units: &[Option<PluginHandle>],
        block_size: u32,
        chunk: usize,
    ) -> Vec<Vec<f32>> {
        let spec = ProcessSpec::new(44100.0, block_size, input.num_channels() as u32);
        prepared(units, &spec);

        let mut out = vec![Vec::new(); input.num_channels()];
        let total = input.num_samples();
        let mut pos = 0;
        while pos < total {
            let len = chunk.min(total - pos);
            let last = pos + len == total;
            let mut buffer = AudioBuffer::new(input.num_channels(), len);
            for c in 0..input.num_channels() {
                buffer
                    .channel_mut(c)
                    .copy_from_slice(&input.channel(c)[pos..pos + len]);
            }
            let valid = process(&mut buffer, &spec, units, last).unwrap();
            for (c, samples) in out.iter_mut().enumerate() {
                samples.extend_from_slice(&buffer.channel(c)[..valid]);
            }
            pos += len;
        }
        out
    }

    fn make_units() -> Vec<Option<PluginHandle>> {
        vec![
            Some(PluginHandle::new(Delay::new(13).with_compensation(true))),
            Some(PluginHandle::new(BlockBuffered::new(100))),
            Some(PluginHandle::new(Delay::new(5))),
        ]
    }

    #[test]
    fn test_full_block_delay_keeps_length() {
        let spec = ProcessSpec::new(44100.0, 64, 2);
        let units = vec![Some(PluginHandle::new(Delay::new(10)))];
        prepared(&units, &spec);

        let mut buffer = AudioBuffer::new(2, 1000);
        for c in 0..2 {
            buffer.channel_mut(c).fill(1.0);
        }

        let valid = process(&mut buffer, &spec, &units, true).unwrap();
        assert_eq!(valid, 1000);
        assert_eq!(buffer.num_samples(), 1000);
        for c in 0..2 {
            assert!(buffer.channel(c)[..10].iter().all(|&s| s == 0.0));
            assert!(buffer.channel(c)[10..].iter().all(|&s| s == 1.0));
        }
    }

    #[test]
    fn test_compensated_delay_is_removed_on_last_call() {
        let spec = ProcessSpec::new(44100.0, 64, 1);
        let units = vec![Some(PluginHandle::new(Delay::new(10).with_compensation(true)))];
        prepared(&units, &spec);

        let input = ramp(1, 1000);
        let mut buffer = input.clone();
        let valid = process(&mut buffer, &spec, &units, true).unwrap();

        assert_eq!(valid, 1000);
        assert_eq!(&buffer.channel(0)[..valid], input.channel(0));
    }

    #[test]
    fn test_compensated_delay_holds_back_tail_when_more_is_coming() {
        let spec = ProcessSpec::new(44100.0, 64, 1);
        let units = vec![Some(PluginHandle::new(Delay::new(10).with_compensation(true)))];
        prepared(&units, &spec);

        let input = ramp(1, 1000);
        let mut buffer = input.clone();
        let valid = process(&mut buffer, &spec, &units, false).unwrap();

        assert_eq!(valid, 990);
        assert_eq!(buffer.num_samples(), 1000);
        assert_eq!(&buffer.channel(0)[..valid], &input.channel(0)[..990]);
    }

    #[test]
    fn test_gaps_between_blocks_are_closed() {
        // Emits in bursts of 100 samples, so shortfalls happen after output
        // has already started.
        let spec = ProcessSpec::new(44100.0, 64, 2);
        let units = vec![Some(PluginHandle::new(BlockBuffered::new(100)))];
        prepared(&units, &spec);

        let input = ramp(2, 1000);
        let mut buffer = input.clone();
        let valid = process(&mut buffer, &spec, &units, true).unwrap();

        assert_eq!(valid, 1000);
        for c in 0..2 {
            assert_eq!(&buffer.channel(c)[..valid], input.channel(c));
        }
    }

    #[test]
    fn test_latencies_accumulate_across_units() {
        let spec = ProcessSpec::new(44100.0, 32, 1);
        let units = vec![
            Some(PluginHandle::new(Delay::new(7).with_compensation(true))),
            None,
            Some(PluginHandle::new(Gain::new(2.0))),
            Some(PluginHandle::new(BlockBuffered::new(50))),
        ];
        prepared(&units, &spec);

        let input = ramp(1, 500);
        let mut buffer = input.clone();
        let valid = process(&mut buffer, &spec, &units, true).unwrap();

        assert_eq!(valid, 500);
        for (out, inp) in buffer.channel(0)[..valid].iter().zip(input.channel(0)) {
            assert_eq!(*out, inp * 2.0);
        }
    }

    #[test]
    fn test_block_size_independence() {
        let input = ramp(2, 5000);
        let reference = run_streaming(&input, &make_units(), 8192, 5000);
        assert_eq!(reference[0].len(), 5000);

        for &block_size in &[1u32, 7, 64, 4096] {
            let out = run_streaming(&input, &make_units(), block_size, 5000);
            assert_eq!(out, reference, "block size {block_size}");
        }
    }

    #[test]
    fn test_streamed_chunks_are_a_prefix_of_single_call() {
        let input = ramp(2, 5000);
        let reference = run_streaming(&input, &make_units(), 8192, 5000);

        for &(block_size, chunk) in &[(64u32, 333usize), (7, 1000), (4096, 1)] {
            let out = run_streaming(&input, &make_units(), block_size, chunk);
            for c in 0..2 {
                // Whatever is still inside the plugins when the last chunk
                // arrives without a shortfall of its own stays there.
                assert!(out[c].len() >= 5000 - 13 - 100);
                assert_eq!(out[c][..], reference[c][..out[c].len()], "block {block_size}, chunk {chunk}");
            }
        }
    }

    #[test]
    fn test_too_many_samples_is_internal_error() {
        let spec = ProcessSpec::new(44100.0, 16, 1);
        let units = vec![Some(PluginHandle::new(Overproducer))];
        let mut buffer = AudioBuffer::new(1, 64);

        let err = process(&mut buffer, &spec, &units, false).unwrap_err();
        assert!(err.is_internal());
        assert!(err.to_string().starts_with("internal error"));
    }

    #[test]
    fn test_channel_mismatch_is_rejected() {
        let spec = ProcessSpec::new(44100.0, 16, 2);
        let mut buffer = AudioBuffer::new(1, 64);
        let err = process(&mut buffer, &spec, &[], false).unwrap_err();
        assert!(matches!(err, Error::ChannelMismatch { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_zero_length_input_does_not_allocate() {
        let spec = ProcessSpec::new(44100.0, 16, 1);
        let units = vec![Some(PluginHandle::new(Delay::new(10)))];
        prepared(&units, &spec);

        let mut buffer = AudioBuffer::with_capacity(1, 0);
        assert_eq!(process(&mut buffer, &spec, &units, false).unwrap(), 0);
        assert_eq!(buffer.capacity(), 0);
        assert_eq!(buffer.num_samples(), 0);
    }

    #[test]
    fn test_streaming_emits_held_back_samples_later() {
        let spec = ProcessSpec::new(44100.0, 16, 1);
        let units = vec![Some(PluginHandle::new(Delay::new(4).with_compensation(true)))];
        prepared(&units, &spec);

        let mut first = AudioBuffer::from_channels(&[vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]]).unwrap();
        let valid = process(&mut first, &spec, &units, false).unwrap();
        assert_eq!(&first.channel(0)[..valid], &[1.0, 2.0]);

        let mut second = AudioBuffer::from_channels(&[vec![7.0, 8.0, 9.0]]).unwrap();
        let valid = process(&mut second, &spec, &units, false).unwrap();
        assert_eq!(&second.channel(0)[..valid], &[3.0, 4.0, 5.0]);
    }
}

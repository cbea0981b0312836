use crate::core::audio_buffer::{AudioBlock, AudioBuffer};
use crate::core::plugin::{Plugin, PluginHandle};
use crate::core::process_spec::ProcessSpec;
use crate::error::{Error, InternalError, Result};
use tracing::warn;
use wide::f32x4;

/// Runs plugins in parallel on the same input and sums their outputs.
///
/// Branches may have different latencies. Each branch accumulates its output
/// in a private buffer, and a block only emits as many samples as every
/// branch has produced, so the summed streams always stay aligned.
#[derive(Default)]
pub struct Mix {
    branches: Vec<Option<PluginHandle>>,
    buffers: Vec<AudioBuffer>,
    spec: Option<ProcessSpec>,
}

impl Mix {
    /// Creates an empty Mix. With no branches it outputs silence.
    pub fn new() -> Self {
        Mix::default()
    }

    /// Creates a Mix over existing handles.
    pub fn from_handles(branches: Vec<Option<PluginHandle>>) -> Self {
        Mix {
            branches,
            ..Mix::default()
        }
    }

    /// Adds a branch.
    pub fn and(self, plugin: impl Plugin + 'static) -> Self {
        self.and_handle(Some(PluginHandle::new(plugin)))
    }

    /// Adds a shared plugin as a branch, or a dry (`None`) branch.
    pub fn and_handle(mut self, plugin: Option<PluginHandle>) -> Self {
        self.branches.push(plugin);
        self
    }

    pub fn branches(&self) -> &[Option<PluginHandle>] {
        &self.branches
    }

    /// Returns a graph visualization of the mix.
    pub fn get_graph(&self) -> String {
        self.visualize(0)
    }
}

/// Adds `src` into `dst` four samples at a time.
fn accumulate(dst: &mut [f32], src: &[f32]) {
    let (dst_chunks, dst_rem) = dst.as_chunks_mut::<4>();
    let (src_chunks, src_rem) = src.as_chunks::<4>();

    for (d, s) in dst_chunks.iter_mut().zip(src_chunks.iter()) {
        *d = (f32x4::from(*d) + f32x4::from(*s)).to_array();
    }

    for (d, s) in dst_rem.iter_mut().zip(src_rem.iter()) {
        *d += *s;
    }
}

impl Plugin for Mix {
    fn prepare(&mut self, spec: &ProcessSpec) -> Result<()> {
        spec.validate()?;
        // Re-preparing with the same spec keeps audio that is still in flight.
        let keep = self.spec == Some(*spec) && self.buffers.len() == self.branches.len();
        self.buffers.resize_with(self.branches.len(), AudioBuffer::default);

        for (branch, buffer) in self.branches.iter().zip(self.buffers.iter_mut()) {
            let hint = match branch {
                Some(plugin) => {
                    plugin.prepare(spec)?;
                    plugin.latency_hint()?
                }
                None => 0,
            };
            let pending = if keep { buffer.num_samples() } else { 0 };
            // Pending audio already fits the current allocation.
            buffer.reserve(spec.channels(), hint + spec.block_size());
            buffer.set_size(spec.channels(), pending);
        }

        self.spec = Some(*spec);
        Ok(())
    }

    fn process(&mut self, block: &mut AudioBlock<'_>) -> Result<usize> {
        let spec = self
            .spec
            .ok_or_else(|| Error::invalid("spec", "Mix::process() called before prepare()"))?;
        if block.num_channels() != spec.channels() {
            return Err(Error::ChannelMismatch {
                expected: spec.channels(),
                actual: block.num_channels(),
            });
        }
        if self.buffers.len() != self.branches.len() {
            return Err(Error::invalid("branches", "branches changed since prepare()"));
        }

        let n = block.num_samples();
        let mut max_available = n;

        for (branch, buffer) in self.branches.iter().zip(self.buffers.iter_mut()) {
            // Every sample in the branch buffer is valid output that has not
            // been emitted yet, oldest first.
            let start = buffer.num_samples();
            if buffer.set_num_samples(start + n) {
                warn!(
                    branch = %branch.as_ref().map_or_else(|| String::from("dry"), PluginHandle::name),
                    needed = start + n,
                    "Mix branch buffer too small for its latency; reallocated"
                );
            }
            buffer.copy_from_block(start, block);

            let produced = match branch {
                Some(plugin) => {
                    let produced = plugin.with(|p| p.process(&mut buffer.block_mut(start, n)))??;
                    if produced > n {
                        return Err(InternalError::TooManySamples {
                            plugin: plugin.name(),
                            produced,
                            requested: n,
                        }
                        .into());
                    }
                    produced
                }
                None => n,
            };

            // Output is right-aligned in the region just processed; slide it
            // down so the buffer stays contiguous.
            buffer.move_within(start + n - produced, produced, start);
            buffer.set_num_samples(start + produced);
            max_available = max_available.min(start + produced);
        }

        let first_silent = n - max_available;
        block.clear();
        if max_available > 0 {
            for buffer in &self.buffers {
                for c in 0..block.num_channels() {
                    accumulate(
                        &mut block.channel_mut(c)[first_silent..],
                        &buffer.channel(c)[..max_available],
                    );
                }
            }
            for buffer in &mut self.buffers {
                let remaining = buffer.num_samples() - max_available;
                buffer.shift_left(max_available, remaining);
                buffer.set_num_samples(remaining);
            }
        }

        Ok(max_available)
    }

    fn reset(&mut self) -> Result<()> {
        for buffer in &mut self.buffers {
            buffer.set_num_samples(0);
        }
        for plugin in self.branches.iter().flatten() {
            plugin.reset()?;
        }
        Ok(())
    }

    fn latency_hint(&self) -> Result<usize> {
        let mut max = 0;
        for plugin in self.branches.iter().flatten() {
            max = max.max(plugin.latency_hint()?);
        }
        Ok(max)
    }

    fn children(&self) -> Vec<PluginHandle> {
        self.branches.iter().flatten().cloned().collect()
    }

    fn name(&self) -> &str {
        "Mix"
    }

    #[cfg(feature = "debug_visualize")]
    fn visualize(&self, indent: usize) -> String {
        let mut output = String::new();
        let spaces = " ".repeat(indent);
        output.push_str(&format!("{}Mix (sum of {} branches)\n", spaces, self.branches.len()));
        for (i, branch) in self.branches.iter().enumerate() {
            output.push_str(&format!("{}  +-- Branch {}:\n", spaces, i));
            match branch {
                Some(p) => output.push_str(
                    &p.with(|p| p.visualize(indent + 6))
                        .unwrap_or_else(|_| format!("{}      {}\n", spaces, p.name())),
                ),
                None => output.push_str(&format!("{}      (dry)\n", spaces)),
            }
        }
        output
    }
}

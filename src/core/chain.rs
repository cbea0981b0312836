use crate::core::audio_buffer::{AudioBlock, AudioBuffer};
use crate::core::engine;
use crate::core::plugin::{Plugin, PluginHandle};
use crate::core::process_spec::ProcessSpec;
use crate::error::{Error, Result};
use tracing::warn;

/// A chain of plugins.
///
/// Processes audio sequentially through a list of plugins, compensating for
/// the latency each of them reports. `None` entries pass audio through.
#[derive(Default)]
pub struct Chain {
    plugins: Vec<Option<PluginHandle>>,
    scratch: AudioBuffer,
    spec: Option<ProcessSpec>,
}

impl Chain {
    /// Creates an empty Chain.
    pub fn new() -> Self {
        Chain::default()
    }

    /// Creates a Chain over existing handles.
    pub fn from_handles(plugins: Vec<Option<PluginHandle>>) -> Self {
        Chain {
            plugins,
            ..Chain::default()
        }
    }

    /// Appends a plugin to the chain.
    pub fn and(self, plugin: impl Plugin + 'static) -> Self {
        self.and_handle(Some(PluginHandle::new(plugin)))
    }

    /// Appends a shared plugin, or an empty slot.
    pub fn and_handle(mut self, plugin: Option<PluginHandle>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn push(&mut self, plugin: Option<PluginHandle>) {
        self.plugins.push(plugin);
    }

    pub fn insert(&mut self, index: usize, plugin: Option<PluginHandle>) -> Result<()> {
        if index > self.plugins.len() {
            return Err(Error::invalid(
                "index",
                format!("{index} is past the end of a chain of {}", self.plugins.len()),
            ));
        }
        self.plugins.insert(index, plugin);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<Option<PluginHandle>> {
        if index >= self.plugins.len() {
            return Err(Error::invalid(
                "index",
                format!("{index} is out of range for a chain of {}", self.plugins.len()),
            ));
        }
        Ok(self.plugins.remove(index))
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn plugins(&self) -> &[Option<PluginHandle>] {
        &self.plugins
    }

    /// Returns a graph visualization of the entire chain.
    pub fn get_graph(&self) -> String {
        self.visualize(0)
    }
}

impl Plugin for Chain {
    fn prepare(&mut self, spec: &ProcessSpec) -> Result<()> {
        spec.validate()?;
        self.scratch.reserve(spec.channels(), spec.block_size());
        self.scratch.set_size(spec.channels(), 0);
        for plugin in self.plugins.iter().flatten() {
            plugin.prepare(spec)?;
        }
        self.spec = Some(*spec);
        Ok(())
    }

    fn process(&mut self, block: &mut AudioBlock<'_>) -> Result<usize> {
        let spec = self
            .spec
            .ok_or_else(|| Error::invalid("spec", "Chain::process() called before prepare()"))?;
        if block.num_channels() != spec.channels() {
            return Err(Error::ChannelMismatch {
                expected: spec.channels(),
                actual: block.num_channels(),
            });
        }

        let n = block.num_samples();
        if self.scratch.set_size(spec.channels(), n) {
            warn!(
                samples = n,
                maximum_block_size = spec.maximum_block_size,
                "Chain given a block larger than prepared for; reallocated"
            );
        }
        self.scratch.copy_from_block(0, block);

        // The whole block fits in one engine block, so the valid output is
        // the tail of the scratch buffer, exactly where the caller expects it.
        let valid = engine::process_in_place(&mut self.scratch, &spec, &self.plugins, false)?;
        block.copy_from(&self.scratch.as_block_mut());
        Ok(valid)
    }

    fn reset(&mut self) -> Result<()> {
        for plugin in self.plugins.iter().flatten() {
            plugin.reset()?;
        }
        Ok(())
    }

    fn latency_hint(&self) -> Result<usize> {
        self.plugins
            .iter()
            .flatten()
            .map(PluginHandle::latency_hint)
            .sum()
    }

    fn children(&self) -> Vec<PluginHandle> {
        self.plugins.iter().flatten().cloned().collect()
    }

    fn name(&self) -> &str {
        "Chain"
    }

    #[cfg(feature = "debug_visualize")]
    fn visualize(&self, indent: usize) -> String {
        let mut output = String::new();
        let spaces = " ".repeat(indent);
        let arrow_spaces = " ".repeat(indent + 2);

        output.push_str(&format!("{}Chain Start\n", spaces));
        output.push_str(&format!("{}|\n", arrow_spaces));
        output.push_str(&format!("{}v\n", arrow_spaces));

        for plugin in &self.plugins {
            match plugin {
                Some(p) => output.push_str(
                    &p.with(|p| p.visualize(indent))
                        .unwrap_or_else(|_| format!("{}{}\n", spaces, p.name())),
                ),
                None => output.push_str(&format!("{}(empty)\n", spaces)),
            }
            output.push_str(&format!("{}|\n", arrow_spaces));
            output.push_str(&format!("{}v\n", arrow_spaces));
        }

        output.push_str(&format!("{}Output\n", spaces));
        output
    }
}

use crate::core::audio_buffer::AudioBlock;
use crate::core::process_spec::ProcessSpec;
use crate::error::Result;
use crate::Plugin;

/// A plugin that does nothing.
///
/// Passes the input signal directly to the output unchanged. Behaves exactly
/// like an empty (`None`) slot in a chain or mix, but is a real instance.
pub struct Passthrough;

impl Passthrough {
    /// Creates a new Passthrough plugin.
    pub fn new() -> Self {
        Passthrough
    }
}

impl Default for Passthrough {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for Passthrough {
    fn prepare(&mut self, _spec: &ProcessSpec) -> Result<()> {
        Ok(())
    }

    fn process(&mut self, block: &mut AudioBlock<'_>) -> Result<usize> {
        Ok(block.num_samples())
    }

    fn name(&self) -> &str {
        "Passthrough"
    }
}

//! Rendering a whole buffer in one go.
//!
//! Every plugin reachable from the render is locked up front, in a global
//! order (by identity), so two renders that share plugins can never deadlock
//! and nobody else can touch a plugin halfway through a render.

use crate::core::audio_buffer::AudioBuffer;
use crate::core::engine;
use crate::core::plugin::{distinct_plugins, PluginGuard, PluginHandle};
use crate::core::process_spec::ProcessSpec;
use crate::error::Result;
use tracing::debug;

/// Every distinct plugin reachable from `units`, in lock order.
///
/// Fails with [`Error::DuplicatePlugin`](crate::Error::DuplicatePlugin) if an
/// instance is reachable twice. Nothing is locked yet at that point.
pub fn lock_order(units: &[Option<PluginHandle>]) -> Result<Vec<PluginHandle>> {
    let mut plugins = distinct_plugins(units)?;
    plugins.sort_by_key(PluginHandle::id);
    Ok(plugins)
}

/// Locks `ordered` front to back. Pass the result of [`lock_order`].
pub fn lock_all(ordered: &[PluginHandle]) -> Vec<PluginGuard<'_>> {
    ordered.iter().map(PluginHandle::lock).collect()
}

/// Runs `units` over a copy of `input` and returns the processed audio.
///
/// `reset` does double duty: it marks this as the last call, so the output
/// has the same length as the input with every plugin's tail flushed, and it
/// resets the plugins afterwards. Pass `false` to stream a long signal
/// through several calls; the output of each call may then be shorter than
/// its input, and the remainder comes out of later calls.
pub fn render(
    input: &AudioBuffer,
    sample_rate: f64,
    units: &[Option<PluginHandle>],
    buffer_size: u32,
    reset: bool,
) -> Result<AudioBuffer> {
    let spec = ProcessSpec::new(sample_rate, buffer_size, input.num_channels() as u32);
    spec.validate()?;

    let ordered = lock_order(units)?;
    let _guards = lock_all(&ordered);

    for unit in units.iter().flatten() {
        unit.prepare(&spec)?;
    }

    let mut output = input.clone();
    let valid = engine::process(&mut output, &spec, units, reset)?;
    output.set_num_samples(valid);

    debug!(
        plugins = ordered.len(),
        input = input.num_samples(),
        output = valid,
        "offline render complete"
    );

    if reset {
        for unit in units.iter().flatten() {
            unit.reset()?;
        }
    }

    Ok(output)
}

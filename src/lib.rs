//! Latency-compensating block processing for multi-channel audio.
//!
//! Plugins are driven over arbitrarily long buffers in fixed-size blocks by
//! [`core::engine`]. Each plugin may hold back part of its output (report a
//! shortfall); the engine lines everything up again so the caller sees the
//! same stream no matter how it chunks its input. [`core::chain::Chain`] and
//! [`core::mix::Mix`] compose plugins in series and in parallel, and
//! [`resample`] adds a constant-memory streaming sample-rate converter.

pub mod core;
pub mod effects;
pub mod error;
pub mod resample;

pub use crate::core::audio_buffer::{AudioBlock, AudioBuffer};
pub use crate::core::plugin::{Plugin, PluginHandle};
pub use crate::core::process_spec::ProcessSpec;
pub use crate::error::{Error, InternalError, Result};

pub mod interpolator;
pub mod quality;
pub mod resample_plugin;
pub mod resampled_source;
pub mod stream_resampler;

pub use interpolator::Interpolator;
pub use quality::Quality;
pub use resample_plugin::Resample;
pub use resampled_source::{MemorySource, ResampledSource, SampleSource};
pub use stream_resampler::{SeekPlan, StreamResampler};

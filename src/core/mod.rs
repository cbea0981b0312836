pub mod audio_buffer;
pub mod chain;
pub mod engine;
pub mod live;
pub mod mix;
pub mod offline;
pub mod plugin;
pub mod process_spec;
pub mod ring_buffer;

#[cfg(test)]
pub(crate) mod test_support;

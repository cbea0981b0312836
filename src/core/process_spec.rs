use crate::error::{Error, Result};

/// Processing parameters a plugin is prepared with.
///
/// A plugin must be prepared again whenever any of these change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProcessSpec {
    pub sample_rate: f64,
    pub maximum_block_size: u32,
    pub num_channels: u32,
}

impl ProcessSpec {
    pub fn new(sample_rate: f64, maximum_block_size: u32, num_channels: u32) -> Self {
        ProcessSpec {
            sample_rate,
            maximum_block_size,
            num_channels,
        }
    }

    /// Rejects specs no plugin could be prepared with.
    pub fn validate(&self) -> Result<()> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(Error::invalid(
                "sample_rate",
                format!("must be a positive number, got {}", self.sample_rate),
            ));
        }
        if self.maximum_block_size == 0 {
            return Err(Error::invalid("maximum_block_size", "must be at least 1"));
        }
        if self.num_channels == 0 {
            return Err(Error::invalid("num_channels", "must be at least 1"));
        }
        Ok(())
    }

    pub fn block_size(&self) -> usize {
        self.maximum_block_size as usize
    }

    pub fn channels(&self) -> usize {
        self.num_channels as usize
    }
}

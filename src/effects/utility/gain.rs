use crate::core::audio_buffer::AudioBlock;
use crate::core::process_spec::ProcessSpec;
use crate::error::{Error, Result};
use crate::Plugin;
use wide::f32x4;

/// A simple gain plugin.
///
/// Multiplies the signal by a constant linear factor.
pub struct Gain {
    gain: f32,
}

impl Gain {
    /// Creates a new Gain plugin.
    ///
    /// # Arguments
    /// * `gain` - The gain factor (linear).
    pub fn new(gain: f32) -> Self {
        Gain { gain }
    }

    /// Creates a new Gain plugin from a decibel value.
    pub fn new_db(db: f32) -> Self {
        Gain {
            gain: libm::powf(10.0, db / 20.0),
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) -> Result<()> {
        if !gain.is_finite() {
            return Err(Error::invalid("gain", format!("must be finite, got {gain}")));
        }
        self.gain = gain;
        Ok(())
    }
}

impl Plugin for Gain {
    fn prepare(&mut self, _spec: &ProcessSpec) -> Result<()> {
        Ok(())
    }

    fn process(&mut self, block: &mut AudioBlock<'_>) -> Result<usize> {
        let gain_vec = f32x4::splat(self.gain);
        for c in 0..block.num_channels() {
            let (chunks, remainder) = block.channel_mut(c).as_chunks_mut::<4>();

            for chunk in chunks {
                let vec = f32x4::from(*chunk);
                *chunk = (vec * gain_vec).to_array();
            }

            for sample in remainder {
                *sample *= self.gain;
            }
        }
        Ok(block.num_samples())
    }

    fn name(&self) -> &str {
        "Gain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain() {
        let mut gain = Gain::new(0.5);
        let mut data = [1.0, -1.0, 0.0, 0.5, 2.0, 4.0];
        let mut block = AudioBlock::from_planar(&mut data, 2);
        assert_eq!(gain.process(&mut block).unwrap(), 3);

        assert_eq!(data, [0.5, -0.5, 0.0, 0.25, 1.0, 2.0]);
    }

    #[test]
    fn test_gain_db() {
        let mut gain = Gain::new_db(-6.0);
        let mut data = [1.0];
        gain.process(&mut AudioBlock::from_planar(&mut data, 1)).unwrap();

        assert!((data[0] - 0.501187).abs() < 0.001);
    }

    #[test]
    fn test_rejects_non_finite_gain() {
        let mut gain = Gain::new(1.0);
        assert!(gain.set_gain(f32::INFINITY).is_err());
        assert_eq!(gain.gain(), 1.0);
    }
}

use crate::error::{Error, Result};

/// Owned, non-interleaved multi-channel sample storage.
///
/// All channels live in one allocation with a fixed stride equal to the
/// capacity, so changing the number of samples within capacity never
/// reallocates.
#[derive(Clone, Debug, Default)]
pub struct AudioBuffer {
    data: Vec<f32>,
    num_channels: usize,
    num_samples: usize,
    capacity: usize,
}

impl AudioBuffer {
    /// Creates a zeroed buffer.
    pub fn new(num_channels: usize, num_samples: usize) -> Self {
        AudioBuffer {
            data: vec![0.0; num_channels * num_samples],
            num_channels,
            num_samples,
            capacity: num_samples,
        }
    }

    /// Creates an empty buffer that can hold `capacity` samples per channel
    /// without reallocating.
    pub fn with_capacity(num_channels: usize, capacity: usize) -> Self {
        AudioBuffer {
            data: vec![0.0; num_channels * capacity],
            num_channels,
            num_samples: 0,
            capacity,
        }
    }

    /// Builds a buffer from per-channel sample vectors of equal length.
    pub fn from_channels<C: AsRef<[f32]>>(channels: &[C]) -> Result<Self> {
        let num_samples = channels.first().map_or(0, |c| c.as_ref().len());
        if channels.iter().any(|c| c.as_ref().len() != num_samples) {
            return Err(Error::invalid("channels", "all channels must have the same length"));
        }

        let mut buffer = AudioBuffer::new(channels.len(), num_samples);
        for (c, samples) in channels.iter().enumerate() {
            buffer.channel_mut(c).copy_from_slice(samples.as_ref());
        }
        Ok(buffer)
    }

    /// Builds a buffer from interleaved frames.
    pub fn from_interleaved(samples: &[f32], num_channels: usize) -> Self {
        let num_samples = if num_channels == 0 { 0 } else { samples.len() / num_channels };
        let mut buffer = AudioBuffer::new(num_channels, num_samples);
        for (i, frame) in samples.chunks_exact(num_channels.max(1)).enumerate().take(num_samples) {
            for (c, &s) in frame.iter().enumerate() {
                buffer.channel_mut(c)[i] = s;
            }
        }
        buffer
    }

    /// Writes the buffer into `out` as interleaved frames. Returns the number
    /// of frames written.
    pub fn write_interleaved(&self, out: &mut [f32]) -> usize {
        let channels = self.num_channels.max(1);
        let frames = self.num_samples.min(out.len() / channels);
        for (i, frame) in out.chunks_exact_mut(channels).take(frames).enumerate() {
            for (c, s) in frame.iter_mut().enumerate() {
                *s = self.channel(c)[i];
            }
        }
        frames
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Samples per channel that fit without reallocating.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        assert!(channel < self.num_channels, "channel {channel} out of range");
        let start = channel * self.capacity;
        &self.data[start..start + self.num_samples]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        assert!(channel < self.num_channels, "channel {channel} out of range");
        let start = channel * self.capacity;
        &mut self.data[start..start + self.num_samples]
    }

    /// Copies the content into one `Vec` per channel.
    pub fn to_channels(&self) -> Vec<Vec<f32>> {
        (0..self.num_channels).map(|c| self.channel(c).to_vec()).collect()
    }

    /// Makes sure `num_channels` x `capacity` samples fit. Existing content is
    /// kept. Returns true if this had to reallocate.
    pub fn reserve(&mut self, num_channels: usize, capacity: usize) -> bool {
        if capacity <= self.capacity && num_channels * self.capacity <= self.data.len() {
            return false;
        }

        let new_capacity = capacity.max(self.capacity);
        let mut data = vec![0.0; num_channels * new_capacity];
        for c in 0..self.num_channels.min(num_channels) {
            let src = c * self.capacity;
            let dst = c * new_capacity;
            data[dst..dst + self.num_samples]
                .copy_from_slice(&self.data[src..src + self.num_samples]);
        }

        self.data = data;
        self.capacity = new_capacity;
        true
    }

    /// Resizes the buffer, keeping existing content and zeroing any newly
    /// exposed samples. Returns true if this had to reallocate.
    pub fn set_size(&mut self, num_channels: usize, num_samples: usize) -> bool {
        let reallocated = self.reserve(num_channels, num_samples);

        for c in 0..num_channels {
            let start = c * self.capacity;
            let keep = if c < self.num_channels { self.num_samples } else { 0 };
            if num_samples > keep {
                self.data[start + keep..start + num_samples].fill(0.0);
            }
        }

        self.num_channels = num_channels;
        self.num_samples = num_samples;
        reallocated
    }

    /// Same as [`set_size`](Self::set_size) with the current channel count.
    pub fn set_num_samples(&mut self, num_samples: usize) -> bool {
        self.set_size(self.num_channels, num_samples)
    }

    /// Zeroes every sample in use.
    pub fn clear(&mut self) {
        for c in 0..self.num_channels {
            self.channel_mut(c).fill(0.0);
        }
    }

    /// Moves `keep` samples starting at `by` to the front of every channel.
    ///
    /// Samples after `keep` are left as they were.
    pub fn shift_left(&mut self, by: usize, keep: usize) {
        assert!(
            by + keep <= self.num_samples,
            "shift_left({by}, {keep}) out of range for {} samples",
            self.num_samples
        );
        if by == 0 || keep == 0 {
            return;
        }
        for c in 0..self.num_channels {
            self.channel_mut(c).copy_within(by..by + keep, 0);
        }
    }

    /// Copies `len` samples from `src` to `dst` in every channel. The ranges
    /// may overlap.
    pub fn move_within(&mut self, src: usize, len: usize, dst: usize) {
        assert!(src.max(dst) + len <= self.num_samples, "move_within out of range");
        if len == 0 || src == dst {
            return;
        }
        for c in 0..self.num_channels {
            self.channel_mut(c).copy_within(src..src + len, dst);
        }
    }

    /// Copies `block` into this buffer starting at `dst_start`.
    pub fn copy_from_block(&mut self, dst_start: usize, block: &AudioBlock<'_>) {
        let len = block.num_samples();
        for c in 0..self.num_channels.min(block.num_channels()) {
            self.channel_mut(c)[dst_start..dst_start + len].copy_from_slice(block.channel(c));
        }
    }

    /// Borrows `len` samples starting at `start` of every channel.
    pub fn block_mut(&mut self, start: usize, len: usize) -> AudioBlock<'_> {
        assert!(start + len <= self.num_samples, "block out of range");
        let used = self.num_channels * self.capacity;
        AudioBlock {
            data: &mut self.data[..used],
            stride: self.capacity,
            offset: start,
            num_samples: len,
            num_channels: self.num_channels,
        }
    }

    /// Borrows the whole buffer.
    pub fn as_block_mut(&mut self) -> AudioBlock<'_> {
        let len = self.num_samples;
        self.block_mut(0, len)
    }
}

/// A mutable view of the same sample range across every channel.
///
/// This is what plugins receive: they read their input from it and write
/// their output back into it.
pub struct AudioBlock<'a> {
    data: &'a mut [f32],
    stride: usize,
    offset: usize,
    num_samples: usize,
    num_channels: usize,
}

impl<'a> AudioBlock<'a> {
    /// Wraps planar storage: `num_channels` channels laid out back to back.
    pub fn from_planar(data: &'a mut [f32], num_channels: usize) -> Self {
        let stride = if num_channels == 0 { 0 } else { data.len() / num_channels };
        AudioBlock {
            data,
            stride,
            offset: 0,
            num_samples: stride,
            num_channels,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        assert!(channel < self.num_channels, "channel {channel} out of range");
        let start = channel * self.stride + self.offset;
        &self.data[start..start + self.num_samples]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        assert!(channel < self.num_channels, "channel {channel} out of range");
        let start = channel * self.stride + self.offset;
        &mut self.data[start..start + self.num_samples]
    }

    pub fn clear(&mut self) {
        for c in 0..self.num_channels {
            self.channel_mut(c).fill(0.0);
        }
    }

    /// Copies every channel of `other`, which must have the same shape.
    pub fn copy_from(&mut self, other: &AudioBlock<'_>) {
        assert_eq!(self.num_samples, other.num_samples);
        for c in 0..self.num_channels.min(other.num_channels) {
            self.channel_mut(c).copy_from_slice(other.channel(c));
        }
    }

    /// Reborrows `len` samples starting at `start`.
    pub fn sub_block(&mut self, start: usize, len: usize) -> AudioBlock<'_> {
        assert!(start + len <= self.num_samples, "sub-block out of range");
        AudioBlock {
            data: &mut *self.data,
            stride: self.stride,
            offset: self.offset + start,
            num_samples: len,
            num_channels: self.num_channels,
        }
    }

    /// Copies `len` samples from `src` to `dst` in every channel.
    pub fn move_within(&mut self, src: usize, len: usize, dst: usize) {
        assert!(src.max(dst) + len <= self.num_samples, "move_within out of range");
        if len == 0 || src == dst {
            return;
        }
        for c in 0..self.num_channels {
            self.channel_mut(c).copy_within(src..src + len, dst);
        }
    }
}

//! Bounded multi-channel FIFOs.
//!
//! Every push is checked against the free space up front. Overflowing a ring
//! means some latency accounting upstream is wrong, so it is reported as an
//! internal error instead of silently dropping samples.

use crate::core::audio_buffer::{AudioBlock, AudioBuffer};
use crate::error::{InternalError, Result};

/// A fixed-capacity FIFO holding the same number of samples in every channel.
#[derive(Clone, Debug)]
pub struct RingBuffer {
    label: &'static str,
    data: Vec<f32>,
    num_channels: usize,
    capacity: usize,
    head: usize,
    len: usize,
}

impl RingBuffer {
    /// `label` names the ring in error messages.
    pub fn new(label: &'static str, num_channels: usize, capacity: usize) -> Self {
        RingBuffer {
            label,
            data: vec![0.0; num_channels * capacity],
            num_channels,
            capacity,
            head: 0,
            len: 0,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples per channel waiting to be read.
    pub fn available(&self) -> usize {
        self.len
    }

    pub fn free_space(&self) -> usize {
        self.capacity - self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Resizes to the given shape and empties the ring. Only reallocates when
    /// the shape actually changes.
    pub fn resize(&mut self, num_channels: usize, capacity: usize) {
        if num_channels != self.num_channels || capacity != self.capacity {
            self.data = vec![0.0; num_channels * capacity];
            self.num_channels = num_channels;
            self.capacity = capacity;
        }
        self.clear();
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    fn check_push(&self, requested: usize) -> Result<()> {
        if requested > self.free_space() {
            return Err(InternalError::CapacityExceeded {
                region: self.label,
                requested,
                free: self.free_space(),
            }
            .into());
        }
        Ok(())
    }

    fn check_pop(&self, requested: usize) -> Result<()> {
        if requested > self.len {
            return Err(InternalError::Underflow {
                region: self.label,
                requested,
                available: self.len,
            }
            .into());
        }
        Ok(())
    }

    fn write_channel(&mut self, channel: usize, samples: &[f32]) {
        let base = channel * self.capacity;
        let tail = (self.head + self.len) % self.capacity.max(1);
        let first = samples.len().min(self.capacity - tail);
        self.data[base + tail..base + tail + first].copy_from_slice(&samples[..first]);
        let rest = samples.len() - first;
        self.data[base..base + rest].copy_from_slice(&samples[first..]);
    }

    fn read_channel(&self, channel: usize, out: &mut [f32]) {
        let (a, b) = self.channel_slices(channel);
        let first = out.len().min(a.len());
        out[..first].copy_from_slice(&a[..first]);
        let rest = out.len() - first;
        out[first..].copy_from_slice(&b[..rest]);
    }

    /// Appends `samples` to one channel without committing the length.
    /// Callers must write the same count to every channel and then
    /// [`commit`](Self::commit) it.
    fn stage(&mut self, channel: usize, samples: &[f32]) {
        if channel < self.num_channels && !samples.is_empty() {
            self.write_channel(channel, samples);
        }
    }

    fn commit(&mut self, len: usize) {
        self.len += len;
    }

    /// Appends every channel of `block`.
    pub fn push_block(&mut self, block: &AudioBlock<'_>) -> Result<()> {
        let len = block.num_samples();
        self.check_push(len)?;
        for c in 0..self.num_channels.min(block.num_channels()) {
            self.stage(c, block.channel(c));
        }
        self.commit(len);
        Ok(())
    }

    /// Appends `len` samples of every channel of `buffer`, starting at
    /// `start`.
    pub fn push_buffer(&mut self, buffer: &AudioBuffer, start: usize, len: usize) -> Result<()> {
        self.check_push(len)?;
        for c in 0..self.num_channels.min(buffer.num_channels()) {
            self.stage(c, &buffer.channel(c)[start..start + len]);
        }
        self.commit(len);
        Ok(())
    }

    /// Appends silence.
    pub fn push_silence(&mut self, len: usize) -> Result<()> {
        self.check_push(len)?;
        let tail = (self.head + self.len) % self.capacity.max(1);
        for c in 0..self.num_channels {
            let base = c * self.capacity;
            let first = len.min(self.capacity - tail);
            self.data[base + tail..base + tail + first].fill(0.0);
            self.data[base..base + len - first].fill(0.0);
        }
        self.commit(len);
        Ok(())
    }

    /// Moves the oldest `block.num_samples()` samples into `block`.
    pub fn pop_into(&mut self, block: &mut AudioBlock<'_>) -> Result<()> {
        let len = block.num_samples();
        self.check_pop(len)?;
        for c in 0..self.num_channels.min(block.num_channels()) {
            self.read_channel(c, block.channel_mut(c));
        }
        self.discard(len)
    }

    /// Copies the oldest `len` samples into `buffer` at `start` without
    /// removing them.
    pub fn peek_into(&self, buffer: &mut AudioBuffer, start: usize, len: usize) -> Result<()> {
        self.check_pop(len)?;
        for c in 0..self.num_channels.min(buffer.num_channels()) {
            self.read_channel(c, &mut buffer.channel_mut(c)[start..start + len]);
        }
        Ok(())
    }

    /// Drops the oldest `len` samples.
    pub fn discard(&mut self, len: usize) -> Result<()> {
        self.check_pop(len)?;
        if len == self.len {
            self.clear();
        } else {
            self.head = (self.head + len) % self.capacity;
            self.len -= len;
        }
        Ok(())
    }

    /// The readable samples of one channel, oldest first, as two slices.
    pub fn channel_slices(&self, channel: usize) -> (&[f32], &[f32]) {
        assert!(channel < self.num_channels, "channel {channel} out of range");
        let base = channel * self.capacity;
        let first = self.len.min(self.capacity - self.head);
        (
            &self.data[base + self.head..base + self.head + first],
            &self.data[base..base + self.len - first],
        )
    }

    /// Iterates over the readable samples of one channel, oldest first.
    pub fn channel_iter(&self, channel: usize) -> impl Iterator<Item = f32> + '_ {
        let (a, b) = self.channel_slices(channel);
        a.iter().chain(b.iter()).copied()
    }
}

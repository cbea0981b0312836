//! Seekable reading of a resampled stream.

use crate::core::audio_buffer::AudioBuffer;
use crate::error::{Error, InternalError, Result};
use crate::resample::quality::Quality;
use crate::resample::stream_resampler::StreamResampler;
use tracing::debug;

/// Upstream frames read per refill.
const DEFAULT_CHUNK: usize = 4096;

/// A seekable source of multi-channel audio at a fixed sample rate.
pub trait SampleSource {
    fn num_channels(&self) -> usize;

    fn sample_rate(&self) -> f64;

    /// Total length in frames.
    fn num_frames(&self) -> u64;

    /// The next frame `read()` returns.
    fn position(&self) -> u64;

    /// Reads up to `max_frames` frames. An empty buffer means the end of the
    /// stream.
    fn read(&mut self, max_frames: usize) -> Result<AudioBuffer>;

    fn seek(&mut self, frame: u64) -> Result<()>;
}

/// A [`SampleSource`] over audio held in memory.
pub struct MemorySource {
    buffer: AudioBuffer,
    sample_rate: f64,
    position: u64,
}

impl MemorySource {
    pub fn new(buffer: AudioBuffer, sample_rate: f64) -> Self {
        MemorySource {
            buffer,
            sample_rate,
            position: 0,
        }
    }

    pub fn into_inner(self) -> AudioBuffer {
        self.buffer
    }
}

impl SampleSource for MemorySource {
    fn num_channels(&self) -> usize {
        self.buffer.num_channels()
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn num_frames(&self) -> u64 {
        self.buffer.num_samples() as u64
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn read(&mut self, max_frames: usize) -> Result<AudioBuffer> {
        let start = self.position as usize;
        let len = max_frames.min(self.buffer.num_samples() - start);
        let mut out = AudioBuffer::new(self.buffer.num_channels(), len);
        for c in 0..self.buffer.num_channels() {
            out.channel_mut(c).copy_from_slice(&self.buffer.channel(c)[start..start + len]);
        }
        self.position += len as u64;
        Ok(out)
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        if frame > self.num_frames() {
            return Err(Error::invalid(
                "frame",
                format!("{frame} is past the end of a {} frame source", self.num_frames()),
            ));
        }
        self.position = frame;
        Ok(())
    }
}

/// Reads a [`SampleSource`] at a different sample rate.
///
/// The output is exactly `floor(source_frames * target / source)` frames
/// long. Seeking is sample-accurate: reading after `seek(k)` returns the same
/// samples as reading from the start and discarding `k` frames.
pub struct ResampledSource<S> {
    source: S,
    resampler: StreamResampler,
    pending: AudioBuffer,
    position: u64,
    num_frames: u64,
    source_exhausted: bool,
    chunk: usize,
}

impl<S: SampleSource> ResampledSource<S> {
    pub fn new(source: S, target_sample_rate: f64, quality: Quality) -> Result<Self> {
        let resampler =
            StreamResampler::new(source.sample_rate(), target_sample_rate, source.num_channels(), quality)?;
        let num_frames =
            libm::floor(source.num_frames() as f64 * target_sample_rate / source.sample_rate()) as u64;
        let mut resampled = ResampledSource {
            pending: AudioBuffer::new(source.num_channels(), 0),
            source,
            resampler,
            position: 0,
            num_frames,
            source_exhausted: false,
            chunk: DEFAULT_CHUNK,
        };
        resampled.seek(0)?;
        Ok(resampled)
    }

    /// Upstream frames read per refill.
    pub fn with_chunk_size(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }

    pub fn sample_rate(&self) -> f64 {
        self.resampler.target_sample_rate()
    }

    pub fn num_channels(&self) -> usize {
        self.resampler.num_channels()
    }

    pub fn num_frames(&self) -> u64 {
        self.num_frames
    }

    /// The next output frame `read()` returns.
    pub fn tell(&self) -> u64 {
        self.position
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Reads up to `frames` output frames; fewer only at the end.
    pub fn read(&mut self, frames: usize) -> Result<AudioBuffer> {
        let wanted = (frames as u64).min(self.num_frames - self.position) as usize;

        while self.pending.num_samples() < wanted {
            if self.refill()?.is_none() {
                break;
            }
        }

        if self.pending.num_samples() < wanted {
            return Err(InternalError::Underflow {
                region: "resampled output",
                requested: wanted,
                available: self.pending.num_samples(),
            }
            .into());
        }

        let mut out = AudioBuffer::new(self.num_channels(), wanted);
        for c in 0..self.num_channels() {
            out.channel_mut(c).copy_from_slice(&self.pending.channel(c)[..wanted]);
        }
        let remaining = self.pending.num_samples() - wanted;
        self.pending.shift_left(wanted, remaining);
        self.pending.set_num_samples(remaining);

        self.position += wanted as u64;
        Ok(out)
    }

    pub fn read_to_end(&mut self) -> Result<AudioBuffer> {
        self.read((self.num_frames - self.position) as usize)
    }

    /// Pulls one chunk through the resampler into `pending`. Returns `None`
    /// once nothing more will come.
    fn refill(&mut self) -> Result<Option<usize>> {
        if self.source_exhausted {
            return Ok(None);
        }

        let before = self.pending.num_samples();
        let chunk = self.source.read(self.chunk)?;
        if chunk.num_samples() > 0 {
            let output = self.resampler.process(Some(&chunk))?;
            self.append_pending(&output);
        } else {
            // Silence past the end, so every one of `num_frames` outputs is
            // a real kernel evaluation no matter where a seek landed.
            let padding = 2 * libm::ceil(1.0 / self.ratio()) as usize + 2;
            let silence = AudioBuffer::new(self.num_channels(), padding);
            let output = self.resampler.process(Some(&silence))?;
            self.append_pending(&output);
            let tail = self.resampler.process(None)?;
            self.append_pending(&tail);
            self.source_exhausted = true;
        }
        Ok(Some(self.pending.num_samples() - before))
    }

    fn append_pending(&mut self, output: &AudioBuffer) {
        let start = self.pending.num_samples();
        self.pending.set_num_samples(start + output.num_samples());
        for c in 0..self.num_channels() {
            self.pending.channel_mut(c)[start..].copy_from_slice(output.channel(c));
        }
    }

    fn ratio(&self) -> f64 {
        self.resampler.target_sample_rate() / self.resampler.source_sample_rate()
    }

    /// Moves to output frame `frame`.
    pub fn seek(&mut self, frame: u64) -> Result<()> {
        if frame > self.num_frames {
            return Err(Error::invalid(
                "frame",
                format!("{frame} is past the end of a {} frame stream", self.num_frames),
            ));
        }

        let plan = self.resampler.seek_plan(frame);
        let source_frames = self.source.num_frames();

        // Whatever part of the history lies past the upstream end is silence.
        let mut history = AudioBuffer::new(self.num_channels(), plan.upstream_len());
        if plan.upstream_start < source_frames {
            self.source.seek(plan.upstream_start)?;
            let available = plan.upstream_end.min(source_frames) - plan.upstream_start;
            let read = self.source.read(available as usize)?;
            for c in 0..self.num_channels() {
                history.channel_mut(c)[..read.num_samples()].copy_from_slice(read.channel(c));
            }
        }
        self.source.seek(plan.upstream_end.min(source_frames))?;
        self.resampler.prime(&plan, &history)?;

        self.source_exhausted = false;
        self.pending.set_num_samples(0);
        self.position = frame;
        debug!(
            frame,
            upstream_start = plan.upstream_start,
            upstream_end = plan.upstream_end,
            "seeked resampled source"
        );
        Ok(())
    }
}

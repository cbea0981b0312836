//! Single-channel fractional-delay interpolation.
//!
//! An [`Interpolator`] keeps the last `width` input samples in a doubled
//! history buffer, so the kernel always sees one contiguous window without
//! wrapping, and a sub-sample phase that advances by the speed ratio (input
//! samples per output sample) after every output.

use crate::resample::quality::Quality;
use std::f64::consts::PI;

/// Fractional-delay interpolator for one channel.
#[derive(Clone, Debug)]
pub struct Interpolator {
    quality: Quality,
    history: Vec<f32>,
    write_index: usize,
    pos: f64,
    weights: Vec<f64>,
}

impl Interpolator {
    pub fn new(quality: Quality) -> Self {
        let width = quality.width();
        Interpolator {
            quality,
            history: vec![0.0; width * 2],
            write_index: 0,
            pos: 1.0,
            weights: if quality.is_windowed_sinc() {
                vec![0.0; width]
            } else {
                Vec::new()
            },
        }
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    /// The sub-sample phase. Values of 1.0 or more mean input must be pushed
    /// before the next output.
    pub fn phase(&self) -> f64 {
        self.pos
    }

    pub fn set_phase(&mut self, pos: f64) {
        self.pos = pos;
    }

    /// Clears the history and rewinds the phase.
    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.write_index = 0;
        self.pos = 1.0;
    }

    /// Appends one input sample to the history.
    pub fn push(&mut self, sample: f32) {
        let width = self.quality.width();
        self.history[self.write_index] = sample;
        self.history[self.write_index + width] = sample;
        self.write_index += 1;
        if self.write_index == width {
            self.write_index = 0;
        }
    }

    /// Produces up to `output.len()` samples from `input`.
    ///
    /// Stops early when another input sample is needed and `input` is
    /// exhausted. Returns `(consumed, produced)`.
    pub fn process(
        &mut self,
        speed_ratio: f64,
        mut input: impl Iterator<Item = f32>,
        output: &mut [f32],
    ) -> (usize, usize) {
        let cutoff = if speed_ratio > 1.0 { 1.0 / speed_ratio } else { 1.0 };
        let mut consumed = 0;

        for (produced, out) in output.iter_mut().enumerate() {
            while self.pos >= 1.0 {
                match input.next() {
                    Some(sample) => {
                        self.push(sample);
                        consumed += 1;
                        self.pos -= 1.0;
                    }
                    None => return (consumed, produced),
                }
            }
            *out = self.evaluate(self.pos, cutoff);
            self.pos += speed_ratio;
        }

        (consumed, output.len())
    }

    fn evaluate(&mut self, frac: f64, cutoff: f64) -> f32 {
        let width = self.quality.width();
        let window = &self.history[self.write_index..self.write_index + width];

        if frac == 0.0 && cutoff >= 1.0 {
            return window[width - 1 - self.quality.latency()];
        }

        let f = frac as f32;
        match self.quality {
            Quality::ZeroOrderHold => window[0],
            Quality::Linear => window[0] + (window[1] - window[0]) * f,
            Quality::CatmullRom => {
                let (p0, p1, p2, p3) = (window[0], window[1], window[2], window[3]);
                let f2 = f * f;
                let f3 = f2 * f;
                0.5 * ((2.0 * p1)
                    + (p2 - p0) * f
                    + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * f2
                    + (3.0 * (p1 - p2) + p3 - p0) * f3)
            }
            Quality::Lagrange => {
                // Nodes at -1, 0, 1, 2.
                let c0 = -f * (f - 1.0) * (f - 2.0) / 6.0;
                let c1 = (f + 1.0) * (f - 1.0) * (f - 2.0) / 2.0;
                let c2 = -(f + 1.0) * f * (f - 2.0) / 2.0;
                let c3 = (f + 1.0) * f * (f - 1.0) / 6.0;
                window[0] * c0 + window[1] * c1 + window[2] * c2 + window[3] * c3
            }
            _ => {
                let half = (width / 2) as f64;
                let mut sum = 0.0;
                for (i, w) in self.weights.iter_mut().enumerate() {
                    let x = half - 1.0 - i as f64 + frac;
                    *w = cutoff * sinc(cutoff * x) * blackman(x, half);
                    sum += *w;
                }

                let window = &self.history[self.write_index..self.write_index + width];
                let mut acc = 0.0;
                for (&s, &w) in window.iter().zip(self.weights.iter()) {
                    acc += s as f64 * w;
                }
                if sum != 0.0 {
                    acc /= sum;
                }
                acc as f32
            }
        }
    }
}

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        libm::sin(PI * x) / (PI * x)
    }
}

/// Blackman window over `[-half, half]`.
fn blackman(x: f64, half: f64) -> f64 {
    if x.abs() >= half {
        return 0.0;
    }
    let t = PI * x / half;
    0.42 + 0.5 * libm::cos(t) + 0.08 * libm::cos(2.0 * t)
}

/// Walks the phase accumulator over `outputs` output samples the way
/// [`Interpolator::process`] does, without touching any audio.
///
/// Returns the number of input samples that would have been consumed and the
/// phase afterwards.
pub fn advance_phase(mut pos: f64, speed_ratio: f64, outputs: u64) -> (u64, f64) {
    let mut consumed = 0;
    for _ in 0..outputs {
        while pos >= 1.0 {
            consumed += 1;
            pos -= 1.0;
        }
        pos += speed_ratio;
    }
    (consumed, pos)
}

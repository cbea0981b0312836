use crate::signal::Tone;
use anyhow::{anyhow, Result};
use blockdsp_core::core::live::{LiveGraph, LiveProcessor};
use blockdsp_core::{AudioBuffer, ProcessSpec};
use cpal::traits::{DeviceTrait, HostTrait};
use tracing::{error, info};

/// Largest block the plugins are prepared for. Device buffers larger than
/// this are split by the engine.
pub const MAX_BLOCK: u32 = 512;

/// Opens the default output device and plays a test tone through a live
/// graph. Returns the stream and the graph to submit plugin lists to.
pub fn init_audio(tone_freq: f32) -> Result<(cpal::Stream, LiveGraph)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("No output device available"))?;
    let config = device.default_output_config()?;
    let sample_rate = config.sample_rate() as f64;
    let channels = config.channels() as u32;

    let (graph, processor) = LiveGraph::new(ProcessSpec::new(sample_rate, MAX_BLOCK, channels))?;
    let tone = Tone::new(sample_rate as f32, tone_freq, 0.75);
    info!(sample_rate, channels, "opened default output device");

    let err_fn = |err| error!("an error occurred on stream: {}", err);

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => run::<f32>(&device, &config.into(), processor, tone, err_fn)?,
        cpal::SampleFormat::I16 => run::<i16>(&device, &config.into(), processor, tone, err_fn)?,
        cpal::SampleFormat::U16 => run::<u16>(&device, &config.into(), processor, tone, err_fn)?,
        _ => return Err(anyhow!("Unsupported sample format")),
    };

    Ok((stream, graph))
}

fn run<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut processor: LiveProcessor,
    mut tone: Tone,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut buffer = AudioBuffer::with_capacity(channels, 8192);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            buffer.set_num_samples(frames);
            tone.fill(&mut buffer);

            if let Err(e) = processor.process(&mut buffer) {
                error!("processing failed: {}", e);
                buffer.clear();
            }

            for (i, frame) in data.chunks_mut(channels).enumerate() {
                for (c, sample) in frame.iter_mut().enumerate() {
                    *sample = T::from_sample(buffer.channel(c)[i]);
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

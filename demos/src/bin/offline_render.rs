use anyhow::Result;
use blockdsp_core::core::chain::Chain;
use blockdsp_core::core::mix::Mix;
use blockdsp_core::core::offline::render;
use blockdsp_core::effects::time::delay::Delay;
use blockdsp_core::effects::utility::gain::Gain;
use blockdsp_core::resample::{MemorySource, Quality, Resample, ResampledSource};
use blockdsp_core::{AudioBuffer, Plugin, PluginHandle};
use blockdsp_demos::init_tracing;
use blockdsp_demos::signal::Tone;
use tracing::info;

const SAMPLE_RATE: f64 = 44100.0;

fn peak(buffer: &AudioBuffer) -> f32 {
    (0..buffer.num_channels())
        .flat_map(|c| buffer.channel(c).iter())
        .fold(0.0f32, |acc, s| acc.max(s.abs()))
}

fn main() -> Result<()> {
    init_tracing();

    let input = Tone::render(SAMPLE_RATE as f32, 440.0, 2, 3.0);

    let chain = Chain::new()
        .and(Gain::new_db(-3.0))
        .and(
            Mix::new()
                .and_handle(None)
                .and(Resample::wrapping(
                    Chain::new().and(Delay::new(2205).with_compensation(true)).and(Gain::new(0.5)),
                    22050.0,
                    Quality::WindowedSinc32,
                )?),
        )
        .and(Delay::new(441).with_compensation(true));

    println!("Signal Chain:\n{}", chain.get_graph());
    let handle = PluginHandle::new(chain);
    let units = vec![Some(handle.clone())];

    for buffer_size in [32, 512, 8192] {
        let output = render(&input, SAMPLE_RATE, &units, buffer_size, true)?;
        info!(
            buffer_size,
            input = input.num_samples(),
            output = output.num_samples(),
            peak = peak(&output),
            latency_hint = handle.latency_hint()?,
            "rendered"
        );
    }

    // Rendering in pieces: latency is held back inside the plugins and comes
    // out of later calls.
    let half = input.num_samples() / 2;
    let first = AudioBuffer::from_channels(
        &input.to_channels().iter().map(|c| &c[..half]).collect::<Vec<_>>(),
    )?;
    let streamed = render(&first, SAMPLE_RATE, &units, 512, false)?;
    info!(input = half, output = streamed.num_samples(), "rendered first half without flushing");
    handle.reset()?;

    let mut source = ResampledSource::new(MemorySource::new(input, SAMPLE_RATE), 48000.0, Quality::default())?;
    source.seek(source.num_frames() / 2)?;
    let tail = source.read_to_end()?;
    info!(
        frames = source.num_frames(),
        tail = tail.num_samples(),
        rate = source.sample_rate(),
        "read second half at 48 kHz"
    );

    let bare = Resample::new(8000.0, Quality::Linear)?;
    println!("{}", bare.visualize(0));
    Ok(())
}

use anyhow::Result;
use blockdsp_core::core::chain::Chain;
use blockdsp_core::core::mix::Mix;
use blockdsp_core::effects::time::delay::Delay;
use blockdsp_core::effects::utility::gain::Gain;
use blockdsp_core::resample::{Quality, Resample};
use blockdsp_core::PluginHandle;
use blockdsp_demos::audio_backend::init_audio;
use blockdsp_demos::init_tracing;
use cpal::traits::StreamTrait;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

fn slapback() -> Chain {
    Chain::new().and(
        Mix::new()
            .and_handle(None)
            .and(Chain::new().and(Delay::new(4410)).and(Gain::new_db(-9.0))),
    )
}

fn lofi() -> Result<Chain> {
    Ok(Chain::new()
        .and(Resample::new(8000.0, Quality::ZeroOrderHold)?)
        .and(Gain::new_db(-3.0)))
}

fn main() -> Result<()> {
    init_tracing();

    let (stream, graph) = init_audio(330.0)?;
    stream.play()?;

    println!("Signal Chain A:\n{}", slapback().get_graph());
    println!("Signal Chain B:\n{}", lofi()?.get_graph());

    // Swap between the two chains every three seconds from a watcher thread,
    // the audio thread picks each list up without blocking.
    let started = Instant::now();
    let mut current = None;
    let watcher = graph.spawn_watcher(Duration::from_millis(50), move || {
        let phase = (started.elapsed().as_secs() / 3) % 2;
        if current == Some(phase) {
            return None;
        }
        current = Some(phase);
        let chain = if phase == 0 { slapback() } else { lofi().ok()? };
        info!(phase, "switching chain");
        Some(vec![Some(PluginHandle::new(chain))])
    })?;

    thread::sleep(Duration::from_secs(15));
    watcher.stop();
    Ok(())
}

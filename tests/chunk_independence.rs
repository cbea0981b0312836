use blockdsp_core::core::chain::Chain;
use blockdsp_core::core::engine;
use blockdsp_core::core::mix::Mix;
use blockdsp_core::core::offline::render;
use blockdsp_core::effects::time::delay::Delay;
use blockdsp_core::effects::utility::gain::Gain;
use blockdsp_core::resample::{Quality, Resample, StreamResampler};
use blockdsp_core::{AudioBuffer, PluginHandle, ProcessSpec};
use proptest::prelude::*;

fn signal(channels: usize, len: usize, seed: u32) -> AudioBuffer {
    let mut buffer = AudioBuffer::new(channels, len);
    let mut state = seed | 1;
    for c in 0..channels {
        for s in buffer.channel_mut(c) {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            *s = (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5;
        }
    }
    buffer
}

fn graph(delays: &[usize], resample: bool) -> Vec<Option<PluginHandle>> {
    let mut chain = Chain::new().and(Gain::new(0.8));
    for &d in delays {
        chain = chain.and(Delay::new(d).with_compensation(true));
    }
    let mix = Mix::new()
        .and_handle(None)
        .and(chain)
        .and(Delay::new(3).with_compensation(true));

    let mut units = vec![Some(PluginHandle::new(mix)), None];
    if resample {
        units.push(Some(PluginHandle::new(
            Resample::new(32000.0, Quality::CatmullRom).unwrap(),
        )));
    }
    units
}

/// Splits `len` into chunks of the given sizes, cycling through them.
fn split(len: usize, sizes: &[usize]) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut pos = 0;
    for &size in sizes.iter().cycle() {
        if pos >= len {
            break;
        }
        let end = (pos + size).min(len);
        ranges.push((pos, end));
        pos = end;
    }
    ranges
}

fn slice(buffer: &AudioBuffer, start: usize, end: usize) -> AudioBuffer {
    let channels: Vec<&[f32]> = (0..buffer.num_channels())
        .map(|c| &buffer.channel(c)[start..end])
        .collect();
    AudioBuffer::from_channels(&channels).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn render_is_independent_of_block_size(
        delays in prop::collection::vec(0usize..300, 0..4),
        block_size in 1u32..700,
        resample in any::<bool>(),
        seed in any::<u32>(),
    ) {
        let input = signal(2, 2000, seed);
        let reference = render(&input, 44100.0, &graph(&delays, resample), 8192, true).unwrap();
        let out = render(&input, 44100.0, &graph(&delays, resample), block_size, true).unwrap();

        prop_assert_eq!(out.num_samples(), input.num_samples());
        prop_assert_eq!(out.to_channels(), reference.to_channels());
    }

    #[test]
    fn streaming_output_is_a_prefix_of_single_call(
        delays in prop::collection::vec(0usize..200, 1..3),
        chunks in prop::collection::vec(1usize..900, 1..6),
        block_size in 1u32..300,
    ) {
        let input = signal(1, 3000, 7);
        let reference = render(&input, 44100.0, &graph(&delays, false), 8192, true).unwrap();

        let units = graph(&delays, false);
        let spec = ProcessSpec::new(44100.0, block_size, 1);
        for unit in units.iter().flatten() {
            unit.prepare(&spec).unwrap();
        }

        let mut streamed = Vec::new();
        for (start, end) in split(input.num_samples(), &chunks) {
            let mut buffer = slice(&input, start, end);
            let valid = engine::process(&mut buffer, &spec, &units, false).unwrap();
            streamed.extend_from_slice(&buffer.channel(0)[..valid]);
        }

        prop_assert!(streamed.len() <= reference.num_samples());
        prop_assert_eq!(&streamed[..], &reference.channel(0)[..streamed.len()]);
    }

    #[test]
    fn stream_resampler_is_independent_of_chunking(
        chunks in prop::collection::vec(1usize..1500, 1..5),
        target in prop::sample::select(vec![8000.0, 22050.0, 44100.0, 48000.0, 96000.0]),
        quality in prop::sample::select(Quality::ALL.to_vec()),
    ) {
        let input = signal(2, 4000, 99);

        let mut whole = StreamResampler::new(44100.0, target, 2, quality).unwrap();
        let mut expected = whole.process(Some(&input)).unwrap().to_channels();
        for (c, tail) in whole.process(None).unwrap().to_channels().into_iter().enumerate() {
            expected[c].extend(tail);
        }

        let mut resampler = StreamResampler::new(44100.0, target, 2, quality).unwrap();
        let mut out = vec![Vec::new(); 2];
        for (start, end) in split(input.num_samples(), &chunks) {
            let chunk = resampler.process(Some(&slice(&input, start, end))).unwrap();
            for (c, samples) in out.iter_mut().enumerate() {
                samples.extend_from_slice(chunk.channel(c));
            }
        }
        let tail = resampler.process(None).unwrap();
        for (c, samples) in out.iter_mut().enumerate() {
            samples.extend_from_slice(tail.channel(c));
        }

        prop_assert_eq!(out, expected);
    }
}

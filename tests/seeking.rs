use blockdsp_core::resample::{MemorySource, Quality, ResampledSource};
use blockdsp_core::AudioBuffer;
use proptest::prelude::*;

fn source(len: usize, rate: f64) -> MemorySource {
    let mut buffer = AudioBuffer::new(2, len);
    for c in 0..2 {
        for (i, s) in buffer.channel_mut(c).iter_mut().enumerate() {
            let t = i as f32;
            *s = libm::sinf(t * 0.013) * 0.6 + libm::sinf(t * (0.2 + c as f32 * 0.1)) * 0.2;
        }
    }
    MemorySource::new(buffer, rate)
}

#[test]
fn seek_consistency_at_fixed_points() {
    let mut reference = ResampledSource::new(source(3000, 44100.0), 48000.0, Quality::default()).unwrap();
    let full = reference.read_to_end().unwrap();
    let len = full.num_samples();

    let mut resampled = ResampledSource::new(source(3000, 44100.0), 48000.0, Quality::default()).unwrap();
    for k in [0, 1, 1000, len - 1] {
        resampled.seek(k as u64).unwrap();
        assert_eq!(resampled.tell(), k as u64);
        let rest = resampled.read_to_end().unwrap();
        for c in 0..2 {
            assert_eq!(rest.channel(c), &full.channel(c)[k..], "seek to {k}");
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn seek_matches_reading_from_start(
        positions in prop::collection::vec(0.0f64..1.0, 1..4),
        source_rate in prop::sample::select(vec![22050.0, 44100.0, 48000.0]),
        target_rate in prop::sample::select(vec![16000.0, 44100.0, 96000.0]),
        quality in prop::sample::select(Quality::ALL.to_vec()),
        chunk in 1usize..2000,
    ) {
        let mut reference = ResampledSource::new(source(1500, source_rate), target_rate, quality).unwrap();
        let full = reference.read_to_end().unwrap();
        let len = full.num_samples();

        let mut resampled = ResampledSource::new(source(1500, source_rate), target_rate, quality)
            .unwrap()
            .with_chunk_size(chunk);
        for p in positions {
            let k = ((len as f64 * p) as usize).min(len);
            resampled.seek(k as u64).unwrap();
            let rest = resampled.read(len).unwrap();
            prop_assert_eq!(rest.num_samples(), len - k);
            for c in 0..2 {
                prop_assert_eq!(rest.channel(c), &full.channel(c)[k..]);
            }
        }
    }
}

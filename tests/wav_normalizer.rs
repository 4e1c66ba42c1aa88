//! WAV files through the chunk normalizer.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use vmtrigger::audio::{AudioInput, StreamNormalizer, WavFile};
use vmtrigger::config::AudioConfig;
use vmtrigger::{Chunk, TriggerError};

fn write_wav(dir: &Path, name: &str, rate: u32, channels: u16, frames: usize) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..frames {
        let t = i as f32 / rate as f32;
        let v = (8000.0 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()) as i16;
        for _ in 0..channels {
            writer.write_sample(v).unwrap();
        }
    }
    writer.finalize().unwrap();
    path
}

fn fast() -> AudioConfig {
    AudioConfig {
        realtime: false,
        ..AudioConfig::default()
    }
}

fn chunks(path: &Path, config: &AudioConfig) -> Vec<Chunk> {
    let source = WavFile::new(path).open().unwrap();
    StreamNormalizer::new(source, config)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn telephony_rate_mono_passes_through_in_whole_chunks() {
    let dir = TempDir::new().unwrap();
    // 50 chunks plus 90 stray samples
    let path = write_wav(dir.path(), "mono8k.wav", 8000, 1, 50 * 160 + 90);

    let out = chunks(&path, &fast());
    assert_eq!(out.len(), 50);
    assert!(out.iter().all(|c| c.len() == 160));
    assert_eq!(out.last().unwrap().sequence(), 49);
}

#[test]
fn cd_rate_stereo_yields_same_chunk_count() {
    let dir = TempDir::new().unwrap();
    // 2 s plus 10 ms at 44.1 kHz
    let path = write_wav(dir.path(), "stereo44k.wav", 44100, 2, 88_200 + 441);

    let out = chunks(&path, &fast());
    assert_eq!(out.len(), 100);
    assert!(out.iter().all(|c| c.len() == 160));
}

#[test]
fn wideband_source_to_custom_chunk_size() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(dir.path(), "wide16k.wav", 16_000, 1, 16_000);
    let config = AudioConfig {
        chunk_ms: 10,
        ..fast()
    };

    let out = chunks(&path, &config);
    assert_eq!(out.len(), 100);
    assert!(out.iter().all(|c| c.len() == 80));
}

#[test]
fn resampled_tone_keeps_its_level() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(dir.path(), "tone48k.wav", 48_000, 1, 48_000);

    let out = chunks(&path, &fast());
    // Skip the filter's warm-up chunk
    let peak = out[5..]
        .iter()
        .flat_map(|c| c.samples().iter().map(|s| s.unsigned_abs()))
        .max()
        .unwrap();
    assert!((7200..=8800).contains(&peak), "peak {peak}");
}

#[test]
fn too_short_for_one_chunk_yields_nothing() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(dir.path(), "blip.wav", 8000, 1, 100);
    assert!(chunks(&path, &fast()).is_empty());
}

#[test]
fn float_wav_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("float.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    writer.write_sample(0.0f32).unwrap();
    writer.finalize().unwrap();

    assert!(WavFile::new(&path).open().is_err());
}

#[test]
fn missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = WavFile::new(dir.path().join("absent.wav"))
        .open()
        .err()
        .unwrap();
    assert!(matches!(err, TriggerError::Io(_)));
}

#[test]
fn truncated_data_keeps_whole_chunks_then_reports_error() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(dir.path(), "cut.wav", 8000, 1, 1600);
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    let len = file.metadata().unwrap().len();
    // Header still claims 1600 samples
    file.set_len(len - 100).unwrap();

    let source = WavFile::new(&path).open().unwrap();
    let items: Vec<_> = StreamNormalizer::new(source, &fast()).unwrap().collect();

    let whole = items.iter().take_while(|item| item.is_ok()).count();
    assert_eq!(whole, 9);
    assert_eq!(items.len(), 10);
    assert!(matches!(
        items.last(),
        Some(Err(TriggerError::AudioFormat { .. }))
    ));
}

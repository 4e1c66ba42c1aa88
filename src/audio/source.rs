use crate::defaults::MAX_SOURCE_SAMPLE_RATE;
use crate::error::{Result, TriggerError};
use std::sync::Arc;

/// Declared layout of a PCM sample source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl SourceFormat {
    /// 16-bit PCM at the given rate and channel count.
    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
        }
    }

    /// Reject layouts the normalizer cannot handle.
    pub fn validate(&self) -> Result<()> {
        if self.bits_per_sample != 16 {
            return Err(TriggerError::UnsupportedSampleWidth {
                bits: self.bits_per_sample,
            });
        }
        if !(1..=2).contains(&self.channels) {
            return Err(TriggerError::UnsupportedChannels {
                channels: self.channels,
            });
        }
        if self.sample_rate == 0 {
            return Err(TriggerError::invalid(
                "source.sample_rate",
                "must be positive",
            ));
        }
        if self.sample_rate > MAX_SOURCE_SAMPLE_RATE {
            return Err(TriggerError::invalid(
                "source.sample_rate",
                format!(
                    "{}Hz exceeds the {}Hz maximum",
                    self.sample_rate, MAX_SOURCE_SAMPLE_RATE
                ),
            ));
        }
        Ok(())
    }
}

/// Trait for linear-PCM sample suppliers.
///
/// This trait allows swapping implementations (WAV file vs in-memory buffer).
pub trait SampleSource: Send {
    /// Layout of the samples returned by [`read_frames`](Self::read_frames).
    fn format(&self) -> SourceFormat;

    /// Read up to `frames` frames of interleaved samples.
    ///
    /// # Returns
    /// `frames * channels` samples, fewer near the end, and an empty vector
    /// once the source is exhausted.
    fn read_frames(&mut self, frames: usize) -> Result<Vec<i16>>;
}

/// Opens fresh, independent readers over one logical recording.
///
/// Each detector in a race reads its own source; nothing is shared.
pub trait AudioInput: Send + Sync {
    fn open(&self) -> Result<Box<dyn SampleSource>>;
}

/// In-memory interleaved PCM, shareable across readers.
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    samples: Arc<[i16]>,
    format: SourceFormat,
}

impl PcmBuffer {
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.into(),
            format: SourceFormat::pcm16(sample_rate, channels),
        }
    }

    pub fn mono(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    /// Build a buffer with an arbitrary declared format (for width checks).
    pub fn with_format(samples: Vec<i16>, format: SourceFormat) -> Self {
        Self {
            samples: samples.into(),
            format,
        }
    }

    pub fn reader(&self) -> PcmReader {
        PcmReader {
            samples: Arc::clone(&self.samples),
            format: self.format,
            position: 0,
        }
    }
}

impl AudioInput for PcmBuffer {
    fn open(&self) -> Result<Box<dyn SampleSource>> {
        Ok(Box::new(self.reader()))
    }
}

/// Cursor over a [`PcmBuffer`].
#[derive(Debug)]
pub struct PcmReader {
    samples: Arc<[i16]>,
    format: SourceFormat,
    position: usize,
}

impl SampleSource for PcmReader {
    fn format(&self) -> SourceFormat {
        self.format
    }

    fn read_frames(&mut self, frames: usize) -> Result<Vec<i16>> {
        let channels = self.format.channels.max(1) as usize;
        let end = std::cmp::min(self.position + frames * channels, self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;
        Ok(chunk)
    }
}

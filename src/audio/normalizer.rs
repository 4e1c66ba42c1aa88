//! Canonical chunking: any 16-bit PCM source in, fixed-size mono chunks out.
//!
//! The normalizer reads the source one chunk-duration at a time, downmixes,
//! resamples to the target rate and slices exactly `target_samples` off a
//! carry-over buffer. A trailing partial chunk is dropped, never padded:
//! every detector counts time in whole chunks.

use crate::audio::resample::PolyphaseResampler;
use crate::audio::source::{SampleSource, SourceFormat};
use crate::config::AudioConfig;
use crate::defaults;
use crate::error::Result;
use crate::trigger::CancellationFlag;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// One canonical time slice of mono 16-bit samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    samples: Vec<i16>,
    sequence: u64,
}

impl Chunk {
    pub fn new(samples: Vec<i16>, sequence: u64) -> Self {
        Self { samples, sequence }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Position of this chunk in its stream, starting at 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Wire form: 16-bit little-endian samples.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Trait for pacing chunk emission, allowing instant streams in tests.
pub trait Pacer: Send + Sync {
    /// Called between two emitted chunks.
    fn pace(&self, chunk_duration: Duration);
}

impl<P: Pacer + ?Sized> Pacer for Arc<P> {
    fn pace(&self, chunk_duration: Duration) {
        (**self).pace(chunk_duration)
    }
}

/// Sleeps one chunk duration per chunk, like a live telephony feed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTimePacer;

impl Pacer for RealTimePacer {
    fn pace(&self, chunk_duration: Duration) {
        std::thread::sleep(chunk_duration);
    }
}

/// Emits chunks as fast as they can be produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacing;

impl Pacer for NoPacing {
    fn pace(&self, _chunk_duration: Duration) {}
}

/// Lazy sequence of canonical chunks over one [`SampleSource`].
pub struct StreamNormalizer {
    source: Box<dyn SampleSource>,
    format: SourceFormat,
    resampler: PolyphaseResampler,
    buffer: VecDeque<i16>,
    target_samples: usize,
    source_frames: usize,
    chunk_duration: Duration,
    pacer: Box<dyn Pacer>,
    cancel: Option<CancellationFlag>,
    emitted: u64,
    exhausted: bool,
}

impl StreamNormalizer {
    /// Validate the source layout and the chunking parameters.
    ///
    /// Fails before any sample is read if the source is not 16-bit mono or
    /// stereo, or if the configuration cannot produce a chunk.
    pub fn new(source: Box<dyn SampleSource>, config: &AudioConfig) -> Result<Self> {
        config.validate()?;
        let format = source.format();
        format.validate()?;

        let target_samples = config.target_samples();
        let source_frames =
            defaults::target_samples(format.sample_rate, config.chunk_ms).max(1);

        let pacer: Box<dyn Pacer> = if config.realtime {
            Box::new(RealTimePacer)
        } else {
            Box::new(NoPacing)
        };

        Ok(Self {
            source,
            format,
            resampler: PolyphaseResampler::new(format.sample_rate, config.target_sample_rate),
            buffer: VecDeque::with_capacity(target_samples * 2),
            target_samples,
            source_frames,
            chunk_duration: config.chunk_duration(),
            pacer,
            cancel: None,
            emitted: 0,
            exhausted: false,
        })
    }

    /// Sets a custom pacer (for deterministic testing).
    pub fn with_pacer(mut self, pacer: Box<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    /// Stop producing chunks once `flag` is set.
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn target_samples(&self) -> usize {
        self.target_samples
    }

    pub fn source_format(&self) -> SourceFormat {
        self.format
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationFlag::is_cancelled)
    }

    /// Pull one source block through downmix and resampling into the buffer.
    ///
    /// Returns false once the source is exhausted and the resampler drained.
    fn fill(&mut self) -> Result<bool> {
        if self.exhausted {
            return Ok(false);
        }

        let raw = self.source.read_frames(self.source_frames)?;
        if raw.is_empty() {
            self.exhausted = true;
            let tail = self.resampler.finish();
            self.buffer.extend(tail);
            return Ok(true);
        }

        let mono = downmix(&raw, self.format.channels);
        let resampled = self.resampler.process(&mono);
        trace!(
            read = raw.len(),
            produced = resampled.len(),
            "normalizer block"
        );
        self.buffer.extend(resampled);
        Ok(true)
    }
}

impl Iterator for StreamNormalizer {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_cancelled() {
            return None;
        }
        if self.emitted > 0 {
            self.pacer.pace(self.chunk_duration);
            if self.is_cancelled() {
                return None;
            }
        }

        while self.buffer.len() < self.target_samples {
            match self.fill() {
                Ok(true) => {}
                // Partial remainder is dropped
                Ok(false) => return None,
                Err(e) => {
                    self.exhausted = true;
                    self.buffer.clear();
                    return Some(Err(e));
                }
            }
        }

        let samples: Vec<i16> = self.buffer.drain(..self.target_samples).collect();
        let chunk = Chunk::new(samples, self.emitted);
        self.emitted += 1;
        Some(Ok(chunk))
    }
}

/// Average interleaved stereo pairs; mono passes through.
pub fn downmix(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels == 2 {
        samples
            .chunks_exact(2)
            .map(|pair| ((pair[0] as i32 + pair[1] as i32) / 2) as i16)
            .collect()
    } else {
        samples.to_vec()
    }
}

//! WAV file sample source.

use crate::audio::source::{AudioInput, SampleSource, SourceFormat};
use crate::error::{Result, TriggerError};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Streaming reader over a 16-bit PCM WAV stream.
///
/// Samples are pulled from the container on demand, so a long recording is
/// never held in memory.
pub struct WavSampleSource<R: Read + Send> {
    reader: hound::WavReader<R>,
    format: SourceFormat,
}

impl<R: Read + Send> WavSampleSource<R> {
    /// Parse the WAV header and check the sample layout.
    pub fn from_reader(reader: R) -> Result<Self> {
        let reader = hound::WavReader::new(reader).map_err(|e| TriggerError::AudioFormat {
            message: format!("Failed to parse WAV file: {}", e),
        })?;

        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int {
            return Err(TriggerError::UnsupportedSampleWidth {
                bits: spec.bits_per_sample,
            });
        }

        let format = SourceFormat {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
        };
        format.validate()?;

        Ok(Self { reader, format })
    }
}

impl<R: Read + Send> SampleSource for WavSampleSource<R> {
    fn format(&self) -> SourceFormat {
        self.format
    }

    fn read_frames(&mut self, frames: usize) -> Result<Vec<i16>> {
        let wanted = frames * self.format.channels as usize;
        self.reader
            .samples::<i16>()
            .take(wanted)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| TriggerError::AudioFormat {
                message: format!("Failed to read WAV samples: {}", e),
            })
    }
}

/// A WAV file on disk; every [`open`](AudioInput::open) starts from the top.
#[derive(Debug, Clone)]
pub struct WavFile {
    path: PathBuf,
}

impl WavFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn open_file(&self) -> Result<WavSampleSource<BufReader<File>>> {
        let file = File::open(&self.path)?;
        WavSampleSource::from_reader(BufReader::new(file))
    }
}

impl AudioInput for WavFile {
    fn open(&self) -> Result<Box<dyn SampleSource>> {
        Ok(Box::new(self.open_file()?))
    }
}

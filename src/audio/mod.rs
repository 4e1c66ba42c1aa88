//! Audio input: sample sources, resampling and canonical chunking.

pub mod normalizer;
pub mod resample;
pub mod source;
pub mod wav;

pub use normalizer::{Chunk, NoPacing, Pacer, RealTimePacer, StreamNormalizer};
pub use source::{AudioInput, PcmBuffer, SampleSource, SourceFormat};
pub use wav::{WavFile, WavSampleSource};

//! File-backed source and sink blocks: WAV (PCM 8/16/32-bit) and raw
//! interleaved IQ across fourteen wire sample formats.

mod codec;
pub mod iq;
pub mod wav;

pub use iq::{IqSink, IqSource, SampleFormat};
pub use wav::{WavSink, WavSource};

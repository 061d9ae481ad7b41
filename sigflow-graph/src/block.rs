//! The uniform block lifecycle: construct -> initialize -> set_rate -> process
//! -> deinitialize.

use crate::port::Port;
use sigflow_core::{Complex32, InitError, RuntimeContext, RuntimeError, SampleType};
use std::fmt;

/// Stable identity of a block within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block#{}", self.0)
    }
}

/// A typed batch of samples, as handed to and returned from `process`.
///
/// This is a tagged-union `StreamElement`, used at the `process` call
/// boundary; block *dispatch* itself (the lifecycle methods below) uses
/// `dyn Block` rather than an enum, since an exhaustive per-concrete-block
/// enum would have to grow with every new block the crate adds. The fixed,
/// closed enum-dispatch style is reserved here for `AnyProducer`/
/// `AnyConsumer` (see `buffers.rs`), which only ever has three cases — one
/// per `SampleType` — and will never grow.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBuf {
    Real32(Vec<f32>),
    Complex32(Vec<Complex32>),
    Byte(Vec<u8>),
}

impl SampleBuf {
    pub fn empty(sample_type: SampleType) -> Self {
        match sample_type {
            SampleType::Real32 => SampleBuf::Real32(Vec::new()),
            SampleType::Complex32 => SampleBuf::Complex32(Vec::new()),
            SampleType::Byte => SampleBuf::Byte(Vec::new()),
        }
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            SampleBuf::Real32(_) => SampleType::Real32,
            SampleBuf::Complex32(_) => SampleType::Complex32,
            SampleBuf::Byte(_) => SampleType::Byte,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SampleBuf::Real32(v) => v.len(),
            SampleBuf::Complex32(v) => v.len(),
            SampleBuf::Byte(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_real32(&self) -> &[f32] {
        match self {
            SampleBuf::Real32(v) => v,
            _ => panic!("expected Real32 sample buffer, found {}", self.sample_type()),
        }
    }

    pub fn as_complex32(&self) -> &[Complex32] {
        match self {
            SampleBuf::Complex32(v) => v,
            _ => panic!("expected Complex32 sample buffer, found {}", self.sample_type()),
        }
    }

    pub fn as_byte(&self) -> &[u8] {
        match self {
            SampleBuf::Byte(v) => v,
            _ => panic!("expected Byte sample buffer, found {}", self.sample_type()),
        }
    }

    /// Allocates a zero-filled buffer of the given type and length, used to
    /// offer a block scratch space to write its output into.
    pub fn zeroed(sample_type: SampleType, len: usize) -> Self {
        match sample_type {
            SampleType::Real32 => SampleBuf::Real32(vec![0.0; len]),
            SampleType::Complex32 => SampleBuf::Complex32(vec![Complex32::ZERO; len]),
            SampleType::Byte => SampleBuf::Byte(vec![0; len]),
        }
    }

    /// Returns the first `n` elements as an owned buffer of the same type.
    pub fn take_prefix(&self, n: usize) -> Self {
        match self {
            SampleBuf::Real32(v) => SampleBuf::Real32(v[..n.min(v.len())].to_vec()),
            SampleBuf::Complex32(v) => SampleBuf::Complex32(v[..n.min(v.len())].to_vec()),
            SampleBuf::Byte(v) => SampleBuf::Byte(v[..n.min(v.len())].to_vec()),
        }
    }

    /// Removes the first `n` elements in place, keeping any remainder for a
    /// later `process` call (a block may consume less than it was offered).
    pub fn drain_prefix(&mut self, n: usize) {
        match self {
            SampleBuf::Real32(v) => {
                v.drain(..n.min(v.len()));
            }
            SampleBuf::Complex32(v) => {
                v.drain(..n.min(v.len()));
            }
            SampleBuf::Byte(v) => {
                v.drain(..n.min(v.len()));
            }
        }
    }

    /// Appends another buffer of the same type onto the end of this one.
    pub fn append(&mut self, mut other: Self) {
        match (self, &mut other) {
            (SampleBuf::Real32(a), SampleBuf::Real32(b)) => a.append(b),
            (SampleBuf::Complex32(a), SampleBuf::Complex32(b)) => a.append(b),
            (SampleBuf::Byte(a), SampleBuf::Byte(b)) => a.append(b),
            _ => panic!("sample type mismatch appending sample buffers"),
        }
    }
}

/// Outcome of one `process` call.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessResult {
    /// `consumed[i]` <= samples offered on input `i`; `produced[j]` <=
    /// capacity offered on output `j`.
    Samples { consumed: Vec<usize>, produced: Vec<usize> },
    /// A source or worker has nothing further to emit. Not an error.
    EndOfStream,
}

impl ProcessResult {
    pub fn samples(consumed: Vec<usize>, produced: Vec<usize>) -> Self {
        ProcessResult::Samples { consumed, produced }
    }

    pub fn is_eos(&self) -> bool {
        matches!(self, ProcessResult::EndOfStream)
    }
}

/// The contract every primitive block implements.
///
/// `inputs`/`outputs` are fixed once a block is constructed (they may depend
/// on constructor arguments such as channel count, but never change
/// afterwards). `initialize` must be idempotent if called again after a
/// failed attempt, since `Flowgraph::start` rolls back by calling
/// `deinitialize` on already-initialized blocks in reverse order when a
/// later block in the same `start` fails to initialize.
pub trait Block: Send {
    fn inputs(&self) -> &[Port];
    fn outputs(&self) -> &[Port];

    fn initialize(&mut self, ctx: &RuntimeContext) -> Result<(), InitError> {
        let _ = ctx;
        Ok(())
    }

    /// Sources ignore `input_rates` (it is empty) and consult their own
    /// clock; sinks return an empty vec. Must be deterministic.
    fn set_rate(&mut self, input_rates: &[f64]) -> Vec<f64>;

    /// A runtime error (e.g. a sink's underlying I/O failing) aborts this
    /// block's worker: the scheduler closes its outputs and records the
    /// error as the graph's first observed error, same as an `EndOfStream`
    /// except that it is surfaced from `stop`/`run`.
    fn process(&mut self, inputs: &[SampleBuf], outputs: &mut [SampleBuf]) -> Result<ProcessResult, RuntimeError>;

    fn deinitialize(&mut self) {}

    fn name(&self) -> &str {
        "block"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_buf_empty_reports_its_type() {
        assert_eq!(SampleBuf::empty(SampleType::Real32).sample_type(), SampleType::Real32);
        assert!(SampleBuf::empty(SampleType::Complex32).is_empty());
    }

    #[test]
    #[should_panic(expected = "expected Real32")]
    fn as_real32_panics_on_wrong_type() {
        SampleBuf::Byte(vec![1, 2]).as_real32();
    }

    #[test]
    fn process_result_eos_detection() {
        assert!(ProcessResult::EndOfStream.is_eos());
        assert!(!ProcessResult::samples(vec![1], vec![1]).is_eos());
    }
}

//! Glue between the typed, closed `SampleType` set and the generic
//! `sigflow_core::ring_buffer` stream buffer.
//!
//! A non-generic descriptor (`AnyProducer`/`AnyConsumer`) tagged with a
//! `SampleType`, dispatching to one of exactly three monomorphized ring
//! buffers. Unlike the block catalog, this dispatch set can never grow,
//! which is why an enum (matching this codebase's enum-dispatch-over-variant
//! pattern elsewhere) rather than `dyn Trait` is used here.

use crate::block::SampleBuf;
use sigflow_core::{ring_buffer, Complex32, SampleType};

pub enum AnyProducer {
    Real32(ring_buffer::Producer<f32>),
    Complex32(ring_buffer::Producer<Complex32>),
    Byte(ring_buffer::Producer<u8>),
}

pub enum AnyConsumer {
    Real32(ring_buffer::Consumer<f32>),
    Complex32(ring_buffer::Consumer<Complex32>),
    Byte(ring_buffer::Consumer<u8>),
}

/// Allocate one stream buffer of the given type and fan-out width.
pub fn make_channel(sample_type: SampleType, capacity: usize, num_consumers: usize) -> (AnyProducer, Vec<AnyConsumer>) {
    match sample_type {
        SampleType::Real32 => {
            let (p, cs) = ring_buffer::channel::<f32>(capacity, num_consumers);
            (AnyProducer::Real32(p), cs.into_iter().map(AnyConsumer::Real32).collect())
        }
        SampleType::Complex32 => {
            let (p, cs) = ring_buffer::channel::<Complex32>(capacity, num_consumers);
            (AnyProducer::Complex32(p), cs.into_iter().map(AnyConsumer::Complex32).collect())
        }
        SampleType::Byte => {
            let (p, cs) = ring_buffer::channel::<u8>(capacity, num_consumers);
            (AnyProducer::Byte(p), cs.into_iter().map(AnyConsumer::Byte).collect())
        }
    }
}

impl AnyProducer {
    pub fn sample_type(&self) -> SampleType {
        match self {
            AnyProducer::Real32(_) => SampleType::Real32,
            AnyProducer::Complex32(_) => SampleType::Complex32,
            AnyProducer::Byte(_) => SampleType::Byte,
        }
    }

    /// Writes the contents of `buf`, blocking for space as needed. Panics if
    /// `buf`'s `SampleType` doesn't match this producer's — a graph that
    /// validated successfully can never trigger this, since validation
    /// guarantees edge type agreement.
    pub fn write(&self, buf: &SampleBuf) -> usize {
        match (self, buf) {
            (AnyProducer::Real32(p), SampleBuf::Real32(v)) => p.write(v),
            (AnyProducer::Complex32(p), SampleBuf::Complex32(v)) => p.write(v),
            (AnyProducer::Byte(p), SampleBuf::Byte(v)) => p.write(v),
            _ => panic!("sample type mismatch writing to stream buffer"),
        }
    }

    pub fn close(&self) {
        match self {
            AnyProducer::Real32(p) => p.close(),
            AnyProducer::Complex32(p) => p.close(),
            AnyProducer::Byte(p) => p.close(),
        }
    }
}

impl AnyConsumer {
    pub fn sample_type(&self) -> SampleType {
        match self {
            AnyConsumer::Real32(_) => SampleType::Real32,
            AnyConsumer::Complex32(_) => SampleType::Complex32,
            AnyConsumer::Byte(_) => SampleType::Byte,
        }
    }

    /// Reads up to `max` elements, blocking until at least one is available
    /// or end-of-stream is reached with nothing left.
    pub fn read(&self, max: usize) -> (SampleBuf, bool) {
        match self {
            AnyConsumer::Real32(c) => {
                let (items, eos) = c.read(max);
                (SampleBuf::Real32(items), eos)
            }
            AnyConsumer::Complex32(c) => {
                let (items, eos) = c.read(max);
                (SampleBuf::Complex32(items), eos)
            }
            AnyConsumer::Byte(c) => {
                let (items, eos) = c.read(max);
                (SampleBuf::Byte(items), eos)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_real32_through_any_producer_consumer() {
        let (p, mut cs) = make_channel(SampleType::Real32, 8, 1);
        let c = cs.remove(0);
        p.write(&SampleBuf::Real32(vec![1.0, 2.0, 3.0]));
        p.close();
        let (buf, eos) = c.read(10);
        assert_eq!(buf, SampleBuf::Real32(vec![1.0, 2.0, 3.0]));
        assert!(eos);
    }

    #[test]
    #[should_panic(expected = "sample type mismatch")]
    fn writing_wrong_type_panics() {
        let (p, _cs) = make_channel(SampleType::Real32, 8, 1);
        p.write(&SampleBuf::Byte(vec![1, 2, 3]));
    }
}

//! Drives a single block with synthetic inputs and compares its outputs to
//! expected vectors within tolerance.

use crate::block::{Block, ProcessResult, SampleBuf};
use sigflow_core::{Complex32, RuntimeContext};

/// Elementwise tolerance used to compare actual vs. expected output.
/// Complex comparison uses `max(|Δre|, |Δim|)`.
pub struct Tolerance(pub f64);

impl Tolerance {
    pub const DEFAULT: Tolerance = Tolerance(1e-6);
}

/// Wraps one block under test: feeds it synthetic input in chunks, collects
/// everything it produces across repeated `process` calls until `EndOfStream`
/// or the supplied inputs are exhausted, and exposes the result for
/// comparison.
pub struct BlockTester<B: Block> {
    block: B,
    chunk_size: usize,
}

impl<B: Block> BlockTester<B> {
    pub fn new(mut block: B, declared_input_rates: &[f64]) -> Self {
        let ctx = RuntimeContext::default();
        block.initialize(&ctx).expect("test block failed to initialize");
        block.set_rate(declared_input_rates);
        Self { block, chunk_size: 4096 }
    }

    /// Runs the block over the given per-input sample vectors until every
    /// input is exhausted or the block signals `EndOfStream`, returning
    /// everything produced on each output, in order.
    pub fn drive(&mut self, inputs: Vec<SampleBuf>) -> Vec<SampleBuf> {
        let mut remaining = inputs;
        let mut collected: Vec<SampleBuf> = self.block.outputs().iter().map(|p| SampleBuf::empty(p.sample_type)).collect();

        loop {
            let offered: Vec<SampleBuf> = remaining.iter().map(|b| b.take_prefix(self.chunk_size)).collect();
            let mut out_bufs: Vec<SampleBuf> = self.block.outputs().iter().map(|p| SampleBuf::zeroed(p.sample_type, self.chunk_size)).collect();

            let result = self.block.process(&offered, &mut out_bufs).expect("test block returned a runtime error");

            match result {
                ProcessResult::EndOfStream => break,
                ProcessResult::Samples { consumed, produced } => {
                    for (idx, &n) in consumed.iter().enumerate() {
                        remaining[idx].drain_prefix(n);
                    }
                    for (idx, &n) in produced.iter().enumerate() {
                        collected[idx].append(out_bufs[idx].take_prefix(n));
                    }
                    let nothing_left = remaining.iter().all(|b| b.is_empty());
                    let nothing_produced = produced.iter().all(|&n| n == 0);
                    if nothing_left && nothing_produced {
                        break;
                    }
                }
            }
        }

        collected
    }

    /// Drives a source block (no inputs) for up to `max_iterations` calls,
    /// stopping early on `EndOfStream`.
    pub fn drive_source(&mut self, max_iterations: usize) -> Vec<SampleBuf> {
        assert!(self.block.inputs().is_empty(), "drive_source is for source blocks only");
        let mut collected: Vec<SampleBuf> = self.block.outputs().iter().map(|p| SampleBuf::empty(p.sample_type)).collect();

        for _ in 0..max_iterations {
            let mut out_bufs: Vec<SampleBuf> = self.block.outputs().iter().map(|p| SampleBuf::zeroed(p.sample_type, self.chunk_size)).collect();
            let result = self.block.process(&[], &mut out_bufs).expect("test block returned a runtime error");
            match result {
                ProcessResult::EndOfStream => break,
                ProcessResult::Samples { produced, .. } => {
                    for (idx, &n) in produced.iter().enumerate() {
                        collected[idx].append(out_bufs[idx].take_prefix(n));
                    }
                }
            }
        }

        collected
    }
}

/// Compares two real-valued slices within an absolute epsilon.
pub fn assert_real32_close(actual: &[f32], expected: &[f32], tolerance: &Tolerance) {
    assert_eq!(actual.len(), expected.len(), "length mismatch: {} vs {}", actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        let diff = (*a as f64 - *e as f64).abs();
        assert!(diff <= tolerance.0, "sample {i} differs: {a} vs {e} (Δ={diff}, tolerance={})", tolerance.0);
    }
}

/// Compares two complex-valued slices; per-element error is
/// `max(|Δre|, |Δim|)`.
pub fn assert_complex32_close(actual: &[Complex32], expected: &[Complex32], tolerance: &Tolerance) {
    assert_eq!(actual.len(), expected.len(), "length mismatch: {} vs {}", actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        let diff = ((a.re as f64 - e.re as f64).abs()).max((a.im as f64 - e.im as f64).abs());
        assert!(diff <= tolerance.0, "sample {i} differs: {a:?} vs {e:?} (Δ={diff}, tolerance={})", tolerance.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::Port;
    use sigflow_core::{RuntimeError, SampleType};

    struct DoublingBlock {
        ports_in: Vec<Port>,
        ports_out: Vec<Port>,
    }

    impl DoublingBlock {
        fn new() -> Self {
            Self {
                ports_in: vec![Port::input("in1", SampleType::Real32)],
                ports_out: vec![Port::output("out1", SampleType::Real32)],
            }
        }
    }

    impl Block for DoublingBlock {
        fn inputs(&self) -> &[Port] {
            &self.ports_in
        }
        fn outputs(&self) -> &[Port] {
            &self.ports_out
        }
        fn set_rate(&mut self, input_rates: &[f64]) -> Vec<f64> {
            vec![input_rates[0]]
        }
        fn process(&mut self, inputs: &[SampleBuf], outputs: &mut [SampleBuf]) -> Result<ProcessResult, RuntimeError> {
            let doubled: Vec<f32> = inputs[0].as_real32().iter().map(|x| x * 2.0).collect();
            let n = doubled.len();
            if let SampleBuf::Real32(out) = &mut outputs[0] {
                out[..n].copy_from_slice(&doubled);
            }
            if n == 0 {
                return Ok(ProcessResult::EndOfStream);
            }
            Ok(ProcessResult::samples(vec![n], vec![n]))
        }
    }

    #[test]
    fn doubling_block_matches_expected_output() {
        let mut tester = BlockTester::new(DoublingBlock::new(), &[1000.0]);
        let output = tester.drive(vec![SampleBuf::Real32(vec![1.0, 2.0, 3.0])]);
        assert_real32_close(output[0].as_real32(), &[2.0, 4.0, 6.0], &Tolerance::DEFAULT);
    }

    struct FixedSource {
        samples: Vec<f32>,
        cursor: usize,
        ports_out: Vec<Port>,
    }

    impl Block for FixedSource {
        fn inputs(&self) -> &[Port] {
            &[]
        }
        fn outputs(&self) -> &[Port] {
            &self.ports_out
        }
        fn set_rate(&mut self, _input_rates: &[f64]) -> Vec<f64> {
            vec![1000.0]
        }
        fn process(&mut self, _inputs: &[SampleBuf], outputs: &mut [SampleBuf]) -> Result<ProcessResult, RuntimeError> {
            if self.cursor >= self.samples.len() {
                return Ok(ProcessResult::EndOfStream);
            }
            let n = (self.samples.len() - self.cursor).min(outputs[0].len());
            if let SampleBuf::Real32(out) = &mut outputs[0] {
                out[..n].copy_from_slice(&self.samples[self.cursor..self.cursor + n]);
            }
            self.cursor += n;
            Ok(ProcessResult::samples(vec![], vec![n]))
        }
    }

    #[test]
    fn no_expected_inputs_mode_drives_a_source() {
        let source = FixedSource {
            samples: vec![1.0, 2.0, 3.0],
            cursor: 0,
            ports_out: vec![Port::output("out1", SampleType::Real32)],
        };
        let mut tester = BlockTester::new(source, &[]);
        let output = tester.drive_source(8);
        assert_real32_close(output[0].as_real32(), &[1.0, 2.0, 3.0], &Tolerance::DEFAULT);
    }
}

//! Builds a three-block graph (constant source -> gain -> counting sink),
//! runs it to completion, and reports how many samples the sink saw.
//!
//! ```text
//! cargo run -p sigflow-graph --example constant_chain
//! ```
//! Set `RUST_LOG=debug` to see per-block worker lifecycle logging.

use sigflow_core::{RuntimeError, SampleType};
use sigflow_graph::{Block, GraphBuilder, Port, ProcessResult, SampleBuf, Scheduler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const TOTAL_SAMPLES: usize = 1_000_000;

struct ConstantSource {
    value: f32,
    remaining: usize,
    ports_out: Vec<Port>,
}

impl Block for ConstantSource {
    fn inputs(&self) -> &[Port] {
        &[]
    }

    fn outputs(&self) -> &[Port] {
        &self.ports_out
    }

    fn set_rate(&mut self, _input_rates: &[f64]) -> Vec<f64> {
        vec![48_000.0]
    }

    fn process(&mut self, _inputs: &[SampleBuf], outputs: &mut [SampleBuf]) -> Result<ProcessResult, RuntimeError> {
        if self.remaining == 0 {
            return Ok(ProcessResult::EndOfStream);
        }
        let n = outputs[0].len().min(self.remaining);
        if let SampleBuf::Real32(out) = &mut outputs[0] {
            out[..n].fill(self.value);
        }
        self.remaining -= n;
        Ok(ProcessResult::samples(vec![], vec![n]))
    }
}

struct Gain {
    factor: f32,
    ports_in: Vec<Port>,
    ports_out: Vec<Port>,
}

impl Block for Gain {
    fn inputs(&self) -> &[Port] {
        &self.ports_in
    }

    fn outputs(&self) -> &[Port] {
        &self.ports_out
    }

    fn set_rate(&mut self, input_rates: &[f64]) -> Vec<f64> {
        input_rates.to_vec()
    }

    fn process(&mut self, inputs: &[SampleBuf], outputs: &mut [SampleBuf]) -> Result<ProcessResult, RuntimeError> {
        let src = inputs[0].as_real32();
        let n = src.len();
        if let SampleBuf::Real32(out) = &mut outputs[0] {
            for (o, s) in out[..n].iter_mut().zip(src) {
                *o = s * self.factor;
            }
        }
        Ok(ProcessResult::samples(vec![n], vec![n]))
    }
}

struct CountingSink {
    ports_in: Vec<Port>,
    count: Arc<AtomicUsize>,
}

impl Block for CountingSink {
    fn inputs(&self) -> &[Port] {
        &self.ports_in
    }

    fn outputs(&self) -> &[Port] {
        &[]
    }

    fn set_rate(&mut self, _input_rates: &[f64]) -> Vec<f64> {
        vec![]
    }

    fn process(&mut self, inputs: &[SampleBuf], _outputs: &mut [SampleBuf]) -> Result<ProcessResult, RuntimeError> {
        let n = inputs[0].len();
        self.count.fetch_add(n, Ordering::SeqCst);
        Ok(ProcessResult::samples(vec![n], vec![]))
    }
}

fn main() {
    env_logger::init();

    let count = Arc::new(AtomicUsize::new(0));

    let mut builder = GraphBuilder::new();
    let source = builder.add(ConstantSource {
        value: 1.0,
        remaining: TOTAL_SAMPLES,
        ports_out: vec![Port::output("out1", SampleType::Real32)],
    });
    let gain = builder.add(Gain {
        factor: 0.5,
        ports_in: vec![Port::input("in1", SampleType::Real32)],
        ports_out: vec![Port::output("out1", SampleType::Real32)],
    });
    let sink = builder.add(CountingSink {
        ports_in: vec![Port::input("in1", SampleType::Real32)],
        count: Arc::clone(&count),
    });

    builder.connect(source, gain).expect("source -> gain");
    builder.connect(gain, sink).expect("gain -> sink");

    let flowgraph = builder.build().expect("graph should validate");
    let mut scheduler = Scheduler::new(flowgraph);
    scheduler.run().expect("run should complete cleanly");

    println!("sink observed {} samples", count.load(Ordering::SeqCst));
}

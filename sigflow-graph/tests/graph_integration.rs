//! Integration tests for the flow-graph builder and scheduler.

use sigflow_core::{GraphError, RuntimeError, SampleType};
use sigflow_graph::{Block, GraphBuilder, Port, ProcessResult, SampleBuf, Scheduler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct ZeroSource {
    rate: f64,
    ports_out: Vec<Port>,
}

impl ZeroSource {
    fn new(rate: f64) -> Self {
        Self {
            rate,
            ports_out: vec![Port::output("out1", SampleType::Real32)],
        }
    }
}

impl Block for ZeroSource {
    fn inputs(&self) -> &[Port] {
        &[]
    }
    fn outputs(&self) -> &[Port] {
        &self.ports_out
    }
    fn set_rate(&mut self, _input_rates: &[f64]) -> Vec<f64> {
        vec![self.rate]
    }
    fn process(&mut self, _inputs: &[SampleBuf], outputs: &mut [SampleBuf]) -> Result<ProcessResult, RuntimeError> {
        let n = outputs[0].len();
        Ok(ProcessResult::samples(vec![], vec![n]))
    }
}

struct ByteCountingSink {
    ports_in: Vec<Port>,
    count: Arc<AtomicUsize>,
}

impl Block for ByteCountingSink {
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

#[test]
fn degenerate_source_sink_runs_until_stopped() {
    let count = Arc::new(AtomicUsize::new(0));
    let mut builder = GraphBuilder::new();
    let src = builder.add(ZeroSource::new(1000.0));
    let sink = builder.add(ByteCountingSink {
        ports_in: vec![Port::input("in1", SampleType::Real32)],
        count: count.clone(),
    });
    builder.connect(src, sink).unwrap();

    let graph = builder.build().unwrap();
    let mut scheduler = Scheduler::new(graph);
    scheduler.start().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(200));
    scheduler.stop().unwrap();

    assert!(count.load(Ordering::SeqCst) > 0, "sink should have consumed some samples before stop");
}

#[test]
fn type_mismatch_prevents_worker_spawn() {
    let mut builder = GraphBuilder::new();
    let src = builder.add(ZeroSource::new(1000.0));
    let sink = builder.add(ByteCountingSink {
        ports_in: vec![Port::input("in1", SampleType::Complex32)],
        count: Arc::new(AtomicUsize::new(0)),
    });

    let err = builder.connect(src, sink).unwrap_err();
    assert!(matches!(err, GraphError::TypeMismatch { .. }));
}

#[test]
fn cycle_is_rejected_before_any_worker_starts() {
    struct Loopback {
        ports_in: Vec<Port>,
        ports_out: Vec<Port>,
    }
    impl Block for Loopback {
        fn inputs(&self) -> &[Port] {
            &self.ports_in
        }
        fn outputs(&self) -> &[Port] {
            &self.ports_out
        }
        fn set_rate(&mut self, rates: &[f64]) -> Vec<f64> {
            vec![rates.first().copied().unwrap_or(0.0)]
        }
        fn process(&mut self, inputs: &[SampleBuf], outputs: &mut [SampleBuf]) -> Result<ProcessResult, RuntimeError> {
            outputs[0] = inputs[0].clone();
            Ok(ProcessResult::samples(vec![inputs[0].len()], vec![outputs[0].len()]))
        }
    }

    let mut builder = GraphBuilder::new();
    let a = builder.add(Loopback {
        ports_in: vec![Port::input("in1", SampleType::Real32)],
        ports_out: vec![Port::output("out1", SampleType::Real32)],
    });
    let b = builder.add(Loopback {
        ports_in: vec![Port::input("in1", SampleType::Real32)],
        ports_out: vec![Port::output("out1", SampleType::Real32)],
    });
    builder.connect(a, b).unwrap();
    builder.connect(b, a).unwrap();

    let err = builder.build().unwrap_err();
    assert_eq!(err, GraphError::GraphCycle);
}

#[test]
fn fan_out_two_sinks_receive_identical_counts() {
    let count_a = Arc::new(AtomicUsize::new(0));
    let count_b = Arc::new(AtomicUsize::new(0));

    let mut builder = GraphBuilder::new();
    let src = builder.add(ZeroSource::new(2000.0));
    let sink_a = builder.add(ByteCountingSink {
        ports_in: vec![Port::input("in1", SampleType::Real32)],
        count: count_a.clone(),
    });
    let sink_b = builder.add(ByteCountingSink {
        ports_in: vec![Port::input("in1", SampleType::Real32)],
        count: count_b.clone(),
    });
    builder.connect_port(src, "out1", sink_a, "in1").unwrap();
    builder.connect_port(src, "out1", sink_b, "in1").unwrap();

    let graph = builder.build().unwrap();
    let mut scheduler = Scheduler::new(graph);
    scheduler.start().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(150));
    scheduler.stop().unwrap();

    assert_eq!(count_a.load(Ordering::SeqCst), count_b.load(Ordering::SeqCst));
    assert!(count_a.load(Ordering::SeqCst) > 0);
}

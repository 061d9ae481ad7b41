//! One OS thread per primitive block, wired together by stream buffers.
//!
//! The block-handle types and topological order it runs against are reused
//! from `graph.rs`; the worker loop itself has no analog in a
//! single-audio-callback-thread design and is new here.

use crate::block::{Block, BlockId, ProcessResult, SampleBuf};
use crate::buffers::{make_channel, AnyConsumer, AnyProducer};
use crate::graph::Flowgraph;
use sigflow_core::{FlowError, FlowResult, InitError, RuntimeContext};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Bounded chunk size a worker offers to `process` per iteration, in
/// elements.
const CHUNK_ELEMENTS: usize = 2048;

struct WiredBlock {
    id: BlockId,
    block: Box<dyn Block>,
    input_consumers: Vec<AnyConsumer>,
    output_producers: Vec<Option<AnyProducer>>,
    is_source: bool,
}

/// Runs a validated `Flowgraph`: one worker thread per block, bounded stream
/// buffers per edge, cooperative shutdown via per-source stop flags.
pub struct Scheduler {
    flowgraph: Option<Flowgraph>,
    ctx: RuntimeContext,
    workers: Vec<JoinHandle<()>>,
    stop_flags: Vec<Arc<AtomicBool>>,
    first_error: Arc<Mutex<Option<FlowError>>>,
    started: bool,
}

impl Scheduler {
    pub fn new(flowgraph: Flowgraph) -> Self {
        Self::with_context(flowgraph, RuntimeContext::from_env())
    }

    pub fn with_context(flowgraph: Flowgraph, ctx: RuntimeContext) -> Self {
        Self {
            flowgraph: Some(flowgraph),
            ctx,
            workers: Vec::new(),
            stop_flags: Vec::new(),
            first_error: Arc::new(Mutex::new(None)),
            started: false,
        }
    }

    /// Validates rate propagation, initializes every block in topological
    /// order, allocates one stream buffer per edge, and spawns one worker
    /// thread per block. Returns as soon as every worker has been spawned.
    pub fn start(&mut self) -> FlowResult<()> {
        assert!(!self.started, "Scheduler::start called twice");
        let mut flowgraph = self.flowgraph.take().expect("Scheduler used after being consumed");

        flowgraph.propagate_rates()?;

        // initialize() in topological order; roll back in reverse order on
        // the first failure, so a block that never initialized successfully
        // never sees deinitialize.
        let order = flowgraph.order().to_vec();
        let mut initialized: Vec<usize> = Vec::new();
        let init_result: Result<(), InitError> = (|| {
            for &id in &order {
                flowgraph.blocks[id.0].initialize(&self.ctx)?;
                initialized.push(id.0);
            }
            Ok(())
        })();
        if let Err(e) = init_result {
            for &idx in initialized.iter().rev() {
                flowgraph.blocks[idx].deinitialize();
            }
            return Err(FlowError::Init(e));
        }

        let num_blocks = flowgraph.block_count();

        // One buffer per (block, output port): the producer half is held by
        // that block's worker, a consumer half goes to every block/port
        // pair the edge list names as a destination of that output.
        let mut output_producers: Vec<Vec<Option<AnyProducer>>> = (0..num_blocks).map(|i| vec![None; flowgraph.blocks[i].outputs().len()]).collect();
        let mut input_consumers: Vec<Vec<Option<AnyConsumer>>> = (0..num_blocks).map(|i| vec![None; flowgraph.blocks[i].inputs().len()]).collect();

        for block_idx in 0..num_blocks {
            for (port_idx, port) in flowgraph.blocks[block_idx].outputs().iter().enumerate() {
                let fan_out = flowgraph
                    .connections()
                    .iter()
                    .filter(|c| c.from.0 == block_idx && c.from_port == port_idx)
                    .count();
                if fan_out == 0 {
                    continue;
                }
                let (producer, mut consumers) = make_channel(port.sample_type, self.ctx.buffer_capacity, fan_out);
                output_producers[block_idx][port_idx] = Some(producer);
                for conn in flowgraph.connections().iter().filter(|c| c.from.0 == block_idx && c.from_port == port_idx) {
                    input_consumers[conn.to.0][conn.to_port] = Some(consumers.remove(0));
                }
            }
        }

        let mut blocks: Vec<Option<Box<dyn Block>>> = std::mem::take(&mut flowgraph.blocks).into_iter().map(Some).collect();

        let mut wired = Vec::with_capacity(num_blocks);
        for block_idx in 0..num_blocks {
            let block = blocks[block_idx].take().expect("block taken twice");
            let is_source = block.inputs().is_empty();
            wired.push(WiredBlock {
                id: BlockId(block_idx),
                block,
                input_consumers: input_consumers[block_idx].drain(..).map(|c| c.expect("validated graph leaves no input unwired")).collect(),
                output_producers: std::mem::take(&mut output_producers[block_idx]),
                is_source,
            });
        }

        self.stop_flags.clear();
        for wb in &wired {
            if wb.is_source {
                self.stop_flags.push(Arc::new(AtomicBool::new(false)));
            }
        }

        let mut source_index = 0;
        for wb in wired {
            let stop_flag = if wb.is_source {
                let f = self.stop_flags[source_index].clone();
                source_index += 1;
                Some(f)
            } else {
                None
            };
            let first_error = self.first_error.clone();
            let debug = self.ctx.debug;
            let handle = thread::spawn(move || run_worker(wb, stop_flag, first_error, debug));
            self.workers.push(handle);
        }

        self.started = true;
        Ok(())
    }

    /// Signals every source to close, waits for the resulting end-of-stream
    /// cascade to drain every worker, and returns the first error observed
    /// across all workers (if any). Idempotent once all workers have been
    /// joined.
    pub fn stop(&mut self) -> FlowResult<()> {
        for flag in &self.stop_flags {
            flag.store(true, Ordering::SeqCst);
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        match self.first_error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// `start()` then waits for natural end-of-stream or SIGINT, then
    /// reports the result `stop()` would have. SIGINT is not distinguished
    /// from natural EOS in the return value; it is logged at `info!` level
    /// instead.
    pub fn run(&mut self) -> FlowResult<()> {
        self.start()?;

        let interrupted = Arc::new(AtomicBool::new(false));
        let flags_for_handler = self.stop_flags.clone();
        let interrupted_for_handler = interrupted.clone();
        let handler_installed = ctrlc::set_handler(move || {
            interrupted_for_handler.store(true, Ordering::SeqCst);
            for flag in &flags_for_handler {
                flag.store(true, Ordering::SeqCst);
            }
        })
        .is_ok();
        if !handler_installed {
            log::warn!("could not install SIGINT handler; run() will only stop on natural end-of-stream");
        }

        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }

        if interrupted.load(Ordering::SeqCst) {
            log::info!("run() returning after SIGINT-triggered shutdown");
        }

        match self.first_error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn run_worker(mut wb: WiredBlock, stop_flag: Option<Arc<AtomicBool>>, first_error: Arc<Mutex<Option<FlowError>>>, debug: bool) {
    if debug {
        log::debug!("worker for {} starting", wb.id);
    }

    // Per-input leftover: a block may consume fewer elements than offered,
    // so unconsumed elements carry over to the next `process` call rather
    // than being read twice from the stream buffer.
    let mut pending: Vec<SampleBuf> = wb.block.inputs().iter().map(|p| SampleBuf::empty(p.sample_type)).collect();

    loop {
        if let Some(flag) = &stop_flag {
            if flag.load(Ordering::SeqCst) {
                break;
            }
        }

        let mut any_input_eos = false;
        for (idx, consumer) in wb.input_consumers.iter().enumerate() {
            let need = CHUNK_ELEMENTS.saturating_sub(pending[idx].len());
            if need == 0 {
                continue;
            }
            let (chunk, eos) = consumer.read(need);
            pending[idx].append(chunk);
            if eos && pending[idx].is_empty() {
                any_input_eos = true;
            }
        }

        if any_input_eos {
            break;
        }

        let mut out_bufs: Vec<SampleBuf> = wb
            .block
            .outputs()
            .iter()
            .map(|p| SampleBuf::zeroed(p.sample_type, CHUNK_ELEMENTS))
            .collect();

        let result = wb.block.process(&pending, &mut out_bufs);

        match result {
            Ok(ProcessResult::EndOfStream) => break,
            Ok(ProcessResult::Samples { consumed, produced }) => {
                for (idx, &n) in consumed.iter().enumerate() {
                    pending[idx].drain_prefix(n);
                }
                for (idx, producer) in wb.output_producers.iter().enumerate() {
                    if let Some(producer) = producer {
                        // `Producer::write` blocks for space but may still
                        // write fewer than offered (whenever the slowest
                        // reader frees up less room than the full batch);
                        // loop until everything produced this call has
                        // actually been committed, so nothing is dropped.
                        let mut remaining = out_bufs[idx].take_prefix(produced[idx]);
                        while !remaining.is_empty() {
                            let written = producer.write(&remaining);
                            remaining.drain_prefix(written);
                        }
                    }
                }
                if wb.block.inputs().is_empty() && produced.iter().all(|&n| n == 0) {
                    // A source producing nothing and not yet EOS would spin
                    // hot; yield briefly so it can re-check its stop flag
                    // and its own upstream condition without starving other
                    // threads.
                    thread::yield_now();
                }
            }
            Err(e) => {
                log::error!("worker for {} failed: {e}", wb.id);
                let mut guard = first_error.lock().unwrap();
                if guard.is_none() {
                    *guard = Some(FlowError::Runtime(e));
                }
                break;
            }
        }
    }

    wb.block.deinitialize();
    for producer in wb.output_producers.iter().flatten() {
        producer.close();
    }
    if debug {
        log::debug!("worker for {} exiting", wb.id);
    }
}

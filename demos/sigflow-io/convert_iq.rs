//! Converts a raw interleaved-IQ file from one wire sample format to
//! another by running a two-block graph through the scheduler.
//!
//! ```text
//! cargo run -p sigflow-io --example convert_iq -- in.iq out.iq
//! ```
//! Set `RUST_LOG=debug` to see per-block lifecycle and I/O logging.

use sigflow_graph::{GraphBuilder, Scheduler};
use sigflow_io::{IqSink, IqSource, SampleFormat};
use std::env;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let mut args = env::args().skip(1);
    let (Some(input), Some(output)) = (args.next(), args.next()) else {
        eprintln!("usage: convert_iq <input.iq> <output.iq>");
        return ExitCode::FAILURE;
    };

    let mut builder = GraphBuilder::new();
    let source = builder.add(IqSource::new(input, SampleFormat::S16Le, 2_000_000.0));
    let sink = builder.add(IqSink::new(output, SampleFormat::U8));
    if let Err(e) = builder.connect(source, sink) {
        eprintln!("failed to wire graph: {e}");
        return ExitCode::FAILURE;
    }

    let flowgraph = match builder.build() {
        Ok(g) => g,
        Err(e) => {
            eprintln!("failed to build graph: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut scheduler = Scheduler::new(flowgraph);
    if let Err(e) = scheduler.run() {
        eprintln!("run failed: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

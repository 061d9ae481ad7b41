//! A block-based flow-graph runtime for real-time signal processing: typed
//! ports, graph validation with composite expansion, and a thread-per-block
//! scheduler with backpressure-governed stream buffers.

pub mod block;
pub mod buffers;
pub mod graph;
pub mod port;
pub mod scheduler;
pub mod tester;

pub use block::{Block, BlockId, ProcessResult, SampleBuf};
pub use graph::{CompositeBlock, CompositePorts, Connection, Flowgraph, GraphBuilder};
pub use port::{Direction, Port};
pub use scheduler::Scheduler;
pub use tester::{assert_complex32_close, assert_real32_close, BlockTester, Tolerance};

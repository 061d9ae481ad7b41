//! Foundational types shared by the flow-graph runtime: the closed sample-type
//! registry, the error taxonomy, process-wide runtime configuration, and the
//! bounded SPMC stream buffer that carries samples between blocks.

pub mod env;
pub mod error;
pub mod ring_buffer;
pub mod sample_type;

pub use env::RuntimeContext;
pub use error::{FlowError, FlowResult, GraphError, InitError, RuntimeError};
pub use ring_buffer::{channel, Consumer, Producer};
pub use sample_type::{Complex32, SampleType};

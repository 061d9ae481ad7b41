//! Graph construction, composite expansion, and validation.
//!
//! Grounded on the fluent `GraphBuilder<S>` and `topological_sort()`
//! (Kahn's algorithm over a `HashMap<BlockId, Vec<BlockId>>` adjacency list)
//! of this codebase's DSP graph builder, generalized from a single sample
//! element type `S` to the closed `SampleType` set, and from an
//! audio-callback execution model to the scheduler in `scheduler.rs`.

use crate::block::{Block, BlockId};
use crate::port::{Direction, Port};
use sigflow_core::GraphError;
use std::collections::{HashMap, HashSet, VecDeque};

/// A directed edge: `from`'s output port `from_port` feeds `to`'s input port
/// `to_port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub from: BlockId,
    pub from_port: usize,
    pub to: BlockId,
    pub to_port: usize,
}

/// A block-shaped facade whose `expand` emits a sub-graph of primitive
/// blocks plus a table aliasing the composite's own ports to ports inside
/// that sub-graph.
///
/// `expand` returns only primitive blocks, never another composite: a
/// composite's interior cannot itself contain a nested composite. Multiple
/// composites may still appear side by side in one graph; each expands on
/// its own, independently of the others.
pub trait CompositeBlock {
    fn inputs(&self) -> &[Port];
    fn outputs(&self) -> &[Port];

    /// Expand into primitive blocks, the internal connections between them
    /// (indices are positions in the returned block vec), and the alias
    /// table mapping this composite's own port index to `(internal block
    /// index, internal port index)`.
    #[allow(clippy::type_complexity)]
    fn expand(self: Box<Self>) -> (Vec<Box<dyn Block>>, Vec<(usize, usize, usize, usize)>, CompositePorts);
}

/// Alias tables from a composite's external ports to its internal ports.
#[derive(Debug, Default, Clone)]
pub struct CompositePorts {
    /// `input_aliases[i] = (internal_block_index, internal_port_index)` for
    /// the composite's i-th input port.
    pub input_aliases: Vec<(usize, usize)>,
    /// Same shape, for output ports.
    pub output_aliases: Vec<(usize, usize)>,
}

enum Entry {
    Primitive(Box<dyn Block>),
    Composite(Box<dyn CompositeBlock>),
}

impl Entry {
    fn inputs(&self) -> &[Port] {
        match self {
            Entry::Primitive(b) => b.inputs(),
            Entry::Composite(c) => c.inputs(),
        }
    }

    fn outputs(&self) -> &[Port] {
        match self {
            Entry::Primitive(b) => b.outputs(),
            Entry::Composite(c) => c.outputs(),
        }
    }
}

/// Builds a graph incrementally, then expands composites and validates it
/// into a `Flowgraph` ready for `Scheduler`.
#[derive(Default)]
pub struct GraphBuilder {
    entries: Vec<Entry>,
    connections: Vec<Connection>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, block: impl Block + 'static) -> BlockId {
        let id = BlockId(self.entries.len());
        self.entries.push(Entry::Primitive(Box::new(block)));
        id
    }

    pub fn add_composite(&mut self, composite: impl CompositeBlock + 'static) -> BlockId {
        let id = BlockId(self.entries.len());
        self.entries.push(Entry::Composite(Box::new(composite)));
        id
    }

    fn port_index(&self, id: BlockId, direction: Direction, name: &str) -> Result<usize, GraphError> {
        let entry = &self.entries[id.0];
        let ports = match direction {
            Direction::Input => entry.inputs(),
            Direction::Output => entry.outputs(),
        };
        ports
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| GraphError::PortNotFound(format!("{id}.{name}")))
    }

    /// Explicit single-edge connection by port name.
    pub fn connect_port(&mut self, from: BlockId, out_name: &str, to: BlockId, in_name: &str) -> Result<(), GraphError> {
        let from_port = self.port_index(from, Direction::Output, out_name)?;
        let to_port = self.port_index(to, Direction::Input, in_name)?;
        self.connect_indices(from, from_port, to, to_port)
    }

    /// Shorthand: connects every output port of `from` in order to the input
    /// ports of `to` in order. Port counts and types must align.
    pub fn connect(&mut self, from: BlockId, to: BlockId) -> Result<(), GraphError> {
        let outputs = self.entries[from.0].outputs().to_vec();
        let inputs = self.entries[to.0].inputs().to_vec();
        if outputs.len() != inputs.len() {
            return Err(GraphError::PortNotFound(format!(
                "{from} has {} output(s) but {to} has {} input(s)",
                outputs.len(),
                inputs.len()
            )));
        }
        for i in 0..outputs.len() {
            self.connect_indices(from, i, to, i)?;
        }
        Ok(())
    }

    fn connect_indices(&mut self, from: BlockId, from_port: usize, to: BlockId, to_port: usize) -> Result<(), GraphError> {
        let from_type = self.entries[from.0].outputs()[from_port].sample_type;
        let to_type = self.entries[to.0].inputs()[to_port].sample_type;
        if from_type != to_type {
            return Err(GraphError::TypeMismatch {
                from: format!("{from}.out{from_port} ({from_type})"),
                to: format!("{to}.in{to_port} ({to_type})"),
            });
        }
        self.connections.push(Connection {
            from,
            from_port,
            to,
            to_port,
        });
        Ok(())
    }

    /// Expands every composite block into its primitive sub-graph and remaps
    /// edges across composite boundaries through each composite's
    /// port-alias table. No pointer into a composite's interior survives
    /// expansion: every connection in the result names only primitive
    /// blocks. Composites may be freely mixed with primitives and with each
    /// other in one graph; each expands independently.
    fn expand(self) -> (Vec<Box<dyn Block>>, Vec<Connection>) {
        let mut blocks: Vec<Option<Box<dyn Block>>> = Vec::new();
        let mut composites: HashMap<usize, Box<dyn CompositeBlock>> = HashMap::new();
        for (i, entry) in self.entries.into_iter().enumerate() {
            match entry {
                Entry::Primitive(b) => blocks.push(Some(b)),
                Entry::Composite(c) => {
                    composites.insert(i, c);
                    blocks.push(None);
                }
            }
        }
        let mut connections = self.connections;

        // `expand` only ever returns primitive blocks (see `CompositeBlock`),
        // so this drains every composite known up front and runs exactly
        // once; the loop shape is kept only because it reads naturally as
        // "expand until none remain".
        while !composites.is_empty() {
            let pending: HashMap<usize, Box<dyn CompositeBlock>> = composites.drain().collect();

            for (old_index, composite) in pending {
                let (sub_blocks, sub_connections, aliases) = composite.expand();
                let base = blocks.len();
                for (j, sb) in sub_blocks.into_iter().enumerate() {
                    let _ = j;
                    blocks.push(Some(sb));
                }
                for (src_i, src_p, dst_i, dst_p) in sub_connections {
                    connections.push(Connection {
                        from: BlockId(base + src_i),
                        from_port: src_p,
                        to: BlockId(base + dst_i),
                        to_port: dst_p,
                    });
                }
                // Remap every existing connection that touched the
                // composite's external ports onto its internal aliases.
                for conn in connections.iter_mut() {
                    if conn.from.0 == old_index {
                        let (b, p) = aliases.output_aliases[conn.from_port];
                        conn.from = BlockId(base + b);
                        conn.from_port = p;
                    }
                    if conn.to.0 == old_index {
                        let (b, p) = aliases.input_aliases[conn.to_port];
                        conn.to = BlockId(base + b);
                        conn.to_port = p;
                    }
                }
            }
        }

        let blocks: Vec<Box<dyn Block>> = blocks.into_iter().map(|b| b.expect("composite slot left unexpanded")).collect();
        (blocks, connections)
    }

    /// Expands composites and validates the result, producing a
    /// `Flowgraph`. Validation rules are checked in a fixed order: ports
    /// exist (checked incrementally as edges are added above), types match
    /// (likewise), no multiply-connected inputs, acyclic, every non-source
    /// input connected.
    pub fn build(self) -> Result<Flowgraph, GraphError> {
        let (blocks, connections) = self.expand();

        let mut incoming: HashMap<(usize, usize), usize> = HashMap::new();
        for conn in &connections {
            *incoming.entry((conn.to.0, conn.to_port)).or_insert(0) += 1;
        }
        for ((block_idx, port_idx), count) in &incoming {
            if *count > 1 {
                return Err(GraphError::MultiplyConnectedInput(format!(
                    "{}.{}",
                    BlockId(*block_idx),
                    blocks[*block_idx].inputs()[*port_idx].name
                )));
            }
        }

        let order = topological_sort(blocks.len(), &connections)?;

        for (block_idx, block) in blocks.iter().enumerate() {
            let is_source = block.inputs().is_empty();
            if is_source {
                continue;
            }
            for (port_idx, port) in block.inputs().iter().enumerate() {
                if !incoming.contains_key(&(block_idx, port_idx)) {
                    return Err(GraphError::UnconnectedInput(format!("{}.{}", BlockId(block_idx), port.name)));
                }
            }
        }

        Ok(Flowgraph {
            blocks,
            connections,
            order,
        })
    }
}

/// Kahn's algorithm: returns blocks in topological order, or `GraphCycle` if
/// any block cannot be ordered (i.e. a cycle remains after removing every
/// zero-in-degree node repeatedly).
pub fn topological_sort(num_blocks: usize, connections: &[Connection]) -> Result<Vec<BlockId>, GraphError> {
    let mut adjacency: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut in_degree = vec![0usize; num_blocks];
    for conn in connections {
        adjacency.entry(conn.from.0).or_default().push(conn.to.0);
        in_degree[conn.to.0] += 1;
    }

    let mut queue: VecDeque<usize> = (0..num_blocks).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(num_blocks);
    let mut visited = HashSet::new();

    while let Some(node) = queue.pop_front() {
        if !visited.insert(node) {
            continue;
        }
        order.push(BlockId(node));
        if let Some(successors) = adjacency.get(&node) {
            for &succ in successors {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    queue.push_back(succ);
                }
            }
        }
    }

    if order.len() != num_blocks {
        return Err(GraphError::GraphCycle);
    }
    Ok(order)
}

/// A fully expanded, validated graph: primitive blocks, their connections,
/// and a topological execution order. Ready to be handed to `Scheduler`.
pub struct Flowgraph {
    pub(crate) blocks: Vec<Box<dyn Block>>,
    pub(crate) connections: Vec<Connection>,
    pub(crate) order: Vec<BlockId>,
}

impl Flowgraph {
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn order(&self) -> &[BlockId] {
        &self.order
    }

    /// Propagates sample rates from sources along the topological order,
    /// calling `set_rate` on each block with the rates its inputs carry.
    /// Returns the rate on each block's primary (first) output, or
    /// `UndefinedRate` if a non-source block has no inputs connected to any
    /// rate-bearing source (this should already be impossible after
    /// `UnconnectedInput` validation, but is re-checked defensively here
    /// since rate propagation runs after `initialize`, a separate phase).
    pub fn propagate_rates(&mut self) -> Result<HashMap<BlockId, Vec<f64>>, GraphError> {
        let mut output_rates: HashMap<BlockId, Vec<f64>> = HashMap::new();

        for &block_id in &self.order.clone() {
            let input_rates: Vec<f64> = self
                .connections
                .iter()
                .filter(|c| c.to == block_id)
                .map(|c| {
                    output_rates
                        .get(&c.from)
                        .and_then(|rates| rates.get(c.from_port))
                        .copied()
                        .unwrap_or(0.0)
                })
                .collect();

            let block = &mut self.blocks[block_id.0];
            let rates = block.set_rate(&input_rates);

            if !block.outputs().is_empty() && rates.iter().all(|&r| r <= 0.0) {
                return Err(GraphError::UndefinedRate(block_id.to_string()));
            }
            output_rates.insert(block_id, rates);
        }

        Ok(output_rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ProcessResult, SampleBuf};
    use crate::port::Port;
    use sigflow_core::SampleType;

    struct ConstSource {
        rate: f64,
        ports_out: Vec<Port>,
    }

    impl ConstSource {
        fn new(rate: f64) -> Self {
            Self {
                rate,
                ports_out: vec![Port::output("out1", SampleType::Real32)],
            }
        }
    }

    impl Block for ConstSource {
        fn inputs(&self) -> &[Port] {
            &[]
        }
        fn outputs(&self) -> &[Port] {
            &self.ports_out
        }
        fn set_rate(&mut self, _input_rates: &[f64]) -> Vec<f64> {
            vec![self.rate]
        }
        fn process(&mut self, _inputs: &[SampleBuf], outputs: &mut [SampleBuf]) -> Result<ProcessResult, sigflow_core::RuntimeError> {
            outputs[0] = SampleBuf::Real32(vec![0.0; 4]);
            Ok(ProcessResult::samples(vec![], vec![4]))
        }
    }

    struct PassThrough {
        ports_in: Vec<Port>,
        ports_out: Vec<Port>,
    }

    impl PassThrough {
        fn new(t: SampleType) -> Self {
            Self {
                ports_in: vec![Port::input("in1", t)],
                ports_out: vec![Port::output("out1", t)],
            }
        }
    }

    impl Block for PassThrough {
        fn inputs(&self) -> &[Port] {
            &self.ports_in
        }
        fn outputs(&self) -> &[Port] {
            &self.ports_out
        }
        fn set_rate(&mut self, input_rates: &[f64]) -> Vec<f64> {
            vec![input_rates.first().copied().unwrap_or(0.0)]
        }
        fn process(&mut self, inputs: &[SampleBuf], outputs: &mut [SampleBuf]) -> Result<ProcessResult, sigflow_core::RuntimeError> {
            outputs[0] = inputs[0].clone();
            Ok(ProcessResult::samples(vec![inputs[0].len()], vec![outputs[0].len()]))
        }
    }

    struct Sink {
        ports_in: Vec<Port>,
    }

    impl Sink {
        fn new(t: SampleType) -> Self {
            Self {
                ports_in: vec![Port::input("in1", t)],
            }
        }
    }

    impl Block for Sink {
        fn inputs(&self) -> &[Port] {
            &self.ports_in
        }
        fn outputs(&self) -> &[Port] {
            &[]
        }
        fn set_rate(&mut self, _input_rates: &[f64]) -> Vec<f64> {
            vec![]
        }
        fn process(&mut self, inputs: &[SampleBuf], _outputs: &mut [SampleBuf]) -> Result<ProcessResult, sigflow_core::RuntimeError> {
            Ok(ProcessResult::samples(vec![inputs[0].len()], vec![]))
        }
    }

    #[test]
    fn simple_chain_builds_and_orders_topologically() {
        let mut builder = GraphBuilder::new();
        let src = builder.add(ConstSource::new(1000.0));
        let pass = builder.add(PassThrough::new(SampleType::Real32));
        let sink = builder.add(Sink::new(SampleType::Real32));
        builder.connect(src, pass).unwrap();
        builder.connect(pass, sink).unwrap();

        let graph = builder.build().unwrap();
        let positions: HashMap<BlockId, usize> = graph.order.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        assert!(positions[&src] < positions[&pass]);
        assert!(positions[&pass] < positions[&sink]);
    }

    #[test]
    fn type_mismatch_rejected_at_connect_time() {
        let mut builder = GraphBuilder::new();
        let src = builder.add(ConstSource::new(1000.0));
        let sink = builder.add(Sink::new(SampleType::Complex32));
        let err = builder.connect(src, sink).unwrap_err();
        assert!(matches!(err, GraphError::TypeMismatch { .. }));
    }

    #[test]
    fn cycle_rejected_at_build_time() {
        let mut builder = GraphBuilder::new();
        let a = builder.add(PassThrough::new(SampleType::Real32));
        let b = builder.add(PassThrough::new(SampleType::Real32));
        builder.connect_port(a, "out1", b, "in1").unwrap();
        builder.connect_port(b, "out1", a, "in1").unwrap();
        let err = builder.build().unwrap_err();
        assert_eq!(err, GraphError::GraphCycle);
    }

    #[test]
    fn unconnected_input_rejected_at_build_time() {
        let mut builder = GraphBuilder::new();
        let _src = builder.add(ConstSource::new(1000.0));
        let _sink = builder.add(Sink::new(SampleType::Real32));
        let err = builder.build().unwrap_err();
        assert!(matches!(err, GraphError::UnconnectedInput(_)));
    }

    #[test]
    fn multiply_connected_input_rejected_at_build_time() {
        let mut builder = GraphBuilder::new();
        let src1 = builder.add(ConstSource::new(1000.0));
        let src2 = builder.add(ConstSource::new(1000.0));
        let sink = builder.add(Sink::new(SampleType::Real32));
        builder.connect_port(src1, "out1", sink, "in1").unwrap();
        builder.connect_port(src2, "out1", sink, "in1").unwrap();
        let err = builder.build().unwrap_err();
        assert!(matches!(err, GraphError::MultiplyConnectedInput(_)));
    }

    #[test]
    fn rate_propagates_from_source_through_chain() {
        let mut builder = GraphBuilder::new();
        let src = builder.add(ConstSource::new(2_400_000.0));
        let pass = builder.add(PassThrough::new(SampleType::Real32));
        let sink = builder.add(Sink::new(SampleType::Real32));
        builder.connect(src, pass).unwrap();
        builder.connect(pass, sink).unwrap();

        let mut graph = builder.build().unwrap();
        let rates = graph.propagate_rates().unwrap();
        assert_eq!(rates[&src], vec![2_400_000.0]);
        assert_eq!(rates[&pass], vec![2_400_000.0]);
        assert_eq!(rates[&sink], Vec::<f64>::new());
    }

    /// A composite with two independent input/output pairs, each wired
    /// straight through an internal `PassThrough`. Exercises port aliasing
    /// with more than one internal block.
    struct IdentityPair {
        ports_in: Vec<Port>,
        ports_out: Vec<Port>,
    }

    impl IdentityPair {
        fn new(t: SampleType) -> Self {
            Self {
                ports_in: vec![Port::input("in1", t), Port::input("in2", t)],
                ports_out: vec![Port::output("out1", t), Port::output("out2", t)],
            }
        }
    }

    impl CompositeBlock for IdentityPair {
        fn inputs(&self) -> &[Port] {
            &self.ports_in
        }
        fn outputs(&self) -> &[Port] {
            &self.ports_out
        }
        fn expand(self: Box<Self>) -> (Vec<Box<dyn Block>>, Vec<(usize, usize, usize, usize)>, CompositePorts) {
            let t = self.ports_in[0].sample_type;
            let blocks: Vec<Box<dyn Block>> = vec![Box::new(PassThrough::new(t)), Box::new(PassThrough::new(t))];
            let internal_connections = Vec::new();
            let aliases = CompositePorts {
                input_aliases: vec![(0, 0), (1, 0)],
                output_aliases: vec![(0, 0), (1, 0)],
            };
            (blocks, internal_connections, aliases)
        }
    }

    #[test]
    fn composite_expands_into_primitives_with_aliased_ports() {
        let mut builder = GraphBuilder::new();
        let src1 = builder.add(ConstSource::new(1000.0));
        let src2 = builder.add(ConstSource::new(2000.0));
        let pair = builder.add_composite(IdentityPair::new(SampleType::Real32));
        let sink1 = builder.add(Sink::new(SampleType::Real32));
        let sink2 = builder.add(Sink::new(SampleType::Real32));

        builder.connect_port(src1, "out1", pair, "in1").unwrap();
        builder.connect_port(src2, "out1", pair, "in2").unwrap();
        builder.connect_port(pair, "out1", sink1, "in1").unwrap();
        builder.connect_port(pair, "out2", sink2, "in1").unwrap();

        let graph = builder.build().unwrap();

        // 4 original primitives + 2 expanded internal pass-throughs.
        assert_eq!(graph.block_count(), 6);
        // No connection should still reference the old composite's index;
        // every edge names a primitive block in range.
        for conn in graph.connections() {
            assert!(conn.from.0 < graph.block_count());
            assert!(conn.to.0 < graph.block_count());
        }
    }
}

//! Builder API for a [`Graph`].

use crate::{
    graph::{BasicBlock, BlockData, Graph, PointerWidth},
    node::{
        Binary, BinOp, Branch, Call, CallDescriptor, ExternalRef, HeapRef, Load, MachineRep,
        MachineType, Node, NodeData, Phi, Store, Switch, Unary, UnOp, WriteBarrier,
    },
};
use compact_str::CompactString;
use cranelift_entity::{packed_option::PackedOption, EntityList};

/// Appends nodes to a [`Graph`] one block at a time.
///
/// The builder keeps a current-block cursor. Emitting a terminator clears the
/// cursor; [`GraphBuilder::bind`] points it at a not-yet-bound block. Every
/// control transfer records an edge on its target so predecessor order is the
/// order transfers were emitted.
pub struct GraphBuilder {
    graph: Graph,
    descriptor: CallDescriptor,
    current: PackedOption<BasicBlock>,
}

impl GraphBuilder {
    /// Creates a builder whose graph starts with a bound entry block.
    /// `descriptor` is the calling convention of the code object being built;
    /// it bounds the legal [`parameter`](Self::parameter) indices.
    pub fn new(pointer_width: PointerWidth, descriptor: CallDescriptor) -> Self {
        let mut graph = Graph::new(pointer_width);
        let entry = graph.blocks.push(BlockData {
            name: Some(CompactString::const_new("entry")),
            bound: true,
            ..BlockData::default()
        });
        Self {
            graph,
            descriptor,
            current: entry.into(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn pointer_width(&self) -> PointerWidth {
        self.graph.pointer_width
    }

    pub fn call_descriptor(&self) -> CallDescriptor {
        self.descriptor
    }

    pub fn finish(self) -> Graph {
        self.graph
    }

    fn emit(&mut self, data: NodeData) -> Node {
        let block = self
            .current
            .expand()
            .expect("emitting a node with no block bound");
        let terminator = data.is_terminator();
        let node = self.graph.nodes.push(data);
        self.graph.blocks[block].nodes.push(node);
        if terminator {
            self.current = PackedOption::default();
        }
        node
    }

    fn record_edge(&mut self, target: BasicBlock) {
        let from = self
            .current
            .expand()
            .expect("emitting a control transfer with no block bound");
        self.graph.blocks[target].preds.push(from);
    }

    // Block management.

    pub fn create_block(&mut self, deferred: bool) -> BasicBlock {
        self.graph.blocks.push(BlockData {
            deferred,
            ..BlockData::default()
        })
    }

    /// Starts emitting into `block`. A block can be bound only once.
    pub fn bind(&mut self, block: BasicBlock) {
        let data = &mut self.graph.blocks[block];
        assert!(!data.bound, "{block} bound twice");
        data.bound = true;
        self.current = block.into();
    }

    // Constants and parameters.

    pub fn int32_constant(&mut self, value: i32) -> Node {
        self.emit(NodeData::Int32Constant(value))
    }

    pub fn int64_constant(&mut self, value: i64) -> Node {
        self.emit(NodeData::Int64Constant(value))
    }

    /// Pointer-width integer constant: 32-bit or 64-bit per the target.
    pub fn intptr_constant(&mut self, value: i64) -> Node {
        match self.graph.pointer_width {
            PointerWidth::P32 => self.int32_constant(value as i32),
            PointerWidth::P64 => self.int64_constant(value),
        }
    }

    pub fn float64_constant(&mut self, value: f64) -> Node {
        self.emit(NodeData::Float64Constant(value))
    }

    pub fn boolean_constant(&mut self, value: bool) -> Node {
        self.emit(NodeData::BooleanConstant(value))
    }

    pub fn heap_constant(&mut self, object: HeapRef) -> Node {
        self.emit(NodeData::HeapConstant(object))
    }

    pub fn external_constant(&mut self, reference: ExternalRef) -> Node {
        self.emit(NodeData::ExternalConstant(reference))
    }

    pub fn parameter(&mut self, index: u32) -> Node {
        assert!(
            index < self.descriptor.param_count,
            "parameter {index} out of range for descriptor with {} parameters",
            self.descriptor.param_count
        );
        self.emit(NodeData::Parameter(index))
    }

    // Arithmetic.

    pub fn binary(&mut self, op: BinOp, lhs: Node, rhs: Node) -> Node {
        self.emit(NodeData::Binary(Binary { op, lhs, rhs }))
    }

    pub fn unary(&mut self, op: UnOp, input: Node) -> Node {
        self.emit(NodeData::Unary(Unary { op, input }))
    }

    // Memory.

    pub fn load(&mut self, ty: MachineType, base: Node, offset: Node) -> Node {
        self.emit(NodeData::Load(Load { ty, base, offset }))
    }

    pub fn store(
        &mut self,
        rep: MachineRep,
        base: Node,
        offset: Node,
        value: Node,
        barrier: WriteBarrier,
    ) -> Node {
        self.emit(NodeData::Store(Store {
            rep,
            base,
            offset,
            value,
            barrier,
        }))
    }

    // Merges.

    /// Creates a phi in the current block with one input per predecessor
    /// edge recorded so far, in edge order.
    pub fn phi(&mut self, rep: MachineRep, inputs: &[Node]) -> Node {
        let inputs = EntityList::from_slice(inputs, &mut self.graph.node_lists);
        self.emit(NodeData::Phi(Phi { rep, inputs }))
    }

    pub fn append_phi_input(&mut self, phi: Node, input: Node) {
        self.graph.append_phi_input(phi, input);
    }

    // Calls.

    pub fn call_n(&mut self, descriptor: CallDescriptor, target: Node, args: &[Node]) -> Node {
        assert_eq!(
            args.len(),
            descriptor.param_count as usize,
            "call argument count does not match descriptor"
        );
        let args = EntityList::from_slice(args, &mut self.graph.node_lists);
        self.emit(NodeData::Call(Call {
            descriptor,
            target,
            args,
        }))
    }

    /// A tail call is a terminator: control leaves the code object.
    pub fn tail_call_n(&mut self, descriptor: CallDescriptor, target: Node, args: &[Node]) -> Node {
        assert!(
            descriptor.supports_tail_call,
            "descriptor does not support tail calls"
        );
        assert_eq!(
            args.len(),
            descriptor.param_count as usize,
            "call argument count does not match descriptor"
        );
        let args = EntityList::from_slice(args, &mut self.graph.node_lists);
        self.emit(NodeData::TailCall(Call {
            descriptor,
            target,
            args,
        }))
    }

    // Control transfers. Each records its edges before emitting the
    // terminator, in the same order the edges appear in the node.

    pub fn goto(&mut self, target: BasicBlock) {
        self.record_edge(target);
        self.emit(NodeData::Goto(target));
    }

    pub fn branch(&mut self, condition: Node, if_true: BasicBlock, if_false: BasicBlock) {
        self.record_edge(if_true);
        self.record_edge(if_false);
        self.emit(NodeData::Branch(Branch {
            condition,
            if_true,
            if_false,
        }));
    }

    pub fn switch(&mut self, index: Node, default: BasicBlock, cases: &[(i32, BasicBlock)]) {
        for &(_, target) in cases {
            self.record_edge(target);
        }
        self.record_edge(default);
        self.emit(NodeData::Switch(Switch {
            index,
            default,
            cases: cases.to_vec(),
        }));
    }

    pub fn return_(&mut self, value: Node) {
        self.emit(NodeData::Return(value));
    }
}

//! Graph storage: nodes, blocks, and the shared node-list pool.

use crate::node::{Node, NodeData};
use compact_str::CompactString;
use cranelift_entity::{ListPool, PrimaryMap};
use std::fmt;

crate::entity_ref! {
    /// ID of a basic block within the same graph.
    pub struct BasicBlock;
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Pointer width of the target machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PointerWidth {
    P32,
    P64,
}

impl PointerWidth {
    pub fn word_size(self) -> u64 {
        match self {
            PointerWidth::P32 => 4,
            PointerWidth::P64 => 8,
        }
    }

    pub fn word_size_log2(self) -> u32 {
        match self {
            PointerWidth::P32 => 2,
            PointerWidth::P64 => 3,
        }
    }

    pub fn is_64bit(self) -> bool {
        self == PointerWidth::P64
    }
}

#[derive(Clone, Debug, Default)]
pub struct BlockData {
    pub name: Option<CompactString>,
    /// Instruction stream, terminator last. Phi nodes, if any, come first.
    pub nodes: Vec<Node>,
    /// Predecessor blocks in the order their edges were emitted. Phi input
    /// order must match this order.
    pub preds: Vec<BasicBlock>,
    /// Placement hint: rarely-reached blocks sort to the end of the schedule.
    pub deferred: bool,
    /// Whether the builder has started (and possibly finished) emitting
    /// into this block.
    pub bound: bool,
}

/// A machine-level computation graph for a single code object.
#[derive(Clone, Debug)]
pub struct Graph {
    pub pointer_width: PointerWidth,
    pub nodes: PrimaryMap<Node, NodeData>,
    pub blocks: PrimaryMap<BasicBlock, BlockData>,
    /// Pool backing phi-input and call-argument lists.
    pub node_lists: ListPool<Node>,
}

impl Graph {
    pub fn new(pointer_width: PointerWidth) -> Self {
        Self {
            pointer_width,
            nodes: PrimaryMap::new(),
            blocks: PrimaryMap::new(),
            node_lists: ListPool::new(),
        }
    }

    pub fn data(&self, node: Node) -> &NodeData {
        &self.nodes[node]
    }

    /// The block execution starts in.
    pub fn entry_block(&self) -> BasicBlock {
        self.blocks
            .keys()
            .next()
            .expect("graph has no entry block")
    }

    /// Inputs of a phi node, in predecessor-edge order.
    pub fn phi_inputs(&self, phi: Node) -> &[Node] {
        match &self.nodes[phi] {
            NodeData::Phi(data) => data.inputs.as_slice(&self.node_lists),
            other => panic!("{phi} is not a phi: {other:?}"),
        }
    }

    /// Appends an input for a newly-recorded predecessor edge to an existing
    /// phi. The caller is responsible for having recorded the edge itself.
    pub fn append_phi_input(&mut self, phi: Node, input: Node) {
        match &mut self.nodes[phi] {
            NodeData::Phi(data) => {
                data.inputs.push(input, &mut self.node_lists);
            }
            other => panic!("{phi} is not a phi: {other:?}"),
        }
    }

    pub fn call_args(&self, call: Node) -> &[Node] {
        match &self.nodes[call] {
            NodeData::Call(data) | NodeData::TailCall(data) => {
                data.args.as_slice(&self.node_lists)
            }
            other => panic!("{call} is not a call: {other:?}"),
        }
    }
}

//! Reference evaluator for scheduled graphs.
//!
//! Executes a graph directly, block by block, against a sparse byte-addressed
//! memory. Calls are routed to a caller-installed handler so tests can model
//! runtime entry points. This is the executable definition of graph semantics
//! the test suites run assembled stubs through; it is not a code generator.

use crate::{
    graph::{BasicBlock, Graph, PointerWidth},
    node::{BinOp, Node, NodeData, UnOp},
};
use cranelift_entity::SecondaryMap;
use hashbrown::HashMap;

/// Sparse byte-addressed memory. Unwritten bytes read as zero.
#[derive(Default)]
pub struct Memory {
    bytes: HashMap<u64, u8>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Little-endian read of `size` bytes.
    pub fn read(&self, address: u64, size: u64) -> u64 {
        let mut value = 0u64;
        for i in (0..size).rev() {
            let byte = self.bytes.get(&(address + i)).copied().unwrap_or(0);
            value = (value << 8) | u64::from(byte);
        }
        value
    }

    /// Little-endian write of the low `size` bytes of `value`.
    pub fn write(&mut self, address: u64, size: u64, value: u64) {
        for i in 0..size {
            self.bytes.insert(address + i, (value >> (8 * i)) as u8);
        }
    }

    pub fn read_word(&self, width: PointerWidth, address: u64) -> u64 {
        self.read(address, width.word_size())
    }

    pub fn write_word(&mut self, width: PointerWidth, address: u64, value: u64) {
        self.write(address, width.word_size(), value);
    }
}

type CallHandler<'a> = Box<dyn FnMut(&mut Memory, u64, &[u64]) -> u64 + 'a>;

/// Executes a graph. Values are 64-bit words; floats travel as their bit
/// patterns; on 32-bit targets word operations act on the low 32 bits.
pub struct Evaluator<'g> {
    graph: &'g Graph,
    pub memory: Memory,
    call_handler: Option<CallHandler<'g>>,
}

const STEP_LIMIT: u64 = 1_000_000;

impl<'g> Evaluator<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            memory: Memory::new(),
            call_handler: None,
        }
    }

    /// Installs the handler invoked for call and tail-call nodes, receiving
    /// the memory, the target value, and the argument values.
    pub fn set_call_handler(
        &mut self,
        handler: impl FnMut(&mut Memory, u64, &[u64]) -> u64 + 'g,
    ) {
        self.call_handler = Some(Box::new(handler));
    }

    pub fn run(&mut self, params: &[u64]) -> u64 {
        let width = self.graph.pointer_width;
        let mut values: SecondaryMap<Node, u64> = SecondaryMap::new();
        let mut block = self.graph.entry_block();
        let mut edge = 0usize;
        let mut steps = 0u64;

        'blocks: loop {
            let block_data = &self.graph.blocks[block];

            // Phis evaluate in parallel on block entry, against the values
            // the incoming edge left behind.
            let mut body_start = 0;
            let mut phi_values = Vec::new();
            for &node in &block_data.nodes {
                if let NodeData::Phi(phi) = self.graph.data(node) {
                    let inputs = phi.inputs.as_slice(&self.graph.node_lists);
                    assert_eq!(
                        inputs.len(),
                        block_data.preds.len(),
                        "phi {node} of {block} has {} inputs for {} edges",
                        inputs.len(),
                        block_data.preds.len()
                    );
                    phi_values.push((node, values[inputs[edge]]));
                    body_start += 1;
                } else {
                    break;
                }
            }
            for (node, value) in phi_values {
                values[node] = value;
            }

            for &node in &block_data.nodes[body_start..] {
                steps += 1;
                assert!(steps < STEP_LIMIT, "evaluation step limit exceeded");

                match self.graph.data(node) {
                    NodeData::Int32Constant(v) => values[node] = *v as i64 as u64,
                    NodeData::Int64Constant(v) => values[node] = *v as u64,
                    NodeData::Float64Constant(v) => values[node] = v.to_bits(),
                    NodeData::BooleanConstant(v) => values[node] = u64::from(*v),
                    NodeData::HeapConstant(object) => values[node] = object.tagged_address(),
                    NodeData::ExternalConstant(r) => values[node] = r.address(),
                    NodeData::Parameter(i) => values[node] = params[*i as usize],
                    NodeData::Binary(bin) => {
                        values[node] = eval_binary(width, bin.op, values[bin.lhs], values[bin.rhs]);
                    }
                    NodeData::Unary(un) => {
                        values[node] = eval_unary(un.op, values[un.input]);
                    }
                    NodeData::Load(load) => {
                        let address =
                            mask(width, values[load.base].wrapping_add(values[load.offset]));
                        let size = load.ty.byte_size(width);
                        let raw = self.memory.read(address, size);
                        values[node] = if load.ty.is_signed() {
                            sign_extend(raw, size)
                        } else {
                            raw
                        };
                    }
                    NodeData::Store(store) => {
                        let address =
                            mask(width, values[store.base].wrapping_add(values[store.offset]));
                        let size = store.rep.byte_size(width);
                        self.memory.write(address, size, values[store.value]);
                    }
                    NodeData::Phi(_) => panic!("phi {node} not at the start of {block}"),
                    NodeData::Call(call) => {
                        let target = values[call.target];
                        let args: Vec<u64> = call
                            .args
                            .as_slice(&self.graph.node_lists)
                            .iter()
                            .map(|&arg| values[arg])
                            .collect();
                        let handler = self
                            .call_handler
                            .as_mut()
                            .expect("no call handler installed");
                        values[node] = handler(&mut self.memory, target, &args);
                    }
                    NodeData::TailCall(call) => {
                        let target = values[call.target];
                        let args: Vec<u64> = call
                            .args
                            .as_slice(&self.graph.node_lists)
                            .iter()
                            .map(|&arg| values[arg])
                            .collect();
                        let handler = self
                            .call_handler
                            .as_mut()
                            .expect("no call handler installed");
                        // Control does not return to the caller.
                        return handler(&mut self.memory, target, &args);
                    }
                    NodeData::Goto(target) => {
                        edge = edge_index(self.graph, *target, block, 0);
                        block = *target;
                        continue 'blocks;
                    }
                    NodeData::Branch(branch) => {
                        let taken = values[branch.condition] != 0;
                        let target = if taken { branch.if_true } else { branch.if_false };
                        // Both arms targeting the same block produce two
                        // edges; the false arm is the second one.
                        let occurrence =
                            usize::from(!taken && branch.if_true == branch.if_false);
                        edge = edge_index(self.graph, target, block, occurrence);
                        block = target;
                        continue 'blocks;
                    }
                    NodeData::Switch(switch) => {
                        // Edges were recorded case by case, default last; the
                        // occurrence is the count of earlier arms sharing the
                        // chosen target.
                        let selector = values[switch.index] as i64 as i32;
                        let (target, occurrence) =
                            match switch.cases.iter().position(|&(c, _)| c == selector) {
                                Some(pos) => {
                                    let target = switch.cases[pos].1;
                                    let occurrence = switch.cases[..pos]
                                        .iter()
                                        .filter(|&&(_, t)| t == target)
                                        .count();
                                    (target, occurrence)
                                }
                                None => {
                                    let target = switch.default;
                                    let occurrence = switch
                                        .cases
                                        .iter()
                                        .filter(|&&(_, t)| t == target)
                                        .count();
                                    (target, occurrence)
                                }
                            };
                        edge = edge_index(self.graph, target, block, occurrence);
                        block = target;
                        continue 'blocks;
                    }
                    NodeData::Return(value) => return values[*value],
                }
            }

            panic!("{block} has no terminator");
        }
    }
}

/// Index into `target.preds` of the `occurrence`-th edge from `from`. A block
/// has a single terminator, so all matching entries belong to it.
fn edge_index(graph: &Graph, target: BasicBlock, from: BasicBlock, occurrence: usize) -> usize {
    graph.blocks[target]
        .preds
        .iter()
        .enumerate()
        .filter(|&(_, &pred)| pred == from)
        .map(|(i, _)| i)
        .nth(occurrence)
        .unwrap_or_else(|| panic!("no edge from {from} to {target}"))
}

fn mask(width: PointerWidth, value: u64) -> u64 {
    match width {
        PointerWidth::P32 => value & 0xFFFF_FFFF,
        PointerWidth::P64 => value,
    }
}

fn signed(width: PointerWidth, value: u64) -> i64 {
    match width {
        PointerWidth::P32 => value as u32 as i32 as i64,
        PointerWidth::P64 => value as i64,
    }
}

fn sign_extend(raw: u64, size: u64) -> u64 {
    let shift = 64 - 8 * size;
    (((raw << shift) as i64) >> shift) as u64
}

fn eval_binary(width: PointerWidth, op: BinOp, lhs: u64, rhs: u64) -> u64 {
    let word_bits = width.word_size() as u32 * 8;
    let shift_amount = (rhs as u32) & (word_bits - 1);
    let bool_word = |b: bool| u64::from(b);
    let f = |bits: u64| f64::from_bits(bits);
    match op {
        BinOp::WordAnd => mask(width, lhs & rhs),
        BinOp::WordOr => mask(width, lhs | rhs),
        BinOp::WordXor => mask(width, lhs ^ rhs),
        BinOp::WordShl => mask(width, lhs << shift_amount),
        BinOp::WordShr => mask(width, lhs) >> shift_amount,
        BinOp::WordSar => mask(width, (signed(width, lhs) >> shift_amount) as u64),
        BinOp::WordEqual => bool_word(mask(width, lhs) == mask(width, rhs)),
        BinOp::IntPtrAdd => mask(width, lhs.wrapping_add(rhs)),
        BinOp::IntPtrSub => mask(width, lhs.wrapping_sub(rhs)),
        BinOp::IntPtrMul => mask(width, lhs.wrapping_mul(rhs)),
        BinOp::IntPtrLessThan => bool_word(signed(width, lhs) < signed(width, rhs)),
        BinOp::IntPtrLessThanOrEqual => bool_word(signed(width, lhs) <= signed(width, rhs)),
        BinOp::Word32And => u64::from(lhs as u32 & rhs as u32),
        BinOp::Word32Or => u64::from(lhs as u32 | rhs as u32),
        BinOp::Word32Shr => u64::from((lhs as u32) >> ((rhs as u32) & 31)),
        BinOp::Word32Equal => bool_word(lhs as u32 == rhs as u32),
        BinOp::Int32Add => u64::from((lhs as i32).wrapping_add(rhs as i32) as u32),
        BinOp::Int32Sub => u64::from((lhs as i32).wrapping_sub(rhs as i32) as u32),
        BinOp::Int32Mul => u64::from((lhs as i32).wrapping_mul(rhs as i32) as u32),
        BinOp::Int32LessThan => bool_word((lhs as i32) < (rhs as i32)),
        BinOp::Int32GreaterThanOrEqual => bool_word((lhs as i32) >= (rhs as i32)),
        BinOp::Float64Add => (f(lhs) + f(rhs)).to_bits(),
        BinOp::Float64Sub => (f(lhs) - f(rhs)).to_bits(),
        BinOp::Float64Equal => bool_word(f(lhs) == f(rhs)),
        BinOp::Float64LessThan => bool_word(f(lhs) < f(rhs)),
        BinOp::Float64LessThanOrEqual => bool_word(f(lhs) <= f(rhs)),
        BinOp::Float64GreaterThan => bool_word(f(lhs) > f(rhs)),
        BinOp::Float64GreaterThanOrEqual => bool_word(f(lhs) >= f(rhs)),
    }
}

fn eval_unary(op: UnOp, input: u64) -> u64 {
    match op {
        UnOp::TruncateInt64ToInt32 => u64::from(input as u32),
        UnOp::ChangeInt32ToFloat64 => f64::from(input as i32).to_bits(),
        UnOp::ChangeUint32ToFloat64 => f64::from(input as u32).to_bits(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::GraphBuilder,
        node::{CallDescriptor, MachineRep, MachineType, WriteBarrier},
    };

    fn test_descriptor(param_count: u32) -> CallDescriptor {
        CallDescriptor {
            param_count,
            stack_param_count: 0,
            result_count: 1,
            supports_tail_call: false,
        }
    }

    #[test]
    fn straight_line_arithmetic() {
        let mut b = GraphBuilder::new(PointerWidth::P64, test_descriptor(1));
        let n = b.parameter(0);
        let five = b.intptr_constant(5);
        let sum = b.binary(BinOp::IntPtrAdd, n, five);
        b.return_(sum);
        let graph = b.finish();

        assert_eq!(Evaluator::new(&graph).run(&[37]), 42);
    }

    #[test]
    fn loop_phi_counts_to_ten() {
        let mut b = GraphBuilder::new(PointerWidth::P64, test_descriptor(0));
        let header = b.create_block(false);
        let body = b.create_block(false);
        let done = b.create_block(false);

        let zero = b.intptr_constant(0);
        b.goto(header);

        b.bind(header);
        let i = b.phi(MachineRep::Word64, &[zero]);
        let ten = b.intptr_constant(10);
        let cond = b.binary(BinOp::IntPtrLessThan, i, ten);
        b.branch(cond, body, done);

        b.bind(body);
        let one = b.intptr_constant(1);
        let next = b.binary(BinOp::IntPtrAdd, i, one);
        b.goto(header);
        b.append_phi_input(i, next);

        b.bind(done);
        b.return_(i);
        let graph = b.finish();

        assert_eq!(Evaluator::new(&graph).run(&[]), 10);
    }

    #[test]
    fn memory_round_trip_sign_extends() {
        let mut b = GraphBuilder::new(PointerWidth::P64, test_descriptor(0));
        let base = b.intptr_constant(0x1000);
        let zero = b.intptr_constant(0);
        let value = b.int32_constant(-2);
        b.store(MachineRep::Word8, base, zero, value, WriteBarrier::None);
        let loaded = b.load(MachineType::Int8, base, zero);
        b.return_(loaded);
        let graph = b.finish();

        assert_eq!(Evaluator::new(&graph).run(&[]) as i64, -2);
    }

    #[test]
    fn word_ops_truncate_on_32bit_targets() {
        let mut b = GraphBuilder::new(PointerWidth::P32, test_descriptor(0));
        let big = b.intptr_constant(-1); // all ones in 32 bits
        let one = b.intptr_constant(1);
        let sum = b.binary(BinOp::IntPtrAdd, big, one); // wraps to zero
        b.return_(sum);
        let graph = b.finish();

        assert_eq!(Evaluator::new(&graph).run(&[]), 0);
    }
}

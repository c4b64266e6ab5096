//! Stub assembler for the opal runtime.
//!
//! Stubs are code fragments compiled ahead of time for common runtime
//! operations. This crate lets a stub author emit machine-level operations
//! (tagged-integer arithmetic, heap loads/stores, allocation, calls) while
//! the assembler keeps the underlying graph in valid SSA form: mutable
//! [`Variable`]s track "the current value" of a logical slot, and [`Label`]s
//! synthesize phi nodes wherever paths carrying different values converge.
//!
//! A session is one [`StubAssembler`]: create variables and labels, emit
//! operations, and call [`StubAssembler::finish`] once to obtain the
//! [`CompiledStub`] handed to the downstream code generator. All misuse
//! (reading unbound variables, inconsistent merges, double binds) aborts
//! assembly immediately; see [`error::StubError`].

pub mod alloc;
pub mod call;
pub mod compiled;
pub mod env;
pub mod error;
pub mod label;
pub mod tagged;
pub mod variable;

pub use crate::{
    alloc::AllocationFlags,
    call::{Callable, RuntimeFn},
    compiled::{CodeKind, CompiledStub},
    env::{Root, RootValue, RuntimeEnv, Target},
    error::StubError,
    label::Label,
    variable::Variable,
};
pub use opal_graph::{Graph, HeapRef, MachineRep, MachineType, Node, PointerWidth};

use crate::{label::LabelData, variable::VariableData};
use compact_str::CompactString;
use cranelift_entity::PrimaryMap;
use opal_graph::{
    schedule, BinOp, CallDescriptor, ExternalRef, GraphBuilder, UnOp, WriteBarrier,
};

/// One stub-assembly session.
///
/// Owns the graph builder, the session-wide variable registry, and all
/// labels. Everything is released together when the session is dropped or
/// consumed by [`finish`](Self::finish); variables and labels are never
/// freed individually.
pub struct StubAssembler<'env> {
    pub(crate) raw: GraphBuilder,
    pub(crate) env: &'env RuntimeEnv,
    name: CompactString,
    kind: CodeKind,
    pub(crate) variables: PrimaryMap<Variable, VariableData>,
    pub(crate) labels: PrimaryMap<Label, LabelData>,
}

macro_rules! binop_methods {
    ($($method:ident => $op:ident;)*) => {
        $(
            pub fn $method(&mut self, lhs: Node, rhs: Node) -> Node {
                self.raw.binary(BinOp::$op, lhs, rhs)
            }
        )*
    };
}

macro_rules! unop_methods {
    ($($method:ident => $op:ident;)*) => {
        $(
            pub fn $method(&mut self, input: Node) -> Node {
                self.raw.unary(UnOp::$op, input)
            }
        )*
    };
}

impl<'env> StubAssembler<'env> {
    /// Starts a session for a stub taking `param_count` parameters under
    /// the default stub calling convention.
    pub fn new(
        env: &'env RuntimeEnv,
        name: impl Into<CompactString>,
        kind: CodeKind,
        param_count: u32,
    ) -> Self {
        let descriptor = CallDescriptor {
            param_count,
            stack_param_count: 0,
            result_count: 1,
            supports_tail_call: false,
        };
        Self {
            raw: GraphBuilder::new(env.target.pointer_width, descriptor),
            env,
            name: name.into(),
            kind,
            variables: PrimaryMap::new(),
            labels: PrimaryMap::new(),
        }
    }

    pub fn env(&self) -> &'env RuntimeEnv {
        self.env
    }

    pub fn graph(&self) -> &Graph {
        self.raw.graph()
    }

    /// Machine representation of an untagged pointer-width word.
    pub fn pointer_rep(&self) -> MachineRep {
        self.env.target.word_rep()
    }

    /// Finalizes the session: exports the graph and its block schedule for
    /// the downstream code generator. Consuming `self` makes a second
    /// finalization unrepresentable.
    pub fn finish(self) -> CompiledStub {
        let graph = self.raw.finish();
        let schedule = schedule::schedule(&graph);
        tracing::debug!(
            name = %self.name,
            blocks = schedule.order.len(),
            nodes = graph.nodes.len(),
            "assembled stub"
        );
        CompiledStub::new(self.name, self.kind, graph, schedule)
    }

    // Constants and parameters.

    pub fn int32_constant(&mut self, value: i32) -> Node {
        self.raw.int32_constant(value)
    }

    pub fn int64_constant(&mut self, value: i64) -> Node {
        self.raw.int64_constant(value)
    }

    pub fn intptr_constant(&mut self, value: i64) -> Node {
        self.raw.intptr_constant(value)
    }

    pub fn float64_constant(&mut self, value: f64) -> Node {
        self.raw.float64_constant(value)
    }

    pub fn boolean_constant(&mut self, value: bool) -> Node {
        self.raw.boolean_constant(value)
    }

    pub fn heap_constant(&mut self, object: HeapRef) -> Node {
        self.raw.heap_constant(object)
    }

    pub fn external_constant(&mut self, reference: ExternalRef) -> Node {
        self.raw.external_constant(reference)
    }

    pub fn parameter(&mut self, index: u32) -> Node {
        self.raw.parameter(index)
    }

    pub fn return_(&mut self, value: Node) {
        self.raw.return_(value);
    }

    // Arithmetic, logic, and comparisons.

    binop_methods! {
        word_and => WordAnd;
        word_or => WordOr;
        word_xor => WordXor;
        word_shl => WordShl;
        word_shr => WordShr;
        word_sar => WordSar;
        word_equal => WordEqual;
        intptr_add => IntPtrAdd;
        intptr_sub => IntPtrSub;
        intptr_mul => IntPtrMul;
        intptr_less_than => IntPtrLessThan;
        intptr_less_than_or_equal => IntPtrLessThanOrEqual;
        word32_and => Word32And;
        word32_or => Word32Or;
        word32_shr => Word32Shr;
        word32_equal => Word32Equal;
        int32_add => Int32Add;
        int32_sub => Int32Sub;
        int32_mul => Int32Mul;
        int32_less_than => Int32LessThan;
        int32_greater_than_or_equal => Int32GreaterThanOrEqual;
        float64_add => Float64Add;
        float64_sub => Float64Sub;
        float64_equal => Float64Equal;
        float64_less_than => Float64LessThan;
        float64_less_than_or_equal => Float64LessThanOrEqual;
        float64_greater_than => Float64GreaterThan;
        float64_greater_than_or_equal => Float64GreaterThanOrEqual;
    }

    unop_methods! {
        truncate_int64_to_int32 => TruncateInt64ToInt32;
        change_int32_to_float64 => ChangeInt32ToFloat64;
        change_uint32_to_float64 => ChangeUint32ToFloat64;
    }

    /// Left shift by a constant number of bits.
    pub fn word_shl_by(&mut self, value: Node, shift: u32) -> Node {
        let shift = self.intptr_constant(shift as i64);
        self.word_shl(value, shift)
    }

    // Memory.

    pub fn load(&mut self, ty: MachineType, base: Node) -> Node {
        let zero = self.intptr_constant(0);
        self.raw.load(ty, base, zero)
    }

    pub fn load_at(&mut self, ty: MachineType, base: Node, offset: Node) -> Node {
        self.raw.load(ty, base, offset)
    }

    pub fn store(&mut self, rep: MachineRep, base: Node, value: Node) -> Node {
        let zero = self.intptr_constant(0);
        self.raw.store(rep, base, zero, value, WriteBarrier::Full)
    }

    pub fn store_at(&mut self, rep: MachineRep, base: Node, offset: Node, value: Node) -> Node {
        self.raw.store(rep, base, offset, value, WriteBarrier::Full)
    }

    /// Store without garbage-collector bookkeeping; only valid when the
    /// target object cannot yet be reached from elsewhere.
    pub fn store_no_barrier(&mut self, rep: MachineRep, base: Node, value: Node) -> Node {
        let zero = self.intptr_constant(0);
        self.raw.store(rep, base, zero, value, WriteBarrier::None)
    }

    pub fn store_at_no_barrier(
        &mut self,
        rep: MachineRep,
        base: Node,
        offset: Node,
        value: Node,
    ) -> Node {
        self.raw.store(rep, base, offset, value, WriteBarrier::None)
    }
}

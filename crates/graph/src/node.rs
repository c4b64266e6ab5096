//! Node encoding for the machine graph.

use crate::graph::{BasicBlock, PointerWidth};
use cranelift_entity::EntityList;
use std::fmt;

crate::entity_ref! {
    /// ID of a node within its owning [`Graph`](crate::Graph).
    ///
    /// Nodes are immutable once created (phi input extension excepted) and
    /// compare by identity.
    pub struct Node;
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Reference to a heap object owned by the embedding runtime.
///
/// The graph stores only the tagged address; the object itself is never
/// inspected. Equality is identity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct HeapRef(u64);

impl HeapRef {
    pub fn new(tagged_address: u64) -> Self {
        Self(tagged_address)
    }

    pub fn tagged_address(self) -> u64 {
        self.0
    }
}

/// Address of runtime-owned storage outside the managed heap
/// (allocation top/limit words, runtime entry points, root tables).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ExternalRef(u64);

impl ExternalRef {
    pub fn new(address: u64) -> Self {
        Self(address)
    }

    pub fn address(self) -> u64 {
        self.0
    }
}

/// Machine representation of a stored or merged value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MachineRep {
    Word8,
    Word16,
    Word32,
    Word64,
    Float64,
    /// Pointer-width word carrying a tagged runtime value.
    Tagged,
}

impl MachineRep {
    pub fn byte_size(self, width: PointerWidth) -> u64 {
        match self {
            MachineRep::Word8 => 1,
            MachineRep::Word16 => 2,
            MachineRep::Word32 => 4,
            MachineRep::Word64 => 8,
            MachineRep::Float64 => 8,
            MachineRep::Tagged => width.word_size(),
        }
    }
}

/// Machine type of a load: representation plus signedness.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MachineType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float64,
    /// Untagged pointer-width word.
    Pointer,
    /// Tagged pointer-width word.
    Tagged,
}

impl MachineType {
    pub fn rep(self, width: PointerWidth) -> MachineRep {
        match self {
            MachineType::Int8 | MachineType::Uint8 => MachineRep::Word8,
            MachineType::Int16 | MachineType::Uint16 => MachineRep::Word16,
            MachineType::Int32 | MachineType::Uint32 => MachineRep::Word32,
            MachineType::Int64 | MachineType::Uint64 => MachineRep::Word64,
            MachineType::Float64 => MachineRep::Float64,
            MachineType::Pointer => match width {
                PointerWidth::P32 => MachineRep::Word32,
                PointerWidth::P64 => MachineRep::Word64,
            },
            MachineType::Tagged => MachineRep::Tagged,
        }
    }

    pub fn byte_size(self, width: PointerWidth) -> u64 {
        self.rep(width).byte_size(width)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            MachineType::Int8 | MachineType::Int16 | MachineType::Int32 | MachineType::Int64
        )
    }
}

/// Whether a store must notify the garbage collector.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum WriteBarrier {
    Full,
    /// Elided: the target is known not yet reachable from elsewhere.
    None,
}

/// Calling convention of a call or tail-call node.
///
/// `param_count` is the total argument count the target expects, including
/// any trailing context argument the caller appends.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallDescriptor {
    pub param_count: u32,
    pub stack_param_count: u32,
    pub result_count: u32,
    pub supports_tail_call: bool,
}

/// Binary operators. `Word` ops act on pointer-width words; `IntPtr` ops are
/// their arithmetic/comparison counterparts. `Word32`/`Int32` ops act on the
/// low 32 bits regardless of pointer width.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    WordAnd,
    WordOr,
    WordXor,
    WordShl,
    WordShr,
    WordSar,
    WordEqual,
    IntPtrAdd,
    IntPtrSub,
    IntPtrMul,
    IntPtrLessThan,
    IntPtrLessThanOrEqual,
    Word32And,
    Word32Or,
    Word32Shr,
    Word32Equal,
    Int32Add,
    Int32Sub,
    Int32Mul,
    Int32LessThan,
    Int32GreaterThanOrEqual,
    Float64Add,
    Float64Sub,
    Float64Equal,
    Float64LessThan,
    Float64LessThanOrEqual,
    Float64GreaterThan,
    Float64GreaterThanOrEqual,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnOp {
    TruncateInt64ToInt32,
    ChangeInt32ToFloat64,
    ChangeUint32ToFloat64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Binary {
    pub op: BinOp,
    pub lhs: Node,
    pub rhs: Node,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Unary {
    pub op: UnOp,
    pub input: Node,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Load {
    pub ty: MachineType,
    pub base: Node,
    pub offset: Node,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Store {
    pub rep: MachineRep,
    pub base: Node,
    pub offset: Node,
    pub value: Node,
    pub barrier: WriteBarrier,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Phi {
    pub rep: MachineRep,
    /// One input per predecessor edge of the owning block, in edge order.
    pub inputs: EntityList<Node>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Call {
    pub descriptor: CallDescriptor,
    pub target: Node,
    pub args: EntityList<Node>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Branch {
    pub condition: Node,
    pub if_true: BasicBlock,
    pub if_false: BasicBlock,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Switch {
    pub index: Node,
    pub default: BasicBlock,
    pub cases: Vec<(i32, BasicBlock)>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeData {
    Int32Constant(i32),
    Int64Constant(i64),
    Float64Constant(f64),
    BooleanConstant(bool),
    HeapConstant(HeapRef),
    ExternalConstant(ExternalRef),
    Parameter(u32),

    Binary(Binary),
    Unary(Unary),
    Load(Load),
    Store(Store),
    Phi(Phi),
    Call(Call),

    TailCall(Call),
    Goto(BasicBlock),
    Branch(Branch),
    Switch(Switch),
    Return(Node),
}

impl NodeData {
    /// Terminators end their block; the builder refuses to append past one.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            NodeData::Goto(_)
                | NodeData::Branch(_)
                | NodeData::Switch(_)
                | NodeData::Return(_)
                | NodeData::TailCall(_)
        )
    }

    pub fn visit_successors(&self, mut visit: impl FnMut(BasicBlock)) {
        match self {
            NodeData::Goto(target) => visit(*target),
            NodeData::Branch(branch) => {
                visit(branch.if_true);
                visit(branch.if_false);
            }
            NodeData::Switch(switch) => {
                for &(_, target) in &switch.cases {
                    visit(target);
                }
                visit(switch.default);
            }
            _ => {}
        }
    }
}

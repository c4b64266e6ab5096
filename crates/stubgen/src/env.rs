//! Description of the runtime the assembled stubs execute inside: target
//! word width, tagging scheme, object layout constants, well-known roots,
//! and the external addresses the allocator and runtime entries live at.

use crate::call::RuntimeFn;
use opal_graph::{ExternalRef, HeapRef, MachineRep, PointerWidth};

/// Offset baked into every tagged heap pointer. Odd, so tagged pointers are
/// never valid machine addresses; subtracted when computing field offsets.
pub const HEAP_OBJECT_TAG: i64 = 1;

/// Number of low tag bits distinguishing smis from heap pointers.
pub const SMI_TAG_SIZE: u32 = 1;

pub const SMI_TAG_MASK: i64 = (1 << SMI_TAG_SIZE) - 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Target {
    pub pointer_width: PointerWidth,
}

impl Target {
    pub fn word_size(self) -> i64 {
        self.pointer_width.word_size() as i64
    }

    pub fn word_size_log2(self) -> u32 {
        self.pointer_width.word_size_log2()
    }

    pub fn word_rep(self) -> MachineRep {
        match self.pointer_width {
            PointerWidth::P32 => MachineRep::Word32,
            PointerWidth::P64 => MachineRep::Word64,
        }
    }

    /// Extra shift applied on top of the tag bits: on 64-bit targets the smi
    /// payload lives in the upper half of the word.
    pub fn smi_shift_size(self) -> u32 {
        match self.pointer_width {
            PointerWidth::P32 => 0,
            PointerWidth::P64 => 31,
        }
    }

    /// Total left shift that turns a native integer into a smi.
    pub fn smi_shift_bits(self) -> u32 {
        self.smi_shift_size() + SMI_TAG_SIZE
    }

    pub fn max_smi_value(self) -> i64 {
        match self.pointer_width {
            PointerWidth::P32 => (1 << 30) - 1,
            PointerWidth::P64 => (1 << 31) - 1,
        }
    }

    pub fn min_smi_value(self) -> i64 {
        -self.max_smi_value() - 1
    }

    /// Whether the allocation backing store only guarantees word alignment,
    /// so double-aligned allocations need a filler-word fixup.
    pub fn requires_double_alignment_fixup(self) -> bool {
        self.pointer_width == PointerWidth::P32
    }

    pub fn double_alignment_mask(self) -> i64 {
        // kDoubleSize - 1
        7
    }
}

/// Well-known values reachable from the runtime's root table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Root {
    Null,
    Undefined,
    True,
    False,
    EmptyString,
    BooleanShape,
    Float64BoxShape,
    /// Shape of the one-word filler written into alignment gaps.
    OnePointerFillerShape,
    HashSeed,
    /// Interning table; grows at run time, so never embeddable as a constant.
    StringTable,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RootValue {
    /// Untagged integer payload of a smi root.
    Smi(i64),
    Heap(HeapRef),
}

#[derive(Copy, Clone, Debug)]
pub struct RootsTable {
    pub null: HeapRef,
    pub undefined: HeapRef,
    pub true_value: HeapRef,
    pub false_value: HeapRef,
    pub empty_string: HeapRef,
    pub boolean_shape: HeapRef,
    pub float64_box_shape: HeapRef,
    pub one_pointer_filler_shape: HeapRef,
    pub hash_seed: i64,
    pub string_table: HeapRef,
}

/// Object layout constants, relative to the untagged object origin.
#[derive(Copy, Clone, Debug)]
pub struct ObjectLayout {
    /// Every heap object starts with a tagged pointer to its shape.
    pub shape_offset: i64,
    /// Array payload starts after the shape word and the length word.
    pub array_header_size: i64,
    pub shape_instance_kind_offset: i64,
    pub shape_bit_field_offset: i64,
    pub float64_box_value_offset: i64,
}

impl ObjectLayout {
    pub fn for_target(target: Target) -> Self {
        let word = target.word_size();
        Self {
            shape_offset: 0,
            array_header_size: 2 * word,
            shape_instance_kind_offset: word,
            shape_bit_field_offset: word + 1,
            float64_box_value_offset: word,
        }
    }
}

/// Addresses of the bump-allocation top/limit words, per space class.
#[derive(Copy, Clone, Debug)]
pub struct AllocationRefs {
    pub young_top: ExternalRef,
    pub young_limit: ExternalRef,
    pub old_top: ExternalRef,
    pub old_limit: ExternalRef,
}

pub struct RuntimeEnv {
    pub target: Target,
    pub layout: ObjectLayout,
    pub roots: RootsTable,
    pub allocation: AllocationRefs,
    /// Base of the table of runtime entry thunks, one word apart.
    pub runtime_entry_base: u64,
}

impl RuntimeEnv {
    pub fn new(
        target: Target,
        roots: RootsTable,
        allocation: AllocationRefs,
        runtime_entry_base: u64,
    ) -> Self {
        Self {
            target,
            layout: ObjectLayout::for_target(target),
            roots,
            allocation,
            runtime_entry_base,
        }
    }

    pub fn root_value(&self, root: Root) -> RootValue {
        match root {
            Root::Null => RootValue::Heap(self.roots.null),
            Root::Undefined => RootValue::Heap(self.roots.undefined),
            Root::True => RootValue::Heap(self.roots.true_value),
            Root::False => RootValue::Heap(self.roots.false_value),
            Root::EmptyString => RootValue::Heap(self.roots.empty_string),
            Root::BooleanShape => RootValue::Heap(self.roots.boolean_shape),
            Root::Float64BoxShape => RootValue::Heap(self.roots.float64_box_shape),
            Root::OnePointerFillerShape => RootValue::Heap(self.roots.one_pointer_filler_shape),
            Root::HashSeed => RootValue::Smi(self.roots.hash_seed),
            Root::StringTable => RootValue::Heap(self.roots.string_table),
        }
    }

    /// Roots that never move or change for the lifetime of the runtime can
    /// be embedded directly in generated code.
    pub fn root_is_constant(&self, root: Root) -> bool {
        !matches!(root, Root::StringTable)
    }

    pub fn runtime_entry(&self, function: RuntimeFn) -> ExternalRef {
        let word = self.target.word_size() as u64;
        ExternalRef::new(self.runtime_entry_base + function.table_index() * word)
    }

    /// Canned environment with fixed addresses, for tests.
    pub fn new_test(pointer_width: PointerWidth) -> Self {
        let target = Target { pointer_width };
        let heap = |address: u64| HeapRef::new(address | HEAP_OBJECT_TAG as u64);
        Self::new(
            target,
            RootsTable {
                null: heap(0x7000),
                undefined: heap(0x7010),
                true_value: heap(0x7020),
                false_value: heap(0x7030),
                empty_string: heap(0x7040),
                boolean_shape: heap(0x7050),
                float64_box_shape: heap(0x7060),
                one_pointer_filler_shape: heap(0x7070),
                hash_seed: 0x5eed,
                string_table: heap(0x7080),
            },
            AllocationRefs {
                young_top: ExternalRef::new(0x100),
                young_limit: ExternalRef::new(0x108),
                old_top: ExternalRef::new(0x110),
                old_limit: ExternalRef::new(0x118),
            },
            0x9000,
        )
    }
}

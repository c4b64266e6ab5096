//! Tagged-value primitives.
//!
//! A machine word holds either a small integer ("smi", low tag bit clear,
//! payload in the upper bits) or a heap pointer (low bit set via the
//! heap-object tag). Field and element offsets are specified relative to the
//! untagged object origin, so the tag is folded into every offset constant.

use crate::{
    env::{Root, RootValue, HEAP_OBJECT_TAG, SMI_TAG_MASK},
    error::{fail, StubError},
    label::Label,
    StubAssembler,
};
use opal_graph::{MachineRep, MachineType, Node};

impl<'env> StubAssembler<'env> {
    fn smi_shift_bits_constant(&mut self) -> Node {
        let bits = self.env.target.smi_shift_bits();
        self.intptr_constant(bits as i64)
    }

    /// A smi with the given integer payload, folded at build time.
    pub fn smi_constant(&mut self, value: i64) -> Node {
        let bits = self.env.target.smi_shift_bits();
        self.intptr_constant(value << bits)
    }

    /// Encodes a native integer as a smi.
    pub fn smi_tag(&mut self, value: Node) -> Node {
        let shift = self.smi_shift_bits_constant();
        self.word_shl(value, shift)
    }

    /// Decodes a smi back to a native integer; the arithmetic right shift
    /// preserves the sign.
    pub fn smi_untag(&mut self, value: Node) -> Node {
        let shift = self.smi_shift_bits_constant();
        self.word_sar(value, shift)
    }

    pub fn smi_to_word32(&mut self, value: Node) -> Node {
        let untagged = self.smi_untag(value);
        if self.env.target.pointer_width.is_64bit() {
            self.truncate_int64_to_int32(untagged)
        } else {
            untagged
        }
    }

    pub fn smi_to_float64(&mut self, value: Node) -> Node {
        let word = self.smi_to_word32(value);
        self.change_int32_to_float64(word)
    }

    // Smi arithmetic works directly on the tagged words.

    pub fn smi_add(&mut self, a: Node, b: Node) -> Node {
        self.intptr_add(a, b)
    }

    pub fn smi_equal(&mut self, a: Node, b: Node) -> Node {
        self.word_equal(a, b)
    }

    pub fn smi_less_than(&mut self, a: Node, b: Node) -> Node {
        self.intptr_less_than(a, b)
    }

    pub fn smi_less_than_or_equal(&mut self, a: Node, b: Node) -> Node {
        self.intptr_less_than_or_equal(a, b)
    }

    /// The smaller of two smis, via a two-arm merge.
    pub fn smi_min(&mut self, a: Node, b: Node) -> Node {
        let min = self.variable(MachineRep::Tagged);
        let if_a = self.label();
        let if_b = self.label();
        let join = self.label();
        self.branch_if_smi_less_than(a, b, if_a, if_b);
        self.bind(if_a);
        self.bind_var(min, a);
        self.goto(join);
        self.bind(if_b);
        self.bind_var(min, b);
        self.goto(join);
        self.bind(join);
        self.var_value(min)
    }

    /// Tests the low tag bit: true for smis, false for heap pointers.
    pub fn word_is_smi(&mut self, value: Node) -> Node {
        let mask = self.intptr_constant(SMI_TAG_MASK);
        let tag = self.word_and(value, mask);
        let zero = self.intptr_constant(0);
        self.word_equal(tag, zero)
    }

    // Object access.

    /// Loads a field at a constant offset from a tagged object.
    pub fn load_object_field(&mut self, object: Node, offset: i64, ty: MachineType) -> Node {
        let offset = self.intptr_constant(offset - HEAP_OBJECT_TAG);
        self.load_at(ty, object, offset)
    }

    /// Loads from an untagged buffer at a constant offset.
    pub fn load_buffer(&mut self, buffer: Node, offset: i64, ty: MachineType) -> Node {
        let offset = self.intptr_constant(offset);
        self.load_at(ty, buffer, offset)
    }

    pub fn load_shape(&mut self, object: Node) -> Node {
        let shape_offset = self.env.layout.shape_offset;
        self.load_object_field(object, shape_offset, MachineType::Tagged)
    }

    pub fn load_shape_instance_kind(&mut self, shape: Node) -> Node {
        let offset = self.env.layout.shape_instance_kind_offset;
        self.load_object_field(shape, offset, MachineType::Uint8)
    }

    pub fn load_shape_bit_field(&mut self, shape: Node) -> Node {
        let offset = self.env.layout.shape_bit_field_offset;
        self.load_object_field(shape, offset, MachineType::Uint8)
    }

    pub fn load_instance_kind(&mut self, object: Node) -> Node {
        let shape = self.load_shape(object);
        self.load_shape_instance_kind(shape)
    }

    pub fn load_float64_box_value(&mut self, object: Node) -> Node {
        let offset = self.env.layout.float64_box_value_offset;
        self.load_object_field(object, offset, MachineType::Float64)
    }

    /// Loads an array element at a compile-time-constant index; the offset
    /// arithmetic is folded here.
    pub fn load_array_element(&mut self, array: Node, index: i64) -> Node {
        let byte_offset = self.env.layout.array_header_size
            + index * self.env.target.word_size()
            - HEAP_OBJECT_TAG;
        let offset = self.intptr_constant(byte_offset);
        self.load_at(MachineType::Tagged, array, offset)
    }

    /// Loads an array element at a smi index computed at run time. The smi
    /// is scaled to a byte offset in one shift, whose direction depends on
    /// whether the smi shift exceeds the word-size shift.
    pub fn load_array_element_smi_index(&mut self, array: Node, smi_index: Node) -> Node {
        let smi_shift_bits = self.env.target.smi_shift_bits();
        let word_size_log2 = self.env.target.word_size_log2();
        let header = self.env.layout.array_header_size - HEAP_OBJECT_TAG;
        let scaled = if smi_shift_bits > word_size_log2 {
            let shift = self.intptr_constant((smi_shift_bits - word_size_log2) as i64);
            self.word_sar(smi_index, shift)
        } else {
            let shift = self.intptr_constant((word_size_log2 - smi_shift_bits) as i64);
            self.word_shl(smi_index, shift)
        };
        let header = self.intptr_constant(header);
        let offset = self.intptr_add(scaled, header);
        self.load_at(MachineType::Tagged, array, offset)
    }

    /// Stores an array element at an untagged word index, without a write
    /// barrier; only valid for freshly allocated arrays.
    pub fn store_array_element_no_barrier(
        &mut self,
        array: Node,
        index: Node,
        value: Node,
    ) -> Node {
        let word_size_log2 = self.env.target.word_size_log2();
        let scaled = self.word_shl_by(index, word_size_log2);
        let header = self.env.layout.array_header_size - HEAP_OBJECT_TAG;
        let header = self.intptr_constant(header);
        let offset = self.intptr_add(scaled, header);
        self.store_at_no_barrier(MachineRep::Tagged, array, offset, value)
    }

    // Root materialization.

    /// Materializes a well-known root value. Roots that are immutable for
    /// the lifetime of the runtime are embedded as constants.
    pub fn load_root(&mut self, root: Root) -> Node {
        if self.env.root_is_constant(root) {
            return match self.env.root_value(root) {
                RootValue::Smi(value) => self.smi_constant(value),
                RootValue::Heap(object) => self.heap_constant(object),
            };
        }
        // A movable root must be re-read from its slot in the root table on
        // every use.
        fail(StubError::NotImplemented(
            "indirect loads from the root table",
        ))
    }

    pub fn null_constant(&mut self) -> Node {
        self.load_root(Root::Null)
    }

    pub fn undefined_constant(&mut self) -> Node {
        self.load_root(Root::Undefined)
    }

    pub fn boolean_shape_constant(&mut self) -> Node {
        self.load_root(Root::BooleanShape)
    }

    pub fn float64_box_shape_constant(&mut self) -> Node {
        self.load_root(Root::Float64BoxShape)
    }

    /// Extracts `(word32 & mask) >> shift`.
    pub fn bit_field_decode(&mut self, word32: Node, shift: u32, mask: u32) -> Node {
        let mask = self.int32_constant(mask as i32);
        let masked = self.word32_and(word32, mask);
        let shift = self.int32_constant(shift as i32);
        self.word32_shr(masked, shift)
    }

    // Compare-and-branch helpers.

    pub fn branch_if_smi_less_than(&mut self, a: Node, b: Node, if_true: Label, if_false: Label) {
        let condition = self.smi_less_than(a, b);
        self.branch(condition, if_true, if_false);
    }

    pub fn branch_if_smi_less_than_or_equal(
        &mut self,
        a: Node,
        b: Node,
        if_true: Label,
        if_false: Label,
    ) {
        let condition = self.smi_less_than_or_equal(a, b);
        self.branch(condition, if_true, if_false);
    }

    pub fn branch_if_int32_less_than(&mut self, a: Node, b: Node, if_true: Label, if_false: Label) {
        let condition = self.int32_less_than(a, b);
        self.branch(condition, if_true, if_false);
    }

    pub fn branch_if_word32_equal(&mut self, a: Node, b: Node, if_true: Label, if_false: Label) {
        let condition = self.word32_equal(a, b);
        self.branch(condition, if_true, if_false);
    }

    pub fn branch_if_float64_equal(&mut self, a: Node, b: Node, if_true: Label, if_false: Label) {
        let condition = self.float64_equal(a, b);
        self.branch(condition, if_true, if_false);
    }

    pub fn branch_if_float64_less_than(
        &mut self,
        a: Node,
        b: Node,
        if_true: Label,
        if_false: Label,
    ) {
        let condition = self.float64_less_than(a, b);
        self.branch(condition, if_true, if_false);
    }

    pub fn branch_if_float64_less_than_or_equal(
        &mut self,
        a: Node,
        b: Node,
        if_true: Label,
        if_false: Label,
    ) {
        let condition = self.float64_less_than_or_equal(a, b);
        self.branch(condition, if_true, if_false);
    }

    pub fn branch_if_float64_greater_than(
        &mut self,
        a: Node,
        b: Node,
        if_true: Label,
        if_false: Label,
    ) {
        let condition = self.float64_greater_than(a, b);
        self.branch(condition, if_true, if_false);
    }

    pub fn branch_if_float64_greater_than_or_equal(
        &mut self,
        a: Node,
        b: Node,
        if_true: Label,
        if_false: Label,
    ) {
        let condition = self.float64_greater_than_or_equal(a, b);
        self.branch(condition, if_true, if_false);
    }
}

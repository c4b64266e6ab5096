//! Two-phase bump allocation.
//!
//! The fast path bumps the space's top pointer in place; when the gap to the
//! limit is too small, a deferred path calls into the runtime allocator.
//! Both paths produce a tagged address and converge through the label
//! protocol. On targets whose backing store only guarantees word alignment,
//! double-aligned requests widen the size by one word and patch a filler
//! object into the gap afterwards.

use crate::{
    call::RuntimeFn,
    env::{Root, HEAP_OBJECT_TAG},
    StubAssembler,
};
use opal_graph::{MachineType, Node};

bitflags::bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct AllocationFlags: u32 {
        /// Align the object start to a double-word boundary.
        const DOUBLE_ALIGNMENT = 1 << 0;
        /// Allocate into the long-lived space instead of the nursery.
        const PRETENURED = 1 << 1;
    }
}

/// Target space, as encoded in the runtime allocator's flags word.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum AllocationSpace {
    Young = 0,
    Old = 1,
}

/// Flags word layout: bit 0 = double alignment, bits 1.. = target space.
fn encode_runtime_flags(space: AllocationSpace, double_align: bool) -> i32 {
    ((space as i32) << 1) | i32::from(double_align)
}

impl<'env> StubAssembler<'env> {
    /// Bump-allocates `size_in_bytes` against the given top/limit pair
    /// without any alignment fixup. Returns the tagged address.
    pub fn allocate_raw_unaligned(
        &mut self,
        size_in_bytes: Node,
        flags: AllocationFlags,
        top_address: Node,
        limit_address: Node,
    ) -> Node {
        let word_rep = self.pointer_rep();
        let top = self.load(MachineType::Pointer, top_address);
        let limit = self.load(MachineType::Pointer, limit_address);

        let result = self.variable(word_rep);
        let runtime_call = self.deferred_label();
        let no_runtime_call = self.label();
        let merge_runtime = self.label_merging(&[result]);

        // If there's not enough space, call the runtime.
        let available = self.intptr_sub(limit, top);
        let not_enough = self.intptr_less_than(available, size_in_bytes);
        self.branch(not_enough, runtime_call, no_runtime_call);

        self.bind(runtime_call);
        // The runtime allocator ignores the context.
        let context = self.intptr_constant(0);
        let space = if flags.contains(AllocationFlags::PRETENURED) {
            AllocationSpace::Old
        } else {
            AllocationSpace::Young
        };
        let flags_word = self.int32_constant(encode_runtime_flags(space, false));
        let runtime_flags = self.smi_tag(flags_word);
        let size_smi = self.smi_tag(size_in_bytes);
        let runtime_result = self.call_runtime2(
            RuntimeFn::AllocateInTargetSpace,
            context,
            size_smi,
            runtime_flags,
        );
        self.bind_var(result, runtime_result);
        self.goto(merge_runtime);

        // When there is enough space, return `top` and bump it up.
        self.bind(no_runtime_call);
        let new_top = self.intptr_add(top, size_in_bytes);
        self.store_no_barrier(word_rep, top_address, new_top);
        let tag = self.intptr_constant(HEAP_OBJECT_TAG);
        let fast_result = self.intptr_add(top, tag);
        self.bind_var(result, fast_result);
        self.goto(merge_runtime);

        self.bind(merge_runtime);
        self.var_value(result)
    }

    /// Like [`allocate_raw_unaligned`](Self::allocate_raw_unaligned), but
    /// guarantees a double-word-aligned result when the flags request it:
    /// a misaligned top widens the request by one word, and the wasted word
    /// is patched with a filler object after the allocation.
    pub fn allocate_raw_aligned(
        &mut self,
        size_in_bytes: Node,
        flags: AllocationFlags,
        top_address: Node,
        limit_address: Node,
    ) -> Node {
        let word_rep = self.pointer_rep();
        let word_size = self.env.target.word_size();
        let alignment_mask = self.env.target.double_alignment_mask();
        let top = self.load(MachineType::Pointer, top_address);

        let mut adjusted_size = size_in_bytes;
        if flags.contains(AllocationFlags::DOUBLE_ALIGNMENT) {
            let adjusted = self.variable(word_rep);
            let not_aligned = self.label();
            let aligned = self.label();
            let merge = self.label_merging(&[adjusted]);

            let mask = self.intptr_constant(alignment_mask);
            let misalignment = self.word_and(top, mask);
            self.branch(misalignment, not_aligned, aligned);

            self.bind(not_aligned);
            let one_word = self.intptr_constant(word_size);
            let widened = self.intptr_add(size_in_bytes, one_word);
            self.bind_var(adjusted, widened);
            self.goto(merge);

            self.bind(aligned);
            self.bind_var(adjusted, size_in_bytes);
            self.goto(merge);

            self.bind(merge);
            adjusted_size = self.var_value(adjusted);
        }

        let address = self.allocate_raw_unaligned(
            adjusted_size,
            flags.difference(AllocationFlags::DOUBLE_ALIGNMENT),
            top_address,
            limit_address,
        );

        let result = self.variable(word_rep);
        let needs_filler = self.label();
        let no_filler = self.label();
        let merge = self.label_merging(&[result]);

        let same_size = self.word_equal(adjusted_size, size_in_bytes);
        self.branch(same_size, no_filler, needs_filler);

        self.bind(needs_filler);
        // Make the skipped word walkable for the heap iterator.
        let filler = self.load_root(Root::OnePointerFillerShape);
        self.store_no_barrier(word_rep, top, filler);
        let one_word = self.intptr_constant(word_size);
        let with_filler = self.intptr_add(address, one_word);
        self.bind_var(result, with_filler);
        self.goto(merge);

        self.bind(no_filler);
        self.bind_var(result, address);
        self.goto(merge);

        self.bind(merge);
        self.var_value(result)
    }

    /// Allocates `size_in_bytes` in the space selected by `flags`, routing
    /// through the alignment fixup only where the target needs it.
    pub fn allocate(&mut self, size_in_bytes: i64, flags: AllocationFlags) -> Node {
        let refs = self.env.allocation;
        let (top_ref, limit_ref) = if flags.contains(AllocationFlags::PRETENURED) {
            (refs.old_top, refs.old_limit)
        } else {
            (refs.young_top, refs.young_limit)
        };
        let top_address = self.external_constant(top_ref);
        let limit_address = self.external_constant(limit_ref);
        let size = self.intptr_constant(size_in_bytes);

        if self.env.target.requires_double_alignment_fixup()
            && flags.contains(AllocationFlags::DOUBLE_ALIGNMENT)
        {
            self.allocate_raw_aligned(size, flags, top_address, limit_address)
        } else {
            self.allocate_raw_unaligned(size, flags, top_address, limit_address)
        }
    }
}

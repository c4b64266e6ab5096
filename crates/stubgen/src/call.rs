//! Call and tail-call emission.
//!
//! Calls are built against a [`CallDescriptor`] derived from either a
//! runtime entry identifier or a previously compiled stub. Non-tail calls
//! run between symmetric prologue/epilogue hooks on every return path; tail
//! calls bypass the hooks since control never comes back. Every wrapper
//! appends the trailing context argument except [`tail_call_n`]
//! (StubAssembler::tail_call_n), which follows the target descriptor
//! verbatim.

use crate::StubAssembler;
use opal_graph::{CallDescriptor, HeapRef, Node};

/// Identifies an entry point into the runtime, callable from stubs on slow
/// paths. The arity excludes the implicit trailing context argument.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RuntimeFn {
    /// Slow-path allocator: (smi size, smi flags) -> tagged address.
    AllocateInTargetSpace,
    /// Aborts execution with a smi reason code.
    Abort,
    /// Interrupt and stack-overflow check.
    StackGuard,
}

impl RuntimeFn {
    pub fn arity(self) -> u32 {
        match self {
            RuntimeFn::AllocateInTargetSpace => 2,
            RuntimeFn::Abort => 1,
            RuntimeFn::StackGuard => 0,
        }
    }

    /// Slot in the runtime entry table.
    pub(crate) fn table_index(self) -> u64 {
        match self {
            RuntimeFn::AllocateInTargetSpace => 0,
            RuntimeFn::Abort => 1,
            RuntimeFn::StackGuard => 2,
        }
    }

    fn descriptor(self) -> CallDescriptor {
        CallDescriptor {
            // Declared arguments plus the context.
            param_count: self.arity() + 1,
            stack_param_count: 0,
            result_count: 1,
            supports_tail_call: true,
        }
    }
}

/// A previously compiled stub together with its calling convention.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Callable {
    pub code: HeapRef,
    /// Declared parameters, excluding the context.
    pub param_count: u32,
    pub stack_param_count: u32,
}

impl Callable {
    fn descriptor(self) -> CallDescriptor {
        CallDescriptor {
            param_count: self.param_count + 1,
            stack_param_count: self.stack_param_count,
            result_count: 1,
            supports_tail_call: true,
        }
    }
}

impl<'env> StubAssembler<'env> {
    /// Hook running before every non-tail call. Reserved for frame
    /// bookkeeping.
    fn call_prologue(&mut self) {}

    /// Hook running after every non-tail call returns.
    fn call_epilogue(&mut self) {}

    pub fn call_n(&mut self, descriptor: CallDescriptor, target: Node, args: &[Node]) -> Node {
        self.call_prologue();
        let return_value = self.raw.call_n(descriptor, target, args);
        self.call_epilogue();
        return_value
    }

    /// Tail call following the target descriptor's convention verbatim; no
    /// context is appended and the hooks do not run.
    pub fn tail_call_n(&mut self, descriptor: CallDescriptor, target: Node, args: &[Node]) -> Node {
        self.raw.tail_call_n(descriptor, target, args)
    }

    fn runtime_target(&mut self, function: RuntimeFn) -> Node {
        let entry = self.env.runtime_entry(function);
        self.external_constant(entry)
    }

    // Fixed-arity runtime calls. Arguments precede the context.

    pub fn call_runtime0(&mut self, function: RuntimeFn, context: Node) -> Node {
        assert_eq!(function.arity(), 0, "{function:?} expects arguments");
        let target = self.runtime_target(function);
        self.call_n(function.descriptor(), target, &[context])
    }

    pub fn call_runtime1(&mut self, function: RuntimeFn, context: Node, arg1: Node) -> Node {
        assert_eq!(function.arity(), 1, "wrong arity for {function:?}");
        let target = self.runtime_target(function);
        self.call_n(function.descriptor(), target, &[arg1, context])
    }

    pub fn call_runtime2(
        &mut self,
        function: RuntimeFn,
        context: Node,
        arg1: Node,
        arg2: Node,
    ) -> Node {
        assert_eq!(function.arity(), 2, "wrong arity for {function:?}");
        let target = self.runtime_target(function);
        self.call_n(function.descriptor(), target, &[arg1, arg2, context])
    }

    pub fn call_runtime3(
        &mut self,
        function: RuntimeFn,
        context: Node,
        arg1: Node,
        arg2: Node,
        arg3: Node,
    ) -> Node {
        assert_eq!(function.arity(), 3, "wrong arity for {function:?}");
        let target = self.runtime_target(function);
        self.call_n(function.descriptor(), target, &[arg1, arg2, arg3, context])
    }

    pub fn call_runtime4(
        &mut self,
        function: RuntimeFn,
        context: Node,
        arg1: Node,
        arg2: Node,
        arg3: Node,
        arg4: Node,
    ) -> Node {
        assert_eq!(function.arity(), 4, "wrong arity for {function:?}");
        let target = self.runtime_target(function);
        self.call_n(
            function.descriptor(),
            target,
            &[arg1, arg2, arg3, arg4, context],
        )
    }

    pub fn tail_call_runtime0(&mut self, function: RuntimeFn, context: Node) -> Node {
        assert_eq!(function.arity(), 0, "{function:?} expects arguments");
        let target = self.runtime_target(function);
        self.raw.tail_call_n(function.descriptor(), target, &[context])
    }

    pub fn tail_call_runtime1(&mut self, function: RuntimeFn, context: Node, arg1: Node) -> Node {
        assert_eq!(function.arity(), 1, "wrong arity for {function:?}");
        let target = self.runtime_target(function);
        self.raw
            .tail_call_n(function.descriptor(), target, &[arg1, context])
    }

    pub fn tail_call_runtime2(
        &mut self,
        function: RuntimeFn,
        context: Node,
        arg1: Node,
        arg2: Node,
    ) -> Node {
        assert_eq!(function.arity(), 2, "wrong arity for {function:?}");
        let target = self.runtime_target(function);
        self.raw
            .tail_call_n(function.descriptor(), target, &[arg1, arg2, context])
    }

    pub fn tail_call_runtime3(
        &mut self,
        function: RuntimeFn,
        context: Node,
        arg1: Node,
        arg2: Node,
        arg3: Node,
    ) -> Node {
        assert_eq!(function.arity(), 3, "wrong arity for {function:?}");
        let target = self.runtime_target(function);
        self.raw
            .tail_call_n(function.descriptor(), target, &[arg1, arg2, arg3, context])
    }

    pub fn tail_call_runtime4(
        &mut self,
        function: RuntimeFn,
        context: Node,
        arg1: Node,
        arg2: Node,
        arg3: Node,
        arg4: Node,
    ) -> Node {
        assert_eq!(function.arity(), 4, "wrong arity for {function:?}");
        let target = self.runtime_target(function);
        self.raw.tail_call_n(
            function.descriptor(),
            target,
            &[arg1, arg2, arg3, arg4, context],
        )
    }

    // Fixed-arity stub calls.

    pub fn call_stub1(&mut self, callable: Callable, context: Node, arg1: Node) -> Node {
        let target = self.heap_constant(callable.code);
        self.call_n(callable.descriptor(), target, &[arg1, context])
    }

    pub fn call_stub2(
        &mut self,
        callable: Callable,
        context: Node,
        arg1: Node,
        arg2: Node,
    ) -> Node {
        let target = self.heap_constant(callable.code);
        self.call_n(callable.descriptor(), target, &[arg1, arg2, context])
    }

    pub fn call_stub3(
        &mut self,
        callable: Callable,
        context: Node,
        arg1: Node,
        arg2: Node,
        arg3: Node,
    ) -> Node {
        let target = self.heap_constant(callable.code);
        self.call_n(callable.descriptor(), target, &[arg1, arg2, arg3, context])
    }

    pub fn call_stub4(
        &mut self,
        callable: Callable,
        context: Node,
        arg1: Node,
        arg2: Node,
        arg3: Node,
        arg4: Node,
    ) -> Node {
        let target = self.heap_constant(callable.code);
        self.call_n(
            callable.descriptor(),
            target,
            &[arg1, arg2, arg3, arg4, context],
        )
    }

    pub fn call_stub5(
        &mut self,
        callable: Callable,
        context: Node,
        arg1: Node,
        arg2: Node,
        arg3: Node,
        arg4: Node,
        arg5: Node,
    ) -> Node {
        let target = self.heap_constant(callable.code);
        self.call_n(
            callable.descriptor(),
            target,
            &[arg1, arg2, arg3, arg4, arg5, context],
        )
    }

    pub fn tail_call_stub2(
        &mut self,
        callable: Callable,
        context: Node,
        arg1: Node,
        arg2: Node,
    ) -> Node {
        let target = self.heap_constant(callable.code);
        self.raw
            .tail_call_n(callable.descriptor(), target, &[arg1, arg2, context])
    }
}

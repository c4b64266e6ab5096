//! Call emission, executed through the reference evaluator.

use opal_graph::{eval::Evaluator, HeapRef, PointerWidth};
use opal_stubgen::{Callable, CodeKind, RuntimeEnv, RuntimeFn, StubAssembler};

#[test]
fn runtime_calls_pass_arguments_then_context() {
    tracing_subscriber::fmt::try_init().ok();
    let env = RuntimeEnv::new_test(PointerWidth::P64);

    let mut asm = StubAssembler::new(&env, "abort", CodeKind::Stub, 1);
    let context = asm.parameter(0);
    let reason = asm.smi_constant(12);
    let result = asm.call_runtime1(RuntimeFn::Abort, context, reason);
    asm.return_(result);
    let stub = asm.finish();

    let abort_entry = env.runtime_entry(RuntimeFn::Abort).address();
    let mut eval = Evaluator::new(stub.graph());
    eval.set_call_handler(move |_, target, args| {
        assert_eq!(target, abort_entry);
        assert_eq!(args, &[12u64 << 32, 0x77]);
        0xdead
    });
    assert_eq!(eval.run(&[0x77]), 0xdead);
}

#[test]
fn tail_calls_leave_the_stub() {
    tracing_subscriber::fmt::try_init().ok();
    let env = RuntimeEnv::new_test(PointerWidth::P64);

    let mut asm = StubAssembler::new(&env, "stack_guard", CodeKind::Stub, 1);
    let context = asm.parameter(0);
    asm.tail_call_runtime0(RuntimeFn::StackGuard, context);
    let stub = asm.finish();

    let guard_entry = env.runtime_entry(RuntimeFn::StackGuard).address();
    let mut eval = Evaluator::new(stub.graph());
    eval.set_call_handler(move |_, target, args| {
        assert_eq!(target, guard_entry);
        assert_eq!(args, &[0x77]);
        42
    });
    // The tail call's result is the stub's result.
    assert_eq!(eval.run(&[0x77]), 42);
}

#[test]
fn stub_calls_target_the_code_object() {
    tracing_subscriber::fmt::try_init().ok();
    let env = RuntimeEnv::new_test(PointerWidth::P64);
    let callee = Callable {
        code: HeapRef::new(0xc001),
        param_count: 2,
        stack_param_count: 0,
    };

    let mut asm = StubAssembler::new(&env, "caller", CodeKind::Stub, 1);
    let context = asm.parameter(0);
    let a = asm.smi_constant(1);
    let b = asm.smi_constant(2);
    let result = asm.call_stub2(callee, context, a, b);
    asm.return_(result);
    let stub = asm.finish();

    let mut eval = Evaluator::new(stub.graph());
    eval.set_call_handler(move |_, target, args| {
        assert_eq!(target, 0xc001);
        assert_eq!(args, &[1u64 << 32, 2u64 << 32, 0x77]);
        0xbeef
    });
    assert_eq!(eval.run(&[0x77]), 0xbeef);
}

#[test]
fn call_results_feed_the_merge_protocol() {
    tracing_subscriber::fmt::try_init().ok();
    let env = RuntimeEnv::new_test(PointerWidth::P64);

    // Calls a runtime entry on one arm only; the other arm produces a
    // constant, and the two merge into one phi.
    let mut asm = StubAssembler::new(&env, "maybe_call", CodeKind::Stub, 2);
    let rep = asm.pointer_rep();
    let result = asm.variable(rep);
    let call_arm = asm.deferred_label();
    let const_arm = asm.label();
    let join = asm.label_merging(&[result]);

    let context = asm.parameter(0);
    let take_call = asm.parameter(1);
    asm.branch(take_call, call_arm, const_arm);

    asm.bind(call_arm);
    let called = asm.call_runtime0(RuntimeFn::StackGuard, context);
    asm.bind_var(result, called);
    asm.goto(join);

    asm.bind(const_arm);
    let constant = asm.intptr_constant(5);
    asm.bind_var(result, constant);
    asm.goto(join);

    asm.bind(join);
    let value = asm.var_value(result);
    asm.return_(value);
    let stub = asm.finish();

    let mut with_call = Evaluator::new(stub.graph());
    with_call.set_call_handler(|_, _, _| 99);
    assert_eq!(with_call.run(&[0, 1]), 99);
    assert_eq!(Evaluator::new(stub.graph()).run(&[0, 0]), 5);
}

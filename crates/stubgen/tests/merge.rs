//! Tests for the variable/label merge protocol.

use opal_graph::{eval::Evaluator, MachineRep, NodeData, PointerWidth};
use opal_stubgen::{CodeKind, RuntimeEnv, StubAssembler};

fn assembler(env: &RuntimeEnv, param_count: u32) -> StubAssembler<'_> {
    StubAssembler::new(env, "test", CodeKind::Stub, param_count)
}

fn phi_count(asm: &StubAssembler) -> usize {
    asm.graph()
        .nodes
        .values()
        .filter(|node| matches!(node, NodeData::Phi(_)))
        .count()
}

#[test]
fn agreeing_edges_keep_the_common_value() {
    tracing_subscriber::fmt::try_init().ok();
    let env = RuntimeEnv::new_test(PointerWidth::P64);

    // One switch arm per edge; every edge carries the same value.
    for edge_count in [2usize, 3, 5] {
        let mut asm = assembler(&env, 0);
        let var = asm.variable(MachineRep::Tagged);
        let value = asm.smi_constant(7);
        asm.bind_var(var, value);

        let join = asm.label();
        let selector = asm.int32_constant(0);
        let cases: Vec<(i32, _)> = (0..edge_count - 1).map(|i| (i as i32, join)).collect();
        asm.switch(selector, join, &cases);

        asm.bind(join);
        assert_eq!(asm.var_value(var), value, "{edge_count} edges");
        assert_eq!(phi_count(&asm), 0, "{edge_count} edges synthesized a phi");
    }
}

#[test]
fn diverging_edges_merge_in_arrival_order() {
    tracing_subscriber::fmt::try_init().ok();
    let env = RuntimeEnv::new_test(PointerWidth::P64);
    let mut asm = assembler(&env, 0);

    let var = asm.variable(MachineRep::Tagged);
    let first = asm.label();
    let second = asm.label();
    let third = asm.label();
    let join = asm.label();

    let a = asm.smi_constant(1);
    let b = asm.smi_constant(2);

    let selector = asm.int32_constant(0);
    asm.switch(selector, third, &[(0, first), (1, second)]);

    // Edges arrive carrying A, B, A, in that order.
    asm.bind(first);
    asm.bind_var(var, a);
    asm.goto(join);
    asm.bind(second);
    asm.bind_var(var, b);
    asm.goto(join);
    asm.bind(third);
    asm.bind_var(var, a);
    asm.goto(join);

    asm.bind(join);
    let merged = asm.var_value(var);
    assert!(matches!(asm.graph().data(merged), NodeData::Phi(_)));
    assert_eq!(asm.graph().phi_inputs(merged), &[a, b, a]);
}

#[test]
fn variables_unbound_on_some_edges_end_up_unbound() {
    tracing_subscriber::fmt::try_init().ok();
    let env = RuntimeEnv::new_test(PointerWidth::P64);
    let mut asm = assembler(&env, 0);

    let never_bound = asm.variable(MachineRep::Tagged);
    let partially_bound = asm.variable(MachineRep::Tagged);
    let one_path = asm.label();
    let other_path = asm.label();
    let join = asm.label();

    let value = asm.smi_constant(3);
    let condition = asm.int32_constant(1);
    asm.branch(condition, one_path, other_path);

    asm.bind(one_path);
    asm.bind_var(partially_bound, value);
    asm.goto(join);
    asm.bind(other_path);
    asm.goto(join);

    asm.bind(join);
    assert!(!asm.var_is_bound(never_bound));
    assert!(!asm.var_is_bound(partially_bound));
}

#[test]
fn back_edge_extends_phi_of_bound_label() {
    tracing_subscriber::fmt::try_init().ok();
    let env = RuntimeEnv::new_test(PointerWidth::P64);
    let mut asm = assembler(&env, 0);
    let rep = asm.pointer_rep();

    // sum = 0; for i in 0..5 { sum += i }
    let sum = asm.named_variable(rep, "sum");
    let i = asm.named_variable(rep, "i");
    let loop_head = asm.label_merging(&[sum, i]);
    let body = asm.label();
    let exit = asm.label();

    let zero = asm.intptr_constant(0);
    asm.bind_var(sum, zero);
    asm.bind_var(i, zero);
    asm.goto(loop_head);

    asm.bind(loop_head);
    let limit = asm.intptr_constant(5);
    let i_value = asm.var_value(i);
    let again = asm.intptr_less_than(i_value, limit);
    asm.branch(again, body, exit);

    asm.bind(body);
    let sum_value = asm.var_value(sum);
    let new_sum = asm.intptr_add(sum_value, i_value);
    let one = asm.intptr_constant(1);
    let new_i = asm.intptr_add(i_value, one);
    asm.bind_var(sum, new_sum);
    asm.bind_var(i, new_i);
    asm.goto(loop_head);

    asm.bind(exit);
    let result = asm.var_value(sum);
    asm.return_(result);

    let stub = asm.finish();
    assert_eq!(Evaluator::new(stub.graph()).run(&[]), 10);
}

#[test]
fn switch_dispatches_through_labels() {
    tracing_subscriber::fmt::try_init().ok();
    let env = RuntimeEnv::new_test(PointerWidth::P64);

    let mut asm = assembler(&env, 1);
    let result = asm.variable(MachineRep::Tagged);
    let case_zero = asm.label();
    let case_one = asm.label();
    let fallback = asm.label();
    let join = asm.label();

    let selector = asm.parameter(0);
    asm.switch(selector, fallback, &[(0, case_zero), (1, case_one)]);

    asm.bind(case_zero);
    let ten = asm.smi_constant(10);
    asm.bind_var(result, ten);
    asm.goto(join);
    asm.bind(case_one);
    let twenty = asm.smi_constant(20);
    asm.bind_var(result, twenty);
    asm.goto(join);
    asm.bind(fallback);
    let thirty = asm.smi_constant(30);
    asm.bind_var(result, thirty);
    asm.goto(join);

    asm.bind(join);
    let value = asm.var_value(result);
    let untagged = asm.smi_untag(value);
    asm.return_(untagged);
    let stub = asm.finish();

    assert_eq!(Evaluator::new(stub.graph()).run(&[0]), 10);
    assert_eq!(Evaluator::new(stub.graph()).run(&[1]), 20);
    assert_eq!(Evaluator::new(stub.graph()).run(&[99]), 30);
}

#[test]
#[should_panic(expected = "merged inconsistently")]
fn merging_an_edge_without_a_required_value_fails() {
    let env = RuntimeEnv::new_test(PointerWidth::P64);
    let mut asm = assembler(&env, 0);

    let var = asm.variable(MachineRep::Tagged);
    let join = asm.label_merging(&[var]);
    let detour = asm.label();

    let value = asm.smi_constant(1);
    asm.bind_var(var, value);
    asm.goto(join);

    // Binding an edgeless label resets every variable, so the second edge
    // reaches the merge-marked join with no value bound.
    asm.bind(detour);
    asm.goto(join);
}

#[test]
#[should_panic(expected = "merged inconsistently")]
fn binding_an_edgeless_merge_label_fails() {
    let env = RuntimeEnv::new_test(PointerWidth::P64);
    let mut asm = assembler(&env, 0);

    let var = asm.variable(MachineRep::Tagged);
    let join = asm.label_merging(&[var]);
    asm.bind(join);
}

#[test]
#[should_panic(expected = "diverged after the label was bound")]
fn new_divergence_after_bind_fails() {
    let env = RuntimeEnv::new_test(PointerWidth::P64);
    let mut asm = assembler(&env, 0);

    let var = asm.variable(MachineRep::Tagged);
    let join = asm.label();
    let after = asm.label();

    let a = asm.smi_constant(1);
    asm.bind_var(var, a);
    asm.goto(join);

    asm.bind(join);
    asm.goto(after);

    // `var` agreed on every edge when `join` was bound, so it has no phi
    // there; a late edge with a new value cannot be merged.
    asm.bind(after);
    let b = asm.smi_constant(2);
    asm.bind_var(var, b);
    asm.goto(join);
}

#[test]
#[should_panic(expected = "bound twice")]
fn binding_a_label_twice_fails() {
    let env = RuntimeEnv::new_test(PointerWidth::P64);
    let mut asm = assembler(&env, 0);

    let join = asm.label();
    asm.goto(join);
    asm.bind(join);
    asm.bind(join);
}

#[test]
#[should_panic(expected = "read before any value was bound")]
fn reading_an_unbound_variable_fails() {
    let env = RuntimeEnv::new_test(PointerWidth::P64);
    let mut asm = assembler(&env, 0);

    let var = asm.variable(MachineRep::Tagged);
    asm.var_value(var);
}

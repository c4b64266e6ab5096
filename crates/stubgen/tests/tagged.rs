//! Tagged-value primitives, executed through the reference evaluator.

use opal_graph::{eval::Evaluator, PointerWidth};
use opal_stubgen::{CodeKind, Root, RuntimeEnv, StubAssembler};

fn signed_result(width: PointerWidth, raw: u64) -> i64 {
    match width {
        PointerWidth::P32 => raw as u32 as i32 as i64,
        PointerWidth::P64 => raw as i64,
    }
}

#[test]
fn smi_round_trip_preserves_every_value_in_range() {
    tracing_subscriber::fmt::try_init().ok();

    for width in [PointerWidth::P32, PointerWidth::P64] {
        let env = RuntimeEnv::new_test(width);
        let mut asm = StubAssembler::new(&env, "smi_round_trip", CodeKind::Stub, 1);
        let value = asm.parameter(0);
        let tagged = asm.smi_tag(value);
        let untagged = asm.smi_untag(tagged);
        asm.return_(untagged);
        let stub = asm.finish();

        let max = env.target.max_smi_value();
        let min = env.target.min_smi_value();
        for x in [min, -1000, -1, 0, 1, 7, 1000, max] {
            let raw = Evaluator::new(stub.graph()).run(&[x as u64]);
            assert_eq!(signed_result(width, raw), x, "width {width:?}, value {x}");
        }
    }
}

#[test]
fn smi_min_picks_the_smaller_value() {
    tracing_subscriber::fmt::try_init().ok();
    let env = RuntimeEnv::new_test(PointerWidth::P64);

    let stub = {
        let mut asm = StubAssembler::new(&env, "smi_min", CodeKind::Stub, 2);
        let a = asm.parameter(0);
        let b = asm.parameter(1);
        let min = asm.smi_min(a, b);
        let untagged = asm.smi_untag(min);
        asm.return_(untagged);
        asm.finish()
    };

    let smi = |x: i64| (x << 32) as u64;
    let run = |a: u64, b: u64| Evaluator::new(stub.graph()).run(&[a, b]) as i64;
    assert_eq!(run(smi(3), smi(11)), 3);
    assert_eq!(run(smi(11), smi(3)), 3);
    assert_eq!(run(smi(-5), smi(2)), -5);
    assert_eq!(run(smi(4), smi(4)), 4);
}

#[test]
fn word_is_smi_tests_the_tag_bit() {
    tracing_subscriber::fmt::try_init().ok();
    let env = RuntimeEnv::new_test(PointerWidth::P64);

    let mut asm = StubAssembler::new(&env, "is_smi", CodeKind::Stub, 1);
    let value = asm.parameter(0);
    let is_smi = asm.word_is_smi(value);
    asm.return_(is_smi);
    let stub = asm.finish();

    assert_eq!(Evaluator::new(stub.graph()).run(&[14 << 32]), 1);
    assert_eq!(Evaluator::new(stub.graph()).run(&[0x7001]), 0);
}

#[test]
fn constant_and_smi_indexed_element_loads_agree() {
    tracing_subscriber::fmt::try_init().ok();
    let env = RuntimeEnv::new_test(PointerWidth::P64);
    let array_base: u64 = 0x6000;
    let array = array_base + 1; // tagged
    let element_value: u64 = 0x1234;
    // Element 2 lives after the two header words.
    let element_address = array_base + 16 + 2 * 8;

    let by_constant = {
        let mut asm = StubAssembler::new(&env, "element_const", CodeKind::Stub, 1);
        let array = asm.parameter(0);
        let element = asm.load_array_element(array, 2);
        asm.return_(element);
        asm.finish()
    };
    let by_smi = {
        let mut asm = StubAssembler::new(&env, "element_smi", CodeKind::Stub, 1);
        let array = asm.parameter(0);
        let index = asm.smi_constant(2);
        let element = asm.load_array_element_smi_index(array, index);
        asm.return_(element);
        asm.finish()
    };

    for stub in [&by_constant, &by_smi] {
        let mut eval = Evaluator::new(stub.graph());
        eval.memory.write_word(PointerWidth::P64, element_address, element_value);
        assert_eq!(eval.run(&[array]), element_value, "{}", stub.name());
    }
}

#[test]
fn store_element_then_load_it_back() {
    tracing_subscriber::fmt::try_init().ok();
    let env = RuntimeEnv::new_test(PointerWidth::P64);

    let mut asm = StubAssembler::new(&env, "store_element", CodeKind::Stub, 2);
    let array = asm.parameter(0);
    let value = asm.parameter(1);
    let index = asm.intptr_constant(3);
    asm.store_array_element_no_barrier(array, index, value);
    let loaded = asm.load_array_element(array, 3);
    asm.return_(loaded);
    let stub = asm.finish();

    let array: u64 = 0x6000 + 1;
    assert_eq!(Evaluator::new(stub.graph()).run(&[array, 0xfeed]), 0xfeed);
}

#[test]
fn constant_roots_inline_as_constants() {
    tracing_subscriber::fmt::try_init().ok();
    let env = RuntimeEnv::new_test(PointerWidth::P64);

    let mut asm = StubAssembler::new(&env, "roots", CodeKind::Stub, 0);
    let null = asm.null_constant();
    asm.return_(null);
    let stub = asm.finish();

    assert_eq!(
        Evaluator::new(stub.graph()).run(&[]),
        env.roots.null.tagged_address()
    );
}

#[test]
fn smi_roots_materialize_tagged() {
    tracing_subscriber::fmt::try_init().ok();
    let env = RuntimeEnv::new_test(PointerWidth::P64);

    let mut asm = StubAssembler::new(&env, "hash_seed", CodeKind::Stub, 0);
    let seed = asm.load_root(Root::HashSeed);
    let untagged = asm.smi_untag(seed);
    asm.return_(untagged);
    let stub = asm.finish();

    assert_eq!(
        Evaluator::new(stub.graph()).run(&[]) as i64,
        env.roots.hash_seed
    );
}

#[test]
#[should_panic(expected = "not implemented")]
fn movable_roots_are_not_loadable() {
    let env = RuntimeEnv::new_test(PointerWidth::P64);
    let mut asm = StubAssembler::new(&env, "string_table", CodeKind::Stub, 0);
    asm.load_root(Root::StringTable);
}

#[test]
fn bit_field_decode_extracts_masked_bits() {
    tracing_subscriber::fmt::try_init().ok();
    let env = RuntimeEnv::new_test(PointerWidth::P64);

    let mut asm = StubAssembler::new(&env, "bit_field", CodeKind::Stub, 1);
    let word = asm.parameter(0);
    let decoded = asm.bit_field_decode(word, 4, 0xf0);
    asm.return_(decoded);
    let stub = asm.finish();

    assert_eq!(Evaluator::new(stub.graph()).run(&[0b1010_0110]), 0b1010);
}

#[test]
fn shape_loads_read_the_object_header() {
    tracing_subscriber::fmt::try_init().ok();
    let env = RuntimeEnv::new_test(PointerWidth::P64);

    let mut asm = StubAssembler::new(&env, "instance_kind", CodeKind::Stub, 1);
    let object = asm.parameter(0);
    let kind = asm.load_instance_kind(object);
    asm.return_(kind);
    let stub = asm.finish();

    let object_base: u64 = 0x6100;
    let shape_base: u64 = 0x6200;
    let mut eval = Evaluator::new(stub.graph());
    // Object header points at the shape; the shape's kind byte is one word in.
    eval.memory
        .write_word(PointerWidth::P64, object_base, shape_base + 1);
    eval.memory.write(shape_base + 8, 1, 0x2a);
    assert_eq!(eval.run(&[object_base + 1]), 0x2a);
}

use criterion::{black_box, criterion_group, criterion_main, Bencher, Criterion};
use rexx_core::instruction::{Instruction, InstructionId, InstructionKind, LoopSpec, Operand, Program};
use rexx_core::intern::InternerBuilder;
use rexx_core::trace::NullSink;
use rexx_core::value::Value;
use rexx_core::{Executor, Package};

fn counted_loop_program(iterations: i64) -> Package {
    let mut names = InternerBuilder::new();
    let control = names.intern("I");

    let mut program = Program::new();
    let body_end = InstructionId::new(2);
    program.push(Instruction::new(
        InstructionKind::DoStart {
            spec: LoopSpec::Repetitive {
                control,
                from: Operand::Literal(Value::Integer(1)),
                to: Some(Operand::Literal(Value::Integer(iterations))),
                by: None,
                for_count: None,
            },
            body_end,
        },
        1,
    ));
    program.push(Instruction::new(InstructionKind::DoEnd { start: InstructionId::new(0) }, 2));
    program.push(Instruction::new(InstructionKind::Return { value: None }, 3));
    Package::new("LOOP", program)
}

/// Runs a thousand-iteration counted loop with no body, isolating the
/// dispatch loop and `DoBlock::advance` from any per-iteration work.
fn counted_loop(bench: &mut Bencher) {
    let package = counted_loop_program(1_000);
    let executor = Executor::new();

    bench.iter(|| {
        let mut sink = NullSink;
        let result = executor.run(&package, &mut sink).unwrap();
        black_box(result);
    });
}

/// A single RAISE/trap round trip: the cost of building an `Unwind`,
/// matching it against a `CALL ON` trap, and resuming at the handler.
fn raise_and_trap(bench: &mut Bencher) {
    let mut names = InternerBuilder::new();
    let user = rexx_core::ConditionName::User(names.intern("FOUND"));

    let mut program = Program::new();
    program.push(Instruction::new(InstructionKind::CallOn { condition: user, target: InstructionId::new(2) }, 1));
    program.push(Instruction::new(
        InstructionKind::Raise { condition: user, description: None, additional: Vec::new(), propagate: false },
        2,
    ));
    program.push(Instruction::new(InstructionKind::Return { value: None }, 3));
    let package = Package::new("TRAP", program);
    let executor = Executor::new();

    bench.iter(|| {
        let mut sink = NullSink;
        let result = executor.run(&package, &mut sink);
        black_box(result.is_ok());
    });
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("counted_loop");
    group.bench_function("rexx_core", counted_loop);
    group.finish();

    let mut group = c.benchmark_group("raise_and_trap");
    group.bench_function("rexx_core", raise_and_trap);
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

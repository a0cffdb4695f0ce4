//! Command-line demo runner for `rexx-core`.
//!
//! There is no lexer/parser in this workspace (out of scope for the
//! execution core), so this binary builds a small instruction tree by
//! hand and runs it through an [`Activation`](rexx_core::Activation),
//! printing SAY/TRACE output to stdout. It exists purely to exercise the
//! core end to end, driving its `Executor` over a parsed module the
//! same way a language workbench's own CLI would.

use clap::Parser;
use rexx_core::instruction::{Instruction, InstructionId, InstructionKind, LoopSpec, Operand, Program};
use rexx_core::intern::InternerBuilder;
use rexx_core::trace::{TraceOption, TraceSetting, TraceSink};
use rexx_core::value::Value;
use rexx_core::{Executor, Package};

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs a small built-in Rexx execution core demo")]
struct Cli {
    /// Echo each clause as TRACE ALL would.
    #[arg(long)]
    trace: bool,
}

struct StdoutSink;

impl TraceSink for StdoutSink {
    fn write_line(&mut self, line: &str) {
        println!("{line}");
    }
}

/// Builds `DO I = 1 TO 3; SAY I; END` followed by `RETURN`.
fn demo_program(control: rexx_core::intern::SymbolId) -> Program {
    let mut program = Program::new();
    program.push(Instruction::new(
        InstructionKind::DoStart {
            spec: LoopSpec::Repetitive {
                control,
                from: Operand::Literal(Value::Integer(1)),
                to: Some(Operand::Literal(Value::Integer(3))),
                by: None,
                for_count: None,
            },
            body_end: InstructionId::new(3),
        },
        1,
    ));
    program.push(Instruction::new(InstructionKind::Say { value: Operand::Variable(control) }, 2));
    program.push(Instruction::new(InstructionKind::DoEnd { start: InstructionId::new(1) }, 3));
    program.push(Instruction::new(InstructionKind::Return { value: None }, 4));
    program
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut names = InternerBuilder::new();
    let control = names.intern("I");

    let program = demo_program(control);
    let mut package = Package::new("DEMO", program);
    if cli.trace {
        package = package.with_initial_trace(TraceSetting::new(TraceOption::All));
    }

    let executor = Executor::new();
    let mut sink = StdoutSink;
    match executor.run(&package, &mut sink) {
        Ok(value) => println!("=> {value}"),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

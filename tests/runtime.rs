//===================================================
// minivm Runtime
//===================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: End-to-end checks of assembly plus evaluation
// Objective: Exercise label resolution and stack semantics together
//===================================================

use minivm::asm::{self, AsmError, Assembler, Label, Opcode, Operand};
use minivm::config::{AssemblerConfig, Config, DuplicateLabelPolicy, UndefinedLabelPolicy, VmConfig};
use minivm::vm::{StackVm, VmError};
use minivm::{COUNTING_LOOP, Error, Value, run_source};

fn eval(source: &str) -> Result<Value, Error> {
    run_source(source, &Config::default())
}

#[test]
fn counting_loop_halts_with_single_value() {
    let program = asm::assemble(COUNTING_LOOP).expect("assemble counting loop");
    assert_eq!(program.len(), 7);

    let mut vm = StackVm::default();
    let value = vm.evaluate(&program).expect("counting loop runs");
    assert_eq!(value, Value::Integer(1_000_000));
    assert_eq!(vm.stack(), &[Value::Integer(1_000_000)]);
    assert_eq!(vm.pc(), program.len());
}

#[test]
fn jumps_resolve_to_count_of_preceding_instructions() {
    let source = "\
goto :mid
if :end
# comment lines do not count
:start
push 1

push 2
:mid
goto :start
nop
:end
";
    let program = asm::assemble(source).expect("assemble");
    let position = |name: &str| program.label_named(name).and_then(Label::position);
    assert_eq!(position("start"), Some(2));
    assert_eq!(position("mid"), Some(4));
    assert_eq!(position("end"), Some(6));

    for instruction in program.instructions() {
        if let [Operand::Label(id)] = instruction.operands.as_slice() {
            let label = program.label(*id).expect("label in arena");
            assert!(label.is_resolved(), "{label} should be resolved");
        }
    }
}

#[test]
fn subtraction_and_division_are_top_first() {
    assert_eq!(eval("push 3\npush 5\nsub"), Ok(Value::Integer(2)));
    assert_eq!(eval("push 2\npush 10\ndiv"), Ok(Value::Integer(5)));
    assert_eq!(eval("push 5\npush 3\nsub"), Ok(Value::Integer(-2)));
}

#[test]
fn dup_then_add_doubles() {
    assert_eq!(eval("push 7\ndup\nadd"), Ok(Value::Integer(14)));
}

#[test]
fn every_popping_opcode_underflows_on_empty_stack() {
    for opcode in Opcode::ALL {
        let source = match opcode {
            Opcode::Nop | Opcode::Push | Opcode::Goto => continue,
            Opcode::If => "if :here\n:here".to_string(),
            other => other.name().to_string(),
        };
        match eval(&source) {
            Err(Error::Vm(VmError::StackUnderflow { pc: 0, opcode: seen })) => {
                assert_eq!(seen, opcode)
            }
            other => panic!("{opcode} on empty stack gave {other:?}"),
        }
    }
}

#[test]
fn unknown_opcode_is_fatal() {
    let err = eval("xyz\npush 1").unwrap_err();
    assert_eq!(
        err,
        Error::Vm(VmError::UnknownOpcode {
            pc: 0,
            name: "xyz".into()
        })
    );
}

#[test]
fn parse_error_reports_line_and_stops() {
    let err = asm::assemble("push 1\npush 1 @@@\n:later\ngoto :nowhere").unwrap_err();
    assert_eq!(
        err,
        AsmError::Parse {
            line: 2,
            text: "push 1 @@@".into()
        }
    );
}

#[test]
fn label_policies_follow_configuration() {
    let source = ":a\npush 1\n:a\npush 2\ngoto :b";
    assert!(matches!(
        asm::assemble(source),
        Err(AsmError::DuplicateLabel { line: 3, .. })
    ));

    let relaxed = Config {
        assembler: AssemblerConfig {
            duplicate_labels: DuplicateLabelPolicy::LastWins,
            undefined_labels: UndefinedLabelPolicy::Defer,
        },
        vm: VmConfig::default(),
    };
    let program = Assembler::new(relaxed.assembler)
        .assemble(source)
        .expect("relaxed assembly");
    assert_eq!(program.label_named("a").and_then(Label::position), Some(1));
    assert!(matches!(
        run_source(source, &relaxed),
        Err(Error::Vm(VmError::InvalidJumpTarget { pc: 2, .. }))
    ));
}

#[test]
fn jump_to_trailing_label_halts() {
    assert_eq!(
        eval("push 3\ngoto :end\npush 4\n:end"),
        Ok(Value::Integer(3))
    );
}

#[test]
fn booleans_are_not_integers() {
    assert!(matches!(
        eval("push 1\npush 2\nbigger\npush 1\npush 2\nbigger\nadd"),
        Err(Error::Vm(VmError::TypeMismatch { .. }))
    ));
    assert_eq!(
        eval("push 1\npush 2\nbigger\nnot"),
        Ok(Value::Boolean(false))
    );
}

#[test]
fn encoded_program_runs_like_source() {
    let program = asm::assemble(COUNTING_LOOP).expect("assemble");
    let decoded = asm::Program::decode(&program.encode().expect("encode")).expect("decode");
    assert_eq!(asm::disassemble(&decoded), asm::disassemble(&program));

    let mut vm = StackVm::new(VmConfig {
        max_steps: Some(50),
    });
    assert_eq!(
        vm.evaluate(&decoded),
        Err(VmError::StepLimitExceeded { limit: 50 })
    );
}

use std::collections::HashMap;
use std::fmt::Write;

use tracing::{debug, instrument};

use super::format::{AsmError, Instruction, Label, LabelId, Operand, Program};
use crate::config::{AssemblerConfig, DuplicateLabelPolicy, UndefinedLabelPolicy};

const COMMENT_CHAR: u8 = b'#';
const LABEL_SIGIL: u8 = b':';

#[derive(Debug)]
enum Line {
    Label(LabelId),
    Instruction(Instruction),
}

#[derive(Debug)]
struct LabelEntry {
    label: Label,
    declared_on: Option<usize>,
    first_use: Option<usize>,
}

/// Label table and id counter for a single assembly pass.
#[derive(Debug, Default)]
struct Session {
    entries: Vec<LabelEntry>,
    by_name: HashMap<String, LabelId>,
    next_id: u32,
}

impl Session {
    /// Looks up `name`, creating the label on first mention.
    fn intern(&mut self, name: &str) -> LabelId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        self.next_id += 1;
        let id = LabelId(self.entries.len() as u32);
        self.entries.push(LabelEntry {
            label: Label::new(name, self.next_id),
            declared_on: None,
            first_use: None,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    fn reference(&mut self, name: &str, line: usize) -> LabelId {
        let id = self.intern(name);
        let entry = &mut self.entries[id.index()];
        entry.first_use.get_or_insert(line);
        id
    }

    /// Splits one trimmed, non-comment source line into operands.
    fn lex(&mut self, line_no: usize, line: &str) -> Result<Vec<Operand>, AsmError> {
        let bytes = line.as_bytes();
        let mut out = Vec::with_capacity(4);
        let mut i = 0;

        while i < bytes.len() {
            let b = bytes[i];
            match b {
                _ if b.is_ascii_whitespace() => i += 1,
                COMMENT_CHAR => break,
                LABEL_SIGIL if bytes.get(i + 1).is_some_and(u8::is_ascii_lowercase) => {
                    let end = scan(bytes, i + 1, u8::is_ascii_lowercase);
                    out.push(Operand::Label(self.reference(&line[i + 1..end], line_no)));
                    i = end;
                }
                _ if b.is_ascii_lowercase() => {
                    let end = scan(bytes, i, u8::is_ascii_lowercase);
                    out.push(Operand::Symbol(line[i..end].to_string()));
                    i = end;
                }
                _ if b.is_ascii_digit() => {
                    let end = scan(bytes, i, u8::is_ascii_digit);
                    let literal = &line[i..end];
                    let value = literal.parse::<i64>().map_err(|_| AsmError::IntegerLiteral {
                        line: line_no,
                        literal: literal.to_string(),
                    })?;
                    out.push(Operand::Integer(value));
                    i = end;
                }
                _ => {
                    return Err(AsmError::Parse {
                        line: line_no,
                        text: line.to_string(),
                    });
                }
            }
        }

        Ok(out)
    }
}

fn scan(bytes: &[u8], start: usize, accept: fn(&u8) -> bool) -> usize {
    start + bytes[start..].iter().take_while(|b| accept(b)).count()
}

/// Returns the label name when the whole line is a `:name` declaration.
fn declaration(line: &str) -> Option<&str> {
    let name = line.strip_prefix(LABEL_SIGIL as char)?;
    (!name.is_empty() && name.bytes().all(|b| b.is_ascii_lowercase())).then_some(name)
}

fn describe_operands(operands: &[Operand]) -> String {
    if operands.is_empty() {
        return "no operands".to_string();
    }
    let kinds: Vec<_> = operands.iter().map(Operand::kind).collect();
    format!("{} operand(s) ({})", operands.len(), kinds.join(", "))
}

/// Turns mini-assembly text into a [`Program`] with resolved jump targets.
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    config: AssemblerConfig,
}

impl Assembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    /// Assembles `source`, stopping at the first error.
    ///
    /// Every call runs in a fresh session, so label ids restart at 1.
    #[instrument(skip_all)]
    pub fn assemble(&self, source: &str) -> Result<Program, AsmError> {
        let mut session = Session::default();
        let lines = self.tokenize(&mut session, source)?;
        self.materialize(session, lines)
    }

    /// First pass. Every per-line error is raised here, in source order.
    fn tokenize(&self, session: &mut Session, source: &str) -> Result<Vec<Line>, AsmError> {
        let mut lines = Vec::new();

        for (idx, raw_line) in source.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(COMMENT_CHAR as char) {
                continue;
            }

            if let Some(name) = declaration(line) {
                let id = session.intern(name);
                let entry = &mut session.entries[id.index()];
                if entry.declared_on.is_some()
                    && self.config.duplicate_labels == DuplicateLabelPolicy::Reject
                {
                    return Err(AsmError::DuplicateLabel {
                        name: name.to_string(),
                        line: line_no,
                    });
                }
                entry.declared_on = Some(line_no);
                lines.push(Line::Label(id));
                continue;
            }

            let mut tokens = session.lex(line_no, line)?.into_iter();
            let name = match tokens.next() {
                Some(Operand::Symbol(name)) => name,
                Some(other) => {
                    return Err(AsmError::MissingOpcode {
                        line: line_no,
                        found: other.kind(),
                    });
                }
                None => continue,
            };
            let instruction = Instruction::from_mnemonic(name, tokens.collect());
            if let Some(opcode) = instruction.opcode {
                let shape = opcode.shape();
                if !shape.accepts(&instruction.operands) {
                    return Err(AsmError::OperandMismatch {
                        line: line_no,
                        opcode,
                        expected: shape.describe(),
                        found: describe_operands(&instruction.operands),
                    });
                }
            }
            lines.push(Line::Instruction(instruction));
        }

        Ok(lines)
    }

    /// Second pass: pins each declaration to the index of the next instruction.
    fn materialize(&self, mut session: Session, lines: Vec<Line>) -> Result<Program, AsmError> {
        let mut instructions = Vec::new();

        for entry in lines {
            match entry {
                Line::Label(id) => {
                    let position = instructions.len();
                    let label = &mut session.entries[id.index()].label;
                    label.resolve(position);
                    debug!(label = label.name(), position, "label resolved");
                }
                Line::Instruction(instruction) => instructions.push(instruction),
            }
        }

        if self.config.undefined_labels == UndefinedLabelPolicy::Reject {
            let missing = session
                .entries
                .iter()
                .find(|entry| !entry.label.is_resolved() && entry.first_use.is_some());
            if let Some(entry) = missing {
                return Err(AsmError::UndefinedLabel {
                    name: entry.label.name().to_string(),
                    line: entry.first_use.unwrap_or_default(),
                });
            }
        }

        let labels: Vec<Label> = session.entries.into_iter().map(|entry| entry.label).collect();
        debug!(
            instructions = instructions.len(),
            labels = labels.len(),
            "program assembled"
        );
        Ok(Program::new(instructions, labels))
    }
}

/// Assembles `source` with the default configuration.
pub fn assemble(source: &str) -> Result<Program, AsmError> {
    Assembler::default().assemble(source)
}

/// Renders a program as an `index: opcode <operands>` listing.
pub fn disassemble(program: &Program) -> String {
    let mut output = String::new();
    for (index, instruction) in program.instructions().iter().enumerate() {
        let operands: Vec<_> = instruction
            .operands
            .iter()
            .map(|operand| program.describe_operand(operand))
            .collect();
        let _ = writeln!(
            output,
            "{index:04}\t{} <{}>",
            instruction.name,
            operands.join(", ")
        );
    }
    output
}

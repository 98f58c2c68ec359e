use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAGIC: &[u8; 4] = b"MVM1";
pub const VERSION: u8 = 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("parse error at line {line}: {text}")]
    Parse { line: usize, text: String },
    #[error("line {line}: expected an opcode but found {found}")]
    MissingOpcode { line: usize, found: &'static str },
    #[error("line {line}: integer literal {literal} is out of range")]
    IntegerLiteral { line: usize, literal: String },
    #[error("line {line}: {opcode} expects {expected} but received {found}")]
    OperandMismatch {
        line: usize,
        opcode: Opcode,
        expected: &'static str,
        found: String,
    },
    #[error("line {line}: label :{name} is already declared")]
    DuplicateLabel { name: String, line: usize },
    #[error("line {line}: label :{name} is never declared")]
    UndefinedLabel { name: String, line: usize },
    #[error("invalid program header")]
    InvalidHeader,
    #[error("unsupported program version {0}")]
    UnsupportedVersion(u8),
    #[error("program codec error: {0}")]
    Codec(String),
}

/// Operand layout an opcode accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    Empty,
    Integer,
    Label,
}

impl OperandShape {
    pub const fn describe(self) -> &'static str {
        match self {
            OperandShape::Empty => "no operands",
            OperandShape::Integer => "one integer operand",
            OperandShape::Label => "one label operand",
        }
    }

    pub fn accepts(self, operands: &[Operand]) -> bool {
        matches!(
            (self, operands),
            (OperandShape::Empty, [])
                | (OperandShape::Integer, [Operand::Integer(_)])
                | (OperandShape::Label, [Operand::Label(_)])
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Opcode {
    Nop,
    Push,
    Pop,
    Dup,
    Add,
    Sub,
    Mul,
    Div,
    Not,
    Smaller,
    Bigger,
    Goto,
    If,
}

impl Opcode {
    pub const ALL: [Opcode; 13] = [
        Opcode::Nop,
        Opcode::Push,
        Opcode::Pop,
        Opcode::Dup,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Not,
        Opcode::Smaller,
        Opcode::Bigger,
        Opcode::Goto,
        Opcode::If,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Push => "push",
            Opcode::Pop => "pop",
            Opcode::Dup => "dup",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Not => "not",
            Opcode::Smaller => "smaller",
            Opcode::Bigger => "bigger",
            Opcode::Goto => "goto",
            Opcode::If => "if",
        }
    }

    pub fn from_mnemonic(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|opcode| opcode.name() == name)
    }

    pub const fn shape(self) -> OperandShape {
        match self {
            Opcode::Push => OperandShape::Integer,
            Opcode::Goto | Opcode::If => OperandShape::Label,
            _ => OperandShape::Empty,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle into a program's label arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelId(pub u32);

impl LabelId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A named jump target.
///
/// `position` stays `None` until the declaration line has been seen. The id is
/// the creation order inside one assembler session and only feeds diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    name: String,
    id: u32,
    position: Option<usize>,
}

impl Label {
    pub fn new(name: impl Into<String>, id: u32) -> Self {
        Self {
            name: name.into(),
            id,
            position: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn is_resolved(&self) -> bool {
        self.position.is_some()
    }

    pub(crate) fn resolve(&mut self, position: usize) {
        self.position = Some(position);
    }

    pub fn resolved_at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(position) => write!(f, ":{} <{}@{}>", self.name, self.id, position),
            None => write!(f, ":{} <{}@-1>", self.name, self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Integer(i64),
    Symbol(String),
    Label(LabelId),
}

impl Operand {
    pub const fn kind(&self) -> &'static str {
        match self {
            Operand::Integer(_) => "integer",
            Operand::Symbol(_) => "symbol",
            Operand::Label(_) => "label",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Mnemonic as written in the source.
    pub name: String,
    /// Decoded opcode, `None` when the mnemonic is not recognised.
    pub opcode: Option<Opcode>,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Self {
        Self {
            name: opcode.name().to_string(),
            opcode: Some(opcode),
            operands,
        }
    }

    /// Builds an instruction from a raw mnemonic, decoding it when it is known.
    pub fn from_mnemonic(name: impl Into<String>, operands: Vec<Operand>) -> Self {
        let name = name.into();
        let opcode = Opcode::from_mnemonic(&name);
        Self {
            name,
            opcode,
            operands,
        }
    }
}

/// Resolved instruction sequence plus the label arena its jumps point into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    instructions: Vec<Instruction>,
    labels: Vec<Label>,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>, labels: Vec<Label>) -> Self {
        Self {
            instructions,
            labels,
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, pc: usize) -> Option<&Instruction> {
        self.instructions.get(pc)
    }

    pub fn label(&self, id: LabelId) -> Option<&Label> {
        self.labels.get(id.index())
    }

    pub fn label_named(&self, name: &str) -> Option<&Label> {
        self.labels.iter().find(|label| label.name == name)
    }

    /// Renders one operand the way listings show it.
    pub fn describe_operand(&self, operand: &Operand) -> String {
        match operand {
            Operand::Integer(value) => value.to_string(),
            Operand::Symbol(symbol) => symbol.clone(),
            Operand::Label(id) => match self.label(*id) {
                Some(label) => label.to_string(),
                None => format!("<dangling label {}>", id.0),
            },
        }
    }

    pub fn is_encoded(bytes: &[u8]) -> bool {
        bytes.starts_with(MAGIC)
    }

    pub fn encode(&self) -> Result<Vec<u8>, AsmError> {
        let body = bincode::serialize(self).map_err(|err| AsmError::Codec(err.to_string()))?;
        let mut bytes = Vec::with_capacity(MAGIC.len() + 1 + body.len());
        bytes.extend_from_slice(MAGIC);
        bytes.push(VERSION);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, AsmError> {
        let rest = bytes.strip_prefix(MAGIC).ok_or(AsmError::InvalidHeader)?;
        let (&version, body) = rest.split_first().ok_or(AsmError::InvalidHeader)?;
        if version != VERSION {
            return Err(AsmError::UnsupportedVersion(version));
        }
        bincode::deserialize(body).map_err(|err| AsmError::Codec(err.to_string()))
    }
}

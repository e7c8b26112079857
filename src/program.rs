//! Two-pass emission from a list of instructions.
//!
//! A [`Program`] is built up the same way as an [`Emitter`] session, but
//! nothing is encoded until [`Program::assemble`]. Pass one walks the list
//! and assigns every label its address; since every item has a fixed size
//! no patching is ever needed. Pass two encodes through an [`Emitter`], so
//! displacement and address arithmetic lives in one place.

use std::collections::HashMap;

use tracing::debug;

use crate::emitter::{Address, Code, Emitter};
use crate::error::EmitError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    RawByte(u8),
    RawWord(u16),
    /// Zero-sized: names the address of whatever follows.
    Label(String),
    /// One displacement byte relative to the end of itself.
    RelativeBranchTo(String),
    /// Two-byte little-endian absolute address.
    AbsoluteJumpTo(String),
}

impl Instruction {
    /// Encoded size in bytes.
    pub fn size(&self) -> u32 {
        match self {
            Instruction::RawByte(_) | Instruction::RelativeBranchTo(_) => 1,
            Instruction::RawWord(_) | Instruction::AbsoluteJumpTo(_) => 2,
            Instruction::Label(_) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    origin: u16,
    items: Vec<Instruction>,
}

impl Program {
    pub fn new(origin: u16) -> Self {
        Self {
            origin,
            items: Vec::new(),
        }
    }

    pub fn origin(&self) -> u16 {
        self.origin
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.items
    }

    pub fn push(&mut self, item: Instruction) -> &mut Self {
        self.items.push(item);
        self
    }

    /// Emit raw bytes
    pub fn emit(&mut self, bytes: &[u8]) -> &mut Self {
        self.items
            .extend(bytes.iter().copied().map(Instruction::RawByte));
        self
    }

    pub fn word(&mut self, word: u16) -> &mut Self {
        self.push(Instruction::RawWord(word))
    }

    pub fn label(&mut self, name: &str) -> &mut Self {
        self.push(Instruction::Label(name.to_string()))
    }

    /// Branch opcode followed by a displacement to `name`.
    pub fn branch(&mut self, opcode: u8, name: &str) -> &mut Self {
        self.push(Instruction::RawByte(opcode))
            .push(Instruction::RelativeBranchTo(name.to_string()))
    }

    /// Jump/call opcode followed by the absolute address of `name`.
    pub fn jump(&mut self, opcode: u8, name: &str) -> &mut Self {
        self.push(Instruction::RawByte(opcode))
            .push(Instruction::AbsoluteJumpTo(name.to_string()))
    }

    /// Total encoded size.
    pub fn size(&self) -> u32 {
        self.items.iter().map(Instruction::size).sum()
    }

    /// Pass one: the address of every label.
    pub fn layout(&self) -> Result<HashMap<String, Address>, EmitError> {
        let mut labels = HashMap::new();
        let mut pc = Address::new(self.origin);
        for item in &self.items {
            if let Instruction::Label(name) = item {
                if labels.insert(name.clone(), pc).is_some() {
                    return Err(EmitError::DuplicateLabel(name.clone()));
                }
            }
            pc = pc.offset(item.size());
        }
        debug!(labels = labels.len(), end = %pc, "layout pass done");
        Ok(labels)
    }

    /// Lay out, then encode.
    pub fn assemble(&self) -> Result<Code, EmitError> {
        let labels = self.layout()?;
        let mut em = Emitter::new(self.origin);
        let lookup = |name: &str, em: &Emitter| {
            labels
                .get(name)
                .copied()
                .ok_or_else(|| EmitError::UnresolvedReference {
                    target: name.to_string(),
                    offset: em.len(),
                })
        };
        for item in &self.items {
            match item {
                Instruction::RawByte(b) => em.emit(&[*b]),
                Instruction::RawWord(w) => em.emit_word(*w),
                Instruction::Label(name) => {
                    em.label(name)?;
                }
                Instruction::RelativeBranchTo(name) => {
                    let target = lookup(name, &em)?;
                    em.append_displacement(target)?;
                }
                Instruction::AbsoluteJumpTo(name) => {
                    let target = lookup(name, &em)?;
                    em.append_address(target)?;
                }
            }
        }
        debug!(size = em.len(), "encode pass done");
        em.finalize()
    }
}

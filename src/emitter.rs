//! Byte emitter and label resolver for hand-encoded 6502 code.
//!
//! The emitter owns a growing buffer that is loaded at `origin`. Callers
//! append literal bytes and words, record addresses, and emit branches or
//! jumps against those addresses. Branches to addresses that are not yet
//! known go through fixups (named labels) or [`PendingBranch`] handles
//! (anonymous forward branches), all of which must be resolved before
//! [`Emitter::finalize`] hands back the immutable [`Code`].
//!
//! Relative branches follow the 6502 convention: the displacement is added
//! to the address of the byte following the displacement field.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use crate::error::EmitError;

/// Highest address the CPU can reach, plus one.
pub const ADDRESS_LIMIT: u32 = 0x1_0000;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(0);

/// An absolute address in the emitted program.
///
/// Addresses are kept wider than 16 bits so that the position just past a
/// buffer ending at `$FFFF` is still representable; converting to a CPU
/// word is checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u32);

impl Address {
    pub const fn new(addr: u16) -> Self {
        Address(addr as u32)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// Offset by `delta` bytes.
    pub const fn offset(self, delta: u32) -> Self {
        Address(self.0 + delta)
    }

    /// The 16-bit word an absolute operand would hold.
    pub fn to_word(self) -> Result<u16, EmitError> {
        if self.0 >= ADDRESS_LIMIT {
            return Err(EmitError::RangeOverflow {
                what: "absolute address",
                value: self.0 as i64,
                min: 0,
                max: ADDRESS_LIMIT as i64 - 1,
            });
        }
        Ok(self.0 as u16)
    }
}

impl From<u16> for Address {
    fn from(addr: u16) -> Self {
        Address::new(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:04X}", self.0)
    }
}

/// Signed displacement from `from_instruction_end` to `target`.
///
/// `from_instruction_end` is the address right after the displacement
/// byte, i.e. the program counter once the branch has been fetched.
/// Anything outside `-128..=127` cannot be encoded and is rejected.
pub fn relative_displacement(
    target: Address,
    from_instruction_end: Address,
) -> Result<i8, EmitError> {
    let delta = target.0 as i64 - from_instruction_end.0 as i64;
    i8::try_from(delta).map_err(|_| EmitError::displacement(delta))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FixupKind {
    Relative,
    Absolute,
}

#[derive(Debug)]
struct Fixup {
    offset: usize,
    label: String,
    kind: FixupKind,
}

/// A forward branch whose displacement byte has not been written yet.
///
/// Only the emitter that issued it can bind it.
#[must_use = "a pending branch must be bound before finalize"]
#[derive(Debug, PartialEq, Eq)]
pub struct PendingBranch {
    session: u64,
    offset: usize,
}

impl PendingBranch {
    /// Buffer offset of the placeholder displacement byte.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// One emission session.
pub struct Emitter {
    session: u64,
    origin: u16,
    code: Vec<u8>,
    labels: HashMap<String, Address>,
    fixups: Vec<Fixup>,
    pending: BTreeSet<usize>,
    branches: Vec<(usize, Address)>,
}

impl Emitter {
    pub fn new(origin: u16) -> Self {
        Self {
            session: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            origin,
            code: Vec::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
            pending: BTreeSet::new(),
            branches: Vec::new(),
        }
    }

    pub fn origin(&self) -> u16 {
        self.origin
    }

    /// Bytes emitted so far.
    pub fn bytes(&self) -> &[u8] {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Current emit position
    pub fn pos(&self) -> Address {
        Address(self.origin as u32 + self.code.len() as u32)
    }

    /// Append one byte, rejecting values outside `0..=255`.
    pub fn append_byte(&mut self, value: impl Into<i64>) -> Result<(), EmitError> {
        let value = value.into();
        let byte = u8::try_from(value).map_err(|_| EmitError::byte(value))?;
        self.code.push(byte);
        Ok(())
    }

    /// Append a little-endian word, rejecting values outside `0..=$FFFF`.
    pub fn append_word(&mut self, value: impl Into<i64>) -> Result<(), EmitError> {
        let value = value.into();
        let word = u16::try_from(value).map_err(|_| EmitError::word(value))?;
        self.emit_word(word);
        Ok(())
    }

    /// Emit raw bytes
    pub fn emit(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    /// Emit a 16-bit word (little-endian)
    pub fn emit_word(&mut self, word: u16) {
        self.code.extend_from_slice(&word.to_le_bytes());
    }

    /// Snapshot of the current address. Has no effect on the buffer.
    pub fn mark_label(&self) -> Address {
        self.pos()
    }

    /// Define a named label at the current position.
    pub fn label(&mut self, name: &str) -> Result<Address, EmitError> {
        let addr = self.pos();
        if self.labels.contains_key(name) {
            return Err(EmitError::DuplicateLabel(name.to_string()));
        }
        debug!(label = name, addr = %addr, "label");
        self.labels.insert(name.to_string(), addr);
        Ok(addr)
    }

    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.labels.get(name).copied()
    }

    /// Append a displacement byte that lands on `target`.
    pub fn append_displacement(&mut self, target: Address) -> Result<(), EmitError> {
        let next = self.pos().offset(1);
        let disp = relative_displacement(target, next)?;
        self.branches.push((self.code.len(), target));
        self.code.push(disp as u8);
        Ok(())
    }

    /// Append an absolute little-endian address.
    pub fn append_address(&mut self, target: Address) -> Result<(), EmitError> {
        let word = target.to_word()?;
        self.emit_word(word);
        Ok(())
    }

    /// Relative branch to an address that is already known.
    pub fn branch_back(&mut self, opcode: u8, target: Address) -> Result<(), EmitError> {
        // Check before touching the buffer so a rejected branch leaves no opcode behind.
        relative_displacement(target, self.pos().offset(2))?;
        self.code.push(opcode);
        self.append_displacement(target)
    }

    /// Relative branch whose target is bound later.
    pub fn branch_forward(&mut self, opcode: u8) -> PendingBranch {
        self.code.push(opcode);
        let offset = self.code.len();
        self.code.push(0); // Placeholder
        self.pending.insert(offset);
        PendingBranch {
            session: self.session,
            offset,
        }
    }

    /// Bind a forward branch to the current position.
    pub fn bind(&mut self, pending: PendingBranch) -> Result<(), EmitError> {
        let here = self.pos();
        self.bind_to(pending, here)
    }

    /// Bind a forward branch to an explicit address.
    pub fn bind_to(&mut self, pending: PendingBranch, target: Address) -> Result<(), EmitError> {
        if pending.session != self.session || !self.pending.contains(&pending.offset) {
            return Err(EmitError::ForeignBranch {
                offset: pending.offset,
            });
        }
        let next = self.address_at(pending.offset + 1);
        let disp = relative_displacement(target, next)?;
        trace!(offset = pending.offset, target = %target, disp, "bind forward branch");
        self.pending.remove(&pending.offset);
        self.code[pending.offset] = disp as u8;
        self.branches.push((pending.offset, target));
        Ok(())
    }

    /// Relative branch to a named label, resolved at finalize.
    pub fn branch(&mut self, opcode: u8, name: &str) {
        self.code.push(opcode);
        self.fixup(name, FixupKind::Relative);
        self.code.push(0);
    }

    /// Opcode plus absolute address of a named label, resolved at finalize.
    pub fn jump(&mut self, opcode: u8, name: &str) {
        self.code.push(opcode);
        self.fixup(name, FixupKind::Absolute);
        self.emit_word(0);
    }

    /// Opcode plus absolute address that is already known.
    pub fn jump_to(&mut self, opcode: u8, target: Address) -> Result<(), EmitError> {
        let word = target.to_word()?;
        self.code.push(opcode);
        self.emit_word(word);
        Ok(())
    }

    fn fixup(&mut self, name: &str, kind: FixupKind) {
        self.fixups.push(Fixup {
            offset: self.code.len(),
            label: name.to_string(),
            kind,
        });
    }

    fn address_at(&self, offset: usize) -> Address {
        Address(self.origin as u32 + offset as u32)
    }

    /// Resolve all fixups
    fn resolve_fixups(&mut self) -> Result<(), EmitError> {
        for fixup in std::mem::take(&mut self.fixups) {
            let addr = self
                .address_of(&fixup.label)
                .ok_or_else(|| EmitError::UnresolvedReference {
                    target: fixup.label.clone(),
                    offset: fixup.offset,
                })?;
            trace!(label = %fixup.label, offset = fixup.offset, addr = %addr, "resolve fixup");
            match fixup.kind {
                FixupKind::Relative => {
                    let disp = relative_displacement(addr, self.address_at(fixup.offset + 1))?;
                    self.code[fixup.offset] = disp as u8;
                    self.branches.push((fixup.offset, addr));
                }
                FixupKind::Absolute => {
                    let [lo, hi] = addr.to_word()?.to_le_bytes();
                    self.code[fixup.offset] = lo;
                    self.code[fixup.offset + 1] = hi;
                }
            }
        }
        Ok(())
    }

    /// Resolve everything outstanding and freeze the buffer.
    pub fn finalize(mut self) -> Result<Code, EmitError> {
        if let Some(&offset) = self.pending.iter().next() {
            return Err(EmitError::UnresolvedReference {
                target: "forward branch".to_string(),
                offset,
            });
        }
        self.resolve_fixups()?;
        self.branches.sort_unstable();
        debug!(
            origin = %Address::new(self.origin),
            len = self.code.len(),
            labels = self.labels.len(),
            branches = self.branches.len(),
            "finalized"
        );
        Ok(Code {
            origin: self.origin,
            bytes: self.code,
            labels: self.labels,
            branches: self.branches,
        })
    }
}

/// A finalized, immutable code buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    origin: u16,
    bytes: Vec<u8>,
    labels: HashMap<String, Address>,
    branches: Vec<(usize, Address)>,
}

impl Code {
    pub fn origin(&self) -> u16 {
        self.origin
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Address one past the last byte.
    pub fn end(&self) -> Address {
        Address(self.origin as u32 + self.bytes.len() as u32)
    }

    pub fn label(&self, name: &str) -> Option<Address> {
        self.labels.get(name).copied()
    }

    /// Every relative displacement field as `(buffer offset, intended target)`,
    /// in buffer order.
    pub fn branches(&self) -> &[(usize, Address)] {
        &self.branches
    }

    /// Where the CPU lands when taking the branch whose displacement byte
    /// sits at `offset`.
    pub fn relative_target(&self, offset: usize) -> Option<Address> {
        let disp = *self.bytes.get(offset)? as i8;
        let next = self.origin as i64 + offset as i64 + 1;
        u32::try_from(next + disp as i64).ok().map(Address)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BNE: u8 = 0xD0;
    const JMP: u8 = 0x4C;

    #[test]
    fn test_append_byte_range() {
        let mut em = Emitter::new(0x0600);
        em.append_byte(0).unwrap();
        em.append_byte(0xFF).unwrap();
        assert_eq!(em.append_byte(256), Err(EmitError::byte(256)));
        assert_eq!(em.append_byte(-1), Err(EmitError::byte(-1)));
        assert_eq!(em.bytes(), &[0x00, 0xFF]);
    }

    #[test]
    fn test_append_word_little_endian() {
        let mut em = Emitter::new(0x0600);
        em.append_word(0x1234).unwrap();
        em.append_word(0xFFFF).unwrap();
        assert_eq!(em.bytes(), &[0x34, 0x12, 0xFF, 0xFF]);
        assert_eq!(em.append_word(0x1_0000), Err(EmitError::word(0x1_0000)));
        assert_eq!(em.len(), 4);
    }

    #[test]
    fn test_mark_label_is_pure() {
        let mut em = Emitter::new(0x0600);
        em.emit(&[0xA9, 0x00]);
        let a = em.mark_label();
        let b = em.mark_label();
        assert_eq!(a, b);
        assert_eq!(a, Address::new(0x0602));
        assert_eq!(em.len(), 2);
    }

    #[test]
    fn test_displacement_bounds() {
        let from = Address::new(0x0700);
        assert_eq!(relative_displacement(Address::new(0x077F), from), Ok(127));
        assert_eq!(relative_displacement(Address::new(0x0680), from), Ok(-128));
        assert_eq!(
            relative_displacement(Address::new(0x0780), from),
            Err(EmitError::displacement(128))
        );
        assert_eq!(
            relative_displacement(Address::new(0x067F), from),
            Err(EmitError::displacement(-129))
        );
    }

    #[test]
    fn test_backward_branch_to_self() {
        let mut em = Emitter::new(0x0600);
        em.emit(&[0xA9, 0x00]);
        let mark = em.mark_label();
        em.branch_back(BNE, mark).unwrap();
        let code = em.finalize().unwrap();
        assert_eq!(code.bytes(), &[0xA9, 0x00, BNE, 0xFE]);
        assert_eq!(code.relative_target(3), Some(mark));
    }

    #[test]
    fn test_backward_branch_over_ten_bytes() {
        let mut em = Emitter::new(0x0600);
        em.emit(&[0xA9, 0x00]);
        let mark = em.mark_label();
        em.emit(&[0xEA; 10]);
        em.branch_back(BNE, mark).unwrap();
        let code = em.finalize().unwrap();
        // mark = $0602, next instruction = $060E
        assert_eq!(code.bytes()[13], 0xF4);
        assert_eq!(code.relative_target(13), Some(mark));
    }

    #[test]
    fn test_rejected_branch_leaves_buffer_untouched() {
        let mut em = Emitter::new(0x0600);
        let mark = em.mark_label();
        em.emit(&[0xEA; 300]);
        assert!(matches!(
            em.branch_back(BNE, mark),
            Err(EmitError::RangeOverflow { .. })
        ));
        assert_eq!(em.len(), 300);
    }

    #[test]
    fn test_forward_branch_bind() {
        let mut em = Emitter::new(0x0600);
        let skip = em.branch_forward(0xF0);
        em.emit(&[0xEA, 0xEA, 0xEA]);
        em.bind(skip).unwrap();
        em.emit(&[0x60]);
        let code = em.finalize().unwrap();
        assert_eq!(code.bytes(), &[0xF0, 0x03, 0xEA, 0xEA, 0xEA, 0x60]);
        assert_eq!(code.branches(), &[(1, Address::new(0x0605))]);
    }

    #[test]
    fn test_bind_branch_from_other_session() {
        let mut a = Emitter::new(0x0600);
        let pending = a.branch_forward(0xF0);
        let mut b = Emitter::new(0x0600);
        b.emit(&[0xA9, 0x42, 0xEA]);
        assert_eq!(b.bind(pending), Err(EmitError::ForeignBranch { offset: 1 }));
        let code = b.finalize().unwrap();
        assert_eq!(code.bytes(), &[0xA9, 0x42, 0xEA]);
        assert!(code.branches().is_empty());
    }

    #[test]
    fn test_bind_branch_past_end_of_other_session() {
        let mut a = Emitter::new(0x0600);
        a.emit(&[0xEA; 10]);
        let pending = a.branch_forward(0xF0);
        assert_eq!(pending.offset(), 11);
        let mut b = Emitter::new(0x0600);
        b.emit(&[0xEA, 0xEA]);
        assert_eq!(
            b.bind_to(pending, Address::new(0x0600)),
            Err(EmitError::ForeignBranch { offset: 11 })
        );
        assert_eq!(b.bytes(), &[0xEA, 0xEA]);
        // The issuing session is still waiting on its own branch.
        assert!(matches!(
            a.finalize(),
            Err(EmitError::UnresolvedReference { offset: 11, .. })
        ));
    }

    #[test]
    fn test_unbound_forward_branch() {
        let mut em = Emitter::new(0x0600);
        let _pending = em.branch_forward(BNE);
        assert_eq!(
            em.finalize(),
            Err(EmitError::UnresolvedReference {
                target: "forward branch".to_string(),
                offset: 1
            })
        );
    }

    #[test]
    fn test_named_fixups() {
        let mut em = Emitter::new(0x0600);
        em.label("start").unwrap();
        em.branch(0xF0, "done");
        em.emit(&[0xE8]);
        em.jump(JMP, "start");
        em.label("done").unwrap();
        em.emit(&[0x60]);
        let code = em.finalize().unwrap();
        assert_eq!(code.bytes(), &[0xF0, 0x04, 0xE8, JMP, 0x00, 0x06, 0x60]);
        assert_eq!(code.label("done"), Some(Address::new(0x0606)));
    }

    #[test]
    fn test_undefined_label() {
        let mut em = Emitter::new(0x0600);
        em.emit(&[0xEA]);
        em.jump(JMP, "nowhere");
        assert_eq!(
            em.finalize(),
            Err(EmitError::UnresolvedReference {
                target: "nowhere".to_string(),
                offset: 2
            })
        );
    }

    #[test]
    fn test_duplicate_label() {
        let mut em = Emitter::new(0x0600);
        em.label("loop").unwrap();
        em.emit(&[0xEA]);
        assert_eq!(
            em.label("loop"),
            Err(EmitError::DuplicateLabel("loop".to_string()))
        );
        assert_eq!(em.address_of("loop"), Some(Address::new(0x0600)));
    }

    #[test]
    fn test_named_branch_out_of_range() {
        let mut em = Emitter::new(0x0600);
        em.label("far").unwrap();
        em.emit(&[0xEA; 300]);
        em.branch(BNE, "far");
        assert!(matches!(
            em.finalize(),
            Err(EmitError::RangeOverflow { value: -302, .. })
        ));
    }

    #[test]
    fn test_address_word_conversion() {
        assert_eq!(Address::new(0xFFFF).to_word(), Ok(0xFFFF));
        assert_eq!(
            Address::new(0xFFFF).offset(1).to_word(),
            Err(EmitError::RangeOverflow {
                what: "absolute address",
                value: ADDRESS_LIMIT as i64,
                min: 0,
                max: 0xFFFF
            })
        );
        assert_eq!(Address::new(0x0600).to_string(), "$0600");
    }
}

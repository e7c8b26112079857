//! Flat 64KB memory image.
//!
//! File offset `N` maps to CPU address `N`, so the image can be loaded as a
//! whole by an emulator without a separate load address.

use std::ops::Range;

use tracing::debug;

use crate::emitter::{Address, Code, ADDRESS_LIMIT};
use crate::error::EmitError;

/// Size of the full 6502 address space.
pub const IMAGE_SIZE: usize = ADDRESS_LIMIT as usize;

#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    bytes: Vec<u8>,
}

impl Image {
    /// Pack a finalized code buffer at its own origin.
    pub fn from_code(code: &Code) -> Result<Self, EmitError> {
        pack(code.bytes(), code.origin())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn read(&self, addr: u16) -> u8 {
        self.bytes[addr as usize]
    }

    pub fn read_word(&self, addr: u16) -> u16 {
        let lo = self.read(addr);
        let hi = self.read(addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = self.bytes.iter().filter(|&&b| b != 0).count();
        f.debug_struct("Image")
            .field("len", &self.bytes.len())
            .field("nonzero", &used)
            .finish()
    }
}

/// Place `buffer` at `origin` in a zeroed 64KB image.
pub fn pack(buffer: &[u8], origin: u16) -> Result<Image, EmitError> {
    let range = placement(buffer.len(), origin)?;
    let mut bytes = vec![0u8; IMAGE_SIZE];
    bytes[range].copy_from_slice(buffer);
    debug!(origin = %Address::new(origin), size = buffer.len(), "packed image");
    Ok(Image { bytes })
}

/// Image range covered by `len` bytes loaded at `origin`.
pub fn placement(len: usize, origin: u16) -> Result<Range<usize>, EmitError> {
    let start = origin as usize;
    let end = start + len;
    if end > IMAGE_SIZE {
        return Err(EmitError::RangeOverflow {
            what: "image placement",
            value: end as i64,
            min: 0,
            max: IMAGE_SIZE as i64,
        });
    }
    Ok(start..end)
}

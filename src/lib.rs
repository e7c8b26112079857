//! kz65_emit - hand-encoded 6502 demo programs
//!
//! Emits small 6502 programs byte by byte, resolves their branch and jump
//! targets, and packs the result into a flat 64KB memory image that an
//! emulator can load as-is.

pub mod codegen;
pub mod config;
pub mod emitter;
pub mod error;
pub mod image;
pub mod program;

pub use codegen::CodeGen;
pub use config::{parse_address, Demo, EmitConfig, DEFAULT_ORIGIN};
pub use emitter::{relative_displacement, Address, Code, Emitter, PendingBranch};
pub use error::EmitError;
pub use image::{pack, Image, IMAGE_SIZE};
pub use program::{Instruction, Program};

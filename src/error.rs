//! Error taxonomy for emission and packing.
//!
//! Every error aborts the emission session: there is no partial image.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    /// A byte or word literal outside its numeric range.
    #[error("{kind} literal {value} is out of range 0..={max}")]
    Range {
        kind: &'static str,
        value: i64,
        max: u16,
    },

    /// A branch displacement, address, or image placement that does not fit.
    #[error("{what} overflows its range: {value} not in {min}..={max}")]
    RangeOverflow {
        what: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// A fixup or forward branch still outstanding at finalize.
    #[error("unresolved reference to {target} at buffer offset {offset}")]
    UnresolvedReference { target: String, offset: usize },

    /// A pending branch bound into an emitter that did not issue it.
    #[error("forward branch at buffer offset {offset} does not belong to this emitter")]
    ForeignBranch { offset: usize },

    #[error("label `{0}` is already defined")]
    DuplicateLabel(String),

    #[error("invalid address `{0}`: expected 16-bit hex like $0600 or 0x0600")]
    InvalidAddress(String),
}

impl EmitError {
    pub(crate) fn byte(value: i64) -> Self {
        EmitError::Range {
            kind: "byte",
            value,
            max: 0xFF,
        }
    }

    pub(crate) fn word(value: i64) -> Self {
        EmitError::Range {
            kind: "word",
            value,
            max: 0xFFFF,
        }
    }

    pub(crate) fn displacement(value: i64) -> Self {
        EmitError::RangeOverflow {
            what: "branch displacement",
            value,
            min: i8::MIN as i64,
            max: i8::MAX as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            EmitError::byte(256).to_string(),
            "byte literal 256 is out of range 0..=255"
        );
        assert_eq!(
            EmitError::displacement(128).to_string(),
            "branch displacement overflows its range: 128 not in -128..=127"
        );
        assert_eq!(
            EmitError::UnresolvedReference {
                target: "main_loop".to_string(),
                offset: 3
            }
            .to_string(),
            "unresolved reference to main_loop at buffer offset 3"
        );
    }
}

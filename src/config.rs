//! Emission settings handed to the core as plain values.

use std::fmt;
use std::path::PathBuf;

use crate::error::EmitError;

/// Default load origin, just past the display memory at `$0200-$05FF`.
pub const DEFAULT_ORIGIN: u16 = 0x0600;

/// Which demo program to emit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Demo {
    /// Scrolling fill pattern
    #[default]
    Pattern,
    /// Per-cell coloured blocks
    Animated,
}

impl Demo {
    pub fn file_name(self) -> &'static str {
        match self {
            Demo::Pattern => "pattern_demo.bin",
            Demo::Animated => "animated_pattern.bin",
        }
    }
}

impl fmt::Display for Demo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Demo::Pattern => f.write_str("pattern"),
            Demo::Animated => f.write_str("animated"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmitConfig {
    pub origin: u16,
    pub output: PathBuf,
    pub demo: Demo,
}

impl EmitConfig {
    pub fn new(demo: Demo, origin: u16, output: Option<PathBuf>) -> Self {
        Self {
            origin,
            output: output.unwrap_or_else(|| PathBuf::from(demo.file_name())),
            demo,
        }
    }
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self::new(Demo::default(), DEFAULT_ORIGIN, None)
    }
}

/// Parse a 16-bit hex address: `$0600`, `0x0600` or bare `0600`.
pub fn parse_address(text: &str) -> Result<u16, EmitError> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix('$')
        .or_else(|| trimmed.strip_prefix("0x"))
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || digits.len() > 4 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(EmitError::InvalidAddress(text.to_string()));
    }
    u16::from_str_radix(digits, 16).map_err(|_| EmitError::InvalidAddress(text.to_string()))
}

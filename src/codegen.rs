//! 6502 code generator for the display demos
//!
//! Memory Layout:
//!   0x0010         Frame counter
//!   0x0011         Scratch (animated demo)
//!   0x0020-0x0021  Display pointer (lo, hi)
//!   0x0022-0x0023  Cell pointer (animated demo)
//!   0x0200-0x05FF  Display, 32x32 cells, one byte per cell
//!   0x0600-        Program (default origin)
//!
//! Both programs loop forever: paint the whole display from the frame
//! counter, spin in a delay loop, bump the frame counter, jump back.

use tracing::debug;

use crate::config::Demo;
use crate::emitter::Code;
use crate::error::EmitError;
use crate::program::Program;

// Zero page
const FRAME: u8 = 0x10;
const TEMP: u8 = 0x11;
const PTR_LO: u8 = 0x20;
const PTR_HI: u8 = 0x21;
const CELL_LO: u8 = 0x22;
const CELL_HI: u8 = 0x23;

// Display
const DISPLAY_START: u16 = 0x0200;
const DISPLAY_END_PAGE: u8 = 0x06;  // First page past the display
const DISPLAY_PAGES: u8 = 4;        // 1024 bytes
const GRID_COLS: u8 = 32;

// Colour
const COLOR_MASK: u8 = 0x0F;        // 16 colours
const BRIGHT: u8 = 0x10;

// Delay loop trip counts
const PATTERN_DELAY: u8 = 0x20;
const ANIMATED_DELAY: u8 = 0x08;

// Opcodes used by the demos
const ADC_IMM: u8 = 0x69;
const ADC_ZP: u8 = 0x65;
const AND_IMM: u8 = 0x29;
const ASL_A: u8 = 0x0A;
const BCC: u8 = 0x90;
const BNE: u8 = 0xD0;
const CLC: u8 = 0x18;
const CMP_IMM: u8 = 0xC9;
const CPX_IMM: u8 = 0xE0;
const INC_ZP: u8 = 0xE6;
const INX: u8 = 0xE8;
const INY: u8 = 0xC8;
const JMP_ABS: u8 = 0x4C;
const LDA_IMM: u8 = 0xA9;
const LDA_ZP: u8 = 0xA5;
const LDX_IMM: u8 = 0xA2;
const LDY_IMM: u8 = 0xA0;
const NOP: u8 = 0xEA;
const ORA_IMM: u8 = 0x09;
const PHA: u8 = 0x48;
const PLA: u8 = 0x68;
const STA_IND_Y: u8 = 0x91;
const STA_ZP: u8 = 0x85;
const TXA: u8 = 0x8A;
const TYA: u8 = 0x98;

pub struct CodeGen {
    demo: Demo,
    program: Program,
}

impl CodeGen {
    pub fn new(demo: Demo, origin: u16) -> Self {
        Self {
            demo,
            program: Program::new(origin),
        }
    }

    /// Emit raw bytes
    fn emit(&mut self, bytes: &[u8]) {
        self.program.emit(bytes);
    }

    /// Define a label at current position
    fn label(&mut self, name: &str) {
        self.program.label(name);
    }

    /// Relative branch to a label
    fn branch(&mut self, opcode: u8, name: &str) {
        self.program.branch(opcode, name);
    }

    /// Absolute jump to a label
    fn jump(&mut self, opcode: u8, name: &str) {
        self.program.jump(opcode, name);
    }

    /// Generate the selected demo
    pub fn generate(&mut self) {
        match self.demo {
            Demo::Pattern => self.emit_pattern_demo(),
            Demo::Animated => self.emit_animated_demo(),
        }
        debug!(demo = %self.demo, size = self.program.size(), "generated");
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Resolve labels into the final code buffer
    pub fn into_code(self) -> Result<Code, EmitError> {
        self.program.assemble()
    }

    fn emit_pattern_demo(&mut self) {
        self.emit_frame_init();

        self.label("main_loop");
        self.emit_display_pointer();
        self.emit(&[LDX_IMM, 0x00]); // LDX #$00 (page count)
        self.emit(&[LDY_IMM, 0x00]); // LDY #$00

        self.label("fill_loop");
        self.emit(&[TYA]);           // TYA
        self.emit(&[CLC]);           // CLC
        self.emit(&[ADC_ZP, FRAME]); // ADC frame
        self.emit(&[ADC_ZP, PTR_LO]); // ADC ptr lo
        self.emit(&[STA_IND_Y, PTR_LO]); // STA (ptr),Y
        self.emit(&[INY]);           // INY
        self.branch(BNE, "fill_loop");

        // Next page
        self.emit(&[INC_ZP, PTR_HI]); // INC ptr hi
        self.emit(&[INX]);           // INX
        self.emit(&[CPX_IMM, DISPLAY_PAGES]);
        self.branch(BNE, "fill_loop");

        self.emit(&[LDX_IMM, 0x00]);
        self.emit(&[LDY_IMM, 0x00]);
        self.label("delay_inner");
        self.emit(&[NOP, NOP, NOP, NOP]);
        self.emit(&[INY]);
        self.branch(BNE, "delay_inner");
        self.emit(&[INX]);
        self.emit(&[CPX_IMM, PATTERN_DELAY]);
        self.branch(BNE, "delay_inner");

        self.emit_next_frame();
    }

    fn emit_animated_demo(&mut self) {
        self.emit_frame_init();

        self.label("main_loop");
        self.emit_display_pointer();
        self.emit(&[LDY_IMM, 0x00]); // LDY #$00 (row)

        self.label("row_loop");
        self.emit(&[LDX_IMM, 0x00]); // LDX #$00 (column)

        self.label("col_loop");
        // A = ((X + frame) + Y) & $0F | $10
        self.emit(&[TXA]);
        self.emit(&[CLC]);
        self.emit(&[ADC_ZP, FRAME]);
        self.emit(&[STA_ZP, TEMP]);
        self.emit(&[TYA]);
        self.emit(&[CLC]);
        self.emit(&[ADC_ZP, TEMP]);
        self.emit(&[AND_IMM, COLOR_MASK]);
        self.emit(&[ORA_IMM, BRIGHT]);
        self.emit(&[PHA]);           // Save colour

        // cell = ptr + Y * 32
        self.emit(&[TYA]);
        self.emit(&[ASL_A, ASL_A, ASL_A, ASL_A, ASL_A]);
        self.emit(&[CLC]);
        self.emit(&[ADC_ZP, PTR_LO]);
        self.emit(&[STA_ZP, CELL_LO]);
        self.emit(&[LDA_ZP, PTR_HI]);
        self.emit(&[ADC_IMM, 0x00]); // Carry into hi
        self.emit(&[STA_ZP, CELL_HI]);

        // cell += X
        self.emit(&[TXA]);
        self.emit(&[CLC]);
        self.emit(&[ADC_ZP, CELL_LO]);
        self.emit(&[STA_ZP, CELL_LO]);
        self.emit(&[LDA_ZP, CELL_HI]);
        self.emit(&[ADC_IMM, 0x00]);
        self.emit(&[STA_ZP, CELL_HI]);

        self.emit(&[PLA]);           // Restore colour
        self.emit(&[LDY_IMM, 0x00]); // Y clobbered: row index is lost here
        self.emit(&[STA_IND_Y, CELL_LO]); // STA (cell),Y

        self.emit(&[INX]);
        self.emit(&[CPX_IMM, GRID_COLS]);
        self.branch(BNE, "col_loop");

        // ptr += 32
        self.emit(&[CLC]);
        self.emit(&[LDA_ZP, PTR_LO]);
        self.emit(&[ADC_IMM, GRID_COLS]);
        self.emit(&[STA_ZP, PTR_LO]);
        self.emit(&[LDA_ZP, PTR_HI]);
        self.emit(&[ADC_IMM, 0x00]);
        self.emit(&[STA_ZP, PTR_HI]);

        self.emit(&[LDA_ZP, PTR_HI]);
        self.emit(&[CMP_IMM, DISPLAY_END_PAGE]);
        self.branch(BCC, "row_loop");

        self.emit(&[LDX_IMM, 0x00]);
        self.label("delay_outer");
        self.emit(&[LDY_IMM, 0x00]);
        self.label("delay_inner");
        self.emit(&[NOP]);
        self.emit(&[INY]);
        self.branch(BNE, "delay_inner");
        self.emit(&[INX]);
        self.emit(&[CPX_IMM, ANIMATED_DELAY]);
        self.branch(BNE, "delay_outer");

        self.emit_next_frame();
    }

    /// frame = 0
    fn emit_frame_init(&mut self) {
        self.emit(&[LDA_IMM, 0x00]);
        self.emit(&[STA_ZP, FRAME]);
    }

    /// ptr = DISPLAY_START
    fn emit_display_pointer(&mut self) {
        let [lo, hi] = DISPLAY_START.to_le_bytes();
        self.emit(&[LDA_IMM, lo]);
        self.emit(&[STA_ZP, PTR_LO]);
        self.emit(&[LDA_IMM, hi]);
        self.emit(&[STA_ZP, PTR_HI]);
    }

    /// frame += 1, back to the top
    fn emit_next_frame(&mut self) {
        self.emit(&[INC_ZP, FRAME]);
        self.jump(JMP_ABS, "main_loop");
    }
}

/// Generate and resolve one demo program.
pub fn generate(demo: Demo, origin: u16) -> Result<Code, EmitError> {
    let mut codegen = CodeGen::new(demo, origin);
    codegen.generate();
    codegen.into_code()
}

//! The built-in acceptance program.
//!
//! A short arithmetic chain (4 + 4 + 5 - 1) whose result lands at a known
//! address; the headless driver runs it when invoked without a program.

use comtran_core::machine::MachineState;

/// The memory cell the program stores its result into.
pub const RESULT_ADDRESS: u16 = 0x21;

/// The value the cell must hold after a correct run.
pub const EXPECTED_VALUE: u8 = 0x0C;

/// Reset the machine and load the acceptance program at address zero.
pub fn load(state: &mut MachineState) {
    state.reset();
    state.memory.clear();

    let program = [
        0x20, 0x20, // LDA 0x20
        0x60, 0x20, // ADD 0x20
        0x60, 0x23, // ADD 0x23
        0x68, 0x22, // SUB 0x22
        0x48, 0x21, // STA 0x21
        0x98, 0x00, // BST 0x00
    ];
    for (offset, value) in program.iter().enumerate() {
        state.memory.write(offset as u16, *value);
    }

    state.memory.write(0x20, 0x04);
    state.memory.write(0x21, 0x00);
    state.memory.write(0x22, 0x01);
    state.memory.write(0x23, 0x05);
    state.regs.set_par(0x000);
}

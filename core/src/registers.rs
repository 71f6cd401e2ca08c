//! The register file of the CT-10.
//!
//! Every register has a fixed hardware width and every store is truncated to
//! that width. Most registers are a full byte wide; the two address registers
//! carry 10 bits to span the 1 KiB memory, and the distributor display
//! register carries the 4-bit distributor count.

use arbitrary_int::{u10, u4};

/// The data registers of the CT-10.
#[derive(Debug, Clone)]
pub struct Registers {
    /// The 8-bit `A` accumulator, the primary arithmetic register.
    pub accumulator: u8,
    /// The 8-bit `B` buffer register, staging memory operands.
    pub buffer: u8,
    /// The 8-bit `Q` quotient register.
    ///
    /// This holds the low half of products and dividends and acts as the
    /// shift partner of the accumulator for the 16-bit shifts.
    pub quotient: u8,
    /// The 8-bit `X` index register, added to the effective address when
    /// bit 2 of the opcode is set.
    pub index: u8,
    /// The 8-bit `C` countdown register, holding one less than the byte
    /// count of an I/O transfer and the operand of the skip instructions.
    pub countdown: u8,
    /// The 10-bit `MAR` memory address register.
    pub mar: u10,
    /// The 10-bit `PAR` program address register (instruction pointer).
    pub par: u10,
    /// The 8-bit `OP` register holding the current opcode.
    pub opcode: u8,
    /// The 4-bit `D` register mirroring the timing distributor for display.
    pub distributor: u4,
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl Registers {
    /// Create a new (zeroed) register file.
    #[must_use]
    pub fn new() -> Self {
        Self {
            accumulator: 0,
            buffer: 0,
            quotient: 0,
            index: 0,
            countdown: 0,
            mar: u10::new(0),
            par: u10::new(0),
            opcode: 0,
            distributor: u4::new(0),
        }
    }

    /// Zero every register.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Load `MAR`, truncating the value to 10 bits.
    pub fn set_mar(&mut self, value: u16) {
        self.mar = u10::new(value & 0x3FF);
    }

    /// Load `PAR`, truncating the value to 10 bits.
    pub fn set_par(&mut self, value: u16) {
        self.par = u10::new(value & 0x3FF);
    }

    /// Increment `PAR` modulo the address space.
    pub fn advance_par(&mut self) {
        self.set_par(self.par.value().wrapping_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_registers_truncate_to_ten_bits() {
        let mut regs = Registers::new();
        regs.set_mar(0xFFFF);
        assert_eq!(regs.mar.value(), 0x3FF);
        regs.set_par(0x412);
        assert_eq!(regs.par.value(), 0x012);
    }

    #[test]
    fn par_increment_wraps() {
        let mut regs = Registers::new();
        regs.set_par(0x3FF);
        regs.advance_par();
        assert_eq!(regs.par.value(), 0x000);
    }
}

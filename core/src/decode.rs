//! The CT-10 instruction decoder.
//!
//! Maps opcodes to mnemonics and addressing modes, and back again for the
//! text loader. Immediate/control instructions match on the full opcode
//! byte; paged memory-operand instructions match on the family base
//! (`opcode & 0xF8`), leaving the low three bits for the page and index
//! selects.

/// How an instruction finds its operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    /// One operand byte follows the opcode.
    Immediate,
    /// The operand byte forms an effective address together with the
    /// opcode's page bits (and optionally the index register).
    Paged,
    /// Not an instruction the control unit implements.
    Unknown,
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// The opcode byte as decoded.
    pub opcode: u8,
    /// The assembler mnemonic.
    pub mnemonic: &'static str,
    /// How the operand is found.
    pub mode: AddressingMode,
    /// Whether executing the instruction stops the clock.
    pub halts: bool,
}

/// The 44 implemented opcodes: mnemonic, base opcode, addressing mode and
/// halt behavior, in opcode order.
const OPCODES: [(&str, u8, AddressingMode, bool); 44] = [
    ("SST", 0x00, AddressingMode::Immediate, false),
    ("LCI", 0x01, AddressingMode::Immediate, false),
    ("LAI", 0x02, AddressingMode::Immediate, false),
    ("INX", 0x03, AddressingMode::Immediate, false),
    ("SKI", 0x08, AddressingMode::Immediate, false),
    ("SKS", 0x09, AddressingMode::Immediate, false),
    ("SKF", 0x0A, AddressingMode::Immediate, false),
    ("SLA", 0x0B, AddressingMode::Immediate, false),
    ("SRA", 0x10, AddressingMode::Immediate, false),
    ("OCD", 0x11, AddressingMode::Immediate, false),
    ("LXI", 0x12, AddressingMode::Immediate, false),
    ("SLL", 0x13, AddressingMode::Immediate, false),
    ("SRL", 0x18, AddressingMode::Immediate, false),
    ("AND", 0x19, AddressingMode::Immediate, false),
    ("IOR", 0x1A, AddressingMode::Immediate, false),
    ("XOR", 0x1B, AddressingMode::Immediate, false),
    ("FLC", 0x28, AddressingMode::Immediate, false),
    ("FLS", 0xF8, AddressingMode::Immediate, false),
    ("LDA", 0x20, AddressingMode::Paged, false),
    ("LCC", 0x30, AddressingMode::Paged, false),
    ("LAN", 0x38, AddressingMode::Paged, false),
    ("LDQ", 0x40, AddressingMode::Paged, false),
    ("STA", 0x48, AddressingMode::Paged, false),
    ("STX", 0x50, AddressingMode::Paged, false),
    ("STQ", 0x58, AddressingMode::Paged, false),
    ("ADD", 0x60, AddressingMode::Paged, false),
    ("SUB", 0x68, AddressingMode::Paged, false),
    ("MPY", 0x70, AddressingMode::Paged, false),
    ("DIV", 0x78, AddressingMode::Paged, false),
    ("RAO", 0x80, AddressingMode::Paged, false),
    ("RSO", 0x88, AddressingMode::Paged, false),
    ("BUN", 0x90, AddressingMode::Paged, false),
    ("BST", 0x98, AddressingMode::Paged, true),
    ("BSB", 0xA0, AddressingMode::Paged, false),
    ("BPS", 0xA8, AddressingMode::Paged, false),
    ("BZE", 0xB0, AddressingMode::Paged, false),
    ("BNG", 0xB8, AddressingMode::Paged, false),
    ("BNC", 0xC0, AddressingMode::Paged, false),
    ("BXZ", 0xC8, AddressingMode::Paged, false),
    ("WDB", 0xD0, AddressingMode::Paged, false),
    ("MNO", 0xD8, AddressingMode::Paged, false),
    ("RDB", 0xE0, AddressingMode::Paged, false),
    ("RDI", 0xE8, AddressingMode::Paged, false),
    ("MNI", 0xF0, AddressingMode::Paged, false),
];

/// Decode an opcode byte.
///
/// Unknown opcodes come back with the `???` mnemonic and
/// [`AddressingMode::Unknown`].
#[must_use]
pub fn decode(opcode: u8) -> Instruction {
    let exact = OPCODES
        .iter()
        .find(|(_, base, mode, _)| *mode == AddressingMode::Immediate && *base == opcode);
    let entry = exact.or_else(|| {
        OPCODES
            .iter()
            .find(|(_, base, mode, _)| *mode == AddressingMode::Paged && *base == opcode & 0xF8)
    });

    entry.map_or(
        Instruction {
            opcode,
            mnemonic: "???",
            mode: AddressingMode::Unknown,
            halts: false,
        },
        |&(mnemonic, _, mode, halts)| Instruction {
            opcode,
            mnemonic,
            mode,
            halts,
        },
    )
}

/// Look an instruction up by mnemonic, case-insensitively.
#[must_use]
pub fn from_mnemonic(name: &str) -> Option<Instruction> {
    OPCODES
        .iter()
        .find(|(mnemonic, _, _, _)| mnemonic.eq_ignore_ascii_case(name))
        .map(|&(mnemonic, opcode, mode, halts)| Instruction {
            opcode,
            mnemonic,
            mode,
            halts,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Define a test verifying the decode of a single opcode.
    macro_rules! opcode {
        ($name:ident, $op:literal, $mnemonic:literal, $mode:ident) => {
            #[test]
            fn $name() {
                let inst = decode($op);
                assert_eq!(inst.mnemonic, $mnemonic);
                assert_eq!(inst.mode, AddressingMode::$mode);
            }
        };
    }

    opcode!(sst, 0x00, "SST", Immediate);
    opcode!(lai, 0x02, "LAI", Immediate);
    opcode!(ocd, 0x11, "OCD", Immediate);
    opcode!(fls, 0xF8, "FLS", Immediate);
    opcode!(lda, 0x20, "LDA", Paged);
    opcode!(lda_paged_indexed, 0x27, "LDA", Paged);
    opcode!(sta, 0x48, "STA", Paged);
    opcode!(bst, 0x98, "BST", Paged);
    opcode!(mni, 0xF0, "MNI", Paged);
    opcode!(hole, 0x05, "???", Unknown);
    opcode!(hole_high, 0xFF, "???", Unknown);

    #[test]
    fn bst_is_the_only_halting_instruction() {
        for (mnemonic, base, _, halts) in OPCODES {
            assert_eq!(halts, mnemonic == "BST", "{mnemonic} {base:#04X}");
        }
    }

    #[test]
    fn mnemonic_lookup_is_case_insensitive() {
        assert_eq!(from_mnemonic("lda").unwrap().opcode, 0x20);
        assert_eq!(from_mnemonic("Lda").unwrap().opcode, 0x20);
        assert!(from_mnemonic("NOP").is_none());
    }

    #[test]
    fn table_covers_forty_four_instructions() {
        assert_eq!(OPCODES.len(), 44);
        // Exact matches win over family bases: 0x28 is FLC, not an LDA
        // family member.
        assert_eq!(decode(0x28).mnemonic, "FLC");
        assert_eq!(decode(0x29).mnemonic, "???");
    }
}

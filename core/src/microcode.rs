//! The CT-10's microcode: the elementary data-path actions and the static
//! table scheduling them.
//!
//! Every architectural instruction decomposes into an ordered list of
//! micro-operations, each pinned to a `(distributor, phase)` coordinate.
//! The table is a pure function of the opcode and never changes after
//! construction; an empty sequence marks an opcode the control unit does
//! not implement, which the execution engine surfaces as an instruction
//! error.

use std::sync::OnceLock;

use crate::timing::ClockPhase;

/// An elementary data-path action.
///
/// The names follow the machine's bus/register notation: `A` accumulator,
/// `B` buffer, `Q` quotient, `X` index, `C` countdown, `MAR`/`PAR` address
/// registers, and the `X`/`Y`/`Z`/`F` buses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroOp {
    /// Gate `PAR` onto the `Z` bus and latch it into `MAR`.
    ParToMar,
    /// Gate `MAR` into `PAR`.
    MarToPar,
    /// Drive the one's-complement of `memory[MAR]` onto the `Z` bus with the
    /// complemented flag set.
    MemToZ,
    /// Latch the `Z` bus into `B`, re-inverting if the bus is complemented.
    ZToBuffer,
    /// Latch `B` into `OP`.
    BufferToOpcode,
    /// Increment `PAR`, unless the panel's repeat switch is holding the
    /// current instruction.
    ParInc,
    /// Form the effective address: page bits of `OP` high, `B` low, into
    /// `MAR`.
    FormEffectiveAddress,
    /// Add `X` to `MAR` when bit 2 of `OP` is set.
    AddIndexToMar,
    /// Gate `A` onto the `Y` bus.
    AccToY,
    /// Gate `B` onto the `X` bus.
    BufferToX,
    /// Gate `B` onto the `F` bus.
    BufferToF,
    /// Latch the `F` bus into `A`.
    FToAcc,
    /// Drive the one's-complement of `A` onto the `Z` bus.
    AccToZ,
    /// Drive the one's-complement of `X` onto the `Z` bus.
    XToZ,
    /// Drive the one's-complement of `Q` onto the `Z` bus.
    QToZ,
    /// Gate `B` onto the `Y` bus.
    BufferToY,
    /// Write the `Y` bus into `memory[MAR]`.
    YToMem,
    /// Latch `B` into `A`.
    LoadAccFromBuffer,
    /// Latch `B` into `X`.
    LoadXFromBuffer,
    /// Latch `B` into `C`.
    LoadCFromBuffer,
    /// Latch `B` into `Q`.
    LoadQFromBuffer,
    /// Latch the two's-complement of `B` into `A`.
    LoadAccNegateBuffer,
    /// Write `A` into `memory[MAR]`.
    StoreAccToMem,
    /// Write `X` into `memory[MAR]`.
    StoreXToMem,
    /// Write `Q` into `memory[MAR]`.
    StoreQToMem,
    /// Copy `memory[MAR]` to `memory[MAR+1]`, leaving `MAR` at the
    /// destination.
    CopyMemToMemPlusOne,
    /// Add `B` into `X`.
    IncrementXByBuffer,
    /// Add the `Y` and `X` buses onto `F`, updating carry and overflow.
    AluAddToF,
    /// Subtract the `X` bus from the `Y` bus onto `F`, updating carry
    /// (borrow) and overflow.
    AluSubToF,
    /// `A := A & B`.
    AluAnd,
    /// `A := A | B`.
    AluIor,
    /// `A := A ^ B`.
    AluXor,
    /// Shift the 16-bit `A:Q` pair left by `B` places.
    ShiftSla,
    /// Shift the 16-bit `A:Q` pair right arithmetically by `B` places.
    ShiftSra,
    /// Shift `A` left logically by `B` places.
    ShiftSll,
    /// Shift `A` right logically by `B` places.
    ShiftSrl,
    /// Signed 8x8 multiply of `A` and `B`; high byte to `A`, low to `Q`.
    Multiply,
    /// Signed divide of `A:Q` by `B`; remainder to `A`, quotient to `Q`.
    Divide,
    /// Read `memory[MAR]`, add one, write back and load `A`.
    Rao,
    /// Read `memory[MAR]`, subtract one, write back and load `A`.
    Rso,
    /// Resolve the branch family by opcode base and condition.
    Branch,
    /// Load `C` from `B`; skip `2*B` bytes when the interrupt status is set,
    /// then clear the interrupt line.
    SkipIfInterrupt,
    /// Load `C` from `B`; skip `2*B` bytes when the sense status is set.
    SkipIfSense,
    /// Load `C` from `B`; skip `2*B` bytes when the program flag is set.
    SkipIfFlag,
    /// Set the program flag.
    FlagSet,
    /// Clear the program flag.
    FlagClear,
    /// Latch the packed I/O status byte into `A`.
    SenseStatus,
    /// Hand control to the I/O dispatcher (device command decode, transfer
    /// start-up).
    IoNoop,
    /// Derive zero/greater/less from `A`.
    UpdateFlags,
    /// Derive zero/greater/less from `Q`.
    UpdateFlagsQ,
    /// Derive zero/greater/less from the 16-bit `A:Q` pair.
    UpdateFlagsAq,
    /// Historical placeholder; overflow is computed inline by the ALU steps
    /// but the printed microcode listings reserve this row.
    UpdateOverflow,
    /// Stop the clock.
    Halt,
}

/// One scheduled micro-operation within an instruction's sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicroStep {
    /// The distributor count the step fires on.
    pub distributor: u8,
    /// The clock phase the step fires on.
    pub phase: ClockPhase,
    /// The action taken.
    pub op: MicroOp,
}

const fn step(distributor: u8, phase: ClockPhase, op: MicroOp) -> MicroStep {
    MicroStep {
        distributor,
        phase,
        op,
    }
}

/// The static microcode lookup.
///
/// Constructed once on first use; both entry points hand out slices into
/// the same immutable table.
#[derive(Debug)]
pub struct MicrocodeTable {
    acquisition: Vec<MicroStep>,
    execution: Vec<Vec<MicroStep>>,
}

impl MicrocodeTable {
    /// The fixed instruction-fetch sequence run during the acquisition half.
    #[must_use]
    pub fn acquisition() -> &'static [MicroStep] {
        &Self::get().acquisition
    }

    /// The execute-half sequence for an opcode.
    ///
    /// An empty slice marks an unimplemented opcode.
    #[must_use]
    pub fn execution(opcode: u8) -> &'static [MicroStep] {
        &Self::get().execution[usize::from(opcode)]
    }

    fn get() -> &'static Self {
        static TABLE: OnceLock<MicrocodeTable> = OnceLock::new();
        TABLE.get_or_init(Self::build)
    }

    fn build() -> Self {
        Self {
            acquisition: vec![
                step(0, ClockPhase::Cp1, MicroOp::ParToMar),
                step(0, ClockPhase::Cp2, MicroOp::MemToZ),
                step(0, ClockPhase::Cp3, MicroOp::ZToBuffer),
                step(1, ClockPhase::Cp1, MicroOp::BufferToOpcode),
                step(1, ClockPhase::Cp2, MicroOp::ParInc),
            ],
            execution: (0..=u8::MAX).map(sequence_for).collect(),
        }
    }
}

/// Fetch the immediate operand byte into `B` and advance `PAR` past it.
fn immediate_fetch() -> Vec<MicroStep> {
    vec![
        step(2, ClockPhase::Cp1, MicroOp::ParToMar),
        step(2, ClockPhase::Cp2, MicroOp::MemToZ),
        step(2, ClockPhase::Cp3, MicroOp::ZToBuffer),
        step(3, ClockPhase::Cp1, MicroOp::ParInc),
    ]
}

/// Fetch the operand byte, form the effective address in `MAR` and advance
/// `PAR` past the two-byte instruction.
fn address_only() -> Vec<MicroStep> {
    vec![
        step(2, ClockPhase::Cp1, MicroOp::ParToMar),
        step(2, ClockPhase::Cp2, MicroOp::MemToZ),
        step(2, ClockPhase::Cp3, MicroOp::ZToBuffer),
        step(3, ClockPhase::Cp1, MicroOp::FormEffectiveAddress),
        step(3, ClockPhase::Cp2, MicroOp::AddIndexToMar),
        step(3, ClockPhase::Cp3, MicroOp::ParInc),
    ]
}

/// Address formation followed by a memory operand read into `B`.
fn memory_operand() -> Vec<MicroStep> {
    let mut ops = address_only();
    ops.push(step(4, ClockPhase::Cp2, MicroOp::MemToZ));
    ops.push(step(4, ClockPhase::Cp3, MicroOp::ZToBuffer));
    ops
}

/// Immediate-form instruction: operand in `B`, one specialized action, one
/// flag refresh.
fn immediate(op: MicroOp, flags: MicroOp) -> Vec<MicroStep> {
    let mut ops = immediate_fetch();
    ops.push(step(3, ClockPhase::Cp2, op));
    ops.push(step(3, ClockPhase::Cp3, flags));
    ops
}

/// Memory-operand instruction: operand in `B`, one specialized action, one
/// flag refresh.
fn memory_tail(op: MicroOp, flags: MicroOp) -> Vec<MicroStep> {
    let mut ops = memory_operand();
    ops.push(step(5, ClockPhase::Cp1, op));
    ops.push(step(5, ClockPhase::Cp3, flags));
    ops
}

/// Store a register through the `Z` and `Y` buses into `memory[MAR]`.
fn store(source: MicroOp) -> Vec<MicroStep> {
    let mut ops = address_only();
    ops.push(step(4, ClockPhase::Cp2, source));
    ops.push(step(4, ClockPhase::Cp3, MicroOp::ZToBuffer));
    ops.push(step(5, ClockPhase::Cp1, MicroOp::BufferToY));
    ops.push(step(5, ClockPhase::Cp2, MicroOp::YToMem));
    ops.push(step(5, ClockPhase::Cp3, MicroOp::UpdateFlags));
    ops
}

/// Two-operand ALU instruction through the `Y`/`X`/`F` buses.
fn arithmetic(alu: MicroOp) -> Vec<MicroStep> {
    let mut ops = memory_operand();
    ops.push(step(5, ClockPhase::Cp1, MicroOp::AccToY));
    ops.push(step(5, ClockPhase::Cp2, MicroOp::BufferToX));
    ops.push(step(5, ClockPhase::Cp3, alu));
    ops.push(step(6, ClockPhase::Cp1, MicroOp::FToAcc));
    ops.push(step(6, ClockPhase::Cp2, MicroOp::UpdateOverflow));
    ops.push(step(6, ClockPhase::Cp3, MicroOp::UpdateFlags));
    ops
}

/// The memory-to-memory copy instruction `LCC`.
fn copy_cell() -> Vec<MicroStep> {
    let mut ops = address_only();
    ops.push(step(5, ClockPhase::Cp1, MicroOp::CopyMemToMemPlusOne));
    ops.push(step(5, ClockPhase::Cp3, MicroOp::UpdateFlags));
    ops
}

/// The branch family: resolve at D=4 after address formation.
fn branch() -> Vec<MicroStep> {
    let mut ops = address_only();
    ops.push(step(4, ClockPhase::Cp1, MicroOp::Branch));
    ops.push(step(4, ClockPhase::Cp3, MicroOp::UpdateFlags));
    ops
}

/// The memory-operand I/O family: hand off to the transfer controller.
fn io_memory() -> Vec<MicroStep> {
    let mut ops = address_only();
    ops.push(step(4, ClockPhase::Cp1, MicroOp::IoNoop));
    ops.push(step(4, ClockPhase::Cp3, MicroOp::UpdateFlags));
    ops
}

fn sequence_for(opcode: u8) -> Vec<MicroStep> {
    match opcode {
        // Immediate and control instructions match on the full byte.
        0x00 => immediate(MicroOp::SenseStatus, MicroOp::UpdateFlags),
        0x01 => immediate(MicroOp::LoadCFromBuffer, MicroOp::UpdateFlags),
        0x02 => immediate(MicroOp::LoadAccFromBuffer, MicroOp::UpdateFlags),
        0x03 => immediate(MicroOp::IncrementXByBuffer, MicroOp::UpdateFlags),
        0x08 => immediate(MicroOp::SkipIfInterrupt, MicroOp::UpdateFlags),
        0x09 => immediate(MicroOp::SkipIfSense, MicroOp::UpdateFlags),
        0x0A => immediate(MicroOp::SkipIfFlag, MicroOp::UpdateFlags),
        0x0B => immediate(MicroOp::ShiftSla, MicroOp::UpdateFlagsAq),
        0x10 => immediate(MicroOp::ShiftSra, MicroOp::UpdateFlagsAq),
        0x11 => immediate(MicroOp::IoNoop, MicroOp::UpdateFlags),
        0x12 => immediate(MicroOp::LoadXFromBuffer, MicroOp::UpdateFlags),
        0x13 => immediate(MicroOp::ShiftSll, MicroOp::UpdateFlags),
        0x18 => immediate(MicroOp::ShiftSrl, MicroOp::UpdateFlags),
        0x19 => immediate(MicroOp::AluAnd, MicroOp::UpdateFlags),
        0x1A => immediate(MicroOp::AluIor, MicroOp::UpdateFlags),
        0x1B => immediate(MicroOp::AluXor, MicroOp::UpdateFlags),
        0x28 => immediate(MicroOp::FlagClear, MicroOp::UpdateFlags),
        0xF8 => immediate(MicroOp::FlagSet, MicroOp::UpdateFlags),
        // Everything else dispatches on the paged-family base.
        _ => match opcode & 0xF8 {
            0x20 => memory_tail(MicroOp::LoadAccFromBuffer, MicroOp::UpdateFlags),
            0x30 => copy_cell(),
            0x38 => memory_tail(MicroOp::LoadAccNegateBuffer, MicroOp::UpdateFlags),
            0x40 => memory_tail(MicroOp::LoadQFromBuffer, MicroOp::UpdateFlags),
            0x48 => store(MicroOp::AccToZ),
            0x50 => store(MicroOp::XToZ),
            0x58 => store(MicroOp::QToZ),
            0x60 => arithmetic(MicroOp::AluAddToF),
            0x68 => arithmetic(MicroOp::AluSubToF),
            0x70 => memory_tail(MicroOp::Multiply, MicroOp::UpdateFlagsAq),
            0x78 => memory_tail(MicroOp::Divide, MicroOp::UpdateFlagsQ),
            0x80 => memory_tail(MicroOp::Rao, MicroOp::UpdateFlags),
            0x88 => memory_tail(MicroOp::Rso, MicroOp::UpdateFlags),
            0x90 | 0x98 | 0xA0 | 0xA8 | 0xB0 | 0xB8 | 0xC0 | 0xC8 => branch(),
            0xD0 | 0xD8 | 0xE0 | 0xE8 | 0xF0 => io_memory(),
            _ => Vec::new(),
        },
    }
}

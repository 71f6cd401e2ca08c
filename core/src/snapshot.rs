//! Binary state snapshots.
//!
//! A snapshot carries the complete [`MachineState`] in a compact
//! little-endian layout: magic `CT10DMP1`, a format version, registers,
//! timing, flags, buses, the full memory image, the I/O buffers
//! (length-prefixed) and the panel switches. The reader accepts every
//! historical version back to 1, reconstructing fields the older layouts
//! never stored from their power-on defaults.

use std::io::{Read, Write};

use arbitrary_int::u4;
use thiserror::Error;

use crate::io::IoTransferMode;
use crate::machine::MachineState;
use crate::memory::Memory;
use crate::panel::LoadTarget;
use crate::timing::ClockPhase;

/// The 8-byte file magic.
pub const MAGIC: [u8; 8] = *b"CT10DMP1";

/// The format version written by [`save`].
pub const VERSION: u32 = 6;

/// A failure while reading or writing a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The stream does not start with the snapshot magic.
    #[error("invalid snapshot header")]
    BadMagic,
    /// The stream carries a version this reader does not understand.
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
    /// The memory image is not the machine's memory size.
    #[error("unexpected memory size {0}")]
    BadMemorySize(u32),
    /// A stored enum discriminant is out of range.
    #[error("malformed {0} field")]
    Malformed(&'static str),
    /// The underlying stream failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn write_u8<W: Write>(out: &mut W, value: u8) -> Result<(), SnapshotError> {
    out.write_all(&[value])?;
    Ok(())
}

fn write_u16<W: Write>(out: &mut W, value: u16) -> Result<(), SnapshotError> {
    out.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_u32<W: Write>(out: &mut W, value: u32) -> Result<(), SnapshotError> {
    out.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_bool<W: Write>(out: &mut W, value: bool) -> Result<(), SnapshotError> {
    write_u8(out, u8::from(value))
}

fn write_bytes<W: Write>(out: &mut W, data: &[u8]) -> Result<(), SnapshotError> {
    write_u32(out, data.len() as u32)?;
    out.write_all(data)?;
    Ok(())
}

fn read_u8<R: Read>(input: &mut R) -> Result<u8, SnapshotError> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16<R: Read>(input: &mut R) -> Result<u16, SnapshotError> {
    let mut buf = [0u8; 2];
    input.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(input: &mut R) -> Result<u32, SnapshotError> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_bool<R: Read>(input: &mut R) -> Result<bool, SnapshotError> {
    Ok(read_u8(input)? != 0)
}

fn read_bytes<R: Read>(input: &mut R) -> Result<Vec<u8>, SnapshotError> {
    let len = read_u32(input)? as usize;
    let mut data = vec![0u8; len];
    input.read_exact(&mut data)?;
    Ok(data)
}

fn phase_to_byte(phase: ClockPhase) -> u8 {
    match phase {
        ClockPhase::Cp1 => 1,
        ClockPhase::Cp2 => 2,
        ClockPhase::Cp3 => 3,
    }
}

fn phase_from_byte(value: u8) -> Result<ClockPhase, SnapshotError> {
    match value {
        1 => Ok(ClockPhase::Cp1),
        2 => Ok(ClockPhase::Cp2),
        3 => Ok(ClockPhase::Cp3),
        _ => Err(SnapshotError::Malformed("clock phase")),
    }
}

fn transfer_mode_to_byte(mode: IoTransferMode) -> u8 {
    match mode {
        IoTransferMode::None => 0,
        IoTransferMode::ManualOutput => 1,
        IoTransferMode::ManualInput => 2,
        IoTransferMode::ReadBlock => 3,
        IoTransferMode::WriteBlock => 4,
        IoTransferMode::ReadInterrupt => 5,
    }
}

fn transfer_mode_from_byte(value: u8) -> Result<IoTransferMode, SnapshotError> {
    match value {
        0 => Ok(IoTransferMode::None),
        1 => Ok(IoTransferMode::ManualOutput),
        2 => Ok(IoTransferMode::ManualInput),
        3 => Ok(IoTransferMode::ReadBlock),
        4 => Ok(IoTransferMode::WriteBlock),
        5 => Ok(IoTransferMode::ReadInterrupt),
        _ => Err(SnapshotError::Malformed("transfer mode")),
    }
}

fn load_target_to_byte(target: LoadTarget) -> u8 {
    match target {
        LoadTarget::None => 0,
        LoadTarget::Accumulator => 1,
        LoadTarget::Buffer => 2,
        LoadTarget::Countdown => 3,
        LoadTarget::Distributor => 4,
        LoadTarget::Opcode => 5,
        LoadTarget::Mar => 6,
        LoadTarget::Par => 7,
        LoadTarget::Quotient => 8,
        LoadTarget::Index => 9,
    }
}

fn load_target_from_byte(value: u8) -> Result<LoadTarget, SnapshotError> {
    match value {
        0 => Ok(LoadTarget::None),
        1 => Ok(LoadTarget::Accumulator),
        2 => Ok(LoadTarget::Buffer),
        3 => Ok(LoadTarget::Countdown),
        4 => Ok(LoadTarget::Distributor),
        5 => Ok(LoadTarget::Opcode),
        6 => Ok(LoadTarget::Mar),
        7 => Ok(LoadTarget::Par),
        8 => Ok(LoadTarget::Quotient),
        9 => Ok(LoadTarget::Index),
        _ => Err(SnapshotError::Malformed("load target")),
    }
}

/// Write a version-6 snapshot of the machine.
///
/// # Errors
///
/// Fails only when the underlying writer does.
#[allow(clippy::too_many_lines)]
pub fn save<W: Write>(state: &MachineState, out: &mut W) -> Result<(), SnapshotError> {
    out.write_all(&MAGIC)?;
    write_u32(out, VERSION)?;

    write_u16(out, u16::from(state.regs.accumulator))?;
    write_u16(out, u16::from(state.regs.buffer))?;
    write_u16(out, u16::from(state.regs.quotient))?;
    write_u16(out, u16::from(state.regs.index))?;
    write_u16(out, u16::from(state.regs.countdown))?;
    write_u16(out, state.regs.mar.value())?;
    write_u16(out, state.regs.par.value())?;
    write_u16(out, u16::from(state.regs.opcode))?;
    write_u16(out, u16::from(state.regs.distributor.value()))?;

    write_u8(out, state.timing.distributor.value())?;
    write_u8(out, phase_to_byte(state.timing.phase))?;
    write_bool(out, state.timing.acquisition)?;
    write_bool(out, state.mode.halted)?;

    write_bool(out, state.flags.carry)?;
    write_bool(out, state.flags.zero)?;
    write_bool(out, state.flags.greater)?;
    write_bool(out, state.flags.less)?;
    write_bool(out, state.flags.add_overflow)?;
    write_bool(out, state.flags.divide_overflow)?;
    write_bool(out, state.flags.inst_error)?;

    write_bool(out, state.status.interrupt)?;
    write_bool(out, state.status.sense)?;
    write_bool(out, state.status.flag)?;
    write_bool(out, state.status.wait)?;

    for bus in [&state.x_bus, &state.y_bus, &state.z_bus, &state.f_bus] {
        write_u16(out, bus.value())?;
        write_bool(out, bus.driven())?;
        write_bool(out, bus.complemented())?;
    }

    write_u32(out, Memory::SIZE as u32)?;
    out.write_all(state.memory.cells())?;

    write_u32(out, state.io.input_pos as u32)?;
    write_bool(out, state.io.interrupt)?;
    write_u8(out, state.io.last_command)?;
    write_u8(out, state.io.status)?;
    write_u8(out, state.io.selected_device)?;
    write_bool(out, state.io.hex_mode)?;
    write_bool(out, state.io.alpha_mode)?;
    write_u8(out, transfer_mode_to_byte(state.io.transfer_mode))?;
    write_u16(out, state.io.transfer_address)?;
    write_u16(out, state.io.transfer_remaining)?;
    write_u8(out, state.io.wait_cycles)?;

    write_bytes(out, &state.io.input_data)?;
    write_bytes(out, &state.io.output_data)?;
    write_u32(out, state.io.terminal_input_pos as u32)?;
    write_bytes(out, &state.io.terminal_input)?;
    write_bytes(out, &state.io.terminal_output)?;
    write_bytes(out, &state.io.printer_output)?;

    let panel = &state.panel_input;
    write_bool(out, panel.start)?;
    write_bool(out, panel.stop)?;
    write_bool(out, panel.clear)?;
    write_bool(out, panel.lamp_test)?;
    write_bool(out, panel.reset)?;
    write_bool(out, panel.power_on)?;
    write_bool(out, panel.key_pressed)?;
    write_bool(out, panel.has_last_key)?;
    write_u8(out, panel.key_value)?;
    write_u8(out, panel.last_key)?;
    write_u16(out, panel.input_switches)?;
    write_u8(out, panel.io_mode)?;
    write_u8(out, panel.mode)?;
    write_bool(out, panel.mem_read)?;
    write_bool(out, panel.mem_write)?;
    write_bool(out, panel.load_pressed)?;
    write_u8(out, load_target_to_byte(panel.load_target))?;
    write_bool(out, panel.rpt)?;
    write_bool(out, panel.sense)?;
    write_bool(out, panel.error_inst)?;
    write_bool(out, panel.error_add)?;
    write_bool(out, panel.error_div)?;
    write_bool(out, panel.io_read)?;
    write_bool(out, panel.io_write)?;
    write_bool(out, panel.io_intrp)?;
    write_bool(out, panel.io_block)?;

    Ok(())
}

/// Read a snapshot into the machine, accepting versions 1 through 6.
///
/// Fields a pre-6 layout never stored come back at their power-on defaults.
///
/// # Errors
///
/// Fails on a bad magic, an unknown version, a malformed field or a short
/// or failing stream. The machine state is unspecified after an error.
#[allow(clippy::too_many_lines)]
pub fn load<R: Read>(state: &mut MachineState, input: &mut R) -> Result<(), SnapshotError> {
    let mut magic = [0u8; 8];
    input.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(SnapshotError::BadMagic);
    }
    let version = read_u32(input)?;
    if !(1..=VERSION).contains(&version) {
        return Err(SnapshotError::UnsupportedVersion(version));
    }

    state.regs.accumulator = (read_u16(input)? & 0xFF) as u8;
    state.regs.buffer = (read_u16(input)? & 0xFF) as u8;
    state.regs.quotient = (read_u16(input)? & 0xFF) as u8;
    state.regs.index = (read_u16(input)? & 0xFF) as u8;
    state.regs.countdown = (read_u16(input)? & 0xFF) as u8;
    let mar = read_u16(input)?;
    state.regs.set_mar(mar);
    let par = read_u16(input)?;
    state.regs.set_par(par);
    state.regs.opcode = (read_u16(input)? & 0xFF) as u8;
    state.regs.distributor = u4::new((read_u16(input)? & 0x0F) as u8);

    state.timing.distributor = u4::new(read_u8(input)? & 0x0F);
    state.timing.phase = phase_from_byte(read_u8(input)?)?;
    state.timing.acquisition = read_bool(input)?;
    state.mode.halted = read_bool(input)?;

    state.flags.carry = read_bool(input)?;
    state.flags.zero = read_bool(input)?;
    state.flags.greater = read_bool(input)?;
    state.flags.less = read_bool(input)?;
    state.flags.add_overflow = read_bool(input)?;
    state.flags.divide_overflow = read_bool(input)?;
    state.flags.inst_error = if version >= 2 {
        read_bool(input)?
    } else {
        false
    };

    state.status.interrupt = read_bool(input)?;
    state.status.sense = read_bool(input)?;
    state.status.flag = read_bool(input)?;
    state.status.wait = read_bool(input)?;

    for bus in [
        &mut state.x_bus,
        &mut state.y_bus,
        &mut state.z_bus,
        &mut state.f_bus,
    ] {
        let value = read_u16(input)?;
        let driven = read_bool(input)?;
        let complemented = read_bool(input)?;
        if driven {
            if complemented {
                bus.drive_complemented(value);
            } else {
                bus.drive(value);
            }
        } else {
            bus.clear();
        }
    }

    let memory_size = read_u32(input)?;
    if memory_size != Memory::SIZE as u32 {
        return Err(SnapshotError::BadMemorySize(memory_size));
    }
    let mut cells = [0u8; Memory::SIZE];
    input.read_exact(&mut cells)?;
    for (address, value) in cells.iter().enumerate() {
        state.memory.write(address as u16, *value);
    }

    state.io.input_pos = read_u32(input)? as usize;
    state.io.interrupt = read_bool(input)?;
    state.io.last_command = read_u8(input)?;
    state.io.status = read_u8(input)?;
    state.io.selected_device = read_u8(input)?;
    state.io.hex_mode = read_bool(input)?;
    state.io.alpha_mode = read_bool(input)?;

    if version >= 5 {
        state.io.transfer_mode = transfer_mode_from_byte(read_u8(input)?)?;
        state.io.transfer_address = read_u16(input)?;
        state.io.transfer_remaining = read_u16(input)?;
        state.io.wait_cycles = read_u8(input)?;
    } else if version == 4 {
        state.io.transfer_mode = transfer_mode_from_byte(read_u8(input)?)?;
        state.io.transfer_address = read_u16(input)?;
        state.io.transfer_remaining = read_u16(input)?;
        state.io.wait_cycles = 0;
    } else if version == 3 {
        // The version-3 layout stored a manual-transfer quadruple this
        // format no longer models; skip it and come up idle.
        let _ = read_bool(input)?;
        let _ = read_bool(input)?;
        let _ = read_u16(input)?;
        let _ = read_u16(input)?;
        state.io.cancel_transfer();
    } else {
        state.io.cancel_transfer();
    }

    state.io.input_data = read_bytes(input)?;
    state.io.output_data = read_bytes(input)?;

    if version >= 6 {
        state.io.terminal_input_pos = read_u32(input)? as usize;
        state.io.terminal_input = read_bytes(input)?;
        if state.io.terminal_input_pos > state.io.terminal_input.len() {
            state.io.terminal_input_pos = state.io.terminal_input.len();
        }
        state.io.terminal_output = read_bytes(input)?;
        state.io.printer_output = read_bytes(input)?;
    } else {
        state.io.terminal_input_pos = 0;
        state.io.terminal_input.clear();
        state.io.terminal_output.clear();
        state.io.printer_output.clear();
    }

    let panel = &mut state.panel_input;
    panel.start = read_bool(input)?;
    panel.stop = read_bool(input)?;
    panel.clear = read_bool(input)?;
    panel.lamp_test = read_bool(input)?;
    panel.reset = read_bool(input)?;
    panel.power_on = read_bool(input)?;
    panel.key_pressed = read_bool(input)?;
    panel.has_last_key = read_bool(input)?;
    panel.key_value = read_u8(input)?;
    panel.last_key = read_u8(input)?;
    panel.input_switches = read_u16(input)?;
    panel.io_mode = read_u8(input)?;
    panel.mode = read_u8(input)?;
    panel.mem_read = read_bool(input)?;
    panel.mem_write = read_bool(input)?;
    panel.load_pressed = read_bool(input)?;
    panel.load_target = load_target_from_byte(read_u8(input)?)?;
    panel.rpt = read_bool(input)?;
    panel.sense = read_bool(input)?;
    panel.error_inst = read_bool(input)?;
    panel.error_add = read_bool(input)?;
    panel.error_div = read_bool(input)?;
    panel.io_read = read_bool(input)?;
    panel.io_write = read_bool(input)?;
    panel.io_intrp = read_bool(input)?;
    panel.io_block = read_bool(input)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::ClockPhase;

    #[test]
    fn save_then_load_round_trips() {
        let mut state = MachineState::new();
        state.regs.accumulator = 0x42;
        state.regs.set_mar(0x3A5);
        state.regs.set_par(0x123);
        state.timing.phase = ClockPhase::Cp3;
        state.timing.acquisition = false;
        state.flags.carry = true;
        state.flags.inst_error = true;
        state.z_bus.drive_complemented(0x00FF);
        state.memory.write(0x200, 0x99);
        state.io.input_data = vec![1, 2, 3];
        state.io.input_pos = 2;
        state.io.terminal_output = vec![b'h', b'i'];
        state.io.transfer_mode = IoTransferMode::WriteBlock;
        state.io.transfer_address = 0x210;
        state.io.transfer_remaining = 7;
        state.panel_input.sense = true;
        state.panel_input.load_target = LoadTarget::Par;

        let mut buffer = Vec::new();
        save(&state, &mut buffer).unwrap();

        let mut restored = MachineState::new();
        load(&mut restored, &mut buffer.as_slice()).unwrap();

        assert_eq!(restored.regs.accumulator, 0x42);
        assert_eq!(restored.regs.mar.value(), 0x3A5);
        assert_eq!(restored.regs.par.value(), 0x123);
        assert_eq!(restored.timing.phase, ClockPhase::Cp3);
        assert!(!restored.timing.acquisition);
        assert!(restored.flags.carry);
        assert!(restored.flags.inst_error);
        assert!(restored.z_bus.complemented());
        assert_eq!(restored.memory.read(0x200), 0x99);
        assert_eq!(restored.io.input_data, vec![1, 2, 3]);
        assert_eq!(restored.io.input_pos, 2);
        assert_eq!(restored.io.terminal_output, vec![b'h', b'i']);
        assert_eq!(restored.io.transfer_mode, IoTransferMode::WriteBlock);
        assert_eq!(restored.io.transfer_remaining, 7);
        assert!(restored.panel_input.sense);
        assert_eq!(restored.panel_input.load_target, LoadTarget::Par);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut state = MachineState::new();
        let mut data = Vec::new();
        save(&state, &mut data).unwrap();
        data[0] = b'X';
        assert!(matches!(
            load(&mut state, &mut data.as_slice()),
            Err(SnapshotError::BadMagic)
        ));
    }

    #[test]
    fn rejects_future_version() {
        let mut state = MachineState::new();
        let mut data = Vec::new();
        save(&state, &mut data).unwrap();
        data[8..12].copy_from_slice(&7u32.to_le_bytes());
        assert!(matches!(
            load(&mut state, &mut data.as_slice()),
            Err(SnapshotError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn rejects_truncated_stream() {
        let mut state = MachineState::new();
        let mut data = Vec::new();
        save(&state, &mut data).unwrap();
        data.truncate(data.len() / 2);
        assert!(load(&mut state, &mut data.as_slice()).is_err());
    }
}

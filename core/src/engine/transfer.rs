//! The I/O transfer controller.
//!
//! Block transfers run as a sub-state machine interleaved with the
//! microcycle clock: while a transfer is in flight the engine suspends
//! normal instruction stepping and calls into [`service_wait`] once per
//! microstep. Automatic transfers move one byte every other step (a
//! one-cycle pacing gap); manual transfers halt the machine and move one
//! byte per press of the panel start switch.

use crate::io::IoTransferMode;
use crate::machine::MachineState;

/// The handshake byte appended to the device output stream when a read
/// transfer starts. Emulated programs observe it as the reader-ready mark.
const READ_HANDSHAKE: u8 = 0x11;

/// Service one microstep of an in-flight transfer.
///
/// Only called while `transfer_mode` is not `None`.
pub(crate) fn service_wait(state: &mut MachineState) {
    state.status.wait = true;

    if matches!(
        state.io.transfer_mode,
        IoTransferMode::ManualOutput | IoTransferMode::ManualInput
    ) {
        state.mode.halted = true;
        if !state.panel_input.start {
            return;
        }
        transfer_step(state);
        return;
    }

    if state.io.wait_cycles > 0 {
        state.io.wait_cycles -= 1;
        return;
    }
    transfer_step(state);
    if state.io.transfer_mode != IoTransferMode::None {
        state.io.wait_cycles = 1;
    }
}

/// Dispatch the `IO_NOOP` micro-op.
///
/// With the panel I/O mode switched off this degenerates to refreshing the
/// status byte; otherwise the memory-operand I/O opcodes start their
/// transfer here.
pub(crate) fn handle_io(state: &mut MachineState) {
    if state.panel_input.io_mode == 1 {
        state.io.status = state.status.to_byte();
        return;
    }
    let mode = match state.regs.opcode & 0xF8 {
        0xD0 => Some(IoTransferMode::WriteBlock),
        0xD8 => Some(IoTransferMode::ManualOutput),
        0xE0 => Some(IoTransferMode::ReadBlock),
        0xE8 => Some(IoTransferMode::ReadInterrupt),
        0xF0 => Some(IoTransferMode::ManualInput),
        _ => None,
    };
    if let Some(mode) = mode {
        if state.io.transfer_mode == IoTransferMode::None {
            begin(state, mode);
        }
    }
    state.io.status = state.status.to_byte();
}

/// Arm a transfer and move its first byte.
fn begin(state: &mut MachineState, mode: IoTransferMode) {
    log::debug!(
        "transfer begin: {mode:?} at {:#05X}, device {}",
        state.regs.mar.value(),
        state.io.selected_device
    );
    state.io.transfer_mode = mode;
    state.io.transfer_address = state.regs.mar.value();
    state.io.wait_cycles = 0;
    if matches!(
        mode,
        IoTransferMode::ReadBlock | IoTransferMode::ReadInterrupt
    ) {
        state.io.output_buffer_mut().push(READ_HANDSHAKE);
    }
    if mode == IoTransferMode::ReadInterrupt {
        state.io.transfer_remaining = 0;
    } else {
        state.io.transfer_remaining = u16::from(state.regs.countdown) + 1;
        update_countdown(state);
    }
    transfer_step(state);
}

/// Move one byte of the in-flight transfer and update the bookkeeping.
fn transfer_step(state: &mut MachineState) {
    let mode = state.io.transfer_mode;
    if mode == IoTransferMode::None {
        return;
    }

    if mode != IoTransferMode::ReadInterrupt && state.io.transfer_remaining == 0 {
        state.io.transfer_mode = IoTransferMode::None;
        state.io.wait_cycles = 0;
        return;
    }
    if mode == IoTransferMode::ReadInterrupt && state.io.interrupt {
        state.io.transfer_mode = IoTransferMode::None;
        state.io.wait_cycles = 0;
        return;
    }

    match mode {
        IoTransferMode::WriteBlock => {
            let value = state.memory.read(state.io.transfer_address);
            state.regs.buffer = value;
            state.io.output_buffer_mut().push(value);
        }
        IoTransferMode::ReadBlock | IoTransferMode::ReadInterrupt => {
            let Some(value) = state.io.read_input_byte() else {
                if mode == IoTransferMode::ReadInterrupt {
                    state.io.transfer_mode = IoTransferMode::None;
                    return;
                }
                state.regs.buffer = 0;
                state.memory.write(state.io.transfer_address, 0);
                advance_transfer(state, mode);
                return;
            };
            state.regs.buffer = value;
            state.memory.write(state.io.transfer_address, value);
        }
        IoTransferMode::ManualOutput => {
            let value = state.memory.read(state.io.transfer_address);
            state.regs.buffer = value;
            let upper = state.panel_input.input_switches & 0x300;
            state.panel_input.input_switches = upper | u16::from(value);
        }
        IoTransferMode::ManualInput => {
            let value = (state.panel_input.input_switches & 0xFF) as u8;
            state.regs.buffer = value;
            state.memory.write(state.io.transfer_address, value);
        }
        IoTransferMode::None => unreachable!(),
    }

    advance_transfer(state, mode);
}

fn advance_transfer(state: &mut MachineState, mode: IoTransferMode) {
    state.io.transfer_address = state.io.transfer_address.wrapping_add(1);
    state.regs.set_mar(state.io.transfer_address);

    if mode != IoTransferMode::ReadInterrupt {
        state.io.transfer_remaining -= 1;
        update_countdown(state);
        if state.io.transfer_remaining == 0 {
            log::debug!("transfer complete at {:#05X}", state.io.transfer_address);
            state.io.transfer_mode = IoTransferMode::None;
            state.io.wait_cycles = 0;
        }
    }
}

/// Mirror the remaining byte count, less the one in flight, into `C`.
fn update_countdown(state: &mut MachineState) {
    let remaining = state.io.transfer_remaining;
    let count = remaining.saturating_sub(1);
    state.regs.countdown = (count & 0xFF) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine;

    fn state_with_io_enabled() -> MachineState {
        let mut state = MachineState::new();
        state.panel_input.io_mode = 2;
        state
    }

    /// Run engine steps until the transfer drains or the budget runs out.
    fn run_transfer(state: &mut MachineState, budget: usize) {
        for _ in 0..budget {
            if state.io.transfer_mode == IoTransferMode::None {
                return;
            }
            engine::step(state);
            state.timing.advance();
        }
        panic!("transfer did not finish within {budget} steps");
    }

    #[test]
    fn write_block_copies_memory_to_device() {
        let mut state = state_with_io_enabled();
        for (i, value) in [0x10u8, 0x20, 0x30].iter().enumerate() {
            state.memory.write(0x100 + i as u16, *value);
        }
        state.regs.set_mar(0x100);
        state.regs.opcode = 0xD0;
        state.regs.countdown = 2;

        handle_io(&mut state);
        run_transfer(&mut state, 32);

        assert_eq!(state.io.output_data, vec![0x10, 0x20, 0x30]);
        assert_eq!(state.io.transfer_mode, IoTransferMode::None);
        assert_eq!(state.regs.mar.value(), 0x103);
    }

    #[test]
    fn read_block_appends_handshake_and_fills_memory() {
        let mut state = state_with_io_enabled();
        state.io.input_data = vec![0xAA, 0xBB];
        state.regs.set_mar(0x200);
        state.regs.opcode = 0xE0;
        state.regs.countdown = 1;

        handle_io(&mut state);
        run_transfer(&mut state, 32);

        assert_eq!(state.io.output_data, vec![READ_HANDSHAKE]);
        assert_eq!(state.memory.read(0x200), 0xAA);
        assert_eq!(state.memory.read(0x201), 0xBB);
        assert!(!state.io.interrupt);
    }

    #[test]
    fn read_interrupt_drains_until_exhaustion() {
        let mut state = state_with_io_enabled();
        state.io.input_data = vec![0x41, 0x42];
        state.regs.set_mar(0x200);
        state.regs.opcode = 0xE8;
        state.regs.countdown = 0xFF;

        handle_io(&mut state);
        run_transfer(&mut state, 64);

        assert_eq!(state.memory.read(0x200), 0x41);
        assert_eq!(state.memory.read(0x201), 0x42);
        assert!(state.io.interrupt);
        assert_eq!(state.io.transfer_mode, IoTransferMode::None);
    }

    #[test]
    fn automatic_transfers_pace_one_idle_step_between_bytes() {
        let mut state = state_with_io_enabled();
        state.memory.write(0x000, 0x01);
        state.memory.write(0x001, 0x02);
        state.memory.write(0x002, 0x03);
        state.regs.opcode = 0xD0;
        state.regs.countdown = 2;

        handle_io(&mut state);
        // The first byte moves inside begin().
        assert_eq!(state.io.output_data.len(), 1);

        engine::step(&mut state);
        assert_eq!(state.io.output_data.len(), 2);
        assert_eq!(state.io.wait_cycles, 1);

        // The pacing step moves nothing.
        engine::step(&mut state);
        assert_eq!(state.io.output_data.len(), 2);

        engine::step(&mut state);
        assert_eq!(state.io.output_data.len(), 3);
        assert_eq!(state.io.transfer_mode, IoTransferMode::None);
    }

    #[test]
    fn manual_input_waits_for_the_start_switch() {
        let mut state = state_with_io_enabled();
        state.regs.set_mar(0x080);
        state.regs.opcode = 0xF0;
        state.regs.countdown = 1;
        state.panel_input.input_switches = 0x055;

        handle_io(&mut state);
        // The first byte moves immediately; the next waits for start.
        assert_eq!(state.memory.read(0x080), 0x55);

        engine::step(&mut state);
        assert!(state.mode.halted);
        assert_eq!(state.io.transfer_mode, IoTransferMode::ManualInput);

        state.panel_input.input_switches = 0x066;
        state.panel_input.start = true;
        state.mode.halted = false;
        engine::step(&mut state);
        assert_eq!(state.memory.read(0x081), 0x66);
        assert_eq!(state.io.transfer_mode, IoTransferMode::None);
    }

    #[test]
    fn io_mode_off_only_refreshes_status() {
        let mut state = MachineState::new();
        state.panel_input.io_mode = 1;
        state.regs.opcode = 0xD0;
        state.regs.countdown = 3;
        state.status.flag = true;

        handle_io(&mut state);
        assert_eq!(state.io.transfer_mode, IoTransferMode::None);
        assert_eq!(state.io.status, 0b100);
    }
}

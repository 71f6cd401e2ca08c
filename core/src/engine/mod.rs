//! The execution engine: a per-microstep interpreter over [`MachineState`].
//!
//! One call to [`step`] examines a single `(distributor, phase)` slot. Every
//! micro-operation the microcode table schedules at the current coordinate
//! fires, in table order, mutating registers, buses, memory or I/O state.
//! The host advances the timing coordinate between calls; the engine never
//! touches it.
//!
//! The engine is the only writer of architectural state during normal
//! execution. It never panics and never returns errors: every error
//! condition is expressed as a flag bit, a halt or an I/O interrupt.

pub(crate) mod transfer;

use crate::io::IoTransferMode;
use crate::machine::MachineState;
use crate::microcode::{MicroOp, MicrocodeTable};
use crate::timing::ClockPhase;

/// Execute one microstep at the current timing coordinate.
pub fn step(state: &mut MachineState) {
    if state.mode.halted {
        return;
    }

    if state.io.transfer_mode != IoTransferMode::None {
        transfer::service_wait(state);
        return;
    }
    state.status.wait = false;

    // A new instruction's execute half begins: drop the sticky error flags.
    if !state.timing.acquisition
        && state.timing.distributor.value() == 0
        && state.timing.phase == ClockPhase::Cp1
    {
        state.flags.add_overflow = false;
        state.flags.divide_overflow = false;
        state.flags.inst_error = false;
    }

    match state.panel_input.io_mode {
        2 => {
            state.io.hex_mode = true;
            state.io.alpha_mode = false;
        }
        3 => {
            state.io.hex_mode = false;
            state.io.alpha_mode = true;
        }
        1 => {
            state.io.hex_mode = false;
            state.io.alpha_mode = false;
        }
        _ => {}
    }

    state.status.sense = state.panel_input.sense;
    state.status.interrupt = state.io.interrupt;
    state.io.status = state.status.to_byte();

    match state.timing.phase {
        ClockPhase::Cp1 => {
            state.x_bus.clear();
            state.y_bus.clear();
            state.z_bus.clear();
        }
        ClockPhase::Cp2 => state.f_bus.clear(),
        ClockPhase::Cp3 => {}
    }

    let steps = if state.timing.acquisition {
        MicrocodeTable::acquisition()
    } else {
        MicrocodeTable::execution(state.regs.opcode)
    };
    if !state.timing.acquisition && steps.is_empty() {
        state.flags.inst_error = true;
        log::debug!("instruction error: opcode {:#04X}", state.regs.opcode);
        if !state.panel_input.error_inst {
            state.mode.halted = true;
            return;
        }
    }

    for micro_step in steps {
        if micro_step.distributor == state.timing.distributor.value()
            && micro_step.phase == state.timing.phase
        {
            execute(micro_step.op, state);
            state.add_trace(micro_step.op);
        }
    }

    state.regs.distributor = state.timing.distributor;
}

fn page_address(opcode: u8, low: u8) -> u16 {
    u16::from(opcode & 0x03) << 8 | u16::from(low)
}

fn encode_bun(address: u16) -> u8 {
    0x90 | ((address >> 8) & 0x03) as u8
}

/// Derive zero/greater/less from an 8-bit value.
fn update_value_flags(state: &mut MachineState, value: u8) {
    state.flags.zero = value == 0;
    state.flags.greater = value & 0x80 == 0 && value != 0;
    state.flags.less = value & 0x80 != 0;
}

/// Execute a single micro-operation against the machine state.
#[allow(clippy::too_many_lines)]
fn execute(op: MicroOp, state: &mut MachineState) {
    match op {
        MicroOp::ParToMar => {
            let value = state.regs.par.value();
            state.z_bus.drive(value);
            state.regs.mar = state.regs.par;
        }
        MicroOp::MarToPar => {
            state.regs.par = state.regs.mar;
        }
        MicroOp::MemToZ => {
            let value = state.memory.read(state.regs.mar.value());
            state.z_bus.drive_complemented(u16::from(!value));
        }
        MicroOp::ZToBuffer => {
            let mut value = (state.z_bus.value() & 0xFF) as u8;
            if state.z_bus.complemented() {
                value = !value;
            }
            state.regs.buffer = value;
        }
        MicroOp::BufferToOpcode => {
            state.regs.opcode = state.regs.buffer;
        }
        MicroOp::ParInc => {
            let repeat_held = state.panel_input.rpt
                && (state.panel_input.mode == 1 || state.panel_input.mode == 2);
            if !repeat_held {
                state.regs.advance_par();
            }
        }
        MicroOp::FormEffectiveAddress => {
            let address = page_address(state.regs.opcode, state.regs.buffer);
            state.regs.set_mar(address);
        }
        MicroOp::AddIndexToMar => {
            if state.regs.opcode & 0x04 != 0 {
                let address = state.regs.mar.value() + u16::from(state.regs.index);
                state.regs.set_mar(address);
            }
        }
        MicroOp::AccToY => state.y_bus.drive(u16::from(state.regs.accumulator)),
        MicroOp::BufferToX => state.x_bus.drive(u16::from(state.regs.buffer)),
        MicroOp::BufferToF => state.f_bus.drive(u16::from(state.regs.buffer)),
        MicroOp::FToAcc => {
            state.regs.accumulator = (state.f_bus.value() & 0xFF) as u8;
        }
        MicroOp::AccToZ => {
            state
                .z_bus
                .drive_complemented(u16::from(!state.regs.accumulator));
        }
        MicroOp::XToZ => {
            state.z_bus.drive_complemented(u16::from(!state.regs.index));
        }
        MicroOp::QToZ => {
            state
                .z_bus
                .drive_complemented(u16::from(!state.regs.quotient));
        }
        MicroOp::BufferToY => state.y_bus.drive(u16::from(state.regs.buffer)),
        MicroOp::YToMem => {
            state
                .memory
                .write(state.regs.mar.value(), (state.y_bus.value() & 0xFF) as u8);
        }
        MicroOp::LoadAccFromBuffer => state.regs.accumulator = state.regs.buffer,
        MicroOp::LoadXFromBuffer => state.regs.index = state.regs.buffer,
        MicroOp::LoadCFromBuffer => state.regs.countdown = state.regs.buffer,
        MicroOp::LoadQFromBuffer => state.regs.quotient = state.regs.buffer,
        MicroOp::LoadAccNegateBuffer => {
            state.regs.accumulator = state.regs.buffer.wrapping_neg();
        }
        MicroOp::StoreAccToMem => {
            state
                .memory
                .write(state.regs.mar.value(), state.regs.accumulator);
        }
        MicroOp::StoreXToMem => {
            state.memory.write(state.regs.mar.value(), state.regs.index);
        }
        MicroOp::StoreQToMem => {
            state
                .memory
                .write(state.regs.mar.value(), state.regs.quotient);
        }
        MicroOp::CopyMemToMemPlusOne => {
            let address = state.regs.mar.value();
            let value = state.memory.read(address);
            let next = address.wrapping_add(1);
            state.memory.write(next, value);
            state.regs.set_mar(next);
        }
        MicroOp::IncrementXByBuffer => {
            state.regs.index = state.regs.index.wrapping_add(state.regs.buffer);
        }
        MicroOp::AluAddToF => {
            let a = (state.y_bus.value() & 0xFF) as u8;
            let b = (state.x_bus.value() & 0xFF) as u8;
            let sum = u16::from(a) + u16::from(b);
            let result = (sum & 0xFF) as u8;
            state.f_bus.drive(u16::from(result));
            state.flags.carry = sum > 0xFF;
            state.flags.add_overflow = (a ^ result) & (b ^ result) & 0x80 != 0;
            if state.flags.add_overflow && !state.panel_input.error_add {
                log::debug!("add overflow halt: {a:#04X} + {b:#04X}");
                state.mode.halted = true;
            }
        }
        MicroOp::AluSubToF => {
            let a = (state.y_bus.value() & 0xFF) as u8;
            let b = (state.x_bus.value() & 0xFF) as u8;
            let result = a.wrapping_sub(b);
            state.f_bus.drive(u16::from(result));
            state.flags.carry = a >= b;
            state.flags.add_overflow = (a ^ b) & (a ^ result) & 0x80 != 0;
            if state.flags.add_overflow && !state.panel_input.error_add {
                log::debug!("subtract overflow halt: {a:#04X} - {b:#04X}");
                state.mode.halted = true;
            }
        }
        MicroOp::AluAnd => state.regs.accumulator &= state.regs.buffer,
        MicroOp::AluIor => state.regs.accumulator |= state.regs.buffer,
        MicroOp::AluXor => state.regs.accumulator ^= state.regs.buffer,
        MicroOp::ShiftSla => {
            let pair = u16::from(state.regs.accumulator) << 8 | u16::from(state.regs.quotient);
            let count = state.regs.buffer;
            let shifted = if count >= 16 { 0 } else { pair << count };
            state.regs.accumulator = (shifted >> 8) as u8;
            state.regs.quotient = (shifted & 0xFF) as u8;
        }
        MicroOp::ShiftSra => {
            let pair =
                (u16::from(state.regs.accumulator) << 8 | u16::from(state.regs.quotient)) as i16;
            let count = state.regs.buffer;
            let shifted = if count >= 16 {
                if pair < 0 {
                    -1
                } else {
                    0
                }
            } else {
                pair >> count
            };
            state.regs.accumulator = ((shifted as u16) >> 8) as u8;
            state.regs.quotient = (shifted & 0xFF) as u8;
        }
        MicroOp::ShiftSll => {
            let count = state.regs.buffer;
            state.regs.accumulator = if count >= 8 {
                0
            } else {
                state.regs.accumulator << count
            };
        }
        MicroOp::ShiftSrl => {
            let count = state.regs.buffer;
            state.regs.accumulator = if count >= 8 {
                0
            } else {
                state.regs.accumulator >> count
            };
        }
        MicroOp::Multiply => {
            let product =
                i16::from(state.regs.accumulator as i8) * i16::from(state.regs.buffer as i8);
            state.regs.accumulator = ((product as u16) >> 8) as u8;
            state.regs.quotient = (product & 0xFF) as u8;
        }
        MicroOp::Divide => {
            let dividend = i32::from(
                (u16::from(state.regs.accumulator) << 8 | u16::from(state.regs.quotient)) as i16,
            );
            let divisor = i32::from(state.regs.buffer as i8);
            if divisor == 0 {
                state.flags.divide_overflow = true;
                if !state.panel_input.error_div {
                    log::debug!("divide by zero halt");
                    state.mode.halted = true;
                }
                return;
            }
            let quotient = dividend / divisor;
            let remainder = dividend % divisor;
            if !(-128..=127).contains(&quotient) {
                state.flags.divide_overflow = true;
                if !state.panel_input.error_div {
                    log::debug!("divide overflow halt: quotient {quotient}");
                    state.mode.halted = true;
                }
                return;
            }
            state.flags.divide_overflow = false;
            state.regs.quotient = (quotient & 0xFF) as u8;
            state.regs.accumulator = (remainder & 0xFF) as u8;
        }
        MicroOp::Rao => {
            let value = state.regs.buffer;
            let result = value.wrapping_add(1);
            state.memory.write(state.regs.mar.value(), result);
            state.regs.accumulator = result;
            state.flags.carry = value == 0xFF;
        }
        MicroOp::Rso => {
            let value = state.regs.buffer;
            let result = value.wrapping_sub(1);
            state.memory.write(state.regs.mar.value(), result);
            state.regs.accumulator = result;
            state.flags.carry = value == 0x00;
        }
        MicroOp::Branch => branch(state),
        MicroOp::SkipIfInterrupt => {
            state.regs.countdown = state.regs.buffer;
            if state.status.interrupt {
                skip(state);
            }
            state.io.interrupt = false;
        }
        MicroOp::SkipIfSense => {
            state.regs.countdown = state.regs.buffer;
            if state.status.sense {
                skip(state);
            }
        }
        MicroOp::SkipIfFlag => {
            state.regs.countdown = state.regs.buffer;
            if state.status.flag {
                skip(state);
            }
        }
        MicroOp::FlagSet => state.status.flag = true,
        MicroOp::FlagClear => state.status.flag = false,
        MicroOp::SenseStatus => state.regs.accumulator = state.io.status,
        MicroOp::IoNoop => {
            if state.regs.opcode == 0x11 {
                let command = state.regs.buffer;
                state.io.last_command = command;
                state.io.selected_device = command & 0x07;
                state.io.hex_mode = command & 0x08 != 0;
                state.io.alpha_mode = command & 0x10 != 0;
            }
            transfer::handle_io(state);
        }
        MicroOp::UpdateFlags => {
            let value = state.regs.accumulator;
            update_value_flags(state, value);
        }
        MicroOp::UpdateFlagsQ => {
            let value = state.regs.quotient;
            update_value_flags(state, value);
        }
        MicroOp::UpdateFlagsAq => {
            let pair = u16::from(state.regs.accumulator) << 8 | u16::from(state.regs.quotient);
            state.flags.zero = pair == 0;
            state.flags.greater = pair & 0x8000 == 0 && pair != 0;
            state.flags.less = pair & 0x8000 != 0;
        }
        MicroOp::UpdateOverflow => {
            // Overflow is computed inline by the ALU steps; this row exists
            // to keep the table aligned with the printed microcode listings.
        }
        MicroOp::Halt => state.mode.halted = true,
    }
}

/// Skip `2 * B` bytes of program, the width of `B` two-byte instructions.
fn skip(state: &mut MachineState) {
    let offset = 2 * u16::from(state.regs.buffer);
    state.regs.set_par(state.regs.par.value() + offset);
}

/// Resolve the branch family by opcode base.
fn branch(state: &mut MachineState) {
    let base = state.regs.opcode & 0xF8;
    let take = match base {
        0x90 | 0xA0 => true,
        0x98 => {
            state.mode.halted = true;
            true
        }
        0xA8 => state.flags.greater,
        0xB0 => state.flags.zero,
        0xB8 => state.flags.less,
        0xC0 => !state.flags.carry,
        0xC8 => state.regs.index == 0,
        _ => false,
    };

    if base == 0xA0 {
        // BSB plants a return branch at the target and resumes past it.
        let target = state.regs.mar.value();
        let return_address = state.regs.par.value();
        state.memory.write(target, encode_bun(return_address));
        state
            .memory
            .write(target.wrapping_add(1), (return_address & 0xFF) as u8);
        state.regs.set_par(target.wrapping_add(2));
    } else if take {
        state.regs.par = state.regs.mar;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbitrary_int::u4;

    fn exec(state: &mut MachineState, op: MicroOp) {
        execute(op, state);
    }

    #[test]
    fn mem_to_z_to_buffer_double_inverts() {
        let mut state = MachineState::new();
        state.memory.write(0x123, 0x5A);
        state.regs.set_mar(0x123);

        exec(&mut state, MicroOp::MemToZ);
        assert!(state.z_bus.complemented());
        assert_eq!(state.z_bus.value(), u16::from(!0x5Au8));

        exec(&mut state, MicroOp::ZToBuffer);
        assert_eq!(state.regs.buffer, 0x5A);
    }

    #[test]
    fn effective_address_combines_page_and_index() {
        let mut state = MachineState::new();
        state.regs.opcode = 0x63; // ADD, page 3, not indexed
        state.regs.buffer = 0x20;
        exec(&mut state, MicroOp::FormEffectiveAddress);
        assert_eq!(state.regs.mar.value(), 0x320);

        exec(&mut state, MicroOp::AddIndexToMar);
        assert_eq!(state.regs.mar.value(), 0x320);

        state.regs.opcode = 0x64; // indexed
        state.regs.index = 0x05;
        exec(&mut state, MicroOp::AddIndexToMar);
        assert_eq!(state.regs.mar.value(), 0x325);
    }

    #[test]
    fn add_sets_carry_and_overflow() {
        // (a, b, result, carry, overflow)
        let cases = [
            (0x01u8, 0x02u8, 0x03u8, false, false),
            (0xFF, 0x01, 0x00, true, false),
            (0x7F, 0x01, 0x80, false, true),
            (0x80, 0x80, 0x00, true, true),
        ];
        for (a, b, result, carry, overflow) in cases {
            let mut state = MachineState::new();
            state.panel_input.error_add = true;
            state.y_bus.drive(u16::from(a));
            state.x_bus.drive(u16::from(b));
            exec(&mut state, MicroOp::AluAddToF);
            assert_eq!(state.f_bus.value(), u16::from(result), "{a:#X}+{b:#X}");
            assert_eq!(state.flags.carry, carry, "{a:#X}+{b:#X} carry");
            assert_eq!(state.flags.add_overflow, overflow, "{a:#X}+{b:#X} overflow");
        }
    }

    #[test]
    fn subtract_carry_means_no_borrow() {
        let cases = [
            (0x05u8, 0x03u8, 0x02u8, true, false),
            (0x01, 0x02, 0xFF, false, false),
            (0x80, 0x01, 0x7F, true, true),
            (0x00, 0x00, 0x00, true, false),
        ];
        for (a, b, result, carry, overflow) in cases {
            let mut state = MachineState::new();
            state.panel_input.error_add = true;
            state.y_bus.drive(u16::from(a));
            state.x_bus.drive(u16::from(b));
            exec(&mut state, MicroOp::AluSubToF);
            assert_eq!(state.f_bus.value(), u16::from(result), "{a:#X}-{b:#X}");
            assert_eq!(state.flags.carry, carry, "{a:#X}-{b:#X} carry");
            assert_eq!(state.flags.add_overflow, overflow, "{a:#X}-{b:#X} overflow");
        }
    }

    #[test]
    fn overflow_halts_unless_bypassed() {
        let mut state = MachineState::new();
        state.y_bus.drive(0x7F);
        state.x_bus.drive(0x01);
        exec(&mut state, MicroOp::AluAddToF);
        assert!(state.mode.halted);

        let mut state = MachineState::new();
        state.panel_input.error_add = true;
        state.y_bus.drive(0x7F);
        state.x_bus.drive(0x01);
        exec(&mut state, MicroOp::AluAddToF);
        assert!(!state.mode.halted);
    }

    #[test]
    fn multiply_splits_signed_product_across_a_and_q() {
        let mut state = MachineState::new();
        state.regs.accumulator = 0x12; // 18
        state.regs.buffer = 0x34; // 52
        exec(&mut state, MicroOp::Multiply);
        // 18 * 52 = 936 = 0x03A8
        assert_eq!(state.regs.accumulator, 0x03);
        assert_eq!(state.regs.quotient, 0xA8);

        state.regs.accumulator = 0xFE; // -2
        state.regs.buffer = 0x03;
        exec(&mut state, MicroOp::Multiply);
        // -6 = 0xFFFA
        assert_eq!(state.regs.accumulator, 0xFF);
        assert_eq!(state.regs.quotient, 0xFA);
    }

    #[test]
    fn divide_leaves_remainder_in_a_and_quotient_in_q() {
        let mut state = MachineState::new();
        state.regs.accumulator = 0x00;
        state.regs.quotient = 0x2B; // 43
        state.regs.buffer = 0x05;
        exec(&mut state, MicroOp::Divide);
        assert_eq!(state.regs.quotient, 8);
        assert_eq!(state.regs.accumulator, 3);
        assert!(!state.flags.divide_overflow);
    }

    #[test]
    fn divide_by_zero_sets_overflow_and_halts() {
        let mut state = MachineState::new();
        state.regs.quotient = 0x10;
        state.regs.buffer = 0;
        exec(&mut state, MicroOp::Divide);
        assert!(state.flags.divide_overflow);
        assert!(state.mode.halted);
    }

    #[test]
    fn divide_quotient_out_of_range_overflows() {
        let mut state = MachineState::new();
        state.panel_input.error_div = true;
        // 0x7F00 / 1 = 32512, far outside [-128, 127].
        state.regs.accumulator = 0x7F;
        state.regs.quotient = 0x00;
        state.regs.buffer = 0x01;
        exec(&mut state, MicroOp::Divide);
        assert!(state.flags.divide_overflow);
        assert!(!state.mode.halted);
    }

    #[test]
    fn sixteen_bit_shifts_span_a_and_q() {
        let mut state = MachineState::new();
        state.regs.accumulator = 0x01;
        state.regs.quotient = 0x80;
        state.regs.buffer = 1;
        exec(&mut state, MicroOp::ShiftSla);
        assert_eq!(state.regs.accumulator, 0x03);
        assert_eq!(state.regs.quotient, 0x00);

        state.regs.accumulator = 0x80;
        state.regs.quotient = 0x00;
        state.regs.buffer = 4;
        exec(&mut state, MicroOp::ShiftSra);
        // Arithmetic shift drags the sign down.
        assert_eq!(state.regs.accumulator, 0xF8);
        assert_eq!(state.regs.quotient, 0x00);

        state.regs.buffer = 16;
        exec(&mut state, MicroOp::ShiftSra);
        assert_eq!(state.regs.accumulator, 0xFF);
        assert_eq!(state.regs.quotient, 0xFF);
    }

    #[test]
    fn byte_shifts_zero_out_at_count_eight() {
        let mut state = MachineState::new();
        state.regs.accumulator = 0x05;
        state.regs.buffer = 2;
        exec(&mut state, MicroOp::ShiftSll);
        assert_eq!(state.regs.accumulator, 0x14);

        state.regs.buffer = 8;
        exec(&mut state, MicroOp::ShiftSrl);
        assert_eq!(state.regs.accumulator, 0x00);
    }

    #[test]
    fn rao_and_rso_wrap_with_carry() {
        let mut state = MachineState::new();
        state.regs.set_mar(0x050);
        state.regs.buffer = 0xFF;
        exec(&mut state, MicroOp::Rao);
        assert_eq!(state.memory.read(0x050), 0x00);
        assert_eq!(state.regs.accumulator, 0x00);
        assert!(state.flags.carry);

        state.regs.buffer = 0x00;
        exec(&mut state, MicroOp::Rso);
        assert_eq!(state.memory.read(0x050), 0xFF);
        assert!(state.flags.carry);
    }

    #[test]
    fn bsb_plants_a_return_branch() {
        let mut state = MachineState::new();
        state.regs.opcode = 0xA0;
        state.regs.set_par(0x245);
        state.regs.set_mar(0x100);
        exec(&mut state, MicroOp::Branch);

        assert_eq!(state.memory.read(0x100), 0x90 | 0x02);
        assert_eq!(state.memory.read(0x101), 0x45);
        assert_eq!(state.regs.par.value(), 0x102);
    }

    #[test]
    fn conditional_branches_follow_the_flags() {
        let mut state = MachineState::new();
        state.regs.set_mar(0x200);
        state.regs.set_par(0x004);

        state.regs.opcode = 0xB0; // BZE
        state.flags.zero = false;
        exec(&mut state, MicroOp::Branch);
        assert_eq!(state.regs.par.value(), 0x004);

        state.flags.zero = true;
        exec(&mut state, MicroOp::Branch);
        assert_eq!(state.regs.par.value(), 0x200);

        state.regs.opcode = 0xC0; // BNC
        state.regs.set_par(0x004);
        state.flags.carry = true;
        exec(&mut state, MicroOp::Branch);
        assert_eq!(state.regs.par.value(), 0x004);

        state.regs.opcode = 0xC8; // BXZ
        state.regs.index = 0;
        exec(&mut state, MicroOp::Branch);
        assert_eq!(state.regs.par.value(), 0x200);
    }

    #[test]
    fn bst_branches_and_halts() {
        let mut state = MachineState::new();
        state.regs.opcode = 0x98;
        state.regs.set_mar(0x000);
        exec(&mut state, MicroOp::Branch);
        assert!(state.mode.halted);
    }

    #[test]
    fn ski_consumes_the_interrupt() {
        let mut state = MachineState::new();
        state.io.interrupt = true;
        state.status.interrupt = true;
        state.regs.buffer = 1;
        state.regs.set_par(0x010);
        exec(&mut state, MicroOp::SkipIfInterrupt);

        assert_eq!(state.regs.par.value(), 0x012);
        assert_eq!(state.regs.countdown, 1);
        assert!(!state.io.interrupt);

        // Without the status line the skip does not happen, but the
        // interrupt is still cleared.
        state.io.interrupt = true;
        state.status.interrupt = false;
        exec(&mut state, MicroOp::SkipIfInterrupt);
        assert_eq!(state.regs.par.value(), 0x012);
        assert!(!state.io.interrupt);
    }

    #[test]
    fn stores_write_registers_to_memory() {
        let mut state = MachineState::new();
        state.regs.set_mar(0x060);
        state.regs.accumulator = 0x11;
        state.regs.index = 0x22;
        state.regs.quotient = 0x33;
        exec(&mut state, MicroOp::StoreAccToMem);
        assert_eq!(state.memory.read(0x060), 0x11);
        exec(&mut state, MicroOp::StoreXToMem);
        assert_eq!(state.memory.read(0x060), 0x22);
        exec(&mut state, MicroOp::StoreQToMem);
        assert_eq!(state.memory.read(0x060), 0x33);
    }

    #[test]
    fn copy_cell_advances_mar() {
        let mut state = MachineState::new();
        state.memory.write(0x090, 0x7E);
        state.regs.set_mar(0x090);
        exec(&mut state, MicroOp::CopyMemToMemPlusOne);
        assert_eq!(state.memory.read(0x091), 0x7E);
        assert_eq!(state.regs.mar.value(), 0x091);
    }

    #[test]
    fn unimplemented_opcode_raises_inst_error() {
        let mut state = MachineState::new();
        state.regs.opcode = 0x05;
        state.timing.acquisition = false;
        step(&mut state);
        assert!(state.flags.inst_error);
        assert!(state.mode.halted);

        // With the bypass switch the machine keeps running.
        let mut state = MachineState::new();
        state.regs.opcode = 0x05;
        state.timing.acquisition = false;
        state.panel_input.error_inst = true;
        step(&mut state);
        assert!(state.flags.inst_error);
        assert!(!state.mode.halted);
    }

    #[test]
    fn buses_clear_at_phase_boundaries() {
        let mut state = MachineState::new();
        state.x_bus.drive(0x12);
        state.z_bus.drive(0x34);
        state.f_bus.drive(0x56);

        step(&mut state); // CP1 clears X/Y/Z
        assert!(!state.x_bus.driven());
        assert!(state.f_bus.driven());

        state.timing.advance();
        state.f_bus.drive(0x56);
        step(&mut state); // CP2 clears F
        assert!(!state.f_bus.driven());
    }

    #[test]
    fn step_mirrors_distributor_into_display_register() {
        let mut state = MachineState::new();
        state.timing.distributor = u4::new(7);
        step(&mut state);
        assert_eq!(state.regs.distributor.value(), 7);
    }

    #[test]
    fn halted_machine_does_not_step() {
        let mut state = MachineState::new();
        state.mode.halted = true;
        state.memory.write(0x000, 0x02);
        step(&mut state);
        assert_eq!(state.regs.opcode, 0x00);
        assert!(state.trace.is_empty());
    }
}

//! The front-panel switch state and the applier that folds it into the
//! machine.
//!
//! Momentary switches last one host cycle and are cleared by the frontend
//! after each frame; latched switches hold their level. While the machine is
//! halted the applier is the only way to nudge it into a specific state;
//! while it runs, the latched switches are observed by the skip instructions
//! and the I/O dispatcher.

use arbitrary_int::u4;

use crate::machine::MachineState;
use crate::timing::ClockPhase;

/// The register a panel load operation writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadTarget {
    /// No load pending.
    #[default]
    None,
    /// The `A` accumulator.
    Accumulator,
    /// The `B` buffer register.
    Buffer,
    /// The `C` countdown register.
    Countdown,
    /// The `D` distributor display register (low 4 bits).
    Distributor,
    /// The `OP` opcode register.
    Opcode,
    /// The `MAR` memory address register (full 10 bits).
    Mar,
    /// The `PAR` program address register (full 10 bits).
    Par,
    /// The `Q` quotient register.
    Quotient,
    /// The `X` index register.
    Index,
}

/// The state of every front-panel switch and key.
#[derive(Debug, Clone)]
pub struct PanelInput {
    /// Momentary: begin stepping or pace a manual transfer.
    pub start: bool,
    /// Momentary: stop stepping.
    pub stop: bool,
    /// Momentary: clear registers and timing.
    pub clear: bool,
    /// Momentary: light every lamp.
    pub lamp_test: bool,
    /// Momentary: reload the program and reset.
    pub reset: bool,
    /// Latched: main power.
    pub power_on: bool,
    /// Momentary: a data key was struck this cycle.
    pub key_pressed: bool,
    /// A key value has been captured since the last clear.
    pub has_last_key: bool,
    /// The value of the key currently held.
    pub key_value: u8,
    /// The most recently captured key value.
    pub last_key: u8,
    /// The 10 data input switches.
    pub input_switches: u16,
    /// Latched I/O display mode selector (0..3).
    pub io_mode: u8,
    /// Latched stepping mode selector (0..3).
    pub mode: u8,
    /// Latched: manual memory examine.
    pub mem_read: bool,
    /// Latched: manual memory deposit.
    pub mem_write: bool,
    /// Momentary: load `input_switches` into [`Self::load_target`].
    pub load_pressed: bool,
    /// The register the pending load writes to.
    pub load_target: LoadTarget,
    /// Latched: repeat the current instruction instead of advancing.
    pub rpt: bool,
    /// Latched: the sense switch read by `SKS`.
    pub sense: bool,
    /// Latched: continue past instruction errors instead of halting.
    pub error_inst: bool,
    /// Latched: continue past add/subtract overflow instead of halting.
    pub error_add: bool,
    /// Latched: continue past divide overflow instead of halting.
    pub error_div: bool,
    /// Latched: I/O preset read select.
    pub io_read: bool,
    /// Latched: I/O preset write select.
    pub io_write: bool,
    /// Latched: I/O preset interrupt-terminated select.
    pub io_intrp: bool,
    /// Latched: I/O preset block select.
    pub io_block: bool,
}

impl Default for PanelInput {
    fn default() -> Self {
        Self::new()
    }
}

impl PanelInput {
    /// Create the power-on switch state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: false,
            stop: false,
            clear: false,
            lamp_test: false,
            reset: false,
            power_on: true,
            key_pressed: false,
            has_last_key: false,
            key_value: 0,
            last_key: 0,
            input_switches: 0,
            io_mode: 1,
            mode: 0,
            mem_read: false,
            mem_write: false,
            load_pressed: false,
            load_target: LoadTarget::None,
            rpt: false,
            sense: false,
            error_inst: false,
            error_add: false,
            error_div: false,
            io_read: false,
            io_write: false,
            io_intrp: false,
            io_block: false,
        }
    }

    /// Release every momentary switch.
    pub fn clear_momentary(&mut self) {
        self.start = false;
        self.stop = false;
        self.clear = false;
        self.lamp_test = false;
        self.reset = false;
        self.key_pressed = false;
        self.load_pressed = false;
        self.load_target = LoadTarget::None;
    }

    fn clear_key_state(&mut self) {
        self.key_value = 0;
        self.last_key = 0;
        self.has_last_key = false;
        self.load_pressed = false;
        self.load_target = LoadTarget::None;
    }
}

/// The remembered position of a latched panel switch combination.
///
/// A latched switch stays where the operator left it, so a controller that
/// must act once per throw compares each applier pass against the position
/// seen on the previous pass.
#[derive(Debug, Clone, Copy)]
struct SwitchEdge {
    level: bool,
}

impl SwitchEdge {
    fn resting_at(level: bool) -> Self {
        Self { level }
    }

    /// Observe the switch for this pass; `true` when the operator has just
    /// thrown it on.
    fn thrown_on(&mut self, level: bool) -> bool {
        let was_on = self.level;
        self.level = level;
        level && !was_on
    }

    /// Observe the switch for this pass; `true` when the operator moved it
    /// in either direction.
    fn moved(&mut self, level: bool) -> bool {
        let moved = self.level != level;
        self.level = level;
        moved
    }
}

/// Folds panel switch changes into the machine between executor steps.
///
/// The controller keeps a one-cycle prior snapshot of the switch
/// combinations that act on edges (power toggle and the I/O presets), so a
/// held switch fires exactly once.
#[derive(Debug)]
pub struct PanelController {
    power: SwitchEdge,
    read_intrp: SwitchEdge,
    write_block: SwitchEdge,
}

impl Default for PanelController {
    fn default() -> Self {
        Self::new()
    }
}

impl PanelController {
    /// Create a controller whose snapshot matches the power-on panel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            power: SwitchEdge::resting_at(true),
            read_intrp: SwitchEdge::resting_at(false),
            write_block: SwitchEdge::resting_at(false),
        }
    }

    /// Apply the current panel state to the machine.
    ///
    /// `reset_hook` reloads the installed program when the operator presses
    /// reset. Returns `true` when the start press was consumed by a manual
    /// memory access, in which case the host must not also start the clock.
    pub fn apply(
        &mut self,
        state: &mut MachineState,
        reset_hook: Option<&mut dyn FnMut(&mut MachineState)>,
    ) -> bool {
        state.status.sense = state.panel_input.sense;
        state.status.interrupt = state.io.interrupt;

        if self.power.moved(state.panel_input.power_on) {
            if !state.panel_input.power_on {
                state.clear_registers();
            }
            state.timing.reset();
            state.mode.halted = true;
            state.io.cancel_transfer();
            state.panel_input.clear_key_state();
            state.panel_input.clear_momentary();
        }

        if !state.panel_input.power_on {
            state.mode.halted = true;
            // Track the preset switch levels so power-on does not replay a
            // stale edge.
            self.track_preset_switches(state);
            return false;
        }

        if state.panel_input.reset {
            if let Some(hook) = reset_hook {
                hook(state);
            }
            state.timing.reset();
            state.mode.halted = true;
            state.io.cancel_transfer();
            state.panel_input.input_switches = 0;
            state.panel_input.clear_key_state();
        }

        if state.panel_input.clear {
            state.clear_registers();
            state.mode.halted = true;
            state.io.cancel_transfer();
        }

        self.apply_io_preset(state);
        Self::apply_register_load(state);
        Self::apply_manual_memory(state)
    }

    fn track_preset_switches(&mut self, state: &MachineState) {
        let _ = self
            .read_intrp
            .thrown_on(state.panel_input.io_read && state.panel_input.io_intrp);
        let _ = self
            .write_block
            .thrown_on(state.panel_input.io_write && state.panel_input.io_block);
    }

    /// Prime the machine for an I/O transfer when a preset combination is
    /// newly thrown.
    fn apply_io_preset(&mut self, state: &mut MachineState) {
        let read_intrp = state.panel_input.io_read && state.panel_input.io_intrp;
        let write_block = state.panel_input.io_write && state.panel_input.io_block;

        if self.read_intrp.thrown_on(read_intrp) {
            Self::prime_transfer(state, 0xE8);
        }
        if self.write_block.thrown_on(write_block) {
            Self::prime_transfer(state, 0xD0);
        }
    }

    fn prime_transfer(state: &mut MachineState, opcode: u8) {
        state.regs.opcode = opcode;
        state.regs.countdown = 0xFF;
        state.timing.distributor = u4::new(0);
        state.timing.phase = ClockPhase::Cp1;
        state.timing.acquisition = false;
        state.regs.distributor = state.timing.distributor;
    }

    /// Write the input switches into the selected register.
    fn apply_register_load(state: &mut MachineState) {
        if !state.panel_input.load_pressed {
            return;
        }
        let input = state.panel_input.input_switches;
        let low8 = (input & 0xFF) as u8;
        match state.panel_input.load_target {
            LoadTarget::Accumulator => state.regs.accumulator = low8,
            LoadTarget::Buffer => state.regs.buffer = low8,
            LoadTarget::Countdown => state.regs.countdown = low8,
            LoadTarget::Distributor => state.regs.distributor = u4::new(low8 & 0x0F),
            LoadTarget::Opcode => state.regs.opcode = low8,
            LoadTarget::Mar => state.regs.set_mar(input),
            LoadTarget::Par => state.regs.set_par(input),
            LoadTarget::Quotient => state.regs.quotient = low8,
            LoadTarget::Index => state.regs.index = low8,
            LoadTarget::None => {}
        }
        state.panel_input.load_pressed = false;
        state.panel_input.load_target = LoadTarget::None;
    }

    /// Deposit or examine one memory cell at `MAR`, post-incrementing.
    fn apply_manual_memory(state: &mut MachineState) -> bool {
        if !state.panel_input.start {
            return false;
        }
        if !state.panel_input.mem_read && !state.panel_input.mem_write {
            return false;
        }
        let address = state.regs.mar.value();
        if state.panel_input.mem_write {
            let value = (state.panel_input.input_switches & 0xFF) as u8;
            state.memory.write(address, value);
        } else {
            let value = state.memory.read(address);
            let upper = state.panel_input.input_switches & 0x300;
            state.panel_input.input_switches = upper | u16::from(value);
        }
        state.regs.set_mar(address.wrapping_add(1));
        true
    }
}

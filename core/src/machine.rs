//! The single owning state value of an emulated CT-10.
//!
//! Every core component operates on a [`MachineState`] passed in explicitly;
//! there are no back-pointers and no shared ownership. The host owns the
//! value, the execution engine mutates it during stepping, and collaborators
//! (program loader, panel applier, snapshot codec) touch it only while the
//! machine is not running.

use arbitrary_int::u4;

use crate::bus::Bus;
use crate::io::IoState;
use crate::memory::Memory;
use crate::microcode::MicroOp;
use crate::panel::PanelInput;
use crate::registers::Registers;
use crate::timing::{ClockPhase, TimingState};

/// The arithmetic and error flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    /// Carry out of the last add, or not-borrow of the last subtract.
    pub carry: bool,
    /// The last examined value was zero.
    pub zero: bool,
    /// The last examined value was non-negative and non-zero.
    pub greater: bool,
    /// The last examined value had its sign bit set.
    pub less: bool,
    /// The last add or subtract overflowed two's-complement range.
    pub add_overflow: bool,
    /// The last divide had a zero divisor or an out-of-range quotient.
    pub divide_overflow: bool,
    /// An execute phase began with an opcode the microcode does not
    /// implement.
    pub inst_error: bool,
}

/// The run/halt latch.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeState {
    /// The machine is stopped; `step` returns immediately.
    pub halted: bool,
}

/// The status lines readable by the program through `SST` and the skip
/// instructions.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusFlags {
    /// Mirror of the I/O interrupt line.
    pub interrupt: bool,
    /// Mirror of the panel sense switch.
    pub sense: bool,
    /// The program-controlled flag, set and cleared by `FLS`/`FLC`.
    pub flag: bool,
    /// The machine is in an I/O wait state.
    pub wait: bool,
}

impl StatusFlags {
    /// Pack the status lines into the byte read by `SST`.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        u8::from(self.interrupt) | u8::from(self.sense) << 1 | u8::from(self.flag) << 2
    }
}

/// One recorded micro-operation with the coordinate it fired at.
#[derive(Debug, Clone, Copy)]
pub struct TraceEntry {
    /// The distributor count at the time of execution.
    pub distributor: u4,
    /// The clock phase at the time of execution.
    pub phase: ClockPhase,
    /// Whether the machine was in the acquisition half.
    pub acquisition: bool,
    /// The executed micro-operation.
    pub op: MicroOp,
}

/// The complete architectural state of an emulated CT-10.
#[derive(Debug, Clone)]
pub struct MachineState {
    /// The register file.
    pub regs: Registers,
    /// The `X` bus.
    pub x_bus: Bus,
    /// The `Y` bus.
    pub y_bus: Bus,
    /// The `Z` bus. The only bus that carries the complemented convention.
    pub z_bus: Bus,
    /// The `F` bus, carrying ALU results.
    pub f_bus: Bus,
    /// The 1 KiB core memory.
    pub memory: Memory,
    /// Arithmetic and error flags.
    pub flags: Flags,
    /// The timing coordinate.
    pub timing: TimingState,
    /// The run/halt latch.
    pub mode: ModeState,
    /// Program-visible status lines.
    pub status: StatusFlags,
    /// The I/O subsystem.
    pub io: IoState,
    /// The front-panel switch state.
    pub panel_input: PanelInput,
    /// Ring of recently executed micro-operations, newest last.
    pub trace: Vec<TraceEntry>,
}

impl Default for MachineState {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineState {
    /// The number of trace entries retained before the oldest is evicted.
    pub const TRACE_CAPACITY: usize = 512;

    /// Create a machine in its power-on state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            x_bus: Bus::new(),
            y_bus: Bus::new(),
            z_bus: Bus::new(),
            f_bus: Bus::new(),
            memory: Memory::new(),
            flags: Flags::default(),
            timing: TimingState::new(),
            mode: ModeState::default(),
            status: StatusFlags::default(),
            io: IoState::new(),
            panel_input: PanelInput::new(),
            trace: Vec::new(),
        }
    }

    /// Clear everything: registers, buses, flags, timing, I/O buffers and
    /// panel input. Memory is left untouched.
    pub fn reset(&mut self) {
        self.clear_registers();
        self.io = IoState::new();
        self.panel_input = PanelInput::new();
    }

    /// Clear registers, buses, flags, timing and the trace, preserving
    /// memory and the I/O buffers.
    pub fn clear_registers(&mut self) {
        self.regs.clear();
        self.x_bus.clear();
        self.y_bus.clear();
        self.z_bus.clear();
        self.f_bus.clear();
        self.flags = Flags::default();
        self.timing.reset();
        self.mode = ModeState::default();
        self.status = StatusFlags::default();
        self.trace.clear();
    }

    /// Record a fired micro-operation at the current timing coordinate.
    pub fn add_trace(&mut self, op: MicroOp) {
        if self.trace.len() >= Self::TRACE_CAPACITY {
            self.trace.remove(0);
        }
        self.trace.push(TraceEntry {
            distributor: self.timing.distributor,
            phase: self.timing.phase,
            acquisition: self.timing.acquisition,
            op,
        });
    }

    /// Drop all recorded trace entries.
    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }
}

//! The I/O subsystem state of the CT-10.
//!
//! Three byte-stream devices hang off the machine: the paper-tape channel
//! (device 0), the terminal (device 1) and the printer (device 2, output
//! only). Block transfers between a device and memory run as a small
//! asynchronous sub-state machine driven by the execution engine; its
//! bookkeeping lives here.

/// The paper-tape channel, device id 0.
pub const DEVICE_TAPE: u8 = 0;
/// The terminal, device id 1.
pub const DEVICE_TERMINAL: u8 = 1;
/// The printer, device id 2. Output only.
pub const DEVICE_PRINTER: u8 = 2;

/// The kind of I/O transfer currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoTransferMode {
    /// No transfer in flight; the engine runs instructions normally.
    #[default]
    None,
    /// Human-paced output: one byte from memory to the panel switches per
    /// press of the start switch.
    ManualOutput,
    /// Human-paced input: one byte from the panel switches to memory per
    /// press of the start switch.
    ManualInput,
    /// Block read from the selected device into memory, bounded by the
    /// countdown register.
    ReadBlock,
    /// Block write from memory to the selected device, bounded by the
    /// countdown register.
    WriteBlock,
    /// Read from the selected device into memory until the input is
    /// exhausted and the interrupt line rises.
    ReadInterrupt,
}

/// The state of the I/O devices and the transfer controller.
#[derive(Debug, Clone, Default)]
pub struct IoState {
    /// Bytes queued on the paper-tape input channel.
    pub input_data: Vec<u8>,
    /// Bytes the machine has written to the paper-tape output channel.
    pub output_data: Vec<u8>,
    /// Read cursor into [`Self::input_data`].
    pub input_pos: usize,
    /// Bytes queued on the terminal input channel.
    pub terminal_input: Vec<u8>,
    /// Bytes the machine has written to the terminal.
    pub terminal_output: Vec<u8>,
    /// Read cursor into [`Self::terminal_input`].
    pub terminal_input_pos: usize,
    /// Bytes the machine has written to the printer.
    pub printer_output: Vec<u8>,
    /// The interrupt line, raised when a read exhausts its source.
    pub interrupt: bool,
    /// The last device-control command seen by `OCD`.
    pub last_command: u8,
    /// The packed status byte readable through `SST`.
    pub status: u8,
    /// The device id transfers are routed to.
    pub selected_device: u8,
    /// Hex display mode latch, set through `OCD` or the panel.
    pub hex_mode: bool,
    /// Alphanumeric display mode latch, set through `OCD` or the panel.
    pub alpha_mode: bool,
    /// The kind of transfer currently in flight.
    pub transfer_mode: IoTransferMode,
    /// The memory address the next transferred byte touches.
    pub transfer_address: u16,
    /// Bytes left in a bounded transfer.
    pub transfer_remaining: u16,
    /// Pacing counter; one idle microstep is inserted between bytes.
    pub wait_cycles: u8,
}

impl IoState {
    /// Create a new (idle, empty) I/O state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the output buffer of the currently selected device.
    ///
    /// Unknown device ids fall back to the tape channel.
    pub fn output_buffer_mut(&mut self) -> &mut Vec<u8> {
        match self.selected_device {
            DEVICE_TERMINAL => &mut self.terminal_output,
            DEVICE_PRINTER => &mut self.printer_output,
            _ => &mut self.output_data,
        }
    }

    /// Consume one byte from the selected device's input stream.
    ///
    /// Returns `None` and raises the interrupt line when the stream is
    /// exhausted (the printer has no input stream at all).
    pub(crate) fn read_input_byte(&mut self) -> Option<u8> {
        let value = match self.selected_device {
            DEVICE_TERMINAL => {
                let value = self.terminal_input.get(self.terminal_input_pos).copied();
                if value.is_some() {
                    self.terminal_input_pos += 1;
                }
                value
            }
            DEVICE_PRINTER => None,
            _ => {
                let value = self.input_data.get(self.input_pos).copied();
                if value.is_some() {
                    self.input_pos += 1;
                }
                value
            }
        };
        if value.is_none() {
            self.interrupt = true;
        }
        value
    }

    /// Abort any in-flight transfer and zero its bookkeeping.
    pub fn cancel_transfer(&mut self) {
        self.transfer_mode = IoTransferMode::None;
        self.transfer_address = 0;
        self.transfer_remaining = 0;
        self.wait_cycles = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tape_input_is_consumed_in_order() {
        let mut io = IoState::new();
        io.input_data = vec![0x41, 0x42];

        assert_eq!(io.read_input_byte(), Some(0x41));
        assert_eq!(io.read_input_byte(), Some(0x42));
        assert!(!io.interrupt);

        assert_eq!(io.read_input_byte(), None);
        assert!(io.interrupt);
    }

    #[test]
    fn printer_has_no_input_stream() {
        let mut io = IoState::new();
        io.selected_device = DEVICE_PRINTER;
        io.input_data = vec![0x01];

        assert_eq!(io.read_input_byte(), None);
        assert!(io.interrupt);
        assert_eq!(io.input_pos, 0);
    }

    #[test]
    fn output_routes_by_selected_device() {
        let mut io = IoState::new();
        io.selected_device = DEVICE_TERMINAL;
        io.output_buffer_mut().push(0x11);
        assert_eq!(io.terminal_output, vec![0x11]);
        assert!(io.output_data.is_empty());
    }
}

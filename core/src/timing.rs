//! The CT-10's microcycle clock.
//!
//! The machine steps on a two-dimensional timing coordinate: a 16-count
//! distributor crossed with a 3-phase clock. One full distributor sweep is
//! half an instruction; the `acquisition` flag selects between the
//! instruction-fetch half and the execute half and toggles each time the
//! distributor wraps.

use arbitrary_int::u4;

/// One of the three clock phases within a distributor count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockPhase {
    /// The first clock phase.
    ///
    /// The `X`, `Y` and `Z` buses are released at the start of this phase.
    Cp1,
    /// The second clock phase.
    ///
    /// The `F` bus is released at the start of this phase.
    Cp2,
    /// The third (and last) clock phase.
    ///
    /// At the end of this phase the distributor advances.
    Cp3,
}

/// The timing coordinate of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingState {
    /// The 4-bit distributor count.
    pub distributor: u4,
    /// The current clock phase.
    pub phase: ClockPhase,
    /// `true` during the instruction-fetch half of the microcycle, `false`
    /// during the execute half.
    pub acquisition: bool,
}

impl Default for TimingState {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingState {
    /// Create a timing state at the start of an acquisition sweep.
    #[must_use]
    pub fn new() -> Self {
        Self {
            distributor: u4::new(0),
            phase: ClockPhase::Cp1,
            acquisition: true,
        }
    }

    /// Reset to distributor 0, phase CP1, acquisition.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advance by exactly one clock phase.
    ///
    /// On the CP3 to CP1 transition the distributor increments modulo 16,
    /// and when it wraps to zero the acquisition flag toggles.
    pub fn advance(&mut self) {
        match self.phase {
            ClockPhase::Cp1 => self.phase = ClockPhase::Cp2,
            ClockPhase::Cp2 => self.phase = ClockPhase::Cp3,
            ClockPhase::Cp3 => {
                self.phase = ClockPhase::Cp1;
                self.distributor = u4::new((self.distributor.value() + 1) & 0x0F);
                if self.distributor.value() == 0 {
                    self.acquisition = !self.acquisition;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_rotate_in_order() {
        let mut timing = TimingState::new();
        assert_eq!(timing.phase, ClockPhase::Cp1);
        timing.advance();
        assert_eq!(timing.phase, ClockPhase::Cp2);
        timing.advance();
        assert_eq!(timing.phase, ClockPhase::Cp3);
        timing.advance();
        assert_eq!(timing.phase, ClockPhase::Cp1);
        assert_eq!(timing.distributor.value(), 1);
    }

    #[test]
    fn acquisition_toggles_on_distributor_wrap() {
        let mut timing = TimingState::new();
        for _ in 0..(3 * 16) {
            timing.advance();
        }
        assert_eq!(timing.distributor.value(), 0);
        assert!(!timing.acquisition);
    }

    /// After 3 phases x 16 counts x 2 halves the clock is back where it began.
    #[test]
    fn full_cycle_returns_to_reset_state() {
        let mut timing = TimingState::new();
        let initial = timing;
        for _ in 0..(3 * 16 * 2) {
            timing.advance();
        }
        assert_eq!(timing, initial);
    }
}

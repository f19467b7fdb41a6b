//! Latch controller

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{thread, time::Duration};
use log::{debug, info, warn};
use serde::Serialize;

use super::{LatchHw, LatchParams};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Controller of the docking electromagnet.
pub struct LatchCtrl<L: LatchHw> {
    hw: L,

    params: LatchParams,

    /// Commanded state, `None` until the first command
    state: Option<LatchState>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LatchState {
    Energized,
    Released,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<L: LatchHw> LatchCtrl<L> {
    pub fn new(hw: L, params: LatchParams) -> Self {
        Self {
            hw,
            params,
            state: None,
        }
    }

    pub fn state(&self) -> Option<LatchState> {
        self.state
    }

    /// Energize the magnet. Does nothing if already energized.
    ///
    /// The state only changes once the hardware accepts the write, so a failed command is
    /// repeated by the next call.
    pub fn energize(&mut self) {
        if self.state == Some(LatchState::Energized) {
            debug!("Latch already energized");
            return
        }

        info!("Energizing latch");
        if self.write(self.params.energize_duty) {
            self.state = Some(LatchState::Energized);
        }
    }

    /// Release the magnet. A short reduced-power pulse is driven before power is cut to
    /// dissipate residual magnetism. Does nothing if already released.
    ///
    /// The latch is only recorded as released once power has been cut.
    pub fn release(&mut self) {
        if self.state == Some(LatchState::Released) {
            debug!("Latch already released");
            return
        }

        info!("Releasing latch");
        self.write(self.params.release_pulse_duty);
        thread::sleep(Duration::from_secs_f64(self.params.release_pulse_s.max(0.0)));
        if self.write(0.0) {
            self.state = Some(LatchState::Released);
        }
    }

    /// Returns whether the hardware accepted the duty.
    fn write(&mut self, duty: f64) -> bool {
        match self.hw.set_duty(duty.max(0.0).min(1.0)) {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not set latch duty to {:.2}: {}", duty, e);
                false
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::eqpt::fake::*;

    #[test]
    fn test_release_pulses_then_cuts() {
        let (_, latch, log) = pair();
        let mut ctrl = LatchCtrl::new(latch, latch_params());

        ctrl.energize();
        ctrl.release();

        assert_eq!(
            *log.borrow(), 
            vec![Event::LatchDuty(1.0), Event::LatchDuty(0.1), Event::LatchDuty(0.0)]
        );
        assert_eq!(ctrl.state(), Some(LatchState::Released));
    }

    #[test]
    fn test_idempotent() {
        let (_, latch_once, log_once) = pair();
        let (_, latch_twice, log_twice) = pair();
        let mut once = LatchCtrl::new(latch_once, latch_params());
        let mut twice = LatchCtrl::new(latch_twice, latch_params());

        once.energize();
        once.release();

        twice.energize();
        twice.energize();
        twice.release();
        twice.release();

        assert_eq!(once.state(), twice.state());
        assert_eq!(*log_once.borrow(), *log_twice.borrow());
    }

    #[test]
    fn test_failed_release_is_retried() {
        let (_, latch, log) = pair();
        let broken = latch.fail.clone();
        let mut ctrl = LatchCtrl::new(latch, latch_params());

        ctrl.energize();
        broken.set(true);
        ctrl.release();

        // Power was never confirmed cut
        assert_eq!(ctrl.state(), Some(LatchState::Energized));

        broken.set(false);
        ctrl.release();
        ctrl.release();

        assert_eq!(ctrl.state(), Some(LatchState::Released));
        assert_eq!(
            *log.borrow(),
            vec![
                Event::LatchDuty(1.0),
                Event::LatchDuty(0.1), Event::LatchDuty(0.0),
                Event::LatchDuty(0.1), Event::LatchDuty(0.0),
            ]
        );
    }

    #[test]
    fn test_failed_energize_is_retried() {
        let (_, latch, log) = pair();
        latch.fail.set(true);
        let broken = latch.fail.clone();
        let mut ctrl = LatchCtrl::new(latch, latch_params());

        ctrl.energize();
        assert_eq!(ctrl.state(), None);

        broken.set(false);
        ctrl.energize();
        assert_eq!(ctrl.state(), Some(LatchState::Energized));
        assert_eq!(*log.borrow(), vec![Event::LatchDuty(1.0), Event::LatchDuty(1.0)]);
    }
}

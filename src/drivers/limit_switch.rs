//! Limit-switch debouncing.
//!
//! Mechanical end-of-travel contacts bounce for several milliseconds on
//! every actuation.  A reading is accepted only after it remains stable
//! for [`DEBOUNCE_MS`] milliseconds, sampled in [`DEBOUNCE_STEP_MS`] steps;
//! any flip restarts the stability window.  Both switches settle in the
//! same pass so the joint-assertion check sees a coherent pair.
//!
//! A permanently chattering contact would otherwise never converge, so the
//! settle loop gives up after [`DEBOUNCE_SETTLE_CAP_MS`] and reports the
//! last raw sample; the inconsistency check downstream deals with it.

use crate::app::ports::{ClockPort, SwitchPort};
use crate::config::{DEBOUNCE_MS, DEBOUNCE_SETTLE_CAP_MS, DEBOUNCE_STEP_MS};
use crate::fsm::context::LimitSnapshot;

/// Sample both limit switches until stable.  Called at the top of every
/// FSM cycle; delays go through [`ClockPort`] so host tests use a virtual
/// clock.
pub fn settle<H: SwitchPort + ClockPort>(hw: &mut H) -> LimitSnapshot {
    let mut level = hw.sample_limits();
    let mut stable_ms = 0u32;
    let mut elapsed_ms = 0u32;

    while stable_ms < DEBOUNCE_MS {
        hw.delay_ms(DEBOUNCE_STEP_MS);
        elapsed_ms += DEBOUNCE_STEP_MS;

        let sample = hw.sample_limits();
        if sample == level {
            stable_ms += DEBOUNCE_STEP_MS;
        } else {
            level = sample;
            stable_ms = 0;
        }

        if elapsed_ms >= DEBOUNCE_SETTLE_CAP_MS {
            log::warn!("limit switches did not settle within {elapsed_ms}ms");
            break;
        }
    }

    level
}

//! Outbound application events and the shared status snapshot.
//!
//! The [`GateService`](super::service::GateService) emits [`GateEvent`]s
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on
//! the other side decide what to do with them — log to serial, publish
//! over MQTT, render on the portal page.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use serde::Serialize;

use crate::error::ErrorCode;
use crate::fsm::context::{LimitSnapshot, MotorCmd};
use crate::fsm::GateState;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum GateEvent {
    /// `gate_state` changed; emitted exactly once per transition.
    StatusChanged(StatusFrame),
    /// Periodic snapshot, independent of transitions.
    Telemetry(StatusFrame),
}

// ---------------------------------------------------------------------------
// Status frame (broker payload)
// ---------------------------------------------------------------------------

/// The wire payload for both the status and telemetry topics.
///
/// Field names and the `state` string alphabet are consumed by deployed
/// dashboards; both must stay verbatim.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusFrame {
    pub state: &'static str,
    pub lsa_open: bool,
    pub lsc_closed: bool,
    pub motor_open: bool,
    pub motor_close: bool,
    /// Absent only in the synthetic just-connected message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<u8>,
}

impl StatusFrame {
    pub fn new(
        state: GateState,
        limits: LimitSnapshot,
        motor: MotorCmd,
        err: Option<ErrorCode>,
    ) -> Self {
        Self {
            state: state.wire_name(),
            lsa_open: limits.open,
            lsc_closed: limits.closed,
            motor_open: motor == MotorCmd::Opening,
            motor_close: motor == MotorCmd::Closing,
            err: err.map(ErrorCode::code),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared status cell
// ---------------------------------------------------------------------------

/// Last published snapshot, mirrored into relaxed atomics.
///
/// The FSM task is the sole writer; the HTTP portal and the broker's
/// connect callback read it for display and for the synthetic connected
/// message.  Staleness of a cycle or two is acceptable there, hence the
/// relaxed ordering.
pub struct StatusCell {
    state_idx: AtomicU8,
    lsa_open: AtomicBool,
    lsc_closed: AtomicBool,
    motor_open: AtomicBool,
    motor_close: AtomicBool,
    err: AtomicU8,
}

impl StatusCell {
    pub const fn new() -> Self {
        Self {
            state_idx: AtomicU8::new(GateState::Initial as u8),
            lsa_open: AtomicBool::new(false),
            lsc_closed: AtomicBool::new(false),
            motor_open: AtomicBool::new(false),
            motor_close: AtomicBool::new(false),
            err: AtomicU8::new(0),
        }
    }

    /// Publish the latest cycle snapshot.  FSM task only.
    pub fn store(
        &self,
        state: GateState,
        limits: LimitSnapshot,
        motor: MotorCmd,
        err: ErrorCode,
    ) {
        self.state_idx.store(state as u8, Ordering::Relaxed);
        self.lsa_open.store(limits.open, Ordering::Relaxed);
        self.lsc_closed.store(limits.closed, Ordering::Relaxed);
        self.motor_open
            .store(motor == MotorCmd::Opening, Ordering::Relaxed);
        self.motor_close
            .store(motor == MotorCmd::Closing, Ordering::Relaxed);
        self.err.store(err.code(), Ordering::Relaxed);
    }

    /// Current state for display.
    pub fn state(&self) -> GateState {
        GateState::from_index(self.state_idx.load(Ordering::Relaxed) as usize)
    }

    /// Current fault code for display.
    pub fn err_code(&self) -> u8 {
        self.err.load(Ordering::Relaxed)
    }

    /// Build a frame from the cell.  `with_err = false` produces the
    /// synthetic just-connected message (no error field).
    pub fn frame(&self, with_err: bool) -> StatusFrame {
        let motor_open = self.motor_open.load(Ordering::Relaxed);
        let motor_close = self.motor_close.load(Ordering::Relaxed);
        StatusFrame {
            state: self.state().wire_name(),
            lsa_open: self.lsa_open.load(Ordering::Relaxed),
            lsc_closed: self.lsc_closed.load(Ordering::Relaxed),
            motor_open,
            motor_close,
            err: with_err.then(|| self.err.load(Ordering::Relaxed)),
        }
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

//! Shared mutable context threaded through every FSM handler.
//!
//! `GateContext` is the single struct that state handlers read from and
//! write to.  It contains the latest debounced limit readings, the pending
//! command, output commands, the motion deadline, and the fault code.
//! Think of it as the "blackboard" in a blackboard architecture.

use crate::app::commands::GateCommand;
use crate::error::ErrorCode;

// ---------------------------------------------------------------------------
// Limit snapshot (read-only to state handlers; written by the service)
// ---------------------------------------------------------------------------

/// Debounced end-of-travel contact readings, normalized to logical
/// asserted = `true` (the wire is active-low).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimitSnapshot {
    /// Gate is at the fully-open position.
    pub open: bool,
    /// Gate is at the fully-closed position.
    pub closed: bool,
}

impl LimitSnapshot {
    /// Both contacts asserted — a physically impossible condition.
    pub const fn inconsistent(self) -> bool {
        self.open && self.closed
    }
}

// ---------------------------------------------------------------------------
// Output commands (written by state handlers; applied by the service)
// ---------------------------------------------------------------------------

/// Desired motor drive.  The hardware adapter sequences the actual output
/// lines (opposite-off, brake gap, energize).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MotorCmd {
    #[default]
    Off,
    Opening,
    Closing,
}

/// Commands that state handlers write to request output actions.
/// The service applies these to the drivers after each FSM tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputCommands {
    pub motor: MotorCmd,
    /// Warning lamp; changed only by `LAMP_ON`/`LAMP_OFF` commands.
    pub lamp: bool,
}

// ---------------------------------------------------------------------------
// GateContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct GateContext {
    /// Latest debounced limit readings.  Updated before each FSM tick.
    pub limits: LimitSnapshot,
    /// Outputs to be applied after the FSM tick.
    pub commands: OutputCommands,
    /// At most one queued command, consumed by the current state's handler.
    pub pending_cmd: Option<GateCommand>,
    /// Monotonic milliseconds at the start of this cycle.
    pub now_ms: u64,
    /// Absolute deadline for the motion in progress, if any.
    pub deadline_at: Option<u64>,
    /// Current fault code (wire-visible).
    pub error_code: ErrorCode,
}

impl GateContext {
    pub fn new() -> Self {
        Self {
            limits: LimitSnapshot::default(),
            commands: OutputCommands::default(),
            pending_cmd: None,
            now_ms: 0,
            deadline_at: None,
            error_code: ErrorCode::Ok,
        }
    }

    /// Consume the pending command, if any.
    pub fn take_command(&mut self) -> Option<GateCommand> {
        self.pending_cmd.take()
    }

    /// Establish a motion deadline `duration_ms` from now.
    pub fn arm_deadline(&mut self, duration_ms: u64) {
        self.deadline_at = Some(self.now_ms + duration_ms);
    }

    /// Clear any armed deadline.
    pub fn disarm_deadline(&mut self) {
        self.deadline_at = None;
    }

    /// Whether the armed deadline has passed.  Strictly greater-than, so a
    /// limit that asserts exactly on the boundary wins over the timeout.
    pub fn deadline_expired(&self) -> bool {
        self.deadline_at.is_some_and(|at| self.now_ms > at)
    }
}

impl Default for GateContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_is_strictly_greater_than() {
        let mut ctx = GateContext::new();
        ctx.now_ms = 1_000;
        ctx.arm_deadline(15_000);

        ctx.now_ms = 16_000; // exactly on the boundary
        assert!(!ctx.deadline_expired());

        ctx.now_ms = 16_001;
        assert!(ctx.deadline_expired());
    }

    #[test]
    fn no_deadline_never_expires() {
        let mut ctx = GateContext::new();
        ctx.now_ms = u64::MAX;
        assert!(!ctx.deadline_expired());
    }
}

//! Gate service — the hexagonal core.
//!
//! [`GateService`] owns the FSM, its context, and the change-detection
//! bookkeeping for outbound publications.  All I/O flows through port
//! traits injected at call sites, making the entire service testable with
//! mock adapters.
//!
//! ```text
//!  SwitchPort ──▶ ┌────────────────────────┐ ──▶ EventSink
//!  ClockPort  ──▶ │      GateService        │
//!  MotorPort  ◀── │  FSM · debounce · pub   │
//!                 └────────────────────────┘
//! ```
//!
//! One [`cycle`](GateService::cycle) runs, in order: debounce both limits,
//! joint-assertion emergency check, consume at most one queued command,
//! FSM tick, apply outputs, publish.  A command observed in cycle *n* is
//! acted upon no later than the end of cycle *n*.

use std::sync::Arc;

use log::warn;

use crate::app::commands::{CommandQueue, GateCommand};
use crate::app::events::{GateEvent, StatusCell, StatusFrame};
use crate::app::ports::{ClockPort, EventSink, MotorPort, SwitchPort};
use crate::config::{IDLE_CYCLE_MS, MOVING_CYCLE_MS, PUB_PERIOD_MS};
use crate::drivers::limit_switch;
use crate::error::ErrorCode;
use crate::fsm::states::build_state_table;
use crate::fsm::{context::GateContext, Fsm, GateState};

// ───────────────────────────────────────────────────────────────
// GateService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrating all domain logic.
pub struct GateService {
    fsm: Fsm,
    ctx: GateContext,
    queue: Arc<CommandQueue>,
    status: Arc<StatusCell>,
    /// Sentinel `None` until the first publication, so the very first
    /// classified state is always reported.
    last_reported: Option<GateState>,
    last_telemetry_at: Option<u64>,
}

impl GateService {
    /// Construct the service.  Does **not** start the FSM — call
    /// [`start`](Self::start) next.
    pub fn new(queue: Arc<CommandQueue>, status: Arc<StatusCell>) -> Self {
        let fsm = Fsm::new(build_state_table(), GateState::Initial);
        Self {
            fsm,
            ctx: GateContext::new(),
            queue,
            status,
            last_reported: None,
            last_telemetry_at: None,
        }
    }

    /// Enter the initial state with every output de-energized.  The first
    /// cycle classifies the gate from its limit switches.
    pub fn start(&mut self, hw: &mut impl MotorPort) {
        hw.all_off();
        self.fsm.start(&mut self.ctx);
    }

    // ── Per-cycle orchestration ───────────────────────────────

    /// Run one full control cycle.  Returns the delay (ms) the FSM task
    /// should sleep before the next cycle: shorter while the gate moves.
    ///
    /// The `hw` parameter satisfies all three hardware ports — this avoids
    /// a multi-borrow of the adapter while keeping the boundary explicit.
    pub fn cycle(
        &mut self,
        hw: &mut (impl SwitchPort + MotorPort + ClockPort),
        sink: &mut impl EventSink,
    ) -> u32 {
        // 1. Debounced sensor read (blocks for the 20 ms settle window).
        let limits = limit_switch::settle(hw);
        self.ctx.now_ms = hw.now_ms();
        self.ctx.limits = limits;

        // 2. Emergency: both contacts asserted is physically impossible.
        if limits.inconsistent() {
            if self.fsm.current_state() != GateState::Error {
                warn!("limit switches inconsistent (both asserted)");
            }
            self.ctx.error_code = ErrorCode::LsInconsistent;
            self.fsm.force_transition(GateState::Error, &mut self.ctx);
        }

        // 3. At most one queued command per cycle.  Lamp commands apply in
        //    every state and never reach the FSM.  While the sensors are
        //    inconsistent, commands stay queued: motion must not start on
        //    a contradictory position reading.
        self.ctx.pending_cmd = None;
        if self.fsm.current_state() != GateState::Initial && !limits.inconsistent() {
            match self.queue.pop() {
                Some(GateCommand::LampOn) => self.ctx.commands.lamp = true,
                Some(GateCommand::LampOff) => self.ctx.commands.lamp = false,
                other => self.ctx.pending_cmd = other,
            }
        }

        // 4. FSM tick (pure state logic).
        self.fsm.tick(&mut self.ctx);

        // 5. Apply outputs.  The motor adapter sequences direction changes.
        hw.drive(self.ctx.commands.motor);
        hw.set_lamp(self.ctx.commands.lamp);

        // 6. Publish.
        let state = self.fsm.current_state();
        self.status
            .store(state, limits, self.ctx.commands.motor, self.ctx.error_code);

        if self.last_reported != Some(state) {
            sink.emit(&GateEvent::StatusChanged(self.frame()));
            self.last_reported = Some(state);
        }

        if self
            .last_telemetry_at
            .is_none_or(|at| self.ctx.now_ms.saturating_sub(at) >= PUB_PERIOD_MS)
        {
            sink.emit(&GateEvent::Telemetry(self.frame()));
            self.last_telemetry_at = Some(self.ctx.now_ms);
        }

        if state.is_moving() {
            MOVING_CYCLE_MS
        } else {
            IDLE_CYCLE_MS
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Current FSM state.
    pub fn state(&self) -> GateState {
        self.fsm.current_state()
    }

    /// Current fault code.
    pub fn error_code(&self) -> ErrorCode {
        self.ctx.error_code
    }

    /// Whether the warning lamp is commanded on.
    pub fn lamp_on(&self) -> bool {
        self.ctx.commands.lamp
    }

    // ── Internal ──────────────────────────────────────────────

    fn frame(&self) -> StatusFrame {
        StatusFrame::new(
            self.fsm.current_state(),
            self.ctx.limits,
            self.ctx.commands.motor,
            Some(self.ctx.error_code),
        )
    }
}

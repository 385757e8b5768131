//! Concrete state handler functions and table builder.
//!
//! Each state is defined by plain `fn` pointers — no closures, no dynamic
//! dispatch, no heap.  This is the classic embedded C FSM pattern expressed
//! in safe Rust.
//!
//! ```text
//!            ┌──[limit_closed]── INITIAL ──[limit_open]──┐
//!            ▼                      │                     ▼
//!         CLOSED ◀──┐          [both off]           ┌──▶ OPEN
//!            │      │               ▼               │      │
//!        [OPEN cmd] │           UNKNOWN             │ [CLOSE cmd]
//!            ▼      │                               │      ▼
//!        OPENING ──[limit_open]─────────[limit_closed]── CLOSING
//!            │                                             │
//!       [deadline]                                    [deadline]
//!            └──────────────▶ ERROR ◀─────────────────────┘
//!
//!  Any state ──[both limits asserted]──▶ ERROR (LS inconsistent)
//! ```

use super::context::{GateContext, MotorCmd, OutputCommands};
use super::{GateState, StateDescriptor};
use crate::app::commands::GateCommand;
use crate::config::{T_CLOSE_MS, T_OPEN_MS};
use crate::error::ErrorCode;
use log::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; GateState::COUNT] {
    [
        // Index 0 — Initial
        StateDescriptor {
            id: GateState::Initial,
            name: "Initial",
            on_enter: Some(initial_enter),
            on_exit: None,
            on_update: initial_update,
        },
        // Index 1 — Error
        StateDescriptor {
            id: GateState::Error,
            name: "Error",
            on_enter: Some(error_enter),
            on_exit: Some(error_exit),
            on_update: error_update,
        },
        // Index 2 — Opening
        StateDescriptor {
            id: GateState::Opening,
            name: "Opening",
            on_enter: Some(opening_enter),
            on_exit: None,
            on_update: opening_update,
        },
        // Index 3 — Open
        StateDescriptor {
            id: GateState::Open,
            name: "Open",
            on_enter: Some(halt_enter),
            on_exit: None,
            on_update: open_update,
        },
        // Index 4 — Closing
        StateDescriptor {
            id: GateState::Closing,
            name: "Closing",
            on_enter: Some(closing_enter),
            on_exit: None,
            on_update: closing_update,
        },
        // Index 5 — Closed
        StateDescriptor {
            id: GateState::Closed,
            name: "Closed",
            on_enter: Some(halt_enter),
            on_exit: None,
            on_update: closed_update,
        },
        // Index 6 — Stopped
        StateDescriptor {
            id: GateState::Stopped,
            name: "Stopped",
            on_enter: Some(halt_enter),
            on_exit: None,
            on_update: stopped_update,
        },
        // Index 7 — Unknown
        StateDescriptor {
            id: GateState::Unknown,
            name: "Unknown",
            on_enter: Some(halt_enter),
            on_exit: None,
            on_update: unknown_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Shared enter action — every motionless state kills the motor
// ═══════════════════════════════════════════════════════════════════════════

fn halt_enter(ctx: &mut GateContext) {
    ctx.commands.motor = MotorCmd::Off;
    ctx.disarm_deadline();
}

// ═══════════════════════════════════════════════════════════════════════════
//  INITIAL — one classification pass at boot
// ═══════════════════════════════════════════════════════════════════════════

fn initial_enter(ctx: &mut GateContext) {
    // Motor de-energized, lamp off, no residual fault.
    ctx.commands = OutputCommands::default();
    ctx.disarm_deadline();
    info!("INITIAL: classifying gate position");
}

fn initial_update(ctx: &mut GateContext) -> Option<GateState> {
    // The joint-assertion case is routed to Error by the service before
    // this handler runs.
    if ctx.limits.closed && !ctx.limits.open {
        return Some(GateState::Closed);
    }
    if ctx.limits.open && !ctx.limits.closed {
        return Some(GateState::Open);
    }
    Some(GateState::Unknown)
}

// ═══════════════════════════════════════════════════════════════════════════
//  OPEN / CLOSED — resting at an end of travel
// ═══════════════════════════════════════════════════════════════════════════

fn open_update(ctx: &mut GateContext) -> Option<GateState> {
    // Position wins over commands: the gate may have been pushed shut.
    if ctx.limits.closed && !ctx.limits.open {
        return Some(GateState::Closed);
    }
    match ctx.take_command() {
        Some(GateCommand::Close | GateCommand::Toggle) => Some(GateState::Closing),
        _ => None,
    }
}

fn closed_update(ctx: &mut GateContext) -> Option<GateState> {
    if ctx.limits.open && !ctx.limits.closed {
        return Some(GateState::Open);
    }
    match ctx.take_command() {
        Some(GateCommand::Open | GateCommand::Toggle) => Some(GateState::Opening),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  STOPPED / UNKNOWN — motionless mid-travel
// ═══════════════════════════════════════════════════════════════════════════

fn stopped_update(ctx: &mut GateContext) -> Option<GateState> {
    match ctx.take_command() {
        Some(GateCommand::Open) => Some(GateState::Opening),
        Some(GateCommand::Close) => Some(GateState::Closing),
        Some(GateCommand::Toggle) => {
            // Resume away from the last known end of travel.
            if ctx.limits.closed {
                Some(GateState::Opening)
            } else {
                Some(GateState::Closing)
            }
        }
        _ => None,
    }
}

fn unknown_update(ctx: &mut GateContext) -> Option<GateState> {
    match ctx.take_command() {
        Some(GateCommand::Open | GateCommand::Toggle) => Some(GateState::Opening),
        Some(GateCommand::Close) => Some(GateState::Closing),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  OPENING / CLOSING — motor energized, deadline armed
// ═══════════════════════════════════════════════════════════════════════════

fn opening_enter(ctx: &mut GateContext) {
    ctx.commands.motor = MotorCmd::Opening;
    ctx.arm_deadline(T_OPEN_MS);
    info!("OPENING: motor energized, deadline {}ms", T_OPEN_MS);
}

fn opening_update(ctx: &mut GateContext) -> Option<GateState> {
    // Target limit first — a limit on the deadline boundary is a success.
    if ctx.limits.open {
        return Some(GateState::Open);
    }
    if ctx.deadline_expired() {
        ctx.error_code = ErrorCode::TimeoutOpen;
        return Some(GateState::Error);
    }
    match ctx.take_command() {
        Some(GateCommand::Stop | GateCommand::Toggle) => Some(GateState::Stopped),
        // Reversal: Closing's on_enter re-arms the deadline.
        Some(GateCommand::Close) => Some(GateState::Closing),
        _ => None,
    }
}

fn closing_enter(ctx: &mut GateContext) {
    ctx.commands.motor = MotorCmd::Closing;
    ctx.arm_deadline(T_CLOSE_MS);
    info!("CLOSING: motor energized, deadline {}ms", T_CLOSE_MS);
}

fn closing_update(ctx: &mut GateContext) -> Option<GateState> {
    if ctx.limits.closed {
        return Some(GateState::Closed);
    }
    if ctx.deadline_expired() {
        ctx.error_code = ErrorCode::TimeoutClose;
        return Some(GateState::Error);
    }
    match ctx.take_command() {
        Some(GateCommand::Stop | GateCommand::Toggle) => Some(GateState::Stopped),
        Some(GateCommand::Open) => Some(GateState::Opening),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  ERROR — fault latched, motor dead, waiting for recovery
// ═══════════════════════════════════════════════════════════════════════════

fn error_enter(ctx: &mut GateContext) {
    ctx.commands.motor = MotorCmd::Off;
    ctx.disarm_deadline();
    warn!("ERROR: motor de-energized, fault={}", ctx.error_code);
}

fn error_exit(ctx: &mut GateContext) {
    info!("ERROR: fault cleared ({})", ctx.error_code);
    ctx.error_code = ErrorCode::Ok;
}

fn error_update(ctx: &mut GateContext) -> Option<GateState> {
    // A single cleanly-asserted limit resolves the position.
    if ctx.limits.open && !ctx.limits.closed {
        return Some(GateState::Open);
    }
    if ctx.limits.closed && !ctx.limits.open {
        return Some(GateState::Closed);
    }

    // Both-off only means "sensors recovered" for the inconsistency fault;
    // a timed-out motion sits mid-travel with both limits off and must stay
    // observable until a limit asserts or an operator commands motion.
    if ctx.error_code == ErrorCode::LsInconsistent && !ctx.limits.open && !ctx.limits.closed {
        return Some(GateState::Unknown);
    }

    match ctx.take_command() {
        Some(GateCommand::Open | GateCommand::Toggle) => Some(GateState::Opening),
        Some(GateCommand::Close) => Some(GateState::Closing),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::context::LimitSnapshot;
    use crate::fsm::Fsm;

    fn fsm_at(state: GateState) -> (Fsm, GateContext) {
        let mut fsm = Fsm::new(build_state_table(), GateState::Initial);
        let mut ctx = GateContext::new();
        fsm.start(&mut ctx);
        fsm.force_transition(state, &mut ctx);
        (fsm, ctx)
    }

    #[test]
    fn initial_classifies_closed() {
        let mut fsm = Fsm::new(build_state_table(), GateState::Initial);
        let mut ctx = GateContext::new();
        fsm.start(&mut ctx);
        ctx.limits = LimitSnapshot { open: false, closed: true };
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Closed);
        assert_eq!(ctx.commands.motor, MotorCmd::Off);
    }

    #[test]
    fn initial_classifies_open_and_unknown() {
        let mut fsm = Fsm::new(build_state_table(), GateState::Initial);
        let mut ctx = GateContext::new();
        fsm.start(&mut ctx);
        ctx.limits = LimitSnapshot { open: true, closed: false };
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Open);

        let mut fsm = Fsm::new(build_state_table(), GateState::Initial);
        let mut ctx = GateContext::new();
        fsm.start(&mut ctx);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Unknown);
    }

    #[test]
    fn closed_opens_on_command() {
        let (mut fsm, mut ctx) = fsm_at(GateState::Closed);
        ctx.limits = LimitSnapshot { open: false, closed: true };
        ctx.pending_cmd = Some(GateCommand::Open);
        ctx.now_ms = 100;
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Opening);
        assert_eq!(ctx.commands.motor, MotorCmd::Opening);
        assert_eq!(ctx.deadline_at, Some(100 + T_OPEN_MS));
    }

    #[test]
    fn opening_reaches_limit_and_halts() {
        let (mut fsm, mut ctx) = fsm_at(GateState::Closed);
        ctx.pending_cmd = Some(GateCommand::Toggle);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Opening);

        ctx.limits = LimitSnapshot { open: true, closed: false };
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Open);
        assert_eq!(ctx.commands.motor, MotorCmd::Off);
        assert_eq!(ctx.deadline_at, None);
    }

    #[test]
    fn limit_on_deadline_boundary_wins_over_timeout() {
        let (mut fsm, mut ctx) = fsm_at(GateState::Opening);
        let deadline = ctx.deadline_at.unwrap();

        ctx.now_ms = deadline; // exactly on the boundary
        ctx.limits = LimitSnapshot { open: true, closed: false };
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Open);
        assert_eq!(ctx.error_code, ErrorCode::Ok);
    }

    #[test]
    fn opening_times_out_into_error() {
        let (mut fsm, mut ctx) = fsm_at(GateState::Opening);
        ctx.now_ms = ctx.deadline_at.unwrap() + 1;
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Error);
        assert_eq!(ctx.error_code, ErrorCode::TimeoutOpen);
        assert_eq!(ctx.commands.motor, MotorCmd::Off);
    }

    #[test]
    fn closing_times_out_into_error() {
        let (mut fsm, mut ctx) = fsm_at(GateState::Closing);
        ctx.now_ms = ctx.deadline_at.unwrap() + 1;
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Error);
        assert_eq!(ctx.error_code, ErrorCode::TimeoutClose);
    }

    #[test]
    fn reversal_resets_deadline() {
        let (mut fsm, mut ctx) = fsm_at(GateState::Opening);
        ctx.now_ms = 5_000;
        ctx.pending_cmd = Some(GateCommand::Close);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Closing);
        assert_eq!(ctx.commands.motor, MotorCmd::Closing);
        assert_eq!(ctx.deadline_at, Some(5_000 + T_CLOSE_MS));
    }

    #[test]
    fn stop_and_toggle_halt_motion() {
        let (mut fsm, mut ctx) = fsm_at(GateState::Opening);
        ctx.pending_cmd = Some(GateCommand::Stop);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Stopped);
        assert_eq!(ctx.commands.motor, MotorCmd::Off);

        let (mut fsm, mut ctx) = fsm_at(GateState::Closing);
        ctx.pending_cmd = Some(GateCommand::Toggle);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Stopped);
    }

    #[test]
    fn stopped_toggle_direction_depends_on_closed_limit() {
        let (mut fsm, mut ctx) = fsm_at(GateState::Stopped);
        ctx.limits = LimitSnapshot { open: false, closed: true };
        ctx.pending_cmd = Some(GateCommand::Toggle);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Opening);

        let (mut fsm, mut ctx) = fsm_at(GateState::Stopped);
        ctx.pending_cmd = Some(GateCommand::Toggle);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Closing);
    }

    #[test]
    fn unknown_accepts_motion_commands() {
        let (mut fsm, mut ctx) = fsm_at(GateState::Unknown);
        ctx.pending_cmd = Some(GateCommand::Close);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Closing);
    }

    #[test]
    fn error_recovers_on_clean_limit() {
        let (mut fsm, mut ctx) = fsm_at(GateState::Error);
        ctx.error_code = ErrorCode::TimeoutOpen;
        ctx.limits = LimitSnapshot { open: true, closed: false };
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Open);
        // Leaving Error clears the fault.
        assert_eq!(ctx.error_code, ErrorCode::Ok);
    }

    #[test]
    fn timeout_error_persists_with_both_limits_off() {
        let (mut fsm, mut ctx) = fsm_at(GateState::Error);
        ctx.error_code = ErrorCode::TimeoutOpen;
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Error);
        assert_eq!(ctx.error_code, ErrorCode::TimeoutOpen);
    }

    #[test]
    fn inconsistency_error_exits_to_unknown_when_sensors_recover() {
        let (mut fsm, mut ctx) = fsm_at(GateState::Error);
        ctx.error_code = ErrorCode::LsInconsistent;
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Unknown);
        assert_eq!(ctx.error_code, ErrorCode::Ok);
    }

    #[test]
    fn error_accepts_explicit_motion_command() {
        let (mut fsm, mut ctx) = fsm_at(GateState::Error);
        ctx.error_code = ErrorCode::TimeoutOpen;
        ctx.pending_cmd = Some(GateCommand::Close);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Closing);
        assert_eq!(ctx.error_code, ErrorCode::Ok);
    }

    #[test]
    fn redundant_command_causes_no_transition() {
        let (mut fsm, mut ctx) = fsm_at(GateState::Open);
        ctx.limits = LimitSnapshot { open: true, closed: false };
        ctx.pending_cmd = Some(GateCommand::Open);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), GateState::Open);
    }

    #[test]
    fn wire_names_match_dashboard_contract() {
        assert_eq!(GateState::Initial.wire_name(), "INICIAL");
        assert_eq!(GateState::Error.wire_name(), "ERROR");
        assert_eq!(GateState::Opening.wire_name(), "ABRIENDO");
        assert_eq!(GateState::Open.wire_name(), "ABIERTO");
        assert_eq!(GateState::Closing.wire_name(), "CERRANDO");
        assert_eq!(GateState::Closed.wire_name(), "CERRADO");
        assert_eq!(GateState::Stopped.wire_name(), "DETENIDO");
        assert_eq!(GateState::Unknown.wire_name(), "DESCONOCIDO");
    }
}

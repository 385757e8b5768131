//! Integration tests for the GateService → FSM → motor pipeline.
//!
//! These run on the host and drive the full per-cycle path — debounced
//! sensor reads, emergency check, command consumption, FSM dispatch,
//! output application, and publication — against the mock hardware with
//! its virtual clock.

use std::sync::Arc;

use crate::mock_hw::{MockHardware, RecordingSink};
use porton::app::commands::{CommandQueue, GateCommand};
use porton::app::events::StatusCell;
use porton::app::ports::ClockPort;
use porton::app::service::GateService;
use porton::config::{IDLE_CYCLE_MS, MOVING_CYCLE_MS, PUB_PERIOD_MS, T_OPEN_MS};
use porton::error::ErrorCode;
use porton::fsm::context::{LimitSnapshot, MotorCmd};
use porton::fsm::GateState;

const CLOSED: LimitSnapshot = LimitSnapshot { open: false, closed: true };
const OPEN: LimitSnapshot = LimitSnapshot { open: true, closed: false };
const MID: LimitSnapshot = LimitSnapshot { open: false, closed: false };
const BOTH: LimitSnapshot = LimitSnapshot { open: true, closed: true };

struct Rig {
    service: GateService,
    hw: MockHardware,
    sink: RecordingSink,
    queue: Arc<CommandQueue>,
    status: Arc<StatusCell>,
}

impl Rig {
    fn new(initial_limits: LimitSnapshot) -> Self {
        let queue = Arc::new(CommandQueue::new());
        let status = Arc::new(StatusCell::new());
        let mut service = GateService::new(Arc::clone(&queue), Arc::clone(&status));
        let mut hw = MockHardware::new();
        hw.limits_from(0, initial_limits);
        service.start(&mut hw);
        Self {
            service,
            hw,
            sink: RecordingSink::new(),
            queue,
            status,
        }
    }

    /// One FSM-task iteration: cycle, then sleep the returned cadence.
    fn step(&mut self) {
        let delay = self.service.cycle(&mut self.hw, &mut self.sink);
        self.hw.delay_ms(delay);
    }

    /// Step until `deadline_ms` of virtual time has passed.
    fn run_until(&mut self, deadline_ms: u64) {
        while self.hw.now() < deadline_ms {
            self.step();
        }
    }
}

// ── Cold start classification ─────────────────────────────────

#[test]
fn cold_start_gate_closed_reports_cerrado() {
    let mut rig = Rig::new(CLOSED);
    rig.step();

    assert_eq!(rig.service.state(), GateState::Closed);
    assert_eq!(rig.hw.motor, MotorCmd::Off);
    assert!(!rig.hw.lamp);

    let frames = rig.sink.status_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].state, "CERRADO");
    assert!(frames[0].lsc_closed);
    assert!(!frames[0].lsa_open);
    assert_eq!(frames[0].err, Some(0));
}

#[test]
fn cold_start_gate_open_and_mid_travel() {
    let mut rig = Rig::new(OPEN);
    rig.step();
    assert_eq!(rig.service.state(), GateState::Open);

    let mut rig = Rig::new(MID);
    rig.step();
    assert_eq!(rig.service.state(), GateState::Unknown);
    assert_eq!(rig.sink.status_frames()[0].state, "DESCONOCIDO");
}

// ── Commanded motion ──────────────────────────────────────────

#[test]
fn open_command_while_closed_energizes_within_one_cycle() {
    let mut rig = Rig::new(CLOSED);
    rig.step();

    assert!(rig.queue.push(GateCommand::Open));
    rig.step();

    assert_eq!(rig.service.state(), GateState::Opening);
    assert_eq!(rig.hw.motor, MotorCmd::Opening);
    assert_eq!(rig.sink.status_frames().last().unwrap().state, "ABRIENDO");

    // Gate reaches the open limit well inside the deadline.
    let limit_at = rig.hw.now() + 4_000;
    rig.hw.limits_from(limit_at, OPEN);
    rig.run_until(limit_at + 100);

    assert_eq!(rig.service.state(), GateState::Open);
    assert_eq!(rig.hw.motor, MotorCmd::Off);
    let last = rig.sink.status_frames().last().unwrap().clone();
    assert_eq!(last.state, "ABIERTO");
    assert_eq!(last.err, Some(0));
}

#[test]
fn open_timeout_faults_and_close_recovers() {
    let mut rig = Rig::new(CLOSED);
    rig.step();

    rig.queue.push(GateCommand::Open);
    rig.step();
    let started_at = rig.hw.now();

    // The limit never asserts (gate mid-travel with the closed contact
    // released shortly after motion starts).
    rig.hw.limits_from(started_at + 500, MID);
    rig.run_until(started_at + T_OPEN_MS + 200);

    assert_eq!(rig.service.state(), GateState::Error);
    assert_eq!(rig.service.error_code(), ErrorCode::TimeoutOpen);
    assert_eq!(rig.hw.motor, MotorCmd::Off);
    let last = rig.sink.status_frames().last().unwrap().clone();
    assert_eq!(last.state, "ERROR");
    assert_eq!(last.err, Some(1));

    // An explicit CLOSE leaves the fault state.
    rig.queue.push(GateCommand::Close);
    rig.step();
    assert_eq!(rig.service.state(), GateState::Closing);
    assert_eq!(rig.hw.motor, MotorCmd::Closing);
    assert_eq!(rig.sink.status_frames().last().unwrap().state, "CERRANDO");
}

#[test]
fn reversal_during_opening_switches_to_closing_in_one_cycle() {
    let mut rig = Rig::new(CLOSED);
    rig.step();
    rig.queue.push(GateCommand::Open);
    rig.step();
    rig.hw.limits_now(MID);
    assert_eq!(rig.service.state(), GateState::Opening);

    rig.queue.push(GateCommand::Close);
    rig.step();
    assert_eq!(rig.service.state(), GateState::Closing);
    assert_eq!(rig.hw.motor, MotorCmd::Closing);

    // The recorded drive sequence went straight Opening → Closing; the
    // hardware adapter owns the brake-gap sequencing underneath.
    let drives: Vec<MotorCmd> = rig.hw.motor_history.iter().map(|(_, c)| *c).collect();
    assert!(drives
        .windows(2)
        .any(|w| w == [MotorCmd::Opening, MotorCmd::Closing]));

    // The deadline was reset on reversal: closing may run a full period
    // before faulting.
    let reversed_at = rig.hw.now();
    rig.run_until(reversed_at + T_OPEN_MS - 200);
    assert_eq!(rig.service.state(), GateState::Closing);
}

#[test]
fn stop_during_motion_halts() {
    let mut rig = Rig::new(CLOSED);
    rig.step();
    rig.queue.push(GateCommand::Open);
    rig.step();
    rig.hw.limits_now(MID);

    rig.queue.push(GateCommand::Stop);
    rig.step();
    assert_eq!(rig.service.state(), GateState::Stopped);
    assert_eq!(rig.hw.motor, MotorCmd::Off);
    assert_eq!(rig.sink.status_frames().last().unwrap().state, "DETENIDO");
}

// ── Emergency: joint limit assertion ──────────────────────────

#[test]
fn both_limits_asserted_forces_error_within_one_cycle() {
    let mut rig = Rig::new(CLOSED);
    rig.step();

    rig.hw.limits_now(BOTH);
    rig.step();

    assert_eq!(rig.service.state(), GateState::Error);
    assert_eq!(rig.service.error_code(), ErrorCode::LsInconsistent);
    let last = rig.sink.status_frames().last().unwrap().clone();
    assert_eq!(last.err, Some(3));

    // Sensors recover to a clean closed reading: position resolves.
    rig.hw.limits_now(CLOSED);
    rig.step();
    assert_eq!(rig.service.state(), GateState::Closed);
    assert_eq!(rig.service.error_code(), ErrorCode::Ok);
}

#[test]
fn both_limits_during_motion_kills_motor() {
    let mut rig = Rig::new(CLOSED);
    rig.step();
    rig.queue.push(GateCommand::Open);
    rig.step();
    assert_eq!(rig.hw.motor, MotorCmd::Opening);

    rig.hw.limits_now(BOTH);
    rig.step();
    assert_eq!(rig.service.state(), GateState::Error);
    assert_eq!(rig.hw.motor, MotorCmd::Off);
}

// ── Debounce ──────────────────────────────────────────────────

#[test]
fn limit_pulse_shorter_than_debounce_causes_no_transition() {
    let mut rig = Rig::new(CLOSED);
    rig.step();
    assert_eq!(rig.service.state(), GateState::Closed);
    let frames_before = rig.sink.status_frames().len();

    // A 10 ms glitch on the open contact while resting closed.
    let glitch_at = rig.hw.now() + 40;
    rig.hw.limits_from(glitch_at, BOTH);
    rig.hw.limits_from(glitch_at + 10, CLOSED);
    rig.run_until(glitch_at + 500);

    assert_eq!(rig.service.state(), GateState::Closed);
    assert_eq!(rig.sink.status_frames().len(), frames_before);
}

// ── Lamp commands ─────────────────────────────────────────────

#[test]
fn lamp_commands_apply_in_any_state_without_transition() {
    let mut rig = Rig::new(CLOSED);
    rig.step();
    let frames_before = rig.sink.status_frames().len();

    rig.queue.push(GateCommand::LampOn);
    rig.step();
    assert!(rig.hw.lamp);
    assert_eq!(rig.service.state(), GateState::Closed);
    assert_eq!(rig.sink.status_frames().len(), frames_before);

    // Also while moving: lamp changes, motion continues undisturbed.
    rig.queue.push(GateCommand::Open);
    rig.step();
    rig.hw.limits_now(MID);
    rig.queue.push(GateCommand::LampOff);
    rig.step();
    assert!(!rig.hw.lamp);
    assert_eq!(rig.service.state(), GateState::Opening);
}

// ── Idempotence ───────────────────────────────────────────────

#[test]
fn repeated_open_while_open_is_silent() {
    let mut rig = Rig::new(OPEN);
    rig.step();
    assert_eq!(rig.service.state(), GateState::Open);
    let frames_before = rig.sink.status_frames().len();

    rig.queue.push(GateCommand::Open);
    rig.step();
    rig.queue.push(GateCommand::Open);
    rig.step();

    assert_eq!(rig.service.state(), GateState::Open);
    assert_eq!(rig.sink.status_frames().len(), frames_before);
}

// ── Publication behaviour ─────────────────────────────────────

#[test]
fn telemetry_is_periodic_in_steady_state() {
    let mut rig = Rig::new(CLOSED);
    rig.run_until(2 * PUB_PERIOD_MS + 1_000);

    // Boot emission plus at least one per period.
    assert!(rig.sink.telemetry_count() >= 3);
}

#[test]
fn status_cell_mirrors_last_cycle() {
    let mut rig = Rig::new(CLOSED);
    rig.step();
    assert_eq!(rig.status.state(), GateState::Closed);
    assert_eq!(rig.status.err_code(), 0);

    rig.queue.push(GateCommand::Open);
    rig.step();
    assert_eq!(rig.status.state(), GateState::Opening);
    let frame = rig.status.frame(true);
    assert_eq!(frame.state, "ABRIENDO");
    assert!(frame.motor_open);
}

#[test]
fn cycle_cadence_tracks_motion() {
    let mut rig = Rig::new(CLOSED);
    let idle_delay = rig.service.cycle(&mut rig.hw, &mut rig.sink);
    assert_eq!(idle_delay, IDLE_CYCLE_MS);

    rig.queue.push(GateCommand::Open);
    let moving_delay = rig.service.cycle(&mut rig.hw, &mut rig.sink);
    assert_eq!(moving_delay, MOVING_CYCLE_MS);
}

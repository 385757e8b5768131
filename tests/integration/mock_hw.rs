//! Mock hardware adapter for integration tests.
//!
//! Implements the switch, motor, and clock ports over a virtual monotonic
//! clock: `delay_ms` advances time instead of sleeping, so the 20 ms
//! debounce windows and 15 s motion deadlines run instantly and
//! deterministically.  Limit-switch levels follow a time-keyed script and
//! every motor/lamp command is recorded for assertions.

use porton::app::events::GateEvent;
use porton::app::ports::{ClockPort, EventSink, MotorPort, SwitchPort};
use porton::fsm::context::{LimitSnapshot, MotorCmd};

// ── MockHardware ──────────────────────────────────────────────

pub struct MockHardware {
    now_ms: u64,
    /// `(from_ms, level)` — the level in force from that instant on.
    script: Vec<(u64, LimitSnapshot)>,
    pub motor_history: Vec<(u64, MotorCmd)>,
    pub motor: MotorCmd,
    pub lamp: bool,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            script: Vec::new(),
            motor_history: Vec::new(),
            motor: MotorCmd::Off,
            lamp: false,
        }
    }

    pub fn now(&self) -> u64 {
        self.now_ms
    }

    /// Script the limit level from `from_ms` onward.
    pub fn limits_from(&mut self, from_ms: u64, level: LimitSnapshot) {
        self.script.push((from_ms, level));
        self.script.sort_by_key(|(at, _)| *at);
    }

    /// Script the limit level from now onward.
    pub fn limits_now(&mut self, level: LimitSnapshot) {
        self.limits_from(self.now_ms, level);
    }

    fn level_at(&self, t: u64) -> LimitSnapshot {
        self.script
            .iter()
            .rev()
            .find(|(at, _)| *at <= t)
            .map(|(_, l)| *l)
            .unwrap_or_default()
    }
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl SwitchPort for MockHardware {
    fn sample_limits(&mut self) -> LimitSnapshot {
        self.level_at(self.now_ms)
    }
}

impl MotorPort for MockHardware {
    fn drive(&mut self, cmd: MotorCmd) {
        if self.motor != cmd {
            self.motor_history.push((self.now_ms, cmd));
        }
        self.motor = cmd;
    }

    fn set_lamp(&mut self, on: bool) {
        self.lamp = on;
    }

    fn all_off(&mut self) {
        self.drive(MotorCmd::Off);
        self.lamp = false;
    }
}

impl ClockPort for MockHardware {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }

    fn delay_ms(&mut self, ms: u32) {
        self.now_ms += u64::from(ms);
    }
}

// ── Recording sink ────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<GateEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_frames(&self) -> Vec<porton::app::events::StatusFrame> {
        self.events
            .iter()
            .filter_map(|e| match e {
                GateEvent::StatusChanged(f) => Some(f.clone()),
                GateEvent::Telemetry(_) => None,
            })
            .collect()
    }

    pub fn telemetry_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, GateEvent::Telemetry(_)))
            .count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &GateEvent) {
        self.events.push(event.clone());
    }
}

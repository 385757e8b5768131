//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured gate events to the
//! ESP-IDF logger (which goes to UART / USB-CDC in production).  The MQTT
//! adapter implements the same trait for the broker side; [`FanoutSink`]
//! composes the two for the FSM task.

use log::info;

use crate::app::events::{GateEvent, StatusFrame};
use crate::app::ports::EventSink;

/// Adapter that logs every [`GateEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

fn describe(frame: &StatusFrame) -> String {
    format!(
        "state={} | lsa={} lsc={} | motor={}{} | err={}",
        frame.state,
        u8::from(frame.lsa_open),
        u8::from(frame.lsc_closed),
        u8::from(frame.motor_open),
        u8::from(frame.motor_close),
        frame.err.unwrap_or(0),
    )
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &GateEvent) {
        match event {
            GateEvent::StatusChanged(f) => info!("STATE | {}", describe(f)),
            GateEvent::Telemetry(f) => info!("TELEM | {}", describe(f)),
        }
    }
}

/// Fan an event out to two sinks (serial log + broker).
pub struct FanoutSink<A, B> {
    pub first: A,
    pub second: B,
}

impl<A: EventSink, B: EventSink> EventSink for FanoutSink<A, B> {
    fn emit(&mut self, event: &GateEvent) {
        self.first.emit(event);
        self.second.emit(event);
    }
}

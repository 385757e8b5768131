//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ GateService (domain)
//! ```
//!
//! Driven adapters (GPIO, clock, event sinks, storage) implement these
//! traits.  The [`GateService`](super::service::GateService) consumes them
//! via generics, so the domain core never touches hardware directly and the
//! whole control path runs on the host under `cargo test`.

use crate::config::{BootMode, GateConfig};
use crate::error::StorageError;
use crate::fsm::context::{LimitSnapshot, MotorCmd};

// ───────────────────────────────────────────────────────────────
// Switch port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port: one raw sample of both limit switches, already
/// normalized from the active-low wire to logical asserted = `true`.
/// Debouncing happens on the domain side (`drivers::limit_switch`).
pub trait SwitchPort {
    fn sample_limits(&mut self) -> LimitSnapshot;
}

// ───────────────────────────────────────────────────────────────
// Motor port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port: the domain commands the motor contactors and lamp.
///
/// Implementations own the direction-change sequencing: the opposite
/// output is de-energized and a brake gap elapses before the requested
/// direction is energized.  Both outputs high at once is forbidden.
pub trait MotorPort {
    fn drive(&mut self, cmd: MotorCmd);
    fn set_lamp(&mut self, on: bool);
    /// Kill motor and lamp — safe shutdown.
    fn all_off(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Clock port (monotonic time + cooperative delays)
// ───────────────────────────────────────────────────────────────

/// Monotonic clock and short cooperative delays for the FSM task.
/// The mock implementation advances a virtual clock, which keeps the
/// debounce and deadline tests instant and deterministic.
pub trait ClockPort {
    fn now_ms(&self) -> u64;
    fn delay_ms(&mut self, ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`GateEvent`](super::events::GateEvent)s
/// through this port.  Adapters decide where they go (serial log, MQTT).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::GateEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the configuration record, one NVS key per field so
/// the portal can overwrite a single value atomically.
pub trait ConfigPort {
    /// Assemble the record from storage; missing keys yield defaults.
    fn load(&self) -> Result<GateConfig, StorageError>;

    fn save_wifi(&mut self, ssid: &str, pass: &str) -> Result<(), StorageError>;
    fn save_broker_uri(&mut self, uri: &str) -> Result<(), StorageError>;
    fn save_topic_cmd(&mut self, topic: &str) -> Result<(), StorageError>;
    fn save_topic_status(&mut self, topic: &str) -> Result<(), StorageError>;
    fn save_topic_tele(&mut self, topic: &str) -> Result<(), StorageError>;
    fn save_boot_mode(&mut self, mode: BootMode) -> Result<(), StorageError>;

    /// Erase every configuration key (factory reset).
    fn wipe(&mut self) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic — no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively; the in-memory
///   simulation achieves it trivially.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

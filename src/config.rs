//! Persistent configuration record and firmware timing constants.
//!
//! The [`GateConfig`] fields live in NVS as individual keys (see
//! `adapters::nvs`) so the portal can overwrite one without rewriting the
//! rest. Field capacities match the NVS blob limits and are enforced by the
//! setters before anything is persisted.

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Timing constants
// ---------------------------------------------------------------------------

/// Stability window a limit-switch reading must survive before it is
/// accepted.
pub const DEBOUNCE_MS: u32 = 20;
/// Sampling step inside the debounce window.
pub const DEBOUNCE_STEP_MS: u32 = 5;
/// Upper bound on one debounce settle; a chattering contact reports its
/// last raw sample after this and the joint-assertion check takes over.
pub const DEBOUNCE_SETTLE_CAP_MS: u32 = 250;
/// Gap between de-energizing one motor direction and energizing the other.
pub const BRAKE_GAP_MS: u32 = 10;
/// Deadline for a full opening motion.
pub const T_OPEN_MS: u64 = 15_000;
/// Deadline for a full closing motion.
pub const T_CLOSE_MS: u64 = 15_000;
/// Periodic telemetry cadence.
pub const PUB_PERIOD_MS: u64 = 30_000;
/// FSM cycle delay while no motion is in progress.
pub const IDLE_CYCLE_MS: u32 = 20;
/// FSM cycle delay while the motor is energized.
pub const MOVING_CYCLE_MS: u32 = 10;
/// Horizon of the station connect watchdog.
pub const CONNECT_TIMEOUT_MS: u64 = 30_000;
/// Poll cadence of the supervisor loop on the main task.
pub const SUPERVISOR_POLL_MS: u32 = 500;

// ---------------------------------------------------------------------------
// Field capacities
// ---------------------------------------------------------------------------

pub const SSID_MAX: usize = 32;
pub const PASS_MAX: usize = 64;
pub const BROKER_URI_MAX: usize = 127;
pub const TOPIC_MAX: usize = 95;

// ---------------------------------------------------------------------------
// Boot mode
// ---------------------------------------------------------------------------

/// Which network personality the device boots into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BootMode {
    /// Access point + station: the captive portal is reachable.
    #[default]
    Provisioning = 0,
    /// Station only: normal operation against the configured network.
    Operational = 1,
}

impl BootMode {
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Decode the persisted byte; anything unrecognised falls back to
    /// provisioning (safe recovery personality).
    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => Self::Operational,
            _ => Self::Provisioning,
        }
    }
}

// ---------------------------------------------------------------------------
// GateConfig
// ---------------------------------------------------------------------------

/// The persistent configuration record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateConfig {
    pub wifi_ssid: heapless::String<SSID_MAX>,
    /// Empty password means an open network.
    pub wifi_pass: heapless::String<PASS_MAX>,
    /// Scheme included (`mqtt://…`). Empty means the broker channel stays
    /// dormant.
    pub broker_uri: heapless::String<BROKER_URI_MAX>,
    pub topic_cmd: heapless::String<TOPIC_MAX>,
    pub topic_status: heapless::String<TOPIC_MAX>,
    pub topic_tele: heapless::String<TOPIC_MAX>,
    pub boot_mode: BootMode,
}

impl GateConfig {
    /// Whether station credentials exist at all.
    pub fn has_credentials(&self) -> bool {
        !self.wifi_ssid.is_empty()
    }

    /// The boot mode the device actually honours: a missing SSID forces
    /// provisioning no matter what byte is stored.
    pub fn effective_boot_mode(&self) -> BootMode {
        if self.has_credentials() {
            self.boot_mode
        } else {
            BootMode::Provisioning
        }
    }

    /// Whether the broker channel should be brought up.
    pub fn broker_configured(&self) -> bool {
        !self.broker_uri.is_empty()
    }

    // ── Bounds-checked setters ────────────────────────────────

    pub fn set_wifi(&mut self, ssid: &str, pass: &str) -> Result<()> {
        self.wifi_ssid = bounded(ssid, "wifi_ssid")?;
        self.wifi_pass = bounded(pass, "wifi_pass")?;
        Ok(())
    }

    pub fn set_broker_uri(&mut self, uri: &str) -> Result<()> {
        self.broker_uri = bounded(uri, "broker_uri")?;
        Ok(())
    }

    pub fn set_topic_cmd(&mut self, topic: &str) -> Result<()> {
        self.topic_cmd = bounded(topic, "topic_cmd")?;
        Ok(())
    }

    pub fn set_topic_status(&mut self, topic: &str) -> Result<()> {
        self.topic_status = bounded(topic, "topic_status")?;
        Ok(())
    }

    pub fn set_topic_tele(&mut self, topic: &str) -> Result<()> {
        self.topic_tele = bounded(topic, "topic_tele")?;
        Ok(())
    }
}

fn bounded<const N: usize>(value: &str, field: &'static str) -> Result<heapless::String<N>> {
    heapless::String::try_from(value).map_err(|()| Error::Config(field))
}

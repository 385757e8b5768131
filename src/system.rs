//! Process-wide shared state and restart plumbing.
//!
//! One [`SystemState`] is built during bootstrap and shared (`Arc`) with
//! the HTTP portal handlers and the supervisor loop.  The FSM task does
//! not touch it: its channels are the lock-free command queue and status
//! cell, both reachable here for the producers.

use std::sync::{Arc, Mutex};

use crate::adapters::mqtt::BrokerChannel;
use crate::adapters::nvs::NvsAdapter;
use crate::adapters::time::Esp32TimeAdapter;
use crate::adapters::wifi::WifiSupervisor;
use crate::app::commands::CommandQueue;
use crate::app::events::StatusCell;

pub struct SystemState {
    pub nvs: Mutex<NvsAdapter>,
    pub wifi: Mutex<WifiSupervisor>,
    pub broker: Arc<Mutex<BrokerChannel>>,
    pub status: Arc<StatusCell>,
    pub queue: Arc<CommandQueue>,
    pub clock: Esp32TimeAdapter,
}

impl SystemState {
    pub fn new(
        nvs: NvsAdapter,
        wifi: WifiSupervisor,
        broker: Arc<Mutex<BrokerChannel>>,
        status: Arc<StatusCell>,
        queue: Arc<CommandQueue>,
    ) -> Self {
        Self {
            nvs: Mutex::new(nvs),
            wifi: Mutex::new(wifi),
            broker,
            status,
            queue,
            clock: Esp32TimeAdapter::new(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.uptime_ms()
    }
}

/// Restart the device immediately.
#[cfg(target_os = "espidf")]
pub fn restart_device(reason: &str) {
    log::warn!("restarting device: {reason}");
    unsafe {
        esp_idf_svc::sys::esp_restart();
    }
}

/// Simulation: a restart is logged, not performed.
#[cfg(not(target_os = "espidf"))]
pub fn restart_device(reason: &str) {
    log::warn!("restart_device(sim): {reason}");
}

/// Restart from a detached thread after `delay_ms`, giving the HTTP
/// response time to flush.
pub fn schedule_restart(delay_ms: u32, reason: &'static str) {
    let spawned = std::thread::Builder::new()
        .name("reboot".into())
        .spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(u64::from(delay_ms)));
            restart_device(reason);
        });
    if spawned.is_err() {
        // No thread, no grace period.
        restart_device(reason);
    }
}

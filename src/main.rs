//! Porton Firmware — Main Entry Point
//!
//! Hexagonal architecture with a dedicated FSM task.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter   LogEventSink   NvsAdapter    Esp32Time      │
//! │  (Switch+Motor)    (EventSink)    (Config+NVS)  (ClockPort)    │
//! │  WifiSupervisor    BrokerChannel  Portal                       │
//! │  (STA + AP)        (MQTT)         (HTTP provisioning)         │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              GateService (pure logic)                  │    │
//! │  │  FSM · debounce · deadlines                            │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  FSM task (10–20 ms cycle) · supervisor loop (500 ms poll)     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Module declarations ───────────────────────────────────────
pub mod config;
mod error;
mod pins;
mod system;

pub mod app;
mod adapters;
mod drivers;
pub mod fsm;

// ── Imports ───────────────────────────────────────────────────
use std::sync::{Arc, Mutex};

use anyhow::Result;
use log::{error, info, warn};

use adapters::hardware::HardwareAdapter;
use adapters::log_sink::{FanoutSink, LogEventSink};
use adapters::mqtt::{BrokerChannel, BrokerSink};
use adapters::nvs::NvsAdapter;
use adapters::portal;
use adapters::time::Esp32TimeAdapter;
use adapters::wifi::{SupervisorAction, WifiSupervisor};
use app::commands::CommandQueue;
use app::events::StatusCell;
use app::ports::{ClockPort, ConfigPort};
use app::service::GateService;
use config::{BootMode, GateConfig, SUPERVISOR_POLL_MS};
use drivers::lamp::LampDriver;
use drivers::motor::MotorDriver;
use system::SystemState;

// ── FSM task ──────────────────────────────────────────────────

/// Spawn the dedicated FSM worker.  Runs above the I/O tasks so a busy
/// network stack cannot starve the 10 ms motion cycle.
fn spawn_fsm_task(
    queue: Arc<CommandQueue>,
    status: Arc<StatusCell>,
    broker: Arc<Mutex<BrokerChannel>>,
) -> Result<()> {
    #[cfg(target_os = "espidf")]
    esp_idf_hal::task::thread::ThreadSpawnConfiguration {
        name: Some(b"gate_fsm\0"),
        stack_size: 8 * 1024,
        priority: 7,
        ..Default::default()
    }
    .set()?;

    std::thread::Builder::new()
        .name("gate_fsm".into())
        .stack_size(8 * 1024)
        .spawn(move || {
            let mut hw = HardwareAdapter::new(
                MotorDriver::new(),
                LampDriver::new(),
                Esp32TimeAdapter::new(),
            );
            let mut sink = FanoutSink {
                first: LogEventSink::new(),
                second: BrokerSink::new(broker),
            };
            let mut service = GateService::new(queue, status);
            service.start(&mut hw);

            loop {
                let cycle_delay = service.cycle(&mut hw, &mut sink);
                hw.delay_ms(cycle_delay);
            }
        })?;

    #[cfg(target_os = "espidf")]
    esp_idf_hal::task::thread::ThreadSpawnConfiguration::default().set()?;

    Ok(())
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("Porton v{} starting", env!("CARGO_PKG_VERSION"));

    // ── 2. Peripherals ────────────────────────────────────────
    if let Err(e) = drivers::hw_init::init_peripherals() {
        // GPIO init failure leaves the motor outputs undefined — restart
        // rather than run without control of the contactors.
        error!("HAL init failed: {}", e);
        system::restart_device("GPIO init failed");
        return Ok(());
    }
    let watchdog = drivers::watchdog::Watchdog::subscribe();

    // ── 3. Load config from NVS ───────────────────────────────
    let nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => {
            error!("NVS init failed: {}", e);
            system::restart_device("storage init failed");
            return Ok(());
        }
    };
    let config = match nvs.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            GateConfig::default()
        }
    };
    let boot_mode = config.effective_boot_mode();
    info!("Boot mode: {:?}", boot_mode);

    // ── 4. Cross-task channels ────────────────────────────────
    let queue = Arc::new(CommandQueue::new());
    let status = Arc::new(StatusCell::new());

    // ── 5. Connectivity ───────────────────────────────────────
    let clock = Esp32TimeAdapter::new();
    let mut wifi = WifiSupervisor::new();
    if let Err(e) = wifi.start(
        boot_mode,
        config.wifi_ssid.as_str(),
        config.wifi_pass.as_str(),
        clock.uptime_ms(),
    ) {
        // Without WiFi neither the portal nor the broker is reachable.
        error!("WiFi start failed: {}", e);
        system::restart_device("WiFi init failed");
        return Ok(());
    }

    // ── 6. Broker channel (dormant when unconfigured) ─────────
    let mut broker = BrokerChannel::new(Arc::clone(&queue), Arc::clone(&status));
    if let Err(e) = broker.start(&config) {
        warn!("Broker start failed ({}), continuing without it", e);
    }
    let broker = Arc::new(Mutex::new(broker));

    // ── 7. Shared state + portal ──────────────────────────────
    let state = Arc::new(SystemState::new(
        nvs,
        wifi,
        Arc::clone(&broker),
        Arc::clone(&status),
        Arc::clone(&queue),
    ));

    let _portal = portal::start_portal(Arc::clone(&state))?;

    // ── 8. FSM task ───────────────────────────────────────────
    spawn_fsm_task(Arc::clone(&queue), Arc::clone(&status), Arc::clone(&broker))?;

    info!("System ready.");

    // ── 9. Supervisor loop (connect watchdog, 500 ms poll) ────
    loop {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(
            SUPERVISOR_POLL_MS,
        )));
        watchdog.feed();

        let now_ms = state.now_ms();
        let action = match state.wifi.lock() {
            Ok(mut wifi) => wifi.poll(now_ms),
            Err(_) => None,
        };

        match action {
            Some(SupervisorAction::GotIp(ip)) => {
                info!("Connectivity up at {}", ip);
                match state.nvs.lock() {
                    Ok(mut nvs) => {
                        if let Err(e) = nvs.save_boot_mode(BootMode::Operational) {
                            warn!("Failed to persist operational boot mode ({})", e);
                        }
                    }
                    Err(_) => warn!("NVS lock poisoned, boot mode not persisted"),
                }
            }
            Some(SupervisorAction::Reprovision) => {
                if let Ok(mut nvs) = state.nvs.lock() {
                    let _ = nvs.save_boot_mode(BootMode::Provisioning);
                }
                system::restart_device("connect watchdog expired");
            }
            None => {}
        }
    }
}

//! Hardware adapter — bridges real peripherals to domain port traits.
//!
//! Owns the motor and lamp drivers and the limit inputs, exposing them
//! through [`SwitchPort`], [`MotorPort`] and [`ClockPort`].  This is the
//! only module that touches actual GPIO.  On non-espidf targets the
//! underlying helpers are simulation stubs.

use crate::adapters::time::Esp32TimeAdapter;
use crate::app::ports::{ClockPort, MotorPort, SwitchPort};
use crate::drivers::hw_init;
use crate::drivers::lamp::LampDriver;
use crate::drivers::motor::MotorDriver;
use crate::fsm::context::{LimitSnapshot, MotorCmd};
use crate::pins;

/// Concrete adapter that combines all gate hardware behind port traits.
pub struct HardwareAdapter {
    motor: MotorDriver,
    lamp: LampDriver,
    time: Esp32TimeAdapter,
}

impl HardwareAdapter {
    pub fn new(motor: MotorDriver, lamp: LampDriver, time: Esp32TimeAdapter) -> Self {
        Self { motor, lamp, time }
    }
}

// ── SwitchPort implementation ─────────────────────────────────

impl SwitchPort for HardwareAdapter {
    fn sample_limits(&mut self) -> LimitSnapshot {
        // Contacts are active-low: asserted pulls the pin to GND.
        LimitSnapshot {
            open: !hw_init::gpio_read(pins::LIMIT_OPEN_GPIO),
            closed: !hw_init::gpio_read(pins::LIMIT_CLOSED_GPIO),
        }
    }
}

// ── MotorPort implementation ──────────────────────────────────

impl MotorPort for HardwareAdapter {
    fn drive(&mut self, cmd: MotorCmd) {
        self.motor.drive(cmd);
    }

    fn set_lamp(&mut self, on: bool) {
        self.lamp.set(on);
    }

    fn all_off(&mut self) {
        self.motor.stop();
        self.lamp.off();
    }
}

// ── ClockPort implementation ──────────────────────────────────

impl ClockPort for HardwareAdapter {
    fn now_ms(&self) -> u64 {
        self.time.uptime_ms()
    }

    #[cfg(target_os = "espidf")]
    fn delay_ms(&mut self, ms: u32) {
        esp_idf_hal::delay::FreeRtos::delay_ms(ms);
    }

    #[cfg(not(target_os = "espidf"))]
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}

//! Gate motor driver (dual-contactor H-bridge).
//!
//! Two digital outputs select the drive direction; energizing both at once
//! would short the windings through the bridge.  Direction changes are
//! therefore never instantaneous: the opposite output is de-energized
//! first, then a brake gap of at least [`BRAKE_GAP_MS`] elapses before the
//! requested direction is energized.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: drives real GPIO via hw_init helpers and FreeRTOS delays.
//! On host/test: tracks line state in-memory only.

use crate::config::BRAKE_GAP_MS;
use crate::drivers::hw_init;
use crate::fsm::context::MotorCmd;
use crate::pins;

pub struct MotorDriver {
    open_line: bool,
    close_line: bool,
}

impl MotorDriver {
    pub fn new() -> Self {
        Self {
            open_line: false,
            close_line: false,
        }
    }

    /// Apply the requested drive.  Idempotent: re-requesting the current
    /// direction touches nothing.
    pub fn drive(&mut self, cmd: MotorCmd) {
        match cmd {
            MotorCmd::Off => self.stop(),
            MotorCmd::Opening => {
                if self.open_line {
                    return;
                }
                if self.close_line {
                    self.set_close(false);
                    Self::brake_gap();
                }
                self.set_open(true);
            }
            MotorCmd::Closing => {
                if self.close_line {
                    return;
                }
                if self.open_line {
                    self.set_open(false);
                    Self::brake_gap();
                }
                self.set_close(true);
            }
        }
    }

    /// De-energize both directions.
    pub fn stop(&mut self) {
        self.set_open(false);
        self.set_close(false);
    }

    /// Current output lines as `(open, close)`.
    pub fn lines(&self) -> (bool, bool) {
        (self.open_line, self.close_line)
    }

    pub fn is_running(&self) -> bool {
        self.open_line || self.close_line
    }

    // ── Internal ──────────────────────────────────────────────

    fn set_open(&mut self, on: bool) {
        self.open_line = on;
        hw_init::gpio_write(pins::MOTOR_OPEN_GPIO, on);
    }

    fn set_close(&mut self, on: bool) {
        self.close_line = on;
        hw_init::gpio_write(pins::MOTOR_CLOSE_GPIO, on);
    }

    #[cfg(target_os = "espidf")]
    fn brake_gap() {
        esp_idf_hal::delay::FreeRtos::delay_ms(BRAKE_GAP_MS);
    }

    #[cfg(not(target_os = "espidf"))]
    fn brake_gap() {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(BRAKE_GAP_MS)));
    }
}

impl Default for MotorDriver {
    fn default() -> Self {
        Self::new()
    }
}

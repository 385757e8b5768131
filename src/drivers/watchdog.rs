//! Supervisor-loop watchdog.
//!
//! The 500 ms connectivity poll on the main task is the liveness signal
//! for everything outside the FSM task: it runs the connect watchdog and
//! must keep coming back from NVS and lock acquisitions.  The task WDT is
//! configured with a stall budget expressed in missed polls; exhausting
//! it panics and reboots into a clean bootstrap.
//!
//! The FSM task is deliberately not subscribed: its cycle blocks in the
//! debounce settle window, and motion safety is enforced by the motion
//! deadlines rather than by this timer.

use crate::config::SUPERVISOR_POLL_MS;

/// Missed supervisor polls tolerated before the hardware reset fires.
/// 16 polls at the 500 ms cadence is an 8 s stall budget.
const STALL_POLL_BUDGET: u32 = 16;

pub struct Watchdog {
    stall_budget_ms: u32,
    #[cfg(target_os = "espidf")]
    subscribed: bool,
}

impl Watchdog {
    /// Reconfigure the task WDT around the supervisor cadence and
    /// subscribe the calling task.  Call once from the main task before
    /// entering the poll loop.
    pub fn subscribe() -> Self {
        let stall_budget_ms = STALL_POLL_BUDGET * SUPERVISOR_POLL_MS;

        #[cfg(target_os = "espidf")]
        {
            use esp_idf_svc::sys::*;

            // SAFETY: TWDT calls run on the single main task before any
            // other task is spawned.
            let subscribed = unsafe {
                let cfg = esp_task_wdt_config_t {
                    timeout_ms: stall_budget_ms,
                    idle_core_mask: 0,
                    trigger_panic: true,
                };
                if esp_task_wdt_reconfigure(&cfg) != ESP_OK {
                    log::warn!("watchdog: TWDT already configured, keeping existing timeout");
                }
                esp_task_wdt_add(core::ptr::null_mut()) == ESP_OK
            };

            if subscribed {
                log::info!(
                    "watchdog: supervisor task subscribed ({} polls / {} ms stall budget)",
                    STALL_POLL_BUDGET,
                    stall_budget_ms
                );
            } else {
                log::warn!("watchdog: TWDT subscribe failed, supervisor runs unsupervised");
            }

            Self {
                stall_budget_ms,
                subscribed,
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            log::info!("watchdog(sim): no-op ({} ms stall budget)", stall_budget_ms);
            Self { stall_budget_ms }
        }
    }

    /// Reset the stall budget.  Called once per supervisor poll.
    pub fn feed(&self) {
        #[cfg(target_os = "espidf")]
        if self.subscribed {
            // SAFETY: reset on the subscribed task is a plain register poke.
            unsafe {
                esp_idf_svc::sys::esp_task_wdt_reset();
            }
        }
    }

    /// The stall budget in milliseconds.
    pub fn stall_budget_ms(&self) -> u32 {
        self.stall_budget_ms
    }
}

//! Warning-lamp relay driver.

use crate::drivers::hw_init;
use crate::pins;

pub struct LampDriver {
    on: bool,
}

impl LampDriver {
    pub fn new() -> Self {
        Self { on: false }
    }

    pub fn set(&mut self, on: bool) {
        if self.on != on {
            hw_init::gpio_write(pins::LAMP_GPIO, on);
            self.on = on;
        }
    }

    pub fn off(&mut self) {
        self.set(false);
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

impl Default for LampDriver {
    fn default() -> Self {
        Self::new()
    }
}

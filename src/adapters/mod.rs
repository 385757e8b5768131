//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements            | Connects to                |
//! |--------------|-----------------------|----------------------------|
//! | `hardware`   | SwitchPort            | ESP32 GPIO (limit inputs)  |
//! |              | MotorPort             | ESP32 GPIO (motor, lamp)   |
//! |              | ClockPort             | esp_timer / FreeRTOS delay |
//! | `log_sink`   | EventSink             | Serial log output          |
//! | `mqtt`       | EventSink             | ESP-IDF MQTT client        |
//! | `nvs`        | ConfigPort            | NVS / in-memory store      |
//! |              | StoragePort           |                            |
//! | `portal`     | —                     | ESP-IDF HTTP server        |
//! | `time`       | —                     | ESP32 system timer         |
//! | `wifi`       | —                     | ESP-IDF WiFi STA + AP      |

pub mod hardware;
pub mod log_sink;
pub mod mqtt;
pub mod nvs;
pub mod portal;
pub mod time;
pub mod wifi;

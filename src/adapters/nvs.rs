//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`ConfigPort`] and [`StoragePort`] for the gate controller.
//! Each configuration field lives under its own key in the `config`
//! namespace, so the portal can overwrite one field without rewriting the
//! record.  ESP-IDF NVS commits are atomic per `nvs_commit()`.
//!
//! The simulation backend (host tests) keeps everything in a HashMap.

use crate::app::ports::{ConfigPort, StoragePort};
use crate::config::{BootMode, GateConfig};
use crate::error::StorageError;
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::cell::RefCell;
#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// Namespace holding every persisted configuration key.
const CONFIG_NAMESPACE: &str = "config";

const KEY_WIFI_SSID: &str = "wifi_ssid";
const KEY_WIFI_PASS: &str = "wifi_pass";
const KEY_BOOT_MODE: &str = "boot_mode";
const KEY_BROKER_URI: &str = "mqtt_uri";
const KEY_TOPIC_CMD: &str = "topic1";
const KEY_TOPIC_STATUS: &str = "topic2";
const KEY_TOPIC_TELE: &str = "topic3";

const ALL_KEYS: [&str; 7] = [
    KEY_WIFI_SSID,
    KEY_WIFI_PASS,
    KEY_BOOT_MODE,
    KEY_BROKER_URI,
    KEY_TOPIC_CMD,
    KEY_TOPIC_STATUS,
    KEY_TOPIC_TELE,
];

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create a new adapter and initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the NVS partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                let ret2 = unsafe { nvs_flash_erase() };
                if ret2 != ESP_OK {
                    return Err(StorageError::IoError);
                }
                let ret3 = unsafe { nvs_flash_init() };
                if ret3 != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = namespace.as_bytes();
        let len = ns_bytes.len().min(15);
        ns_buf[..len].copy_from_slice(&ns_bytes[..len]);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    // ── Typed helpers over the config namespace ──────────────

    fn read_string<const N: usize>(&self, key: &str) -> heapless::String<N> {
        let mut buf = [0u8; 256];
        match self.read(CONFIG_NAMESPACE, key, &mut buf) {
            Ok(len) => match core::str::from_utf8(&buf[..len]) {
                Ok(s) => heapless::String::try_from(s).unwrap_or_else(|()| {
                    warn!("NVS: '{key}' exceeds field capacity, ignoring");
                    heapless::String::new()
                }),
                Err(_) => {
                    warn!("NVS: '{key}' is not valid UTF-8, ignoring");
                    heapless::String::new()
                }
            },
            Err(_) => heapless::String::new(),
        }
    }

    fn write_string(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.write(CONFIG_NAMESPACE, key, value.as_bytes())
    }
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<GateConfig, StorageError> {
        let mut cfg = GateConfig {
            wifi_ssid: self.read_string(KEY_WIFI_SSID),
            wifi_pass: self.read_string(KEY_WIFI_PASS),
            broker_uri: self.read_string(KEY_BROKER_URI),
            topic_cmd: self.read_string(KEY_TOPIC_CMD),
            topic_status: self.read_string(KEY_TOPIC_STATUS),
            topic_tele: self.read_string(KEY_TOPIC_TELE),
            boot_mode: BootMode::Provisioning,
        };

        let mut byte = [0u8; 1];
        if let Ok(1) = self.read(CONFIG_NAMESPACE, KEY_BOOT_MODE, &mut byte) {
            cfg.boot_mode = BootMode::from_byte(byte[0]);
        }

        info!(
            "NvsAdapter: config loaded (ssid='{}', broker='{}', mode={:?})",
            cfg.wifi_ssid, cfg.broker_uri, cfg.boot_mode
        );
        Ok(cfg)
    }

    fn save_wifi(&mut self, ssid: &str, pass: &str) -> Result<(), StorageError> {
        self.write_string(KEY_WIFI_SSID, ssid)?;
        self.write_string(KEY_WIFI_PASS, pass)
    }

    fn save_broker_uri(&mut self, uri: &str) -> Result<(), StorageError> {
        self.write_string(KEY_BROKER_URI, uri)
    }

    fn save_topic_cmd(&mut self, topic: &str) -> Result<(), StorageError> {
        self.write_string(KEY_TOPIC_CMD, topic)
    }

    fn save_topic_status(&mut self, topic: &str) -> Result<(), StorageError> {
        self.write_string(KEY_TOPIC_STATUS, topic)
    }

    fn save_topic_tele(&mut self, topic: &str) -> Result<(), StorageError> {
        self.write_string(KEY_TOPIC_TELE, topic)
    }

    fn save_boot_mode(&mut self, mode: BootMode) -> Result<(), StorageError> {
        self.write(CONFIG_NAMESPACE, KEY_BOOT_MODE, &[mode.as_byte()])
    }

    fn wipe(&mut self) -> Result<(), StorageError> {
        for key in ALL_KEYS {
            self.delete(CONFIG_NAMESPACE, key)?;
        }
        info!("NvsAdapter: configuration wiped");
        Ok(())
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            match self.store.borrow().get(&composite) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut key_buf = [0u8; 16];
                let kb = key.as_bytes();
                let kl = kb.len().min(15);
                key_buf[..kl].copy_from_slice(&kb[..kl]);

                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret == ESP_ERR_NVS_NOT_FOUND {
                    return Err(ESP_ERR_NVS_NOT_FOUND);
                }
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let mut key_buf = [0u8; 16];
                let kb = key.as_bytes();
                let kl = kb.len().min(15);
                key_buf[..kl].copy_from_slice(&kb[..kl]);

                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().remove(&composite);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let mut key_buf = [0u8; 16];
                let kb = key.as_bytes();
                let kl = kb.len().min(15);
                key_buf[..kl].copy_from_slice(&kb[..kl]);

                let ret = unsafe { nvs_erase_key(handle, key_buf.as_ptr() as *const _) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow().contains_key(&composite)
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut key_buf = [0u8; 16];
                let kb = key.as_bytes();
                let kl = kb.len().min(15);
                key_buf[..kl].copy_from_slice(&kb[..kl]);

                let ret = unsafe {
                    nvs_find_key(handle, key_buf.as_ptr() as *const _, core::ptr::null_mut())
                };
                Ok(ret == ESP_OK)
            });
            result.unwrap_or(false)
        }
    }
}

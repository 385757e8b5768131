//! WiFi connectivity supervisor.
//!
//! Owns the station lifecycle and the provisioning access point.
//!
//! ## Boot personalities
//!
//! - **Provisioning**: AP + STA. The fixed `ESP_CONFIG_AP` network is up
//!   and the portal is reachable at `http://192.168.4.1/` while the
//!   station (if credentials exist) keeps trying in the background.
//! - **Operational**: STA only.
//!
//! ## Connect watchdog
//!
//! Every deliberate connection attempt arms a 30 s deadline.  If no IP is
//! acquired within it, [`poll`](WifiSupervisor::poll) reports
//! [`SupervisorAction::Reprovision`] and the caller persists
//! `boot_mode = Provisioning` and restarts the device.  Reconnects after a
//! drop are best-effort and unbounded — the watchdog is NOT re-armed.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver calls via
//!   `esp_idf_svc::sys`.
//! - **all other targets**: simulation stubs for host-side tests.

use core::net::Ipv4Addr;
#[cfg(target_os = "espidf")]
use log::error;
use log::{info, warn};

use crate::config::{BootMode, CONNECT_TIMEOUT_MS};
use crate::error::{NetError, Result};

// ───────────────────────────────────────────────────────────────
// Provisioning AP identity
// ───────────────────────────────────────────────────────────────

pub const AP_SSID: &str = "ESP_CONFIG_AP";
pub const AP_PASSWORD: &str = "12345678";
pub const AP_CHANNEL: u8 = 1;
pub const AP_MAX_CLIENTS: u8 = 4;

// ───────────────────────────────────────────────────────────────
// Connection state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Idle,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

/// What the supervisor wants the bootstrap to do after a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorAction {
    /// An IP was acquired: persist `boot_mode = Operational`; the AP (if
    /// any) has been torn down.
    GotIp(Ipv4Addr),
    /// The connect watchdog expired: persist `boot_mode = Provisioning`
    /// and restart into the portal.
    Reprovision,
}

const RETRY_BACKOFF_MIN_MS: u64 = 2_000;
const RETRY_BACKOFF_MAX_MS: u64 = 60_000;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

/// Printable ASCII (`0x20..=0x7E`) is the strictest charset every AP the
/// gate is deployed against accepts, and it keeps the stored `wifi_ssid`
/// NVS blob safe to echo back into the portal page unescaped.  SSIDs
/// outside it are rejected rather than sanitised.
fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<()> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(NetError::InvalidSsid.into());
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(NetError::InvalidPassword.into());
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Supervisor
// ───────────────────────────────────────────────────────────────

pub struct WifiSupervisor {
    mode: BootMode,
    state: WifiState,
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    /// Connect watchdog horizon; armed only on deliberate attempts.
    connect_deadline: Option<u64>,
    /// Earliest instant the next background retry may fire.
    next_retry_at: u64,
    retry_backoff_ms: u64,
    ip: Option<Ipv4Addr>,
    /// Simulation: whether the scripted network accepts the connection.
    #[cfg(not(target_os = "espidf"))]
    sim_connectable: bool,
    /// Simulation: whether the AP side is currently up.
    #[cfg(not(target_os = "espidf"))]
    sim_ap_up: bool,
}

impl WifiSupervisor {
    pub fn new() -> Self {
        Self {
            mode: BootMode::Provisioning,
            state: WifiState::Idle,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            connect_deadline: None,
            next_retry_at: 0,
            retry_backoff_ms: RETRY_BACKOFF_MIN_MS,
            ip: None,
            #[cfg(not(target_os = "espidf"))]
            sim_connectable: true,
            #[cfg(not(target_os = "espidf"))]
            sim_ap_up: false,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Bring the WiFi stack up in the given personality and, when
    /// credentials exist, start a watchdog-supervised connection attempt.
    pub fn start(&mut self, mode: BootMode, ssid: &str, password: &str, now_ms: u64) -> Result<()> {
        self.mode = mode;
        if !ssid.is_empty() {
            self.set_credentials(ssid, password)?;
        }

        self.platform_start(mode)?;
        match mode {
            BootMode::Provisioning => {
                info!("WiFi: stack up, AP '{AP_SSID}' on channel {AP_CHANNEL}");
            }
            BootMode::Operational => info!("WiFi: stack up (station-only)"),
        }

        if !self.ssid.is_empty() {
            self.connect(now_ms)?;
        }
        Ok(())
    }

    /// Validate and store station credentials (driver-level only — the
    /// configuration store is the persistent source of truth).
    pub fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<()> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid
            .push_str(ssid)
            .map_err(|()| crate::error::Error::Net(NetError::InvalidSsid))?;
        self.password.clear();
        self.password
            .push_str(password)
            .map_err(|()| crate::error::Error::Net(NetError::InvalidPassword))?;
        info!("WiFi: credentials updated (SSID='{}')", self.ssid);
        Ok(())
    }

    /// Start a deliberate connection attempt and arm the connect watchdog.
    pub fn connect(&mut self, now_ms: u64) -> Result<()> {
        if self.ssid.is_empty() {
            return Err(NetError::WifiConnectFailed.into());
        }

        info!("WiFi: connecting to '{}'", self.ssid);
        self.ip = None;
        self.platform_configure_station()?;
        self.platform_connect()?;
        self.state = WifiState::Connecting;
        self.connect_deadline = Some(now_ms + CONNECT_TIMEOUT_MS);
        Ok(())
    }

    /// Drop the link and start over with the (possibly new) credentials.
    /// Used by the portal's WiFi form; re-arms the watchdog.
    pub fn reconnect(&mut self, now_ms: u64) -> Result<()> {
        self.platform_disconnect();
        self.connect(now_ms)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> WifiState {
        self.state
    }

    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.ip
    }

    pub fn is_connected(&self) -> bool {
        self.state == WifiState::Connected
    }

    // ── Supervision ───────────────────────────────────────────

    /// Advance the connectivity state machine.  Called every 500 ms from
    /// the main thread.
    pub fn poll(&mut self, now_ms: u64) -> Option<SupervisorAction> {
        match self.state {
            WifiState::Connecting | WifiState::Reconnecting { .. } => {
                if let Some(ip) = self.platform_got_ip() {
                    return Some(self.on_got_ip(ip));
                }

                if self
                    .connect_deadline
                    .is_some_and(|deadline| now_ms > deadline)
                {
                    warn!("WiFi: no IP within {}s, requesting re-provisioning", CONNECT_TIMEOUT_MS / 1_000);
                    self.connect_deadline = None;
                    return Some(SupervisorAction::Reprovision);
                }

                // Background retry with backoff while the link is down.
                if let WifiState::Reconnecting { attempt } = self.state {
                    if now_ms >= self.next_retry_at {
                        info!("WiFi: reconnect attempt {}", attempt + 1);
                        let _ = self.platform_connect();
                        self.retry_backoff_ms =
                            (self.retry_backoff_ms * 2).min(RETRY_BACKOFF_MAX_MS);
                        self.next_retry_at = now_ms + self.retry_backoff_ms;
                        self.state = WifiState::Reconnecting { attempt: attempt + 1 };
                    }
                }
                None
            }

            WifiState::Connected => {
                if !self.platform_is_connected() {
                    // Best-effort unbounded reconnect; the watchdog stays
                    // disarmed while credentials persist.
                    warn!("WiFi: connection lost, entering reconnect");
                    self.ip = None;
                    self.state = WifiState::Reconnecting { attempt: 0 };
                    self.retry_backoff_ms = RETRY_BACKOFF_MIN_MS;
                    self.next_retry_at = now_ms + self.retry_backoff_ms;
                    let _ = self.platform_connect();
                }
                None
            }

            WifiState::Idle => None,
        }
    }

    fn on_got_ip(&mut self, ip: Ipv4Addr) -> SupervisorAction {
        info!("WiFi: got IP {}", ip);
        self.ip = Some(ip);
        self.state = WifiState::Connected;
        self.connect_deadline = None;
        self.retry_backoff_ms = RETRY_BACKOFF_MIN_MS;

        // Provisioning succeeded — drop the AP, station-only from here.
        if self.mode == BootMode::Provisioning {
            self.platform_teardown_ap();
            self.mode = BootMode::Operational;
        }
        SupervisorAction::GotIp(ip)
    }

    // ── Platform-specific (ESP-IDF) ───────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self, mode: BootMode) -> Result<()> {
        use esp_idf_svc::sys::*;
        unsafe {
            let netif_ret = esp_netif_init();
            if netif_ret != ESP_OK as i32 {
                error!("WiFi: esp_netif_init failed ({})", netif_ret);
                return Err(NetError::WifiInitFailed.into());
            }

            let loop_ret = esp_event_loop_create_default();
            if loop_ret != ESP_OK as i32 && loop_ret != ESP_ERR_INVALID_STATE as i32 {
                error!("WiFi: esp_event_loop_create_default failed ({})", loop_ret);
                return Err(NetError::WifiInitFailed.into());
            }

            esp_netif_create_default_wifi_sta();
            if mode == BootMode::Provisioning {
                esp_netif_create_default_wifi_ap();
            }

            let wifi_init_cfg = wifi_init_config_t {
                ..Default::default()
            };
            let ret = esp_wifi_init(&wifi_init_cfg);
            if ret != ESP_OK as i32 {
                error!("WiFi: esp_wifi_init failed ({})", ret);
                return Err(NetError::WifiInitFailed.into());
            }

            // Driver config stays in RAM; the configuration store is the
            // only persistent source of truth for credentials.
            esp_wifi_set_storage(wifi_storage_t_WIFI_STORAGE_RAM);

            let wifi_mode = if mode == BootMode::Provisioning {
                wifi_mode_t_WIFI_MODE_APSTA
            } else {
                wifi_mode_t_WIFI_MODE_STA
            };
            let ret = esp_wifi_set_mode(wifi_mode);
            if ret != ESP_OK as i32 {
                error!("WiFi: esp_wifi_set_mode failed ({})", ret);
                return Err(NetError::WifiInitFailed.into());
            }

            if mode == BootMode::Provisioning {
                self.platform_configure_ap()?;
            }

            let ret = esp_wifi_start();
            if ret != ESP_OK as i32 {
                error!("WiFi: esp_wifi_start failed ({})", ret);
                return Err(NetError::WifiInitFailed.into());
            }
        }
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_configure_ap(&mut self) -> Result<()> {
        use esp_idf_svc::sys::*;
        unsafe {
            let mut wifi_cfg: wifi_config_t = core::mem::zeroed();
            let ap = &mut wifi_cfg.__bindgen_anon_1.ap;

            let ssid = AP_SSID.as_bytes();
            let pass = AP_PASSWORD.as_bytes();
            ap.ssid[..ssid.len()].copy_from_slice(ssid);
            ap.ssid_len = ssid.len() as u8;
            ap.password[..pass.len()].copy_from_slice(pass);
            ap.channel = AP_CHANNEL;
            ap.max_connection = AP_MAX_CLIENTS;
            ap.authmode = if pass.is_empty() {
                wifi_auth_mode_t_WIFI_AUTH_OPEN
            } else {
                wifi_auth_mode_t_WIFI_AUTH_WPA_WPA2_PSK
            };

            let ret = esp_wifi_set_config(wifi_interface_t_WIFI_IF_AP, &mut wifi_cfg);
            if ret != ESP_OK as i32 {
                error!("WiFi: AP esp_wifi_set_config failed ({})", ret);
                return Err(NetError::WifiInitFailed.into());
            }
        }
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_configure_station(&mut self) -> Result<()> {
        use esp_idf_svc::sys::*;
        unsafe {
            let mut wifi_cfg: wifi_config_t = core::mem::zeroed();
            let sta = &mut wifi_cfg.__bindgen_anon_1.sta;

            let ssid_bytes = self.ssid.as_bytes();
            let pw_bytes = self.password.as_bytes();
            sta.ssid[..ssid_bytes.len()].copy_from_slice(ssid_bytes);
            sta.password[..pw_bytes.len()].copy_from_slice(pw_bytes);

            sta.threshold.authmode = if self.password.is_empty() {
                wifi_auth_mode_t_WIFI_AUTH_OPEN
            } else {
                wifi_auth_mode_t_WIFI_AUTH_WPA2_PSK
            };

            let ret = esp_wifi_set_config(wifi_interface_t_WIFI_IF_STA, &mut wifi_cfg);
            if ret != ESP_OK as i32 {
                error!("WiFi: STA esp_wifi_set_config failed ({})", ret);
                return Err(NetError::WifiConnectFailed.into());
            }
        }
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<()> {
        use esp_idf_svc::sys::*;
        unsafe {
            let ret = esp_wifi_connect();
            if ret != ESP_OK as i32 {
                error!("WiFi: esp_wifi_connect failed ({})", ret);
                return Err(NetError::WifiConnectFailed.into());
            }
        }
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        unsafe {
            esp_idf_svc::sys::esp_wifi_disconnect();
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        use esp_idf_svc::sys::*;
        unsafe {
            let mut ap_info: wifi_ap_record_t = core::mem::zeroed();
            esp_wifi_sta_get_ap_info(&mut ap_info) == ESP_OK as i32
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_got_ip(&self) -> Option<Ipv4Addr> {
        use esp_idf_svc::sys::*;
        unsafe {
            let key = b"WIFI_STA_DEF\0";
            let netif = esp_netif_get_handle_from_ifkey(key.as_ptr() as *const _);
            if netif.is_null() {
                return None;
            }
            let mut ip_info: esp_netif_ip_info_t = core::mem::zeroed();
            if esp_netif_get_ip_info(netif, &mut ip_info) != ESP_OK as i32 {
                return None;
            }
            if ip_info.ip.addr == 0 {
                return None;
            }
            Some(Ipv4Addr::from(ip_info.ip.addr.to_le_bytes()))
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_teardown_ap(&mut self) {
        use esp_idf_svc::sys::*;
        unsafe {
            let ret = esp_wifi_set_mode(wifi_mode_t_WIFI_MODE_STA);
            if ret != ESP_OK as i32 {
                warn!("WiFi: AP teardown failed ({})", ret);
            } else {
                info!("WiFi: provisioning AP torn down, station-only");
            }
        }
    }

    // ── Platform-specific (simulation) ────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self, mode: BootMode) -> Result<()> {
        self.sim_ap_up = mode == BootMode::Provisioning;
        info!("WiFi(sim): stack up ({:?})", mode);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_configure_station(&mut self) -> Result<()> {
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<()> {
        if !self.sim_connectable {
            warn!("WiFi(sim): network '{}' unreachable", self.ssid);
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        info!("WiFi(sim): disconnected");
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.sim_connectable
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_got_ip(&self) -> Option<Ipv4Addr> {
        self.sim_connectable.then(|| Ipv4Addr::new(192, 168, 1, 77))
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_teardown_ap(&mut self) {
        self.sim_ap_up = false;
        info!("WiFi(sim): provisioning AP torn down");
    }

    /// Simulation control: script whether the target network is reachable.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_connectable(&mut self, reachable: bool) {
        self.sim_connectable = reachable;
    }

    /// Simulation query: whether the provisioning AP is up.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_ap_up(&self) -> bool {
        self.sim_ap_up
    }
}

impl Default for WifiSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

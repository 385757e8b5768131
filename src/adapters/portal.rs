//! Provisioning portal — one HTTP resource at `/`.
//!
//! GET renders a status page with the WiFi and broker forms plus a wipe
//! button (`?wipe=1`).  POST accepts `application/x-www-form-urlencoded`
//! bodies selected by the `act` field:
//!
//! - `act=wifi` — persist credentials, reconfigure the station, reconnect
//!   with the connect watchdog armed, keep `boot_mode = Provisioning`
//!   until an IP is actually obtained.
//! - `act=mqtt` — overwrite each non-empty broker field, then restart the
//!   broker channel unconditionally (doubles as a force-reconnect button).
//!
//! Form parsing and URL decoding are pure functions, tested on the host;
//! only the thin `EspHttpServer` wiring is ESP-IDF-specific.

use log::{info, warn};

use crate::app::ports::ConfigPort;
use crate::config::BootMode;
use crate::system::{schedule_restart, SystemState};

/// POST bodies above this are rejected with 400.
pub const MAX_BODY_BYTES: usize = 2048;

/// Delay between the wipe confirmation page and the reboot.
pub const WIPE_REBOOT_DELAY_MS: u32 = 250;

// ───────────────────────────────────────────────────────────────
// URL decoding
// ───────────────────────────────────────────────────────────────

/// Decode a `x-www-form-urlencoded` value: `+` becomes a space, `%HH`
/// becomes the byte it names, malformed sequences pass through literally.
pub fn urldecode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => match (hex_val(bytes.get(i + 1)), hex_val(bytes.get(i + 2))) {
                (Some(hi), Some(lo)) => {
                    out.push((hi << 4) | lo);
                    i += 3;
                }
                _ => {
                    out.push(b'%');
                    i += 1;
                }
            },
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: Option<&u8>) -> Option<u8> {
    match b.copied() {
        Some(b @ b'0'..=b'9') => Some(b - b'0'),
        Some(b @ b'a'..=b'f') => Some(b - b'a' + 10),
        Some(b @ b'A'..=b'F') => Some(b - b'A' + 10),
        _ => None,
    }
}

// ───────────────────────────────────────────────────────────────
// Form parsing
// ───────────────────────────────────────────────────────────────

/// Split a urlencoded body into decoded `(key, value)` pairs.
pub fn parse_pairs(body: &str) -> Vec<(String, String)> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (urldecode(k), urldecode(v))
        })
        .collect()
}

fn field<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// The action a POST body requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalAction {
    Wifi {
        ssid: String,
        pass: String,
    },
    Mqtt {
        broker: Option<String>,
        topic_cmd: Option<String>,
        topic_status: Option<String>,
        topic_tele: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalError {
    EmptyBody,
    BodyTooLarge,
    MissingSsid,
    InvalidCredentials,
    UnknownAction,
    Internal,
}

/// Parse a POST body into its action.
pub fn parse_post(body: &str) -> Result<PortalAction, PortalError> {
    if body.is_empty() {
        return Err(PortalError::EmptyBody);
    }
    if body.len() > MAX_BODY_BYTES {
        return Err(PortalError::BodyTooLarge);
    }

    let pairs = parse_pairs(body);
    match field(&pairs, "act") {
        Some("wifi") => {
            let ssid = field(&pairs, "ssid").unwrap_or("").to_owned();
            if ssid.is_empty() {
                return Err(PortalError::MissingSsid);
            }
            let pass = field(&pairs, "pass").unwrap_or("").to_owned();
            Ok(PortalAction::Wifi { ssid, pass })
        }
        Some("mqtt") => {
            let non_empty = |key: &str| {
                field(&pairs, key)
                    .filter(|v| !v.is_empty())
                    .map(str::to_owned)
            };
            Ok(PortalAction::Mqtt {
                broker: non_empty("broker"),
                topic_cmd: non_empty("t1"),
                topic_status: non_empty("t2"),
                topic_tele: non_empty("t3"),
            })
        }
        _ => Err(PortalError::UnknownAction),
    }
}

/// Whether a GET query string requests the wipe action.
pub fn is_wipe_query(query: &str) -> bool {
    parse_pairs(query)
        .iter()
        .any(|(k, v)| k == "wipe" && v == "1")
}

// ───────────────────────────────────────────────────────────────
// Action application
// ───────────────────────────────────────────────────────────────

/// Apply a parsed POST action against the live system.
pub fn apply_action(action: &PortalAction, state: &SystemState) -> Result<(), PortalError> {
    match action {
        PortalAction::Wifi { ssid, pass } => {
            {
                let mut nvs = state.nvs.lock().map_err(|_| PortalError::Internal)?;
                nvs.save_wifi(ssid, pass)
                    .map_err(|_| PortalError::Internal)?;
                // Stay in provisioning until an IP proves the credentials;
                // the got-IP path flips this to operational.
                nvs.save_boot_mode(BootMode::Provisioning)
                    .map_err(|_| PortalError::Internal)?;
            }

            let mut wifi = state.wifi.lock().map_err(|_| PortalError::Internal)?;
            if let Err(e) = wifi.set_credentials(ssid, pass) {
                warn!("Portal: rejected credentials ({e})");
                return Err(PortalError::InvalidCredentials);
            }
            if let Err(e) = wifi.reconnect(state.now_ms()) {
                warn!("Portal: reconnect failed ({e})");
            }
            info!("Portal: WiFi reconfigured for '{ssid}'");
            Ok(())
        }

        PortalAction::Mqtt {
            broker,
            topic_cmd,
            topic_status,
            topic_tele,
        } => {
            let config = {
                let mut nvs = state.nvs.lock().map_err(|_| PortalError::Internal)?;
                let store = |r: Result<(), crate::error::StorageError>| {
                    r.map_err(|_| PortalError::Internal)
                };
                if let Some(uri) = broker {
                    store(nvs.save_broker_uri(uri))?;
                }
                if let Some(t) = topic_cmd {
                    store(nvs.save_topic_cmd(t))?;
                }
                if let Some(t) = topic_status {
                    store(nvs.save_topic_status(t))?;
                }
                if let Some(t) = topic_tele {
                    store(nvs.save_topic_tele(t))?;
                }
                nvs.load().map_err(|_| PortalError::Internal)?
            };

            // Restarted even when nothing changed: the submit button is the
            // operator's force-reconnect.
            let mut channel = state.broker.lock().map_err(|_| PortalError::Internal)?;
            if let Err(e) = channel.restart(&config) {
                warn!("Portal: broker restart failed ({e})");
            }
            info!("Portal: broker channel restarted");
            Ok(())
        }
    }
}

/// Apply the wipe action: erase configuration, confirm, reboot shortly.
pub fn apply_wipe(state: &SystemState) -> Result<(), PortalError> {
    {
        let mut nvs = state.nvs.lock().map_err(|_| PortalError::Internal)?;
        nvs.wipe().map_err(|_| PortalError::Internal)?;
        nvs.save_boot_mode(BootMode::Provisioning)
            .map_err(|_| PortalError::Internal)?;
    }
    info!("Portal: configuration wiped, rebooting into provisioning");
    schedule_restart(WIPE_REBOOT_DELAY_MS, "configuration wiped");
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Page rendering
// ───────────────────────────────────────────────────────────────

/// Render the status + forms page.
pub fn render_page(state: &SystemState) -> String {
    let gate_state = state.status.state().wire_name();
    let err = state.status.err_code();
    let (ssid, broker) = state
        .nvs
        .lock()
        .ok()
        .and_then(|nvs| nvs.load().ok())
        .map(|cfg| {
            (
                cfg.wifi_ssid.as_str().to_owned(),
                cfg.broker_uri.as_str().to_owned(),
            )
        })
        .unwrap_or_default();
    let ip = state
        .wifi
        .lock()
        .ok()
        .and_then(|w| w.ip())
        .map_or_else(|| "—".to_owned(), |ip| ip.to_string());

    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">\
         <title>Portón</title>\
         <style>body{{font-family:sans-serif;max-width:30em;margin:2em auto;padding:0 1em}}\
         fieldset{{margin-bottom:1.5em}}input[type=text],input[type=password]{{width:100%}}\
         .estado{{font-size:1.4em}}</style></head><body>\
         <h1>Portón</h1>\
         <p class=\"estado\">Estado: <b>{gate_state}</b> (err={err})</p>\
         <p>IP: {ip}</p>\
         <form method=\"post\" action=\"/\"><fieldset><legend>Red WiFi</legend>\
         <input type=\"hidden\" name=\"act\" value=\"wifi\">\
         <label>SSID <input type=\"text\" name=\"ssid\" value=\"{ssid}\"></label>\
         <label>Clave <input type=\"password\" name=\"pass\"></label>\
         <button>Guardar y conectar</button></fieldset></form>\
         <form method=\"post\" action=\"/\"><fieldset><legend>Servidor MQTT</legend>\
         <input type=\"hidden\" name=\"act\" value=\"mqtt\">\
         <label>Broker <input type=\"text\" name=\"broker\" value=\"{broker}\"></label>\
         <label>Tópico comandos <input type=\"text\" name=\"t1\"></label>\
         <label>Tópico estado <input type=\"text\" name=\"t2\"></label>\
         <label>Tópico telemetría <input type=\"text\" name=\"t3\"></label>\
         <button>Guardar y reconectar</button></fieldset></form>\
         <form method=\"get\" action=\"/\">\
         <input type=\"hidden\" name=\"wipe\" value=\"1\">\
         <button>Borrar configuración</button></form>\
         </body></html>"
    )
}

/// Render the wipe confirmation page.
pub fn render_wipe_page() -> String {
    "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Portón</title></head>\
     <body><h1>Configuración borrada</h1>\
     <p>El equipo se reinicia en modo de aprovisionamiento…</p></body></html>"
        .to_owned()
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF HTTP server wiring
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub fn start_portal(
    state: std::sync::Arc<SystemState>,
) -> crate::error::Result<esp_idf_svc::http::server::EspHttpServer<'static>> {
    use esp_idf_svc::http::server::{Configuration, EspHttpServer};
    use esp_idf_svc::http::Method;
    use esp_idf_svc::io::{EspIOError, Read, Write};

    let mut server = EspHttpServer::new(&Configuration::default())
        .map_err(|_| crate::error::NetError::HttpServerFailed)?;

    // GET / — status page, or the wipe flow on ?wipe=1.
    let get_state = std::sync::Arc::clone(&state);
    server
        .fn_handler("/", Method::Get, move |request| -> Result<(), EspIOError> {
            let query = request
                .uri()
                .split_once('?')
                .map(|(_, q)| q)
                .unwrap_or("");

            let html = if is_wipe_query(query) {
                match apply_wipe(&get_state) {
                    Ok(()) => render_wipe_page(),
                    Err(_) => {
                        request.into_status_response(500)?;
                        return Ok(());
                    }
                }
            } else {
                render_page(&get_state)
            };

            let mut response = request.into_ok_response()?;
            response.write_all(html.as_bytes())?;
            Ok(())
        })
        .map_err(|_| crate::error::NetError::HttpServerFailed)?;

    // POST / — form submissions, capped body.
    let post_state = std::sync::Arc::clone(&state);
    server
        .fn_handler("/", Method::Post, move |mut request| -> Result<(), EspIOError> {
            let mut body = Vec::new();
            let mut chunk = [0u8; 256];
            loop {
                let n = match request.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(_) => {
                        request.into_status_response(500)?;
                        return Ok(());
                    }
                };
                body.extend_from_slice(&chunk[..n]);
                if body.len() > MAX_BODY_BYTES {
                    break;
                }
            }

            let outcome = if body.is_empty() {
                Err(PortalError::EmptyBody)
            } else if body.len() > MAX_BODY_BYTES {
                Err(PortalError::BodyTooLarge)
            } else {
                let text = String::from_utf8_lossy(&body);
                parse_post(&text).and_then(|action| apply_action(&action, &post_state))
            };

            match outcome {
                Ok(()) => {
                    // 303: the browser re-GETs the portal page.
                    request.into_response(303, Some("See Other"), &[("Location", "/")])?;
                }
                Err(PortalError::Internal) => {
                    request.into_status_response(500)?;
                }
                Err(_) => {
                    request.into_status_response(400)?;
                }
            }
            Ok(())
        })
        .map_err(|_| crate::error::NetError::HttpServerFailed)?;

    log::info!("Portal: serving on /");
    Ok(server)
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

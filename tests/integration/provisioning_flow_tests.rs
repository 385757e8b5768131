//! Provisioning flow tests: portal actions against the live system state.
//!
//! These exercise the same `apply_action`/`apply_wipe` paths the HTTP
//! handlers call, with the simulation backends for NVS, WiFi, and the
//! broker channel.

use std::sync::{Arc, Mutex};

use porton::adapters::mqtt::BrokerChannel;
use porton::adapters::nvs::NvsAdapter;
use porton::adapters::portal::{
    apply_action, apply_wipe, parse_post, render_page, render_wipe_page, PortalAction,
};
use porton::adapters::wifi::{SupervisorAction, WifiSupervisor, WifiState};
use porton::app::commands::CommandQueue;
use porton::app::events::StatusCell;
use porton::app::ports::ConfigPort;
use porton::config::{BootMode, CONNECT_TIMEOUT_MS};
use porton::system::SystemState;

fn make_system() -> SystemState {
    let queue = Arc::new(CommandQueue::new());
    let status = Arc::new(StatusCell::new());
    let nvs = NvsAdapter::new().unwrap();
    let wifi = WifiSupervisor::new();
    let broker = Arc::new(Mutex::new(BrokerChannel::new(
        Arc::clone(&queue),
        Arc::clone(&status),
    )));
    SystemState::new(nvs, wifi, broker, status, queue)
}

// ── act=wifi ──────────────────────────────────────────────────

#[test]
fn wifi_form_persists_credentials_and_reconnects() {
    let state = make_system();

    let action = parse_post("act=wifi&ssid=CasaPortal&pass=secreto123").unwrap();
    apply_action(&action, &state).unwrap();

    let cfg = state.nvs.lock().unwrap().load().unwrap();
    assert_eq!(cfg.wifi_ssid.as_str(), "CasaPortal");
    assert_eq!(cfg.wifi_pass.as_str(), "secreto123");
    // Stays provisioning until an IP is actually acquired.
    assert_eq!(cfg.boot_mode, BootMode::Provisioning);

    assert_eq!(state.wifi.lock().unwrap().state(), WifiState::Connecting);
}

#[test]
fn wifi_form_then_got_ip_completes_provisioning() {
    let state = make_system();
    let action = parse_post("act=wifi&ssid=CasaPortal&pass=secreto123").unwrap();
    apply_action(&action, &state).unwrap();

    // The supervisor loop observes the IP and persists operational mode.
    let polled = state.wifi.lock().unwrap().poll(state.now_ms() + 500);
    assert!(matches!(polled, Some(SupervisorAction::GotIp(_))));
    state
        .nvs
        .lock()
        .unwrap()
        .save_boot_mode(BootMode::Operational)
        .unwrap();

    let cfg = state.nvs.lock().unwrap().load().unwrap();
    assert_eq!(cfg.effective_boot_mode(), BootMode::Operational);
}

#[test]
fn unreachable_network_requests_reprovision_after_watchdog() {
    let state = make_system();
    state.wifi.lock().unwrap().sim_set_connectable(false);

    let action = parse_post("act=wifi&ssid=RedAjena&pass=password1").unwrap();
    apply_action(&action, &state).unwrap();

    let mut wifi = state.wifi.lock().unwrap();
    assert_eq!(wifi.poll(1_000), None);
    let late = wifi.poll(CONNECT_TIMEOUT_MS + 1_000);
    assert_eq!(late, Some(SupervisorAction::Reprovision));
    drop(wifi);

    // The supervisor loop's response: flip the boot mode, then restart.
    state
        .nvs
        .lock()
        .unwrap()
        .save_boot_mode(BootMode::Provisioning)
        .unwrap();
    let cfg = state.nvs.lock().unwrap().load().unwrap();
    assert_eq!(cfg.boot_mode, BootMode::Provisioning);
}

#[test]
fn invalid_credentials_are_rejected_without_persisting_driver_state() {
    let state = make_system();

    // Password too short for WPA2.
    let action = PortalAction::Wifi {
        ssid: "Casa".to_owned(),
        pass: "corta".to_owned(),
    };
    assert!(apply_action(&action, &state).is_err());
    assert_eq!(state.wifi.lock().unwrap().state(), WifiState::Idle);
}

// ── act=mqtt ──────────────────────────────────────────────────

#[test]
fn mqtt_form_overwrites_fields_and_restarts_channel() {
    let state = make_system();

    let action = parse_post(
        "act=mqtt&broker=mqtt%3A%2F%2F10.0.0.2%3A1883&t1=porton%2Fcmd&t2=porton%2Festado&t3=porton%2Ftele",
    )
    .unwrap();
    apply_action(&action, &state).unwrap();

    let cfg = state.nvs.lock().unwrap().load().unwrap();
    assert_eq!(cfg.broker_uri.as_str(), "mqtt://10.0.0.2:1883");
    assert_eq!(cfg.topic_cmd.as_str(), "porton/cmd");

    let broker = state.broker.lock().unwrap();
    assert!(broker.is_started());
    let sim = broker.sim().unwrap();
    assert_eq!(sim.subscriptions, vec!["porton/cmd".to_owned()]);
}

#[test]
fn mqtt_form_with_empty_fields_keeps_existing_values() {
    let state = make_system();
    {
        let mut nvs = state.nvs.lock().unwrap();
        nvs.save_broker_uri("mqtt://viejo:1883").unwrap();
        nvs.save_topic_cmd("porton/cmd").unwrap();
    }

    // Only the status topic is submitted; the rest stay untouched.
    let action = parse_post("act=mqtt&broker=&t1=&t2=porton%2Festado&t3=").unwrap();
    apply_action(&action, &state).unwrap();

    let cfg = state.nvs.lock().unwrap().load().unwrap();
    assert_eq!(cfg.broker_uri.as_str(), "mqtt://viejo:1883");
    assert_eq!(cfg.topic_cmd.as_str(), "porton/cmd");
    assert_eq!(cfg.topic_status.as_str(), "porton/estado");
}

#[test]
fn mqtt_form_without_broker_uri_leaves_channel_dormant() {
    let state = make_system();
    let action = parse_post("act=mqtt&t1=porton%2Fcmd").unwrap();
    apply_action(&action, &state).unwrap();
    assert!(!state.broker.lock().unwrap().is_started());
}

// ── wipe ──────────────────────────────────────────────────────

#[test]
fn wipe_erases_configuration_and_falls_back_to_provisioning() {
    let state = make_system();
    {
        let mut nvs = state.nvs.lock().unwrap();
        nvs.save_wifi("CasaPortal", "secreto123").unwrap();
        nvs.save_broker_uri("mqtt://10.0.0.2:1883").unwrap();
        nvs.save_boot_mode(BootMode::Operational).unwrap();
    }

    apply_wipe(&state).unwrap();

    let cfg = state.nvs.lock().unwrap().load().unwrap();
    assert!(cfg.wifi_ssid.is_empty());
    assert!(cfg.wifi_pass.is_empty());
    assert!(cfg.broker_uri.is_empty());
    assert_eq!(cfg.effective_boot_mode(), BootMode::Provisioning);
}

// ── Page rendering ────────────────────────────────────────────

#[test]
fn portal_page_shows_state_and_forms() {
    let state = make_system();
    state.nvs.lock().unwrap().save_wifi("CasaPortal", "x".repeat(8).as_str()).unwrap();

    let html = render_page(&state);
    assert!(html.contains("INICIAL"));
    assert!(html.contains("act\" value=\"wifi\""));
    assert!(html.contains("act\" value=\"mqtt\""));
    assert!(html.contains("wipe"));
    assert!(html.contains("CasaPortal"));
}

#[test]
fn wipe_page_confirms() {
    let html = render_wipe_page();
    assert!(html.contains("borrada"));
}

//! Broker channel — wraps the MQTT client.
//!
//! Started only when a broker URI is configured; the rest of the system
//! (FSM included) runs fine without it.  The event callback's only duties
//! are decoding inbound commands into the queue and publishing the
//! synthetic just-connected status — it never calls into the FSM.
//!
//! `restart()` drops the current client instance and re-creates it from
//! the configuration, which the portal invokes on every broker form
//! submission (deliberate force-reconnect ergonomics).
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::mqtt::client::EspMqttClient`
//!   with a dedicated event thread.
//! - **all other targets**: a recording simulation backend for host tests.

use std::sync::Arc;

use log::{info, warn};

use crate::app::commands::{self, CommandQueue};
use crate::app::events::{GateEvent, StatusCell, StatusFrame};
use crate::app::ports::EventSink;
use crate::config::GateConfig;
use crate::error::Result;

#[cfg(target_os = "espidf")]
use std::sync::Mutex;

/// Broker keep-alive interval.
pub const KEEPALIVE_SECS: u64 = 30;

pub struct BrokerChannel {
    topic_cmd: String,
    topic_status: String,
    topic_tele: String,
    queue: Arc<CommandQueue>,
    status: Arc<StatusCell>,
    #[cfg(target_os = "espidf")]
    client: Option<Arc<Mutex<esp_idf_svc::mqtt::client::EspMqttClient<'static>>>>,
    #[cfg(not(target_os = "espidf"))]
    sim: Option<SimBroker>,
}

/// Recording backend for host tests.
#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
pub struct SimBroker {
    pub subscriptions: Vec<String>,
    /// `(topic, payload, retain)` in publish order.
    pub published: Vec<(String, String, bool)>,
}

impl BrokerChannel {
    pub fn new(queue: Arc<CommandQueue>, status: Arc<StatusCell>) -> Self {
        Self {
            topic_cmd: String::new(),
            topic_status: String::new(),
            topic_tele: String::new(),
            queue,
            status,
            #[cfg(target_os = "espidf")]
            client: None,
            #[cfg(not(target_os = "espidf"))]
            sim: None,
        }
    }

    /// Bring the channel up from the current configuration.  A missing
    /// broker URI leaves it dormant.
    pub fn start(&mut self, config: &GateConfig) -> Result<()> {
        self.stop();

        self.topic_cmd = config.topic_cmd.as_str().to_owned();
        self.topic_status = config.topic_status.as_str().to_owned();
        self.topic_tele = config.topic_tele.as_str().to_owned();

        if !config.broker_configured() {
            info!("MQTT: no broker configured, channel dormant");
            return Ok(());
        }

        self.platform_start(config.broker_uri.as_str())
    }

    /// Drop the client instance (closes the session).
    pub fn stop(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            if self.client.take().is_some() {
                info!("MQTT: client stopped");
            }
        }
        #[cfg(not(target_os = "espidf"))]
        {
            if self.sim.take().is_some() {
                info!("MQTT(sim): client stopped");
            }
        }
    }

    /// Tear the client down and re-create it from `config`.
    pub fn restart(&mut self, config: &GateConfig) -> Result<()> {
        info!("MQTT: restarting channel");
        self.start(config)
    }

    pub fn is_started(&self) -> bool {
        #[cfg(target_os = "espidf")]
        {
            self.client.is_some()
        }
        #[cfg(not(target_os = "espidf"))]
        {
            self.sim.is_some()
        }
    }

    // ── Outbound ──────────────────────────────────────────────

    /// Publish a state-change frame to the status topic (QoS 1, retain).
    pub fn publish_status(&mut self, frame: &StatusFrame) {
        self.publish_frame_to(TopicKind::Status, frame);
    }

    /// Publish a periodic frame to the telemetry topic (QoS 1, retain).
    pub fn publish_telemetry(&mut self, frame: &StatusFrame) {
        self.publish_frame_to(TopicKind::Tele, frame);
    }

    fn publish_frame_to(&mut self, kind: TopicKind, frame: &StatusFrame) {
        let topic = match kind {
            TopicKind::Status => self.topic_status.clone(),
            TopicKind::Tele => self.topic_tele.clone(),
        };
        if !self.is_started() || topic.is_empty() {
            return;
        }
        match serde_json::to_vec(frame) {
            Ok(payload) => self.platform_publish(&topic, &payload, true),
            Err(e) => warn!("MQTT: frame serialization failed ({e})"),
        }
    }

    // ── Platform-specific (ESP-IDF) ───────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self, uri: &str) -> Result<()> {
        use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS};

        let conf = MqttClientConfiguration {
            keep_alive_interval: Some(std::time::Duration::from_secs(KEEPALIVE_SECS)),
            ..Default::default()
        };

        let (client, mut connection) = EspMqttClient::new(uri, &conf)
            .map_err(|_| crate::error::NetError::BrokerStartFailed)?;
        let client = Arc::new(Mutex::new(client));

        // Event thread: decode + enqueue, subscribe and announce on
        // connect. Exits when the client is dropped by stop()/restart().
        let worker = Arc::clone(&client);
        let queue = Arc::clone(&self.queue);
        let status = Arc::clone(&self.status);
        let topic_cmd = self.topic_cmd.clone();
        let topic_status = self.topic_status.clone();
        std::thread::Builder::new()
            .name("mqtt_events".into())
            .stack_size(6 * 1024)
            .spawn(move || {
                while let Ok(event) = connection.next() {
                    match event.payload() {
                        EventPayload::Connected(_) => {
                            info!("MQTT: connected");
                            let Ok(mut c) = worker.lock() else { break };
                            if !topic_cmd.is_empty() {
                                if let Err(e) = c.subscribe(&topic_cmd, QoS::AtLeastOnce) {
                                    warn!("MQTT: subscribe '{topic_cmd}' failed ({e})");
                                }
                            }
                            if !topic_status.is_empty() {
                                // Synthetic just-connected status, no error field.
                                let frame = status.frame(false);
                                if let Ok(json) = serde_json::to_vec(&frame) {
                                    if let Err(e) =
                                        c.enqueue(&topic_status, QoS::AtLeastOnce, true, &json)
                                    {
                                        warn!("MQTT: connect status publish failed ({e})");
                                    }
                                }
                            }
                        }
                        EventPayload::Received { data, .. } => {
                            if let Some(cmd) = commands::decode(data) {
                                if !queue.push(cmd) {
                                    warn!("MQTT: command queue full, dropped {:?}", cmd);
                                }
                            }
                        }
                        EventPayload::Disconnected => {
                            info!("MQTT: disconnected (client auto-reconnects)");
                        }
                        _ => {}
                    }
                }
                info!("MQTT: event loop closed");
            })
            .map_err(|_| crate::error::NetError::BrokerStartFailed)?;

        self.client = Some(client);
        info!("MQTT: client started for '{uri}'");
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_publish(&mut self, topic: &str, payload: &[u8], retain: bool) {
        use esp_idf_svc::mqtt::client::QoS;
        if let Some(client) = &self.client {
            if let Ok(mut c) = client.lock() {
                // Non-blocking enqueue: the FSM task must never stall on a
                // slow broker link.
                if let Err(e) = c.enqueue(topic, QoS::AtLeastOnce, retain, payload) {
                    warn!("MQTT: publish to '{topic}' failed ({e})");
                }
            }
        }
    }

    // ── Platform-specific (simulation) ────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self, uri: &str) -> Result<()> {
        let mut sim = SimBroker::default();

        // Immediate connect: subscribe and announce, mirroring the real
        // callback's duties.
        if !self.topic_cmd.is_empty() {
            sim.subscriptions.push(self.topic_cmd.clone());
        }
        if !self.topic_status.is_empty() {
            let frame = self.status.frame(false);
            if let Ok(json) = serde_json::to_string(&frame) {
                sim.published.push((self.topic_status.clone(), json, true));
            }
        }

        self.sim = Some(sim);
        info!("MQTT(sim): client started for '{uri}'");
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_publish(&mut self, topic: &str, payload: &[u8], retain: bool) {
        if let Some(sim) = &mut self.sim {
            sim.published.push((
                topic.to_owned(),
                String::from_utf8_lossy(payload).into_owned(),
                retain,
            ));
        }
    }

    /// Simulation: deliver an inbound payload as if received on the
    /// command topic.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_receive(&self, payload: &[u8]) {
        if let Some(cmd) = commands::decode(payload) {
            if !self.queue.push(cmd) {
                warn!("MQTT(sim): command queue full, dropped {:?}", cmd);
            }
        }
    }

    /// Simulation: inspect the recording backend.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim(&self) -> Option<&SimBroker> {
        self.sim.as_ref()
    }
}

#[derive(Clone, Copy)]
enum TopicKind {
    Status,
    Tele,
}

// ───────────────────────────────────────────────────────────────
// EventSink bridge
// ───────────────────────────────────────────────────────────────

/// Sink handed to the FSM task; locks the shared channel per emission.
pub struct BrokerSink {
    channel: Arc<std::sync::Mutex<BrokerChannel>>,
}

impl BrokerSink {
    pub fn new(channel: Arc<std::sync::Mutex<BrokerChannel>>) -> Self {
        Self { channel }
    }
}

impl EventSink for BrokerSink {
    fn emit(&mut self, event: &GateEvent) {
        let Ok(mut channel) = self.channel.lock() else {
            return;
        };
        match event {
            GateEvent::StatusChanged(frame) => channel.publish_status(frame),
            GateEvent::Telemetry(frame) => channel.publish_telemetry(frame),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

//! In-process server and WebSocket client for the API tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use hass_ai_alerts::AlertMonitor;
use hass_ai_api::{create_router, AppState};
use hass_ai_config::{AlertSettings, ConfigEntry, ScanSettings};
use hass_ai_core::{EntityId, EntitySnapshot, Language};
use hass_ai_hub::{Hub, ServiceConversationAgent};
use hass_ai_intelligence::Scanner;
use hass_ai_storage::Storage;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub const TOKEN: &str = "panel-token";
const RECV_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Options {
    pub configured: bool,
    pub alerts: bool,
    pub api_token: Option<&'static str>,
    /// Delay of every agent reply
    pub agent_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            configured: true,
            alerts: true,
            api_token: None,
            agent_delay: Duration::ZERO,
        }
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub hub: Hub,
    pub storage: Arc<Storage>,
    _dir: TempDir,
}

fn snapshot(id: &str, state: &str, attributes: &[(&str, &str)]) -> EntitySnapshot {
    let attributes: HashMap<String, Value> = attributes
        .iter()
        .map(|(k, v)| (k.to_string(), Value::from(*v)))
        .collect();
    EntitySnapshot::new(id.parse().unwrap(), state, attributes)
}

/// Entity ids listed in a rendered prompt
fn prompt_entities(prompt: &str) -> Vec<String> {
    prompt
        .lines()
        .filter_map(|line| {
            let (id, rest) = line.split_once(' ')?;
            (rest.starts_with('(') && id.parse::<EntityId>().is_ok()).then(|| id.to_string())
        })
        .collect()
}

/// Rates everything 3; batteries are also flagged for alerts
fn reply_for(prompt: &str) -> String {
    let items: Vec<Value> = prompt_entities(prompt)
        .into_iter()
        .map(|id| {
            let category = if id.contains("battery") {
                json!(["DATA", "ALERTS"])
            } else {
                json!(["DATA"])
            };
            json!({"entity_id": id, "rating": 3, "reason": "scored by stub", "category": category})
        })
        .collect();
    Value::Array(items).to_string()
}

pub async fn start(options: Options) -> TestServer {
    let dir = TempDir::new().unwrap();
    let hub = Hub::new();

    hub.states.set(snapshot("light.kitchen", "on", &[("friendly_name", "Kitchen")]));
    hub.states.set(snapshot("lock.front_door", "locked", &[]));
    hub.states.set(snapshot(
        "sensor.phone_battery",
        "12",
        &[("device_class", "battery"), ("unit_of_measurement", "%")],
    ));
    hub.states.set(snapshot(
        "sensor.living_temperature",
        "21",
        &[("device_class", "temperature"), ("unit_of_measurement", "°C")],
    ));

    let delay = options.agent_delay;
    hub.services.register("conversation", "process", move |call| async move {
        tokio::time::sleep(delay).await;
        let speech = reply_for(call.data["text"].as_str().unwrap_or_default());
        Ok(Some(json!({"response": {"speech": {"plain": {"speech": speech}}}})))
    });
    hub.services.register("notify", "notify", |_| async { Ok(None) });

    let storage = Arc::new(Storage::new(dir.path()));
    let settings = ScanSettings {
        pacing_min_ms: 0,
        pacing_max_ms: 0,
        log_dir: dir.path().join("logs"),
        ..ScanSettings::default()
    };
    let entry = options.configured.then(ConfigEntry::default);
    let scanner = Scanner::new(
        hub.states.clone(),
        Arc::new(ServiceConversationAgent::new(hub.services.clone())),
        storage.clone(),
        entry.as_ref(),
        settings,
    )
    .unwrap();

    let alerts = options.alerts.then(|| {
        Arc::new(
            AlertMonitor::new(
                hub.states.clone(),
                hub.services.clone(),
                hub.bus.clone(),
                storage.clone(),
                AlertSettings::default(),
                Language::En,
            )
            .unwrap(),
        )
    });

    let state = AppState::new(Arc::new(scanner), alerts)
        .with_api_token(options.api_token.map(str::to_string));
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

    TestServer {
        addr,
        hub,
        storage,
        _dir: dir,
    }
}

pub struct Client {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
}

impl Client {
    /// Connect and complete the handshake, returning the auth reply type
    pub async fn handshake(addr: SocketAddr, token: Option<&str>) -> (Self, String) {
        let (ws, _) = connect_async(format!("ws://{addr}/api/websocket")).await.unwrap();
        let mut client = Self { ws, next_id: 0 };

        let required = client.recv().await;
        assert_eq!(required["type"], "auth_required");

        let auth = match token {
            Some(token) => json!({"type": "auth", "access_token": token}),
            None => json!({"type": "auth"}),
        };
        client.send(auth).await;
        let reply = client.recv().await;
        (client, reply["type"].as_str().unwrap_or_default().to_string())
    }

    pub async fn connect(addr: SocketAddr) -> Self {
        let (client, reply) = Self::handshake(addr, Some(TOKEN)).await;
        assert_eq!(reply, "auth_ok");
        client
    }

    pub async fn send(&mut self, value: Value) {
        self.ws.send(Message::Text(value.to_string())).await.unwrap();
    }

    pub async fn recv(&mut self) -> Value {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for a message")
                .expect("connection closed")
                .unwrap();
            if let Message::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    /// Send `msg` with the next id and return its result message
    pub async fn command(&mut self, mut msg: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id;
        msg["id"] = json!(id);
        self.send(msg).await;
        loop {
            let reply = self.recv().await;
            if reply["id"] == id && reply["type"] != "event" {
                return reply;
            }
        }
    }

    /// Collect event payloads for `id` up to and including `scan_complete`
    pub async fn scan_events(&mut self, id: u64) -> Vec<Value> {
        let mut events = Vec::new();
        loop {
            let msg = self.recv().await;
            if msg["type"] != "event" || msg["id"] != id {
                continue;
            }
            let event = msg["event"].clone();
            let done = event["type"] == "scan_complete";
            events.push(event);
            if done {
                return events;
            }
        }
    }

    pub fn last_id(&self) -> u64 {
        self.next_id
    }
}

/// Poll `command` until `check` accepts its result
pub async fn eventually<F>(client: &mut Client, command: Value, check: F) -> Value
where
    F: Fn(&Value) -> bool,
{
    for _ in 0..50 {
        let reply = client.command(command.clone()).await;
        if check(&reply) {
            return reply;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition never held for {command}");
}

mod common;

use std::time::Duration;

use common::{eventually, start, Client, Options, TOKEN};
use hass_ai_storage::AiResultsData;
use serde_json::json;

#[tokio::test]
async fn test_auth_handshake() {
    let server = start(Options {
        api_token: Some(TOKEN),
        ..Options::default()
    })
    .await;

    let (_, reply) = Client::handshake(server.addr, Some("wrong")).await;
    assert_eq!(reply, "auth_invalid");
    let (_, reply) = Client::handshake(server.addr, None).await;
    assert_eq!(reply, "auth_invalid");
    let (_, reply) = Client::handshake(server.addr, Some(TOKEN)).await;
    assert_eq!(reply, "auth_ok");
}

#[tokio::test]
async fn test_ping_unknown_command_and_id_reuse() {
    let server = start(Options::default()).await;
    let mut client = Client::connect(server.addr).await;

    let pong = client.command(json!({"type": "ping"})).await;
    assert_eq!(pong["type"], "pong");

    let unknown = client.command(json!({"type": "hass_ai/make_coffee"})).await;
    assert_eq!(unknown["success"], false);
    assert_eq!(unknown["error"]["code"], "unknown_command");

    let malformed = client
        .command(json!({"type": "hass_ai/get_entity_importance"}))
        .await;
    assert_eq!(malformed["error"]["code"], "invalid_format");

    client.send(json!({"id": 1, "type": "ping"})).await;
    let reused = client.recv().await;
    assert_eq!(reused["id"], 1);
    assert_eq!(reused["error"]["code"], "id_reuse");
}

#[tokio::test]
async fn test_scan_streams_events_and_persists() {
    let server = start(Options::default()).await;
    let mut client = Client::connect(server.addr).await;

    let ack = client
        .command(json!({"type": "hass_ai/scan_entities", "batch_size": 3}))
        .await;
    assert_eq!(ack["success"], true);
    assert!(ack["result"]["operation_id"].as_str().is_some_and(|id| !id.is_empty()));

    let events = client.scan_events(client.last_id()).await;
    let results: Vec<_> = events.iter().filter(|e| e["type"] == "entity_result").collect();
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|e| e["result"]["analysis_method"] == "ai"));
    assert!(events.iter().any(|e| e["type"] == "scan_progress"
        && e["data"]["message"].as_str().is_some_and(|m| m.starts_with("📤"))));
    let complete = events.last().unwrap();
    assert_eq!(complete["data"]["status"], "completed");
    assert_eq!(complete["data"]["ai_results"], 4);

    let loaded = eventually(&mut client, json!({"type": "hass_ai/load_ai_results"}), |r| {
        r["result"]["total_entities"] == 4
    })
    .await;
    assert_eq!(loaded["result"]["results"]["light.kitchen"]["overall_weight"], 3);

    // the battery was flagged for alerts and is now monitored
    let status = eventually(&mut client, json!({"type": "hass_ai/get_alert_status"}), |r| {
        r["result"]["total_monitored"] == 1
    })
    .await;
    assert!(status["result"]["all_alert_entities"]["sensor.phone_battery"].is_object());
}

#[tokio::test]
async fn test_scan_rejects_bad_batch_size() {
    let server = start(Options::default()).await;
    let mut client = Client::connect(server.addr).await;

    for size in [0, 51] {
        let reply = client
            .command(json!({"type": "hass_ai/scan_entities", "batch_size": size}))
            .await;
        assert_eq!(reply["success"], false);
        assert_eq!(reply["error"]["code"], "invalid_format");
    }
}

#[tokio::test]
async fn test_unconfigured_scan_falls_back() {
    let server = start(Options {
        configured: false,
        ..Options::default()
    })
    .await;
    let mut client = Client::connect(server.addr).await;

    client
        .command(json!({"type": "hass_ai/scan_entities", "entity_filter": "sensor."}))
        .await;
    let events = client.scan_events(client.last_id()).await;
    assert!(events.iter().any(|e| e["type"] == "diagnostic"));
    let results: Vec<_> = events.iter().filter(|e| e["type"] == "entity_result").collect();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|e| e["result"]["analysis_method"] == "fallback"));
    assert_eq!(events.last().unwrap()["data"]["status"], "not_configured");

    let reply = client
        .command(json!({"type": "hass_ai/find_correlations", "entity_id": "light.kitchen"}))
        .await;
    assert_eq!(reply["error"]["code"], "not_configured");
}

#[tokio::test]
async fn test_stop_operation_cancels_running_scan() {
    let server = start(Options {
        agent_delay: Duration::from_millis(300),
        ..Options::default()
    })
    .await;
    let mut client = Client::connect(server.addr).await;

    let ack = client
        .command(json!({"type": "hass_ai/scan_entities", "batch_size": 1}))
        .await;
    let scan_id = client.last_id();
    let operation_id = ack["result"]["operation_id"].as_str().unwrap().to_string();

    let stopped = client
        .command(json!({"type": "hass_ai/stop_operation", "operation_id": operation_id}))
        .await;
    assert_eq!(stopped["result"]["stopped"], 1);

    let events = client.scan_events(scan_id).await;
    assert_eq!(events.last().unwrap()["data"]["status"], "cancelled");

    let again = client
        .command(json!({"type": "hass_ai/stop_operation", "operation_id": operation_id}))
        .await;
    assert_eq!(again["result"]["stopped"], 0);

    // a cancelled scan leaves nothing behind
    let stored: AiResultsData = server.storage.load().await.unwrap();
    assert!(stored.results.is_empty());
}

#[tokio::test]
async fn test_overrides_lifecycle() {
    let server = start(Options::default()).await;
    let mut client = Client::connect(server.addr).await;

    let overrides = json!({"light.kitchen": {"overall_weight": 5, "enabled": true}});
    let saved = client
        .command(json!({"type": "hass_ai/save_overrides", "overrides": overrides}))
        .await;
    assert_eq!(saved["success"], true);

    let loaded = client.command(json!({"type": "hass_ai/load_overrides"})).await;
    assert_eq!(loaded["result"], overrides);

    let too_heavy = client
        .command(json!({"type": "hass_ai/save_overrides", "overrides": {"light.kitchen": {"overall_weight": 9}}}))
        .await;
    assert_eq!(too_heavy["error"]["code"], "invalid_format");

    let unconfirmed = client.command(json!({"type": "hass_ai/reset_overrides"})).await;
    assert_eq!(unconfirmed["success"], false);
    assert_eq!(
        client.command(json!({"type": "hass_ai/load_overrides"})).await["result"],
        overrides
    );

    let reset = client
        .command(json!({"type": "hass_ai/reset_overrides", "confirm": true}))
        .await;
    assert_eq!(reset["success"], true);
    assert_eq!(
        client.command(json!({"type": "hass_ai/load_overrides"})).await["result"],
        json!({})
    );
}

#[tokio::test]
async fn test_save_ai_results_from_panel() {
    let server = start(Options::default()).await;
    let mut client = Client::connect(server.addr).await;

    let results = json!({
        "light.kitchen": {
            "entity_id": "light.kitchen",
            "overall_weight": 4,
            "overall_reason": "used every evening",
            "category": ["CONTROL"],
            "management_type": "USER",
            "analysis_method": "ai",
            "batch_number": 1
        }
    });
    let saved = client
        .command(json!({"type": "hass_ai/save_ai_results", "results": results, "timestamp": "2026-01-01T00:00:00Z"}))
        .await;
    assert_eq!(saved["success"], true, "{saved}");

    let loaded = client.command(json!({"type": "hass_ai/load_ai_results"})).await;
    assert_eq!(loaded["result"]["last_scan_timestamp"], "2026-01-01T00:00:00Z");
    assert_eq!(loaded["result"]["total_entities"], 1);
}

#[tokio::test]
async fn test_entity_importance() {
    let server = start(Options::default()).await;
    let mut client = Client::connect(server.addr).await;

    let scored = client
        .command(json!({"type": "hass_ai/get_entity_importance", "entity_id": "lock.front_door"}))
        .await;
    assert_eq!(scored["result"]["entity_id"], "lock.front_door");

    let missing = client
        .command(json!({"type": "hass_ai/get_entity_importance", "entity_id": "light.nowhere"}))
        .await;
    assert_eq!(missing["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_alert_commands() {
    let server = start(Options::default()).await;
    let mut client = Client::connect(server.addr).await;

    let bad = client
        .command(json!({"type": "hass_ai/configure_alert", "entity_id": "sensor.living_temperature",
            "thresholds": {"warning": "hot"}}))
        .await;
    assert_eq!(bad["error"]["code"], "invalid_format");

    let not_alertable = client
        .command(json!({"type": "hass_ai/configure_alert", "entity_id": "lock.front_door",
            "thresholds": {"warning": true}}))
        .await;
    assert_eq!(not_alertable["error"]["code"], "invalid_format");

    let ok = client
        .command(json!({"type": "hass_ai/configure_alert", "entity_id": "sensor.living_temperature",
            "thresholds": {"WARNING": ">20", "critical": ">35"}, "weight": 4}))
        .await;
    assert_eq!(ok["success"], true, "{ok}");

    let settings = client
        .command(json!({"type": "hass_ai/update_alert_settings", "use_input_text": true}))
        .await;
    assert_eq!(settings["success"], true);

    let report = client.command(json!({"type": "hass_ai/get_alert_report"})).await;
    let entry = &report["result"]["monitored_entities"]["sensor.living_temperature"];
    assert_eq!(entry["weight"], 4);
    assert_eq!(entry["current_alert_level"], "WARNING");

    let status = client.command(json!({"type": "hass_ai/get_alert_status"})).await;
    assert_eq!(status["result"]["use_input_text"], true);
}

#[tokio::test]
async fn test_alert_commands_when_disabled() {
    let server = start(Options {
        alerts: false,
        ..Options::default()
    })
    .await;
    let mut client = Client::connect(server.addr).await;

    for kind in ["hass_ai/get_alert_status", "hass_ai/get_alert_report"] {
        let reply = client.command(json!({"type": kind})).await;
        assert_eq!(reply["error"]["code"], "alerts_disabled");
    }
}

#[tokio::test]
async fn test_ai_logs_after_scan() {
    let server = start(Options::default()).await;
    let mut client = Client::connect(server.addr).await;

    client
        .command(json!({"type": "hass_ai/scan_entities", "entity_filter": "light."}))
        .await;
    client.scan_events(client.last_id()).await;

    let logs = client
        .command(json!({"type": "hass_ai/get_ai_logs", "limit": 10}))
        .await;
    let entries = logs["result"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["type"], "prompt");
    assert_eq!(entries[1]["type"], "response");
}

//! Ingestion pipeline and engine handoff tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};

use promux_core::protocol::update::MetricUpdate;
use promux_daemon::engine::{Control, Engine};
use promux_daemon::ingest::{decoder, listener};
use promux_daemon::obs::Telemetry;
use promux_daemon::registry::MetricRegistry;

fn telemetry() -> (Telemetry, prometheus::Registry) {
    let exposition = prometheus::Registry::new();
    let telemetry = Telemetry::register(&exposition).unwrap();
    (telemetry, exposition)
}

fn status_count(exposition: &prometheus::Registry, status: &str) -> f64 {
    let families = exposition.gather();
    let family = families
        .iter()
        .find(|f| f.get_name() == "promux_updates_total");
    let Some(family) = family else { return 0.0 };
    family
        .get_metric()
        .iter()
        .find(|m| m.get_label().iter().any(|l| l.get_value() == status))
        .map(|m| m.get_counter().get_value())
        .unwrap_or(0.0)
}

async fn wait_until<F: Fn() -> bool>(cond: F) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn decoder_fans_out_batch_in_order() {
    let (payload_tx, payload_rx) = mpsc::channel(1);
    let (update_tx, mut update_rx) = mpsc::channel(1);
    let (telemetry, _exposition) = telemetry();

    let queue: decoder::PayloadQueue = Arc::new(Mutex::new(payload_rx));
    tokio::spawn(decoder::run(queue, update_tx, telemetry));

    let batch = br#"[
        {"name": "req_total", "method": "inc"},
        {"name": "worker_rss_bytes", "label_values": ["worker1"], "method": "set", "value": 39.0}
    ]"#;
    payload_tx.send(Bytes::from_static(batch)).await.unwrap();

    let first = update_rx.recv().await.unwrap();
    assert_eq!(first.name, "req_total");
    assert_eq!(first.method, "inc");
    assert!(first.label_values.is_empty());
    assert_eq!(first.value, 0.0);

    let second = update_rx.recv().await.unwrap();
    assert_eq!(second.name, "worker_rss_bytes");
    assert_eq!(second.label_values, vec!["worker1"]);
    assert_eq!(second.value, 39.0);
}

#[tokio::test]
async fn undecodable_payload_is_dropped_whole() {
    let (payload_tx, payload_rx) = mpsc::channel(1);
    let (update_tx, mut update_rx) = mpsc::channel(1);
    let (telemetry, exposition) = telemetry();

    let queue: decoder::PayloadQueue = Arc::new(Mutex::new(payload_rx));
    tokio::spawn(decoder::run(queue, update_tx, telemetry));

    payload_tx
        .send(Bytes::from_static(b"[{\"name\": \"req_total\""))
        .await
        .unwrap();
    payload_tx
        .send(Bytes::from_static(b"[{\"name\": \"req_total\", \"method\": \"inc\"}]"))
        .await
        .unwrap();

    // only the valid batch produces an event
    let update = update_rx.recv().await.unwrap();
    assert_eq!(update.name, "req_total");
    assert_eq!(status_count(&exposition, "error"), 1.0);
}

#[tokio::test]
async fn listener_reads_connection_to_eof() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("promux.sock");
    let socket = tokio::net::UnixListener::bind(&path).unwrap();

    let (payload_tx, mut payload_rx) = mpsc::channel(1);
    let (telemetry, _exposition) = telemetry();
    tokio::spawn(listener::run(
        socket,
        payload_tx,
        Some(Duration::from_secs(5)),
        telemetry,
    ));

    let mut stream = tokio::net::UnixStream::connect(&path).await.unwrap();
    stream.write_all(b"[1, 2, 3]").await.unwrap();
    stream.shutdown().await.unwrap();
    drop(stream);

    let payload = payload_rx.recv().await.unwrap();
    assert_eq!(&payload[..], b"[1, 2, 3]");
}

#[tokio::test]
async fn stalled_sender_is_timed_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("promux.sock");
    let socket = tokio::net::UnixListener::bind(&path).unwrap();

    let (payload_tx, mut payload_rx) = mpsc::channel(1);
    let (telemetry, exposition) = telemetry();
    tokio::spawn(listener::run(
        socket,
        payload_tx,
        Some(Duration::from_millis(50)),
        telemetry,
    ));

    // connect, send half a payload, never close
    let mut stalled = tokio::net::UnixStream::connect(&path).await.unwrap();
    stalled.write_all(b"[{\"name\":").await.unwrap();

    wait_until(|| status_count(&exposition, "error") >= 1.0).await;

    // the loop keeps serving after the fault
    let mut stream = tokio::net::UnixStream::connect(&path).await.unwrap();
    stream.write_all(b"[]").await.unwrap();
    stream.shutdown().await.unwrap();
    drop(stream);
    let payload = payload_rx.recv().await.unwrap();
    assert_eq!(&payload[..], b"[]");
}

#[tokio::test]
async fn engine_applies_updates_and_stops_on_control() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(br#"[{"type": "counter", "name": "req_total", "help": "x"}]"#)
        .unwrap();
    file.flush().unwrap();

    let exposition = prometheus::Registry::new();
    let telemetry = Telemetry::register(&exposition).unwrap();
    let registry = Arc::new(MetricRegistry::new(exposition.clone()));

    let (update_tx, update_rx) = mpsc::channel(1);
    let (control_tx, control_rx) = mpsc::channel(1);
    let engine = Engine::new(
        Arc::clone(&registry),
        telemetry,
        file.path().to_string_lossy().into_owned(),
        update_rx,
        control_rx,
    );
    let task = tokio::spawn(engine.run());

    let inc: MetricUpdate =
        serde_json::from_str(r#"{"name": "req_total", "method": "inc"}"#).unwrap();
    update_tx.send(inc.clone()).await.unwrap();
    update_tx.send(inc).await.unwrap();

    wait_until(|| status_count(&exposition, "ok") == 2.0).await;

    control_tx.send(Control::Shutdown).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(registry.names(), vec!["req_total"]);
}

#[tokio::test]
async fn engine_reload_applies_new_definitions() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(br#"[{"type": "counter", "name": "old_total", "help": "x"}]"#)
        .unwrap();
    file.flush().unwrap();

    let exposition = prometheus::Registry::new();
    let telemetry = Telemetry::register(&exposition).unwrap();
    let registry = Arc::new(MetricRegistry::new(exposition.clone()));

    let (_update_tx, update_rx) = mpsc::channel::<MetricUpdate>(1);
    let (control_tx, control_rx) = mpsc::channel(1);
    let engine = Engine::new(
        Arc::clone(&registry),
        telemetry,
        file.path().to_string_lossy().into_owned(),
        update_rx,
        control_rx,
    );
    let task = tokio::spawn(engine.run());

    {
        let registry = Arc::clone(&registry);
        wait_until(move || registry.names() == vec!["old_total"]).await;
    }

    std::fs::write(
        file.path(),
        br#"[{"type": "gauge", "name": "new_size", "help": "x"}]"#,
    )
    .unwrap();
    control_tx.send(Control::Reload).await.unwrap();

    {
        let registry = Arc::clone(&registry);
        wait_until(move || registry.names() == vec!["new_size"]).await;
    }

    control_tx.send(Control::Shutdown).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn socket_to_registry_end_to_end() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        br#"[
            {"type": "counter", "name": "req_total", "help": "x"},
            {"type": "gauge", "name": "worker_rss_bytes", "help": "x", "labels": ["worker"]}
        ]"#,
    )
    .unwrap();
    file.flush().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("promux.sock");
    let socket = tokio::net::UnixListener::bind(&path).unwrap();

    let exposition = prometheus::Registry::new();
    let telemetry = Telemetry::register(&exposition).unwrap();
    let registry = Arc::new(MetricRegistry::new(exposition.clone()));

    let (payload_tx, payload_rx) = mpsc::channel(1);
    let (update_tx, update_rx) = mpsc::channel(1);
    let (control_tx, control_rx) = mpsc::channel(1);

    tokio::spawn(listener::run(
        socket,
        payload_tx,
        Some(Duration::from_secs(5)),
        telemetry.clone(),
    ));
    let queue: decoder::PayloadQueue = Arc::new(Mutex::new(payload_rx));
    for _ in 0..2 {
        tokio::spawn(decoder::run(
            Arc::clone(&queue),
            update_tx.clone(),
            telemetry.clone(),
        ));
    }
    drop(update_tx);

    let engine = Engine::new(
        Arc::clone(&registry),
        telemetry,
        file.path().to_string_lossy().into_owned(),
        update_rx,
        control_rx,
    );
    let task = tokio::spawn(engine.run());

    let mut stream = tokio::net::UnixStream::connect(&path).await.unwrap();
    stream
        .write_all(
            br#"[
                {"name": "req_total", "method": "inc"},
                {"name": "req_total", "method": "add", "value": 2},
                {"name": "worker_rss_bytes", "label_values": ["w1"], "method": "set", "value": 512},
                {"name": "unknown_total", "method": "inc"}
            ]"#,
        )
        .await
        .unwrap();
    stream.shutdown().await.unwrap();
    drop(stream);

    wait_until(|| status_count(&exposition, "ok") == 3.0).await;
    wait_until(|| status_count(&exposition, "error") == 1.0).await;

    let families = exposition.gather();
    let counter = families
        .iter()
        .find(|f| f.get_name() == "req_total")
        .unwrap();
    assert_eq!(counter.get_metric()[0].get_counter().get_value(), 3.0);

    let gauge = families
        .iter()
        .find(|f| f.get_name() == "worker_rss_bytes")
        .unwrap();
    assert_eq!(gauge.get_metric()[0].get_gauge().get_value(), 512.0);
    assert_eq!(gauge.get_metric()[0].get_label()[0].get_value(), "w1");

    control_tx.send(Control::Shutdown).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}

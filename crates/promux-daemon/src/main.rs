//! promux daemon binary.
//!
//! Forked worker processes push JSON metric update batches over a local
//! unix socket; promux aggregates them into one Prometheus registry and
//! serves it on /metrics.
//! - SIGHUP reloads the metric definitions without a restart
//! - SIGTERM / SIGINT stop the daemon (abrupt stop; senders retry)

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, UnixListener};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, Mutex};
use tracing_subscriber::{fmt, EnvFilter};

use promux_daemon::app_state::AppState;
use promux_daemon::engine::{Control, Engine};
use promux_daemon::{config, ingest, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cfg_path = match std::env::args().nth(1) {
        Some(arg) if arg == "-v" || arg == "--version" => {
            println!("promux {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        Some(arg) => arg,
        None => "promux.yaml".to_string(),
    };

    let cfg = config::load_from_file(&cfg_path).expect("config load failed");
    let listen: SocketAddr = cfg
        .exposition
        .listen
        .parse()
        .expect("exposition.listen must be a valid SocketAddr");

    let state = AppState::new(cfg).expect("state build failed");

    // Ingestion socket. A stale file from a previous run is cleared, and
    // the bound socket is opened up so unprivileged local workers can
    // connect.
    let socket_path = state.cfg().daemon.socket.clone();
    if let Err(err) = std::fs::remove_file(&socket_path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            panic!("cannot clear stale socket {socket_path}: {err}");
        }
    }
    let socket = UnixListener::bind(&socket_path).expect("failed to bind ingestion socket");
    std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o666))
        .expect("failed to set socket permissions");

    // Capacity-1 channels keep the listener, decoders, and run-loop in
    // lockstep; upstream senders feel socket backpressure instead of the
    // daemon buffering unboundedly.
    let (payload_tx, payload_rx) = mpsc::channel(1);
    let (update_tx, update_rx) = mpsc::channel(1);
    let (control_tx, control_rx) = mpsc::channel(1);

    let read_timeout = match state.cfg().daemon.read_timeout_ms {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    };
    tokio::spawn(ingest::listener::run(
        socket,
        payload_tx,
        read_timeout,
        state.telemetry(),
    ));

    let decoders = match state.cfg().daemon.decoders {
        0 => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2),
        n => n,
    };
    let payload_queue: ingest::decoder::PayloadQueue = Arc::new(Mutex::new(payload_rx));
    for _ in 0..decoders {
        tokio::spawn(ingest::decoder::run(
            Arc::clone(&payload_queue),
            update_tx.clone(),
            state.telemetry(),
        ));
    }
    drop(update_tx);

    tokio::spawn(watch_signals(control_tx));

    let engine = Engine::new(
        state.registry(),
        state.telemetry(),
        state.cfg().daemon.specs.clone(),
        update_rx,
        control_rx,
    );
    let engine_task = tokio::spawn(engine.run());

    let app = router::build_router(state);
    tracing::info!(%listen, socket = %socket_path, decoders, "promux starting");
    let http = TcpListener::bind(listen).await.expect("failed to bind");

    tokio::select! {
        res = axum::serve(http, app).into_future() => res.expect("server failed"),
        _ = engine_task => {}
    }
    tracing::info!("goodbye");
}

/// SIGHUP reloads the definitions; SIGTERM and ctrl-c stop the daemon. Log
/// rotation has no effect on the core: tracing writes to stdout.
async fn watch_signals(control_tx: mpsc::Sender<Control>) {
    let mut hangup = signal(SignalKind::hangup()).expect("SIGHUP handler");
    let mut terminate = signal(SignalKind::terminate()).expect("SIGTERM handler");
    loop {
        tokio::select! {
            _ = hangup.recv() => {
                tracing::info!("SIGHUP received, reloading definitions");
                if control_tx.send(Control::Reload).await.is_err() {
                    return;
                }
            }
            _ = terminate.recv() => {
                tracing::info!("SIGTERM received, shutting down");
                let _ = control_tx.send(Control::Shutdown).await;
                return;
            }
            res = tokio::signal::ctrl_c() => {
                if res.is_ok() {
                    tracing::info!("interrupt received, shutting down");
                }
                let _ = control_tx.send(Control::Shutdown).await;
                return;
            }
        }
    }
}

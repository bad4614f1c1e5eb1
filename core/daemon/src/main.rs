//! Nudge daemon entrypoint.
//!
//! A small, single-writer service that owns the session state machine: a
//! socket listener, strict request validation, a SQLite mirror of the event
//! log, and background timers for restart reverts and intervention timeouts.

use fs_err as fs;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use nudge_core::NudgeConfig;
use nudge_daemon_protocol::{
    parse_activity, parse_declare_task, parse_set_tone, ErrorInfo, Method, Request, Response,
    MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};
use serde::Serialize;

mod db;
mod scheduler;
mod state;
mod subscribers;

use db::Db;
use state::SharedState;
use subscribers::{SnapshotFileObserver, StreamObserver};

const SOCKET_ENV: &str = "NUDGE_DAEMON_SOCKET";
const DEBUG_ENV: &str = "NUDGE_DEBUG_LOG";
const SOCKET_NAME: &str = "daemon.sock";
const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;

static SUBSCRIBER_SEQ: AtomicU64 = AtomicU64::new(1);

fn main() {
    init_logging();

    let socket_path = match daemon_socket_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve daemon socket path");
            std::process::exit(1);
        }
    };

    if let Err(err) = prepare_socket_dir(&socket_path) {
        error!(error = %err, "Failed to prepare daemon socket directory");
        std::process::exit(1);
    }

    if let Err(err) = remove_existing_socket(&socket_path) {
        error!(error = %err, path = %socket_path.display(), "Failed to remove existing socket");
        std::process::exit(1);
    }

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind daemon socket");
            std::process::exit(1);
        }
    };

    info!(path = %socket_path.display(), "Nudge daemon started");

    let db_path = match daemon_db_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve daemon database path");
            std::process::exit(1);
        }
    };

    let db = match Db::new(db_path) {
        Ok(db) => db,
        Err(err) => {
            error!(error = %err, "Failed to initialize daemon database");
            std::process::exit(1);
        }
    };

    let config = match nudge_core::load_config(None) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load nudge config; using defaults");
            NudgeConfig::default()
        }
    };
    info!(
        default_tone = config.default_tone.as_str(),
        idle_ms = config.thresholds.idle_ms,
        tab_switch_threshold = config.thresholds.tab_switch_threshold,
        cooldown_ms = config.timing.cooldown_ms,
        "Nudge config loaded"
    );
    let poll_interval = Duration::from_millis(config.timing.intervention_poll_ms);

    let shared_state = Arc::new(SharedState::new(db, config));
    match snapshot_file_path() {
        Ok(path) => shared_state.register_observer(Box::new(SnapshotFileObserver::new(path))),
        Err(err) => warn!(error = %err, "Snapshot file disabled"),
    }
    scheduler::spawn_intervention_poller(Arc::clone(&shared_state), poll_interval);

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let state = Arc::clone(&shared_state);
                thread::spawn(|| handle_connection(stream, state));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }
}

fn init_logging() {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn nudge_home() -> Result<PathBuf, String> {
    nudge_core::nudge_dir().map_err(|err| err.to_string())
}

fn daemon_socket_path() -> Result<PathBuf, String> {
    if let Ok(value) = env::var(SOCKET_ENV) {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value));
        }
    }
    Ok(nudge_home()?.join(SOCKET_NAME))
}

fn daemon_db_path() -> Result<PathBuf, String> {
    Ok(nudge_home()?.join("daemon").join("state.db"))
}

fn snapshot_file_path() -> Result<PathBuf, String> {
    Ok(nudge_home()?.join("state.json"))
}

fn prepare_socket_dir(socket_path: &Path) -> Result<(), String> {
    let parent = socket_path
        .parent()
        .ok_or_else(|| "Socket path has no parent".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("Failed to create socket directory: {}", err))
}

fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}

fn handle_connection(mut stream: UnixStream, state: Arc<SharedState>) {
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    tracing::debug!(method = ?request.method, id = ?request.id, "Daemon request received");

    if request.method == Method::Subscribe && request.protocol_version == PROTOCOL_VERSION {
        handle_subscribe(stream, request, state);
        return;
    }

    let response = handle_request(request, state);
    let _ = write_response(&mut stream, response);
}

/// Acknowledges with the current snapshot, then keeps the connection as an
/// observer. The stream stays open until the client goes away.
fn handle_subscribe(mut stream: UnixStream, request: Request, state: Arc<SharedState>) {
    let observer_stream = match stream.try_clone() {
        Ok(clone) => clone,
        Err(err) => {
            let response = Response::error(
                request.id,
                "subscribe_error",
                format!("Failed to clone subscriber stream: {}", err),
            );
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    let label = format!("subscriber-{}", SUBSCRIBER_SEQ.fetch_add(1, Ordering::Relaxed));
    let observer = Box::new(StreamObserver::new(observer_stream, label.clone()));
    let attached = state.attach_observer(observer, |snapshot| {
        let ack = to_response(request.id, snapshot, "session snapshot");
        write_response(&mut stream, ack).map_err(|err| err.to_string())
    });

    match attached {
        Ok(()) => info!(subscriber = %label, "Subscriber attached"),
        Err(err) => warn!(error = %err, "Failed to acknowledge subscriber"),
    }
}

fn read_request(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)));

    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Err(ErrorInfo::new("read_timeout", "request timed out"));
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }

    if buffer.is_empty() {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let request_bytes = match newline_index {
        Some(index) => {
            if buffer.len() > index + 1 {
                let trailing = &buffer[index + 1..];
                if trailing.iter().any(|b| !b.is_ascii_whitespace()) {
                    warn!("Extra bytes detected after newline; ignoring trailing data");
                }
            }
            &buffer[..index]
        }
        None => buffer.as_slice(),
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

fn handle_request(request: Request, state: Arc<SharedState>) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        );
    }

    match request.method {
        Method::GetHealth => {
            let mut data = serde_json::json!({
                "status": "ok",
                "pid": std::process::id(),
                "version": env!("CARGO_PKG_VERSION"),
                "protocol_version": PROTOCOL_VERSION,
            });
            if let Ok(value) = serde_json::to_value(state.health_view()) {
                data["state"] = value;
            }
            Response::ok(request.id, data)
        }
        Method::DeclareTask => {
            let params = match parse_declare_task(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(request.id, err),
            };
            info!(task_name = %params.task_name, "Declare task");
            let snapshot = state.declare_task(&params.task_name);
            to_response(request.id, &snapshot, "session snapshot")
        }
        Method::ReportActivity => {
            let params = match parse_activity(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(request.id, err),
            };
            tracing::debug!(
                typing = params.typing,
                scroll_distance = params.scroll_distance,
                "Activity report"
            );
            let snapshot = state.report_activity(params.typing, params.scroll_distance);
            to_response(request.id, &snapshot, "session snapshot")
        }
        Method::ReportTabSwitch => {
            let snapshot = state.report_tab_switch();
            to_response(request.id, &snapshot, "session snapshot")
        }
        Method::Continue => {
            let snapshot = state.acknowledge_continue();
            to_response(request.id, &snapshot, "session snapshot")
        }
        Method::AcceptPrompt => {
            let snapshot = state.accept_prompt();
            to_response(request.id, &snapshot, "session snapshot")
        }
        Method::SetTone => {
            let params = match parse_set_tone(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(request.id, err),
            };
            let snapshot = state.set_tone(params.tone);
            Response::ok(
                request.id,
                serde_json::json!({ "ok": true, "tone": snapshot.tone }),
            )
        }
        Method::GetState => to_response(request.id, &state.state_view(), "session state"),
        Method::GetMetrics => to_response(request.id, &state.metrics_view(), "metrics"),
        Method::ExportEvents => {
            let events = state.export_events();
            tracing::debug!(events = events.len(), "Event export");
            to_response(request.id, &events, "events")
        }
        Method::ResetEventLog => {
            let cleared = state.reset_event_log();
            Response::ok(request.id, serde_json::json!({ "cleared": cleared }))
        }
        Method::Subscribe => Response::error(
            request.id,
            "invalid_request",
            "subscribe must be the only request on its connection",
        ),
    }
}

fn to_response<T: Serialize>(id: Option<String>, value: &T, what: &str) -> Response {
    match serde_json::to_value(value) {
        Ok(value) => Response::ok(id, value),
        Err(err) => Response::error(
            id,
            "serialization_error",
            format!("Failed to serialize {}: {}", what, err),
        ),
    }
}

fn write_response(stream: &mut UnixStream, response: Response) -> std::io::Result<()> {
    serde_json::to_writer(&mut *stream, &response)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}

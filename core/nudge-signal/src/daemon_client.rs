//! Client helper for talking to the nudge daemon.
//!
//! The daemon is the only writer. A request that never reached it (connect
//! failed) is retried once; anything after that is surfaced to the caller,
//! since replaying a delivered signal would apply it twice.

use chrono::Utc;
use nudge_core::SessionSnapshot;
use nudge_daemon_protocol::{Method, Request, Response, MAX_REQUEST_BYTES, PROTOCOL_VERSION};
use rand::RngCore;
use serde_json::Value;
use std::env;
use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const SOCKET_ENV: &str = "NUDGE_DAEMON_SOCKET";
const SOCKET_NAME: &str = "daemon.sock";
const READ_TIMEOUT_MS: u64 = 2500;
const WRITE_TIMEOUT_MS: u64 = 600;
const RETRY_DELAY_MS: u64 = 50;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Daemon unavailable: {0}")]
    Unavailable(String),

    #[error("Daemon rejected request ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("Daemon protocol error: {0}")]
    Protocol(String),
}

pub fn socket_path() -> Result<PathBuf, ClientError> {
    if let Ok(path) = env::var(SOCKET_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let dir = nudge_core::nudge_dir().map_err(|err| ClientError::Unavailable(err.to_string()))?;
    Ok(dir.join(SOCKET_NAME))
}

/// Sends one request and returns the response payload.
pub fn call(method: Method, params: Option<Value>) -> Result<Value, ClientError> {
    call_at(&socket_path()?, method, params)
}

pub fn call_at(socket: &Path, method: Method, params: Option<Value>) -> Result<Value, ClientError> {
    let request = Request {
        protocol_version: PROTOCOL_VERSION,
        method,
        id: Some(make_request_id()),
        params,
    };

    let response = match send_request(socket, &request) {
        Err(ClientError::Unavailable(err)) => {
            tracing::warn!(error = %err, method = ?method, "Daemon unreachable; retrying once");
            std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
            send_request(socket, &request)?
        }
        other => other?,
    };

    into_data(response)
}

/// Subscribes to snapshot pushes. `on_snapshot` sees the acknowledgement
/// snapshot first, then every broadcast; returning `false` stops the stream.
pub fn subscribe<F>(mut on_snapshot: F) -> Result<(), ClientError>
where
    F: FnMut(SessionSnapshot) -> bool,
{
    let socket = socket_path()?;
    let mut stream = connect(&socket)?;
    write_request(
        &mut stream,
        &Request {
            protocol_version: PROTOCOL_VERSION,
            method: Method::Subscribe,
            id: Some(make_request_id()),
            params: None,
        },
    )?;
    let _ = stream.set_read_timeout(None);

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .map_err(|err| ClientError::Protocol(format!("Failed to read ack: {}", err)))?;
    let ack: Response = serde_json::from_str(line.trim())
        .map_err(|err| ClientError::Protocol(format!("Failed to parse ack: {}", err)))?;
    let first = into_data(ack)?;

    let mut latest_revision = None;
    let mut deliver = |snapshot: SessionSnapshot| -> bool {
        if latest_revision.is_some_and(|seen| snapshot.revision < seen) {
            return true;
        }
        latest_revision = Some(snapshot.revision);
        on_snapshot(snapshot)
    };

    if !deliver(parse_snapshot(first)?) {
        return Ok(());
    }

    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|err| ClientError::Unavailable(format!("Subscription lost: {}", err)))?;
        if read == 0 {
            return Err(ClientError::Unavailable("Daemon closed the subscription".to_string()));
        }
        let snapshot: SessionSnapshot = serde_json::from_str(line.trim())
            .map_err(|err| ClientError::Protocol(format!("Failed to parse snapshot: {}", err)))?;
        if !deliver(snapshot) {
            return Ok(());
        }
    }
}

pub fn parse_snapshot(value: Value) -> Result<SessionSnapshot, ClientError> {
    serde_json::from_value(value)
        .map_err(|err| ClientError::Protocol(format!("Unexpected snapshot payload: {}", err)))
}

fn into_data(response: Response) -> Result<Value, ClientError> {
    if response.ok {
        return Ok(response.data.unwrap_or(Value::Null));
    }
    match response.error {
        Some(err) => Err(ClientError::Rejected {
            code: err.code,
            message: err.message,
        }),
        None => Err(ClientError::Protocol("Unknown daemon error".to_string())),
    }
}

fn connect(socket: &Path) -> Result<UnixStream, ClientError> {
    let stream = UnixStream::connect(socket).map_err(|err| {
        ClientError::Unavailable(format!(
            "Failed to connect to daemon socket {}: {}",
            socket.display(),
            err
        ))
    })?;
    let _ = stream.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)));
    let _ = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS)));
    Ok(stream)
}

fn write_request(stream: &mut UnixStream, request: &Request) -> Result<(), ClientError> {
    serde_json::to_writer(&mut *stream, request)
        .map_err(|err| ClientError::Protocol(format!("Failed to write request: {}", err)))?;
    stream
        .write_all(b"\n")
        .map_err(|err| ClientError::Protocol(format!("Failed to flush request: {}", err)))?;
    stream.flush().ok();
    Ok(())
}

fn send_request(socket: &Path, request: &Request) -> Result<Response, ClientError> {
    let mut stream = connect(socket)?;
    write_request(&mut stream, request)?;
    read_response(&mut stream)
}

fn read_response(stream: &mut UnixStream) -> Result<Response, ClientError> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ClientError::Protocol(
                        "Response exceeded maximum size".to_string(),
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
                return Err(ClientError::Protocol(
                    "Timed out waiting for daemon response".to_string(),
                ));
            }
            Err(err) => {
                return Err(ClientError::Protocol(format!(
                    "Failed to read response: {}",
                    err
                )))
            }
        }
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let response_bytes = match newline_index {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if response_bytes.is_empty() {
        return Err(ClientError::Protocol("Daemon response was empty".to_string()));
    }

    serde_json::from_slice(response_bytes)
        .map_err(|err| ClientError::Protocol(format!("Failed to parse response JSON: {}", err)))
}

fn make_request_id() -> String {
    let mut random = rand::thread_rng();
    format!(
        "req-{}-{}-{:x}",
        Utc::now().timestamp_millis(),
        std::process::id(),
        random.next_u64()
    )
}

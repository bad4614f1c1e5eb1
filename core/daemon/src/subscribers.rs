//! Snapshot observers owned by the daemon.

use nudge_core::{DeliveryError, Observer, SessionSnapshot};
use std::io::{ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::debug;

const WRITE_TIMEOUT_MS: u64 = 500;

/// A client connection that issued `subscribe`. One JSON line per snapshot.
pub struct StreamObserver {
    stream: UnixStream,
    label: String,
}

impl StreamObserver {
    pub fn new(stream: UnixStream, label: String) -> Self {
        let _ = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS)));
        Self { stream, label }
    }
}

impl Observer for StreamObserver {
    fn name(&self) -> &str {
        &self.label
    }

    fn deliver(&mut self, snapshot: &SessionSnapshot) -> Result<(), DeliveryError> {
        let mut line = serde_json::to_vec(snapshot)
            .map_err(|err| DeliveryError::Failed(format!("serialize snapshot: {}", err)))?;
        line.push(b'\n');

        // A failed or timed-out write may leave part of a line on the wire, and
        // the stream cannot be resynchronized after that. Drop the subscriber.
        self.stream
            .write_all(&line)
            .and_then(|_| self.stream.flush())
            .map_err(|err| {
                debug!(
                    subscriber = %self.label,
                    error = %err,
                    timed_out = matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut),
                    "Subscriber write failed"
                );
                DeliveryError::Disconnected
            })
    }
}

/// Mirrors the latest snapshot into `state.json` for UIs that poll a file.
pub struct SnapshotFileObserver {
    path: PathBuf,
}

impl SnapshotFileObserver {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn write(&self, snapshot: &SessionSnapshot) -> Result<(), String> {
        let content = serde_json::to_string_pretty(snapshot)
            .map_err(|e| format!("Failed to serialize: {}", e))?;

        let parent_dir = self
            .path
            .parent()
            .ok_or_else(|| "Snapshot path has no parent directory".to_string())?;
        fs_err::create_dir_all(parent_dir)
            .map_err(|e| format!("Failed to create snapshot dir: {}", e))?;

        let mut temp_file =
            NamedTempFile::new_in(parent_dir).map_err(|e| format!("Temp file error: {}", e))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| format!("Failed to write temp snapshot file: {}", e))?;
        temp_file
            .flush()
            .map_err(|e| format!("Failed to flush temp snapshot file: {}", e))?;
        temp_file
            .persist(&self.path)
            .map_err(|e| format!("Failed to write snapshot file: {}", e.error))?;

        Ok(())
    }
}

impl Observer for SnapshotFileObserver {
    fn name(&self) -> &str {
        "state-file"
    }

    fn deliver(&mut self, snapshot: &SessionSnapshot) -> Result<(), DeliveryError> {
        self.write(snapshot).map_err(DeliveryError::Failed)
    }
}

//! Control socket between the CLI and the running daemon
//!
//! Each message is a u32 little-endian length followed by that many bytes of
//! JSON. One socket per user, under `$XDG_RUNTIME_DIR`.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

mod messages;
pub use messages::{EngineRequest, EngineResponse};

use crate::constants::ipc::{MAX_MESSAGE_SIZE, REQUEST_TIMEOUT_MS, SOCKET_RELATIVE_PATH};

/// `$XDG_RUNTIME_DIR/window-keeper/engine.sock`, or the cache dir without one
pub fn default_socket_path() -> Result<PathBuf> {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return Ok(PathBuf::from(runtime_dir).join(SOCKET_RELATIVE_PATH));
    }

    let cache = dirs::cache_dir()
        .context("Failed to determine cache directory (no XDG_RUNTIME_DIR or HOME)")?;
    Ok(cache.join(SOCKET_RELATIVE_PATH))
}

/// CLI side of the control socket
pub struct EngineClient {
    stream: UnixStream,
}

impl EngineClient {
    pub fn connect() -> Result<Self> {
        Self::connect_to(&default_socket_path()?)
    }

    pub fn connect_to(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .with_context(|| format!("Failed to connect to daemon at {}", path.display()))?;
        let timeout = Some(Duration::from_millis(REQUEST_TIMEOUT_MS));
        stream.set_read_timeout(timeout).context("Failed to set socket read timeout")?;
        stream.set_write_timeout(timeout).context("Failed to set socket write timeout")?;
        Ok(Self { stream })
    }

    /// Send one request and wait (bounded) for its response
    pub fn request(&mut self, req: &EngineRequest) -> Result<EngineResponse> {
        write_message(&mut self.stream, req)?;
        read_message(&mut self.stream).context("Daemon did not answer")
    }
}

/// Daemon side of the control socket.
///
/// Removing the socket file on exit is left to the daemon: the listener
/// thread is usually parked in `accept` when the daemon stops.
pub struct EngineServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl EngineServer {
    /// Listen at `socket_path`, replacing a leftover socket from a daemon that
    /// died. Fails if another daemon still answers there.
    pub fn bind_to(socket_path: PathBuf) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {}", parent.display()))?;
        }

        if socket_path.exists() {
            if UnixStream::connect(&socket_path).is_ok() {
                bail!("Another window-keeper daemon is already listening on {}", socket_path.display());
            }
            debug!(socket = %socket_path.display(), "Removing stale socket");
            std::fs::remove_file(&socket_path)
                .with_context(|| format!("Failed to remove stale socket: {}", socket_path.display()))?;
        }

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to bind socket at {}", socket_path.display()))?;
        // Owner only: the socket can move every window on the desktop
        std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o700))
            .context("Failed to set socket permissions")?;

        info!(socket = %socket_path.display(), "Control socket bound");
        Ok(Self {
            listener,
            socket_path,
        })
    }

    /// Block until the next CLI connects
    pub fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self.listener.accept()
            .context("Failed to accept IPC connection")?;
        Ok(stream)
    }

    pub fn path(&self) -> &Path {
        &self.socket_path
    }
}

pub(crate) fn write_message<T: Serialize>(stream: &mut impl Write, msg: &T) -> Result<()> {
    let json = serde_json::to_vec(msg).context("Failed to serialize message to JSON")?;
    if json.len() > MAX_MESSAGE_SIZE {
        bail!("Message too large to send: {} bytes (max: {})", json.len(), MAX_MESSAGE_SIZE);
    }

    let len = u32::try_from(json.len()).context("Message too large to frame")?;
    stream
        .write_all(&len.to_le_bytes())
        .context("Failed to write message length")?;
    stream
        .write_all(&json)
        .context("Failed to write message payload")?;
    stream.flush().context("Failed to flush stream")
}

pub(crate) fn read_message<T: for<'de> Deserialize<'de>>(stream: &mut impl Read) -> Result<T> {
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .context("Failed to read message length")?;
    let len = u32::from_le_bytes(len_buf) as usize;

    // Checked before allocating
    if len > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Message too large: {} bytes (max: {})", len, MAX_MESSAGE_SIZE));
    }

    let mut json_buf = vec![0u8; len];
    stream
        .read_exact(&mut json_buf)
        .context("Failed to read message payload")?;

    serde_json::from_slice(&json_buf).context("Failed to deserialize message from JSON")
}

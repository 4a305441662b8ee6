// Stat socket client: one connection per command, size-header / "ok" / payload exchange.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, instrument};

use crate::config::DaemonConfig;
use crate::error::{Result, StatError};

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/map646_stat";

/// Acknowledgement sent after the size header.
const ACK: &[u8] = b"ok";

/// The daemon writes the header and waits for the ack, so one read of this size gets all of it.
const SIZE_HEADER_MAX: usize = 32;

/// Commands the daemon understands. `execute` also accepts any raw string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Current counters as JSON.
    Show,
    /// Last flush time as text.
    Time,
    /// Reset counters.
    Flush,
    /// Human-readable summary.
    Info,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Show => "show",
            Command::Time => "time",
            Command::Flush => "flush",
            Command::Info => "info",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub connect_timeout: Duration,
    /// Bound on the whole exchange after connecting.
    pub io_timeout: Duration,
    /// Size headers above this are rejected before any allocation.
    pub max_payload_bytes: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(2_000),
            io_timeout: Duration::from_millis(5_000),
            max_payload_bytes: 64 * 1024 * 1024,
        }
    }
}

impl From<&DaemonConfig> for ChannelOptions {
    fn from(c: &DaemonConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(c.connect_timeout_ms),
            io_timeout: Duration::from_millis(c.io_timeout_ms),
            max_payload_bytes: c.max_payload_bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelClient {
    socket_path: PathBuf,
    options: ChannelOptions,
}

impl ChannelClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self::with_options(socket_path, ChannelOptions::default())
    }

    pub fn with_options(socket_path: impl Into<PathBuf>, options: ChannelOptions) -> Self {
        Self {
            socket_path: socket_path.into(),
            options,
        }
    }

    pub fn from_config(config: &DaemonConfig) -> Self {
        Self::with_options(config.socket_path.clone(), ChannelOptions::from(config))
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Runs one exchange on a fresh connection and returns the payload bytes.
    /// No retries; the connection is dropped on return.
    #[instrument(skip(self), fields(socket = %self.socket_path.display()))]
    pub async fn execute(&self, command: &str) -> Result<Vec<u8>> {
        let mut stream = self.connect().await?;
        let payload = match timeout(
            self.options.io_timeout,
            exchange(&mut stream, command, self.options.max_payload_bytes),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(StatError::protocol(
                    command,
                    format!("daemon stalled for {:?}", self.options.io_timeout),
                ));
            }
        };
        debug!(command, bytes = payload.len(), "command complete");
        Ok(payload)
    }

    /// Like `execute`, decoding the payload as text (lossy).
    pub async fn execute_text(&self, command: Command) -> Result<String> {
        let payload = self.execute(command.as_str()).await?;
        Ok(String::from_utf8_lossy(&payload).into_owned())
    }

    async fn connect(&self) -> Result<UnixStream> {
        connect_within(
            &self.socket_path,
            self.options.connect_timeout,
            UnixStream::connect(&self.socket_path),
        )
        .await
    }
}

/// Awaits a connect attempt for at most `limit`. Both a refused attempt and
/// one that never completes are `Connection` errors.
async fn connect_within<T, F>(path: &Path, limit: Duration, attempt: F) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    let connection_error = |reason: String| StatError::Connection {
        path: path.to_path_buf(),
        reason,
    };
    match timeout(limit, attempt).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(connection_error(e.to_string())),
        Err(_) => Err(connection_error(format!("connect timed out after {limit:?}"))),
    }
}

/// Client side of the wire exchange, generic over the stream for tests.
pub async fn exchange<S>(stream: &mut S, command: &str, max_payload_bytes: usize) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let io_error = |step: &str, e: std::io::Error| StatError::protocol(command, format!("{step}: {e}"));

    stream
        .write_all(command.as_bytes())
        .await
        .map_err(|e| io_error("send command", e))?;

    let mut header = [0u8; SIZE_HEADER_MAX];
    let n = stream
        .read(&mut header)
        .await
        .map_err(|e| io_error("read size header", e))?;
    if n == 0 {
        return Err(StatError::protocol(
            command,
            "connection closed before size header",
        ));
    }
    let size = parse_size_header(&header[..n]).map_err(|reason| StatError::protocol(command, reason))?;
    if size > max_payload_bytes {
        return Err(StatError::protocol(
            command,
            format!("announced {size} bytes, limit is {max_payload_bytes}"),
        ));
    }

    stream
        .write_all(ACK)
        .await
        .map_err(|e| io_error("send ack", e))?;

    let mut payload = vec![0u8; size];
    stream.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            StatError::protocol(command, format!("short read: expected {size} bytes"))
        } else {
            io_error("read payload", e)
        }
    })?;
    Ok(payload)
}

/// ASCII decimal byte count. Surrounding whitespace and NUL padding are ignored.
pub fn parse_size_header(raw: &[u8]) -> std::result::Result<usize, String> {
    let text = String::from_utf8_lossy(raw);
    let digits = text.trim_matches(|c: char| c.is_ascii_whitespace() || c == '\0');
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("malformed size header {:?}", text));
    }
    digits
        .parse::<usize>()
        .map_err(|e| format!("size header {digits:?}: {e}"))
}

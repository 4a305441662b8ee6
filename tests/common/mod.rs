// Shared test helpers: a scripted stat-socket daemon on a temp-dir Unix socket.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::task::JoinHandle;

/// How the fake daemon answers one command.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Well-formed exchange with this payload.
    Payload(Vec<u8>),
    /// Send this raw size header, then the payload after the ack.
    RawHeader(String, Vec<u8>),
    /// Close the connection without answering.
    Hangup,
    /// Never answer.
    Stall,
}

impl Reply {
    pub fn text(s: &str) -> Self {
        Reply::Payload(s.as_bytes().to_vec())
    }
}

/// Unknown commands are answered with an empty payload.
pub struct FakeDaemon {
    pub socket_path: PathBuf,
    commands: Arc<Mutex<Vec<String>>>,
    acks: Arc<Mutex<Vec<Vec<u8>>>>,
    handle: JoinHandle<()>,
    _dir: TempDir,
}

impl FakeDaemon {
    pub fn spawn(replies: HashMap<&str, Reply>) -> Self {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("map646_stat");
        let listener = UnixListener::bind(&socket_path).unwrap();
        let replies: HashMap<String, Reply> = replies
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let acks = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let commands = commands.clone();
            let acks = acks.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((mut stream, _)) = listener.accept().await else {
                        return;
                    };
                    let mut buf = [0u8; 64];
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    let command = String::from_utf8_lossy(&buf[..n]).to_string();
                    commands.lock().unwrap().push(command.clone());

                    let reply = replies
                        .get(&command)
                        .cloned()
                        .unwrap_or(Reply::Payload(Vec::new()));
                    let (header, payload) = match reply {
                        Reply::Payload(p) => (p.len().to_string(), p),
                        Reply::RawHeader(h, p) => (h, p),
                        Reply::Hangup => continue,
                        Reply::Stall => {
                            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                            continue;
                        }
                    };

                    if stream.write_all(header.as_bytes()).await.is_err() {
                        continue;
                    }
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        continue;
                    }
                    acks.lock().unwrap().push(buf[..n].to_vec());
                    let _ = stream.write_all(&payload).await;
                }
            })
        };

        Self {
            socket_path,
            commands,
            acks,
            handle,
            _dir: dir,
        }
    }

    pub fn path(&self) -> &Path {
        &self.socket_path
    }

    /// Commands received so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn acks(&self) -> Vec<Vec<u8>> {
        self.acks.lock().unwrap().clone()
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Writes a snapshot file with one `#lastflush:` record.
pub fn write_snapshot(dir: &Path, stamp: &str, json: &str) -> PathBuf {
    let path = dir.join(format!("map646_{stamp}.stat"));
    std::fs::write(&path, format!("#lastflush: 2023-01-05 08:00:00\n{json}\n")).unwrap();
    path
}

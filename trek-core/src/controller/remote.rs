//! src/controller/remote.rs
//! ============================================================================
//! # Remote: the line protocol spoken to the session server
//!
//! One command per connection: connect, write the line, half-close, drain the
//! reply. `send load` and `send sync` ask the server to forward a refresh to
//! every other connected session.

use std::{fmt, path::PathBuf, str::FromStr};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    /// Other sessions re-validate their listings.
    SendLoad,

    /// Other sessions re-read marks, tags and the copy buffer.
    SendSync,

    Conn(u64),
    Drop(u64),
    Quit,

    /// Quit even with clients still connected.
    QuitForce,
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendLoad => write!(f, "send load"),
            Self::SendSync => write!(f, "send sync"),
            Self::Conn(id) => write!(f, "conn {id}"),
            Self::Drop(id) => write!(f, "drop {id}"),
            Self::Quit => write!(f, "quit"),
            Self::QuitForce => write!(f, "quit!"),
        }
    }
}

impl FromStr for RemoteCommand {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = s.split_whitespace().collect();
        let parse_id = |raw: &str| -> AppResult<u64> {
            raw.parse::<u64>()
                .map_err(|_| AppError::invalid_input("remote", format!("invalid client id: {raw}")))
        };

        match words.as_slice() {
            ["send", "load"] => Ok(Self::SendLoad),
            ["send", "sync"] => Ok(Self::SendSync),
            ["conn", id] => Ok(Self::Conn(parse_id(id)?)),
            ["drop", id] => Ok(Self::Drop(parse_id(id)?)),
            ["quit"] => Ok(Self::Quit),
            ["quit!"] => Ok(Self::QuitForce),
            _ => Err(AppError::invalid_input(
                "remote",
                format!("unknown command: {s}"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteClient {
    socket_path: PathBuf,
}

impl RemoteClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Send one command and return whatever the server answered.
    #[cfg(unix)]
    pub async fn send(&self, cmd: RemoteCommand) -> AppResult<String> {
        use tokio::net::UnixStream;

        let mut stream: UnixStream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| AppError::remote_failed(format!("dialing to send server: {e}")))?;

        let line: String = format!("{cmd}\n");
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AppError::remote_failed(format!("writing '{cmd}': {e}")))?;
        stream
            .shutdown()
            .await
            .map_err(|e| AppError::remote_failed(format!("closing write half: {e}")))?;

        let mut reply: String = String::new();
        stream
            .read_to_string(&mut reply)
            .await
            .map_err(|e| AppError::remote_failed(format!("reading reply: {e}")))?;

        debug!(
            marker = "REMOTE_SEND",
            operation_type = "remote",
            command = %cmd,
            reply_len = reply.len(),
            "Remote command sent"
        );

        Ok(reply)
    }

    #[cfg(not(unix))]
    pub async fn send(&self, cmd: RemoteCommand) -> AppResult<String> {
        Err(AppError::remote_failed(format!(
            "unix sockets unavailable, cannot send '{cmd}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_text() {
        for (cmd, text) in [
            (RemoteCommand::SendLoad, "send load"),
            (RemoteCommand::SendSync, "send sync"),
            (RemoteCommand::Conn(7), "conn 7"),
            (RemoteCommand::Drop(7), "drop 7"),
            (RemoteCommand::Quit, "quit"),
            (RemoteCommand::QuitForce, "quit!"),
        ] {
            assert_eq!(cmd.to_string(), text);
            assert_eq!(text.parse::<RemoteCommand>().unwrap(), cmd);
        }

        assert!("send nothing".parse::<RemoteCommand>().is_err());
        assert!("conn x".parse::<RemoteCommand>().is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_send_writes_line_and_reads_reply() {
        use tempfile::TempDir;
        use tokio::net::UnixListener;

        let temp_dir = TempDir::new().unwrap();
        let socket = temp_dir.path().join("trek.sock");
        let listener = UnixListener::bind(&socket).unwrap();

        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut received = String::new();
            conn.read_to_string(&mut received).await.unwrap();
            conn.write_all(b"ok\n").await.unwrap();
            received
        });

        let reply = RemoteClient::new(socket)
            .send(RemoteCommand::SendLoad)
            .await
            .unwrap();

        assert_eq!(reply, "ok\n");
        assert_eq!(server.await.unwrap(), "send load\n");
    }

    #[tokio::test]
    async fn test_send_without_server_fails() {
        let client = RemoteClient::new(PathBuf::from("/nonexistent/trek.sock"));
        match client.send(RemoteCommand::SendSync).await {
            Err(AppError::Remote(msg)) => assert!(msg.contains("dialing")),
            other => panic!("expected remote error, got {other:?}"),
        }
    }
}

//! MCP Transport layer implementations

use std::collections::HashMap;
use std::io;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;

/// Transport trait for MCP communication
///
/// Messages are whole JSON-RPC values. `receive` yields `None` once the
/// peer has gone away. `close` must be safe to call more than once.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&mut self, message: Value) -> io::Result<()>;
    async fn receive(&mut self) -> io::Result<Option<Value>>;
    async fn close(&mut self) -> io::Result<()>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&mut self, message: Value) -> io::Result<()> {
        (**self).send(message).await
    }

    async fn receive(&mut self) -> io::Result<Option<Value>> {
        (**self).receive().await
    }

    async fn close(&mut self) -> io::Result<()> {
        (**self).close().await
    }
}

/// Write one newline-delimited JSON message
async fn write_line<W>(writer: &mut W, message: &Value) -> io::Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let json = serde_json::to_string(message)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Read the next non-blank newline-delimited JSON message
async fn read_line<R>(reader: &mut R) -> io::Result<Option<Value>>
where
    R: AsyncBufReadExt + Unpin,
{
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;

        if n == 0 {
            return Ok(None);
        }
        if line.trim().is_empty() {
            continue;
        }

        let value: Value = serde_json::from_str(&line)?;
        return Ok(Some(value));
    }
}

/// Stdio transport for subprocess communication
pub struct StdioTransport {
    child: Child,
    stdin: Option<ChildStdin>,
    reader: Option<BufReader<ChildStdout>>,
    closed: bool,
}

impl StdioTransport {
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> io::Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("Failed to capture stdout"))?;

        tracing::debug!(command, pid = ?child.id(), "Spawned MCP server process");

        Ok(Self {
            child,
            stdin,
            reader: Some(BufReader::new(stdout)),
            closed: false,
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, message: Value) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "Stdin not available"))?;

        write_line(stdin, &message).await
    }

    async fn receive(&mut self) -> io::Result<Option<Value>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "Reader not available"))?;

        read_line(reader).await
    }

    async fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Closing stdin lets well-behaved servers exit on their own
        self.stdin.take();
        self.reader.take();

        match self.child.start_kill() {
            Ok(()) => {}
            // Already exited and reaped
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e),
        }
        self.child.wait().await?;
        Ok(())
    }
}

/// Server-side stdio transport over this process's stdin/stdout
pub struct ServerStdioTransport {
    reader: BufReader<tokio::io::Stdin>,
    writer: tokio::io::Stdout,
}

impl ServerStdioTransport {
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            writer: tokio::io::stdout(),
        }
    }
}

impl Default for ServerStdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ServerStdioTransport {
    async fn send(&mut self, message: Value) -> io::Result<()> {
        write_line(&mut self.writer, &message).await
    }

    async fn receive(&mut self) -> io::Result<Option<Value>> {
        read_line(&mut self.reader).await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.writer.flush().await
    }
}

/// In-process transport backed by a pair of channels
pub struct MemoryTransport {
    tx: Option<mpsc::UnboundedSender<Value>>,
    rx: mpsc::UnboundedReceiver<Value>,
}

impl MemoryTransport {
    /// Create two connected ends
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self { tx: Some(a_tx), rx: a_rx },
            Self { tx: Some(b_tx), rx: b_rx },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, message: Value) -> io::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "Transport closed"))?;
        tx.send(message)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "Peer disconnected"))
    }

    async fn receive(&mut self) -> io::Result<Option<Value>> {
        if self.tx.is_none() {
            return Ok(None);
        }
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) -> io::Result<()> {
        // Dropping the sender tells the peer we are gone
        self.tx.take();
        self.rx.close();
        Ok(())
    }
}

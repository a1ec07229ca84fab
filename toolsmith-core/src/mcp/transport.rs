//! MCP Transport Implementations
//!
//! Transports move newline-delimited JSON-RPC messages. A line that is not
//! valid JSON-RPC is handed to the server as [`Incoming::Malformed`] so it
//! can answer with a parse error and keep going.

use super::protocol::JsonRpcMessage;
use crate::error::{Result, ToolsmithError};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout,
};

/// One unit read from a transport
#[derive(Debug, Clone)]
pub enum Incoming {
    Message(JsonRpcMessage),
    /// Line that did not parse; carries the parser's message
    Malformed(String),
}

/// Transport trait for MCP communication
#[async_trait]
pub trait Transport: Send {
    /// Next message, or `None` once the peer has closed the stream.
    ///
    /// Must be cancel safe: the server races it against outgoing replies,
    /// and a dropped call must not lose bytes already read.
    async fn receive(&mut self) -> Result<Option<Incoming>>;

    async fn send(&mut self, message: JsonRpcMessage) -> Result<()>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for &mut T {
    async fn receive(&mut self) -> Result<Option<Incoming>> {
        (**self).receive().await
    }

    async fn send(&mut self, message: JsonRpcMessage) -> Result<()> {
        (**self).send(message).await
    }
}

/// Newline-delimited JSON over any async reader/writer pair
pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
    /// Bytes of the line being read; survives a cancelled `receive`
    buffer: Vec<u8>,
}

/// Transport over the process's stdin/stdout
pub type StdioTransport = LineTransport<BufReader<Stdin>, Stdout>;

impl StdioTransport {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> LineTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            buffer: Vec::new(),
        }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

#[async_trait]
impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn receive(&mut self) -> Result<Option<Incoming>> {
        loop {
            // read_until keeps partial input in the buffer if this future is dropped
            let read = self.reader.read_until(b'\n', &mut self.buffer).await?;
            if read == 0 && self.buffer.is_empty() {
                return Ok(None);
            }
            let line = String::from_utf8_lossy(&self.buffer).into_owned();
            self.buffer.clear();
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(match serde_json::from_str(trimmed) {
                Ok(message) => Incoming::Message(message),
                Err(e) => Incoming::Malformed(e.to_string()),
            }));
        }
    }

    async fn send(&mut self, message: JsonRpcMessage) -> Result<()> {
        let mut json = serde_json::to_string(&message)?;
        json.push('\n');
        self.writer.write_all(json.as_bytes()).await.map_err(|e| {
            ToolsmithError::Protocol(format!("Failed to write message: {}", e))
        })?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// In-memory transport for testing
#[derive(Default)]
pub struct MemoryTransport {
    incoming: VecDeque<Incoming>,
    sent: Vec<JsonRpcMessage>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message to be received
    pub fn push(&mut self, message: impl Into<JsonRpcMessage>) {
        self.incoming.push_back(Incoming::Message(message.into()));
    }

    /// Queue an unparseable line
    pub fn push_malformed(&mut self, error: impl Into<String>) {
        self.incoming.push_back(Incoming::Malformed(error.into()));
    }

    /// Everything sent so far
    pub fn sent(&self) -> &[JsonRpcMessage] {
        &self.sent
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn receive(&mut self) -> Result<Option<Incoming>> {
        Ok(self.incoming.pop_front())
    }

    async fn send(&mut self, message: JsonRpcMessage) -> Result<()> {
        self.sent.push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse, RequestId};
    use serde_json::json;

    #[tokio::test]
    async fn test_line_transport_reads_and_skips_blank_lines() {
        let input: &[u8] = b"\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\nnot json\n";
        let mut transport = LineTransport::new(input, Vec::new());

        match transport.receive().await.unwrap() {
            Some(Incoming::Message(message)) => {
                assert_eq!(message.method.as_deref(), Some("ping"));
                assert_eq!(message.id, Some(RequestId::Number(1)));
            }
            other => panic!("expected message, got {:?}", other),
        }
        assert!(matches!(
            transport.receive().await.unwrap(),
            Some(Incoming::Malformed(_))
        ));
        assert!(transport.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_line_transport_writes_one_line_per_message() {
        let mut transport = LineTransport::new(&b""[..], Vec::new());
        transport
            .send(JsonRpcResponse::success(RequestId::Number(7), json!({})).into())
            .await
            .unwrap();
        transport
            .send(JsonRpcRequest::new(1i64, "ping").into())
            .await
            .unwrap();

        let (_, written) = transport.into_parts();
        let text = String::from_utf8(written).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"id\":7"));
        assert!(lines[1].contains("\"method\":\"ping\""));
    }

    #[tokio::test]
    async fn test_memory_transport() {
        let mut transport = MemoryTransport::new();
        transport.push(JsonRpcRequest::new(1i64, "tools/list"));

        let Some(Incoming::Message(message)) = transport.receive().await.unwrap() else {
            panic!("expected a message");
        };
        assert_eq!(message.method.as_deref(), Some("tools/list"));
        assert!(transport.receive().await.unwrap().is_none());

        transport
            .send(JsonRpcResponse::success(RequestId::Number(1), json!({})).into())
            .await
            .unwrap();
        assert_eq!(transport.sent().len(), 1);
    }
}

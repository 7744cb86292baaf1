//! The single connection to the controlling host.

use super::frame::{read_frame, write_frame};
use crate::{Result, WorkerError};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

type BoxedReader = Box<dyn AsyncRead + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Unpin>;

/// A framed, bidirectional connection.
///
/// Reads and writes are strictly sequential; nothing is buffered beyond the
/// frame currently being assembled.
pub struct Connection {
    reader: BoxedReader,
    writer: BoxedWriter,
}

impl Connection {
    /// Wrap any async byte stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Connect to the host. The worker is the client; the host listens.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        debug!("Connected to host at {}:{}", host, port);
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }

    /// Send raw bytes as one frame.
    pub async fn send_frame(&mut self, payload: &[u8]) -> Result<()> {
        write_frame(&mut self.writer, payload).await
    }

    /// Serialize `message` to JSON and send it as one frame.
    pub async fn send_json<T: Serialize + ?Sized>(&mut self, message: &T) -> Result<()> {
        let bytes = serde_json::to_vec(message)?;
        self.send_frame(&bytes).await
    }

    /// Receive one frame as raw bytes.
    pub async fn receive_bytes(&mut self) -> Result<Vec<u8>> {
        read_frame(&mut self.reader).await
    }

    /// Receive one frame and decode it as UTF-8 text.
    pub async fn receive_text(&mut self) -> Result<String> {
        let bytes = self.receive_bytes().await?;
        String::from_utf8(bytes).map_err(|_| WorkerError::InvalidUtf8)
    }

    /// Receive one frame and parse it as JSON.
    ///
    /// A parse failure is fatal to the connection.
    pub async fn receive_json(&mut self) -> Result<Value> {
        let text = self.receive_text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Flush and close the write side.
    pub async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_json_roundtrip_over_duplex() {
        let (a, b) = tokio::io::duplex(4096);
        let mut left = Connection::new(a);
        let mut right = Connection::new(b);

        left.send_json(&json!({"command": "get_variable_list"}))
            .await
            .unwrap();
        let received = right.receive_json().await.unwrap();
        assert_eq!(received["command"], "get_variable_list");
    }

    #[tokio::test]
    async fn test_receive_json_parse_failure_is_fatal() {
        let (a, b) = tokio::io::duplex(4096);
        let mut left = Connection::new(a);
        let mut right = Connection::new(b);

        left.send_frame(b"not valid json").await.unwrap();
        let err = right.receive_json().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_receive_text_rejects_invalid_utf8() {
        let (a, b) = tokio::io::duplex(4096);
        let mut left = Connection::new(a);
        let mut right = Connection::new(b);

        left.send_frame(&[0xff, 0xfe]).await.unwrap();
        assert!(matches!(
            right.receive_text().await,
            Err(WorkerError::InvalidUtf8)
        ));
    }

    #[tokio::test]
    async fn test_close_signals_eof_to_peer() {
        let (a, b) = tokio::io::duplex(4096);
        let mut left = Connection::new(a);
        let mut right = Connection::new(b);

        left.close().await.unwrap();
        assert!(matches!(
            right.receive_bytes().await,
            Err(WorkerError::ConnectionClosed)
        ));
    }
}

//! BLE carrier.
//!
//! GATT plumbing lives in the bridge sidecar; on desktop builds the
//! device side of the link is simulated over a Unix domain socket (the
//! bridge's `--socket` mode).

use crate::frame::{self, FrameReader};
use crate::Transport;
use async_trait::async_trait;
use krillclaw_core::{Capacity, TransportError};
use tokio::net::UnixStream;
use tracing::debug;

/// Default socket path for the bridge's BLE simulation.
pub const DEFAULT_SOCKET: &str = "/tmp/krillclaw.sock";

#[derive(Debug)]
pub struct BleTransport {
    stream: Option<UnixStream>,
    reader: FrameReader,
}

impl BleTransport {
    /// Connect to a BLE endpoint. A `device` starting with `/` is taken
    /// as a socket path; anything else (a MAC-style address) falls back
    /// to the default simulation socket, with the real radio handled by
    /// the bridge.
    pub async fn connect(device: &str) -> Result<Self, TransportError> {
        let path = if device.starts_with('/') {
            device
        } else {
            DEFAULT_SOCKET
        };
        debug!(device, path, "connecting BLE transport");
        let stream = UnixStream::connect(path).await.map_err(|e| {
            TransportError::ConnectionRefused(format!("BLE bridge at {path}: {e}"))
        })?;
        Ok(Self {
            stream: Some(stream),
            reader: FrameReader::new(Capacity::Large),
        })
    }

}

#[async_trait]
impl Transport for BleTransport {
    async fn send(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        let chunks = frame::ble_chunks(payload)?;
        let stream = self
            .stream
            .as_mut()
            .ok_or(TransportError::ConnectionClosed)?;
        for chunk in &chunks {
            frame::write_frame(stream, chunk).await?;
        }
        debug!(bytes = payload.len(), chunks = chunks.len(), "BLE request sent");
        self.reader.read_frame(stream).await
    }

    async fn write(&mut self, _payload: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("streaming"))
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        Err(TransportError::Unsupported("streaming"))
    }

    async fn close(&mut self) {
        self.stream.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    /// A minimal bridge stand-in: reads one frame, echoes it reversed.
    async fn echo_bridge(listener: UnixListener) {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut len = [0u8; 2];
        sock.read_exact(&mut len).await.unwrap();
        let mut payload = vec![0u8; u16::from_be_bytes(len) as usize];
        sock.read_exact(&mut payload).await.unwrap();
        payload.reverse();
        let frame = frame::encode_frame(&payload).unwrap();
        sock.write_all(&frame).await.unwrap();
    }

    #[tokio::test]
    async fn send_roundtrips_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ble.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(echo_bridge(listener));

        let mut t = BleTransport::connect(path.to_str().unwrap()).await.unwrap();
        let reply = t.send(b"abc").await.unwrap();
        assert_eq!(reply, b"cba");
        t.close().await;
        t.close().await; // idempotent
    }

    #[tokio::test]
    async fn connect_refused_maps_cleanly() {
        let err = BleTransport::connect("/tmp/krillclaw-definitely-missing.sock")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ConnectionRefused(_)));
    }

    #[tokio::test]
    async fn streaming_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ble2.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let mut t = BleTransport::connect(path.to_str().unwrap()).await.unwrap();
        assert!(matches!(
            t.write(b"x").await,
            Err(TransportError::Unsupported(_))
        ));
        assert!(matches!(
            t.read().await,
            Err(TransportError::Unsupported(_))
        ));
    }
}

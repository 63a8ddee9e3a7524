//! Serial carrier: the port device file, put into raw mode with `stty`,
//! carrying length-prefixed frames.

use crate::frame::{self, FrameReader};
use crate::Transport;
use async_trait::async_trait;
use krillclaw_core::{Capacity, TransportError};
use tokio::fs::File;
use tracing::debug;

pub struct SerialTransport {
    file: Option<File>,
    reader: FrameReader,
}

impl SerialTransport {
    /// Open `port` (e.g. `/dev/ttyUSB0`) at `baud`.
    pub async fn open(port: &str, baud: u32) -> Result<Self, TransportError> {
        configure_line(port, baud).await?;
        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(port)
            .await
            .map_err(|e| TransportError::ConnectionRefused(format!("{port}: {e}")))?;
        debug!(port, baud, "serial transport open");
        Ok(Self {
            file: Some(file),
            reader: FrameReader::new(Capacity::Large),
        })
    }
}

/// Put the serial line into raw mode at the requested speed.
async fn configure_line(port: &str, baud: u32) -> Result<(), TransportError> {
    let status = tokio::process::Command::new("stty")
        .args(["-F", port, &baud.to_string(), "raw", "-echo"])
        .status()
        .await
        .map_err(|e| TransportError::ConnectionRefused(format!("stty: {e}")))?;
    if !status.success() {
        return Err(TransportError::ConnectionRefused(format!(
            "stty failed for {port} at {baud} baud"
        )));
    }
    Ok(())
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        let file = self
            .file
            .as_mut()
            .ok_or(TransportError::ConnectionClosed)?;
        frame::write_frame(file, payload).await?;
        self.reader.read_frame(file).await
    }

    async fn write(&mut self, _payload: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("streaming"))
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        Err(TransportError::Unsupported("streaming"))
    }

    async fn close(&mut self) {
        self.file.take();
    }
}

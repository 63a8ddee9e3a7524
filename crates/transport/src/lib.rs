//! Byte-pipe transports for non-HTTP carriers.
//!
//! Requests travel as length-prefixed frames over BLE or serial to an
//! out-of-process bridge, wrapped in the RPC envelopes of [`envelope`].

pub mod envelope;
pub mod frame;

#[cfg(unix)]
pub mod ble;
#[cfg(unix)]
pub mod serial;

use async_trait::async_trait;
use krillclaw_core::TransportError;
use std::str::FromStr;

#[cfg(unix)]
pub use ble::BleTransport;
#[cfg(unix)]
pub use serial::SerialTransport;

/// Which carrier the runtime should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    Ble,
    Serial,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Http => "http",
            TransportKind::Ble => "ble",
            TransportKind::Serial => "serial",
        }
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(TransportKind::Http),
            "ble" => Ok(TransportKind::Ble),
            "serial" => Ok(TransportKind::Serial),
            other => Err(format!(
                "unknown transport '{other}' (expected http, ble, or serial)"
            )),
        }
    }
}

/// An abstract request/response byte pipe.
///
/// `send` is the one-shot path every carrier supports. The `write`/
/// `read` streaming pair exists for the HTTP/SSE path and is refused by
/// the framed carriers. `close` is idempotent.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one message and wait for the single response message.
    async fn send(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Begin a request whose response will be streamed via `read`.
    async fn write(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Next chunk of response bytes; `Ok(None)` means end of stream.
    async fn read(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Release the connection. Safe to call more than once.
    async fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kind_parsing() {
        assert_eq!("http".parse::<TransportKind>().unwrap(), TransportKind::Http);
        assert_eq!("BLE".parse::<TransportKind>().unwrap(), TransportKind::Ble);
        assert_eq!(
            "serial".parse::<TransportKind>().unwrap(),
            TransportKind::Serial
        );
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }
}

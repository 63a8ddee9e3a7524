//! Length-prefixed framing and BLE chunking.
//!
//! Every message on a framed carrier is `[u16 big-endian length]` plus
//! payload. BLE writes split payloads exceeding the 244-byte MTU into
//! chunks with a 2-byte `[chunk_index, total_chunks]` header; responses
//! are expected in a single frame (receive-side reassembly is out of
//! contract).

use krillclaw_core::{Arena, Capacity, TransportError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload a single frame can carry.
pub const MAX_FRAME: usize = u16::MAX as usize;

/// BLE 5.x payload MTU assumed by the chunker.
pub const BLE_MTU: usize = 244;

/// Data bytes per BLE chunk once the 2-byte header is accounted for.
pub const BLE_CHUNK_DATA: usize = BLE_MTU - 2;

/// Encode one frame: length prefix + payload.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    if payload.len() > MAX_FRAME {
        return Err(TransportError::MessageTooLarge {
            len: payload.len(),
            max: MAX_FRAME,
        });
    }
    let mut out = Vec::with_capacity(2 + payload.len());
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Split a payload into BLE chunks, each prefixed with
/// `[chunk_index, total_chunks]`. Payloads that fit one MTU are passed
/// through as a single headerless unit.
pub fn ble_chunks(payload: &[u8]) -> Result<Vec<Vec<u8>>, TransportError> {
    if payload.len() <= BLE_MTU {
        return Ok(vec![payload.to_vec()]);
    }
    let total = payload.len().div_ceil(BLE_CHUNK_DATA);
    if total > u8::MAX as usize {
        return Err(TransportError::MessageTooLarge {
            len: payload.len(),
            max: BLE_CHUNK_DATA * u8::MAX as usize,
        });
    }
    let mut chunks = Vec::with_capacity(total);
    for (index, data) in payload.chunks(BLE_CHUNK_DATA).enumerate() {
        let mut chunk = Vec::with_capacity(2 + data.len());
        chunk.push(index as u8);
        chunk.push(total as u8);
        chunk.extend_from_slice(data);
        chunks.push(chunk);
    }
    Ok(chunks)
}

/// Write one framed message to the carrier.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), TransportError> {
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads framed messages, staging each payload in an arena that is
/// reset between frames. Returned bytes are copied out of the arena;
/// the staging buffer is reused for the next frame.
#[derive(Debug)]
pub struct FrameReader {
    arena: Arena,
}

impl FrameReader {
    pub fn new(capacity: Capacity) -> Self {
        Self {
            arena: Arena::new(capacity),
        }
    }

    /// Read one complete frame. Fails with `MessageTooLarge` when the
    /// advertised length exceeds the staging arena.
    pub async fn read_frame<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut R,
    ) -> Result<Vec<u8>, TransportError> {
        let mut len_buf = [0u8; 2];
        if let Err(e) = reader.read_exact(&mut len_buf).await {
            return Err(if e.kind() == std::io::ErrorKind::UnexpectedEof {
                TransportError::ConnectionClosed
            } else {
                TransportError::Io(e)
            });
        }
        let len = u16::from_be_bytes(len_buf) as usize;

        self.arena.reset();
        let range = self
            .arena
            .alloc(len, 1)
            .map_err(|_| TransportError::MessageTooLarge {
                len,
                max: self.arena.capacity(),
            })?;
        if let Err(e) = reader.read_exact(self.arena.slice_mut(range.clone())).await {
            return Err(if e.kind() == std::io::ErrorKind::UnexpectedEof {
                TransportError::ConnectionClosed
            } else {
                TransportError::Io(e)
            });
        }
        Ok(self.arena.slice(range).to_vec())
    }

    /// High-water mark of the staging arena, for diagnostics.
    pub fn peak_usage(&self) -> usize {
        self.arena.peak()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_roundtrip() {
        let frame = encode_frame(b"hello").unwrap();
        assert_eq!(&frame[..2], &[0, 5]);
        assert_eq!(&frame[2..], b"hello");
    }

    #[test]
    fn frame_length_is_big_endian() {
        let payload = vec![0u8; 0x0102];
        let frame = encode_frame(&payload).unwrap();
        assert_eq!(&frame[..2], &[0x01, 0x02]);
    }

    #[test]
    fn oversize_frame_rejected() {
        let payload = vec![0u8; MAX_FRAME + 1];
        assert!(matches!(
            encode_frame(&payload),
            Err(TransportError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn small_payload_is_one_headerless_chunk() {
        let chunks = ble_chunks(&[7u8; 244]).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 244);
    }

    #[test]
    fn large_payload_chunked_with_headers() {
        let payload = vec![9u8; 600];
        let chunks = ble_chunks(&payload).unwrap();
        // 600 bytes at 242 per chunk → 3 chunks
        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk[0] as usize, i);
            assert_eq!(chunk[1], 3);
            assert!(chunk.len() <= BLE_MTU);
        }
        let reassembled: Vec<u8> = chunks.iter().flat_map(|c| c[2..].to_vec()).collect();
        assert_eq!(reassembled, payload);
    }

    #[tokio::test]
    async fn reader_roundtrips_frames() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"first").await.unwrap();
        write_frame(&mut wire, b"second message").await.unwrap();

        let mut reader = FrameReader::new(Capacity::Tiny);
        let mut cursor = std::io::Cursor::new(wire);
        assert_eq!(reader.read_frame(&mut cursor).await.unwrap(), b"first");
        assert_eq!(
            reader.read_frame(&mut cursor).await.unwrap(),
            b"second message"
        );
        assert!(matches!(
            reader.read_frame(&mut cursor).await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn reader_rejects_frames_beyond_arena() {
        // Advertise an 8 KiB payload to a 4 KiB arena
        let mut wire = vec![0x20, 0x00];
        wire.extend_from_slice(&vec![0u8; 0x2000]);

        let mut reader = FrameReader::new(Capacity::Tiny);
        let mut cursor = std::io::Cursor::new(wire);
        assert!(matches!(
            reader.read_frame(&mut cursor).await,
            Err(TransportError::MessageTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn reader_arena_is_reused() {
        let mut wire = Vec::new();
        write_frame(&mut wire, &[1u8; 100]).await.unwrap();
        write_frame(&mut wire, &[2u8; 50]).await.unwrap();

        let mut reader = FrameReader::new(Capacity::Tiny);
        let mut cursor = std::io::Cursor::new(wire);
        reader.read_frame(&mut cursor).await.unwrap();
        reader.read_frame(&mut cursor).await.unwrap();
        assert_eq!(reader.peak_usage(), 100);
    }
}

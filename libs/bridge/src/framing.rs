use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::BridgeError;

/// Upper bound for a single frame unless configured otherwise.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

const HEADER_BYTES: usize = 4;

/// `u32` big-endian length header followed by the payload.
#[derive(Debug, Clone, Copy)]
pub struct LengthPrefixed {
    max_payload: usize,
}

impl Default for LengthPrefixed {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl LengthPrefixed {
    /// `max_payload == 0` means no limit beyond the header width.
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    fn check(&self, len: usize) -> Result<(), BridgeError> {
        let max = if self.max_payload == 0 {
            u32::MAX as usize
        } else {
            self.max_payload.min(u32::MAX as usize)
        };
        if len > max {
            return Err(BridgeError::FrameTooLarge { len, max });
        }
        Ok(())
    }

    pub fn encode(&self, data: &[u8], buf: &mut Vec<u8>) -> Result<(), BridgeError> {
        self.check(data.len())?;
        buf.reserve(HEADER_BYTES + data.len());
        buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
        buf.extend_from_slice(data);
        Ok(())
    }

    /// Read one frame. `Ok(None)` when the peer closed cleanly between frames.
    pub async fn read_frame<R>(&self, reader: &mut R) -> Result<Option<Vec<u8>>, BridgeError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; HEADER_BYTES];
        match reader.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(header) as usize;
        self.check(len)?;

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                BridgeError::ConnectionClosed
            } else {
                BridgeError::Io(e)
            }
        })?;
        Ok(Some(payload))
    }

    pub async fn write_frame<W>(&self, writer: &mut W, data: &[u8]) -> Result<(), BridgeError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut buf = Vec::new();
        self.encode(data, &mut buf)?;
        writer.write_all(&buf).await?;
        writer.flush().await?;
        Ok(())
    }
}

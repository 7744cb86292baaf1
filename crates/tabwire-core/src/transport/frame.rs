//! Length-prefixed framing.
//!
//! ```text
//! [u32 BE: len][payload bytes of len]
//! ```
//!
//! The payload is either UTF-8 text (JSON control messages, CSV bodies) or
//! raw bytes (Arrow IPC streams). Framing does not care which.

use crate::config::ProtocolConfig;
use crate::{Result, WorkerError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Read one frame from an async reader.
///
/// `read_exact` keeps reading across short socket reads until the whole
/// payload has arrived. A peer that closes mid-frame yields
/// [`WorkerError::ConnectionClosed`].
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; ProtocolConfig::LENGTH_PREFIX_SIZE];
    reader.read_exact(&mut len_buf).await?;

    let len = u32::from_be_bytes(len_buf) as usize;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(payload)
}

/// Write one frame to an async writer.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > ProtocolConfig::MAX_FRAME_SIZE {
        return Err(WorkerError::FrameTooLarge {
            len: payload.len(),
            max: ProtocolConfig::MAX_FRAME_SIZE,
        });
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

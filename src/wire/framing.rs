//! Async frame I/O: header first in one write, payload second, blocking
//! (`.await`ing) full-length reads on the way in. Any short read, short
//! write, or `data_length` mismatch is a [`ScriptoriumError::NetworkError`]
//! and the caller is expected to drop the connection — there is no
//! partial-frame retry, per the specification's framing contract.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, ScriptoriumError};
use crate::wire::header::{Header, HEADER_SIZE};

/// A decoded frame: header plus whatever payload bytes `data_length`
/// promised.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(header: Header, payload: Vec<u8>) -> Self {
        let header = header.with_data_length(payload.len() as u32);
        Self { header, payload }
    }

    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Reads one frame from `reader`. Returns `Ok(None)` on a clean EOF before
/// any header bytes arrive (orderly disconnect); any other short read is a
/// [`ScriptoriumError::NetworkError`].
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Frame>> {
    let mut header_buf = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        let n = reader
            .read(&mut header_buf[filled..])
            .await
            .map_err(|_| ScriptoriumError::NetworkError)?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(ScriptoriumError::NetworkError);
        }
        filled += n;
    }

    let header = Header::decode(&header_buf).ok_or(ScriptoriumError::NetworkError)?;

    let mut payload = vec![0u8; header.data_length as usize];
    if !payload.is_empty() {
        reader
            .read_exact(&mut payload)
            .await
            .map_err(|_| ScriptoriumError::NetworkError)?;
    }

    Ok(Some(Frame { header, payload }))
}

/// Writes `frame` to `writer`: header first in one write, payload second.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> Result<()> {
    let encoded = frame.header.encode();
    writer
        .write_all(&encoded)
        .await
        .map_err(|_| ScriptoriumError::NetworkError)?;
    if !frame.payload.is_empty() {
        writer
            .write_all(&frame.payload)
            .await
            .map_err(|_| ScriptoriumError::NetworkError)?;
    }
    writer.flush().await.map_err(|_| ScriptoriumError::NetworkError)?;
    Ok(())
}

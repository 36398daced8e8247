use bytes::Bytes;
use tokio::io::{self, AsyncReadExt, AsyncWriteExt};

use crate::backend::WireFrame;

/// Wire framing for the TCP backend: a `u32` LE part count, then for each
/// part a `u32` LE length followed by that many bytes. Part 0 is the JSON
/// header per `mflow_core::RawFrame`; this module only moves bytes, it does
/// not interpret them.
pub async fn write_frame<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &WireFrame,
) -> io::Result<()> {
    writer.write_u32_le(frame.len() as u32).await?;
    for part in frame {
        writer.write_u32_le(part.len() as u32).await?;
        writer.write_all(part).await?;
    }
    writer.flush().await
}

/// Maximum part count / part length accepted while reading, guarding
/// against a corrupt length prefix turning into an unbounded allocation.
const MAX_PARTS: u32 = 1024;
const MAX_PART_LEN: u32 = 256 * 1024 * 1024;

pub async fn read_frame<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
) -> io::Result<WireFrame> {
    let part_count = reader.read_u32_le().await?;
    if part_count > MAX_PARTS {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame part count {part_count} exceeds limit"),
        ));
    }
    let mut parts = Vec::with_capacity(part_count as usize);
    for _ in 0..part_count {
        let len = reader.read_u32_le().await?;
        if len > MAX_PART_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame part length {len} exceeds limit"),
            ));
        }
        let mut buf = vec![0u8; len as usize];
        reader.read_exact(&mut buf).await?;
        parts.push(Bytes::from(buf));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_multi_part_frame() {
        let frame: WireFrame = vec![Bytes::from_static(b"{}"), Bytes::from_static(b"payload")];
        let mut buf = Vec::new();
        write_frame(&mut buf, &frame).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded = read_frame(&mut cursor).await.unwrap();
        assert_eq!(decoded, frame);
    }

    #[tokio::test]
    async fn rejects_absurd_part_count() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_PARTS + 1).to_le_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        assert!(read_frame(&mut cursor).await.is_err());
    }
}

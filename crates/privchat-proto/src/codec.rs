//! Async frame read/write over a byte stream.
//!
//! TCP gives no message boundaries: a frame may arrive split across several
//! reads or coalesced with its neighbors. The reader here is explicit about
//! reassembly: it reads exactly [`Frame::HEADER_SIZE`] bytes, validates the
//! header, then reads exactly the claimed payload length. EOF at a frame
//! boundary or mid-frame both surface as `ConnectionClosed`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{CmdType, Frame, ProtocolError};

/// Read one complete frame, blocking until it is available.
///
/// # Errors
///
/// - `ConnectionClosed` if the stream ends (cleanly or mid-frame)
/// - `UnknownCommand` / `FrameTooLarge` for invalid headers; the caller must
///   close the connection, the stream position is no longer trustworthy
/// - `Io` for any other transport failure
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; Frame::HEADER_SIZE];
    read_exact_or_closed(reader, &mut header).await?;

    let cmd = CmdType::from_u8(header[0]).ok_or(ProtocolError::UnknownCommand(header[0]))?;

    let mut len_buf = [0u8; 4];
    len_buf.copy_from_slice(&header[1..]);
    let payload_len = u32::from_be_bytes(len_buf) as usize;

    if payload_len > Frame::MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: payload_len,
            max: Frame::MAX_PAYLOAD_SIZE,
        });
    }

    let mut payload = vec![0u8; payload_len];
    read_exact_or_closed(reader, &mut payload).await?;

    Ok(Frame::new(cmd, payload))
}

/// Write one frame and flush it.
///
/// # Errors
///
/// `FrameTooLarge` for oversized payloads, `Io` for transport failures.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(Frame::HEADER_SIZE + frame.payload.len());
    frame.encode(&mut buf)?;

    writer.write_all(&buf).await?;
    writer.flush().await?;

    Ok(())
}

/// `read_exact` that maps EOF to `ConnectionClosed`.
async fn read_exact_or_closed<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(ProtocolError::ConnectionClosed)
        },
        Err(e) => Err(ProtocolError::Io(e)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);

        let frame = Frame::data("over the wire");
        write_frame(&mut a, &frame).await.unwrap();

        let parsed = read_frame(&mut b).await.unwrap();
        assert_eq!(parsed, frame);
    }

    #[tokio::test]
    async fn reassembles_fragmented_frame() {
        let (mut a, mut b) = tokio::io::duplex(1024);

        let frame = Frame::data("fragmented");
        let mut wire = Vec::new();
        frame.encode(&mut wire).unwrap();

        let reader = tokio::spawn(async move { read_frame(&mut b).await });

        // One byte per write: the reader must not assume one read per frame.
        for byte in wire {
            a.write_all(&[byte]).await.unwrap();
            a.flush().await.unwrap();
        }

        let parsed = reader.await.unwrap().unwrap();
        assert_eq!(parsed, frame);
    }

    #[tokio::test]
    async fn coalesced_frames_decode_in_order() {
        let (mut a, mut b) = tokio::io::duplex(4096);

        let first = Frame::data("first");
        let second = Frame::data("second");

        let mut wire = Vec::new();
        first.encode(&mut wire).unwrap();
        second.encode(&mut wire).unwrap();
        a.write_all(&wire).await.unwrap();

        assert_eq!(read_frame(&mut b).await.unwrap(), first);
        assert_eq!(read_frame(&mut b).await.unwrap(), second);
    }

    #[tokio::test]
    async fn eof_at_boundary_is_connection_closed() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);

        let result = read_frame(&mut b).await;
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn eof_mid_frame_is_connection_closed() {
        let (mut a, mut b) = tokio::io::duplex(64);

        let frame = Frame::data("cut short");
        let mut wire = Vec::new();
        frame.encode(&mut wire).unwrap();

        a.write_all(&wire[..wire.len() - 2]).await.unwrap();
        drop(a);

        let result = read_frame(&mut b).await;
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn oversized_header_rejected_before_allocation() {
        let (mut a, mut b) = tokio::io::duplex(64);

        let mut header = vec![CmdType::Data.to_u8()];
        header.extend_from_slice(&(Frame::MAX_PAYLOAD_SIZE as u32 + 1).to_be_bytes());
        a.write_all(&header).await.unwrap();

        let result = read_frame(&mut b).await;
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
    }
}

// Framed receive/send over a split TCP connection. See component design
// §4.7: a fixed 19-byte header read followed by a body read of
// `total_length - 19` bytes, each resilient to short reads by requesting
// only the bytes still outstanding on every attempt.

use anyhow::Result;
use byteorder::{BigEndian, WriteBytesExt};
use num_traits::FromPrimitive;
use std::io::Cursor;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use super::messages::{BGPMessageBody, Message};
use super::types::{MessageType, HEADER_LENGTH, MARKER};
use crate::error::FsmError;

async fn read_exact_resilient(reader: &mut OwnedReadHalf, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await.map_err(FsmError::Io)?;
        if n == 0 {
            return Err(FsmError::Framing(format!(
                "connection closed after {} of {} bytes",
                filled,
                buf.len()
            ))
            .into());
        }
        filled += n;
    }
    Ok(())
}

struct FramedHeader {
    message_type: MessageType,
    body_length: usize,
}

async fn read_header(reader: &mut OwnedReadHalf) -> Result<FramedHeader> {
    let mut header = [0u8; HEADER_LENGTH];
    read_exact_resilient(reader, &mut header).await?;

    if header[0..16] != MARKER {
        return Err(FsmError::Framing("invalid BGP marker".to_string()).into());
    }

    let mut length_bytes = [0u8; 2];
    length_bytes.copy_from_slice(&header[16..18]);
    let total_length = u16::from_be_bytes(length_bytes) as usize;
    if total_length < HEADER_LENGTH {
        return Err(FsmError::Framing(format!(
            "BGP message length {} shorter than the {} byte header",
            total_length, HEADER_LENGTH
        ))
        .into());
    }

    let message_type = MessageType::from_u8(header[18]).ok_or_else(|| {
        FsmError::Framing(format!("unknown BGP message type {}", header[18]))
    })?;

    Ok(FramedHeader {
        message_type,
        body_length: total_length - HEADER_LENGTH,
    })
}

/// Read exactly one framed BGP message: header, then body, then hand the
/// body to the message decoder.
pub async fn read_message(reader: &mut OwnedReadHalf) -> Result<BGPMessageBody> {
    let header = read_header(reader).await?;
    let mut body = vec![0u8; header.body_length];
    read_exact_resilient(reader, &mut body).await?;
    Message::decode_body(header.message_type, body)
}

fn encode_message(body: BGPMessageBody) -> Vec<u8> {
    let message_type = body.message_type();
    let payload: Vec<u8> = body.into();
    let total_length = (HEADER_LENGTH + payload.len()) as u16;

    let mut buf = Cursor::new(Vec::with_capacity(total_length as usize));
    std::io::Write::write_all(&mut buf, &MARKER).unwrap();
    WriteBytesExt::write_u16::<BigEndian>(&mut buf, total_length).unwrap();
    WriteBytesExt::write_u8(&mut buf, message_type as u8).unwrap();
    std::io::Write::write_all(&mut buf, &payload).unwrap();
    buf.into_inner()
}

pub async fn write_message(writer: &mut OwnedWriteHalf, body: BGPMessageBody) -> Result<()> {
    let bytes = encode_message(body);
    writer.write_all(&bytes).await.map_err(FsmError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgp::messages::BGPKeepaliveMessage;

    #[test]
    fn header_length_matches_body_plus_nineteen() {
        let body = BGPMessageBody::Keepalive(BGPKeepaliveMessage::default());
        let bytes = encode_message(body);
        assert_eq!(bytes.len(), HEADER_LENGTH);
        let mut length_bytes = [0u8; 2];
        length_bytes.copy_from_slice(&bytes[16..18]);
        assert_eq!(u16::from_be_bytes(length_bytes) as usize, bytes.len());
    }
}

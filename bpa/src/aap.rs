/*!
The Application Agent Protocol (C11, §4.10): the length-prefixed binary
protocol an application uses to register for, send, and receive bundles
over a local stream socket.

Grounded on the wire table in SPEC_FULL.md's component design and on
`original_source/components/aap/aap.c` for the keepalive semantics (a PING
received on either side is answered with PING) that the message table alone
doesn't capture.
*/

use thiserror::Error;

pub const VERSION: u8 = 1;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown AAP message type {0}")]
    UnknownType(u8),
    #[error("unsupported AAP protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("message body truncated")]
    Truncated,
    #[error("payload of {0} bytes exceeds the configured maximum of {1}")]
    PayloadTooLarge(u64, u64),
}

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Ack,
    Nack,
    Register { eid: String },
    SendBundle { eid: String, payload: Box<[u8]> },
    RecvBundle { source: String, payload: Box<[u8]> },
    SendConfirm { bundle_id: u64 },
    CancelBundle { bundle_id: u64 },
    Welcome { eid: String },
    Ping,
}

impl Message {
    fn type_code(&self) -> u8 {
        match self {
            Message::Ack => 0x0,
            Message::Nack => 0x1,
            Message::Register { .. } => 0x2,
            Message::SendBundle { .. } => 0x3,
            Message::RecvBundle { .. } => 0x4,
            Message::SendConfirm { .. } => 0x5,
            Message::CancelBundle { .. } => 0x6,
            Message::Welcome { .. } => 0x7,
            Message::Ping => 0x8,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![(VERSION << 4) | self.type_code()];
        match self {
            Message::Ack | Message::Nack | Message::Ping => {}
            Message::Register { eid } | Message::Welcome { eid } => {
                encode_eid(&mut out, eid);
            }
            Message::SendBundle { eid, payload } => {
                encode_eid(&mut out, eid);
                out.extend_from_slice(&(payload.len() as u64).to_be_bytes());
                out.extend_from_slice(payload);
            }
            Message::RecvBundle { source, payload } => {
                encode_eid(&mut out, source);
                out.extend_from_slice(&(payload.len() as u64).to_be_bytes());
                out.extend_from_slice(payload);
            }
            Message::SendConfirm { bundle_id } | Message::CancelBundle { bundle_id } => {
                out.extend_from_slice(&bundle_id.to_be_bytes());
            }
        }
        out
    }

    /// Decodes one complete message from `data`, which must hold exactly
    /// one message's worth of bytes (the caller is responsible for framing
    /// via the length fields, as §4.10 describes a byte-streaming parser
    /// with states rather than a single-shot length-prefixed envelope).
    pub fn decode(data: &[u8], max_payload_length: u64) -> Result<Self> {
        let &[header, ref rest @ ..] = data else {
            return Err(Error::Truncated);
        };
        let version = header >> 4;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let type_code = header & 0x0F;
        match type_code {
            0x0 => Ok(Message::Ack),
            0x1 => Ok(Message::Nack),
            0x2 => decode_eid(rest).map(|(eid, _)| Message::Register { eid }),
            0x3 => decode_eid_and_payload(rest, max_payload_length)
                .map(|(eid, payload, _)| Message::SendBundle { eid, payload }),
            0x4 => decode_eid_and_payload(rest, max_payload_length)
                .map(|(source, payload, _)| Message::RecvBundle { source, payload }),
            0x5 => decode_bundle_id(rest).map(|id| Message::SendConfirm { bundle_id: id }),
            0x6 => decode_bundle_id(rest).map(|id| Message::CancelBundle { bundle_id: id }),
            0x7 => decode_eid(rest).map(|(eid, _)| Message::Welcome { eid }),
            0x8 => Ok(Message::Ping),
            other => Err(Error::UnknownType(other)),
        }
    }

    /// A `PING` is answered with a `PING` on either side of the
    /// connection; every other message type has no automatic reply.
    pub fn keepalive_reply(&self) -> Option<Message> {
        matches!(self, Message::Ping).then_some(Message::Ping)
    }
}

fn encode_eid(out: &mut Vec<u8>, eid: &str) {
    out.extend_from_slice(&(eid.len() as u16).to_be_bytes());
    out.extend_from_slice(eid.as_bytes());
}

fn decode_eid(data: &[u8]) -> Result<(String, &[u8])> {
    if data.len() < 2 {
        return Err(Error::Truncated);
    }
    let len = u16::from_be_bytes([data[0], data[1]]) as usize;
    let rest = &data[2..];
    if rest.len() < len {
        return Err(Error::Truncated);
    }
    let eid = String::from_utf8_lossy(&rest[..len]).into_owned();
    Ok((eid, &rest[len..]))
}

fn decode_eid_and_payload(data: &[u8], max_payload_length: u64) -> Result<(String, Box<[u8]>, &[u8])> {
    let (eid, rest) = decode_eid(data)?;
    if rest.len() < 8 {
        return Err(Error::Truncated);
    }
    let payload_len = u64::from_be_bytes(rest[..8].try_into().unwrap());
    if payload_len > max_payload_length {
        return Err(Error::PayloadTooLarge(payload_len, max_payload_length));
    }
    let rest = &rest[8..];
    if (rest.len() as u64) < payload_len {
        return Err(Error::Truncated);
    }
    let payload = rest[..payload_len as usize].to_vec().into_boxed_slice();
    Ok((eid, payload, &rest[payload_len as usize..]))
}

fn decode_bundle_id(data: &[u8]) -> Result<u64> {
    if data.len() < 8 {
        return Err(Error::Truncated);
    }
    Ok(u64::from_be_bytes(data[..8].try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_register() {
        let msg = Message::Register {
            eid: "dtn://node1/mail".into(),
        };
        let encoded = msg.encode();
        assert_eq!(Message::decode(&encoded, 4096).unwrap(), msg);
    }

    #[test]
    fn round_trips_send_bundle() {
        let msg = Message::SendBundle {
            eid: "ipn:2.1".into(),
            payload: Box::new([1, 2, 3, 4]),
        };
        let encoded = msg.encode();
        assert_eq!(Message::decode(&encoded, 4096).unwrap(), msg);
    }

    #[test]
    fn rejects_a_payload_over_the_configured_maximum() {
        let msg = Message::SendBundle {
            eid: "ipn:2.1".into(),
            payload: Box::new([0u8; 16]),
        };
        let encoded = msg.encode();
        assert!(matches!(
            Message::decode(&encoded, 4),
            Err(Error::PayloadTooLarge(16, 4))
        ));
    }

    #[test]
    fn ping_is_answered_with_ping_and_ack_is_not() {
        assert_eq!(Message::Ping.keepalive_reply(), Some(Message::Ping));
        assert_eq!(Message::Ack.keepalive_reply(), None);
    }

    #[test]
    fn rejects_an_unsupported_version() {
        let bytes = [0x20u8]; // version 2, type ACK
        assert!(matches!(
            Message::decode(&bytes, 4096),
            Err(Error::UnsupportedVersion(2))
        ));
    }
}

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header flags
pub mod flags {
    /// The acknowledgment field carries a value set by the receiver.
    pub const ACK_PRESENT: u8 = 0x01;

    pub const KNOWN: u8 = ACK_PRESENT;
}

/// seq(4) + flags(1) + ack(4) + payload_len(2)
pub const HEADER_LEN: usize = 11;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Header {
    /// Sequence number, counted in packets.
    pub seq_num: u32,
    /// Cumulative acknowledgment: the next sequence number the receiver expects.
    /// Absent until the receiver sets it.
    pub ack_num: Option<u32>,
}

impl Header {
    pub fn new(seq: u32) -> Self {
        Self {
            seq_num: seq,
            ack_num: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Vec<u8>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("datagram of {0} bytes is shorter than the packet header")]
    Truncated(usize),
    #[error("header announces {declared} payload bytes but {actual} follow")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("unknown header flags {0:#04x}")]
    UnknownFlags(u8),
    #[error("payload of {0} bytes does not fit the length field")]
    PayloadTooLarge(usize),
}

impl Packet {
    pub fn new(header: Header, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    /// Data packet with no acknowledgment set.
    pub fn new_data(seq: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            header: Header::new(seq),
            payload: payload.into(),
        }
    }

    /// Stamp the cumulative acknowledgment, leaving everything else untouched.
    pub fn set_ack(&mut self, ack: u32) {
        self.header.ack_num = Some(ack);
    }

    pub fn seq_num(&self) -> u32 {
        self.header.seq_num
    }

    pub fn ack_num(&self) -> Option<u32> {
        self.header.ack_num
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Serialize into the big-endian wire layout:
    ///
    /// ```text
    /// seq_num (u32) | flags (u8) | ack_num (u32) | payload_len (u16) | payload
    /// ```
    ///
    /// An absent acknowledgment is written as zero with `ACK_PRESENT` cleared.
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let payload_len = u16::try_from(self.payload.len())
            .map_err(|_| CodecError::PayloadTooLarge(self.payload.len()))?;

        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u32(self.header.seq_num);
        match self.header.ack_num {
            Some(ack) => {
                buf.put_u8(flags::ACK_PRESENT);
                buf.put_u32(ack);
            }
            None => {
                buf.put_u8(0);
                buf.put_u32(0);
            }
        }
        buf.put_u16(payload_len);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < HEADER_LEN {
            return Err(CodecError::Truncated(buf.len()));
        }

        let seq_num = buf.get_u32();
        let header_flags = buf.get_u8();
        if header_flags & !flags::KNOWN != 0 {
            return Err(CodecError::UnknownFlags(header_flags));
        }
        let raw_ack = buf.get_u32();
        let declared = buf.get_u16() as usize;
        if declared != buf.remaining() {
            return Err(CodecError::LengthMismatch {
                declared,
                actual: buf.remaining(),
            });
        }

        let ack_num = (header_flags & flags::ACK_PRESENT != 0).then_some(raw_ack);
        Ok(Self {
            header: Header { seq_num, ack_num },
            payload: buf.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_reverses_encode() {
        let mut acked = Packet::new_data(7, b"Hello World".to_vec());
        acked.set_ack(8);

        for packet in [
            Packet::new_data(0, Vec::new()),
            Packet::new_data(u32::MAX, b"x".to_vec()),
            acked,
        ] {
            let bytes = packet.encode().unwrap();
            assert_eq!(bytes.len(), HEADER_LEN + packet.len());
            assert_eq!(Packet::decode(&bytes).unwrap(), packet);
        }
    }

    #[test]
    fn ack_zero_is_distinct_from_absent() {
        let mut packet = Packet::new_data(0, Vec::new());
        packet.set_ack(0);

        let decoded = Packet::decode(&packet.encode().unwrap()).unwrap();
        assert_eq!(decoded.ack_num(), Some(0));
    }

    #[test]
    fn rejects_truncated_header() {
        assert_eq!(Packet::decode(&[0, 0, 0]), Err(CodecError::Truncated(3)));
    }

    #[test]
    fn rejects_payload_length_mismatch() {
        let bytes = Packet::new_data(1, b"abc".to_vec()).encode().unwrap();
        let err = Packet::decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert_eq!(
            err,
            CodecError::LengthMismatch {
                declared: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn rejects_unknown_flags() {
        let mut bytes = Packet::new_data(1, Vec::new()).encode().unwrap().to_vec();
        bytes[4] = 0x80;
        assert_eq!(Packet::decode(&bytes), Err(CodecError::UnknownFlags(0x80)));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let packet = Packet::new_data(1, vec![0u8; u16::MAX as usize + 1]);
        assert!(matches!(
            packet.encode(),
            Err(CodecError::PayloadTooLarge(_))
        ));
    }
}

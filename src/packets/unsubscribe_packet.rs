use std::fmt;

use log::debug;

use crate::{buffer::PacketBuffer, protocol::PacketKind};

use super::{
    subscribe_packet::validate_topic_filters, CommonPacketError, EncodablePacket, Packet,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub topics: Vec<String>,
}

impl UnsubscribePacket {
    pub fn new(packet_id: u16, topics: Vec<String>) -> Self {
        Self { packet_id, topics }
    }
}

#[derive(Debug)]
pub enum UnsubscribePacketEncodeError {
    Common(CommonPacketError),
    ZeroPacketId,
    InvalidTopicFilter(Option<String>),
}

impl UnsubscribePacketEncodeError {
    /// Numeric failure code of the UNSUBSCRIBE encoder.
    pub fn code(&self) -> u8 {
        match self {
            Self::ZeroPacketId => 1,
            Self::InvalidTopicFilter(_) => 2,
            Self::Common(CommonPacketError::BufferUnavailable) => 3,
            Self::Common(_) => 4,
        }
    }
}

impl std::error::Error for UnsubscribePacketEncodeError {}

impl fmt::Display for UnsubscribePacketEncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Common(e) => write!(f, "Common Error: {e}"),
            Self::ZeroPacketId => write!(f, "Packet identifier must be non-zero"),
            Self::InvalidTopicFilter(Some(reason)) => write!(f, "Invalid Topic Filter: {reason}"),
            Self::InvalidTopicFilter(None) => write!(f, "Invalid Topic Filter"),
        }
    }
}

impl Packet for UnsubscribePacket {
    fn packet_kind() -> PacketKind {
        PacketKind::Unsubscribe
    }
}

impl EncodablePacket for UnsubscribePacket {
    type Error = UnsubscribePacketEncodeError;

    fn encode(&self, buf: &mut PacketBuffer<'_>) -> Result<(), Self::Error> {
        if self.packet_id == 0 {
            return Err(Self::Error::ZeroPacketId);
        }

        validate_topic_filters(&self.topics).map_err(|e| Self::Error::InvalidTopicFilter(Some(e)))?;

        let remaining_len = 2 + self.topics.iter().map(|t| 2 + t.len()).sum::<usize>();
        debug!("UNSUBSCRIBE {} topics, remaining_len: {remaining_len}", self.topics.len());

        buf.start_packet(Self::packet_kind().control_byte(), remaining_len)
            .map_err(|e| Self::Error::Common(e.into()))?;

        buf.fill(|buf| {
            buf.put_u16(self.packet_id)?;
            self.topics.iter().try_for_each(|topic| buf.put_length_prefixed(topic.as_bytes()))
        })
        .map_err(|e| Self::Error::Common(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_without_qos_byte() {
        let packet = UnsubscribePacket::new(30, vec!["a/b".into()]);
        let mut buf = PacketBuffer::new();
        packet.encode(&mut buf).unwrap();

        assert_eq!(buf.as_bytes(), &[0xA2, 7, 0x00, 0x1E, 0x00, 0x03, b'a', b'/', b'b']);
    }

    #[test]
    fn rejects_bad_arguments() {
        let mut buf = PacketBuffer::new();
        assert_eq!(UnsubscribePacket::new(0, vec!["a".into()]).encode(&mut buf).unwrap_err().code(), 1);
        assert_eq!(UnsubscribePacket::new(1, vec![]).encode(&mut buf).unwrap_err().code(), 2);
    }
}

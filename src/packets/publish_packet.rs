use std::{borrow::Cow, fmt};

use bytes::Bytes;
use log::debug;

use crate::{
    buffer::PacketBuffer,
    codec::{read_u16, FixedHeader},
    constants::{
        CMD_PACKET_TYPE, CMD_TOPIC_PREFIX, PUBLISH_FLAG_DUP, PUBLISH_FLAG_QOS_MASK,
        PUBLISH_FLAG_RETAIN, UNKNOWN_PACKET_TYPE,
    },
    protocol::{
        validation::{contains_subslice, contains_wildcard, fits_length_prefix},
        PacketKind, QoS,
    },
};

use super::{
    check_packet_type, split_frame, CommonPacketError, DecodablePacket, EncodablePacket, Packet,
};

/// A PUBLISH packet, outbound or received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    /// Only sent on the wire for `QoS` 1 and 2, but must be non-zero regardless.
    pub packet_id: u16,
    pub topic: Bytes,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
}

impl PublishPacket {
    pub fn new(packet_id: u16, topic: impl Into<Bytes>, payload: impl Into<Bytes>) -> Self {
        Self {
            packet_id,
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
            dup: false,
        }
    }

    pub fn qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// The topic as text, replacing invalid UTF-8.
    pub fn topic_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.topic)
    }

    /// Topic prefix, topic, and packet id when the `QoS` calls for one.
    fn remaining_len(&self) -> usize {
        let packet_id_len = if self.qos.has_packet_id() { 2 } else { 0 };
        2 + self.topic.len() + packet_id_len + self.payload.len()
    }

    fn control_byte(&self) -> u8 {
        let mut control_byte = Self::packet_kind().control_byte() | self.qos.to_u8() << 1;

        if self.retain {
            control_byte |= PUBLISH_FLAG_RETAIN;
        }

        if self.dup {
            control_byte |= PUBLISH_FLAG_DUP;
        }

        control_byte
    }
}

#[derive(Debug)]
pub enum PublishPacketEncodeError {
    Common(CommonPacketError),
    ZeroPacketId,
    InvalidTopic(Option<String>),
    DupWithoutQos,
}

impl PublishPacketEncodeError {
    /// Numeric failure code of the PUBLISH encoder.
    pub fn code(&self) -> u8 {
        match self {
            Self::ZeroPacketId => 1,
            Self::InvalidTopic(_) => 2,
            Self::DupWithoutQos => 3,
            Self::Common(CommonPacketError::BufferUnavailable) => 4,
            Self::Common(_) => 5,
        }
    }
}

impl std::error::Error for PublishPacketEncodeError {}

impl fmt::Display for PublishPacketEncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Common(e) => write!(f, "Common Error: {e}"),
            Self::ZeroPacketId => write!(f, "Packet identifier must be non-zero"),
            Self::InvalidTopic(Some(reason)) => write!(f, "Invalid Topic: {reason}"),
            Self::InvalidTopic(None) => write!(f, "Invalid Topic"),
            Self::DupWithoutQos => write!(f, "DUP must be 0 for QoS 0 messages"),
        }
    }
}

impl Packet for PublishPacket {
    fn packet_kind() -> PacketKind {
        PacketKind::Publish
    }
}

impl EncodablePacket for PublishPacket {
    type Error = PublishPacketEncodeError;

    fn encode(&self, buf: &mut PacketBuffer<'_>) -> Result<(), Self::Error> {
        if self.packet_id == 0 {
            return Err(Self::Error::ZeroPacketId);
        }

        if contains_wildcard(&self.topic) {
            return Err(Self::Error::InvalidTopic(Some(format!(
                "Wildcards are not allowed in topic {}",
                self.topic_str()
            ))));
        }

        if !fits_length_prefix(&self.topic) {
            return Err(Self::Error::InvalidTopic(Some("Topic exceeds 65535 bytes".into())));
        }

        if self.dup && !self.qos.has_packet_id() {
            return Err(Self::Error::DupWithoutQos);
        }

        let remaining_len = self.remaining_len();
        debug!("PUBLISH {} remaining_len: {remaining_len}", self.qos);

        buf.start_packet(self.control_byte(), remaining_len)
            .map_err(|e| Self::Error::Common(e.into()))?;

        buf.fill(|buf| {
            buf.put_length_prefixed(&self.topic)?;

            if self.qos.has_packet_id() {
                buf.put_u16(self.packet_id)?;
            }

            buf.put_slice(&self.payload)
        })
        .map_err(|e| Self::Error::Common(e.into()))
    }
}

#[derive(Debug)]
pub enum PublishPacketDecodeError {
    Common(CommonPacketError),
    /// The topic carries the command marker; decode as a command request instead.
    CommandTopic,
    RetainNotSupported,
    DupWithoutQos,
    InvalidQos(u8),
    ZeroPacketId,
    InvalidTopic,
}

impl PublishPacketDecodeError {
    /// Numeric result code of the PUBLISH decoder: the command kind for a
    /// redirect, the rejection sentinel otherwise.
    pub fn code(&self) -> u8 {
        match self {
            Self::CommandTopic => CMD_PACKET_TYPE,
            _ => UNKNOWN_PACKET_TYPE,
        }
    }
}

impl std::error::Error for PublishPacketDecodeError {}

impl fmt::Display for PublishPacketDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Common(e) => write!(f, "Common Error: {e}"),
            Self::CommandTopic => write!(f, "Topic is a command request"),
            Self::RetainNotSupported => write!(f, "Retain not supported"),
            Self::DupWithoutQos => write!(f, "DUP set on a QoS 0 message"),
            Self::InvalidQos(qos) => write!(f, "QoS must be 0, 1 or 2. Got: {qos}"),
            Self::ZeroPacketId => write!(f, "Packet identifier must be non-zero"),
            Self::InvalidTopic => write!(f, "Wildcards are not allowed in a topic name"),
        }
    }
}

/// The validated front of a received PUBLISH: fixed header, body and topic.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PublishFrame<'b> {
    pub(crate) header: FixedHeader,
    pub(crate) body: &'b [u8],
    pub(crate) topic: &'b [u8],
}

impl<'b> PublishFrame<'b> {
    pub(crate) fn parse(buf: &'b [u8]) -> Result<Self, PublishPacketDecodeError> {
        let (header, body) = split_frame(buf).map_err(PublishPacketDecodeError::Common)?;
        PublishPacket::validate_header(header.control_byte)?;

        if header.remaining_len < 2 {
            let e = CommonPacketError::malformed("Remaining length is smaller than 2");
            return Err(PublishPacketDecodeError::Common(e));
        }

        if header.flags() & PUBLISH_FLAG_RETAIN != 0 {
            return Err(PublishPacketDecodeError::RetainNotSupported);
        }

        let topic_len = read_u16(body, 0).map(usize::from).unwrap_or_default();
        if header.remaining_len < topic_len + 2 {
            let e = CommonPacketError::malformed(format!(
                "Remaining length {} cannot hold topic of {topic_len} bytes",
                header.remaining_len
            ));
            return Err(PublishPacketDecodeError::Common(e));
        }

        Ok(Self { header, body, topic: &body[2..2 + topic_len] })
    }

    pub(crate) fn is_command(&self) -> bool {
        contains_subslice(self.topic, CMD_TOPIC_PREFIX.as_bytes())
    }

    /// Reads the delivery flags, packet id and payload that follow the topic.
    pub(crate) fn split_payload(&self) -> Result<PublishTail<'b>, PublishPacketDecodeError> {
        let flags = self.header.flags();
        let dup = flags & PUBLISH_FLAG_DUP != 0;
        let raw_qos = (flags & PUBLISH_FLAG_QOS_MASK) >> 1;
        let qos = QoS::try_from(raw_qos).map_err(|_| PublishPacketDecodeError::InvalidQos(raw_qos))?;

        let mut offset = 2 + self.topic.len();

        let packet_id = if qos.has_packet_id() {
            let Some(packet_id) = read_u16(self.body, offset) else {
                let e = CommonPacketError::malformed("Packet identifier is missing");
                return Err(PublishPacketDecodeError::Common(e));
            };

            if packet_id == 0 {
                return Err(PublishPacketDecodeError::ZeroPacketId);
            }

            offset += 2;
            Some(packet_id)
        } else {
            // QoS 0 messages cannot be duplicates
            if dup {
                return Err(PublishPacketDecodeError::DupWithoutQos);
            }

            None
        };

        Ok(PublishTail { qos, dup, packet_id, payload: &self.body[offset..] })
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PublishTail<'b> {
    pub(crate) qos: QoS,
    pub(crate) dup: bool,
    pub(crate) packet_id: Option<u16>,
    pub(crate) payload: &'b [u8],
}

impl DecodablePacket for PublishPacket {
    type Error = PublishPacketDecodeError;

    fn validate_header(fixed_header: u8) -> Result<(), Self::Error> {
        check_packet_type(fixed_header, Self::packet_kind()).map_err(Self::Error::Common)
    }

    fn decode(buf: &[u8]) -> Result<Self, Self::Error> {
        let frame = PublishFrame::parse(buf)?;

        if frame.is_command() {
            return Err(Self::Error::CommandTopic);
        }

        let tail = frame.split_payload()?;
        debug!("PUBLISH {} payload_len: {}", tail.qos, tail.payload.len());

        if contains_wildcard(frame.topic) {
            return Err(Self::Error::InvalidTopic);
        }

        Ok(Self {
            packet_id: tail.packet_id.unwrap_or_default(),
            topic: Bytes::copy_from_slice(frame.topic),
            payload: Bytes::copy_from_slice(tail.payload),
            qos: tail.qos,
            retain: false,
            dup: tail.dup,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::buffer::Ownership;

    use super::*;

    fn encode(packet: &PublishPacket) -> Vec<u8> {
        let mut buf = PacketBuffer::new();
        packet.encode(&mut buf).unwrap();
        buf.as_bytes().to_vec()
    }

    #[test]
    fn qos0_round_trip() {
        let bytes = encode(&PublishPacket::new(10, "t", "hello"));
        assert_eq!(bytes, [0x30, 8, 0x00, 0x01, b't', b'h', b'e', b'l', b'l', b'o']);

        let decoded = PublishPacket::decode(&bytes).unwrap();
        assert_eq!(&decoded.topic[..], b"t");
        assert_eq!(&decoded.payload[..], b"hello");
        assert_eq!(decoded.payload.len(), 5);
        assert_eq!(decoded.qos, QoS::AtMostOnce);
    }

    #[test]
    fn retain_is_rejected_on_decode() {
        let mut bytes = encode(&PublishPacket::new(10, "t", "hello"));
        bytes[0] |= PUBLISH_FLAG_RETAIN;

        let e = PublishPacket::decode(&bytes).unwrap_err();
        assert!(matches!(e, PublishPacketDecodeError::RetainNotSupported));
        assert_eq!(e.code(), 255);
    }

    #[test]
    fn retain_flag_is_encoded() {
        let bytes = encode(&PublishPacket::new(10, "t", "").retain(true));
        assert_eq!(bytes[0], 0x31);
    }

    #[test]
    fn qos1_carries_packet_id() {
        let packet = PublishPacket::new(0x1234, "a/b", "x").qos(QoS::AtLeastOnce);
        let bytes = encode(&packet);
        assert_eq!(bytes, [0x32, 8, 0x00, 0x03, b'a', b'/', b'b', 0x12, 0x34, b'x']);

        let decoded = PublishPacket::decode(&bytes).unwrap();
        assert_eq!(decoded.packet_id, 0x1234);
        assert_eq!(decoded.qos, QoS::AtLeastOnce);
        assert_eq!(&decoded.payload[..], b"x");
    }

    #[test]
    fn qos2_with_empty_payload() {
        let packet = PublishPacket::new(7, "q", Bytes::new()).qos(QoS::ExactlyOnce);
        let bytes = encode(&packet);
        assert_eq!(bytes[0], 0x34);

        let decoded = PublishPacket::decode(&bytes).unwrap();
        assert_eq!(decoded.packet_id, 7);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn encoder_rejects_bad_arguments() {
        let mut buf = PacketBuffer::new();

        let e = PublishPacket::new(0, "t", "x").encode(&mut buf).unwrap_err();
        assert_eq!(e.code(), 1);

        let e = PublishPacket::new(1, "a/#", "x").encode(&mut buf).unwrap_err();
        assert_eq!(e.code(), 2);

        let e = PublishPacket::new(1, "a/+/b", "x").encode(&mut buf).unwrap_err();
        assert_eq!(e.code(), 2);

        let packet = PublishPacket { dup: true, ..PublishPacket::new(1, "t", "x") };
        assert_eq!(packet.encode(&mut buf).unwrap_err().code(), 3);

        assert_eq!(buf.ownership(), Ownership::Unallocated);
    }

    #[test]
    fn command_topic_redirects() {
        let bytes = encode(&PublishPacket::new(1, "$creq/abc", "x"));
        let e = PublishPacket::decode(&bytes).unwrap_err();
        assert!(matches!(e, PublishPacketDecodeError::CommandTopic));
        assert_eq!(e.code(), 15);
    }

    #[test]
    fn dup_on_qos0_is_rejected() {
        let mut bytes = encode(&PublishPacket::new(1, "t", "x"));
        bytes[0] |= PUBLISH_FLAG_DUP;
        assert!(matches!(PublishPacket::decode(&bytes), Err(PublishPacketDecodeError::DupWithoutQos)));
    }

    #[test]
    fn zero_packet_id_is_rejected() {
        let bytes = [0x32, 5, 0x00, 0x01, b't', 0x00, 0x00];
        assert!(matches!(PublishPacket::decode(&bytes), Err(PublishPacketDecodeError::ZeroPacketId)));
    }

    #[test]
    fn wildcard_topic_is_rejected_on_decode() {
        let bytes = [0x30, 4, 0x00, 0x02, b'a', b'#'];
        assert!(matches!(PublishPacket::decode(&bytes), Err(PublishPacketDecodeError::InvalidTopic)));
    }

    #[test]
    fn topic_longer_than_remaining_is_malformed() {
        let bytes = [0x30, 3, 0x00, 0x05, b'a'];
        assert!(matches!(PublishPacket::decode(&bytes), Err(PublishPacketDecodeError::Common(_))));
    }

    #[test]
    fn truncated_buffer_is_malformed() {
        let bytes = encode(&PublishPacket::new(10, "t", "hello"));
        assert!(matches!(
            PublishPacket::decode(&bytes[..6]),
            Err(PublishPacketDecodeError::Common(CommonPacketError::MalformedPacket(_)))
        ));
    }

    #[test]
    fn qos1_without_room_for_packet_id() {
        let bytes = [0x32, 3, 0x00, 0x01, b't'];
        assert!(matches!(PublishPacket::decode(&bytes), Err(PublishPacketDecodeError::Common(_))));
    }

    #[test]
    fn encodes_into_caller_region() {
        let mut region = [0u8; 16];
        let mut buf = PacketBuffer::with_region(&mut region);
        PublishPacket::new(10, "t", "hi").encode(&mut buf).unwrap();

        assert_eq!(buf.ownership(), Ownership::CallerOwned);
        assert_eq!(buf.as_bytes(), &[0x30, 5, 0x00, 0x01, b't', b'h', b'i']);
    }
}

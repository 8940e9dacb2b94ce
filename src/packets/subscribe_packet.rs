use std::fmt;

use log::debug;

use crate::{
    buffer::PacketBuffer,
    protocol::{validation::fits_length_prefix, PacketKind, QoS},
};

use super::{CommonPacketError, EncodablePacket, Packet};

/// An outbound SUBSCRIBE. Every topic filter is requested with the same `QoS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub qos: QoS,
    pub topics: Vec<String>,
}

impl SubscribePacket {
    pub fn new(packet_id: u16, qos: QoS, topics: Vec<String>) -> Self {
        Self { packet_id, qos, topics }
    }
}

#[derive(Debug)]
pub enum SubscribePacketEncodeError {
    Common(CommonPacketError),
    ZeroPacketId,
    InvalidTopicFilter(Option<String>),
}

impl SubscribePacketEncodeError {
    /// Numeric failure code of the SUBSCRIBE encoder.
    pub fn code(&self) -> u8 {
        match self {
            Self::ZeroPacketId => 1,
            Self::InvalidTopicFilter(_) => 2,
            Self::Common(CommonPacketError::BufferUnavailable) => 3,
            Self::Common(_) => 4,
        }
    }
}

impl std::error::Error for SubscribePacketEncodeError {}

impl fmt::Display for SubscribePacketEncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Common(e) => write!(f, "Common Error: {e}"),
            Self::ZeroPacketId => write!(f, "Packet identifier must be non-zero"),
            Self::InvalidTopicFilter(Some(reason)) => write!(f, "Invalid Topic Filter: {reason}"),
            Self::InvalidTopicFilter(None) => write!(f, "Invalid Topic Filter"),
        }
    }
}

/// Checks a list of topic filters for SUBSCRIBE or UNSUBSCRIBE.
pub(crate) fn validate_topic_filters(topics: &[String]) -> Result<(), String> {
    if topics.is_empty() {
        return Err("At least one topic filter is required".into());
    }

    for topic in topics {
        if topic.is_empty() {
            return Err("Topic filter must not be empty".into());
        }

        if !fits_length_prefix(topic.as_bytes()) {
            return Err(format!("Topic filter of {} bytes exceeds 65535", topic.len()));
        }
    }

    Ok(())
}

impl Packet for SubscribePacket {
    fn packet_kind() -> PacketKind {
        PacketKind::Subscribe
    }
}

impl EncodablePacket for SubscribePacket {
    type Error = SubscribePacketEncodeError;

    fn encode(&self, buf: &mut PacketBuffer<'_>) -> Result<(), Self::Error> {
        if self.packet_id == 0 {
            return Err(Self::Error::ZeroPacketId);
        }

        validate_topic_filters(&self.topics).map_err(|e| Self::Error::InvalidTopicFilter(Some(e)))?;

        // Packet id, then per filter: length prefix, filter and requested QoS
        let remaining_len = 2 + self.topics.iter().map(|t| 2 + t.len() + 1).sum::<usize>();
        debug!("SUBSCRIBE {} topics, remaining_len: {remaining_len}", self.topics.len());

        buf.start_packet(Self::packet_kind().control_byte(), remaining_len)
            .map_err(|e| Self::Error::Common(e.into()))?;

        buf.fill(|buf| {
            buf.put_u16(self.packet_id)?;

            for topic in &self.topics {
                buf.put_length_prefixed(topic.as_bytes())?;
                buf.put_u8(self.qos.to_u8())?;
            }

            Ok(())
        })
        .map_err(|e| Self::Error::Common(e.into()))
    }
}

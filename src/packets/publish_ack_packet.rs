//! PUBACK, PUBREC, PUBREL and PUBCOMP.
//!
//! All four are a fixed header with a remaining length of 2 followed by the
//! packet identifier they acknowledge.

use std::fmt;

use log::debug;

use crate::{
    buffer::PacketBuffer,
    codec::read_u16,
    constants::PUBLISH_ID,
    protocol::PacketKind,
};

use super::{
    check_packet_type, split_frame, CommonPacketError, DecodablePacket, EncodablePacket, Packet,
};

const ACK_REMAINING_LEN: usize = 2;

#[derive(Debug)]
pub enum AckPacketEncodeError {
    Common(CommonPacketError),
}

impl AckPacketEncodeError {
    /// Numeric failure code of the acknowledgement encoders.
    pub fn code(&self) -> u8 {
        1
    }
}

impl std::error::Error for AckPacketEncodeError {}

impl fmt::Display for AckPacketEncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Common(e) => write!(f, "Common Error: {e}"),
        }
    }
}

#[derive(Debug)]
pub enum AckPacketDecodeError {
    Common(CommonPacketError),
    PacketIdMismatch { expected: u16, actual: u16 },
}

impl AckPacketDecodeError {
    /// Numeric failure code of the acknowledgement decoders.
    pub fn code(&self) -> u8 {
        1
    }
}

impl std::error::Error for AckPacketDecodeError {}

impl fmt::Display for AckPacketDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Common(e) => write!(f, "Common Error: {e}"),
            Self::PacketIdMismatch { expected, actual } => {
                write!(f, "Expected packet identifier {expected}, got {actual}")
            }
        }
    }
}

fn encode_ack(
    buf: &mut PacketBuffer<'_>,
    kind: PacketKind,
    packet_id: u16,
) -> Result<(), AckPacketEncodeError> {
    buf.start_packet(kind.control_byte(), ACK_REMAINING_LEN)
        .map_err(|e| AckPacketEncodeError::Common(e.into()))?;

    buf.fill(|buf| buf.put_u16(packet_id))
        .map_err(|e| AckPacketEncodeError::Common(e.into()))
}

fn decode_ack(buf: &[u8], kind: PacketKind) -> Result<u16, AckPacketDecodeError> {
    let (header, body) = split_frame(buf).map_err(AckPacketDecodeError::Common)?;
    check_packet_type(header.control_byte, kind).map_err(AckPacketDecodeError::Common)?;

    if header.remaining_len != ACK_REMAINING_LEN {
        return Err(AckPacketDecodeError::Common(CommonPacketError::malformed(format!(
            "{kind} remaining length must be 2. Got: {}",
            header.remaining_len
        ))));
    }

    let packet_id = read_u16(body, 0).unwrap_or_default();
    debug!("{kind} packet_id: {packet_id}");

    Ok(packet_id)
}

macro_rules! ack_packet {
    ($(#[$meta:meta])* $name:ident, $kind:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub packet_id: u16,
        }

        impl $name {
            pub fn new(packet_id: u16) -> Self {
                Self { packet_id }
            }

            /// Decodes the packet and checks it acknowledges `expected`.
            pub fn decode_expecting(buf: &[u8], expected: u16) -> Result<Self, AckPacketDecodeError> {
                let packet = Self::decode(buf)?;
                if packet.packet_id != expected {
                    return Err(AckPacketDecodeError::PacketIdMismatch {
                        expected,
                        actual: packet.packet_id,
                    });
                }

                Ok(packet)
            }
        }

        impl Packet for $name {
            fn packet_kind() -> PacketKind {
                PacketKind::$kind
            }
        }

        impl EncodablePacket for $name {
            type Error = AckPacketEncodeError;

            fn encode(&self, buf: &mut PacketBuffer<'_>) -> Result<(), Self::Error> {
                encode_ack(buf, Self::packet_kind(), self.packet_id)
            }
        }

        impl DecodablePacket for $name {
            type Error = AckPacketDecodeError;

            fn validate_header(fixed_header: u8) -> Result<(), Self::Error> {
                check_packet_type(fixed_header, Self::packet_kind()).map_err(Self::Error::Common)
            }

            fn decode(buf: &[u8]) -> Result<Self, Self::Error> {
                decode_ack(buf, Self::packet_kind()).map(Self::new)
            }
        }
    };
}

ack_packet!(
    /// Response to a `QoS` 1 PUBLISH.
    PubAckPacket,
    PubAck
);

ack_packet!(
    /// First response of the `QoS` 2 exchange.
    PubRecPacket,
    PubRec
);

ack_packet!(
    /// Response to a PUBREC. Sent with the reserved flags `0b0010`.
    PubRelPacket,
    PubRel
);

ack_packet!(
    /// Final response of the `QoS` 2 exchange.
    PubCompPacket,
    PubComp
);

impl PubAckPacket {
    /// Checks the acknowledgement against the default publish identifier.
    pub fn decode_default(buf: &[u8]) -> Result<Self, AckPacketDecodeError> {
        Self::decode_expecting(buf, PUBLISH_ID)
    }
}

impl PubRecPacket {
    pub fn decode_default(buf: &[u8]) -> Result<Self, AckPacketDecodeError> {
        Self::decode_expecting(buf, PUBLISH_ID)
    }
}

impl PubCompPacket {
    pub fn decode_default(buf: &[u8]) -> Result<Self, AckPacketDecodeError> {
        Self::decode_expecting(buf, PUBLISH_ID)
    }
}

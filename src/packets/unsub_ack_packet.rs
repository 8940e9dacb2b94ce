use std::fmt;

use log::debug;

use crate::{codec::read_u16, constants::UNSUBSCRIBE_ID, protocol::PacketKind};

use super::{check_packet_type, split_frame, CommonPacketError, DecodablePacket, Packet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsubAckPacket {
    pub packet_id: u16,
}

#[derive(Debug)]
pub enum UnsubAckPacketDecodeError {
    Common(CommonPacketError),
    PacketIdMismatch { expected: u16, actual: u16 },
}

impl UnsubAckPacketDecodeError {
    /// Numeric failure code of the UNSUBACK decoder.
    pub fn code(&self) -> u8 {
        1
    }
}

impl std::error::Error for UnsubAckPacketDecodeError {}

impl fmt::Display for UnsubAckPacketDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Common(e) => write!(f, "Common Error: {e}"),
            Self::PacketIdMismatch { expected, actual } => {
                write!(f, "Expected packet identifier {expected}, got {actual}")
            }
        }
    }
}

impl UnsubAckPacket {
    pub fn decode_expecting(buf: &[u8], expected: u16) -> Result<Self, UnsubAckPacketDecodeError> {
        let packet = Self::decode(buf)?;
        if packet.packet_id != expected {
            return Err(UnsubAckPacketDecodeError::PacketIdMismatch {
                expected,
                actual: packet.packet_id,
            });
        }

        Ok(packet)
    }

    pub fn decode_default(buf: &[u8]) -> Result<Self, UnsubAckPacketDecodeError> {
        Self::decode_expecting(buf, UNSUBSCRIBE_ID)
    }
}

impl Packet for UnsubAckPacket {
    fn packet_kind() -> PacketKind {
        PacketKind::UnsubAck
    }
}

impl DecodablePacket for UnsubAckPacket {
    type Error = UnsubAckPacketDecodeError;

    fn validate_header(fixed_header: u8) -> Result<(), Self::Error> {
        check_packet_type(fixed_header, Self::packet_kind()).map_err(Self::Error::Common)
    }

    fn decode(buf: &[u8]) -> Result<Self, Self::Error> {
        let (header, body) = split_frame(buf).map_err(Self::Error::Common)?;
        Self::validate_header(header.control_byte)?;

        let Some(packet_id) = read_u16(body, 0) else {
            let e = CommonPacketError::malformed("UNSUBACK is missing its packet identifier");
            return Err(Self::Error::Common(e));
        };
        debug!("UNSUBACK packet_id: {packet_id}");

        Ok(Self { packet_id })
    }
}

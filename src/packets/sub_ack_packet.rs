use std::fmt;

use log::{debug, warn};

use crate::{
    codec::read_u16,
    constants::SUBSCRIBE_ID,
    protocol::{PacketKind, QoS},
};

use super::{check_packet_type, split_frame, CommonPacketError, DecodablePacket, Packet};

/// Return code a broker sends for a topic filter it refused.
pub const SUBACK_FAILURE: u8 = 0x80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAckPacket {
    pub packet_id: u16,
    /// One return code per requested topic filter, in request order.
    pub return_codes: Vec<u8>,
}

#[derive(Debug)]
pub enum SubAckPacketDecodeError {
    Common(CommonPacketError),
    PacketIdMismatch { expected: u16, actual: u16 },
    /// The broker refused a subscription.
    Rejected,
    /// A return code outside the defined set.
    UnknownReturnCode(u8),
}

impl SubAckPacketDecodeError {
    /// Numeric failure code of the SUBACK decoder.
    pub fn code(&self) -> u8 {
        match self {
            Self::Rejected => 1,
            Self::UnknownReturnCode(_) => 2,
            Self::Common(_) | Self::PacketIdMismatch { .. } => 255,
        }
    }
}

impl std::error::Error for SubAckPacketDecodeError {}

impl fmt::Display for SubAckPacketDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Common(e) => write!(f, "Common Error: {e}"),
            Self::PacketIdMismatch { expected, actual } => {
                write!(f, "Expected packet identifier {expected}, got {actual}")
            }
            Self::Rejected => write!(f, "Subscription rejected by the server"),
            Self::UnknownReturnCode(code) => write!(f, "Unknown SUBACK return code: {code:#04x}"),
        }
    }
}

impl SubAckPacket {
    /// Decodes the acknowledgement of subscription `expected` and returns the
    /// `QoS` granted to each topic filter.
    ///
    /// Fails if any filter was refused or carries an unknown return code.
    pub fn decode_expecting(buf: &[u8], expected: u16) -> Result<Vec<QoS>, SubAckPacketDecodeError> {
        let packet = Self::decode(buf)?;
        if packet.packet_id != expected {
            return Err(SubAckPacketDecodeError::PacketIdMismatch {
                expected,
                actual: packet.packet_id,
            });
        }

        packet.granted()
    }

    /// Checks the acknowledgement against the default subscribe identifier.
    pub fn decode_default(buf: &[u8]) -> Result<Vec<QoS>, SubAckPacketDecodeError> {
        Self::decode_expecting(buf, SUBSCRIBE_ID)
    }

    pub fn granted(&self) -> Result<Vec<QoS>, SubAckPacketDecodeError> {
        self.return_codes
            .iter()
            .map(|&code| match code {
                SUBACK_FAILURE => {
                    warn!("subscription {} rejected", self.packet_id);
                    Err(SubAckPacketDecodeError::Rejected)
                }
                _ => QoS::try_from(code).map_err(|_| SubAckPacketDecodeError::UnknownReturnCode(code)),
            })
            .collect()
    }
}

impl Packet for SubAckPacket {
    fn packet_kind() -> PacketKind {
        PacketKind::SubAck
    }
}

impl DecodablePacket for SubAckPacket {
    type Error = SubAckPacketDecodeError;

    fn validate_header(fixed_header: u8) -> Result<(), Self::Error> {
        check_packet_type(fixed_header, Self::packet_kind()).map_err(Self::Error::Common)
    }

    fn decode(buf: &[u8]) -> Result<Self, Self::Error> {
        let (header, body) = split_frame(buf).map_err(Self::Error::Common)?;
        Self::validate_header(header.control_byte)?;

        // Packet id and at least one return code
        if body.len() < 3 {
            let e = CommonPacketError::malformed("SUBACK carries no return code");
            return Err(Self::Error::Common(e));
        }

        let packet_id = read_u16(body, 0).unwrap_or_default();
        let return_codes = body[2..].to_vec();
        debug!("SUBACK packet_id: {packet_id}, return codes: {return_codes:?}");

        Ok(Self { packet_id, return_codes })
    }
}

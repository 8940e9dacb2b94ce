use std::fmt;

use crate::protocol::PacketKind;

use super::{check_packet_type, split_frame, CommonPacketError, DecodablePacket, Packet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingRespPacket;

#[derive(Debug)]
pub enum PingRespPacketDecodeError {
    Common(CommonPacketError),
}

impl std::error::Error for PingRespPacketDecodeError {}

impl fmt::Display for PingRespPacketDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Common(e) => write!(f, "Common Error: {e}"),
        }
    }
}

impl Packet for PingRespPacket {
    fn packet_kind() -> PacketKind {
        PacketKind::PingResp
    }
}

impl DecodablePacket for PingRespPacket {
    type Error = PingRespPacketDecodeError;

    fn validate_header(fixed_header: u8) -> Result<(), Self::Error> {
        check_packet_type(fixed_header, Self::packet_kind()).map_err(Self::Error::Common)
    }

    fn decode(buf: &[u8]) -> Result<Self, Self::Error> {
        let (header, _) = split_frame(buf).map_err(Self::Error::Common)?;
        Self::validate_header(header.control_byte)?;

        if header.remaining_len != 0 {
            let e = CommonPacketError::malformed(format!(
                "PINGRESP remaining length must be 0. Got: {}",
                header.remaining_len
            ));
            return Err(Self::Error::Common(e));
        }

        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_empty_frame() {
        assert_eq!(PingRespPacket::decode(&[0xD0, 0x00]).unwrap(), PingRespPacket);
        assert!(PingRespPacket::decode(&[0xD0, 0x01, 0x00]).is_err());
        assert!(PingRespPacket::decode(&[0xC0, 0x00]).is_err());
    }
}

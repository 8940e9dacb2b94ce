use std::fmt;

use crate::{buffer::PacketBuffer, protocol::PacketKind};

use super::{CommonPacketError, EncodablePacket, Packet};

/// Keep-alive probe sent by the client.
#[derive(Debug, Clone, Copy, Default)]
pub struct PingReqPacket;

#[derive(Debug)]
pub enum PingReqPacketEncodeError {
    Common(CommonPacketError),
}

impl PingReqPacketEncodeError {
    pub fn code(&self) -> u8 {
        1
    }
}

impl std::error::Error for PingReqPacketEncodeError {}

impl fmt::Display for PingReqPacketEncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Common(e) => write!(f, "Common Error: {e}"),
        }
    }
}

impl Packet for PingReqPacket {
    fn packet_kind() -> PacketKind {
        PacketKind::PingReq
    }
}

impl EncodablePacket for PingReqPacket {
    type Error = PingReqPacketEncodeError;

    fn encode(&self, buf: &mut PacketBuffer<'_>) -> Result<(), Self::Error> {
        buf.start_packet(Self::packet_kind().control_byte(), 0)
            .map_err(|e| Self::Error::Common(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_byte_frame() {
        let mut buf = PacketBuffer::new();
        PingReqPacket.encode(&mut buf).unwrap();
        assert_eq!(buf.as_bytes(), &[0xC0, 0x00]);
    }

    #[test]
    fn fails_only_without_buffer() {
        let mut region = [0u8; 1];
        let mut buf = PacketBuffer::with_region(&mut region);
        assert_eq!(PingReqPacket.encode(&mut buf).unwrap_err().code(), 1);
    }
}

use std::fmt;

use crate::{buffer::PacketBuffer, protocol::PacketKind};

use super::{CommonPacketError, EncodablePacket, Packet};

/// Clean shutdown notice. The broker discards the will message on receipt.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectPacket;

#[derive(Debug)]
pub enum DisconnectPacketEncodeError {
    Common(CommonPacketError),
}

impl DisconnectPacketEncodeError {
    pub fn code(&self) -> u8 {
        1
    }
}

impl std::error::Error for DisconnectPacketEncodeError {}

impl fmt::Display for DisconnectPacketEncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Common(e) => write!(f, "Common Error: {e}"),
        }
    }
}

impl Packet for DisconnectPacket {
    fn packet_kind() -> PacketKind {
        PacketKind::Disconnect
    }
}

impl EncodablePacket for DisconnectPacket {
    type Error = DisconnectPacketEncodeError;

    fn encode(&self, buf: &mut PacketBuffer<'_>) -> Result<(), Self::Error> {
        buf.start_packet(Self::packet_kind().control_byte(), 0)
            .map_err(|e| Self::Error::Common(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use crate::buffer::Ownership;

    use super::*;

    #[test]
    fn two_byte_frame() {
        let mut buf = PacketBuffer::new();
        DisconnectPacket.encode(&mut buf).unwrap();
        assert_eq!(buf.as_bytes(), &[0xE0, 0x00]);
        assert_eq!(buf.capacity(), 2);
    }

    #[test]
    fn reuses_caller_region() {
        let mut region = [0xFF; 4];
        let mut buf = PacketBuffer::with_region(&mut region);
        DisconnectPacket.encode(&mut buf).unwrap();

        assert_eq!(buf.ownership(), Ownership::CallerOwned);
        assert_eq!(buf.as_bytes(), &[0xE0, 0x00]);
    }
}

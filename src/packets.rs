use std::{error::Error, fmt};

use crate::{
    buffer::{BufferError, FixedHeaderError, PacketBuffer},
    codec::{FixedHeader, RemainingLengthError},
    protocol::PacketKind,
};

pub mod command_packet;
pub mod conn_ack_packet;
pub mod connect_packet;
pub mod data_point_packet;
pub mod disconnect_packet;
pub mod ping_req_packet;
pub mod ping_resp_packet;
pub mod publish_ack_packet;
pub mod publish_packet;
pub mod sub_ack_packet;
pub mod subscribe_packet;
pub mod unsub_ack_packet;
pub mod unsubscribe_packet;

pub trait Packet {
    fn packet_kind() -> PacketKind;
}

pub trait DecodablePacket: Packet + Sized {
    type Error: Error + 'static + Send + Sync;

    fn validate_header(fixed_header: u8) -> Result<(), Self::Error>;

    /// Decodes a whole received packet. The buffer stays owned by the caller;
    /// every field of the result is a fresh copy.
    fn decode(buf: &[u8]) -> Result<Self, Self::Error>;
}

pub trait EncodablePacket {
    type Error: Error + 'static + Send + Sync;

    /// Writes the packet into `buf`, acquiring it first.
    ///
    /// On failure `buf` has been released.
    fn encode(&self, buf: &mut PacketBuffer<'_>) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonPacketError {
    /// No buffer could be acquired for the packet.
    BufferUnavailable,
    /// The remaining length does not fit the varint range.
    RemainingLengthOverflow,
    MalformedPacket(Option<String>),
}

impl CommonPacketError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPacket(Some(reason.into()))
    }
}

impl fmt::Display for CommonPacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferUnavailable => write!(f, "Buffer Unavailable"),
            Self::RemainingLengthOverflow => write!(f, "Remaining Length Overflow"),

            Self::MalformedPacket(Some(reason)) => write!(f, "Malformed Packet: {reason}"),
            Self::MalformedPacket(None) => write!(f, "Malformed Packet"),
        }
    }
}

impl Error for CommonPacketError {}

impl From<BufferError> for CommonPacketError {
    fn from(_: BufferError) -> Self {
        Self::BufferUnavailable
    }
}

impl From<FixedHeaderError> for CommonPacketError {
    fn from(e: FixedHeaderError) -> Self {
        match e {
            FixedHeaderError::Buffer(_) => Self::BufferUnavailable,
            FixedHeaderError::RemainingLength(_) => Self::RemainingLengthOverflow,
        }
    }
}

impl From<RemainingLengthError> for CommonPacketError {
    fn from(e: RemainingLengthError) -> Self {
        Self::MalformedPacket(Some(e.to_string()))
    }
}

/// Rejects a fixed header whose packet type is not `expected`.
pub(crate) fn check_packet_type(
    fixed_header: u8,
    expected: PacketKind,
) -> Result<(), CommonPacketError> {
    let packet_type = fixed_header >> 4;
    if packet_type != expected.to_u8() {
        return Err(CommonPacketError::malformed(format!("Invalid packet type: {packet_type}")));
    }

    Ok(())
}

/// Parses the fixed header and returns it with the packet body.
///
/// Fails if `buf` is shorter than the declared remaining length.
pub(crate) fn split_frame(buf: &[u8]) -> Result<(FixedHeader, &[u8]), CommonPacketError> {
    let header = FixedHeader::parse(buf)?;
    let Some(body) = header.body(buf) else {
        return Err(CommonPacketError::malformed(format!(
            "Declared remaining length {} exceeds received {} bytes",
            header.remaining_len,
            buf.len().saturating_sub(header.header_len)
        )));
    };

    Ok((header, body))
}

use std::fmt;

use log::debug;

use crate::protocol::PacketKind;

use super::{check_packet_type, split_frame, CommonPacketError, DecodablePacket, Packet};

/// Represents the return codes a MQTT v3.1.1 server sends in response to a
/// CONNECT. Each variant corresponds to a specific connection outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    /// Connection accepted.
    Accepted = 0x00,

    /// The Server does not support the level of the MQTT protocol requested by the Client.
    UnacceptableProtocolVersion = 0x01,

    /// The Client identifier is correct UTF-8 but not allowed by the Server.
    IdentifierRejected = 0x02,

    /// The Network Connection has been made but the MQTT service is unavailable.
    ServerUnavailable = 0x03,

    /// The data in the user name or password is malformed.
    BadUserNameOrPassword = 0x04,

    /// The Client is not authorized to connect.
    NotAuthorized = 0x05,
}

impl ConnectReturnCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Accepted),
            0x01 => Some(Self::UnacceptableProtocolVersion),
            0x02 => Some(Self::IdentifierRejected),
            0x03 => Some(Self::ServerUnavailable),
            0x04 => Some(Self::BadUserNameOrPassword),
            0x05 => Some(Self::NotAuthorized),
            _ => None,
        }
    }

    /// Converts the `ConnectReturnCode` to its numeric value.
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ConnectReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Accepted => "Connection accepted",
            Self::UnacceptableProtocolVersion => "Unacceptable protocol version",
            Self::IdentifierRejected => "Identifier rejected",
            Self::ServerUnavailable => "Server unavailable",
            Self::BadUserNameOrPassword => "Bad user name or password",
            Self::NotAuthorized => "Not authorized",
        };

        write!(f, "{value}")
    }
}

/// The CONNACK packet is the packet sent by the Server in response to a CONNECT packet received from a Client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAckPacket {
    /// Whether the Server resumed Session State from a previous connection for this Client.
    pub session_present: bool,

    pub return_code: ConnectReturnCode,
}

impl ConnAckPacket {
    pub fn is_accepted(&self) -> bool {
        self.return_code == ConnectReturnCode::Accepted
    }

    /// The platform result: 0 on acceptance, the refusal reason otherwise.
    pub fn code(&self) -> u8 {
        self.return_code.to_u8()
    }
}

#[derive(Debug)]
pub enum ConnAckPacketDecodeError {
    Common(CommonPacketError),
    InvalidRemainingLength(usize),
    InvalidAckFlags(u8),
    UnknownReturnCode(u8),
}

impl ConnAckPacketDecodeError {
    /// Numeric failure code of the CONNACK decoder. An unknown return code is
    /// passed through as is.
    pub fn code(&self) -> u8 {
        match self {
            Self::InvalidRemainingLength(_) => 1,
            Self::UnknownReturnCode(code) => *code,
            Self::Common(_) | Self::InvalidAckFlags(_) => 255,
        }
    }
}

impl std::error::Error for ConnAckPacketDecodeError {}

impl fmt::Display for ConnAckPacketDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Common(e) => write!(f, "Common Error: {e}"),
            Self::InvalidRemainingLength(len) => {
                write!(f, "CONNACK remaining length must be 2. Got: {len}")
            }
            Self::InvalidAckFlags(flags) => write!(f, "Invalid acknowledge flags: {flags:#04x}"),
            Self::UnknownReturnCode(code) => write!(f, "Unknown return code: {code}"),
        }
    }
}

impl Packet for ConnAckPacket {
    fn packet_kind() -> PacketKind {
        PacketKind::ConnAck
    }
}

impl DecodablePacket for ConnAckPacket {
    type Error = ConnAckPacketDecodeError;

    fn validate_header(fixed_header: u8) -> Result<(), Self::Error> {
        check_packet_type(fixed_header, Self::packet_kind()).map_err(Self::Error::Common)
    }

    fn decode(buf: &[u8]) -> Result<Self, Self::Error> {
        let (header, body) = split_frame(buf).map_err(Self::Error::Common)?;
        Self::validate_header(header.control_byte)?;

        if header.remaining_len != 2 {
            return Err(Self::Error::InvalidRemainingLength(header.remaining_len));
        }

        // Bits 7-1 of the acknowledge flags are reserved
        let session_present = match body[0] {
            0 => false,
            1 => true,
            flags => return Err(Self::Error::InvalidAckFlags(flags)),
        };

        let return_code =
            ConnectReturnCode::from_u8(body[1]).ok_or(Self::Error::UnknownReturnCode(body[1]))?;
        debug!("CONNACK session_present: {session_present}, return_code: {return_code}");

        Ok(Self { session_present, return_code })
    }
}

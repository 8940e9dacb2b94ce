//! Platform commands carried over PUBLISH.
//!
//! A request arrives on `$creq/<cmd id>` with the request body as payload.
//! The reply goes to `$crsp/<cmd id>` at `QoS` 0.

use std::fmt;

use bytes::Bytes;
use log::debug;

use crate::{
    buffer::PacketBuffer,
    constants::{CMD_RESPONSE_TOPIC_PREFIX, CMD_TOPIC_PREFIX, PUBLISH_ID, UNKNOWN_PACKET_TYPE},
    protocol::{validation::find_subslice, PacketKind, QoS},
};

use super::{
    publish_packet::{PublishFrame, PublishPacket, PublishPacketDecodeError, PublishPacketEncodeError},
    DecodablePacket, EncodablePacket, Packet,
};

/// A command request pushed by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub cmd_id: String,
    pub request: Bytes,
    pub qos: QoS,
    /// Present when the request was delivered at `QoS` 1 or 2.
    pub packet_id: Option<u16>,
}

#[derive(Debug)]
pub enum CommandRequestDecodeError {
    Publish(PublishPacketDecodeError),
    /// The topic does not carry the command marker.
    NotCommand,
    /// No `/<cmd id>` follows the command marker.
    MissingCommandId,
}

impl CommandRequestDecodeError {
    /// Numeric failure code of the command decoder.
    pub fn code(&self) -> u8 {
        match self {
            Self::MissingCommandId => 1,
            Self::Publish(_) | Self::NotCommand => UNKNOWN_PACKET_TYPE,
        }
    }
}

impl std::error::Error for CommandRequestDecodeError {}

impl fmt::Display for CommandRequestDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Publish(e) => write!(f, "Publish Error: {e}"),
            Self::NotCommand => write!(f, "Topic is not a command request"),
            Self::MissingCommandId => write!(f, "Command request topic has no command id"),
        }
    }
}

impl From<PublishPacketDecodeError> for CommandRequestDecodeError {
    fn from(e: PublishPacketDecodeError) -> Self {
        Self::Publish(e)
    }
}

/// Extracts the command id from a `...$creq/<cmd id>[/...]` topic.
fn command_id(topic: &[u8]) -> Option<&[u8]> {
    let start = find_subslice(topic, CMD_TOPIC_PREFIX.as_bytes())? + CMD_TOPIC_PREFIX.len();
    let rest = topic[start..].strip_prefix(b"/")?;
    let id = rest.split(|&b| b == b'/').next()?;

    (!id.is_empty()).then_some(id)
}

impl Packet for CommandRequest {
    fn packet_kind() -> PacketKind {
        PacketKind::Cmd
    }
}

impl DecodablePacket for CommandRequest {
    type Error = CommandRequestDecodeError;

    /// Commands travel as PUBLISH packets.
    fn validate_header(fixed_header: u8) -> Result<(), Self::Error> {
        PublishPacket::validate_header(fixed_header).map_err(Self::Error::Publish)
    }

    fn decode(buf: &[u8]) -> Result<Self, Self::Error> {
        let frame = PublishFrame::parse(buf)?;
        if !frame.is_command() {
            return Err(Self::Error::NotCommand);
        }

        let cmd_id = command_id(frame.topic).ok_or(Self::Error::MissingCommandId)?;
        let tail = frame.split_payload()?;
        debug!("CMD request_len: {}", tail.payload.len());

        Ok(Self {
            cmd_id: String::from_utf8_lossy(cmd_id).into_owned(),
            request: Bytes::copy_from_slice(tail.payload),
            qos: tail.qos,
            packet_id: tail.packet_id,
        })
    }
}

/// Reply to a [`CommandRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub cmd_id: String,
    pub response: Bytes,
}

impl CommandResponse {
    pub fn new(cmd_id: impl Into<String>, response: impl Into<Bytes>) -> Self {
        Self { cmd_id: cmd_id.into(), response: response.into() }
    }

    pub fn topic(&self) -> String {
        format!("{CMD_RESPONSE_TOPIC_PREFIX}{}", self.cmd_id)
    }
}

#[derive(Debug)]
pub enum CommandResponseEncodeError {
    Publish(PublishPacketEncodeError),
    MissingCommandId,
}

impl CommandResponseEncodeError {
    pub fn code(&self) -> u8 {
        1
    }
}

impl std::error::Error for CommandResponseEncodeError {}

impl fmt::Display for CommandResponseEncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Publish(e) => write!(f, "Publish Error: {e}"),
            Self::MissingCommandId => write!(f, "Command id is empty"),
        }
    }
}

impl Packet for CommandResponse {
    fn packet_kind() -> PacketKind {
        PacketKind::Publish
    }
}

impl EncodablePacket for CommandResponse {
    type Error = CommandResponseEncodeError;

    fn encode(&self, buf: &mut PacketBuffer<'_>) -> Result<(), Self::Error> {
        if self.cmd_id.is_empty() {
            return Err(Self::Error::MissingCommandId);
        }

        PublishPacket::new(PUBLISH_ID, self.topic(), self.response.clone())
            .encode(buf)
            .map_err(Self::Error::Publish)
    }
}

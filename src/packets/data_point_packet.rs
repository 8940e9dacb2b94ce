//! Data point uploads to the OneNet platform.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use log::debug;

use crate::{
    buffer::PacketBuffer,
    constants::{BINARY_ATTACHMENT_TYPE, BINARY_DATA_TOPIC, PUBLISH_ID},
    protocol::{validation::fits_length_prefix, PacketKind, QoS},
};

use super::{
    publish_packet::{PublishPacket, PublishPacketEncodeError},
    EncodablePacket, Packet,
};

#[derive(Debug)]
pub enum DataPointEncodeError {
    Publish(PublishPacketEncodeError),
    DescriptorTooLong(usize),
    FileTooLarge(usize),
}

impl DataPointEncodeError {
    /// Numeric failure code of the data point encoders.
    pub fn code(&self) -> u8 {
        1
    }
}

impl std::error::Error for DataPointEncodeError {}

impl fmt::Display for DataPointEncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Publish(e) => write!(f, "Publish Error: {e}"),
            Self::DescriptorTooLong(len) => write!(f, "Descriptor of {len} bytes exceeds 65535"),
            Self::FileTooLarge(len) => write!(f, "File of {len} bytes exceeds 4294967295"),
        }
    }
}

/// JSON data points for `$sys/<product>/<device>/dp/post/json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveDataPacket {
    pub packet_id: u16,
    pub product_id: String,
    pub device_name: String,
    pub body: Bytes,
}

impl SaveDataPacket {
    pub fn new(
        product_id: impl Into<String>,
        device_name: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            packet_id: PUBLISH_ID,
            product_id: product_id.into(),
            device_name: device_name.into(),
            body: body.into(),
        }
    }

    pub fn packet_id(mut self, packet_id: u16) -> Self {
        self.packet_id = packet_id;
        self
    }

    pub fn topic(&self) -> String {
        format!("$sys/{}/{}/dp/post/json", self.product_id, self.device_name)
    }
}

impl Packet for SaveDataPacket {
    fn packet_kind() -> PacketKind {
        PacketKind::Publish
    }
}

impl EncodablePacket for SaveDataPacket {
    type Error = DataPointEncodeError;

    fn encode(&self, buf: &mut PacketBuffer<'_>) -> Result<(), Self::Error> {
        PublishPacket::new(self.packet_id, self.topic(), self.body.clone())
            .qos(QoS::AtLeastOnce)
            .encode(buf)
            .map_err(DataPointEncodeError::Publish)
    }
}

/// Self-describing binary blob for a named data stream.
///
/// ```text
/// 0x02 | descriptor len (u16) | {"ds_id":"<name>"} | file len (u32) | file
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryAttachment {
    pub ds_id: String,
    pub file: Bytes,
}

impl BinaryAttachment {
    pub fn new(ds_id: impl Into<String>, file: impl Into<Bytes>) -> Self {
        Self { ds_id: ds_id.into(), file: file.into() }
    }

    fn descriptor(&self) -> String {
        format!("{{\"ds_id\":\"{}\"}}", self.ds_id)
    }

    /// Builds the attachment payload.
    pub fn to_payload(&self) -> Result<Bytes, DataPointEncodeError> {
        let descriptor = self.descriptor();
        if !fits_length_prefix(descriptor.as_bytes()) {
            return Err(DataPointEncodeError::DescriptorTooLong(descriptor.len()));
        }

        let file_len = u32::try_from(self.file.len())
            .map_err(|_| DataPointEncodeError::FileTooLarge(self.file.len()))?;

        let mut payload = BytesMut::with_capacity(1 + 2 + descriptor.len() + 4 + self.file.len());
        payload.put_u8(BINARY_ATTACHMENT_TYPE);
        payload.put_u16(descriptor.len() as u16);
        payload.put_slice(descriptor.as_bytes());
        payload.put_u32(file_len);
        payload.put_slice(&self.file);
        debug!("binary attachment {} payload_len: {}", self.ds_id, payload.len());

        Ok(payload.freeze())
    }
}

/// A [`BinaryAttachment`] published to `$dp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveBinaryDataPacket {
    pub packet_id: u16,
    pub attachment: BinaryAttachment,
}

impl SaveBinaryDataPacket {
    pub fn new(attachment: BinaryAttachment) -> Self {
        Self { packet_id: PUBLISH_ID, attachment }
    }

    pub fn packet_id(mut self, packet_id: u16) -> Self {
        self.packet_id = packet_id;
        self
    }
}

impl Packet for SaveBinaryDataPacket {
    fn packet_kind() -> PacketKind {
        PacketKind::Publish
    }
}

impl EncodablePacket for SaveBinaryDataPacket {
    type Error = DataPointEncodeError;

    fn encode(&self, buf: &mut PacketBuffer<'_>) -> Result<(), Self::Error> {
        let payload = self.attachment.to_payload()?;

        PublishPacket::new(self.packet_id, BINARY_DATA_TOPIC, payload)
            .qos(QoS::AtLeastOnce)
            .encode(buf)
            .map_err(DataPointEncodeError::Publish)
    }
}

use std::{error::Error, fmt};

use bytes::{Bytes, BytesMut};
use log::{debug, error};
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    buffer::PacketBuffer,
    codec::{FixedHeader, RemainingLengthError},
    constants::MAX_REMAINING_LENGTH_BYTES,
    packets::{
        command_packet::CommandRequest,
        conn_ack_packet::ConnAckPacket,
        ping_resp_packet::PingRespPacket,
        publish_ack_packet::{PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket},
        publish_packet::PublishPacket,
        sub_ack_packet::SubAckPacket,
        unsub_ack_packet::UnsubAckPacket,
        DecodablePacket, EncodablePacket,
    },
    protocol::{classify, PacketKind},
};

/// A packet received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingPacket {
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    Command(CommandRequest),
    PubAck(PubAckPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    PubComp(PubCompPacket),
    SubAck(SubAckPacket),
    UnsubAck(UnsubAckPacket),
    PingResp,
}

#[derive(Debug)]
pub enum PacketError {
    /// The peer closed the stream in the middle of a packet.
    ConnectionReset,
    /// The stream can no longer be framed.
    MalformedFrame(RemainingLengthError),
    /// A complete packet that failed to decode. It has been consumed.
    MalformedPacket(PacketKind, String),
    /// A packet a client never receives, or one rejected by classification.
    UnexpectedPacket(PacketKind),
    Io(io::Error),
}

impl PacketError {
    /// Whether the connection is still usable after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedPacket(..) | Self::UnexpectedPacket(_))
    }
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionReset => write!(f, "Connection Reset"),
            Self::MalformedFrame(e) => write!(f, "Malformed Frame: {e}"),
            Self::MalformedPacket(kind, reason) => write!(f, "Malformed {kind} Packet: {reason}"),
            Self::UnexpectedPacket(kind) => write!(f, "Unexpected Packet: {kind}"),
            Self::Io(e) => write!(f, "I/O Error: {e}"),
        }
    }
}

impl Error for PacketError {}

impl From<io::Error> for PacketError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Frames packets over any byte stream.
#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
    buffer: BytesMut,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    pub fn new(stream: S) -> Connection<S> {
        Connection { stream, buffer: BytesMut::with_capacity(4096) }
    }

    /// Read a packet from the connection.
    ///
    /// Returns `None` if EOF is reached
    pub async fn read_packet(&mut self) -> Result<Option<IncomingPacket>, PacketError> {
        loop {
            if let Some(frame) = self.next_frame()? {
                return decode_frame(&frame).map(Some);
            }

            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }

                return Err(PacketError::ConnectionReset);
            }
        }
    }

    /// Splits the next complete packet off the read buffer.
    fn next_frame(&mut self) -> Result<Option<Bytes>, PacketError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let header = match FixedHeader::parse(&self.buffer) {
            Ok(header) => header,
            Err(RemainingLengthError::Incomplete)
                if self.buffer.len() <= MAX_REMAINING_LENGTH_BYTES =>
            {
                return Ok(None);
            }
            Err(e) => {
                error!("cannot frame incoming stream: {e}");
                return Err(PacketError::MalformedFrame(e));
            }
        };

        if self.buffer.len() < header.packet_len() {
            return Ok(None);
        }

        let frame = self.buffer.split_to(header.packet_len()).freeze();
        debug!("received {} bytes: {}", frame.len(), hex::encode(&frame));

        Ok(Some(frame))
    }

    /// Write an encoded packet to the connection.
    pub async fn write_packet(&mut self, buf: &PacketBuffer<'_>) -> io::Result<()> {
        let data = buf.as_bytes();
        debug!("sending {} bytes: {}", data.len(), hex::encode(data));

        self.stream.write_all(data).await?;
        self.stream.flush().await
    }

    /// Encodes `packet` into a fresh buffer and writes it.
    pub async fn send<P: EncodablePacket>(&mut self, packet: &P) -> anyhow::Result<()> {
        let mut buf = PacketBuffer::new();
        packet.encode(&mut buf)?;
        self.write_packet(&buf).await?;
        buf.release();

        Ok(())
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

fn decode<P: DecodablePacket>(frame: &[u8], kind: PacketKind) -> Result<P, PacketError> {
    P::decode(frame).map_err(|e| PacketError::MalformedPacket(kind, e.to_string()))
}

/// Decodes one complete frame according to its classification.
fn decode_frame(frame: &[u8]) -> Result<IncomingPacket, PacketError> {
    let kind = classify(frame);

    let packet = match kind {
        PacketKind::ConnAck => IncomingPacket::ConnAck(decode(frame, kind)?),
        PacketKind::Publish => IncomingPacket::Publish(decode(frame, kind)?),
        PacketKind::Cmd => IncomingPacket::Command(decode(frame, kind)?),
        PacketKind::PubAck => IncomingPacket::PubAck(decode(frame, kind)?),
        PacketKind::PubRec => IncomingPacket::PubRec(decode(frame, kind)?),
        PacketKind::PubRel => IncomingPacket::PubRel(decode(frame, kind)?),
        PacketKind::PubComp => IncomingPacket::PubComp(decode(frame, kind)?),
        PacketKind::SubAck => IncomingPacket::SubAck(decode(frame, kind)?),
        PacketKind::UnsubAck => IncomingPacket::UnsubAck(decode(frame, kind)?),
        PacketKind::PingResp => {
            decode::<PingRespPacket>(frame, kind)?;
            IncomingPacket::PingResp
        }

        // Client to server only, or rejected by classification
        PacketKind::Connect
        | PacketKind::Subscribe
        | PacketKind::Unsubscribe
        | PacketKind::PingReq
        | PacketKind::Disconnect
        | PacketKind::Unknown => return Err(PacketError::UnexpectedPacket(kind)),
    };

    debug!("decoded {kind}");
    Ok(packet)
}

use std::fmt;

use bytes::Bytes;
use log::debug;

use crate::{
    buffer::PacketBuffer,
    constants::{
        CONNECT_FLAG_CLEAN_SESSION, CONNECT_FLAG_PASSWORD, CONNECT_FLAG_USERNAME,
        CONNECT_FLAG_WILL, CONNECT_FLAG_WILL_QOS_SHIFT, CONNECT_FLAG_WILL_RETAIN, PROTOCOL_LEVEL,
        PROTOCOL_NAME,
    },
    protocol::{validation::fits_length_prefix, PacketKind, QoS},
};

use super::{CommonPacketError, EncodablePacket, Packet};

/// Protocol name (2 + 4), level, flags and keep alive.
const VARIABLE_HEADER_LEN: usize = 10;

/// Message the broker publishes on behalf of a client that drops off uncleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub message: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

/// An outbound MQTT v3.1.1 CONNECT packet.
///
/// On the platform the username is the product id, the password the
/// authorization token and the client id the device name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectPacket {
    /// The Client Identifier identifies the Client to the Server.
    pub client_id: Option<String>,

    /// Mandatory here: both credential flags are always set.
    pub username: Option<String>,

    /// Mandatory here: both credential flags are always set.
    pub password: Option<Bytes>,

    /// Maximum interval in seconds between two control packets sent by the client.
    pub keep_alive: u16,

    /// Discard any previous session state on the server.
    pub clean_session: bool,

    pub will: Option<Will>,
}

impl ConnectPacket {
    pub fn new(
        client_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<Bytes>,
    ) -> Self {
        Self {
            client_id: Some(client_id.into()),
            username: Some(username.into()),
            password: Some(password.into()),
            keep_alive: 60,
            clean_session: true,
            will: None,
        }
    }

    pub fn keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = seconds;
        self
    }

    pub fn clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    pub fn will(mut self, will: Will) -> Self {
        self.will = Some(will);
        self
    }

    fn connect_flags(&self) -> u8 {
        let mut flags = CONNECT_FLAG_USERNAME | CONNECT_FLAG_PASSWORD;

        if self.clean_session {
            flags |= CONNECT_FLAG_CLEAN_SESSION;
        }

        if let Some(will) = &self.will {
            flags |= CONNECT_FLAG_WILL | will.qos.to_u8() << CONNECT_FLAG_WILL_QOS_SHIFT;

            if will.retain {
                flags |= CONNECT_FLAG_WILL_RETAIN;
            }
        }

        flags
    }
}

#[derive(Debug)]
pub enum ConnectPacketEncodeError {
    Common(CommonPacketError),
    MissingClientId,
    MissingCredentials,
    FieldTooLong(&'static str),
}

impl ConnectPacketEncodeError {
    /// Numeric failure code of the CONNECT encoder.
    pub fn code(&self) -> u8 {
        match self {
            Self::MissingClientId => 1,
            Self::MissingCredentials => 3,
            Self::Common(CommonPacketError::BufferUnavailable) => 4,
            Self::Common(_) => 5,
            Self::FieldTooLong(_) => 6,
        }
    }
}

impl std::error::Error for ConnectPacketEncodeError {}

impl fmt::Display for ConnectPacketEncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Common(e) => write!(f, "Common Error: {e}"),
            Self::MissingClientId => write!(f, "Client identifier is missing"),
            Self::MissingCredentials => write!(f, "Username and password are both required"),
            Self::FieldTooLong(field) => write!(f, "Field {field} exceeds 65535 bytes"),
        }
    }
}

impl Packet for ConnectPacket {
    fn packet_kind() -> PacketKind {
        PacketKind::Connect
    }
}

impl EncodablePacket for ConnectPacket {
    type Error = ConnectPacketEncodeError;

    fn encode(&self, buf: &mut PacketBuffer<'_>) -> Result<(), Self::Error> {
        let Some(client_id) = &self.client_id else {
            return Err(Self::Error::MissingClientId);
        };

        let (Some(username), Some(password)) = (&self.username, &self.password) else {
            return Err(Self::Error::MissingCredentials);
        };

        let mut fields = vec![("client_id", client_id.as_bytes())];
        if let Some(will) = &self.will {
            fields.push(("will_topic", will.topic.as_bytes()));
            fields.push(("will_message", &will.message[..]));
        }
        fields.push(("username", username.as_bytes()));
        fields.push(("password", &password[..]));

        if let Some((name, _)) = fields.iter().find(|(_, value)| !fits_length_prefix(value)) {
            return Err(Self::Error::FieldTooLong(*name));
        }

        // Every payload field carries a 2-byte length prefix
        let remaining_len =
            VARIABLE_HEADER_LEN + fields.iter().map(|(_, value)| 2 + value.len()).sum::<usize>();
        debug!("CONNECT remaining_len: {remaining_len}");

        buf.start_packet(Self::packet_kind().control_byte(), remaining_len)
            .map_err(|e| Self::Error::Common(e.into()))?;

        let flags = self.connect_flags();
        buf.fill(|buf| {
            // Variable header
            buf.put_length_prefixed(PROTOCOL_NAME.as_bytes())?;
            buf.put_u8(PROTOCOL_LEVEL)?;
            buf.put_u8(flags)?;
            buf.put_u16(self.keep_alive)?;

            // Payload, in the order the flags announce it
            for (_, value) in &fields {
                buf.put_length_prefixed(value)?;
            }

            Ok(())
        })
        .map_err(|e| Self::Error::Common(e.into()))
    }
}

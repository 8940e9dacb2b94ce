use std::fmt;

use crate::constants::{
    CMD_PACKET_TYPE, CONNACK_PACKET_TYPE, CONNECT_PACKET_TYPE, DISCONNECT_PACKET_TYPE,
    PINGREQ_PACKET_TYPE, PINGRESP_PACKET_TYPE, PUBACK_PACKET_TYPE, PUBCOMP_PACKET_TYPE,
    PUBLISH_PACKET_TYPE, PUBREC_PACKET_TYPE, PUBREL_PACKET_TYPE, SUBACK_PACKET_TYPE,
    SUBSCRIBE_PACKET_TYPE, UNKNOWN_PACKET_TYPE, UNSUBACK_PACKET_TYPE, UNSUBSCRIBE_PACKET_TYPE,
};

/// Represents the MQTT Control Packet Types, plus the platform command
/// pseudo-kind and the rejection sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Connection request.
    /// Sent by: Client to Server.
    Connect = 0x01,

    /// Connect acknowledgment.
    /// Sent by: Server to Client.
    ConnAck = 0x02,

    /// Publish message.
    /// Sent by: Client to Server or Server to Client.
    Publish = 0x03,

    /// Publish acknowledgment (`QoS` 1).
    /// Sent by: Client to Server or Server to Client.
    PubAck = 0x04,

    /// Publish received (`QoS` 2 delivery part 1).
    /// Sent by: Client to Server or Server to Client.
    PubRec = 0x05,

    /// Publish release (`QoS` 2 delivery part 2).
    /// Sent by: Client to Server or Server to Client.
    PubRel = 0x06,

    /// Publish complete (`QoS` 2 delivery part 3).
    /// Sent by: Client to Server or Server to Client.
    PubComp = 0x07,

    /// Subscribe request.
    /// Sent by: Client to Server.
    Subscribe = 0x08,

    /// Subscribe acknowledgment.
    /// Sent by: Server to Client.
    SubAck = 0x09,

    /// Unsubscribe request.
    /// Sent by: Client to Server.
    Unsubscribe = 0x0A,

    /// Unsubscribe acknowledgment.
    /// Sent by: Server to Client.
    UnsubAck = 0x0B,

    /// PING request.
    /// Sent by: Client to Server.
    PingReq = 0x0C,

    /// PING response.
    /// Sent by: Server to Client.
    PingResp = 0x0D,

    /// Disconnect notification.
    /// Sent by: Client to Server.
    Disconnect = 0x0E,

    /// A PUBLISH whose topic carries the command request marker.
    /// Not an MQTT packet type.
    Cmd = CMD_PACKET_TYPE as isize,

    /// The packet was rejected by classification.
    Unknown = UNKNOWN_PACKET_TYPE as isize,
}

impl PacketKind {
    /// Converts a raw MQTT packet type (1..=14) to a `PacketKind`.
    ///
    /// Returns `None` if the value does not match a wire packet type.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            CONNECT_PACKET_TYPE => Some(Self::Connect),
            CONNACK_PACKET_TYPE => Some(Self::ConnAck),
            PUBLISH_PACKET_TYPE => Some(Self::Publish),
            PUBACK_PACKET_TYPE => Some(Self::PubAck),
            PUBREC_PACKET_TYPE => Some(Self::PubRec),
            PUBREL_PACKET_TYPE => Some(Self::PubRel),
            PUBCOMP_PACKET_TYPE => Some(Self::PubComp),
            SUBSCRIBE_PACKET_TYPE => Some(Self::Subscribe),
            SUBACK_PACKET_TYPE => Some(Self::SubAck),
            UNSUBSCRIBE_PACKET_TYPE => Some(Self::Unsubscribe),
            UNSUBACK_PACKET_TYPE => Some(Self::UnsubAck),
            PINGREQ_PACKET_TYPE => Some(Self::PingReq),
            PINGRESP_PACKET_TYPE => Some(Self::PingResp),
            DISCONNECT_PACKET_TYPE => Some(Self::Disconnect),
            _ => None,
        }
    }

    /// Converts the `PacketKind` to its numeric value.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Computes the control byte for the MQTT fixed header.
    ///
    /// The control byte is the first byte of the MQTT fixed header, consisting of:
    /// - The packet type (4 most significant bits)
    /// - Packet flags (4 least significant bits)
    ///
    /// `Publish` flags (DUP, `QoS`, RETAIN) are dynamic and must be added by the caller.
    ///
    /// | Bit       | 7   | 6   | 5   | 4   | 3   | 2   | 1   | 0   |
    /// |-----------|-----|-----|-----|-----|-----|-----|-----|-----|
    /// | Byte 1    | Packet type           | Packet flags          |
    /// | Byte 2    | Remaining Length                              |
    pub fn control_byte(self) -> u8 {
        match self {
            // For these packets, the 4 LSB are reserved and must be: 0010
            Self::PubRel | Self::Subscribe | Self::Unsubscribe => self.to_u8() << 4 | 0b0000_0010,

            // A command travels as a PUBLISH
            Self::Cmd => Self::Publish.to_u8() << 4,

            Self::Unknown => 0,

            _ => self.to_u8() << 4,
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Connect => "CONNECT",
            Self::ConnAck => "CONNACK",
            Self::Publish => "PUBLISH",
            Self::PubAck => "PUBACK",
            Self::PubRec => "PUBREC",
            Self::PubRel => "PUBREL",
            Self::PubComp => "PUBCOMP",
            Self::Subscribe => "SUBSCRIBE",
            Self::SubAck => "SUBACK",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::UnsubAck => "UNSUBACK",
            Self::PingReq => "PINGREQ",
            Self::PingResp => "PINGRESP",
            Self::Disconnect => "DISCONNECT",
            Self::Cmd => "CMD",
            Self::Unknown => "UNKNOWN",
        };

        write!(f, "{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_types_round_trip() {
        for raw in 1..=14 {
            let kind = PacketKind::from_u8(raw).unwrap();
            assert_eq!(kind.to_u8(), raw);
        }
        assert_eq!(PacketKind::from_u8(0), None);
        assert_eq!(PacketKind::from_u8(15), None);
    }

    #[test]
    fn reserved_flags_in_control_byte() {
        assert_eq!(PacketKind::Subscribe.control_byte(), 0x82);
        assert_eq!(PacketKind::Unsubscribe.control_byte(), 0xA2);
        assert_eq!(PacketKind::PubRel.control_byte(), 0x62);
        assert_eq!(PacketKind::PubAck.control_byte(), 0x40);
        assert_eq!(PacketKind::Cmd.control_byte(), 0x30);
    }

    #[test]
    fn sentinel_values() {
        assert_eq!(PacketKind::Cmd.to_u8(), 15);
        assert_eq!(PacketKind::Unknown.to_u8(), 255);
        assert_eq!(PacketKind::Unknown.to_string(), "UNKNOWN");
    }
}

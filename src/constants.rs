/// Protocol name.
pub const PROTOCOL_NAME: &str = "MQTT";

/// Protocol level for MQTT v3.1.1.
pub const PROTOCOL_LEVEL: u8 = 4;

/// Largest remaining length this codec will encode (128^3 - 1).
pub const MAX_REMAINING_LENGTH: u32 = 2_097_151;

/// Most bytes a remaining length field may occupy on the wire.
pub const MAX_REMAINING_LENGTH_BYTES: usize = 4;

/// Multiplier value at which a remaining length is out of range.
pub(crate) const REMAINING_LENGTH_MULTIPLIER_LIMIT: u32 = 2_097_152;

/// Maximum length of a length-prefixed string.
pub const MAX_STRING_LENGTH: usize = 65_535;

/// Connection request.
/// Sent by: Client to Server.
pub const CONNECT_PACKET_TYPE: u8 = 0x01;

/// Connect acknowledgment.
/// Sent by: Server to Client.
pub const CONNACK_PACKET_TYPE: u8 = 0x02;

/// Publish message.
/// Sent by: Client to Server or Server to Client.
pub const PUBLISH_PACKET_TYPE: u8 = 0x03;

/// Publish acknowledgment (`QoS` 1).
pub const PUBACK_PACKET_TYPE: u8 = 0x04;

/// Publish received (`QoS` 2 delivery part 1).
pub const PUBREC_PACKET_TYPE: u8 = 0x05;

/// Publish release (`QoS` 2 delivery part 2).
pub const PUBREL_PACKET_TYPE: u8 = 0x06;

/// Publish complete (`QoS` 2 delivery part 3).
pub const PUBCOMP_PACKET_TYPE: u8 = 0x07;

/// Subscribe request.
/// Sent by: Client to Server.
pub const SUBSCRIBE_PACKET_TYPE: u8 = 0x08;

/// Subscribe acknowledgment.
/// Sent by: Server to Client.
pub const SUBACK_PACKET_TYPE: u8 = 0x09;

/// Unsubscribe request.
/// Sent by: Client to Server.
pub const UNSUBSCRIBE_PACKET_TYPE: u8 = 0x0A;

/// Unsubscribe acknowledgment.
/// Sent by: Server to Client.
pub const UNSUBACK_PACKET_TYPE: u8 = 0x0B;

/// PING request.
pub const PINGREQ_PACKET_TYPE: u8 = 0x0C;

/// PING response.
pub const PINGRESP_PACKET_TYPE: u8 = 0x0D;

/// Disconnect notification.
pub const DISCONNECT_PACKET_TYPE: u8 = 0x0E;

/// Pseudo packet type for a PUBLISH carrying a platform command request.
pub const CMD_PACKET_TYPE: u8 = 0x0F;

/// Returned by classification when a packet is rejected.
pub const UNKNOWN_PACKET_TYPE: u8 = 0xFF;

// Connect flags
pub const CONNECT_FLAG_CLEAN_SESSION: u8 = 0x02;
pub const CONNECT_FLAG_WILL: u8 = 0x04;
pub const CONNECT_FLAG_WILL_QOS_SHIFT: u8 = 3;
pub const CONNECT_FLAG_WILL_RETAIN: u8 = 0x20;
pub const CONNECT_FLAG_PASSWORD: u8 = 0x40;
pub const CONNECT_FLAG_USERNAME: u8 = 0x80;

// Publish fixed header flags
pub const PUBLISH_FLAG_RETAIN: u8 = 0x01;
pub const PUBLISH_FLAG_QOS_MASK: u8 = 0x06;
pub const PUBLISH_FLAG_DUP: u8 = 0x08;

/// Topic marker identifying a platform command request.
pub const CMD_TOPIC_PREFIX: &str = "$creq";

/// Topic prefix used when answering a platform command.
pub const CMD_RESPONSE_TOPIC_PREFIX: &str = "$crsp/";

/// Topic used for binary data point uploads.
pub const BINARY_DATA_TOPIC: &str = "$dp";

/// Payload type marker of a binary attachment.
pub const BINARY_ATTACHMENT_TYPE: u8 = 0x02;

/// Packet identifier used for the single in-flight publish.
pub const PUBLISH_ID: u16 = 10;

/// Packet identifier used for the single in-flight subscribe.
pub const SUBSCRIBE_ID: u16 = 20;

/// Packet identifier used for the single in-flight unsubscribe.
pub const UNSUBSCRIBE_ID: u16 = 30;

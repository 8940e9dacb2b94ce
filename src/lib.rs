//! MQTT v3.1.1 packet codec for devices on the OneNet platform, with a small
//! tokio client session on top.
//!
//! Encoders write into a [`PacketBuffer`] that is either lent by the caller
//! or allocated on demand. Decoders take a complete received packet and copy
//! out what they return.

pub mod buffer;
pub mod codec;
pub mod config;
pub mod connection;
pub mod constants;
pub mod packets;
pub mod protocol;
pub mod session;

pub use buffer::{BufferError, Ownership, PacketBuffer};
pub use codec::{decode_remaining_length, encode_remaining_length, FixedHeader, RemainingLengthError};
pub use config::ClientConfig;
pub use connection::{Connection, IncomingPacket, PacketError};
pub use packets::{CommonPacketError, DecodablePacket, EncodablePacket, Packet};
pub use protocol::{classify, PacketKind, QoS};
pub use session::{InFlight, Session};

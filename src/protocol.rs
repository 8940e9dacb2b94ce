pub mod classify;
pub mod packet_kind;
pub mod qos;
pub mod validation;

pub use classify::classify;
pub use packet_kind::PacketKind;
pub use qos::{InvalidQos, QoS};

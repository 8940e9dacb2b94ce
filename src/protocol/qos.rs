use std::fmt;

/// Quality of service level of a PUBLISH or a will message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum QoS {
    /// At most once.
    #[default]
    AtMostOnce = 0,
    /// At least once.
    AtLeastOnce = 1,
    /// Exactly once.
    ExactlyOnce = 2,
}

impl QoS {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Whether packets at this level carry a packet identifier.
    pub fn has_packet_id(self) -> bool {
        self != Self::AtMostOnce
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidQos(pub u8);

impl std::error::Error for InvalidQos {}

impl fmt::Display for InvalidQos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QoS must be 0, 1 or 2. Got: {}", self.0)
    }
}

impl TryFrom<u8> for QoS {
    type Error = InvalidQos;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            _ => Err(InvalidQos(value)),
        }
    }
}

impl fmt::Display for QoS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QoS {}", self.to_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_three_levels() {
        assert_eq!(QoS::try_from(2), Ok(QoS::ExactlyOnce));
        assert_eq!(QoS::try_from(3), Err(InvalidQos(3)));
        assert!(!QoS::AtMostOnce.has_packet_id());
        assert!(QoS::AtLeastOnce.has_packet_id());
    }
}

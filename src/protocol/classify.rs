use log::debug;

use crate::packets::publish_packet::PublishFrame;

use super::PacketKind;

/// Classifies a received packet by its fixed header.
///
/// Any wire type other than PUBLISH is returned as is. A PUBLISH is checked
/// for a usable topic and reported as [`PacketKind::Cmd`] when the topic
/// carries the command request marker. Rejections yield [`PacketKind::Unknown`].
pub fn classify(buf: &[u8]) -> PacketKind {
    let Some(kind) = buf.first().and_then(|&b| PacketKind::from_u8(b >> 4)) else {
        return PacketKind::Unknown;
    };

    if kind != PacketKind::Publish {
        return kind;
    }

    match PublishFrame::parse(buf) {
        Ok(frame) if frame.is_command() => PacketKind::Cmd,
        Ok(_) => PacketKind::Publish,
        Err(e) => {
            debug!("PUBLISH rejected by classification: {e}");
            PacketKind::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_wire_types() {
        assert_eq!(classify(&[0x20, 0x02, 0x00, 0x00]), PacketKind::ConnAck);
        assert_eq!(classify(&[0xD0, 0x00]), PacketKind::PingResp);
        assert_eq!(classify(&[0x62, 0x02, 0x00, 0x01]), PacketKind::PubRel);
    }

    #[test]
    fn rejects_reserved_types() {
        assert_eq!(classify(&[0x00, 0x00]), PacketKind::Unknown);
        assert_eq!(classify(&[0xF0, 0x00]), PacketKind::Unknown);
        assert_eq!(classify(&[]), PacketKind::Unknown);
    }

    #[test]
    fn publish_with_retain_is_unknown() {
        assert_eq!(classify(&[0x31, 0x04, 0x00, 0x01, b't', b'x']), PacketKind::Unknown);
        assert_eq!(classify(&[0x31, 0x04, 0x00, 0x01, b't', b'x']).to_u8(), 255);
    }

    #[test]
    fn publish_checks() {
        assert_eq!(classify(&[0x30, 0x04, 0x00, 0x01, b't', b'x']), PacketKind::Publish);

        // Remaining length below 2
        assert_eq!(classify(&[0x30, 0x01, 0x00]), PacketKind::Unknown);

        // Topic length larger than the packet
        assert_eq!(classify(&[0x30, 0x03, 0x00, 0x09, b't']), PacketKind::Unknown);
    }

    #[test]
    fn command_topic_is_cmd() {
        let mut buf = vec![0x30, 0x0C, 0x00, 0x09];
        buf.extend_from_slice(b"$creq/abc");
        buf.push(b'x');

        assert_eq!(classify(&buf), PacketKind::Cmd);
    }
}

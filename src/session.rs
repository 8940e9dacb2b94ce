use std::{collections::HashSet, future};

use anyhow::Context;
use bytes::Bytes;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    time::{self, Instant},
};

use crate::{
    config::ClientConfig,
    connection::{Connection, IncomingPacket, PacketError},
    constants::PUBLISH_ID,
    packets::{
        command_packet::CommandResponse,
        conn_ack_packet::ConnAckPacket,
        connect_packet::ConnectPacket,
        data_point_packet::{BinaryAttachment, SaveBinaryDataPacket, SaveDataPacket},
        disconnect_packet::DisconnectPacket,
        ping_req_packet::PingReqPacket,
        publish_ack_packet::{PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket},
        publish_packet::PublishPacket,
        subscribe_packet::SubscribePacket,
        unsubscribe_packet::UnsubscribePacket,
        EncodablePacket,
    },
    protocol::{PacketKind, QoS},
};

/// An outbound request waiting for its acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAck {
    /// The acknowledgement that resolves the entry.
    pub expected: PacketKind,
    pub sent_at: Instant,
}

/// Outbound requests awaiting acknowledgement, keyed by packet identifier.
#[derive(Debug, Default)]
pub struct InFlight {
    pending: DashMap<u16, PendingAck>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, packet_id: u16, expected: PacketKind) {
        let pending = PendingAck { expected, sent_at: Instant::now() };
        if let Some(previous) = self.pending.insert(packet_id, pending) {
            warn!("packet {packet_id} replaced an unacknowledged {}", previous.expected);
        }
    }

    /// Removes the entry for `packet_id` if `kind` is the acknowledgement it waits for.
    pub fn resolve(&self, packet_id: u16, kind: PacketKind) -> Option<PendingAck> {
        self.pending
            .remove_if(&packet_id, |_, pending| pending.expected == kind)
            .map(|(_, pending)| pending)
    }

    pub fn contains(&self, packet_id: u16) -> bool {
        self.pending.contains_key(&packet_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// A device session with the broker.
pub struct Session<S> {
    connection: Connection<S>,
    config: ClientConfig,
    in_flight: InFlight,
    /// Incoming `QoS` 2 messages waiting for PUBREL.
    awaiting_release: HashSet<u16>,
    next_packet_id: u16,
    last_sent: Instant,
}

enum Step {
    Read(Result<Option<IncomingPacket>, PacketError>),
    Idle,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Session<S> {
    pub fn new(connection: Connection<S>, config: ClientConfig) -> Self {
        Self {
            connection,
            config,
            in_flight: InFlight::new(),
            awaiting_release: HashSet::new(),
            next_packet_id: PUBLISH_ID,
            last_sent: Instant::now(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Sends CONNECT and waits for the broker's CONNACK.
    pub async fn link(&mut self) -> anyhow::Result<ConnAckPacket> {
        info!("linking product {} device {}", self.config.product_id, self.config.device_name);

        let packet = ConnectPacket::new(
            self.config.device_name.clone(),
            self.config.product_id.clone(),
            self.config.token.clone(),
        )
        .keep_alive(self.config.keep_alive)
        .clean_session(self.config.clean_session);
        self.send(&packet).await.context("Failed to send CONNECT")?;

        let response = time::timeout(self.config.response_timeout, self.connection.read_packet())
            .await
            .context("Timed out waiting for CONNACK")??;

        match response {
            Some(IncomingPacket::ConnAck(ack)) if ack.is_accepted() => {
                info!("linked, session present: {}", ack.session_present);
                Ok(ack)
            }
            Some(IncomingPacket::ConnAck(ack)) => {
                anyhow::bail!("Connection refused ({}): {}", ack.code(), ack.return_code)
            }
            Some(packet) => anyhow::bail!("First packet was not CONNACK: {packet:?}"),
            None => anyhow::bail!("Connection closed before CONNACK"),
        }
    }

    pub async fn subscribe(&mut self, topics: Vec<String>, qos: QoS) -> anyhow::Result<u16> {
        for topic in &topics {
            info!("subscribe topic: {topic}");
        }

        let packet_id = self.allocate_packet_id();
        self.send(&SubscribePacket::new(packet_id, qos, topics)).await?;
        self.in_flight.insert(packet_id, PacketKind::SubAck);

        Ok(packet_id)
    }

    pub async fn unsubscribe(&mut self, topics: Vec<String>) -> anyhow::Result<u16> {
        let packet_id = self.allocate_packet_id();
        self.send(&UnsubscribePacket::new(packet_id, topics)).await?;
        self.in_flight.insert(packet_id, PacketKind::UnsubAck);

        Ok(packet_id)
    }

    /// Publishes `payload` to `topic`. Returns the packet identifier when the
    /// `QoS` calls for an acknowledgement.
    pub async fn publish(
        &mut self,
        topic: impl Into<Bytes>,
        payload: impl Into<Bytes>,
        qos: QoS,
    ) -> anyhow::Result<Option<u16>> {
        let packet_id = if qos.has_packet_id() { self.allocate_packet_id() } else { PUBLISH_ID };
        let packet = PublishPacket::new(packet_id, topic, payload).qos(qos);
        debug!("publish topic: {}, payload_len: {}", packet.topic_str(), packet.payload.len());

        self.send(&packet).await?;

        Ok(match qos {
            QoS::AtMostOnce => None,
            QoS::AtLeastOnce => {
                self.in_flight.insert(packet_id, PacketKind::PubAck);
                Some(packet_id)
            }
            QoS::ExactlyOnce => {
                self.in_flight.insert(packet_id, PacketKind::PubRec);
                Some(packet_id)
            }
        })
    }

    /// Uploads JSON data points for this device.
    pub async fn save_data(&mut self, body: impl Into<Bytes>) -> anyhow::Result<u16> {
        let packet_id = self.allocate_packet_id();
        let packet = SaveDataPacket::new(
            self.config.product_id.clone(),
            self.config.device_name.clone(),
            body,
        )
        .packet_id(packet_id);
        self.send(&packet).await?;
        self.in_flight.insert(packet_id, PacketKind::PubAck);

        Ok(packet_id)
    }

    pub async fn save_binary_data(&mut self, attachment: BinaryAttachment) -> anyhow::Result<u16> {
        let packet_id = self.allocate_packet_id();
        self.send(&SaveBinaryDataPacket::new(attachment).packet_id(packet_id)).await?;
        self.in_flight.insert(packet_id, PacketKind::PubAck);

        Ok(packet_id)
    }

    pub async fn ping(&mut self) -> anyhow::Result<()> {
        self.send(&PingReqPacket).await
    }

    pub async fn disconnect(&mut self) -> anyhow::Result<()> {
        self.send(&DisconnectPacket).await?;
        self.connection.shutdown().await?;
        info!("disconnected");

        Ok(())
    }

    /// Acts on one packet from the broker. Messages for the application are
    /// returned; everything else is answered or resolved here.
    pub async fn handle_incoming(
        &mut self,
        packet: IncomingPacket,
    ) -> anyhow::Result<Option<PublishPacket>> {
        match packet {
            IncomingPacket::Command(request) => {
                info!("cmd id: {}, request_len: {}", request.cmd_id, request.request.len());
                if let Some(packet_id) = request.packet_id {
                    self.acknowledge(packet_id, request.qos).await?;
                }

                self.send(&CommandResponse::new(request.cmd_id, request.request)).await?;
                debug!("command response sent");
            }
            IncomingPacket::Publish(message) => {
                debug!("message on {}, payload_len: {}", message.topic_str(), message.payload.len());
                self.acknowledge(message.packet_id, message.qos).await?;

                return Ok(Some(message));
            }
            IncomingPacket::PubAck(ack) => self.resolve(ack.packet_id, PacketKind::PubAck),
            IncomingPacket::PubRec(rec) => {
                self.resolve(rec.packet_id, PacketKind::PubRec);
                self.send(&PubRelPacket::new(rec.packet_id)).await?;
                self.in_flight.insert(rec.packet_id, PacketKind::PubComp);
            }
            IncomingPacket::PubRel(rel) => {
                if !self.awaiting_release.remove(&rel.packet_id) {
                    warn!("PUBREL for unknown packet {}", rel.packet_id);
                }

                self.send(&PubCompPacket::new(rel.packet_id)).await?;
            }
            IncomingPacket::PubComp(comp) => self.resolve(comp.packet_id, PacketKind::PubComp),
            IncomingPacket::SubAck(ack) => {
                self.resolve(ack.packet_id, PacketKind::SubAck);
                match ack.granted() {
                    Ok(granted) => info!("subscription {} granted: {granted:?}", ack.packet_id),
                    Err(e) => warn!("subscription {} failed: {e}", ack.packet_id),
                }
            }
            IncomingPacket::UnsubAck(ack) => self.resolve(ack.packet_id, PacketKind::UnsubAck),
            IncomingPacket::PingResp => debug!("PINGRESP"),
            IncomingPacket::ConnAck(_) => warn!("unexpected CONNACK on a linked session"),
        }

        Ok(None)
    }

    /// Serves the connection until the broker closes it, forwarding messages
    /// to `messages` and sending PINGREQ whenever the link is idle for the
    /// keep-alive period.
    pub async fn run(&mut self, messages: mpsc::Sender<PublishPacket>) -> anyhow::Result<()> {
        loop {
            let deadline = self.config.keep_alive_interval().map(|interval| self.last_sent + interval);

            let step = tokio::select! {
                read = self.connection.read_packet() => Step::Read(read),
                _ = idle(deadline) => Step::Idle,
            };

            match step {
                Step::Read(Ok(Some(packet))) => {
                    if let Some(message) = self.handle_incoming(packet).await? {
                        if messages.send(message).await.is_err() {
                            debug!("message receiver dropped");
                        }
                    }
                }
                Step::Read(Ok(None)) => {
                    info!("broker closed the connection");
                    return Ok(());
                }
                Step::Read(Err(e)) if e.is_recoverable() => warn!("dropping packet: {e}"),
                Step::Read(Err(e)) => {
                    error!("connection failed: {e}");
                    return Err(e.into());
                }
                Step::Idle => {
                    debug!("keep-alive elapsed, sending PINGREQ");
                    self.ping().await?;
                }
            }
        }
    }

    async fn send<P: EncodablePacket>(&mut self, packet: &P) -> anyhow::Result<()> {
        self.connection.send(packet).await?;
        self.last_sent = Instant::now();

        Ok(())
    }

    async fn acknowledge(&mut self, packet_id: u16, qos: QoS) -> anyhow::Result<()> {
        match qos {
            QoS::AtMostOnce => Ok(()),
            QoS::AtLeastOnce => self.send(&PubAckPacket::new(packet_id)).await,
            QoS::ExactlyOnce => {
                self.awaiting_release.insert(packet_id);
                self.send(&PubRecPacket::new(packet_id)).await
            }
        }
    }

    fn resolve(&self, packet_id: u16, kind: PacketKind) {
        match self.in_flight.resolve(packet_id, kind) {
            Some(pending) => debug!("{kind} for packet {packet_id} after {:?}", pending.sent_at.elapsed()),
            None => warn!("{kind} for packet {packet_id} with nothing in flight"),
        }
    }

    /// Next non-zero packet identifier not currently in flight. PUBLISH,
    /// SUBSCRIBE and UNSUBSCRIBE share this space.
    fn allocate_packet_id(&mut self) -> u16 {
        loop {
            let packet_id = self.next_packet_id;
            self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);

            if packet_id != 0 && !self.in_flight.contains(packet_id) {
                return packet_id;
            }
        }
    }
}

async fn idle(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    use crate::packets::DecodablePacket;

    use super::*;

    fn session() -> (Session<DuplexStream>, DuplexStream) {
        let (client, broker) = duplex(1024);
        let config = ClientConfig::new("prod", "dev").token("tok").response_timeout(Duration::from_secs(1));
        (Session::new(Connection::new(client), config), broker)
    }

    async fn read_frame(broker: &mut DuplexStream) -> Vec<u8> {
        let mut header = [0u8; 2];
        broker.read_exact(&mut header).await.unwrap();

        let mut body = vec![0u8; usize::from(header[1])];
        broker.read_exact(&mut body).await.unwrap();

        [&header[..], &body[..]].concat()
    }

    #[tokio::test]
    async fn link_accepted() {
        let (mut session, mut broker) = session();
        broker.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();

        let ack = session.link().await.unwrap();
        assert!(ack.is_accepted());

        let connect = read_frame(&mut broker).await;
        assert_eq!(connect[0], 0x10);
        assert_eq!(&connect[14..17], b"dev");
    }

    #[tokio::test]
    async fn link_refused() {
        let (mut session, mut broker) = session();
        broker.write_all(&[0x20, 0x02, 0x00, 0x05]).await.unwrap();

        let e = session.link().await.unwrap_err();
        assert!(e.to_string().contains("Not authorized"));
    }

    #[tokio::test]
    async fn answers_commands_with_echo() {
        let (mut session, mut broker) = session();

        let mut request = vec![0x30, 0x0C, 0x00, 0x08];
        request.extend_from_slice(b"$creq/c1");
        request.extend_from_slice(b"on");
        broker.write_all(&request).await.unwrap();

        let packet = session.connection.read_packet().await.unwrap().unwrap();
        assert!(session.handle_incoming(packet).await.unwrap().is_none());

        let response = read_frame(&mut broker).await;
        let decoded = PublishPacket::decode(&response).unwrap();
        assert_eq!(decoded.topic_str(), "$crsp/c1");
        assert_eq!(&decoded.payload[..], b"on");
    }

    #[tokio::test]
    async fn qos1_publish_is_acknowledged_and_delivered() {
        let (mut session, mut broker) = session();

        let message = PublishPacket::new(7, "a/b", "x").qos(QoS::AtLeastOnce);
        let delivered = session.handle_incoming(IncomingPacket::Publish(message.clone())).await.unwrap();
        assert_eq!(delivered, Some(message));

        assert_eq!(read_frame(&mut broker).await, [0x40, 0x02, 0x00, 0x07]);
    }

    #[tokio::test]
    async fn qos2_exchange_as_receiver() {
        let (mut session, mut broker) = session();

        let message = PublishPacket::new(9, "a", "x").qos(QoS::ExactlyOnce);
        session.handle_incoming(IncomingPacket::Publish(message)).await.unwrap();
        assert_eq!(read_frame(&mut broker).await, [0x50, 0x02, 0x00, 0x09]);

        session.handle_incoming(IncomingPacket::PubRel(PubRelPacket::new(9))).await.unwrap();
        assert_eq!(read_frame(&mut broker).await, [0x70, 0x02, 0x00, 0x09]);
        assert!(session.awaiting_release.is_empty());
    }

    #[tokio::test]
    async fn qos2_exchange_as_sender() {
        let (mut session, mut broker) = session();

        let packet_id = session.publish("t", "x", QoS::ExactlyOnce).await.unwrap().unwrap();
        assert_eq!(packet_id, PUBLISH_ID);
        read_frame(&mut broker).await;

        session.handle_incoming(IncomingPacket::PubRec(PubRecPacket::new(packet_id))).await.unwrap();
        assert_eq!(read_frame(&mut broker).await, [0x62, 0x02, 0x00, PUBLISH_ID as u8]);

        session.handle_incoming(IncomingPacket::PubComp(PubCompPacket::new(packet_id))).await.unwrap();
        assert!(session.in_flight().is_empty());
    }

    #[tokio::test]
    async fn in_flight_ids_are_not_reused() {
        let (mut session, _broker) = session();

        let first = session.publish("t", "x", QoS::AtLeastOnce).await.unwrap();
        let second = session.publish("t", "y", QoS::AtLeastOnce).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(session.in_flight().len(), 2);

        session.handle_incoming(IncomingPacket::PubAck(PubAckPacket::new(PUBLISH_ID))).await.unwrap();
        assert_eq!(session.in_flight().len(), 1);
    }

    #[tokio::test]
    async fn subscribe_tracks_suback() {
        let (mut session, mut broker) = session();

        let packet_id = session.subscribe(vec!["a/b".into()], QoS::AtMostOnce).await.unwrap();
        let subscribe = read_frame(&mut broker).await;
        assert_eq!(subscribe[0], 0x82);
        assert_eq!(&subscribe[2..4], &packet_id.to_be_bytes());
        assert!(session.in_flight().contains(packet_id));

        let mut suback = vec![0x90, 0x03];
        suback.extend_from_slice(&packet_id.to_be_bytes());
        suback.push(0x00);
        broker.write_all(&suback).await.unwrap();

        let packet = session.connection.read_packet().await.unwrap().unwrap();
        session.handle_incoming(packet).await.unwrap();
        assert!(session.in_flight().is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_tracks_unsuback() {
        let (mut session, mut broker) = session();

        let packet_id = session.unsubscribe(vec!["a/b".into()]).await.unwrap();
        let unsubscribe = read_frame(&mut broker).await;
        assert_eq!(unsubscribe[0], 0xA2);
        assert_eq!(&unsubscribe[2..4], &packet_id.to_be_bytes());
        assert!(session.in_flight().contains(packet_id));

        let mut unsuback = vec![0xB0, 0x02];
        unsuback.extend_from_slice(&packet_id.to_be_bytes());
        broker.write_all(&unsuback).await.unwrap();

        let packet = session.connection.read_packet().await.unwrap().unwrap();
        session.handle_incoming(packet).await.unwrap();
        assert!(session.in_flight().is_empty());
    }

    #[tokio::test]
    async fn save_binary_data_waits_for_puback() {
        let (mut session, mut broker) = session();

        let attachment = BinaryAttachment::new("pic", vec![0xAB, 0xCD]);
        let packet_id = session.save_binary_data(attachment.clone()).await.unwrap();

        let frame = read_frame(&mut broker).await;
        let sent = PublishPacket::decode(&frame).unwrap();
        assert_eq!(&sent.topic[..], b"$dp");
        assert_eq!(sent.qos, QoS::AtLeastOnce);
        assert_eq!(sent.packet_id, packet_id);
        assert_eq!(sent.payload, attachment.to_payload().unwrap());
        assert!(session.in_flight().contains(packet_id));

        session.handle_incoming(IncomingPacket::PubAck(PubAckPacket::new(packet_id))).await.unwrap();
        assert!(session.in_flight().is_empty());
    }

    #[tokio::test]
    async fn requests_share_one_packet_id_space() {
        let (mut session, mut broker) = session();
        let drain = tokio::spawn(async move {
            let mut sink = Vec::new();
            broker.read_to_end(&mut sink).await.unwrap();
        });

        let published = session.publish("t", "x", QoS::AtLeastOnce).await.unwrap().unwrap();
        let saved = session.save_data("{}").await.unwrap();
        assert_ne!(published, saved);
        assert_eq!(session.in_flight().len(), 2);

        // Enough publishes to walk past every fixed default id
        for _ in 0..20 {
            session.publish("t", "x", QoS::AtLeastOnce).await.unwrap();
        }
        let subscribed = session.subscribe(vec!["a/b".into()], QoS::AtMostOnce).await.unwrap();
        let unsubscribed = session.unsubscribe(vec!["a/b".into()]).await.unwrap();
        assert_ne!(subscribed, unsubscribed);
        assert_eq!(session.in_flight().len(), 24);

        drop(session);
        drain.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn run_pings_when_idle_and_stops_on_close() {
        let (client, mut broker) = duplex(1024);
        let config = ClientConfig::new("prod", "dev").keep_alive(5);
        let mut session = Session::new(Connection::new(client), config);
        let (tx, _rx) = mpsc::channel(4);

        let broker_task = tokio::spawn(async move {
            let ping = read_frame(&mut broker).await;
            drop(broker);
            ping
        });

        session.run(tx).await.unwrap();
        assert_eq!(broker_task.await.unwrap(), [0xC0, 0x00]);
    }

    #[test]
    fn resolve_requires_matching_kind() {
        let in_flight = InFlight::new();
        in_flight.insert(3, PacketKind::PubAck);

        assert!(in_flight.resolve(3, PacketKind::PubComp).is_none());
        assert!(in_flight.resolve(3, PacketKind::PubAck).is_some());
        assert!(in_flight.is_empty());
    }
}

use log::{debug, trace, warn};
use serde::Serialize;

use crate::mqtt_client::error::{MqttClientError, MqttClientResult};
use crate::mqtt_client::opts::{ConnectOptions, DEFAULT_PING_RESP_TIMEOUT_MS};
use crate::mqtt_client::state::{Operation, PublishState, PublishTracker};
use crate::mqtt_serde::base_data::{EncodeBuf, VariableByteInteger};
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttPacket};
use crate::mqtt_serde::mqttv3::connect::MqttConnect;
use crate::mqtt_serde::mqttv3::disconnect::MqttDisconnect;
use crate::mqtt_serde::mqttv3::pingreq::MqttPingReq;
use crate::mqtt_serde::mqttv3::puback::MqttPubAck;
use crate::mqtt_serde::mqttv3::pubcomp::MqttPubComp;
use crate::mqtt_serde::mqttv3::publish::MqttPublish;
use crate::mqtt_serde::mqttv3::pubrec::MqttPubRec;
use crate::mqtt_serde::mqttv3::pubrel::MqttPubRel;
use crate::mqtt_serde::mqttv3::subscribe::{MqttSubscribe, TopicSubscription};
use crate::mqtt_serde::mqttv3::unsubscribe::MqttUnsubscribe;
use crate::mqtt_serde::parser::incoming::{read_incoming_packet, IncomingPacket};
use crate::mqtt_serde::parser::{ParseError, ParseOk};
use crate::mqtt_serde::QoS;
use crate::transport::{Clock, Transport};

/// Lifecycle of the MQTT session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectStatus {
    NotConnected,
    Connected,
    Disconnecting,
}

/// Events surfaced to the application from inside the engine.
#[derive(Debug)]
pub enum MqttEvent<'a> {
    /// An application message arrived from the broker. Topic and payload
    /// borrow from the engine's buffer and are only valid for the duration
    /// of the callback.
    MessageReceived(MqttPublish<'a>),
    /// A QoS >= 1 publish of ours reached its terminal acknowledgement
    /// (PUBACK for QoS 1, PUBCOMP for QoS 2).
    PublishComplete {
        packet_id: u16,
        ack_type: ControlPacketType,
    },
    /// The broker answered a SUBSCRIBE; one return code per topic filter.
    SubscribeAcknowledged {
        packet_id: u16,
        return_codes: &'a [u8],
    },
    /// The broker answered an UNSUBSCRIBE.
    UnsubscribeAcknowledged { packet_id: u16 },
}

/// Receiver for engine events.
///
/// Called synchronously from [`MqttEngine::process_loop`] and the
/// acknowledgement paths. The implementation must not call back into the
/// engine on the same connection; the borrow checker enforces this for safe
/// code, and any interior-mutability workaround is undefined behaviour of
/// the protocol, not of memory.
pub trait MqttEventHandler {
    fn on_event(&mut self, event: MqttEvent<'_>);
}

/// A single-connection MQTT 3.1.1 protocol engine.
///
/// The engine is synchronous and cooperative: it owns no threads and all
/// blocking happens inside the supplied [`Transport`] and [`Clock`]. One
/// caller-owned buffer serves both for assembling outbound packets and for
/// staging inbound ones, so it must be sized for the largest packet the
/// application expects in either direction.
///
/// # Usage
///
/// 1. Build with [`new`](Self::new) from a transport, clock, handler and
///    buffer.
/// 2. Establish the session with [`connect`](Self::connect).
/// 3. Publish and subscribe as needed; allocate ids with
///    [`next_packet_id`](Self::next_packet_id).
/// 4. Call [`process_loop`](Self::process_loop) regularly to receive
///    messages, run the QoS acknowledgement flows, and keep the connection
///    alive.
pub struct MqttEngine<'b, T, C, H> {
    transport: T,
    clock: C,
    handler: H,
    buffer: &'b mut [u8],
    status: ConnectStatus,
    next_packet_id: u16,
    /// Seconds; 0 disables keep-alive.
    keep_alive_interval: u16,
    ping_resp_timeout_ms: u32,
    last_packet_sent_at: u32,
    ping_req_sent_at: u32,
    waiting_for_ping_resp: bool,
    control_packet_sent: bool,
    tracker: PublishTracker,
}

impl<'b, T, C, H> MqttEngine<'b, T, C, H>
where
    T: Transport,
    C: Clock,
    H: MqttEventHandler,
{
    /// Create an engine around borrowed I/O and a fixed buffer.
    ///
    /// The buffer must be non-empty; in practice it bounds the largest
    /// packet that can be sent or received.
    pub fn new(
        transport: T,
        clock: C,
        handler: H,
        buffer: &'b mut [u8],
    ) -> MqttClientResult<Self> {
        if buffer.is_empty() {
            return Err(MqttClientError::BadParameter("buffer must be non-empty"));
        }
        Ok(Self {
            transport,
            clock,
            handler,
            buffer,
            status: ConnectStatus::NotConnected,
            next_packet_id: 1,
            keep_alive_interval: 0,
            ping_resp_timeout_ms: DEFAULT_PING_RESP_TIMEOUT_MS,
            last_packet_sent_at: 0,
            ping_req_sent_at: 0,
            waiting_for_ping_resp: false,
            control_packet_sent: false,
            tracker: PublishTracker::new(),
        })
    }

    pub fn status(&self) -> ConnectStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectStatus::Connected
    }

    /// True when the most recent `process_loop` iteration (or engine
    /// operation) put a packet on the wire.
    pub fn control_packet_sent(&self) -> bool {
        self.control_packet_sent
    }

    pub fn waiting_for_ping_resp(&self) -> bool {
        self.waiting_for_ping_resp
    }

    pub fn tracker(&self) -> &PublishTracker {
        &self.tracker
    }

    /// Allocate the next packet identifier.
    ///
    /// Returns the current value and advances, wrapping from 0xFFFF back to
    /// 1 so that 0 — reserved by MQTT — is never produced.
    pub fn next_packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = if id == u16::MAX { 1 } else { id + 1 };
        id
    }

    /// Establish the MQTT session: send CONNECT, await CONNACK.
    ///
    /// `timeout_ms` bounds the wait for the first CONNACK byte; 0 means a
    /// single read attempt. Returns the broker's session-present flag. A
    /// non-zero CONNACK return code surfaces as
    /// [`MqttClientError::ServerRefused`].
    pub fn connect(
        &mut self,
        options: &ConnectOptions<'_>,
        timeout_ms: u32,
    ) -> MqttClientResult<bool> {
        if self.status == ConnectStatus::Connected {
            return Err(MqttClientError::BadParameter("already connected"));
        }

        let mut connect = MqttConnect::new(
            options.client_id,
            options.keep_alive,
            options.clean_session,
        );
        connect.will = options.will;
        connect.username = options.username;
        connect.password = options.password;
        self.transmit(&MqttPacket::Connect(connect))?;

        let entry_time = self.clock.now_ms();
        let incoming = loop {
            match read_incoming_packet(&mut self.transport) {
                Ok(incoming) => break incoming,
                Err(ParseError::NoData) => {
                    if self.clock.now_ms().wrapping_sub(entry_time) >= timeout_ms {
                        return Err(MqttClientError::NoDataAvailable);
                    }
                }
                Err(ParseError::Io(_)) => return Err(MqttClientError::RecvFailed),
                Err(e) => return Err(e.into()),
            }
        };

        let total = self.stage_incoming(&incoming)?;
        let connack = match Self::parse_staged(&self.buffer[..total])? {
            MqttPacket::ConnAck(connack) => connack,
            _ => return Err(MqttClientError::BadResponse("expected CONNACK")),
        };

        if connack.return_code != 0 {
            return Err(MqttClientError::ServerRefused {
                return_code: connack.return_code,
            });
        }

        self.status = ConnectStatus::Connected;
        self.keep_alive_interval = options.keep_alive;
        self.ping_resp_timeout_ms = if options.ping_resp_timeout_ms == 0 {
            DEFAULT_PING_RESP_TIMEOUT_MS
        } else {
            options.ping_resp_timeout_ms
        };
        self.waiting_for_ping_resp = false;
        debug!(
            "session established, session_present={}, keep_alive={}s",
            connack.session_present, self.keep_alive_interval
        );
        Ok(connack.session_present)
    }

    /// Publish an application message.
    ///
    /// QoS >= 1 requires `publish.packet_id` to carry a fresh non-zero id
    /// (see [`next_packet_id`](Self::next_packet_id)); the exchange is then
    /// tracked until its terminal acknowledgement arrives through
    /// [`process_loop`](Self::process_loop). If the send itself fails the
    /// exchange is abandoned and a retry must use a fresh id.
    pub fn publish(&mut self, publish: &MqttPublish<'_>) -> MqttClientResult<()> {
        if publish.qos == QoS::AtMostOnce {
            return self.transmit(&MqttPacket::Publish(*publish));
        }

        let packet_id = match publish.packet_id {
            Some(id) if id != 0 => id,
            _ => {
                return Err(MqttClientError::BadParameter(
                    "QoS >= 1 publish requires a non-zero packet identifier",
                ))
            }
        };

        self.tracker.reserve(packet_id, publish.qos)?;
        if let Err(e) = self.transmit(&MqttPacket::Publish(*publish)) {
            self.tracker.remove(packet_id, Operation::Send);
            return Err(e);
        }
        self.tracker
            .update_publish(packet_id, publish.qos, Operation::Send)?;
        Ok(())
    }

    /// Request subscriptions; the SUBACK arrives through the process loop.
    pub fn subscribe(
        &mut self,
        packet_id: u16,
        subscriptions: &[TopicSubscription<'_>],
    ) -> MqttClientResult<()> {
        self.transmit(&MqttPacket::Subscribe(MqttSubscribe::new(
            packet_id,
            subscriptions,
        )))
    }

    /// Drop subscriptions; the UNSUBACK arrives through the process loop.
    pub fn unsubscribe(&mut self, packet_id: u16, topic_filters: &[&str]) -> MqttClientResult<()> {
        self.transmit(&MqttPacket::Unsubscribe(MqttUnsubscribe::new(
            packet_id,
            topic_filters,
        )))
    }

    /// Send a PINGREQ immediately and start the ping-response clock.
    pub fn ping(&mut self) -> MqttClientResult<()> {
        self.transmit(&MqttPacket::PingReq(MqttPingReq::new()))?;
        self.waiting_for_ping_resp = true;
        self.ping_req_sent_at = self.clock.now_ms();
        Ok(())
    }

    /// Send DISCONNECT and leave the session.
    pub fn disconnect(&mut self) -> MqttClientResult<()> {
        self.status = ConnectStatus::Disconnecting;
        let result = self.transmit(&MqttPacket::Disconnect(MqttDisconnect::new()));
        self.status = ConnectStatus::NotConnected;
        result
    }

    /// Run the engine's cooperative work step for at least `timeout_ms`.
    ///
    /// Each iteration reads at most one inbound packet, dispatches it
    /// (invoking the event handler and sending any acknowledgement it
    /// requires), then re-evaluates keep-alive. `timeout_ms` of 0 runs
    /// exactly one iteration.
    ///
    /// The first failure ends the call; an idle transport does not. Errors
    /// are terminal for the call, not the connection, but
    /// [`connection_unusable`](MqttClientError::connection_unusable) ones
    /// mean the caller should tear down and reconnect.
    pub fn process_loop(&mut self, timeout_ms: u32) -> MqttClientResult<()> {
        let entry_time = self.clock.now_ms();
        loop {
            self.control_packet_sent = false;

            match read_incoming_packet(&mut self.transport) {
                Ok(incoming) => self.dispatch_incoming(&incoming)?,
                Err(ParseError::NoData) => {}
                Err(ParseError::Io(_)) => return Err(MqttClientError::RecvFailed),
                Err(e) => return Err(e.into()),
            }

            self.check_keep_alive()?;

            if self.clock.now_ms().wrapping_sub(entry_time) >= timeout_ms {
                return Ok(());
            }
        }
    }

    // --- Internal helpers ---

    /// Serialize into the fixed buffer and push every byte out.
    fn transmit(&mut self, packet: &MqttPacket<'_>) -> MqttClientResult<()> {
        let n = packet.to_buffer(self.buffer)?;
        send_all(&mut self.transport, &self.buffer[..n])?;
        self.note_packet_sent();
        Ok(())
    }

    /// Like [`transmit`](Self::transmit), but for acknowledgements the
    /// process loop owes the broker: any failure, including serialization,
    /// is a failed send.
    fn transmit_ack(&mut self, packet: &MqttPacket<'_>) -> MqttClientResult<()> {
        let n = match packet.to_buffer(self.buffer) {
            Ok(n) => n,
            Err(e) => {
                warn!("failed to serialize acknowledgement: {}", e);
                return Err(MqttClientError::SendFailed);
            }
        };
        send_all(&mut self.transport, &self.buffer[..n])?;
        self.note_packet_sent();
        Ok(())
    }

    fn note_packet_sent(&mut self) {
        self.last_packet_sent_at = self.clock.now_ms();
        self.control_packet_sent = true;
    }

    /// Reassemble the fixed header and pull the body off the wire, so the
    /// buffer holds the complete packet for the deserializers.
    fn stage_incoming(&mut self, incoming: &IncomingPacket) -> MqttClientResult<usize> {
        let vbi_len = VariableByteInteger::encoded_len(incoming.remaining_length as u32);
        let total = 1 + vbi_len + incoming.remaining_length;
        if total > self.buffer.len() {
            return Err(MqttClientError::NoMemory {
                needed: total,
                capacity: self.buffer.len(),
            });
        }

        self.buffer[0] = incoming.type_byte;
        let mut cursor = EncodeBuf::new(&mut self.buffer[1..1 + vbi_len]);
        VariableByteInteger::encode_into(&mut cursor, incoming.remaining_length as u32)?;

        let mut read = 0;
        while read < incoming.remaining_length {
            let dst = &mut self.buffer[1 + vbi_len + read..total];
            let want = dst.len();
            match self.transport.recv(dst) {
                // The header promised a body; a transport with nothing left
                // to deliver mid-packet is broken, not idle.
                Ok(0) => return Err(MqttClientError::RecvFailed),
                Ok(n) if n <= want => read += n,
                Ok(_) => return Err(MqttClientError::RecvFailed),
                Err(_) => return Err(MqttClientError::RecvFailed),
            }
        }
        Ok(total)
    }

    fn parse_staged(staged: &[u8]) -> MqttClientResult<MqttPacket<'_>> {
        match MqttPacket::from_bytes(staged)? {
            ParseOk::Packet(packet, _) => Ok(packet),
            ParseOk::Continue(_) => Err(MqttClientError::BadResponse(
                "packet shorter than its remaining length",
            )),
        }
    }

    /// Stage, parse and dispatch one inbound packet.
    fn dispatch_incoming(&mut self, incoming: &IncomingPacket) -> MqttClientResult<()> {
        let total = self.stage_incoming(incoming)?;
        let packet = Self::parse_staged(&self.buffer[..total])?;

        match packet {
            MqttPacket::Publish(publish) => {
                trace!(
                    "PUBLISH in: topic={}, qos={:?}, id={:?}",
                    publish.topic_name,
                    publish.qos,
                    publish.packet_id
                );
                if publish.qos == QoS::AtMostOnce {
                    self.handler.on_event(MqttEvent::MessageReceived(publish));
                    return Ok(());
                }

                // The deserializer guarantees an id for QoS >= 1.
                let packet_id = publish
                    .packet_id
                    .ok_or(MqttClientError::BadResponse("missing packet identifier"))?;
                let qos = publish.qos;

                let is_dup = self.tracker.contains(packet_id, Operation::Receive);
                let state = self
                    .tracker
                    .update_publish(packet_id, qos, Operation::Receive)?;
                if !is_dup {
                    self.handler.on_event(MqttEvent::MessageReceived(publish));
                }

                let (ack, ack_type) = match state {
                    PublishState::PubAckSend => (
                        MqttPacket::PubAck(MqttPubAck::new(packet_id)),
                        ControlPacketType::PUBACK,
                    ),
                    PublishState::PubRecSend => (
                        MqttPacket::PubRec(MqttPubRec::new(packet_id)),
                        ControlPacketType::PUBREC,
                    ),
                    _ => return Err(MqttClientError::IllegalState { packet_id }),
                };
                self.transmit_ack(&ack)?;
                self.tracker.update_ack(packet_id, ack_type, Operation::Send)?;
            }

            MqttPacket::PubAck(ack) => {
                trace!("PUBACK in: id={}", ack.packet_id);
                self.tracker
                    .update_ack(ack.packet_id, ControlPacketType::PUBACK, Operation::Receive)?;
                self.handler.on_event(MqttEvent::PublishComplete {
                    packet_id: ack.packet_id,
                    ack_type: ControlPacketType::PUBACK,
                });
            }

            MqttPacket::PubRec(rec) => {
                trace!("PUBREC in: id={}", rec.packet_id);
                let packet_id = rec.packet_id;
                self.tracker
                    .update_ack(packet_id, ControlPacketType::PUBREC, Operation::Receive)?;
                self.transmit_ack(&MqttPacket::PubRel(MqttPubRel::new(packet_id)))?;
                self.tracker
                    .update_ack(packet_id, ControlPacketType::PUBREL, Operation::Send)?;
            }

            MqttPacket::PubRel(rel) => {
                trace!("PUBREL in: id={}", rel.packet_id);
                let packet_id = rel.packet_id;
                self.tracker
                    .update_ack(packet_id, ControlPacketType::PUBREL, Operation::Receive)?;
                self.transmit_ack(&MqttPacket::PubComp(MqttPubComp::new(packet_id)))?;
                self.tracker
                    .update_ack(packet_id, ControlPacketType::PUBCOMP, Operation::Send)?;
            }

            MqttPacket::PubComp(comp) => {
                trace!("PUBCOMP in: id={}", comp.packet_id);
                self.tracker.update_ack(
                    comp.packet_id,
                    ControlPacketType::PUBCOMP,
                    Operation::Receive,
                )?;
                self.handler.on_event(MqttEvent::PublishComplete {
                    packet_id: comp.packet_id,
                    ack_type: ControlPacketType::PUBCOMP,
                });
            }

            MqttPacket::SubAck(suback) => {
                trace!("SUBACK in: id={}", suback.packet_id);
                self.handler.on_event(MqttEvent::SubscribeAcknowledged {
                    packet_id: suback.packet_id,
                    return_codes: suback.return_codes,
                });
            }

            MqttPacket::UnsubAck(unsuback) => {
                trace!("UNSUBACK in: id={}", unsuback.packet_id);
                self.handler.on_event(MqttEvent::UnsubscribeAcknowledged {
                    packet_id: unsuback.packet_id,
                });
            }

            MqttPacket::PingResp(_) => {
                trace!("PINGRESP in");
                self.waiting_for_ping_resp = false;
            }

            other => {
                warn!("unexpected packet for a connected client: {:?}", other);
                return Err(MqttClientError::BadResponse(
                    "packet type not expected by a connected client",
                ));
            }
        }
        Ok(())
    }

    fn check_keep_alive(&mut self) -> MqttClientResult<()> {
        if self.keep_alive_interval == 0 {
            return Ok(());
        }

        let now = self.clock.now_ms();
        if self.waiting_for_ping_resp {
            if now.wrapping_sub(self.ping_req_sent_at) >= self.ping_resp_timeout_ms {
                warn!("no PINGRESP within {}ms", self.ping_resp_timeout_ms);
                return Err(MqttClientError::KeepAliveTimeout);
            }
        } else if now.wrapping_sub(self.last_packet_sent_at)
            >= u32::from(self.keep_alive_interval) * 1000
        {
            debug!("keep-alive interval elapsed, sending PINGREQ");
            self.ping().map_err(|e| match e {
                MqttClientError::NoMemory { .. } | MqttClientError::BadParameter(_) => {
                    MqttClientError::SendFailed
                }
                other => other,
            })?;
        }
        Ok(())
    }
}

/// Push the whole slice through the transport, retrying short writes. Zero
/// progress, an over-report, or a transport error all fail the send.
fn send_all<T: Transport>(transport: &mut T, mut data: &[u8]) -> MqttClientResult<()> {
    while !data.is_empty() {
        match transport.send(data) {
            Ok(0) => return Err(MqttClientError::SendFailed),
            Ok(n) if n <= data.len() => data = &data[n..],
            Ok(_) => return Err(MqttClientError::SendFailed),
            Err(_) => return Err(MqttClientError::SendFailed),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;

    struct NullTransport;

    impl Transport for NullTransport {
        fn send(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
            Ok(buf.len())
        }

        fn recv(&mut self, _buf: &mut [u8]) -> Result<usize, TransportError> {
            Ok(0)
        }
    }

    struct FixedClock(u32);

    impl Clock for FixedClock {
        fn now_ms(&mut self) -> u32 {
            self.0
        }
    }

    struct NullHandler;

    impl MqttEventHandler for NullHandler {
        fn on_event(&mut self, _event: MqttEvent<'_>) {}
    }

    #[test]
    fn test_new_rejects_empty_buffer() {
        let mut buffer: [u8; 0] = [];
        assert!(matches!(
            MqttEngine::new(NullTransport, FixedClock(0), NullHandler, &mut buffer),
            Err(MqttClientError::BadParameter(_))
        ));
    }

    #[test]
    fn test_new_initial_state() {
        let mut buffer = [0u8; 64];
        let mut engine =
            MqttEngine::new(NullTransport, FixedClock(0), NullHandler, &mut buffer).unwrap();
        assert_eq!(engine.status(), ConnectStatus::NotConnected);
        assert!(!engine.is_connected());
        assert!(!engine.control_packet_sent());
        assert!(!engine.waiting_for_ping_resp());
        assert_eq!(engine.next_packet_id(), 1);
    }

    #[test]
    fn test_next_packet_id_sequence_and_wrap() {
        let mut buffer = [0u8; 64];
        let mut engine =
            MqttEngine::new(NullTransport, FixedClock(0), NullHandler, &mut buffer).unwrap();

        assert_eq!(engine.next_packet_id(), 1);
        assert_eq!(engine.next_packet_id(), 2);

        engine.next_packet_id = 0xFFFF;
        assert_eq!(engine.next_packet_id(), 0xFFFF);
        // 0 is reserved; the counter skips straight back to 1.
        assert_eq!(engine.next_packet_id(), 0x0001);
    }

    #[test]
    fn test_qos1_publish_requires_packet_id() {
        let mut buffer = [0u8; 64];
        let mut engine =
            MqttEngine::new(NullTransport, FixedClock(0), NullHandler, &mut buffer).unwrap();

        let publish = MqttPublish::new("t", QoS::AtLeastOnce, b"x", None, false, false);
        assert!(matches!(
            engine.publish(&publish),
            Err(MqttClientError::BadParameter(_))
        ));

        let publish = MqttPublish::new("t", QoS::AtLeastOnce, b"x", Some(0), false, false);
        assert!(matches!(
            engine.publish(&publish),
            Err(MqttClientError::BadParameter(_))
        ));
    }
}

use serde::Serialize;
use std::convert::TryFrom;

use super::base_data::{EncodeBuf, VariableByteInteger};
use super::parser::packet_type;
use super::parser::{ParseError, ParseOk, MAX_REMAINING_LENGTH};

use crate::mqtt_serde::mqttv3;

/// One decoded MQTT 3.1.1 control packet, borrowing string and payload data
/// from the buffer it was parsed out of.
#[derive(Debug, PartialEq, Clone, Serialize)]
#[serde(tag = "type")]
pub enum MqttPacket<'a> {
    Connect(mqttv3::connect::MqttConnect<'a>),
    ConnAck(mqttv3::connack::MqttConnAck),
    Publish(mqttv3::publish::MqttPublish<'a>),
    PubAck(mqttv3::puback::MqttPubAck),
    PubRec(mqttv3::pubrec::MqttPubRec),
    PubRel(mqttv3::pubrel::MqttPubRel),
    PubComp(mqttv3::pubcomp::MqttPubComp),
    Subscribe(mqttv3::subscribe::MqttSubscribe<'a>),
    SubAck(mqttv3::suback::MqttSubAck<'a>),
    Unsubscribe(mqttv3::unsubscribe::MqttUnsubscribe<'a>),
    UnsubAck(mqttv3::unsuback::MqttUnsubAck),
    PingReq(mqttv3::pingreq::MqttPingReq),
    PingResp(mqttv3::pingresp::MqttPingResp),
    Disconnect(mqttv3::disconnect::MqttDisconnect),
}

impl<'a> MqttPacket<'a> {
    /// Serialize into `out`, returning the number of bytes written.
    pub fn to_buffer(&self, out: &mut [u8]) -> Result<usize, ParseError> {
        match self {
            MqttPacket::Connect(p) => p.to_buffer(out),
            MqttPacket::ConnAck(p) => p.to_buffer(out),
            MqttPacket::Publish(p) => p.to_buffer(out),
            MqttPacket::PubAck(p) => p.to_buffer(out),
            MqttPacket::PubRec(p) => p.to_buffer(out),
            MqttPacket::PubRel(p) => p.to_buffer(out),
            MqttPacket::PubComp(p) => p.to_buffer(out),
            MqttPacket::Subscribe(p) => p.to_buffer(out),
            MqttPacket::SubAck(p) => p.to_buffer(out),
            MqttPacket::Unsubscribe(p) => p.to_buffer(out),
            MqttPacket::UnsubAck(p) => p.to_buffer(out),
            MqttPacket::PingReq(p) => p.to_buffer(out),
            MqttPacket::PingResp(p) => p.to_buffer(out),
            MqttPacket::Disconnect(p) => p.to_buffer(out),
        }
    }

    pub fn packet_size(&self) -> Result<PacketSize, ParseError> {
        match self {
            MqttPacket::Connect(p) => p.packet_size(),
            MqttPacket::ConnAck(p) => p.packet_size(),
            MqttPacket::Publish(p) => p.packet_size(),
            MqttPacket::PubAck(p) => p.packet_size(),
            MqttPacket::PubRec(p) => p.packet_size(),
            MqttPacket::PubRel(p) => p.packet_size(),
            MqttPacket::PubComp(p) => p.packet_size(),
            MqttPacket::Subscribe(p) => p.packet_size(),
            MqttPacket::SubAck(p) => p.packet_size(),
            MqttPacket::Unsubscribe(p) => p.packet_size(),
            MqttPacket::UnsubAck(p) => p.packet_size(),
            MqttPacket::PingReq(p) => p.packet_size(),
            MqttPacket::PingResp(p) => p.packet_size(),
            MqttPacket::Disconnect(p) => p.packet_size(),
        }
    }

    pub fn from_bytes(buffer: &'a [u8]) -> Result<ParseOk<'a>, ParseError> {
        let packet_type_byte = packet_type(buffer)?;
        let packet_type = ControlPacketType::try_from(packet_type_byte)?;

        match packet_type {
            ControlPacketType::CONNECT => mqttv3::connect::MqttConnect::from_bytes(buffer),
            ControlPacketType::CONNACK => mqttv3::connack::MqttConnAck::from_bytes(buffer),
            ControlPacketType::PUBLISH => mqttv3::publish::MqttPublish::from_bytes(buffer),
            ControlPacketType::PUBACK => mqttv3::puback::MqttPubAck::from_bytes(buffer),
            ControlPacketType::PUBREC => mqttv3::pubrec::MqttPubRec::from_bytes(buffer),
            ControlPacketType::PUBREL => mqttv3::pubrel::MqttPubRel::from_bytes(buffer),
            ControlPacketType::PUBCOMP => mqttv3::pubcomp::MqttPubComp::from_bytes(buffer),
            ControlPacketType::SUBSCRIBE => mqttv3::subscribe::MqttSubscribe::from_bytes(buffer),
            ControlPacketType::SUBACK => mqttv3::suback::MqttSubAck::from_bytes(buffer),
            ControlPacketType::UNSUBSCRIBE => {
                mqttv3::unsubscribe::MqttUnsubscribe::from_bytes(buffer)
            }
            ControlPacketType::UNSUBACK => mqttv3::unsuback::MqttUnsubAck::from_bytes(buffer),
            ControlPacketType::PINGREQ => mqttv3::pingreq::MqttPingReq::from_bytes(buffer),
            ControlPacketType::PINGRESP => mqttv3::pingresp::MqttPingResp::from_bytes(buffer),
            ControlPacketType::DISCONNECT => mqttv3::disconnect::MqttDisconnect::from_bytes(buffer),
        }
    }
}

/// Exact on-the-wire size of a packet, probed before serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketSize {
    /// Byte count after the fixed header.
    pub remaining_length: usize,
    /// Fixed header plus `remaining_length`.
    pub total_length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlPacketType {
    CONNECT = 1,
    CONNACK = 2,
    PUBLISH = 3,
    PUBACK = 4,
    PUBREC = 5,
    PUBREL = 6,
    PUBCOMP = 7,
    SUBSCRIBE = 8,
    SUBACK = 9,
    UNSUBSCRIBE = 10,
    UNSUBACK = 11,
    PINGREQ = 12,
    PINGRESP = 13,
    DISCONNECT = 14,
}

impl TryFrom<u8> for ControlPacketType {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ControlPacketType::CONNECT),
            2 => Ok(ControlPacketType::CONNACK),
            3 => Ok(ControlPacketType::PUBLISH),
            4 => Ok(ControlPacketType::PUBACK),
            5 => Ok(ControlPacketType::PUBREC),
            6 => Ok(ControlPacketType::PUBREL),
            7 => Ok(ControlPacketType::PUBCOMP),
            8 => Ok(ControlPacketType::SUBSCRIBE),
            9 => Ok(ControlPacketType::SUBACK),
            10 => Ok(ControlPacketType::UNSUBSCRIBE),
            11 => Ok(ControlPacketType::UNSUBACK),
            12 => Ok(ControlPacketType::PINGREQ),
            13 => Ok(ControlPacketType::PINGRESP),
            14 => Ok(ControlPacketType::DISCONNECT),
            _ => Err(ParseError::InvalidPacketType),
        }
    }
}

/// Shared serialize/deserialize surface of every control packet.
///
/// Serialization is split in two so callers can probe the exact size first:
/// [`packet_size`](Self::packet_size) computes the remaining length (and
/// validates the fields while doing so), [`to_buffer`](Self::to_buffer)
/// writes the fixed header and body into a caller-owned buffer. Nothing here
/// allocates.
pub trait MqttControlPacket<'a>: Sized {
    // MQTT 3.1.1: 2.2.1, MQTT control packet type
    fn control_packet_type(&self) -> u8;

    // MQTT 3.1.1: 2.2.2, flags in the fixed header
    fn flags(&self) -> u8 {
        0u8
    }

    /// Byte count of variable header plus payload. Implementations validate
    /// field combinations here and fail with `BadInputs`.
    fn remaining_length(&self) -> Result<usize, ParseError>;

    /// Write the variable header and payload (everything after the fixed
    /// header) into `buf`.
    fn encode_body(&self, buf: &mut EncodeBuf<'_>) -> Result<(), ParseError>;

    // decoder
    fn from_bytes(buffer: &'a [u8]) -> Result<ParseOk<'a>, ParseError>;

    /// Probe the exact serialized size without writing anything.
    fn packet_size(&self) -> Result<PacketSize, ParseError> {
        let remaining_length = self.remaining_length()?;
        if remaining_length > MAX_REMAINING_LENGTH {
            return Err(ParseError::BadInputs("packet exceeds maximum MQTT size"));
        }
        let total_length =
            1 + VariableByteInteger::encoded_len(remaining_length as u32) + remaining_length;
        Ok(PacketSize {
            remaining_length,
            total_length,
        })
    }

    /// Serialize the whole packet into `out`, returning the bytes written.
    ///
    /// Fails with `NoSpace` when the packet does not fit and with
    /// `BadInputs` when the fields cannot form a legal packet; `out` may be
    /// partially overwritten on failure.
    fn to_buffer(&self, out: &mut [u8]) -> Result<usize, ParseError> {
        let size = self.packet_size()?;
        if size.total_length > out.len() {
            return Err(ParseError::NoSpace {
                needed: size.total_length,
                available: out.len(),
            });
        }

        let mut buf = EncodeBuf::new(out);
        buf.push((self.control_packet_type() << 4) | self.flags())?;
        VariableByteInteger::encode_into(&mut buf, size.remaining_length as u32)?;
        self.encode_body(&mut buf)?;
        debug_assert_eq!(buf.len(), size.total_length);
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_packet_type_json() {
        let pkt = MqttPacket::Connect(mqttv3::connect::MqttConnect::new("test_client", 60, true));

        let json = serde_json::to_string(&pkt).unwrap();

        let expected = "{\"type\":\"Connect\",\"clean_session\":true,\"keep_alive\":60,\"client_id\":\"test_client\",\"will\":null,\"username\":null,\"password\":null}";
        assert_eq!(json, expected);
    }

    #[test]
    fn test_unknown_packet_type() {
        assert!(matches!(
            ControlPacketType::try_from(0),
            Err(ParseError::InvalidPacketType)
        ));
        assert!(matches!(
            ControlPacketType::try_from(15),
            Err(ParseError::InvalidPacketType)
        ));
    }
}

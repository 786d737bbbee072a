// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::base_data::{EncodeBuf, TwoByteInteger};
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{packet_type, parse_remaining_length, ParseError, ParseOk};

/// Represents the PUBACK packet in MQTT v3.1.1.
///
/// The PUBACK packet is the response to a PUBLISH packet with QoS level 1.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct MqttPubAck {
    /// The packet identifier from the PUBLISH packet being acknowledged.
    pub packet_id: u16,
}

impl MqttPubAck {
    /// Creates a new `MqttPubAck` packet.
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

impl<'a> MqttControlPacket<'a> for MqttPubAck {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::PUBACK as u8
    }

    fn remaining_length(&self) -> Result<usize, ParseError> {
        if self.packet_id == 0 {
            return Err(ParseError::BadInputs("packet identifier must be non-zero"));
        }
        Ok(2)
    }

    fn encode_body(&self, buf: &mut EncodeBuf<'_>) -> Result<(), ParseError> {
        TwoByteInteger::encode_into(buf, self.packet_id)
    }

    fn from_bytes(buffer: &'a [u8]) -> Result<ParseOk<'a>, ParseError> {
        let packet_type = packet_type(buffer)?;
        if packet_type != ControlPacketType::PUBACK as u8 {
            return Err(ParseError::InvalidPacketType);
        }

        // Bits 3,2,1,0 of the fixed header MUST be 0.
        if buffer[0] & 0x0F != 0x00 {
            return Err(ParseError::Malformed("PUBACK fixed header flags must be 0"));
        }

        let (size, vbi_len) = parse_remaining_length(&buffer[1..])?;
        let total_len = 1 + vbi_len + size;

        if total_len > buffer.len() {
            return Ok(ParseOk::Continue(total_len - buffer.len()));
        }

        // Remaining length MUST be 2.
        if size != 2 {
            return Err(ParseError::Malformed(
                "PUBACK must have a remaining length of 2",
            ));
        }

        let packet_id = u16::from_be_bytes([buffer[1 + vbi_len], buffer[1 + vbi_len + 1]]);
        if packet_id == 0 {
            return Err(ParseError::Malformed("zero packet identifier"));
        }

        Ok(ParseOk::Packet(
            MqttPacket::PubAck(MqttPubAck::new(packet_id)),
            total_len,
        ))
    }
}

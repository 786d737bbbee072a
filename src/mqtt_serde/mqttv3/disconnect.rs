// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::base_data::EncodeBuf;
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{packet_type, parse_remaining_length, ParseError, ParseOk};

/// Represents the DISCONNECT packet in MQTT v3.1.1.
///
/// The final packet a client sends; in v3.1.1 it has no body and is never
/// sent by the broker.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MqttDisconnect;

impl MqttDisconnect {
    pub fn new() -> Self {
        Self
    }
}

impl<'a> MqttControlPacket<'a> for MqttDisconnect {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::DISCONNECT as u8
    }

    fn remaining_length(&self) -> Result<usize, ParseError> {
        Ok(0)
    }

    fn encode_body(&self, _buf: &mut EncodeBuf<'_>) -> Result<(), ParseError> {
        Ok(())
    }

    fn from_bytes(buffer: &'a [u8]) -> Result<ParseOk<'a>, ParseError> {
        let packet_type = packet_type(buffer)?;
        if packet_type != ControlPacketType::DISCONNECT as u8 {
            return Err(ParseError::InvalidPacketType);
        }
        if buffer[0] & 0x0F != 0x00 {
            return Err(ParseError::Malformed(
                "DISCONNECT fixed header flags must be 0",
            ));
        }

        let (size, vbi_len) = parse_remaining_length(&buffer[1..])?;
        if size != 0 {
            return Err(ParseError::Malformed("DISCONNECT must have no body"));
        }

        Ok(ParseOk::Packet(
            MqttPacket::Disconnect(MqttDisconnect::new()),
            1 + vbi_len,
        ))
    }
}

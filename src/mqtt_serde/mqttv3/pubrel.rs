// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::base_data::{EncodeBuf, TwoByteInteger};
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{packet_type, parse_remaining_length, ParseError, ParseOk};

/// Represents the PUBREL packet in MQTT v3.1.1, the second step of the QoS 2
/// handshake.
///
/// PUBREL is the one acknowledgement whose fixed-header flags are not zero:
/// bit 1 must be set (0x62 as the first byte).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct MqttPubRel {
    pub packet_id: u16,
}

impl MqttPubRel {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

impl<'a> MqttControlPacket<'a> for MqttPubRel {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::PUBREL as u8
    }

    fn flags(&self) -> u8 {
        0x02
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
        if packet_type != ControlPacketType::PUBREL as u8 {
            return Err(ParseError::InvalidPacketType);
        }
        if buffer[0] & 0x0F != 0x02 {
            return Err(ParseError::Malformed("PUBREL fixed header flags must be 0x02"));
        }

        let (size, vbi_len) = parse_remaining_length(&buffer[1..])?;
        let total_len = 1 + vbi_len + size;

        if total_len > buffer.len() {
            return Ok(ParseOk::Continue(total_len - buffer.len()));
        }
        if size != 2 {
            return Err(ParseError::Malformed(
                "PUBREL must have a remaining length of 2",
            ));
        }

        let packet_id = u16::from_be_bytes([buffer[1 + vbi_len], buffer[1 + vbi_len + 1]]);
        if packet_id == 0 {
            return Err(ParseError::Malformed("zero packet identifier"));
        }

        Ok(ParseOk::Packet(
            MqttPacket::PubRel(MqttPubRel::new(packet_id)),
            total_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pubrel_serialization() {
        let pubrel = MqttPubRel::new(0x1234);
        let mut raw = [0u8; 8];
        let n = pubrel.to_buffer(&mut raw).unwrap();
        assert_eq!(&raw[..n], &[0x62, 0x02, 0x12, 0x34]);
    }

    #[test]
    fn test_pubrel_requires_flag_bit() {
        // Flags 0x00 instead of the mandated 0x02.
        let bytes = vec![0x60, 0x02, 0x12, 0x34];
        assert!(matches!(
            MqttPubRel::from_bytes(&bytes),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_pubrel_roundtrip() {
        let original = MqttPubRel::new(42);
        let mut raw = [0u8; 8];
        let n = original.to_buffer(&mut raw).unwrap();
        match MqttPubRel::from_bytes(&raw[..n]).unwrap() {
            ParseOk::Packet(MqttPacket::PubRel(parsed), _) => assert_eq!(original, parsed),
            _ => panic!("Expected PUBREL packet"),
        }
    }
}

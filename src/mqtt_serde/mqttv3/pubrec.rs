// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::base_data::{EncodeBuf, TwoByteInteger};
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{packet_type, parse_remaining_length, ParseError, ParseOk};

/// Represents the PUBREC packet in MQTT v3.1.1, the first response in the
/// QoS 2 handshake.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct MqttPubRec {
    pub packet_id: u16,
}

impl MqttPubRec {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

impl<'a> MqttControlPacket<'a> for MqttPubRec {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::PUBREC as u8
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
        if packet_type != ControlPacketType::PUBREC as u8 {
            return Err(ParseError::InvalidPacketType);
        }
        if buffer[0] & 0x0F != 0x00 {
            return Err(ParseError::Malformed("PUBREC fixed header flags must be 0"));
        }

        let (size, vbi_len) = parse_remaining_length(&buffer[1..])?;
        let total_len = 1 + vbi_len + size;

        if total_len > buffer.len() {
            return Ok(ParseOk::Continue(total_len - buffer.len()));
        }
        if size != 2 {
            return Err(ParseError::Malformed(
                "PUBREC must have a remaining length of 2",
            ));
        }

        let packet_id = u16::from_be_bytes([buffer[1 + vbi_len], buffer[1 + vbi_len + 1]]);
        if packet_id == 0 {
            return Err(ParseError::Malformed("zero packet identifier"));
        }

        Ok(ParseOk::Packet(
            MqttPacket::PubRec(MqttPubRec::new(packet_id)),
            total_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pubrec_roundtrip() {
        let original = MqttPubRec::new(7);
        let mut raw = [0u8; 8];
        let n = original.to_buffer(&mut raw).unwrap();
        assert_eq!(&raw[..n], &[0x50, 0x02, 0x00, 0x07]);
        match MqttPubRec::from_bytes(&raw[..n]).unwrap() {
            ParseOk::Packet(MqttPacket::PubRec(parsed), _) => assert_eq!(original, parsed),
            _ => panic!("Expected PUBREC packet"),
        }
    }

    #[test]
    fn test_pubrec_invalid_flags() {
        let bytes = vec![0x52, 0x02, 0x00, 0x07];
        assert!(MqttPubRec::from_bytes(&bytes).is_err());
    }
}

// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::base_data::EncodeBuf;
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{packet_type, parse_remaining_length, ParseError, ParseOk};

/// Represents the CONNACK packet in MQTT v3.1.1.
///
/// First packet sent by the broker in response to CONNECT. A non-zero
/// return code means the connection was refused.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct MqttConnAck {
    pub session_present: bool,
    pub return_code: u8,
}

impl MqttConnAck {
    pub fn new(session_present: bool, return_code: u8) -> Self {
        Self {
            session_present,
            return_code,
        }
    }
}

impl<'a> MqttControlPacket<'a> for MqttConnAck {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::CONNACK as u8
    }

    fn remaining_length(&self) -> Result<usize, ParseError> {
        if self.return_code > 5 {
            return Err(ParseError::BadInputs("CONNACK return code out of range"));
        }
        if self.session_present && self.return_code != 0 {
            return Err(ParseError::BadInputs(
                "session_present requires a zero return code",
            ));
        }
        Ok(2)
    }

    fn encode_body(&self, buf: &mut EncodeBuf<'_>) -> Result<(), ParseError> {
        buf.push(self.session_present as u8)?;
        buf.push(self.return_code)
    }

    fn from_bytes(buffer: &'a [u8]) -> Result<ParseOk<'a>, ParseError> {
        let packet_type = packet_type(buffer)?;
        if packet_type != ControlPacketType::CONNACK as u8 {
            return Err(ParseError::InvalidPacketType);
        }
        if buffer[0] & 0x0F != 0x00 {
            return Err(ParseError::Malformed("CONNACK fixed header flags must be 0"));
        }

        let (size, vbi_len) = parse_remaining_length(&buffer[1..])?;
        let total_len = 1 + vbi_len + size;

        if total_len > buffer.len() {
            return Ok(ParseOk::Continue(total_len - buffer.len()));
        }

        if size != 2 {
            return Err(ParseError::Malformed(
                "CONNACK must have a remaining length of 2",
            ));
        }

        let ack_flags = buffer[1 + vbi_len];
        if ack_flags & 0xFE != 0 {
            return Err(ParseError::Malformed(
                "CONNACK acknowledge flags bits 7-1 must be 0",
            ));
        }
        let session_present = ack_flags & 0x01 != 0;

        let return_code = buffer[1 + vbi_len + 1];
        if return_code > 5 {
            return Err(ParseError::Malformed("CONNACK return code out of range"));
        }
        if session_present && return_code != 0 {
            // MQTT-3.2.2-4: a refused connection never resumes a session.
            return Err(ParseError::Malformed(
                "CONNACK session present with non-zero return code",
            ));
        }

        Ok(ParseOk::Packet(
            MqttPacket::ConnAck(MqttConnAck::new(session_present, return_code)),
            total_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connack_serialization() {
        let connack = MqttConnAck::new(true, 0);
        let mut raw = [0u8; 8];
        let n = connack.to_buffer(&mut raw).unwrap();
        assert_eq!(&raw[..n], &[0x20, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn test_connack_roundtrip() {
        let original = MqttConnAck::new(false, 5);
        let mut raw = [0u8; 8];
        let n = original.to_buffer(&mut raw).unwrap();
        match MqttConnAck::from_bytes(&raw[..n]).unwrap() {
            ParseOk::Packet(MqttPacket::ConnAck(parsed), consumed) => {
                assert_eq!(consumed, 4);
                assert_eq!(original, parsed);
            }
            _ => panic!("Expected CONNACK packet"),
        }
    }

    #[test]
    fn test_connack_reserved_ack_flags() {
        let bytes = vec![0x20, 0x02, 0x02, 0x00];
        assert!(matches!(
            MqttConnAck::from_bytes(&bytes),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_connack_session_present_with_refusal() {
        let bytes = vec![0x20, 0x02, 0x01, 0x02];
        assert!(MqttConnAck::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_connack_return_code_out_of_range() {
        let bytes = vec![0x20, 0x02, 0x00, 0x06];
        assert!(MqttConnAck::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_connack_incomplete() {
        let bytes = vec![0x20, 0x02, 0x00];
        match MqttConnAck::from_bytes(&bytes).unwrap() {
            ParseOk::Continue(needed) => assert_eq!(needed, 1),
            other => panic!("Expected Continue, got {:?}", other),
        }
    }
}

// SPDX-License-Identifier: MPL-2.0

use serde::Serialize;

use crate::mqtt_serde::base_data::{EncodeBuf, TwoByteInteger};
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{packet_type, parse_remaining_length, ParseError, ParseOk};

/// SUBACK return code for a refused subscription.
pub const SUBACK_FAILURE: u8 = 0x80;

/// Represents the SUBACK packet in MQTT v3.1.1.
///
/// Carries one return code per topic filter of the SUBSCRIBE packet it
/// answers: the granted QoS (0, 1, 2) or 0x80 for failure.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub struct MqttSubAck<'a> {
    pub packet_id: u16,
    pub return_codes: &'a [u8],
}

impl<'a> MqttSubAck<'a> {
    pub fn new(packet_id: u16, return_codes: &'a [u8]) -> Self {
        Self {
            packet_id,
            return_codes,
        }
    }
}

fn validate_return_codes(codes: &[u8]) -> Result<(), ParseError> {
    for &code in codes {
        if code > 2 && code != SUBACK_FAILURE {
            return Err(ParseError::Malformed("SUBACK return code out of range"));
        }
    }
    Ok(())
}

impl<'a> MqttControlPacket<'a> for MqttSubAck<'a> {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::SUBACK as u8
    }

    fn remaining_length(&self) -> Result<usize, ParseError> {
        if self.packet_id == 0 {
            return Err(ParseError::BadInputs("packet identifier must be non-zero"));
        }
        if self.return_codes.is_empty() {
            return Err(ParseError::BadInputs(
                "SUBACK requires at least one return code",
            ));
        }
        validate_return_codes(self.return_codes)
            .map_err(|_| ParseError::BadInputs("SUBACK return code out of range"))?;
        Ok(2 + self.return_codes.len())
    }

    fn encode_body(&self, buf: &mut EncodeBuf<'_>) -> Result<(), ParseError> {
        TwoByteInteger::encode_into(buf, self.packet_id)?;
        buf.extend_from_slice(self.return_codes)
    }

    fn from_bytes(buffer: &'a [u8]) -> Result<ParseOk<'a>, ParseError> {
        let packet_type = packet_type(buffer)?;
        if packet_type != ControlPacketType::SUBACK as u8 {
            return Err(ParseError::InvalidPacketType);
        }
        if buffer[0] & 0x0F != 0x00 {
            return Err(ParseError::Malformed("SUBACK fixed header flags must be 0"));
        }

        let (size, vbi_len) = parse_remaining_length(&buffer[1..])?;
        let mut offset = 1 + vbi_len;
        let total_len = offset + size;

        if total_len > buffer.len() {
            return Ok(ParseOk::Continue(total_len - buffer.len()));
        }
        if size < 3 {
            return Err(ParseError::Malformed(
                "SUBACK must carry a packet id and at least one return code",
            ));
        }

        let (packet_id, consumed) = TwoByteInteger::decode(&buffer[offset..total_len])?;
        offset += consumed;
        if packet_id == 0 {
            return Err(ParseError::Malformed("zero packet identifier"));
        }

        let return_codes = &buffer[offset..total_len];
        validate_return_codes(return_codes)?;

        Ok(ParseOk::Packet(
            MqttPacket::SubAck(MqttSubAck::new(packet_id, return_codes)),
            total_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suback_roundtrip() {
        let original = MqttSubAck::new(10, &[0, 1, SUBACK_FAILURE]);
        let mut raw = [0u8; 16];
        let n = original.to_buffer(&mut raw).unwrap();
        assert_eq!(&raw[..n], &[0x90, 5, 0x00, 0x0A, 0x00, 0x01, 0x80]);
        match MqttSubAck::from_bytes(&raw[..n]).unwrap() {
            ParseOk::Packet(MqttPacket::SubAck(parsed), _) => assert_eq!(original, parsed),
            _ => panic!("Expected SUBACK packet"),
        }
    }

    #[test]
    fn test_suback_invalid_return_code() {
        let bytes = vec![0x90, 3, 0x00, 0x0A, 0x03];
        assert!(matches!(
            MqttSubAck::from_bytes(&bytes),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_suback_without_return_codes() {
        let bytes = vec![0x90, 2, 0x00, 0x0A];
        assert!(MqttSubAck::from_bytes(&bytes).is_err());
    }
}

use serde::Serialize;

use crate::mqtt_serde::base_data::{EncodeBuf, TwoByteInteger, Utf8String};
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{
    packet_type, parse_remaining_length, parse_utf8_string, ParseError, ParseOk,
};
use crate::mqtt_serde::{validate_topic_name, QoS};

/// Represents the PUBLISH packet in MQTT v3.1.1.
///
/// A PUBLISH packet is sent from a client to a broker or from a broker to a
/// client to transport an application message. Topic and payload are
/// borrowed; decoded packets point straight into the receive buffer.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub struct MqttPublish<'a> {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic_name: &'a str,
    /// Packet identifier is only present for QoS levels 1 and 2.
    pub packet_id: Option<u16>,
    pub payload: &'a [u8],
}

impl<'a> MqttPublish<'a> {
    /// Creates a new `MqttPublish` packet.
    pub fn new(
        topic_name: &'a str,
        qos: QoS,
        payload: &'a [u8],
        packet_id: Option<u16>,
        retain: bool,
        dup: bool,
    ) -> Self {
        Self {
            dup,
            qos,
            retain,
            topic_name,
            packet_id,
            payload,
        }
    }
}

impl<'a> MqttControlPacket<'a> for MqttPublish<'a> {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::PUBLISH as u8
    }

    fn flags(&self) -> u8 {
        ((self.dup as u8) << 3) | ((self.qos as u8) << 1) | (self.retain as u8)
    }

    fn remaining_length(&self) -> Result<usize, ParseError> {
        validate_topic_name(self.topic_name)?;
        if self.qos == QoS::AtMostOnce {
            if self.dup {
                return Err(ParseError::BadInputs("DUP cannot be set at QoS 0"));
            }
        } else {
            match self.packet_id {
                None => {
                    return Err(ParseError::BadInputs(
                        "packet identifier is required for QoS > 0",
                    ))
                }
                Some(0) => return Err(ParseError::BadInputs("packet identifier must be non-zero")),
                Some(_) => {}
            }
        }

        let id_len = if self.qos == QoS::AtMostOnce { 0 } else { 2 };
        Ok(Utf8String::encoded_len(self.topic_name) + id_len + self.payload.len())
    }

    fn encode_body(&self, buf: &mut EncodeBuf<'_>) -> Result<(), ParseError> {
        Utf8String::encode_into(buf, self.topic_name)?;
        if self.qos > QoS::AtMostOnce {
            // remaining_length() has already established the id is present.
            let packet_id = self
                .packet_id
                .ok_or(ParseError::BadInputs("packet identifier is required"))?;
            TwoByteInteger::encode_into(buf, packet_id)?;
        }
        buf.extend_from_slice(self.payload)
    }

    fn from_bytes(buffer: &'a [u8]) -> Result<ParseOk<'a>, ParseError> {
        let packet_type = packet_type(buffer)?;
        if packet_type != ControlPacketType::PUBLISH as u8 {
            return Err(ParseError::InvalidPacketType);
        }

        let flags = buffer[0] & 0x0F;
        let dup = (flags & 0x08) > 0;
        let qos = QoS::try_from((flags & 0x06) >> 1)?;
        let retain = (flags & 0x01) > 0;

        if dup && qos == QoS::AtMostOnce {
            return Err(ParseError::Malformed("DUP set on a QoS 0 publish"));
        }

        let (size, vbi_len) = parse_remaining_length(&buffer[1..])?;
        let mut offset = 1 + vbi_len;
        let total_len = offset + size;

        if total_len > buffer.len() {
            return Ok(ParseOk::Continue(total_len - buffer.len()));
        }

        // Variable header.
        let (topic_name, consumed) = parse_utf8_string(&buffer[offset..total_len])?;
        offset += consumed;
        if topic_name.is_empty() {
            return Err(ParseError::Malformed("PUBLISH topic name is empty"));
        }

        let packet_id = if qos > QoS::AtMostOnce {
            if offset + 2 > total_len {
                return Err(ParseError::Malformed("missing packet identifier for QoS > 0"));
            }
            let id = u16::from_be_bytes([buffer[offset], buffer[offset + 1]]);
            if id == 0 {
                return Err(ParseError::Malformed("zero packet identifier"));
            }
            offset += 2;
            Some(id)
        } else {
            None
        };

        // Payload.
        let payload = &buffer[offset..total_len];

        Ok(ParseOk::Packet(
            MqttPacket::Publish(MqttPublish {
                dup,
                qos,
                retain,
                topic_name,
                packet_id,
                payload,
            }),
            total_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_vec(packet: &MqttPublish<'_>) -> Vec<u8> {
        let mut raw = [0u8; 128];
        let n = packet.to_buffer(&mut raw).unwrap();
        raw[..n].to_vec()
    }

    #[test]
    fn test_publish_qos0_serialization() {
        let publish = MqttPublish::new("a/b", QoS::AtMostOnce, &[1, 2, 3], None, false, false);
        assert_eq!(
            to_vec(&publish),
            vec![
                0x30, // Type + flags
                8,    // Remaining length (5 topic + 3 payload)
                0x00, 0x03, b'a', b'/', b'b', // Topic
                1, 2, 3, // Payload
            ]
        );
    }

    #[test]
    fn test_publish_qos1_serialization() {
        let publish = MqttPublish::new("a/b", QoS::AtLeastOnce, &[1, 2, 3], Some(123), true, true);
        assert_eq!(
            to_vec(&publish),
            vec![
                0x3B, // Type + DUP, QoS1, RETAIN
                10,   // Remaining length (5 topic + 2 packet id + 3 payload)
                0x00, 0x03, b'a', b'/', b'b', // Topic
                0x00, 0x7B, // Packet ID
                1, 2, 3, // Payload
            ]
        );
    }

    #[test]
    fn test_publish_qos0_deserialization() {
        let bytes = vec![0x30, 8, 0x00, 0x03, b'a', b'/', b'b', 1, 2, 3];
        match MqttPublish::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(MqttPacket::Publish(p), len) => {
                assert_eq!(len, 10);
                assert!(!p.dup);
                assert_eq!(p.qos, QoS::AtMostOnce);
                assert!(!p.retain);
                assert_eq!(p.topic_name, "a/b");
                assert_eq!(p.packet_id, None);
                assert_eq!(p.payload, &[1, 2, 3]);
            }
            _ => panic!("Deserialization failed"),
        }
    }

    #[test]
    fn test_publish_roundtrip_qos2() {
        let original = MqttPublish::new(
            "qos/2/topic",
            QoS::ExactlyOnce,
            b"hello qos 2",
            Some(54321),
            false,
            true,
        );
        let bytes = to_vec(&original);
        match MqttPublish::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(MqttPacket::Publish(parsed), _) => {
                assert_eq!(original, parsed);
            }
            _ => panic!("Expected PUBLISH packet"),
        }
    }

    #[test]
    fn test_publish_empty_payload_roundtrip() {
        let original = MqttPublish::new("t", QoS::AtLeastOnce, b"", Some(7), false, false);
        let bytes = to_vec(&original);
        match MqttPublish::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(MqttPacket::Publish(parsed), _) => {
                assert_eq!(original, parsed);
                assert!(parsed.payload.is_empty());
            }
            _ => panic!("Expected PUBLISH packet"),
        }
    }

    #[test]
    fn test_publish_invalid_qos() {
        let bytes = vec![0x3E, 0x01, 0x00]; // QoS 3 is invalid
        assert!(matches!(
            MqttPublish::from_bytes(&bytes),
            Err(ParseError::InvalidQos)
        ));
    }

    #[test]
    fn test_publish_dup_at_qos0() {
        let bytes = vec![0x38, 5, 0x00, 0x03, b'a', b'/', b'b'];
        assert!(matches!(
            MqttPublish::from_bytes(&bytes),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_publish_missing_packet_id() {
        // QoS 1 but no packet ID
        let bytes = vec![0x32, 5, 0x00, 0x03, b'a', b'/', b'b'];
        assert!(MqttPublish::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_publish_zero_packet_id() {
        let bytes = vec![0x32, 7, 0x00, 0x03, b'a', b'/', b'b', 0x00, 0x00];
        assert!(MqttPublish::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_publish_serialize_requires_packet_id() {
        let publish = MqttPublish::new("a/b", QoS::AtLeastOnce, &[], None, false, false);
        let mut raw = [0u8; 32];
        assert!(matches!(
            publish.to_buffer(&mut raw),
            Err(ParseError::BadInputs(_))
        ));
    }

    #[test]
    fn test_publish_serialize_rejects_wildcard_topic() {
        let publish = MqttPublish::new("a/+", QoS::AtMostOnce, &[], None, false, false);
        let mut raw = [0u8; 32];
        assert!(publish.to_buffer(&mut raw).is_err());
    }
}

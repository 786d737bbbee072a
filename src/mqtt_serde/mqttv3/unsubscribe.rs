// SPDX-License-Identifier: MPL-2.0

use serde::Serialize;

use crate::mqtt_serde::base_data::{EncodeBuf, TwoByteInteger, Utf8String};
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{
    packet_type, parse_remaining_length, parse_utf8_string, ParseError, ParseOk,
};
use crate::mqtt_serde::validate_topic_filter;

/// The filter list, caller-supplied for encoding or a validated wire payload
/// after decoding.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
enum TopicFilters<'a> {
    Requested(&'a [&'a str]),
    Wire(&'a [u8]),
}

/// Represents the UNSUBSCRIBE packet in MQTT v3.1.1.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub struct MqttUnsubscribe<'a> {
    pub packet_id: u16,
    topic_filters: TopicFilters<'a>,
}

impl<'a> MqttUnsubscribe<'a> {
    pub fn new(packet_id: u16, topic_filters: &'a [&'a str]) -> Self {
        Self {
            packet_id,
            topic_filters: TopicFilters::Requested(topic_filters),
        }
    }

    /// Iterate the topic filters carried by this packet.
    pub fn topic_filters(&self) -> TopicFilterIter<'a> {
        match self.topic_filters {
            TopicFilters::Requested(f) => TopicFilterIter::Requested(f.iter()),
            TopicFilters::Wire(raw) => TopicFilterIter::Wire(raw),
        }
    }
}

pub enum TopicFilterIter<'a> {
    Requested(core::slice::Iter<'a, &'a str>),
    Wire(&'a [u8]),
}

impl<'a> Iterator for TopicFilterIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            TopicFilterIter::Requested(iter) => iter.next().copied(),
            TopicFilterIter::Wire(raw) => {
                let current = *raw;
                if current.is_empty() {
                    return None;
                }
                let (filter, consumed) = Utf8String::decode(current).ok()?;
                *raw = &current[consumed..];
                Some(filter)
            }
        }
    }
}

impl<'a> MqttControlPacket<'a> for MqttUnsubscribe<'a> {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::UNSUBSCRIBE as u8
    }

    // MQTT-3.10.1-1: bit 1 of the fixed header must be set.
    fn flags(&self) -> u8 {
        0x02
    }

    fn remaining_length(&self) -> Result<usize, ParseError> {
        if self.packet_id == 0 {
            return Err(ParseError::BadInputs("packet identifier must be non-zero"));
        }
        match self.topic_filters {
            TopicFilters::Requested(filters) => {
                if filters.is_empty() {
                    return Err(ParseError::BadInputs(
                        "UNSUBSCRIBE requires at least one topic filter",
                    ));
                }
                let mut len = 2;
                for filter in filters {
                    validate_topic_filter(filter)?;
                    len += Utf8String::encoded_len(filter);
                }
                Ok(len)
            }
            TopicFilters::Wire(raw) => Ok(2 + raw.len()),
        }
    }

    fn encode_body(&self, buf: &mut EncodeBuf<'_>) -> Result<(), ParseError> {
        TwoByteInteger::encode_into(buf, self.packet_id)?;
        match self.topic_filters {
            TopicFilters::Requested(filters) => {
                for filter in filters {
                    Utf8String::encode_into(buf, filter)?;
                }
                Ok(())
            }
            TopicFilters::Wire(raw) => buf.extend_from_slice(raw),
        }
    }

    fn from_bytes(buffer: &'a [u8]) -> Result<ParseOk<'a>, ParseError> {
        let packet_type = packet_type(buffer)?;
        if packet_type != ControlPacketType::UNSUBSCRIBE as u8 {
            return Err(ParseError::InvalidPacketType);
        }
        if buffer[0] & 0x0F != 0x02 {
            return Err(ParseError::Malformed(
                "UNSUBSCRIBE fixed header flags must be 0x02",
            ));
        }

        let (size, vbi_len) = parse_remaining_length(&buffer[1..])?;
        let mut offset = 1 + vbi_len;
        let total_len = offset + size;

        if total_len > buffer.len() {
            return Ok(ParseOk::Continue(total_len - buffer.len()));
        }

        let (packet_id, consumed) = TwoByteInteger::decode(&buffer[offset..total_len])?;
        offset += consumed;
        if packet_id == 0 {
            return Err(ParseError::Malformed("zero packet identifier"));
        }

        let payload = &buffer[offset..total_len];
        if payload.is_empty() {
            return Err(ParseError::Malformed("UNSUBSCRIBE payload is empty"));
        }

        let mut cursor = 0;
        while cursor < payload.len() {
            let (filter, consumed) = parse_utf8_string(&payload[cursor..])?;
            if filter.is_empty() {
                return Err(ParseError::Malformed("empty topic filter"));
            }
            cursor += consumed;
        }

        Ok(ParseOk::Packet(
            MqttPacket::Unsubscribe(MqttUnsubscribe {
                packet_id,
                topic_filters: TopicFilters::Wire(payload),
            }),
            total_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsubscribe_serialization() {
        let filters = ["a/b"];
        let unsubscribe = MqttUnsubscribe::new(10, &filters);
        let mut raw = [0u8; 32];
        let n = unsubscribe.to_buffer(&mut raw).unwrap();
        assert_eq!(
            &raw[..n],
            &[
                0xA2, 7, // type + flags, remaining length
                0x00, 0x0A, // packet id
                0x00, 0x03, b'a', b'/', b'b', // filter
            ]
        );
    }

    #[test]
    fn test_unsubscribe_roundtrip() {
        let filters = ["sensors/+/temp", "alerts/#"];
        let original = MqttUnsubscribe::new(77, &filters);
        let mut raw = [0u8; 64];
        let n = original.to_buffer(&mut raw).unwrap();
        match MqttUnsubscribe::from_bytes(&raw[..n]).unwrap() {
            ParseOk::Packet(MqttPacket::Unsubscribe(parsed), _) => {
                assert_eq!(parsed.packet_id, 77);
                let decoded: Vec<_> = parsed.topic_filters().collect();
                assert_eq!(decoded, filters);
            }
            _ => panic!("Expected UNSUBSCRIBE packet"),
        }
    }

    #[test]
    fn test_unsubscribe_rejects_empty_list() {
        let unsubscribe = MqttUnsubscribe::new(1, &[]);
        let mut raw = [0u8; 16];
        assert!(matches!(
            unsubscribe.to_buffer(&mut raw),
            Err(ParseError::BadInputs(_))
        ));
    }
}

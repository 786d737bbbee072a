// SPDX-License-Identifier: MPL-2.0

use serde::Serialize;

use crate::mqtt_serde::base_data::{EncodeBuf, TwoByteInteger, Utf8String};
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{
    packet_type, parse_remaining_length, parse_utf8_string, ParseError, ParseOk,
};
use crate::mqtt_serde::{validate_topic_filter, QoS};

/// One topic filter / maximum QoS pair inside a SUBSCRIBE packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub struct TopicSubscription<'a> {
    pub topic_filter: &'a str,
    pub qos: QoS,
}

/// The subscription list, either as caller-supplied requests (for encoding)
/// or as a validated wire payload (after decoding). Both forms iterate as
/// [`TopicSubscription`] values without allocating.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
enum Subscriptions<'a> {
    Requested(&'a [TopicSubscription<'a>]),
    Wire(&'a [u8]),
}

/// Represents the SUBSCRIBE packet in MQTT v3.1.1.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub struct MqttSubscribe<'a> {
    pub packet_id: u16,
    subscriptions: Subscriptions<'a>,
}

impl<'a> MqttSubscribe<'a> {
    pub fn new(packet_id: u16, subscriptions: &'a [TopicSubscription<'a>]) -> Self {
        Self {
            packet_id,
            subscriptions: Subscriptions::Requested(subscriptions),
        }
    }

    /// Iterate the subscriptions carried by this packet.
    pub fn subscriptions(&self) -> SubscriptionIter<'a> {
        match self.subscriptions {
            Subscriptions::Requested(s) => SubscriptionIter::Requested(s.iter()),
            Subscriptions::Wire(raw) => SubscriptionIter::Wire(raw),
        }
    }
}

pub enum SubscriptionIter<'a> {
    Requested(core::slice::Iter<'a, TopicSubscription<'a>>),
    Wire(&'a [u8]),
}

impl<'a> Iterator for SubscriptionIter<'a> {
    type Item = TopicSubscription<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            SubscriptionIter::Requested(iter) => iter.next().copied(),
            SubscriptionIter::Wire(raw) => {
                let current = *raw;
                if current.is_empty() {
                    return None;
                }
                // The payload was validated during from_bytes, so a decode
                // failure here can only mean the view was constructed from
                // unvalidated bytes; stop iterating rather than panic.
                let (topic_filter, consumed) = Utf8String::decode(current).ok()?;
                let qos = QoS::try_from(*current.get(consumed)?).ok()?;
                *raw = &current[consumed + 1..];
                Some(TopicSubscription { topic_filter, qos })
            }
        }
    }
}

impl<'a> MqttControlPacket<'a> for MqttSubscribe<'a> {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::SUBSCRIBE as u8
    }

    // MQTT-3.8.1-1: bit 1 of the fixed header must be set.
    fn flags(&self) -> u8 {
        0x02
    }

    fn remaining_length(&self) -> Result<usize, ParseError> {
        if self.packet_id == 0 {
            return Err(ParseError::BadInputs("packet identifier must be non-zero"));
        }
        match self.subscriptions {
            Subscriptions::Requested(subs) => {
                if subs.is_empty() {
                    return Err(ParseError::BadInputs(
                        "SUBSCRIBE requires at least one topic filter",
                    ));
                }
                let mut len = 2;
                for sub in subs {
                    validate_topic_filter(sub.topic_filter)?;
                    len += Utf8String::encoded_len(sub.topic_filter) + 1;
                }
                Ok(len)
            }
            Subscriptions::Wire(raw) => Ok(2 + raw.len()),
        }
    }

    fn encode_body(&self, buf: &mut EncodeBuf<'_>) -> Result<(), ParseError> {
        TwoByteInteger::encode_into(buf, self.packet_id)?;
        match self.subscriptions {
            Subscriptions::Requested(subs) => {
                for sub in subs {
                    Utf8String::encode_into(buf, sub.topic_filter)?;
                    buf.push(sub.qos as u8)?;
                }
                Ok(())
            }
            Subscriptions::Wire(raw) => buf.extend_from_slice(raw),
        }
    }

    fn from_bytes(buffer: &'a [u8]) -> Result<ParseOk<'a>, ParseError> {
        let packet_type = packet_type(buffer)?;
        if packet_type != ControlPacketType::SUBSCRIBE as u8 {
            return Err(ParseError::InvalidPacketType);
        }
        if buffer[0] & 0x0F != 0x02 {
            return Err(ParseError::Malformed(
                "SUBSCRIBE fixed header flags must be 0x02",
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
            return Err(ParseError::Malformed("SUBSCRIBE payload is empty"));
        }

        // Walk the whole payload up front so the iterator can trust it.
        let mut cursor = 0;
        while cursor < payload.len() {
            let (filter, consumed) = parse_utf8_string(&payload[cursor..])?;
            if filter.is_empty() {
                return Err(ParseError::Malformed("empty topic filter"));
            }
            cursor += consumed;
            let qos_byte = *payload
                .get(cursor)
                .ok_or(ParseError::Malformed("missing requested QoS byte"))?;
            QoS::try_from(qos_byte)?;
            cursor += 1;
        }

        Ok(ParseOk::Packet(
            MqttPacket::Subscribe(MqttSubscribe {
                packet_id,
                subscriptions: Subscriptions::Wire(payload),
            }),
            total_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_serialization() {
        let subs = [TopicSubscription {
            topic_filter: "a/b",
            qos: QoS::AtLeastOnce,
        }];
        let subscribe = MqttSubscribe::new(10, &subs);
        let mut raw = [0u8; 32];
        let n = subscribe.to_buffer(&mut raw).unwrap();
        assert_eq!(
            &raw[..n],
            &[
                0x82, 8, // type + flags, remaining length
                0x00, 0x0A, // packet id
                0x00, 0x03, b'a', b'/', b'b', // filter
                0x01, // requested QoS
            ]
        );
    }

    #[test]
    fn test_subscribe_roundtrip_multiple_filters() {
        let subs = [
            TopicSubscription {
                topic_filter: "sensors/+/temp",
                qos: QoS::ExactlyOnce,
            },
            TopicSubscription {
                topic_filter: "alerts/#",
                qos: QoS::AtMostOnce,
            },
        ];
        let original = MqttSubscribe::new(99, &subs);
        let mut raw = [0u8; 64];
        let n = original.to_buffer(&mut raw).unwrap();

        match MqttSubscribe::from_bytes(&raw[..n]).unwrap() {
            ParseOk::Packet(MqttPacket::Subscribe(parsed), consumed) => {
                assert_eq!(consumed, n);
                assert_eq!(parsed.packet_id, 99);
                let decoded: Vec<_> = parsed.subscriptions().collect();
                assert_eq!(decoded, subs);
            }
            _ => panic!("Expected SUBSCRIBE packet"),
        }
    }

    #[test]
    fn test_subscribe_rejects_empty_list() {
        let subscribe = MqttSubscribe::new(1, &[]);
        let mut raw = [0u8; 16];
        assert!(matches!(
            subscribe.to_buffer(&mut raw),
            Err(ParseError::BadInputs(_))
        ));
    }

    #[test]
    fn test_subscribe_rejects_zero_packet_id() {
        let subs = [TopicSubscription {
            topic_filter: "a",
            qos: QoS::AtMostOnce,
        }];
        let subscribe = MqttSubscribe::new(0, &subs);
        let mut raw = [0u8; 16];
        assert!(subscribe.to_buffer(&mut raw).is_err());
    }

    #[test]
    fn test_subscribe_rejects_bad_filter() {
        let subs = [TopicSubscription {
            topic_filter: "a/#/b",
            qos: QoS::AtMostOnce,
        }];
        let subscribe = MqttSubscribe::new(1, &subs);
        let mut raw = [0u8; 16];
        assert!(matches!(
            subscribe.to_buffer(&mut raw),
            Err(ParseError::BadInputs(_))
        ));
    }

    #[test]
    fn test_subscribe_wire_rejects_invalid_qos() {
        let bytes = vec![
            0x82, 8, 0x00, 0x0A, 0x00, 0x03, b'a', b'/', b'b', 0x03, // QoS 3
        ];
        assert!(MqttSubscribe::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_subscribe_wire_rejects_missing_flag_bit() {
        let bytes = vec![0x80, 8, 0x00, 0x0A, 0x00, 0x03, b'a', b'/', b'b', 0x01];
        assert!(MqttSubscribe::from_bytes(&bytes).is_err());
    }
}

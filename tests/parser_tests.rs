//! Codec integration tests: cross-packet dispatch, remaining-length
//! boundaries, and wire-level validation that spans modules.

use picomqtt::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use picomqtt::mqtt_serde::mqttv3::connack::MqttConnAck;
use picomqtt::mqtt_serde::mqttv3::connect::MqttConnect;
use picomqtt::mqtt_serde::mqttv3::pingresp::MqttPingResp;
use picomqtt::mqtt_serde::mqttv3::puback::MqttPubAck;
use picomqtt::mqtt_serde::mqttv3::publish::MqttPublish;
use picomqtt::mqtt_serde::mqttv3::suback::MqttSubAck;
use picomqtt::mqtt_serde::mqttv3::subscribe::{MqttSubscribe, TopicSubscription};
use picomqtt::mqtt_serde::mqttv3::unsubscribe::MqttUnsubscribe;
use picomqtt::mqtt_serde::parser::{ParseError, ParseOk};
use picomqtt::mqtt_serde::QoS;

fn serialize(packet: &MqttPacket<'_>) -> Vec<u8> {
    let mut raw = vec![0u8; packet.packet_size().unwrap().total_length];
    let n = packet.to_buffer(&mut raw).unwrap();
    assert_eq!(n, raw.len());
    raw
}

#[test]
fn test_dispatch_parses_every_client_relevant_type() {
    let packets: Vec<MqttPacket<'_>> = vec![
        MqttPacket::Connect(MqttConnect::new("cid", 30, true)),
        MqttPacket::ConnAck(MqttConnAck::new(false, 0)),
        MqttPacket::Publish(MqttPublish::new(
            "t/1",
            QoS::AtLeastOnce,
            b"payload",
            Some(3),
            false,
            false,
        )),
        MqttPacket::PubAck(MqttPubAck::new(3)),
        MqttPacket::SubAck(MqttSubAck::new(4, &[1])),
        MqttPacket::PingResp(MqttPingResp::new()),
    ];

    for packet in &packets {
        let bytes = serialize(packet);
        match MqttPacket::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(parsed, consumed) => {
                assert_eq!(consumed, bytes.len());
                assert_eq!(&parsed, packet);
            }
            other => panic!("expected a full packet, got {:?}", other),
        }
    }
}

#[test]
fn test_dispatch_parses_subscription_packets() {
    let subs = [TopicSubscription {
        topic_filter: "a/#",
        qos: QoS::AtLeastOnce,
    }];
    let bytes = serialize(&MqttPacket::Subscribe(MqttSubscribe::new(4, &subs)));
    match MqttPacket::from_bytes(&bytes).unwrap() {
        ParseOk::Packet(MqttPacket::Subscribe(parsed), _) => {
            assert_eq!(parsed.packet_id, 4);
            assert_eq!(parsed.subscriptions().collect::<Vec<_>>(), subs);
        }
        other => panic!("expected SUBSCRIBE, got {:?}", other),
    }

    let filters = ["a/#"];
    let bytes = serialize(&MqttPacket::Unsubscribe(MqttUnsubscribe::new(5, &filters)));
    match MqttPacket::from_bytes(&bytes).unwrap() {
        ParseOk::Packet(MqttPacket::Unsubscribe(parsed), _) => {
            assert_eq!(parsed.packet_id, 5);
            assert_eq!(parsed.topic_filters().collect::<Vec<_>>(), filters);
        }
        other => panic!("expected UNSUBSCRIBE, got {:?}", other),
    }
}

#[test]
fn test_publish_roundtrip_is_semantically_lossless() {
    let cases = [
        ("a", QoS::AtMostOnce, b"".as_slice(), None, false, false),
        ("a/b/c", QoS::AtMostOnce, b"x".as_slice(), None, true, false),
        ("t", QoS::AtLeastOnce, b"hello".as_slice(), Some(1), false, false),
        ("t", QoS::AtLeastOnce, b"hello".as_slice(), Some(0xFFFF), true, true),
        ("deep/topic/name", QoS::ExactlyOnce, &[0u8, 1, 2, 255], Some(77), false, true),
    ];

    for (topic, qos, payload, id, retain, dup) in cases {
        let original = MqttPublish::new(topic, qos, payload, id, retain, dup);
        let bytes = serialize(&MqttPacket::Publish(original));
        match MqttPacket::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(MqttPacket::Publish(parsed), _) => {
                assert_eq!(parsed.topic_name, topic);
                assert_eq!(parsed.qos, qos);
                assert_eq!(parsed.payload, payload);
                assert_eq!(parsed.packet_id, id);
                assert_eq!(parsed.retain, retain);
                assert_eq!(parsed.dup, dup);
            }
            other => panic!("expected PUBLISH, got {:?}", other),
        }
    }
}

/// The remaining-length field grows at 128, 16384 and 2097152; sizes on both
/// sides of each edge must round-trip with the expected header width.
#[test]
fn test_remaining_length_boundaries() {
    // (remaining_length, encoded length bytes)
    let boundaries = [
        (127usize, 1usize),
        (128, 2),
        (16383, 2),
        (16384, 3),
        (2097151, 3),
        (2097152, 4),
    ];

    for (remaining, vbi_len) in boundaries {
        // QoS 0 publish: remaining = 2 + topic + payload.
        let payload = vec![0xABu8; remaining - 3];
        let publish = MqttPublish::new("t", QoS::AtMostOnce, &payload, None, false, false);
        let size = MqttPacket::Publish(publish).packet_size().unwrap();
        assert_eq!(size.remaining_length, remaining);
        assert_eq!(size.total_length, 1 + vbi_len + remaining);

        let bytes = serialize(&MqttPacket::Publish(publish));
        match MqttPacket::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(MqttPacket::Publish(parsed), consumed) => {
                assert_eq!(consumed, size.total_length);
                assert_eq!(parsed.payload.len(), payload.len());
            }
            other => panic!("expected PUBLISH, got {:?}", other),
        }
    }
}

#[test]
fn test_fifth_remaining_length_byte_is_rejected() {
    let bytes = [0x30u8, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
    assert!(matches!(
        MqttPacket::from_bytes(&bytes),
        Err(ParseError::InvalidVariableByteInteger)
    ));
}

#[test]
fn test_unknown_type_nibbles_are_rejected() {
    for first_byte in [0x00u8, 0xF0] {
        let bytes = [first_byte, 0x00];
        assert!(matches!(
            MqttPacket::from_bytes(&bytes),
            Err(ParseError::InvalidPacketType)
        ));
    }
}

#[test]
fn test_truncated_packet_reports_continue() {
    let publish = MqttPublish::new("t/1", QoS::AtMostOnce, b"payload", None, false, false);
    let bytes = serialize(&MqttPacket::Publish(publish));

    for cut in 2..bytes.len() {
        match MqttPacket::from_bytes(&bytes[..cut]).unwrap() {
            ParseOk::Continue(needed) => assert_eq!(needed, bytes.len() - cut),
            other => panic!("expected Continue at cut {}, got {:?}", cut, other),
        }
    }
}

#[test]
fn test_connect_client_id_rules() {
    let mut raw = [0u8; 64];

    // Zero-length client id demands a clean session.
    let connect = MqttConnect::new("", 10, false);
    assert!(matches!(
        connect.to_buffer(&mut raw),
        Err(ParseError::BadInputs(_))
    ));
    assert!(MqttConnect::new("", 10, true).to_buffer(&mut raw).is_ok());
}

#[test]
fn test_topic_with_embedded_nul_is_rejected() {
    let publish = MqttPublish::new("bad\u{0000}topic", QoS::AtMostOnce, b"", None, false, false);
    let mut raw = [0u8; 64];
    assert!(matches!(
        publish.to_buffer(&mut raw),
        Err(ParseError::BadInputs(_))
    ));

    let subs = [TopicSubscription {
        topic_filter: "bad\u{0000}filter",
        qos: QoS::AtMostOnce,
    }];
    let subscribe = MqttSubscribe::new(1, &subs);
    assert!(matches!(
        subscribe.to_buffer(&mut raw),
        Err(ParseError::BadInputs(_))
    ));
}

#[test]
fn test_reserved_flag_bits_are_enforced() {
    // PUBACK with a flag bit set.
    assert!(MqttPacket::from_bytes(&[0x41, 0x02, 0x00, 0x01]).is_err());
    // SUBSCRIBE without its mandatory 0x02.
    assert!(MqttPacket::from_bytes(&[0x80, 6, 0x00, 0x01, 0x00, 0x01, b'a', 0x00]).is_err());
    // PUBREL without its mandatory 0x02.
    assert!(MqttPacket::from_bytes(&[0x60, 0x02, 0x00, 0x01]).is_err());
    // PINGRESP with junk flags.
    assert!(MqttPacket::from_bytes(&[0xD3, 0x00]).is_err());
}

#[test]
fn test_length_consistency_is_enforced() {
    // CONNACK claiming 3 remaining bytes.
    assert!(MqttPacket::from_bytes(&[0x20, 0x03, 0x00, 0x00, 0x00]).is_err());
    // SUBACK with no return codes.
    assert!(MqttPacket::from_bytes(&[0x90, 0x02, 0x00, 0x01]).is_err());
    // PINGRESP with a body.
    assert!(MqttPacket::from_bytes(&[0xD0, 0x01, 0x00]).is_err());
}

#[test]
fn test_control_packet_type_values() {
    assert_eq!(ControlPacketType::CONNECT as u8, 1);
    assert_eq!(ControlPacketType::PUBLISH as u8, 3);
    assert_eq!(ControlPacketType::PUBREL as u8, 6);
    assert_eq!(ControlPacketType::DISCONNECT as u8, 14);
}

// SPDX-License-Identifier: MPL-2.0

pub mod base_data;
pub mod control_packet;
pub mod mqttv3;
pub mod parser;

use crate::mqtt_serde::parser::ParseError;
use serde::{Deserialize, Serialize};

// re export
pub use crate::mqtt_serde::parser::incoming::{read_incoming_packet, IncomingPacket};

/// MQTT delivery guarantee level.
///
/// Carried in PUBLISH fixed-header flags and in subscription requests.
#[derive(Debug, PartialEq, Eq, PartialOrd, Clone, Copy, Serialize, Deserialize)]
pub enum QoS {
    /// At most once; fire and forget.
    AtMostOnce = 0,
    /// At least once; acknowledged with PUBACK.
    AtLeastOnce = 1,
    /// Exactly once; the PUBREC/PUBREL/PUBCOMP handshake.
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(ParseError::InvalidQos),
        }
    }
}

/// Validates an MQTT topic name (the PUBLISH form: no wildcards).
pub(crate) fn validate_topic_name(topic: &str) -> Result<(), ParseError> {
    if topic.is_empty() {
        return Err(ParseError::BadInputs("topic name cannot be empty"));
    }
    if topic.len() > u16::MAX as usize {
        return Err(ParseError::BadInputs("topic name longer than 65535 bytes"));
    }
    if topic.contains('\u{0000}') {
        return Err(ParseError::BadInputs("topic name contains a null character"));
    }
    if topic.contains('#') || topic.contains('+') {
        return Err(ParseError::BadInputs("topic name contains a wildcard"));
    }
    Ok(())
}

/// Validates MQTT topic filter syntax (the SUBSCRIBE/UNSUBSCRIBE form).
pub(crate) fn validate_topic_filter(topic_filter: &str) -> Result<(), ParseError> {
    if topic_filter.is_empty() {
        return Err(ParseError::BadInputs("topic filter cannot be empty"));
    }
    if topic_filter.len() > u16::MAX as usize {
        return Err(ParseError::BadInputs("topic filter longer than 65535 bytes"));
    }
    if topic_filter.contains('\u{0000}') {
        return Err(ParseError::BadInputs("topic filter contains a null character"));
    }

    let level_count = topic_filter.split('/').count();
    for (i, level) in topic_filter.split('/').enumerate() {
        // Multi-level wildcard (#) validation
        if level.contains('#') {
            // # must be the only character in the level
            if level != "#" {
                return Err(ParseError::BadInputs(
                    "multi-level wildcard (#) must be the only character in its level",
                ));
            }
            // # must be the last level
            if i != level_count - 1 {
                return Err(ParseError::BadInputs(
                    "multi-level wildcard (#) must be the last level in the filter",
                ));
            }
        }

        // Single-level wildcard (+) validation
        if level.contains('+') && level != "+" {
            return Err(ParseError::BadInputs(
                "single-level wildcard (+) must be the only character in its level",
            ));
        }
    }

    Ok(())
}

pub fn topic_name(buffer: &[u8]) -> Result<(&str, usize), ParseError> {
    base_data::Utf8String::decode(buffer)
}

pub fn packet_id(buffer: &[u8]) -> Result<(u16, usize), ParseError> {
    base_data::TwoByteInteger::decode(buffer)
}

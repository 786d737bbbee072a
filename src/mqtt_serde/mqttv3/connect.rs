// SPDX-License-Identifier: MPL-2.0

use serde::Serialize;

use crate::mqtt_serde::base_data::{BinaryData, EncodeBuf, TwoByteInteger, Utf8String};
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{
    packet_type, parse_remaining_length, parse_utf8_string, ParseError, ParseOk,
};
use crate::mqtt_serde::{validate_topic_name, QoS};

/// The Will message registered at connect time.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub struct Will<'a> {
    pub retain: bool,
    pub qos: QoS,
    pub topic: &'a str,
    pub message: &'a [u8],
}

/// Represents the CONNECT packet in MQTT v3.1.1.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub struct MqttConnect<'a> {
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: &'a str,
    pub will: Option<Will<'a>>,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
}

impl<'a> MqttConnect<'a> {
    pub fn new(client_id: &'a str, keep_alive: u16, clean_session: bool) -> Self {
        Self {
            clean_session,
            keep_alive,
            client_id,
            will: None,
            username: None,
            password: None,
        }
    }
}

impl<'a> MqttControlPacket<'a> for MqttConnect<'a> {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::CONNECT as u8
    }

    fn remaining_length(&self) -> Result<usize, ParseError> {
        if self.client_id.is_empty() && !self.clean_session {
            // The broker has no session to resume for a nameless client.
            return Err(ParseError::BadInputs(
                "zero-length client id requires clean_session",
            ));
        }
        if self.client_id.len() > u16::MAX as usize {
            return Err(ParseError::BadInputs("client id longer than 65535 bytes"));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(ParseError::BadInputs("password requires a username"));
        }

        // Protocol name, level, connect flags, keep alive.
        let mut len = Utf8String::encoded_len("MQTT") + 1 + 1 + 2;
        len += Utf8String::encoded_len(self.client_id);

        if let Some(will) = &self.will {
            validate_topic_name(will.topic)?;
            if will.message.len() > u16::MAX as usize {
                return Err(ParseError::BadInputs("will message longer than 65535 bytes"));
            }
            len += Utf8String::encoded_len(will.topic);
            len += 2 + will.message.len();
        }
        if let Some(username) = &self.username {
            if username.len() > u16::MAX as usize {
                return Err(ParseError::BadInputs("username longer than 65535 bytes"));
            }
            len += Utf8String::encoded_len(username);
        }
        if let Some(password) = &self.password {
            if password.len() > u16::MAX as usize {
                return Err(ParseError::BadInputs("password longer than 65535 bytes"));
            }
            len += 2 + password.len();
        }
        Ok(len)
    }

    fn encode_body(&self, buf: &mut EncodeBuf<'_>) -> Result<(), ParseError> {
        // Variable header: protocol name, protocol level, connect flags,
        // keep alive.
        Utf8String::encode_into(buf, "MQTT")?;
        buf.push(4)?;

        let mut flags = 0u8;
        if self.clean_session {
            flags |= 0x02;
        }
        if let Some(will) = &self.will {
            flags |= 0x04;
            flags |= (will.qos as u8) << 3;
            if will.retain {
                flags |= 0x20;
            }
        }
        if self.username.is_some() {
            flags |= 0x80;
        }
        if self.password.is_some() {
            flags |= 0x40;
        }
        buf.push(flags)?;
        TwoByteInteger::encode_into(buf, self.keep_alive)?;

        // Payload.
        Utf8String::encode_into(buf, self.client_id)?;
        if let Some(will) = &self.will {
            Utf8String::encode_into(buf, will.topic)?;
            BinaryData::encode_into(buf, will.message)?;
        }
        if let Some(username) = &self.username {
            Utf8String::encode_into(buf, username)?;
        }
        if let Some(password) = &self.password {
            BinaryData::encode_into(buf, password)?;
        }
        Ok(())
    }

    fn from_bytes(buffer: &'a [u8]) -> Result<ParseOk<'a>, ParseError> {
        let packet_type = packet_type(buffer)?;
        if packet_type != ControlPacketType::CONNECT as u8 {
            return Err(ParseError::InvalidPacketType);
        }
        if buffer[0] & 0x0F != 0x00 {
            return Err(ParseError::Malformed("CONNECT fixed header flags must be 0"));
        }

        let (size, vbi_len) = parse_remaining_length(&buffer[1..])?;
        let mut offset = 1 + vbi_len;
        let total_len = offset + size;

        if total_len > buffer.len() {
            return Ok(ParseOk::Continue(total_len - buffer.len()));
        }

        // Variable header.
        let (proto_name, consumed) = parse_utf8_string(&buffer[offset..total_len])?;
        offset += consumed;
        if proto_name != "MQTT" {
            return Err(ParseError::Malformed("invalid protocol name"));
        }

        if offset >= total_len {
            return Err(ParseError::BufferTooShort);
        }
        let version = buffer[offset];
        offset += 1;
        if version != 4 {
            return Err(ParseError::Malformed("unsupported protocol level"));
        }

        if offset >= total_len {
            return Err(ParseError::BufferTooShort);
        }
        let flags = buffer[offset];
        offset += 1;
        let clean_session = (flags & 0x02) > 0;
        let will_flag = (flags & 0x04) > 0;
        let will_qos = (flags & 0x18) >> 3;
        let will_retain = (flags & 0x20) > 0;
        let username_flag = (flags & 0x80) > 0;
        let password_flag = (flags & 0x40) > 0;

        if (flags & 0x01) != 0 {
            return Err(ParseError::Malformed("CONNECT reserved flag bit is not 0"));
        }
        if !will_flag && (will_qos != 0 || will_retain) {
            return Err(ParseError::Malformed("will QoS/retain set without will flag"));
        }
        if password_flag && !username_flag {
            return Err(ParseError::Malformed("password flag requires username flag"));
        }

        let (keep_alive, _) = TwoByteInteger::decode(&buffer[offset..total_len])?;
        offset += 2;

        // Payload.
        let (client_id, consumed) = parse_utf8_string(&buffer[offset..total_len])?;
        offset += consumed;

        let will = if will_flag {
            let (topic, consumed) = parse_utf8_string(&buffer[offset..total_len])?;
            offset += consumed;
            let (message, consumed) = BinaryData::decode(&buffer[offset..total_len])?;
            offset += consumed;
            Some(Will {
                retain: will_retain,
                qos: QoS::try_from(will_qos)?,
                topic,
                message,
            })
        } else {
            None
        };

        let username = if username_flag {
            let (u, consumed) = parse_utf8_string(&buffer[offset..total_len])?;
            offset += consumed;
            Some(u)
        } else {
            None
        };

        let password = if password_flag {
            let (p, consumed) = BinaryData::decode(&buffer[offset..total_len])?;
            offset += consumed;
            Some(p)
        } else {
            None
        };

        if offset != total_len {
            return Err(ParseError::Malformed(
                "CONNECT payload does not match remaining length",
            ));
        }

        Ok(ParseOk::Packet(
            MqttPacket::Connect(MqttConnect {
                clean_session,
                keep_alive,
                client_id,
                will,
                username,
                password,
            }),
            total_len,
        ))
    }
}

// SPDX-License-Identifier: MPL-2.0

//! Error types for MQTT client operations.
//!
//! Every fallible engine operation returns one of these by value; there is
//! no hidden control flow. The variants distinguish caller mistakes
//! (`BadParameter`, `NoMemory`) from wire violations (`BadResponse`,
//! `IllegalState`) and from transport-level trouble after which the
//! connection is probably unusable (`SendFailed`, `RecvFailed`,
//! `KeepAliveTimeout`).

use crate::mqtt_serde::parser::ParseError;
use std::fmt;

/// Error type for MQTT client operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum MqttClientError {
    /// A caller-supplied argument cannot form a legal operation.
    BadParameter(&'static str),

    /// The fixed buffer is too small for the packet being built or staged.
    NoMemory { needed: usize, capacity: usize },

    /// The transport failed to make progress while sending.
    SendFailed,

    /// The transport failed while receiving.
    RecvFailed,

    /// Received bytes failed MQTT 3.1.1 validation, or the packet type is
    /// not one the client can accept.
    BadResponse(&'static str),

    /// CONNACK carried a non-zero return code.
    ServerRefused { return_code: u8 },

    /// The transport had no inbound data. Non-fatal; the process loop uses
    /// this internally to fall through to keep-alive handling.
    NoDataAvailable,

    /// No PINGRESP arrived within the ping response timeout.
    KeepAliveTimeout,

    /// The publish state tracker could not produce a valid next state for
    /// the packet identifier.
    IllegalState { packet_id: u16 },
}

impl MqttClientError {
    /// Returns true if the operation may simply be retried on the same
    /// connection.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NoDataAvailable | Self::NoMemory { .. })
    }

    /// Returns true if the connection is probably unusable and the caller
    /// should tear down and reconnect.
    pub fn connection_unusable(&self) -> bool {
        matches!(
            self,
            Self::SendFailed | Self::RecvFailed | Self::KeepAliveTimeout
        )
    }
}

impl fmt::Display for MqttClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadParameter(msg) => write!(f, "bad parameter: {}", msg),
            Self::NoMemory { needed, capacity } => {
                write!(
                    f,
                    "fixed buffer too small: packet needs {} bytes, buffer holds {}",
                    needed, capacity
                )
            }
            Self::SendFailed => write!(f, "transport send failed"),
            Self::RecvFailed => write!(f, "transport receive failed"),
            Self::BadResponse(msg) => write!(f, "bad response from broker: {}", msg),
            Self::ServerRefused { return_code } => {
                write!(f, "connection refused by broker (return code {})", return_code)
            }
            Self::NoDataAvailable => write!(f, "no data available"),
            Self::KeepAliveTimeout => write!(f, "no PINGRESP within the keep-alive timeout"),
            Self::IllegalState { packet_id } => {
                write!(f, "illegal publish state for packet id {}", packet_id)
            }
        }
    }
}

impl std::error::Error for MqttClientError {}

impl From<ParseError> for MqttClientError {
    fn from(error: ParseError) -> Self {
        match error {
            ParseError::NoSpace { needed, available } => Self::NoMemory {
                needed,
                capacity: available,
            },
            ParseError::BadInputs(msg) => Self::BadParameter(msg),
            ParseError::NoData => Self::NoDataAvailable,
            ParseError::Io(_) => Self::RecvFailed,
            ParseError::Malformed(msg) => Self::BadResponse(msg),
            ParseError::InvalidPacketType => Self::BadResponse("unknown control packet type"),
            ParseError::InvalidQos => Self::BadResponse("invalid QoS level"),
            ParseError::Utf8Error => Self::BadResponse("invalid UTF-8 string"),
            ParseError::InvalidVariableByteInteger => {
                Self::BadResponse("invalid remaining length encoding")
            }
            ParseError::More(_) | ParseError::BufferTooShort => {
                Self::BadResponse("packet shorter than its remaining length")
            }
        }
    }
}

/// Type alias for Result with MqttClientError.
pub type MqttClientResult<T> = Result<T, MqttClientError>;

use crate::transport::TransportError;
use std::error::Error;
use std::fmt;

use super::base_data::{TwoByteInteger, Utf8String, VariableByteInteger};
use super::control_packet::MqttPacket;

pub type ParserResult<'a> = Result<ParseOk<'a>, ParseError>;

// First byte of the fixed header.
pub const FIXED_HDR_LEN: usize = 1;

/// Largest value the remaining-length field can encode (4 bytes, 7 data bits
/// each).
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

#[derive(Debug)]
pub enum ParseError {
    /// Not enough data for processing; hint for how many more bytes are
    /// needed.
    More(usize),
    /// Decoder ran off the end of the supplied slice.
    BufferTooShort,
    /// Encoder output does not fit in the supplied buffer.
    NoSpace { needed: usize, available: usize },
    /// The bytes violate MQTT 3.1.1 wire rules.
    Malformed(&'static str),
    InvalidPacketType,
    InvalidQos,
    Utf8Error,
    InvalidVariableByteInteger,
    /// Caller-supplied field values cannot form a legal packet.
    BadInputs(&'static str),
    /// The transport failed while the fixed header was being read.
    Io(TransportError),
    /// The transport had no data for the first fixed-header byte.
    NoData,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::More(hint) => write!(f, "more data needed ({} bytes)", hint),
            ParseError::BufferTooShort => write!(f, "buffer too short"),
            ParseError::NoSpace { needed, available } => {
                write!(f, "packet needs {} bytes, buffer holds {}", needed, available)
            }
            ParseError::Malformed(msg) => write!(f, "malformed packet: {}", msg),
            ParseError::InvalidPacketType => write!(f, "invalid packet type"),
            ParseError::InvalidQos => write!(f, "invalid QoS level"),
            ParseError::Utf8Error => write!(f, "invalid UTF-8 string"),
            ParseError::InvalidVariableByteInteger => {
                write!(f, "invalid variable byte integer")
            }
            ParseError::BadInputs(msg) => write!(f, "bad packet inputs: {}", msg),
            ParseError::Io(e) => write!(f, "IO error: {}", e),
            ParseError::NoData => write!(f, "no data available"),
        }
    }
}

impl Error for ParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ParseError::Io(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum ParseOk<'a> {
    /// Not enough data for a full packet; hint for how many more bytes are
    /// needed.
    Continue(usize),
    /// A full packet and the number of bytes it consumed.
    Packet(MqttPacket<'a>, usize),
}

/// Extract the control packet type nibble from the first fixed-header byte.
pub fn packet_type(buffer: &[u8]) -> Result<u8, ParseError> {
    if buffer.is_empty() {
        return Err(ParseError::BufferTooShort);
    }
    Ok(buffer[0] >> 4)
}

pub fn parse_remaining_length(buffer: &[u8]) -> Result<(usize, usize), ParseError> {
    VariableByteInteger::decode(buffer)
}

// MQTT 3.1.1 Spec, 1.5.3 UTF-8 encoded strings
pub fn parse_utf8_string(buffer: &[u8]) -> Result<(&str, usize), ParseError> {
    Utf8String::decode(buffer)
}

pub fn parse_packet_id(buffer: &[u8]) -> Result<(u16, usize), ParseError> {
    TwoByteInteger::decode(buffer)
}

pub mod incoming;

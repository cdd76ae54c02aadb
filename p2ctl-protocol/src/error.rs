//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur while framing, parsing or decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Xml(String),

    #[error("invalid UTF-8 in envelope")]
    InvalidUtf8,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("envelope too large: {size} bytes (max {max})")]
    EnvelopeTooLarge { size: usize, max: usize },

    #[error("{record} packet too short: need {needed} bytes, got {actual}")]
    PacketTooShort {
        record: &'static str,
        needed: usize,
        actual: usize,
    },
}

impl From<quick_xml::Error> for ProtocolError {
    fn from(err: quick_xml::Error) -> Self {
        ProtocolError::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ProtocolError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        ProtocolError::Xml(err.to_string())
    }
}

//! # p2ctl-protocol
//!
//! Wire protocol implementation for P2 camera remote control.
//!
//! This crate provides:
//! - The single-line XML envelope used on the TCP control channel
//! - Envelope framing over a byte stream
//! - Digest-style authentication token derivation
//! - Decoding of the binary UDP telemetry records
//! - Bit-field and compact-float primitives used by the telemetry layout

pub mod auth;
pub mod bits;
pub mod codec;
pub mod commands;
pub mod envelope;
pub mod environment;
pub mod error;
pub mod telemetry;

pub use auth::auth_token;
pub use codec::{Decoder, Encoder};
pub use envelope::{Element, Envelope};
pub use environment::{registration_name, DeviceInfo, EnvironmentInfo};
pub use error::ProtocolError;
pub use telemetry::{
    ExposureState, Iris, MasterGain, NdFilter, OpticalState, RecordType, Shutter, TelemetryRecord,
};

/// Datagram that subscribes to (and keeps alive) the telemetry stream.
pub const POLL_DATAGRAM: [u8; 3] = [0xFF, 0x01, 0xFF];

/// Root element of every control-channel envelope.
pub const ENVELOPE_ROOT: &str = "P2Control";

/// Maximum accepted envelope size (1 MiB).
pub const MAX_ENVELOPE_SIZE: usize = 1024 * 1024;

//! # p2ctl-client
//!
//! Async client for P2 camera remote control.
//!
//! This crate provides:
//! - TCP control channel with the login / environment / session handshake
//! - UDP telemetry subscription with decoded optical and exposure state
//! - Keep-alive, telemetry polling and automatic reconnection
//! - Broadcast connection events
//!
//! ```no_run
//! use p2ctl_client::{CameraConfig, CameraConnection, CameraEvent};
//!
//! # async fn run() -> Result<(), p2ctl_client::ClientError> {
//! let connection = CameraConnection::new(CameraConfig::new("192.168.0.10", 49152, "guest", "guest"))?;
//! let mut events = connection.subscribe();
//! connection.connect()?;
//!
//! while let Ok(event) = events.recv().await {
//!     if let CameraEvent::OpticalState(optical) = event {
//!         println!("iris {}", optical.iris);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
mod control;
mod driver;
pub mod error;
pub mod events;
pub mod handshake;
pub mod supervisor;
mod telemetry;

pub use config::{CameraConfig, ConfigError};
pub use connection::CameraConnection;
pub use error::ClientError;
pub use events::{CameraEvent, EventBus, EventKind};
pub use handshake::{AuthContext, ConnectionState, ControlSession, HandshakeAction};

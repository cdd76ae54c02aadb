//! Public connection handle.

use crate::config::CameraConfig;
use crate::driver::{Command, Driver, SharedSnapshot};
use crate::error::ClientError;
use crate::events::{CameraEvent, EventBus};
use crate::handshake::ConnectionState;
use p2ctl_protocol::{EnvironmentInfo, ExposureState, OpticalState};
use tokio::sync::{broadcast, mpsc, oneshot};

/// A connection to one camera.
///
/// Dropping every clone of the handle disconnects and stops the background
/// driver.
#[derive(Debug, Clone)]
pub struct CameraConnection {
    commands: mpsc::UnboundedSender<Command>,
    events: EventBus,
    snapshot: SharedSnapshot,
}

impl CameraConnection {
    /// Creates a connection (not yet connected) and spawns its driver.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: CameraConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let (commands, rx) = mpsc::unbounded_channel();
        let events = EventBus::default();
        let snapshot = SharedSnapshot::default();

        let driver = Driver::new(config, rx, events.clone(), snapshot.clone());
        tokio::spawn(driver.run());

        Ok(Self {
            commands,
            events,
            snapshot,
        })
    }

    /// Subscribes to connection events.
    ///
    /// Only events emitted after the call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<CameraEvent> {
        self.events.subscribe()
    }

    /// Starts connecting. Does nothing if a connection is open or in progress.
    pub fn connect(&self) -> Result<(), ClientError> {
        self.send(Command::Connect)
    }

    /// Sends connect-off, closes both channels and waits until done.
    ///
    /// No reconnect is scheduled afterwards.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let (done, rx) = oneshot::channel();
        self.send(Command::Disconnect { done })?;
        rx.await.map_err(|_| ClientError::Shutdown)
    }

    /// Sends a raw control payload wrapped in an envelope.
    ///
    /// Skipped with a debug event when the control channel is not open.
    pub fn send_control(&self, payload: impl Into<String>) -> Result<(), ClientError> {
        self.send(Command::SendControl(payload.into()))
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot.read().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Environment info from the current session.
    pub fn environment(&self) -> Option<EnvironmentInfo> {
        self.snapshot.read().environment.clone()
    }

    /// Most recent optical state received over telemetry.
    pub fn optical_state(&self) -> Option<OpticalState> {
        self.snapshot.read().optical.clone()
    }

    /// Most recent exposure state received over telemetry.
    pub fn exposure_state(&self) -> Option<ExposureState> {
        self.snapshot.read().exposure.clone()
    }

    fn send(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::Shutdown)
    }
}

//! Connection events.
//!
//! Every notification the connection produces is published on a single
//! broadcast channel. [`CameraEvent::kind`] names the channel an event
//! belongs to so subscribers can filter.

use p2ctl_protocol::{EnvironmentInfo, ExposureState, OpticalState};
use std::fmt;
use tokio::sync::broadcast;

/// Default capacity for the event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A notification emitted by a camera connection.
#[derive(Debug, Clone, PartialEq)]
pub enum CameraEvent {
    /// A TCP connection attempt has started.
    Connecting,
    /// The TCP connection is established; the handshake is starting.
    TcpConnected,
    /// The handshake completed and a session was assigned.
    Connected,
    /// The control channel closed.
    Disconnected,
    EnvironmentInfo(EnvironmentInfo),
    OpticalState(OpticalState),
    ExposureState(ExposureState),
    Log(String),
    /// Diagnostics, including raw envelope text.
    Debug(String),
    Error(String),
}

/// Notification channel names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connecting,
    TcpConnected,
    Connected,
    Disconnected,
    EnvironmentInfo,
    OpticalState,
    ExposureState,
    Log,
    Debug,
    Error,
}

impl CameraEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            CameraEvent::Connecting => EventKind::Connecting,
            CameraEvent::TcpConnected => EventKind::TcpConnected,
            CameraEvent::Connected => EventKind::Connected,
            CameraEvent::Disconnected => EventKind::Disconnected,
            CameraEvent::EnvironmentInfo(_) => EventKind::EnvironmentInfo,
            CameraEvent::OpticalState(_) => EventKind::OpticalState,
            CameraEvent::ExposureState(_) => EventKind::ExposureState,
            CameraEvent::Log(_) => EventKind::Log,
            CameraEvent::Debug(_) => EventKind::Debug,
            CameraEvent::Error(_) => EventKind::Error,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Connecting => "connecting",
            EventKind::TcpConnected => "tcp-connected",
            EventKind::Connected => "connected",
            EventKind::Disconnected => "disconnected",
            EventKind::EnvironmentInfo => "environment-info",
            EventKind::OpticalState => "optical-state",
            EventKind::ExposureState => "exposure-state",
            EventKind::Log => "log",
            EventKind::Debug => "debug",
            EventKind::Error => "error",
        };
        f.write_str(name)
    }
}

/// Publishes events to all current subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CameraEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CameraEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. Events are dropped when nobody is subscribed.
    pub fn emit(&self, event: CameraEvent) {
        let _ = self.sender.send(event);
    }

    /// Records a lifecycle message and publishes it on the log channel.
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.emit(CameraEvent::Log(message));
    }

    /// Records a diagnostic and publishes it on the debug channel.
    pub fn debug(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{}", message);
        self.emit(CameraEvent::Debug(message));
    }

    /// Records an error and publishes it on the error channel.
    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.emit(CameraEvent::Error(message));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(CameraEvent::TcpConnected.kind().to_string(), "tcp-connected");
        assert_eq!(
            CameraEvent::EnvironmentInfo(EnvironmentInfo::default())
                .kind()
                .to_string(),
            "environment-info"
        );
        assert_eq!(CameraEvent::Error("x".into()).kind(), EventKind::Error);
    }

    #[tokio::test]
    async fn test_bus_delivers_in_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(CameraEvent::Connecting);
        bus.log("opening");
        bus.error("failed");

        assert_eq!(rx.recv().await.unwrap(), CameraEvent::Connecting);
        assert_eq!(rx.recv().await.unwrap(), CameraEvent::Log("opening".into()));
        assert_eq!(rx.recv().await.unwrap(), CameraEvent::Error("failed".into()));
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        bus.emit(CameraEvent::Disconnected);
        bus.debug("nobody listening");
    }
}

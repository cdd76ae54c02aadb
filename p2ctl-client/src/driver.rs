//! Connection driver.
//!
//! One task owns every piece of per-connection state and reacts to caller
//! commands, inbound traffic from the reader tasks, keep-alive ticks and the
//! reconnect deadline. Handlers run to completion one at a time, so the
//! handshake state machine never sees interleaved frames.
//!
//! Each TCP connection attempt gets a new epoch. Messages from reader tasks
//! of an older epoch are dropped, which keeps a late close from tearing down
//! its successor.

use crate::config::CameraConfig;
use crate::control::{self, ControlChannel};
use crate::events::{CameraEvent, EventBus};
use crate::handshake::{ConnectionState, ControlSession, HandshakeAction};
use crate::supervisor::{Duty, Supervisor};
use crate::telemetry::TelemetryChannel;
use bytes::Bytes;
use p2ctl_protocol::{
    commands, Envelope, EnvironmentInfo, ExposureState, OpticalState, TelemetryRecord,
};
use parking_lot::RwLock;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Requests from the public handle.
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Disconnect { done: oneshot::Sender<()> },
    SendControl(String),
}

/// Traffic from the socket tasks.
#[derive(Debug)]
pub(crate) enum Inbound {
    ControlOpened {
        epoch: u64,
        result: io::Result<TcpStream>,
    },
    ControlFrame {
        epoch: u64,
        text: String,
    },
    ControlError {
        epoch: u64,
        error: String,
    },
    ControlClosed {
        epoch: u64,
    },
    Datagram {
        epoch: u64,
        data: Bytes,
        from: SocketAddr,
    },
    DatagramError {
        epoch: u64,
        error: String,
    },
}

impl Inbound {
    fn epoch(&self) -> u64 {
        match self {
            Inbound::ControlOpened { epoch, .. }
            | Inbound::ControlFrame { epoch, .. }
            | Inbound::ControlError { epoch, .. }
            | Inbound::ControlClosed { epoch }
            | Inbound::Datagram { epoch, .. }
            | Inbound::DatagramError { epoch, .. } => *epoch,
        }
    }
}

/// Latest known state, readable without going through the driver.
#[derive(Debug, Default)]
pub(crate) struct Snapshot {
    pub state: ConnectionState,
    pub environment: Option<EnvironmentInfo>,
    pub optical: Option<OpticalState>,
    pub exposure: Option<ExposureState>,
}

pub(crate) type SharedSnapshot = Arc<RwLock<Snapshot>>;

pub(crate) struct Driver {
    config: CameraConfig,
    session: ControlSession,
    control: Option<ControlChannel>,
    connecting: Option<JoinHandle<()>>,
    telemetry: TelemetryChannel,
    supervisor: Supervisor,
    epoch: u64,
    commands: mpsc::UnboundedReceiver<Command>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    events: EventBus,
    snapshot: SharedSnapshot,
}

impl Driver {
    pub(crate) fn new(
        config: CameraConfig,
        commands: mpsc::UnboundedReceiver<Command>,
        events: EventBus,
        snapshot: SharedSnapshot,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            session: ControlSession::new(config.username.clone(), config.password.clone()),
            supervisor: Supervisor::new(config.reconnect_interval(), config.keepalive_interval()),
            config,
            control: None,
            connecting: None,
            telemetry: TelemetryChannel::default(),
            epoch: 0,
            commands,
            inbound_tx,
            inbound_rx,
            events,
            snapshot,
        }
    }

    /// Runs until every handle to the connection is dropped.
    pub(crate) async fn run(mut self) {
        tracing::debug!("driver started for {}", self.config.control_addr());

        loop {
            let reconnect_at = self.supervisor.reconnect_deadline();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
                Some(message) = self.inbound_rx.recv() => self.on_inbound(message).await,
                _ = self.supervisor.next_keepalive() => self.on_keepalive().await,
                _ = Supervisor::reconnect_due(reconnect_at) => {
                    self.supervisor.take_reconnect();
                    self.events.log("Reconnecting");
                    self.connect();
                }
            }
        }

        self.disconnect().await;
        tracing::debug!("driver stopped");
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect { done } => {
                self.disconnect().await;
                let _ = done.send(());
            }
            Command::SendControl(payload) => self.send_payload(&payload).await,
        }
    }

    fn connect(&mut self) {
        if self.control.is_some() || self.connecting.is_some() {
            tracing::debug!("connect ignored: connection open or in progress");
            return;
        }

        self.supervisor.cancel_reconnect();
        self.epoch += 1;

        let addr = self.config.control_addr();
        self.events.log(format!("Opening TCP connection to {}", addr));
        self.events.emit(CameraEvent::Connecting);
        self.connecting = Some(control::connect(addr, self.epoch, self.inbound_tx.clone()));
    }

    /// Closes both channels on request. A pending reconnect is cancelled and
    /// none is scheduled.
    async fn disconnect(&mut self) {
        self.supervisor.cancel_reconnect();

        if self.close_connection().await {
            self.events.log("Disconnected");
            self.events.emit(CameraEvent::Disconnected);
        }
    }

    /// Drops a connection that cannot continue, then schedules a reconnect.
    async fn disconnect_and_retry(&mut self) {
        self.close_connection().await;
        self.events.log("Disconnected");
        self.events.emit(CameraEvent::Disconnected);
        self.schedule_reconnect();
    }

    /// Sends connect-off if the control channel is open and releases both
    /// channels. Returns whether a connection was open or in progress.
    async fn close_connection(&mut self) -> bool {
        let was_active = self.control.is_some() || self.connecting.is_some();
        if let Some(connecting) = self.connecting.take() {
            connecting.abort();
        }
        if self.control.is_some() {
            self.send_payload(commands::CONNECT_OFF).await;
        }
        self.teardown().await;
        self.epoch += 1;
        was_active
    }

    fn schedule_reconnect(&mut self) {
        if let Some(deadline) = self.supervisor.schedule_reconnect(Instant::now()) {
            let delay = deadline.saturating_duration_since(Instant::now());
            self.events.log(format!("Reconnecting in {}ms", delay.as_millis()));
        }
    }

    /// Releases all per-connection resources and clears published state.
    async fn teardown(&mut self) {
        if let Some(control) = self.control.take() {
            control.close().await;
        }
        self.telemetry.close();
        self.supervisor.stop_keepalive();
        self.session.reset();
        *self.snapshot.write() = Snapshot::default();
    }

    async fn on_inbound(&mut self, message: Inbound) {
        if message.epoch() != self.epoch {
            tracing::trace!("dropping message from stale connection: {:?}", message);
            return;
        }

        match message {
            Inbound::ControlOpened { result, .. } => {
                self.connecting = None;
                match result {
                    Ok(stream) => self.on_control_opened(stream).await,
                    Err(e) => {
                        self.events.log(format!("TCP connection error: {}", e));
                        self.on_control_closed().await;
                    }
                }
            }
            Inbound::ControlFrame { text, .. } => self.on_frame(&text).await,
            Inbound::ControlError { error, .. } => {
                self.events.error(format!("Control channel error: {}", error));
            }
            Inbound::ControlClosed { .. } => self.on_control_closed().await,
            Inbound::Datagram { data, from, .. } => self.on_datagram(&data, from),
            Inbound::DatagramError { error, .. } => {
                self.events.error(format!("UDP receive failed: {}", error));
            }
        }
    }

    async fn on_control_opened(&mut self, stream: TcpStream) {
        let channel = ControlChannel::start(
            stream,
            self.epoch,
            self.config.read_buffer_size,
            self.config.max_envelope_size,
            self.inbound_tx.clone(),
        );
        let channel = match channel {
            Ok(channel) => channel,
            Err(e) => {
                self.events.log(format!("TCP connection error: {}", e));
                self.on_control_closed().await;
                return;
            }
        };

        self.events.log(format!("TCP connection established to {}", channel.peer()));
        self.control = Some(channel);
        self.events.emit(CameraEvent::TcpConnected);

        let login = self.session.begin();
        self.publish_state();
        self.send_payload(&login).await;
    }

    async fn on_control_closed(&mut self) {
        self.teardown().await;
        self.events.log("TCP connection closed");
        self.events.emit(CameraEvent::Disconnected);
        self.schedule_reconnect();
    }

    async fn on_frame(&mut self, text: &str) {
        self.events.debug(format!("Received XML: {}", text));

        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.events.error(format!("Malformed envelope: {}", e));
                return;
            }
        };

        for action in self.session.handle(&envelope) {
            match action {
                HandshakeAction::Send(payload) => self.send_payload(&payload).await,
                HandshakeAction::EnvironmentInfo(environment) => {
                    self.snapshot.write().environment = Some(environment.clone());
                    self.events.emit(CameraEvent::EnvironmentInfo(environment));
                }
                HandshakeAction::Established => self.on_established().await,
                HandshakeAction::CameraError(message) => {
                    self.events.error(format!("Camera error: {}", message));
                }
            }
        }

        self.publish_state();
    }

    async fn on_established(&mut self) {
        if let Some(session_id) = self.session.session_id() {
            self.events.log(format!("Session established (id {})", session_id));
        }
        self.publish_state();
        self.events.emit(CameraEvent::Connected);
        self.supervisor.start_keepalive();
        self.start_telemetry().await;
    }

    async fn start_telemetry(&mut self) {
        let port = self.session.environment().and_then(|env| env.udp_port);
        let peer = self.control.as_ref().map(|control| control.peer());

        let (Some(port), Some(peer)) = (port, peer) else {
            self.events.error("Environment info carried no telemetry port");
            self.disconnect_and_retry().await;
            return;
        };

        let camera = SocketAddr::new(peer.ip(), port);
        let result = self
            .telemetry
            .open(port, camera, self.epoch, self.inbound_tx.clone())
            .await;

        match result {
            Ok(()) => {
                self.events.log(format!("Opened UDP socket on port {}", port));
                self.events.log(format!("Connecting via UDP to {}", camera));
                self.poll_telemetry().await;
            }
            Err(e) => {
                self.events.error(format!("Failed opening UDP socket on port {}: {}", port, e));
                self.disconnect_and_retry().await;
            }
        }
    }

    fn on_datagram(&mut self, data: &[u8], from: SocketAddr) {
        if !self.telemetry.accepts(from) {
            tracing::debug!("dropping datagram from unexpected source {}", from);
            return;
        }

        match TelemetryRecord::decode(data) {
            Ok(Some(TelemetryRecord::CameraStatus(exposure))) => {
                self.snapshot.write().exposure = Some(exposure.clone());
                self.events.emit(CameraEvent::ExposureState(exposure));
            }
            Ok(Some(TelemetryRecord::OpticalSetting(optical))) => {
                self.snapshot.write().optical = Some(optical.clone());
                self.events.emit(CameraEvent::OpticalState(optical));
            }
            Ok(None) => {
                tracing::trace!("ignoring telemetry record ({} bytes)", data.len());
            }
            Err(e) => self.events.error(format!("Telemetry decode failed: {}", e)),
        }
    }

    async fn on_keepalive(&mut self) {
        for duty in Supervisor::duties(self.session.is_connected(), self.telemetry.is_open()) {
            match duty {
                Duty::KeepAlive => self.send_payload(commands::KEEP_ALIVE).await,
                Duty::PollTelemetry => self.poll_telemetry().await,
            }
        }
    }

    async fn poll_telemetry(&mut self) {
        if let Err(e) = self.telemetry.poll().await {
            let target = self
                .telemetry
                .camera()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|| "camera".to_string());
            self.events.error(format!("UDP poll to {} failed: {}", target, e));
        }
    }

    /// Wraps and writes a control payload, or skips it if no channel is open.
    async fn send_payload(&mut self, payload: &str) {
        let Some(control) = self.control.as_mut() else {
            self.events.debug("TCP client not connected, skipping send");
            return;
        };

        let envelope = self.session.wrap(payload);
        match control.send(&envelope).await {
            Ok(()) => self.events.debug(format!("Sent XML: {}", envelope)),
            Err(e) => self.events.log(format!("TCP connection error: {}", e)),
        }
    }

    fn publish_state(&self) {
        self.snapshot.write().state = self.session.state();
    }
}

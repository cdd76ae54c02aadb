//! Keep-alive ticking and reconnect scheduling.

use std::future::pending;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Periodic work due on a keep-alive tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duty {
    /// Send the keep-alive control command.
    KeepAlive,
    /// Send a telemetry poll datagram.
    PollTelemetry,
}

/// Owns the keep-alive timer and the pending reconnect of one connection.
#[derive(Debug)]
pub struct Supervisor {
    reconnect_interval: Option<Duration>,
    keepalive_interval: Duration,
    reconnect_at: Option<Instant>,
    keepalive: Option<Interval>,
}

impl Supervisor {
    /// `reconnect_interval` of `None` disables automatic reconnection.
    pub fn new(reconnect_interval: Option<Duration>, keepalive_interval: Duration) -> Self {
        Self {
            reconnect_interval,
            keepalive_interval,
            reconnect_at: None,
            keepalive: None,
        }
    }

    /// Schedules a reconnect after the configured delay.
    ///
    /// Replaces any reconnect already pending. Returns the deadline, or
    /// `None` when reconnection is disabled.
    pub fn schedule_reconnect(&mut self, now: Instant) -> Option<Instant> {
        self.reconnect_at = self.reconnect_interval.map(|delay| now + delay);
        self.reconnect_at
    }

    pub fn cancel_reconnect(&mut self) {
        self.reconnect_at = None;
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Completes when the pending reconnect is due. Never completes if none
    /// is pending.
    pub async fn reconnect_due(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => pending().await,
        }
    }

    /// Consumes the pending reconnect, returning whether one was pending.
    pub fn take_reconnect(&mut self) -> bool {
        self.reconnect_at.take().is_some()
    }

    /// Starts the keep-alive timer. The first tick fires one interval from now.
    pub fn start_keepalive(&mut self) {
        let mut timer = interval_at(
            Instant::now() + self.keepalive_interval,
            self.keepalive_interval,
        );
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.keepalive = Some(timer);
    }

    pub fn stop_keepalive(&mut self) {
        self.keepalive = None;
    }

    pub fn keepalive_running(&self) -> bool {
        self.keepalive.is_some()
    }

    /// Completes on the next keep-alive tick. Never completes while stopped.
    pub async fn next_keepalive(&mut self) {
        match self.keepalive.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => pending().await,
        }
    }

    /// Returns the work due on a tick.
    pub fn duties(connected: bool, telemetry_open: bool) -> Vec<Duty> {
        match (connected, telemetry_open) {
            (false, _) => Vec::new(),
            (true, false) => vec![Duty::KeepAlive],
            (true, true) => vec![Duty::KeepAlive, Duty::PollTelemetry],
        }
    }
}

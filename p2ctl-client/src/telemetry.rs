//! UDP telemetry channel.

use crate::driver::Inbound;
use crate::error::ClientError;
use bytes::Bytes;
use p2ctl_protocol::POLL_DATAGRAM;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Largest datagram read from the socket.
const MAX_DATAGRAM_SIZE: usize = 2048;

/// Telemetry socket lifecycle.
#[derive(Debug, Default)]
pub(crate) enum TelemetryChannel {
    #[default]
    Unopened,
    Open {
        socket: Arc<UdpSocket>,
        camera: SocketAddr,
        reader: JoinHandle<()>,
    },
    Closed,
}

impl TelemetryChannel {
    /// Binds the local telemetry port and starts receiving datagrams.
    ///
    /// `camera` is where poll datagrams go. Datagrams from any other host are
    /// rejected by [`TelemetryChannel::accepts`]. An already open socket is
    /// closed first.
    pub(crate) async fn open(
        &mut self,
        local_port: u16,
        camera: SocketAddr,
        epoch: u64,
        inbound: UnboundedSender<Inbound>,
    ) -> Result<(), ClientError> {
        self.close();

        let unspecified: IpAddr = if camera.is_ipv4() {
            Ipv4Addr::UNSPECIFIED.into()
        } else {
            Ipv6Addr::UNSPECIFIED.into()
        };
        let socket = UdpSocket::bind(SocketAddr::new(unspecified, local_port))
            .await
            .map_err(|e| {
                ClientError::TelemetryUnavailable(format!("bind port {}: {}", local_port, e))
            })?;
        let socket = Arc::new(socket);

        let reader = tokio::spawn(receive_loop(socket.clone(), epoch, inbound));
        *self = TelemetryChannel::Open {
            socket,
            camera,
            reader,
        };
        Ok(())
    }

    /// Sends a poll datagram to the camera.
    pub(crate) async fn poll(&self) -> Result<(), ClientError> {
        match self {
            TelemetryChannel::Open { socket, camera, .. } => {
                socket.send_to(&POLL_DATAGRAM, camera).await?;
                Ok(())
            }
            _ => Err(ClientError::NotConnected),
        }
    }

    /// Returns whether a datagram from `from` belongs to this camera.
    pub(crate) fn accepts(&self, from: SocketAddr) -> bool {
        match self {
            TelemetryChannel::Open { camera, .. } => from.ip() == camera.ip(),
            _ => false,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        matches!(self, TelemetryChannel::Open { .. })
    }

    pub(crate) fn camera(&self) -> Option<SocketAddr> {
        match self {
            TelemetryChannel::Open { camera, .. } => Some(*camera),
            _ => None,
        }
    }

    /// Stops receiving and releases the socket. Does nothing unless open.
    pub(crate) fn close(&mut self) {
        if let TelemetryChannel::Open { reader, .. } = self {
            reader.abort();
            *self = TelemetryChannel::Closed;
        }
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, epoch: u64, inbound: UnboundedSender<Inbound>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let message = match socket.recv_from(&mut buf).await {
            Ok((n, from)) => Inbound::Datagram {
                epoch,
                data: Bytes::copy_from_slice(&buf[..n]),
                from,
            },
            Err(e) => Inbound::DatagramError {
                epoch,
                error: e.to_string(),
            },
        };

        if inbound.send(message).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    async fn free_udp_port() -> u16 {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let mut channel = TelemetryChannel::default();
        assert!(!channel.is_open());
        assert!(matches!(channel.poll().await, Err(ClientError::NotConnected)));

        let camera = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let camera_addr = camera.local_addr().unwrap();
        let port = free_udp_port().await;
        let (tx, _rx) = mpsc::unbounded_channel();

        channel.open(port, camera_addr, 1, tx).await.unwrap();
        assert!(channel.is_open());
        assert_eq!(channel.camera(), Some(camera_addr));

        channel.poll().await.unwrap();
        let mut buf = [0u8; 8];
        let (n, _) = camera.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &POLL_DATAGRAM);

        channel.close();
        assert!(matches!(channel, TelemetryChannel::Closed));
        assert!(!channel.accepts(camera_addr));
    }

    #[tokio::test]
    async fn test_forwards_datagrams() {
        let mut channel = TelemetryChannel::default();
        let camera = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = free_udp_port().await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        channel
            .open(port, camera.local_addr().unwrap(), 9, tx)
            .await
            .unwrap();
        camera
            .send_to(&[0x0A, 1, 2], ("127.0.0.1", port))
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            Inbound::Datagram { epoch, data, from } => {
                assert_eq!(epoch, 9);
                assert_eq!(&data[..], &[0x0A, 1, 2]);
                assert!(channel.accepts(from));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_accepts_by_source_ip() {
        let mut channel = TelemetryChannel::default();
        let port = free_udp_port().await;
        let (tx, _rx) = mpsc::unbounded_channel();
        channel
            .open(port, "127.0.0.1:49153".parse().unwrap(), 1, tx)
            .await
            .unwrap();

        assert!(channel.accepts("127.0.0.1:1000".parse().unwrap()));
        assert!(!channel.accepts("10.1.2.3:49153".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let taken = UdpSocket::bind("0.0.0.0:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut channel = TelemetryChannel::default();
        let result = channel
            .open(port, "127.0.0.1:1".parse().unwrap(), 1, tx)
            .await;
        assert!(matches!(result, Err(ClientError::TelemetryUnavailable(_))));
        assert!(!channel.is_open());
    }
}

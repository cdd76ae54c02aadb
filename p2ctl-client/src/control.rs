//! TCP control channel.
//!
//! The write half stays with the driver. A reader task splits the inbound
//! byte stream into envelopes and forwards them, tagged with the epoch of
//! the connection they arrived on.

use crate::driver::Inbound;
use p2ctl_protocol::Decoder;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Starts a connection attempt in the background.
///
/// The outcome is delivered as [`Inbound::ControlOpened`].
pub(crate) fn connect(
    addr: String,
    epoch: u64,
    inbound: UnboundedSender<Inbound>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!("Connecting to {}...", addr);
        let result = TcpStream::connect(&addr).await;
        let _ = inbound.send(Inbound::ControlOpened { epoch, result });
    })
}

/// An open control connection.
#[derive(Debug)]
pub(crate) struct ControlChannel {
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
    peer: SocketAddr,
}

impl ControlChannel {
    /// Takes ownership of a connected stream and starts its reader task.
    pub(crate) fn start(
        stream: TcpStream,
        epoch: u64,
        read_buffer_size: usize,
        max_envelope_size: usize,
        inbound: UnboundedSender<Inbound>,
    ) -> io::Result<Self> {
        stream.set_nodelay(true).ok();
        let peer = stream.peer_addr()?;
        let (read_half, writer) = stream.into_split();

        let reader = tokio::spawn(read_loop(
            read_half,
            epoch,
            read_buffer_size,
            Decoder::with_max_size(max_envelope_size),
            inbound,
        ));

        Ok(Self {
            writer,
            reader,
            peer,
        })
    }

    /// Address of the camera this channel is connected to.
    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) async fn send(&mut self, envelope: &str) -> io::Result<()> {
        self.writer.write_all(envelope.as_bytes()).await
    }

    /// Stops the reader and shuts down the write half.
    ///
    /// No [`Inbound::ControlClosed`] is delivered for a channel closed this way.
    pub(crate) async fn close(mut self) {
        self.reader.abort();
        let _ = self.writer.shutdown().await;
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    epoch: u64,
    buffer_size: usize,
    mut decoder: Decoder,
    inbound: UnboundedSender<Inbound>,
) {
    let mut buf = vec![0u8; buffer_size];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("read_loop: connection closed");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                let _ = inbound.send(Inbound::ControlError {
                    epoch,
                    error: e.to_string(),
                });
                break;
            }
        };

        tracing::trace!("read_loop: received {} bytes", n);
        decoder.extend(&buf[..n]);

        loop {
            match decoder.decode_envelope() {
                Ok(Some(text)) => {
                    if inbound.send(Inbound::ControlFrame { epoch, text }).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = inbound.send(Inbound::ControlError {
                        epoch,
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    let _ = inbound.send(Inbound::ControlClosed { epoch });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    async fn pair() -> (ControlChannel, TcpStream, mpsc::UnboundedReceiver<Inbound>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let channel = ControlChannel::start(client, 7, 1024, 64 * 1024, tx).unwrap();
        (channel, server, rx)
    }

    #[tokio::test]
    async fn test_frames_split_across_reads() {
        let (channel, mut server, mut rx) = pair().await;
        assert_eq!(channel.peer().ip().to_string(), "127.0.0.1");

        server.write_all(b"<P2Control><Response>").await.unwrap();
        server.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        server
            .write_all(b"</Response></P2Control><P2Control/>")
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            Inbound::ControlFrame { epoch, text } => {
                assert_eq!(epoch, 7);
                assert_eq!(text, "<P2Control><Response></Response></P2Control>");
            }
            other => panic!("unexpected {:?}", other),
        }
        match rx.recv().await.unwrap() {
            Inbound::ControlFrame { text, .. } => assert_eq!(text, "<P2Control/>"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_peer_close_reported() {
        let (_channel, server, mut rx) = pair().await;
        drop(server);

        assert!(matches!(
            rx.recv().await.unwrap(),
            Inbound::ControlClosed { epoch: 7 }
        ));
    }

    #[tokio::test]
    async fn test_send_writes_envelope() {
        let (mut channel, mut server, _rx) = pair().await;
        channel.send("<P2Control/>").await.unwrap();

        let mut buf = [0u8; 12];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"<P2Control/>");

        channel.close().await;
        let mut rest = Vec::new();
        assert_eq!(server.read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _attempt = connect(addr.to_string(), 3, tx);
        match rx.recv().await.unwrap() {
            Inbound::ControlOpened { epoch, result } => {
                assert_eq!(epoch, 3);
                assert!(result.is_err());
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

//! Communication channels for sending and receiving protocol messages.
//!
//! The [`Channel`] trait is the seam between the protocol logic and the
//! transport: the state machine only ever exchanges framed messages, while
//! implementations decide how frames move (a TCP stream, an in-process pair
//! of queues, ...). Frames are the encoded messages of [`crate::codec`]; on a
//! raw byte stream the frame header is what delimits messages.

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::time::timeout;
use tracing::{info, trace};

use crate::codec::{CodecError, Message, MAX_MESSAGE_SIZE};

/// Errors related to sending / receiving / decoding messages, annotated with
/// the protocol phase during which they occurred.
#[derive(Debug)]
pub struct ChannelError {
    /// The protocol phase during which the error occurred.
    pub phase: String,
    /// The specific error that was raised.
    pub reason: ChannelErrorKind,
}

/// The specific error that occurred when trying to send / receive a message.
#[derive(Debug)]
pub enum ChannelErrorKind {
    /// The frame could not be sent over the channel.
    SendError(String),
    /// The frame could not be received over the channel.
    RecvError(String),
    /// The frame could not be encoded or decoded.
    Codec(CodecError),
}

/// Sends a protocol message over the channel, tagging errors with the phase.
pub(crate) async fn send_msg<C: Channel>(
    channel: &mut C,
    phase: &str,
    msg: &Message,
) -> Result<(), ChannelError> {
    let frame = msg.encode().map_err(|e| ChannelError {
        phase: phase.to_string(),
        reason: ChannelErrorKind::Codec(e),
    })?;
    channel.send_frame(frame).await.map_err(|e| ChannelError {
        phase: phase.to_string(),
        reason: ChannelErrorKind::SendError(format!("{e:?}")),
    })
}

/// Receives and decodes a protocol message, tagging errors with the phase.
pub(crate) async fn recv_msg<C: Channel>(
    channel: &mut C,
    phase: &str,
) -> Result<Message, ChannelError> {
    let frame = channel.recv_frame().await.map_err(|e| ChannelError {
        phase: phase.to_string(),
        reason: ChannelErrorKind::RecvError(format!("{e:?}")),
    })?;
    Message::decode(&frame).map_err(|e| ChannelError {
        phase: phase.to_string(),
        reason: ChannelErrorKind::Codec(e),
    })
}

/// A reliable, ordered frame transport between the two parties.
pub trait Channel {
    /// The error that can occur sending or receiving frames.
    type Error: fmt::Debug;

    /// Sends one encoded message frame.
    // We allow the async_fn_in_trait lint because we don't need to place
    // additional bounds on the returned futures.
    #[allow(async_fn_in_trait)]
    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), Self::Error>;

    /// Receives the next message frame.
    #[allow(async_fn_in_trait)]
    async fn recv_frame(&mut self) -> Result<Vec<u8>, Self::Error>;
}

/// Errors of the TCP transport.
#[derive(Debug)]
pub enum TransportError {
    /// The peer closed the connection.
    Closed,
    /// An I/O call did not complete within the configured timeout.
    Timeout,
    /// An underlying socket error.
    Io(io::Error),
    /// The peer announced a frame larger than [`MAX_MESSAGE_SIZE`].
    FrameTooLarge(usize),
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            TransportError::Closed
        } else {
            TransportError::Io(e)
        }
    }
}

/// A [`Channel`] over a TCP stream, with a per-call timeout.
#[derive(Debug)]
pub struct TcpChannel {
    stream: TcpStream,
    timeout: Duration,
}

impl TcpChannel {
    /// Wraps an established stream.
    pub fn from_stream(stream: TcpStream, timeout: Duration) -> Self {
        TcpChannel { stream, timeout }
    }

    /// Binds the port and waits for the single peer to connect.
    pub async fn listen(port: u16, timeout: Duration) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        info!(port, "listening for the evaluator");
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "peer connected");
        Ok(Self::from_stream(stream, timeout))
    }

    /// Connects to a listening peer.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, TransportError> {
        let stream = TcpStream::connect((host, port)).await?;
        info!(host, port, "connected to the garbler");
        Ok(Self::from_stream(stream, timeout))
    }

    async fn read_exact_timed(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        timeout(self.timeout, self.stream.read_exact(buf))
            .await
            .map_err(|_| TransportError::Timeout)??;
        Ok(())
    }
}

impl Channel for TcpChannel {
    type Error = TransportError;

    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), Self::Error> {
        trace!(bytes = frame.len(), "sending frame");
        timeout(self.timeout, self.stream.write_all(&frame))
            .await
            .map_err(|_| TransportError::Timeout)??;
        Ok(())
    }

    async fn recv_frame(&mut self) -> Result<Vec<u8>, Self::Error> {
        // The 5-byte header delimits the frame on the byte stream; the length
        // is checked against the cap before anything is allocated.
        let mut header = [0; 5];
        self.read_exact_timed(&mut header).await?;
        let size = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
        if size > MAX_MESSAGE_SIZE {
            return Err(TransportError::FrameTooLarge(size));
        }
        let mut frame = vec![0; 5 + size];
        frame[..5].copy_from_slice(&header);
        self.read_exact_timed(&mut frame[5..]).await?;
        trace!(bytes = frame.len(), "received frame");
        Ok(frame)
    }
}

/// The error raised by a [`SimpleChannel`] whose peer is gone.
#[derive(Debug)]
pub struct PeerClosed;

/// A simple in-process channel connecting the two parties, for tests and
/// simulations.
#[derive(Debug)]
pub struct SimpleChannel {
    s: Sender<Vec<u8>>,
    r: Receiver<Vec<u8>>,
}

impl SimpleChannel {
    /// Creates a connected pair of channels.
    pub fn pair() -> (Self, Self) {
        let buffer_capacity = 32;
        let (send_a_to_b, recv_a_to_b) = channel(buffer_capacity);
        let (send_b_to_a, recv_b_to_a) = channel(buffer_capacity);
        (
            SimpleChannel {
                s: send_a_to_b,
                r: recv_b_to_a,
            },
            SimpleChannel {
                s: send_b_to_a,
                r: recv_a_to_b,
            },
        )
    }
}

impl Channel for SimpleChannel {
    type Error = PeerClosed;

    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), Self::Error> {
        self.s.send(frame).await.map_err(|_| PeerClosed)
    }

    async fn recv_frame(&mut self) -> Result<Vec<u8>, Self::Error> {
        self.r.recv().await.ok_or(PeerClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MessageType;

    #[tokio::test]
    async fn simple_channel_roundtrip() {
        let (mut a, mut b) = SimpleChannel::pair();
        let msg = Message::new(MessageType::Hello, b"hi".to_vec());
        send_msg(&mut a, "test", &msg).await.unwrap();
        assert_eq!(recv_msg(&mut b, "test").await.unwrap(), msg);
    }

    #[tokio::test]
    async fn simple_channel_detects_closed_peer() {
        let (mut a, b) = SimpleChannel::pair();
        drop(b);
        assert!(a.send_frame(vec![0]).await.is_err());
    }

    #[tokio::test]
    async fn tcp_channel_roundtrip() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut channel = TcpChannel::from_stream(stream, Duration::from_secs(5));
            channel.recv_frame().await.unwrap()
        });
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut channel = TcpChannel::from_stream(stream, Duration::from_secs(5));
        let frame = Message::new(MessageType::Hello, b"tcp".to_vec())
            .encode()
            .unwrap();
        channel.send_frame(frame.clone()).await.unwrap();
        assert_eq!(server.await.unwrap(), frame);
    }

    #[tokio::test]
    async fn tcp_channel_rejects_oversized_frames() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut channel = TcpChannel::from_stream(stream, Duration::from_secs(5));
            channel.recv_frame().await
        });
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut header = vec![1u8];
        header.extend_from_slice(&(MAX_MESSAGE_SIZE as u32 + 1).to_be_bytes());
        stream.write_all(&header).await.unwrap();
        assert!(matches!(
            server.await.unwrap(),
            Err(TransportError::FrameTooLarge(_))
        ));
    }
}

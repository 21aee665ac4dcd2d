//! Network channel over a blocking TCP stream.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

use crate::channel::Channel;
use crate::error::ChannelError;
use crate::types::{ChannelAddress, Frame};

/// Largest frame accepted from the wire (256 MiB).
pub const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Channel carrying length-prefixed bincode frames over TCP.
///
/// Each frame is a big-endian `u32` byte count followed by the encoded
/// `Frame`. TCP provides the in-order, exactly-once delivery the protocol
/// needs; there is no heartbeat, so a silent peer blocks the reader unless a
/// read timeout was configured.
pub struct TcpChannel {
    stream: TcpStream,
    peer: SocketAddr,
    read_timeout: Option<Duration>,
}

impl TcpChannel {
    /// Wraps an established stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self, ChannelError> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        Ok(Self {
            stream,
            peer,
            read_timeout: None,
        })
    }

    /// Connects to a listening peer.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ChannelError> {
        let stream = TcpStream::connect(addr)?;
        debug!(peer = ?stream.peer_addr().ok(), "tcp channel connected");
        Self::from_stream(stream)
    }

    /// Accepts the next connection on a listener.
    pub fn accept(listener: &TcpListener) -> Result<Self, ChannelError> {
        let (stream, addr) = listener.accept()?;
        debug!(peer = %addr, "tcp channel accepted");
        Self::from_stream(stream)
    }

    /// Sets a read timeout; an expired read surfaces as `ChannelError::Timeout`.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Result<Self, ChannelError> {
        self.stream.set_read_timeout(Some(timeout))?;
        self.read_timeout = Some(timeout);
        Ok(self)
    }

    fn map_read_error(&self, err: std::io::Error) -> ChannelError {
        match err.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                let ms = self.read_timeout.map(|t| t.as_millis() as u64).unwrap_or(0);
                ChannelError::Timeout(ms)
            }
            ErrorKind::UnexpectedEof => ChannelError::closed(self.peer()),
            _ => ChannelError::Io(err),
        }
    }
}

impl Channel for TcpChannel {
    fn send_frame(&mut self, frame: Frame) -> Result<(), ChannelError> {
        let bytes = bincode::serialize(&frame)?;
        if bytes.len() > MAX_FRAME_BYTES {
            return Err(ChannelError::FrameTooLarge(bytes.len()));
        }
        let len = (bytes.len() as u32).to_be_bytes();
        self.stream.write_all(&len)?;
        self.stream.write_all(&bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    fn recv_frame(&mut self) -> Result<Frame, ChannelError> {
        let mut len = [0u8; 4];
        if let Err(e) = self.stream.read_exact(&mut len) {
            return Err(self.map_read_error(e));
        }
        let len = u32::from_be_bytes(len) as usize;
        if len > MAX_FRAME_BYTES {
            return Err(ChannelError::FrameTooLarge(len));
        }

        let mut bytes = vec![0u8; len];
        if let Err(e) = self.stream.read_exact(&mut bytes) {
            return Err(self.map_read_error(e));
        }
        Ok(bincode::deserialize(&bytes)?)
    }

    fn peer(&self) -> ChannelAddress {
        ChannelAddress::Tcp(self.peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;
    use std::thread;

    #[test]
    fn test_tcp_echo() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let worker = thread::spawn(move || {
            let mut channel = TcpChannel::connect(addr).unwrap();
            let v = channel.recv_vector(3).unwrap();
            channel.send_vector(3, 1, &(v * 2.0)).unwrap();
        });

        let mut channel = TcpChannel::accept(&listener).unwrap();
        channel
            .send_vector(3, 0, &DVector::from_vec(vec![1.0, 2.5]))
            .unwrap();
        let reply = channel.recv_vector(3).unwrap();
        assert_eq!(reply.as_slice(), &[2.0, 5.0]);

        worker.join().unwrap();
    }

    #[test]
    fn test_tcp_peer_hangup_is_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let worker = thread::spawn(move || {
            let channel = TcpChannel::connect(addr).unwrap();
            drop(channel);
        });

        let mut channel = TcpChannel::accept(&listener).unwrap();
        worker.join().unwrap();
        assert!(channel.recv_frame().unwrap_err().is_disconnect());
    }

    #[test]
    fn test_tcp_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpChannel::connect(addr).unwrap();

        let mut channel = TcpChannel::accept(&listener)
            .unwrap()
            .with_read_timeout(Duration::from_millis(20))
            .unwrap();
        assert!(matches!(channel.recv_frame(), Err(ChannelError::Timeout(20))));
    }
}

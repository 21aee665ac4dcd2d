//! In-process channel backed by tokio unbounded queues.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use crate::channel::Channel;
use crate::error::ChannelError;
use crate::types::{ChannelAddress, Frame};

/// One end of an in-process channel pair.
///
/// Receives block the calling thread, so both ends must live on plain
/// threads, never inside an async runtime.
pub struct MemoryChannel {
    /// Tag of the peer at the other end
    peer: i32,

    /// Outgoing queue to the peer
    tx: UnboundedSender<Frame>,

    /// Incoming queue from the peer
    rx: UnboundedReceiver<Frame>,
}

/// Creates a connected pair of channels.
///
/// The first element talks to `b_tag`, the second to `a_tag`.
pub fn memory_pair(a_tag: i32, b_tag: i32) -> (MemoryChannel, MemoryChannel) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();

    let a = MemoryChannel {
        peer: b_tag,
        tx: a_tx,
        rx: a_rx,
    };
    let b = MemoryChannel {
        peer: a_tag,
        tx: b_tx,
        rx: b_rx,
    };
    (a, b)
}

impl Channel for MemoryChannel {
    fn send_frame(&mut self, frame: Frame) -> Result<(), ChannelError> {
        trace!(peer = self.peer, kind = %frame.payload.kind(), "send frame");
        self.tx
            .send(frame)
            .map_err(|_| ChannelError::closed(self.peer()))
    }

    fn recv_frame(&mut self) -> Result<Frame, ChannelError> {
        self.rx
            .blocking_recv()
            .ok_or_else(|| ChannelError::closed(self.peer()))
    }

    fn peer(&self) -> ChannelAddress {
        ChannelAddress::Memory { peer: self.peer }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Payload;

    #[test]
    fn test_pair_preserves_order() {
        let (mut a, mut b) = memory_pair(0, 1);

        for i in 0..10 {
            a.send_id(0, 0, &[i]).unwrap();
        }
        for i in 0..10 {
            assert_eq!(b.recv_id(0).unwrap(), vec![i]);
        }
    }

    #[test]
    fn test_peer_addresses() {
        let (a, b) = memory_pair(0, 3);
        assert_eq!(a.peer(), ChannelAddress::Memory { peer: 3 });
        assert_eq!(b.peer(), ChannelAddress::Memory { peer: 0 });
    }

    #[test]
    fn test_dropped_peer_is_closed() {
        let (mut a, b) = memory_pair(0, 1);
        drop(b);

        let err = a
            .send_frame(Frame::new(0, 0, Payload::Scalar(1.0)))
            .unwrap_err();
        assert!(err.is_disconnect());
        assert!(a.recv_frame().unwrap_err().is_disconnect());
    }
}

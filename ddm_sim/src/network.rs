//! Channel wrapper with fault injection.

use ddm_env::{Channel, ChannelAddress, ChannelError, Frame};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct LinkState {
    severed: bool,
    /// Sever automatically once this many frames went out
    sever_after: Option<usize>,
    frames_sent: usize,
    frames_received: usize,
}

/// Handle for breaking a link from outside the shadow that owns it.
#[derive(Debug, Clone, Default)]
pub struct FaultController {
    state: Arc<Mutex<LinkState>>,
}

impl FaultController {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        // a panicking test thread must not hide the link state
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every later send and receive fails as if the peer hung up.
    pub fn sever(&self) {
        self.lock().severed = true;
    }

    /// Severs the link once `frames` more frames have been sent.
    pub fn sever_after(&self, frames: usize) {
        let mut state = self.lock();
        state.sever_after = Some(state.frames_sent + frames);
    }

    pub fn heal(&self) {
        let mut state = self.lock();
        state.severed = false;
        state.sever_after = None;
    }

    pub fn is_severed(&self) -> bool {
        self.lock().severed
    }

    pub fn frames_sent(&self) -> usize {
        self.lock().frames_sent
    }

    pub fn frames_received(&self) -> usize {
        self.lock().frames_received
    }
}

/// A channel that fails on demand.
pub struct FaultyChannel<C: Channel> {
    inner: C,
    controller: FaultController,
}

impl<C: Channel> FaultyChannel<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            controller: FaultController::new(),
        }
    }

    pub fn controller(&self) -> FaultController {
        self.controller.clone()
    }

    fn severed_error(&self) -> ChannelError {
        ChannelError::closed(format!("{} (severed)", self.inner.peer()))
    }
}

impl<C: Channel> Channel for FaultyChannel<C> {
    fn send_frame(&mut self, frame: Frame) -> Result<(), ChannelError> {
        {
            let mut state = self.controller.lock();
            if state.sever_after.is_some_and(|limit| state.frames_sent >= limit) {
                state.severed = true;
            }
            if state.severed {
                drop(state);
                debug!(peer = %self.inner.peer(), "dropping frame on severed link");
                return Err(self.severed_error());
            }
            state.frames_sent += 1;
        }
        self.inner.send_frame(frame)
    }

    fn recv_frame(&mut self) -> Result<Frame, ChannelError> {
        if self.controller.is_severed() {
            return Err(self.severed_error());
        }
        // the lock is not held across the blocking receive
        let frame = self.inner.recv_frame()?;
        self.controller.lock().frames_received += 1;
        Ok(frame)
    }

    fn peer(&self) -> ChannelAddress {
        self.inner.peer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddm_env::memory_pair;

    #[test]
    fn test_severed_link_fails_both_ways() {
        let (a, mut b) = memory_pair(0, 1);
        let mut a = FaultyChannel::new(a);
        let controller = a.controller();

        a.send_id(0, 0, &[1, 2]).unwrap();
        assert_eq!(b.recv_id(0).unwrap(), vec![1, 2]);
        assert_eq!(controller.frames_sent(), 1);

        controller.sever();
        assert!(matches!(a.send_id(0, 0, &[3]), Err(ChannelError::Closed(_))));
        assert!(a.recv_id(0).is_err());

        controller.heal();
        a.send_id(0, 0, &[4]).unwrap();
        assert_eq!(b.recv_id(0).unwrap(), vec![4]);
    }

    #[test]
    fn test_sever_after_counts_frames() {
        let (a, _b) = memory_pair(0, 1);
        let mut a = FaultyChannel::new(a);
        let controller = a.controller();

        controller.sever_after(2);
        a.send_scalar(0, 0, 1.0).unwrap();
        a.send_scalar(0, 0, 2.0).unwrap();
        assert!(!controller.is_severed());
        assert!(a.send_scalar(0, 0, 3.0).is_err());
        assert!(controller.is_severed());
    }
}

//! Blocking channel abstraction between a coordinator and one worker.

use nalgebra::{DMatrix, DVector};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ChannelError;
use crate::types::{ChannelAddress, ClassTag, Frame, Payload};

/// Ordered, reliable, blocking transport to a single peer.
///
/// # Implementations
///
/// - **In-process**: `MemoryChannel` - tokio unbounded queues, blocking receive
/// - **Network**: `TcpChannel` - length-prefixed bincode frames
///
/// # Frame Flow
///
/// ```text
/// Coordinator (Shadow)          Channel              Worker (Actor)
///   |                              |                       |
///   |-- send_id([opcode, ..]) ---->|                       |
///   |-- send_<payload>(..) ------->|---------------------->|-- recv + dispatch
///   |                              |<----------------------|-- send_id([status])
///   |<-- recv_id / recv_<reply> ---|                       |
/// ```
///
/// Implementations must deliver frames exactly once and in send order; the
/// protocol above relies on that and carries no sequence numbers of its own.
/// Only `send_frame` and `recv_frame` are transport specific, the typed
/// helpers are built on top of them.
/// The typed `recv_*` helpers check the frame's `db_tag` and drop its
/// `commit_tag`.
pub trait Channel: Send {
    /// Sends one frame, blocking until the transport accepted it.
    fn send_frame(&mut self, frame: Frame) -> Result<(), ChannelError>;

    /// Receives the next frame, blocking until one arrives.
    fn recv_frame(&mut self) -> Result<Frame, ChannelError>;

    /// Returns the address of the peer.
    fn peer(&self) -> ChannelAddress;

    fn send_scalar(&mut self, db_tag: i32, commit_tag: i32, value: f64) -> Result<(), ChannelError> {
        self.send_frame(Frame::new(db_tag, commit_tag, Payload::Scalar(value)))
    }

    fn recv_scalar(&mut self, db_tag: i32) -> Result<f64, ChannelError> {
        self.recv_frame()?.expect_db_tag(db_tag)?.into_scalar()
    }

    fn send_id(&mut self, db_tag: i32, commit_tag: i32, id: &[i32]) -> Result<(), ChannelError> {
        self.send_frame(Frame::new(db_tag, commit_tag, Payload::Id(id.to_vec())))
    }

    fn recv_id(&mut self, db_tag: i32) -> Result<Vec<i32>, ChannelError> {
        self.recv_frame()?.expect_db_tag(db_tag)?.into_id()
    }

    fn send_vector(
        &mut self,
        db_tag: i32,
        commit_tag: i32,
        vector: &DVector<f64>,
    ) -> Result<(), ChannelError> {
        self.send_frame(Frame::new(db_tag, commit_tag, Payload::from_vector(vector)))
    }

    fn recv_vector(&mut self, db_tag: i32) -> Result<DVector<f64>, ChannelError> {
        self.recv_frame()?.expect_db_tag(db_tag)?.into_vector()
    }

    fn send_matrix(
        &mut self,
        db_tag: i32,
        commit_tag: i32,
        matrix: &DMatrix<f64>,
    ) -> Result<(), ChannelError> {
        self.send_frame(Frame::new(db_tag, commit_tag, Payload::from_matrix(matrix)))
    }

    fn recv_matrix(&mut self, db_tag: i32) -> Result<DMatrix<f64>, ChannelError> {
        self.recv_frame()?.expect_db_tag(db_tag)?.into_matrix()
    }

    /// Sends an object as its class tag plus its own serialized bytes.
    fn send_obj(
        &mut self,
        db_tag: i32,
        commit_tag: i32,
        object: &dyn Movable,
    ) -> Result<(), ChannelError> {
        let payload = Payload::Object {
            class_tag: object.class_tag(),
            bytes: object.send_self()?,
        };
        self.send_frame(Frame::new(db_tag, commit_tag, payload))
    }

    /// Receives into an already allocated object of the expected type.
    fn recv_obj(&mut self, db_tag: i32, object: &mut dyn Movable) -> Result<(), ChannelError> {
        let (class_tag, bytes) = self.recv_object_bytes(db_tag)?;
        if class_tag != object.class_tag() {
            return Err(ChannelError::ClassTagMismatch {
                expected: object.class_tag(),
                received: class_tag,
            });
        }
        object.recv_self(&bytes)
    }

    /// Receives the raw class tag and bytes of an object, for callers that
    /// allocate the concrete type through a broker.
    fn recv_object_bytes(&mut self, db_tag: i32) -> Result<(ClassTag, Vec<u8>), ChannelError> {
        self.recv_frame()?.expect_db_tag(db_tag)?.into_object()
    }
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn send_frame(&mut self, frame: Frame) -> Result<(), ChannelError> {
        (**self).send_frame(frame)
    }

    fn recv_frame(&mut self) -> Result<Frame, ChannelError> {
        (**self).recv_frame()
    }

    fn peer(&self) -> ChannelAddress {
        (**self).peer()
    }
}

/// An object that can cross a channel.
///
/// The receiver allocates a blank instance (usually through a broker keyed by
/// `class_tag`) and populates it with `recv_self`.
pub trait Movable {
    /// Tag identifying the concrete type.
    fn class_tag(&self) -> ClassTag;

    /// Serializes the object state.
    fn send_self(&self) -> Result<Vec<u8>, ChannelError>;

    /// Replaces the object state with the decoded bytes.
    fn recv_self(&mut self, bytes: &[u8]) -> Result<(), ChannelError>;
}

/// Encodes a serde value into wire bytes.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, ChannelError> {
    Ok(bincode::serialize(value)?)
}

/// Decodes wire bytes into a serde value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ChannelError> {
    Ok(bincode::deserialize(bytes)?)
}

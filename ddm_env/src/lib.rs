//! Channel abstraction for the domain-decomposition engine.
//!
//! A coordinator and each of its workers talk over one `Channel`: an ordered,
//! reliable, blocking pipe of tagged frames. The engine above it only ever
//! sees the trait, so the same protocol runs over in-process queues (tests,
//! threaded runs) and TCP sockets (one process per subdomain).
//!
//! # Frames
//!
//! Every frame carries `(db_tag, commit_tag)` and one payload: a scalar, an ID
//! list, a vector, a matrix, or an object (class tag + bytes). Objects are
//! rebuilt on the receiving side through a broker keyed by the class tag.
//!
//! # Example
//!
//! ```ignore
//! use ddm_env::{memory_pair, Channel};
//!
//! let (mut coordinator, mut worker) = memory_pair(0, 1);
//! coordinator.send_id(0, 0, &[55])?;
//! let request = worker.recv_id(0)?;
//! ```

mod channel;
mod error;
mod memory_impl;
mod tcp_impl;
mod types;

pub use channel::{decode, encode, Channel, Movable};
pub use error::ChannelError;
pub use memory_impl::{memory_pair, MemoryChannel};
pub use tcp_impl::{TcpChannel, MAX_FRAME_BYTES};
pub use types::{ChannelAddress, ClassTag, Frame, Payload, PayloadKind};

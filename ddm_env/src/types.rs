//! Wire types shared by every transport.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

use crate::error::ChannelError;

/// Tag identifying the concrete type of a movable object.
pub type ClassTag = i32;

/// Logical address of the peer at the other end of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelAddress {
    /// In-process peer, identified by its logical tag (subdomain tag)
    Memory { peer: i32 },

    /// Remote peer reachable over TCP
    Tcp(SocketAddr),
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelAddress::Memory { peer } => write!(f, "mem:{}", peer),
            ChannelAddress::Tcp(addr) => write!(f, "tcp:{}", addr),
        }
    }
}

/// Kind of data carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadKind {
    Scalar,
    Id,
    Vector,
    Matrix,
    Object,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayloadKind::Scalar => "scalar",
            PayloadKind::Id => "id",
            PayloadKind::Vector => "vector",
            PayloadKind::Matrix => "matrix",
            PayloadKind::Object => "object",
        };
        f.write_str(name)
    }
}

/// Data carried by one frame.
///
/// Matrices travel column-major, the storage order nalgebra uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Scalar(f64),
    Id(Vec<i32>),
    Vector(Vec<f64>),
    Matrix {
        rows: usize,
        cols: usize,
        data: Vec<f64>,
    },
    Object {
        class_tag: ClassTag,
        bytes: Vec<u8>,
    },
}

impl Payload {
    /// Returns the payload kind.
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Scalar(_) => PayloadKind::Scalar,
            Payload::Id(_) => PayloadKind::Id,
            Payload::Vector(_) => PayloadKind::Vector,
            Payload::Matrix { .. } => PayloadKind::Matrix,
            Payload::Object { .. } => PayloadKind::Object,
        }
    }

    /// Builds a matrix payload from an nalgebra matrix.
    pub fn from_matrix(matrix: &DMatrix<f64>) -> Self {
        Payload::Matrix {
            rows: matrix.nrows(),
            cols: matrix.ncols(),
            data: matrix.as_slice().to_vec(),
        }
    }

    /// Builds a vector payload from an nalgebra vector.
    pub fn from_vector(vector: &DVector<f64>) -> Self {
        Payload::Vector(vector.as_slice().to_vec())
    }

    fn mismatch(&self, expected: PayloadKind) -> ChannelError {
        ChannelError::UnexpectedPayload {
            expected,
            received: self.kind(),
        }
    }

    pub fn into_scalar(self) -> Result<f64, ChannelError> {
        match self {
            Payload::Scalar(value) => Ok(value),
            other => Err(other.mismatch(PayloadKind::Scalar)),
        }
    }

    pub fn into_id(self) -> Result<Vec<i32>, ChannelError> {
        match self {
            Payload::Id(id) => Ok(id),
            other => Err(other.mismatch(PayloadKind::Id)),
        }
    }

    pub fn into_vector(self) -> Result<DVector<f64>, ChannelError> {
        match self {
            Payload::Vector(data) => Ok(DVector::from_vec(data)),
            other => Err(other.mismatch(PayloadKind::Vector)),
        }
    }

    /// Converts into a matrix, validating the entry count against the shape.
    pub fn into_matrix(self) -> Result<DMatrix<f64>, ChannelError> {
        match self {
            Payload::Matrix { rows, cols, data } => {
                if rows.checked_mul(cols) != Some(data.len()) {
                    return Err(ChannelError::MalformedMatrix {
                        rows,
                        cols,
                        len: data.len(),
                    });
                }
                Ok(DMatrix::from_vec(rows, cols, data))
            }
            other => Err(other.mismatch(PayloadKind::Matrix)),
        }
    }

    pub fn into_object(self) -> Result<(ClassTag, Vec<u8>), ChannelError> {
        match self {
            Payload::Object { class_tag, bytes } => Ok((class_tag, bytes)),
            other => Err(other.mismatch(PayloadKind::Object)),
        }
    }
}

/// The unit of transport.
///
/// `db_tag` names the stream the payload belongs to and `commit_tag` the
/// committed state of the sender when it was produced.
///
/// Only `db_tag` is checked on receipt. Sender and receiver advance their
/// commit tags independently (a worker stamps replies with its own domain's
/// tag), so a mismatch says nothing about the stream being out of step.
/// Receivers that care read it from `recv_frame`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub db_tag: i32,
    pub commit_tag: i32,
    pub payload: Payload,
}

impl Frame {
    /// Creates a new frame.
    pub fn new(db_tag: i32, commit_tag: i32, payload: Payload) -> Self {
        Self {
            db_tag,
            commit_tag,
            payload,
        }
    }

    /// Returns the payload if the frame belongs to `db_tag`.
    pub fn expect_db_tag(self, db_tag: i32) -> Result<Payload, ChannelError> {
        if self.db_tag != db_tag {
            return Err(ChannelError::DbTagMismatch {
                expected: db_tag,
                received: self.db_tag,
            });
        }
        Ok(self.payload)
    }
}

//! Frame fidelity across both transports.

use ddm_env::{memory_pair, Channel, ChannelError, Frame, Movable, Payload, TcpChannel};
use nalgebra::{DMatrix, DVector};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use std::net::TcpListener;
use std::thread;

const SIZES: [usize; 3] = [0, 1, 100];

fn exercise<C: Channel>(a: &mut C, b: &mut C) {
    for &n in &SIZES {
        let v = DVector::from_fn(n, |i, _| (i as f64) * 0.1 - 3.0);
        a.send_vector(1, 4, &v).unwrap();
        assert_eq!(b.recv_vector(1).unwrap(), v);

        let m = DMatrix::from_fn(n, n.max(1), |i, j| (i * 7 + j) as f64 / 3.0);
        a.send_matrix(1, 4, &m).unwrap();
        assert_eq!(b.recv_matrix(1).unwrap(), m);

        let id: Vec<i32> = (0..n as i32).map(|i| i * -3).collect();
        a.send_id(1, 4, &id).unwrap();
        assert_eq!(b.recv_id(1).unwrap(), id);
    }

    a.send_scalar(1, 4, f64::MIN_POSITIVE).unwrap();
    assert_eq!(b.recv_scalar(1).unwrap(), f64::MIN_POSITIVE);
}

#[test]
fn test_memory_roundtrip_fidelity() {
    let (mut a, mut b) = memory_pair(0, 1);
    exercise(&mut a, &mut b);
}

#[test]
fn test_tcp_roundtrip_fidelity() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let client = thread::spawn(move || TcpChannel::connect(addr).unwrap());
    let mut server = TcpChannel::accept(&listener).unwrap();
    let mut client = client.join().unwrap();

    exercise(&mut server, &mut client);
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct Sample {
    name: String,
    values: Vec<f64>,
}

impl Movable for Sample {
    fn class_tag(&self) -> i32 {
        42
    }

    fn send_self(&self) -> Result<Vec<u8>, ChannelError> {
        ddm_env::encode(self)
    }

    fn recv_self(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        *self = ddm_env::decode(bytes)?;
        Ok(())
    }
}

#[test]
fn test_object_roundtrip() {
    let (mut a, mut b) = memory_pair(0, 1);
    let sample = Sample {
        name: "sample".into(),
        values: vec![1.0, -2.0],
    };

    a.send_obj(9, 0, &sample).unwrap();
    let mut received = Sample::default();
    b.recv_obj(9, &mut received).unwrap();
    assert_eq!(received, sample);
}

#[test]
fn test_commit_tag_travels_unchecked() {
    let (mut a, mut b) = memory_pair(0, 1);

    a.send_scalar(1, 7, 2.5).unwrap();
    assert_eq!(b.recv_scalar(1).unwrap(), 2.5);

    a.send_scalar(1, 9, 2.5).unwrap();
    let frame = b.recv_frame().unwrap();
    assert_eq!((frame.db_tag, frame.commit_tag), (1, 9));
}

#[test]
fn test_wrong_kind_and_tag_are_errors() {
    let (mut a, mut b) = memory_pair(0, 1);

    a.send_scalar(1, 0, 1.0).unwrap();
    assert!(matches!(
        b.recv_vector(1),
        Err(ChannelError::UnexpectedPayload { .. })
    ));

    a.send_scalar(2, 0, 1.0).unwrap();
    assert!(matches!(
        b.recv_scalar(1),
        Err(ChannelError::DbTagMismatch { expected: 1, received: 2 })
    ));
}

proptest! {
    #[test]
    fn prop_matrix_frames_checked_against_shape(
        rows in 0usize..8,
        cols in 0usize..8,
        extra in -2i32..3,
    ) {
        let len = ((rows * cols) as i32 + extra).max(0) as usize;
        let data: Vec<f64> = (0..len).map(|i| i as f64).collect();
        let (mut a, mut b) = memory_pair(0, 1);
        a.send_frame(Frame::new(1, 0, Payload::Matrix { rows, cols, data })).unwrap();

        let received = b.recv_matrix(1);
        if len == rows * cols {
            let m = received.unwrap();
            prop_assert_eq!((m.nrows(), m.ncols()), (rows, cols));
        } else {
            let is_malformed = matches!(received, Err(ChannelError::MalformedMatrix { .. }));
            prop_assert!(is_malformed);
        }
    }
}

//! Transport framing over the single host connection.
//!
//! Every message in both directions is a 4-byte big-endian length followed
//! by exactly that many payload bytes.
//!
//! - **Frame**: [`read_frame`] / [`write_frame`] over any async stream
//! - **Connection**: typed send/receive helpers for JSON, text and raw frames

pub mod connection;
pub mod frame;

pub use connection::Connection;
pub use frame::{read_frame, write_frame};

//! # Volley Files
//!
//! File side of the Volley transfer engine.
//!
//! This crate provides:
//! - Building one fixed-size, zero-padded packet from a source file
//! - Append-mode output for received bytes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod packet;
pub mod sink;

pub use packet::{MAX_PACKET_SIZE, Packet, PacketBuilder, PacketError};
pub use sink::{AppendFile, OutputSink, SinkError};

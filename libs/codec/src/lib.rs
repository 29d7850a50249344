//! # State Envelope Codec
//!
//! ## Purpose
//!
//! Turns a [`types::StateMessage`] into the self-describing bytes that cross
//! the wire, and back. The format is a single MessagePack map, readable by
//! any MessagePack implementation, so peers written in other languages can
//! exchange envelopes with this crate.
//!
//! ## Wire Layout
//!
//! ```text
//! { <key>: <value>, ...,
//!   <tensor key>: { "shape": [int, ...], "dtype": "float32", "data": <bin> },
//!   "HeLlO": "wOrLd" }
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Framing or size ceilings (belongs in network/ and the relay worker)
//! - Socket or queue handling

pub mod envelope;
pub mod error;
mod wire;

pub use envelope::{decode, decode_checked, encode};
pub use error::{CodecError, CodecResult};

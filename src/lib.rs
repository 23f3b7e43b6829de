#![allow(
    clippy::needless_return,
    clippy::similar_names,
    clippy::inline_always
)]
#![warn(
    clippy::correctness,
    clippy::perf,
    clippy::pedantic,
    clippy::inline_always
)]
//! An incremental DEFLATE (RFC 1951) decompressor with optional ZLIB
//! (RFC 1950) framing.
//!
//! The decoder writes into a caller-provided fixed-capacity buffer and
//! accepts its compressed input as any sequence of byte chunks: feed it
//! the whole stream at once, or one byte per call, and it suspends and
//! resumes between chunks without losing a bit.
#[macro_use]
extern crate log;

pub use crate::decoder::{
    inflate, inflate_with_options, inflate_zlib, InflateOptions, InflateStream,
};
pub use crate::misc::InflateStatus;

mod bitstream;
mod blocks;
mod chunks;
mod decoder;
pub mod errors;
mod huffman;
mod misc;

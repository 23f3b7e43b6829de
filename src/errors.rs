//! Contains most common errors that may be encountered in inflating a
//! DEFLATE or ZLIB stream
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

/// Common decode errors
///
/// Success-family results (`Done`, `Unfinished`, `Noop`) are carried by
/// [`InflateStatus`](crate::InflateStatus); everything here is fatal and
/// leaves the stream in a state only fit for dropping.
#[allow(clippy::module_name_repetitions)]
pub enum DecodeErrors {
    /// Malformed DEFLATE or ZLIB framing
    Format(String),
    /// Problems constructing a Huffman table or decoding a symbol with it
    HuffmanDecode(String),
    /// The destination buffer cannot hold the decompressed data
    OutputFull,
    /// Could not allocate chunk bookkeeping for appended input
    OutOfMemory,
}

impl Debug for DecodeErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self {
            Self::Format(ref reason) => write!(f, "Malformed stream. Reason:{}", reason),
            Self::HuffmanDecode(ref reason) => {
                write!(f, "Error decoding huffman tables.Reason:{}", reason)
            }
            Self::OutputFull => {
                write!(f, "Destination buffer exhausted, cannot write more bytes")
            }
            Self::OutOfMemory => write!(f, "Could not allocate memory for input chunks"),
        }
    }
}

impl Display for DecodeErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self {
            Self::Format(ref reason) => write!(f, "Malformed stream. Reason:{}", reason),
            Self::HuffmanDecode(ref reason) => {
                write!(f, "Error decoding huffman tables.Reason:{}", reason)
            }
            Self::OutputFull => {
                write!(f, "Destination buffer exhausted, cannot write more bytes")
            }
            Self::OutOfMemory => write!(f, "Could not allocate memory for input chunks"),
        }
    }
}

impl Error for DecodeErrors {}

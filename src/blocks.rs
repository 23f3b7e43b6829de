#![allow(clippy::cast_possible_truncation)]
//! DEFLATE block payload decoding.
//!
//! Two engines live here: the stored-block copy and the Huffman block
//! body shared by fixed and dynamic blocks. Both can suspend at any point
//! where the input runs dry and continue on the next feed; the sub-state
//! structs below carry exactly what a restart needs. In one-shot mode the
//! same suspension points turn into hard errors instead.

use crate::bitstream::BitState;
use crate::chunks::ChunkStore;
use crate::errors::DecodeErrors;
use crate::huffman::{HuffmanTableExt, MAX_CODE_LENGTH};
use crate::misc::{InflateStatus, Mode};

/// Progress marker inside one iteration of the Huffman block body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockState {
    /// Between iterations, nothing pending
    None,
    /// A length was decoded, the distance is still owed
    Length,
    /// Length and distance are known, the copy is owed
    Backref,
}

/// Saved mid-iteration state of a fixed/dynamic block body
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlkState {
    pub state: BlockState,
    pub len: u32,
    pub dist: u32,
    /// Start of the back-reference source, `dpos - dist` at save time
    pub src: usize,
    pub copy_remaining: u32,
}

impl BlkState {
    pub const fn new() -> BlkState {
        BlkState {
            state: BlockState::None,
            len: 0,
            dist: 0,
            src: 0,
            copy_remaining: 0,
        }
    }

    pub fn clear(&mut self) {
        *self = BlkState::new();
    }
}

/// Saved state of a stored (uncompressed) block
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawState {
    /// LEN field of the block header
    pub len: u16,
    /// Bytes of payload still to copy
    pub remlen: usize,
    /// Set while suspended mid-copy
    pub resuming: bool,
    /// The sub-byte residue has been discarded
    pub align_done: bool,
    /// LEN/NLEN were read and validated
    pub header_read: bool,
}

impl RawState {
    pub const fn new() -> RawState {
        RawState {
            len: 0,
            remlen: 0,
            resuming: false,
            align_done: false,
            header_read: false,
        }
    }

    pub fn clear(&mut self) {
        *self = RawState::new();
    }
}

/// Outcome of one resumable step
enum Step {
    Done,
    Yield,
}

fn eof_error() -> DecodeErrors {
    DecodeErrors::Format("compressed stream ended before decoding completed".to_string())
}

/// Starvation policy at a suspension point
pub(crate) fn starved(mode: Mode) -> Result<InflateStatus, DecodeErrors> {
    match mode {
        Mode::Streaming => Ok(InflateStatus::Unfinished),
        Mode::OneShot => Err(eof_error()),
    }
}

fn starved_step(mode: Mode) -> Result<Step, DecodeErrors> {
    match mode {
        Mode::Streaming => Ok(Step::Yield),
        Mode::OneShot => Err(eof_error()),
    }
}

/// Decode a stored block (BTYPE=00) into `dst`.
///
/// Aligns to a byte boundary, validates the LEN/NLEN header, then emits
/// LEN bytes: whole bytes still buffered in the bit reader first, the
/// chunk cursor afterwards. Returns `Done` when the block is complete or
/// `Unfinished` with all progress saved in `raw`.
pub(crate) fn inflate_raw(
    dst: &mut [u8], dstpos: &mut usize, store: &ChunkStore, bs: &mut BitState,
    raw: &mut RawState, mode: Mode,
) -> Result<InflateStatus, DecodeErrors> {
    if !raw.header_read {
        if !raw.align_done {
            bs.align();
            raw.align_done = true;
        }

        if bs.refill(store, 32) < 32 {
            return starved(mode);
        }
        let header = bs.peek() as u32;

        bs.consume(32);

        let len = header as u16;
        let nlen = (header >> 16) as u16;

        if len != !nlen {
            return Err(DecodeErrors::Format(format!(
                "stored block length check failed, LEN={len:#06x} NLEN={nlen:#06x}"
            )));
        }

        if *dstpos + usize::from(len) > dst.len() {
            return Err(DecodeErrors::OutputFull);
        }
        raw.len = len;
        raw.remlen = usize::from(len);
        raw.header_read = true;

        trace!("stored block, {} bytes", len);
    } else if raw.resuming {
        trace!("resuming stored block, {}/{} bytes remaining", raw.remlen, raw.len);
        raw.resuming = false;
    }

    let mut dpos = *dstpos;
    let mut remlen = raw.remlen;

    // whole bytes already sitting in the bit buffers come first
    if remlen > 0 {
        let n = bs.drain_bytes(&mut dst[dpos..dpos + remlen]);

        dpos += n;
        remlen -= n;
    }

    // then copy straight from the chunk cursor, across chunk boundaries
    while remlen > 0 {
        let avail = match store.bytes(bs.chunk) {
            Some(data) if bs.pos < data.len() => &data[bs.pos..],
            Some(_) if bs.chunk + 1 < store.len() => {
                bs.chunk += 1;
                bs.pos = 0;
                continue;
            }
            _ => &[],
        };

        if avail.is_empty() {
            raw.resuming = true;
            raw.remlen = remlen;
            *dstpos = dpos;

            return starved(mode);
        }
        let n = avail.len().min(remlen);

        dst[dpos..dpos + n].copy_from_slice(&avail[..n]);
        bs.pos += n;
        dpos += n;
        remlen -= n;
    }

    *dstpos = dpos;
    raw.clear();

    Ok(InflateStatus::Done)
}

/// Decode the body of a fixed or dynamic Huffman block into `dst`.
///
/// Runs the literal/length loop until the end-of-block symbol, emitting
/// literals and executing back-references. Returns `Done` when the block
/// ends, `Unfinished` when streaming input ran dry, with the pending
/// iteration recorded in `blk`.
pub(crate) fn inflate_block(
    dst: &mut [u8], dstpos: &mut usize, store: &ChunkStore, bs: &mut BitState,
    blk: &mut BlkState, tlit: &HuffmanTableExt, tdist: &HuffmanTableExt, mode: Mode,
) -> Result<InflateStatus, DecodeErrors> {
    let cap = dst.len();
    let mut dpos = *dstpos;

    // a suspended iteration finishes before new symbols are decoded
    match blk.state {
        BlockState::Length => {
            let len = blk.len;

            match backref(dst, &mut dpos, store, bs, blk, tdist, len, mode) {
                Ok(Step::Done) => {}
                Ok(Step::Yield) => {
                    *dstpos = dpos;
                    return Ok(InflateStatus::Unfinished);
                }
                Err(e) => {
                    *dstpos = dpos;
                    return Err(e);
                }
            }
        }
        BlockState::Backref => {
            let len = blk.copy_remaining as usize;
            let dist = blk.dist as usize;

            debug_assert_eq!(blk.src, dpos - dist);
            copy_backref(dst, &mut dpos, len, dist);
            blk.clear();
        }
        BlockState::None => {}
    }

    loop {
        // worst case per symbol: 15 code bits plus 5 length extra bits
        bs.refill(store, 21);

        let (lsym, used, len) = tlit.decode_of(bs.peek());

        if used == 0 {
            *dstpos = dpos;

            if bs.nbits >= MAX_CODE_LENGTH {
                return Err(DecodeErrors::HuffmanDecode(
                    "invalid literal/length code".to_string(),
                ));
            }
            return starved(mode);
        }

        if used > bs.nbits {
            // the code ran past the buffered bits, retry after a refill
            *dstpos = dpos;
            return starved(mode);
        }

        if lsym > 285 {
            *dstpos = dpos;
            return Err(DecodeErrors::Format(format!(
                "invalid literal/length symbol {lsym}"
            )));
        }
        bs.consume(used);

        if lsym < 256 {
            // literal byte
            if dpos >= cap {
                *dstpos = dpos;
                return Err(DecodeErrors::OutputFull);
            }
            dst[dpos] = lsym as u8;
            dpos += 1;
            continue;
        }

        if lsym == 256 {
            // end of block
            break;
        }

        blk.state = BlockState::Length;
        blk.len = len;

        match backref(dst, &mut dpos, store, bs, blk, tdist, len, mode) {
            Ok(Step::Done) => {}
            Ok(Step::Yield) => {
                *dstpos = dpos;
                return Ok(InflateStatus::Unfinished);
            }
            Err(e) => {
                *dstpos = dpos;
                return Err(e);
            }
        }
    }

    *dstpos = dpos;
    blk.clear();

    Ok(InflateStatus::Done)
}

/// Decode the distance half of a back-reference and execute the copy.
///
/// On entry `blk.state` is `Length` with the decoded length in `len`;
/// yielding leaves it there so the retry skips straight back here.
#[allow(clippy::too_many_arguments)]
fn backref(
    dst: &mut [u8], dpos: &mut usize, store: &ChunkStore, bs: &mut BitState,
    blk: &mut BlkState, tdist: &HuffmanTableExt, len: u32, mode: Mode,
) -> Result<Step, DecodeErrors> {
    // worst case: 15 code bits plus 13 distance extra bits
    bs.refill(store, 29);

    let (dist, used) = tdist.decode_ext(bs.peek());

    if used == 0 {
        if bs.nbits >= MAX_CODE_LENGTH {
            return Err(DecodeErrors::HuffmanDecode("invalid distance code".to_string()));
        }
        return starved_step(mode);
    }

    if used > bs.nbits {
        return starved_step(mode);
    }

    if dist == 0 || dist as usize > *dpos {
        return Err(DecodeErrors::Format(format!(
            "back-reference distance {dist} outside the {} bytes decoded so far",
            *dpos
        )));
    }
    bs.consume(used);

    if *dpos + len as usize > dst.len() {
        return Err(DecodeErrors::OutputFull);
    }

    blk.state = BlockState::Backref;
    blk.dist = dist;
    blk.src = *dpos - dist as usize;
    blk.copy_remaining = len;

    copy_backref(dst, dpos, len as usize, dist as usize);
    blk.clear();

    Ok(Step::Done)
}

/// Reproduce `len` bytes starting `dist` back from the write cursor.
///
/// Overlap with `dist < len` replicates the run byte by byte; a distance
/// of one is a plain fill of the previous byte.
fn copy_backref(dst: &mut [u8], dpos: &mut usize, len: usize, dist: usize) {
    let p = *dpos;

    if dist == 1 {
        let byte = dst[p - 1];

        dst[p..p + len].fill(byte);
    } else if dist >= len {
        // disjoint ranges, one bulk copy
        let (head, tail) = dst.split_at_mut(p);

        tail[..len].copy_from_slice(&head[p - dist..p - dist + len]);
    } else {
        for i in 0..len {
            dst[p + i] = dst[p - dist + i];
        }
    }

    *dpos = p + len;
}

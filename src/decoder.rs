//! Main inflate logic.
//!
//! [`InflateStream`] owns every piece of decode state and drives an
//! explicit tagged state machine over it: the outer loop reads the current
//! phase, dispatches to its handler, and each handler either finishes and
//! names the next phase, yields for more input, or fails. Suspension never
//! advances past the last fully processed unit, so a stream can be fed a
//! byte at a time and produce output identical to a one-shot decode.
#![allow(clippy::doc_markdown)]

use std::sync::OnceLock;

use crate::bitstream::BitState;
use crate::blocks::{inflate_block, inflate_raw, starved, BlkState, RawState};
use crate::chunks::ChunkStore;
use crate::errors::DecodeErrors;
use crate::huffman::{HuffmanTable, HuffmanTableExt};
use crate::misc::{
    InflateStatus, Mode, CODE_LENGTH_ORDER, DIST_EXTRAS, FIXED_DIST_LENGTHS,
    FIXED_LITLEN_LENGTHS, LENGTH_EXTRAS, MAX_CODELEN_CODES, MAX_DIST_CODES,
    MAX_LITLEN_CODES,
};

/// Top-level decode phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InflState {
    /// Nothing decoded yet
    None,
    /// Reading the 2-byte ZLIB header
    Header,
    /// Reading BFINAL/BTYPE of the next block
    BlockHeader,
    /// Inside a stored block
    Raw,
    /// Inside a fixed-Huffman block
    Fixed,
    /// Reading the dynamic header and its code-length code lengths
    DynHeader,
    /// Expanding the literal/length and distance code lengths
    DynCodelen,
    /// Inside a dynamic-Huffman block body
    DynBlock,
    /// Terminal, further calls keep reporting completion
    Done,
}

/// Saved state of a dynamic block header between feeds
struct DynState {
    /// Literal/length code count; zero doubles as "header not read yet"
    hlit: usize,
    hdist: usize,
    hclen: usize,
    /// `hlit + hdist`, total entries of `lens`
    n: usize,
    /// Write cursor into `codelens` and then `lens`
    i: usize,
    codelens: [u8; MAX_CODELEN_CODES],
    lens: [u8; MAX_LITLEN_CODES + MAX_DIST_CODES],
    /// Built tables double as their own validity flags
    tcodelen: Option<HuffmanTable>,
    tlit: Option<HuffmanTableExt>,
    tdist: Option<HuffmanTableExt>,
}

impl DynState {
    fn new() -> DynState {
        DynState {
            hlit: 0,
            hdist: 0,
            hclen: 0,
            n: 0,
            i: 0,
            codelens: [0; MAX_CODELEN_CODES],
            lens: [0; MAX_LITLEN_CODES + MAX_DIST_CODES],
            tcodelen: None,
            tlit: None,
            tdist: None,
        }
    }

    fn clear(&mut self) {
        *self = DynState::new();
    }
}

/// Decoder configuration
///
/// The only knob is whether the stream starts with a 2-byte ZLIB header
/// (RFC 1950) ahead of the DEFLATE payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct InflateOptions {
    zlib_header: bool,
}

impl InflateOptions {
    #[must_use]
    pub const fn new() -> InflateOptions {
        InflateOptions { zlib_header: false }
    }

    /// Expect and validate a ZLIB header ahead of the DEFLATE data
    #[must_use]
    pub const fn set_zlib_header(mut self, yes: bool) -> InflateOptions {
        self.zlib_header = yes;
        self
    }

    #[must_use]
    pub const fn zlib_header(self) -> bool {
        self.zlib_header
    }
}

/// An incremental DEFLATE/ZLIB decompressor writing into a caller-provided
/// buffer
///
/// The stream borrows the destination for its whole lifetime and may also
/// borrow every input slice handed to [`include`](Self::include) or
/// [`feed`](Self::feed), which is what lets it keep pointers into caller
/// memory across calls without copying large inputs.
///
/// ```
/// use zune_inflate::{InflateStream, InflateStatus};
///
/// // stored block holding the single byte 'A'
/// let src = [0x01, 0x01, 0x00, 0xFE, 0xFF, 0x41];
/// let mut dst = [0_u8; 4];
///
/// let mut stream = InflateStream::new(&mut dst);
/// assert_eq!(stream.feed(&src).unwrap(), InflateStatus::Done);
/// assert_eq!(stream.position(), 1);
/// ```
pub struct InflateStream<'a> {
    dst: &'a mut [u8],
    dstpos: usize,
    options: InflateOptions,
    chunks: ChunkStore<'a>,
    bs: BitState,
    state: InflState,
    /// BFINAL of the block in flight
    bfinal: bool,
    /// BTYPE of the block in flight
    btype: u8,
    header_done: bool,
    raw: RawState,
    blk: BlkState,
    dynamic: DynState,
    errored: bool,
}

impl<'a> InflateStream<'a> {
    /// Create a stream decoding a raw DEFLATE payload into `dst`
    pub fn new(dst: &'a mut [u8]) -> InflateStream<'a> {
        InflateStream::new_with_options(dst, InflateOptions::new())
    }

    /// Create a stream expecting ZLIB framing around the payload
    pub fn new_zlib(dst: &'a mut [u8]) -> InflateStream<'a> {
        InflateStream::new_with_options(dst, InflateOptions::new().set_zlib_header(true))
    }

    pub fn new_with_options(dst: &'a mut [u8], options: InflateOptions) -> InflateStream<'a> {
        InflateStream {
            dst,
            dstpos: 0,
            options,
            chunks: ChunkStore::new(),
            bs: BitState::new(),
            state: InflState::None,
            bfinal: false,
            btype: 0,
            header_done: false,
            raw: RawState::new(),
            blk: BlkState::new(),
            dynamic: DynState::new(),
            errored: false,
        }
    }

    /// Append a chunk of compressed input without decoding anything.
    ///
    /// Chunks may split the stream at any byte boundary; they are decoded
    /// as one contiguous input. Small chunks are copied into a pooled
    /// buffer, large ones are borrowed for the stream's lifetime.
    pub fn include(&mut self, data: &'a [u8]) -> Result<(), DecodeErrors> {
        self.chunks.append(data)
    }

    /// Decode everything that was [`include`](Self::include)d, one shot.
    ///
    /// Input exhaustion mid-decode is fatal here; use
    /// [`feed`](Self::feed) when more data may arrive later.
    ///
    /// # Errors
    /// See [`DecodeErrors`] for the failure taxonomy.
    pub fn run(&mut self) -> Result<InflateStatus, DecodeErrors> {
        if self.errored {
            return Err(errored_error());
        }

        if self.state == InflState::Done {
            return Ok(InflateStatus::Done);
        }

        if self.chunks.is_empty() {
            return Ok(InflateStatus::Noop);
        }

        self.drive(Mode::OneShot)
    }

    /// Append `data` and decode as far as the input allows.
    ///
    /// Returns [`InflateStatus::Done`] when the final block completed,
    /// [`InflateStatus::Unfinished`] when the decoder suspended waiting
    /// for more input, and [`InflateStatus::Noop`] when there is nothing
    /// to do yet. Feeding after completion is idempotent and keeps
    /// returning `Done`.
    ///
    /// # Errors
    /// See [`DecodeErrors`]; an errored stream only supports dropping.
    pub fn feed(&mut self, data: &'a [u8]) -> Result<InflateStatus, DecodeErrors> {
        if self.errored {
            return Err(errored_error());
        }
        self.chunks.append(data)?;

        if self.state == InflState::Done {
            return Ok(InflateStatus::Done);
        }

        if self.chunks.is_empty() || (data.is_empty() && self.state == InflState::None) {
            return Ok(InflateStatus::Noop);
        }

        self.drive(Mode::Streaming)
    }

    /// Number of decompressed bytes written so far, always a valid prefix
    /// of the final output
    #[must_use]
    pub const fn position(&self) -> usize {
        self.dstpos
    }

    /// Sum of all input chunk lengths appended so far
    #[must_use]
    pub fn total_in(&self) -> usize {
        self.chunks.total_in()
    }

    /// True once the final block has been fully decoded
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self.state, InflState::Done)
    }

    fn drive(&mut self, mode: Mode) -> Result<InflateStatus, DecodeErrors> {
        match self.drive_states(mode) {
            Ok(status) => Ok(status),
            Err(e) => {
                self.errored = true;
                Err(e)
            }
        }
    }

    fn drive_states(&mut self, mode: Mode) -> Result<InflateStatus, DecodeErrors> {
        loop {
            match self.state {
                InflState::None => {
                    self.bs.reset();
                    self.state = if self.options.zlib_header() && !self.header_done {
                        InflState::Header
                    } else {
                        InflState::BlockHeader
                    };
                }

                InflState::Header => {
                    if self.bs.refill(&self.chunks, 16) < 16 {
                        return starved(mode);
                    }
                    self.read_zlib_header()?;
                    self.state = InflState::BlockHeader;
                }

                InflState::BlockHeader => {
                    if self.bs.refill(&self.chunks, 3) < 3 {
                        return starved(mode);
                    }
                    let bits = self.bs.peek();

                    self.bfinal = bits & 1 != 0;
                    self.btype = ((bits >> 1) & 3) as u8;
                    self.bs.consume(3);

                    trace!("block: bfinal={} btype={}", self.bfinal, self.btype);

                    self.state = match self.btype {
                        0 => InflState::Raw,
                        1 => InflState::Fixed,
                        2 => InflState::DynHeader,
                        _ => {
                            return Err(DecodeErrors::Format(
                                "reserved block type 3".to_string(),
                            ))
                        }
                    };
                }

                InflState::Raw => {
                    let status = {
                        let InflateStream {
                            dst,
                            dstpos,
                            chunks,
                            bs,
                            raw,
                            ..
                        } = &mut *self;

                        inflate_raw(dst, dstpos, chunks, bs, raw, mode)?
                    };

                    match status {
                        InflateStatus::Done => self.finish_block(),
                        other => return Ok(other),
                    }
                }

                InflState::Fixed => {
                    let status = {
                        let (tlit, tdist) = fixed_tables();
                        let InflateStream {
                            dst,
                            dstpos,
                            chunks,
                            bs,
                            blk,
                            ..
                        } = &mut *self;

                        inflate_block(dst, dstpos, chunks, bs, blk, tlit, tdist, mode)?
                    };

                    match status {
                        InflateStatus::Done => self.finish_block(),
                        other => return Ok(other),
                    }
                }

                InflState::DynHeader => match self.dyn_header(mode)? {
                    InflateStatus::Done => self.state = InflState::DynCodelen,
                    other => return Ok(other),
                },

                InflState::DynCodelen => match self.dyn_codelens(mode)? {
                    InflateStatus::Done => self.state = InflState::DynBlock,
                    other => return Ok(other),
                },

                InflState::DynBlock => {
                    let status = {
                        let InflateStream {
                            dst,
                            dstpos,
                            chunks,
                            bs,
                            blk,
                            dynamic,
                            ..
                        } = &mut *self;

                        let (Some(tlit), Some(tdist)) = (&dynamic.tlit, &dynamic.tdist) else {
                            return Err(DecodeErrors::HuffmanDecode(
                                "dynamic tables were not built".to_string(),
                            ));
                        };

                        inflate_block(dst, dstpos, chunks, bs, blk, tlit, tdist, mode)?
                    };

                    match status {
                        InflateStatus::Done => {
                            // tables are per block, invalidate them
                            self.dynamic.clear();
                            self.finish_block();
                        }
                        other => return Ok(other),
                    }
                }

                InflState::Done => return Ok(InflateStatus::Done),
            }
        }
    }

    fn finish_block(&mut self) {
        if self.bfinal {
            self.state = InflState::Done;
            debug!("inflate complete, {} bytes written", self.dstpos);
        } else {
            self.state = InflState::BlockHeader;
        }
    }

    /// Validate CMF/FLG, 16 bits already buffered
    fn read_zlib_header(&mut self) -> Result<(), DecodeErrors> {
        let word = self.bs.peek();
        let cmf = (word & 0xFF) as u8;
        let flg = ((word >> 8) & 0xFF) as u8;

        let cm = cmf & 0xF;
        let cinfo = cmf >> 4;

        if cm != 8 {
            return Err(DecodeErrors::Format(format!(
                "unsupported compression method {cm}, expected 8 (DEFLATE)"
            )));
        }

        if ((u16::from(cmf) << 8) | u16::from(flg)) % 31 != 0 {
            return Err(DecodeErrors::Format(
                "zlib header checksum mismatch".to_string(),
            ));
        }

        if flg & 0x20 != 0 {
            // FDICT, no preset dictionary support
            return Err(DecodeErrors::Format(
                "preset dictionaries are not supported".to_string(),
            ));
        }

        if cinfo > 7 {
            warn!("zlib CINFO {} exceeds the 32 KiB window", cinfo);
        }
        self.bs.consume(16);
        self.header_done = true;

        debug!("zlib header: CINFO={} FLEVEL={}", cinfo, flg >> 6);

        Ok(())
    }

    /// Read HLIT/HDIST/HCLEN and the permuted code-length code lengths,
    /// then build the 19-symbol table
    fn dyn_header(&mut self, mode: Mode) -> Result<InflateStatus, DecodeErrors> {
        let InflateStream {
            chunks,
            bs,
            dynamic: d,
            ..
        } = &mut *self;

        if d.hlit == 0 {
            if bs.refill(chunks, 14) < 14 {
                return starved(mode);
            }
            let bits = bs.peek();
            let hlit = (bits & 0x1F) as usize + 257;
            let hdist = ((bits >> 5) & 0x1F) as usize + 1;
            let hclen = ((bits >> 10) & 0xF) as usize + 4;

            bs.consume(14);

            if hlit > 286 {
                return Err(DecodeErrors::Format(format!(
                    "HLIT declares {hlit} literal/length codes, maximum is 286"
                )));
            }

            if hdist > 30 {
                return Err(DecodeErrors::Format(format!(
                    "HDIST declares {hdist} distance codes, maximum is 30"
                )));
            }

            debug!("dynamic block: hlit={hlit} hdist={hdist} hclen={hclen}");

            d.hlit = hlit;
            d.hdist = hdist;
            d.hclen = hclen;
            d.n = hlit + hdist;
            d.i = 0;
            d.codelens = [0; MAX_CODELEN_CODES];
            d.lens = [0; MAX_LITLEN_CODES + MAX_DIST_CODES];
        }

        while d.i < d.hclen {
            if bs.refill(chunks, 3) < 3 {
                return starved(mode);
            }
            d.codelens[CODE_LENGTH_ORDER[d.i]] = (bs.peek() & 0x7) as u8;
            bs.consume(3);
            d.i += 1;
        }

        let table = HuffmanTable::new(&d.codelens)
            .map_err(|e| DecodeErrors::HuffmanDecode(format!("code-length table: {e}")))?;

        d.tcodelen = Some(table);
        d.i = 0;

        Ok(InflateStatus::Done)
    }

    /// Expand the `hlit + hdist` code lengths, repeats included, and build
    /// the literal/length and distance tables
    #[allow(clippy::cast_possible_truncation)]
    fn dyn_codelens(&mut self, mode: Mode) -> Result<InflateStatus, DecodeErrors> {
        let InflateStream {
            chunks,
            bs,
            dynamic: d,
            ..
        } = &mut *self;

        let DynState {
            tcodelen,
            lens,
            i,
            n,
            hlit,
            hdist,
            tlit,
            tdist,
            ..
        } = d;

        let Some(tcl) = tcodelen.as_ref() else {
            return Err(DecodeErrors::HuffmanDecode(
                "code-length table was not built".to_string(),
            ));
        };
        let (n, hlit, hdist) = (*n, *hlit, *hdist);

        while *i < n {
            // worst case: 7 code bits plus 7 repeat bits
            bs.refill(chunks, 14);

            let (sym, used) = tcl.decode(bs.peek());

            if used == 0 {
                if bs.nbits >= 7 {
                    return Err(DecodeErrors::HuffmanDecode(
                        "invalid code-length code".to_string(),
                    ));
                }
                return starved(mode);
            }
            // a symbol and its repeat bits are consumed together, so a
            // suspension can only fall between whole symbols
            let extra = match sym {
                16 => 2,
                17 => 3,
                18 => 7,
                _ => 0,
            };

            if used + extra > bs.nbits {
                return starved(mode);
            }

            match sym {
                0..=15 => {
                    bs.consume(used);
                    lens[*i] = sym as u8;
                    *i += 1;
                }
                16 => {
                    let repeat = 3 + ((bs.peek() >> used) & 0x3) as usize;

                    bs.consume(used + 2);

                    if *i == 0 || *i + repeat > n {
                        return Err(DecodeErrors::Format(
                            "code-length repeat has nothing to repeat or overflows".to_string(),
                        ));
                    }
                    let prev = lens[*i - 1];

                    lens[*i..*i + repeat].fill(prev);
                    *i += repeat;
                }
                17 => {
                    let repeat = 3 + ((bs.peek() >> used) & 0x7) as usize;

                    bs.consume(used + 3);

                    if *i + repeat > n {
                        return Err(DecodeErrors::Format(
                            "zero-length run overflows the code-length array".to_string(),
                        ));
                    }
                    // the array is pre-zeroed, skipping writes the zeros
                    *i += repeat;
                }
                18 => {
                    let repeat = 11 + ((bs.peek() >> used) & 0x7F) as usize;

                    bs.consume(used + 7);

                    if *i + repeat > n {
                        return Err(DecodeErrors::Format(
                            "zero-length run overflows the code-length array".to_string(),
                        ));
                    }
                    *i += repeat;
                }
                _ => {
                    return Err(DecodeErrors::HuffmanDecode(format!(
                        "invalid code-length symbol {sym}"
                    )))
                }
            }
        }

        let lit = HuffmanTableExt::new_of(&lens[..hlit], &LENGTH_EXTRAS, 257)
            .map_err(|e| DecodeErrors::HuffmanDecode(format!("literal/length table: {e}")))?;
        let dist = HuffmanTableExt::new(&lens[hlit..hlit + hdist], &DIST_EXTRAS)
            .map_err(|e| DecodeErrors::HuffmanDecode(format!("distance table: {e}")))?;

        *tlit = Some(lit);
        *tdist = Some(dist);
        *tcodelen = None;

        Ok(InflateStatus::Done)
    }
}

fn errored_error() -> DecodeErrors {
    DecodeErrors::Format("stream previously failed, create a new stream".to_string())
}

/// Process-wide fixed literal/length and distance tables, built once
fn fixed_tables() -> (&'static HuffmanTableExt, &'static HuffmanTableExt) {
    static TABLES: OnceLock<(HuffmanTableExt, HuffmanTableExt)> = OnceLock::new();

    let (tlit, tdist) = TABLES.get_or_init(|| {
        let tlit = HuffmanTableExt::new_of(&FIXED_LITLEN_LENGTHS, &LENGTH_EXTRAS, 257)
            .expect("fixed literal/length lengths are well formed");
        let tdist = HuffmanTableExt::new(&FIXED_DIST_LENGTHS, &DIST_EXTRAS)
            .expect("fixed distance lengths are well formed");

        (tlit, tdist)
    });

    (tlit, tdist)
}

/// Inflate a raw DEFLATE buffer into `dst`, returning the decompressed
/// length.
///
/// One-shot equivalent of creating a stream, including `src` and running
/// it; truncated input is an error here.
///
/// # Errors
/// See [`DecodeErrors`].
pub fn inflate(src: &[u8], dst: &mut [u8]) -> Result<usize, DecodeErrors> {
    inflate_with_options(src, dst, InflateOptions::new())
}

/// Inflate a ZLIB-framed buffer into `dst`, returning the decompressed
/// length
///
/// # Errors
/// See [`DecodeErrors`].
pub fn inflate_zlib(src: &[u8], dst: &mut [u8]) -> Result<usize, DecodeErrors> {
    inflate_with_options(src, dst, InflateOptions::new().set_zlib_header(true))
}

/// Inflate `src` into `dst` with explicit options
///
/// # Errors
/// See [`DecodeErrors`].
pub fn inflate_with_options(
    src: &[u8], dst: &mut [u8], options: InflateOptions,
) -> Result<usize, DecodeErrors> {
    let mut stream = InflateStream::new_with_options(dst, options);

    stream.include(src)?;
    stream.run()?;

    Ok(stream.position())
}

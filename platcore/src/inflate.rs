//! DEFLATE / zlib decompression.
//!
//! Decodes into a caller-provided buffer of fixed capacity and reports how many
//! bytes were produced. Supports stored, fixed-Huffman and dynamic-Huffman
//! blocks, plus the zlib wrapper with its trailing Adler-32 checksum.

use thiserror::Error;

/// Number of bits resolved by the primary Huffman lookup table.
const PRIMARY_BITS: u32 = 9;
const MAX_CODE_BITS: usize = 15;

const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115,
    131, 163, 195, 227, 258,
];
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];
/// Order in which code-length code lengths appear in a dynamic block header.
const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Reasons a compressed stream could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InflateError {
    #[error("input ended before the stream was complete")]
    Truncated,
    #[error("reserved block type 3")]
    InvalidBlockType,
    #[error("stored block length {len:#06x} does not match its complement {nlen:#06x}")]
    StoredLength { len: u16, nlen: u16 },
    #[error("invalid Huffman code lengths")]
    InvalidCodeLengths,
    #[error("invalid Huffman symbol")]
    InvalidSymbol,
    #[error("back-reference distance {distance} exceeds the {produced} bytes produced so far")]
    InvalidDistance { distance: usize, produced: usize },
    #[error("output buffer of {capacity} bytes is too small")]
    OutputOverflow { capacity: usize },
    #[error("invalid zlib header")]
    BadZlibHeader,
    #[error("zlib preset dictionaries are not supported")]
    PresetDictionary,
    #[error("Adler-32 mismatch: stream says {expected:#010x}, data gives {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

/// Decode a raw DEFLATE stream into `output`, returning the bytes written.
pub fn inflate(input: &[u8], output: &mut [u8]) -> Result<usize, InflateError> {
    let mut inflater = Inflater::new(input, output);
    inflater.run()?;
    Ok(inflater.out.len)
}

/// Decode a zlib-wrapped DEFLATE stream into `output` and validate its Adler-32.
pub fn zlib_decompress(input: &[u8], output: &mut [u8]) -> Result<usize, InflateError> {
    let (cmf, flg) = match input {
        [cmf, flg, ..] => (*cmf, *flg),
        _ => return Err(InflateError::Truncated),
    };
    let header = (u16::from(cmf) << 8) | u16::from(flg);
    if cmf & 0x0f != 8 || cmf >> 4 > 7 || header % 31 != 0 {
        return Err(InflateError::BadZlibHeader);
    }
    if flg & 0x20 != 0 {
        return Err(InflateError::PresetDictionary);
    }

    let mut inflater = Inflater::new(&input[2..], output);
    inflater.run()?;

    inflater.reader.align_to_byte();
    let mut expected = 0u32;
    for _ in 0..4 {
        expected = (expected << 8) | inflater.reader.take(8)?;
    }

    let written = inflater.out.len;
    let actual = adler32(&inflater.out.buf[..written]);
    if expected != actual {
        return Err(InflateError::ChecksumMismatch { expected, actual });
    }
    Ok(written)
}

/// Adler-32 checksum as used by the zlib trailer.
pub fn adler32(data: &[u8]) -> u32 {
    const MOD: u32 = 65521;
    // Largest run that cannot overflow `b` before reduction.
    const NMAX: usize = 5552;

    let (mut a, mut b) = (1u32, 0u32);
    for chunk in data.chunks(NMAX) {
        for &byte in chunk {
            a += u32::from(byte);
            b += a;
        }
        a %= MOD;
        b %= MOD;
    }
    (b << 16) | a
}

/// LSB-first bit reader over the compressed input.
struct BitReader<'a> {
    input: &'a [u8],
    pos: usize,
    bits: u64,
    count: u32,
}

impl<'a> BitReader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            bits: 0,
            count: 0,
        }
    }

    fn refill(&mut self) {
        while self.count <= 56 && self.pos < self.input.len() {
            self.bits |= u64::from(self.input[self.pos]) << self.count;
            self.pos += 1;
            self.count += 8;
        }
    }

    /// Look at the next `n` bits without consuming them. Missing input reads as zero.
    fn peek(&mut self, n: u32) -> u32 {
        if self.count < n {
            self.refill();
        }
        (self.bits & ((1u64 << n) - 1)) as u32
    }

    fn consume(&mut self, n: u32) -> Result<(), InflateError> {
        if n > self.count {
            return Err(InflateError::Truncated);
        }
        self.bits >>= n;
        self.count -= n;
        Ok(())
    }

    fn take(&mut self, n: u32) -> Result<u32, InflateError> {
        let value = self.peek(n);
        self.consume(n)?;
        Ok(value)
    }

    fn align_to_byte(&mut self) {
        let partial = self.count % 8;
        self.bits >>= partial;
        self.count -= partial;
    }

    /// Take `n` whole bytes straight from the input. The bit buffer must be empty.
    fn take_bytes(&mut self, n: usize) -> Result<&'a [u8], InflateError> {
        debug_assert_eq!(self.count, 0);
        let end = self.pos.checked_add(n).ok_or(InflateError::Truncated)?;
        let bytes = self.input.get(self.pos..end).ok_or(InflateError::Truncated)?;
        self.pos = end;
        Ok(bytes)
    }
}

/// Fixed-capacity output window; back-references read from it directly.
struct Output<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl Output<'_> {
    fn push(&mut self, byte: u8) -> Result<(), InflateError> {
        let capacity = self.buf.len();
        let slot = self
            .buf
            .get_mut(self.len)
            .ok_or(InflateError::OutputOverflow { capacity })?;
        *slot = byte;
        self.len += 1;
        Ok(())
    }

    fn extend(&mut self, bytes: &[u8]) -> Result<(), InflateError> {
        let end = self.len + bytes.len();
        if end > self.buf.len() {
            return Err(InflateError::OutputOverflow {
                capacity: self.buf.len(),
            });
        }
        self.buf[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }

    /// Copy `length` bytes starting `distance` bytes back. Byte-wise so that
    /// overlapping runs repeat the pattern.
    fn copy_back(&mut self, distance: usize, length: usize) -> Result<(), InflateError> {
        if distance == 0 || distance > self.len {
            return Err(InflateError::InvalidDistance {
                distance,
                produced: self.len,
            });
        }
        if self.len + length > self.buf.len() {
            return Err(InflateError::OutputOverflow {
                capacity: self.buf.len(),
            });
        }
        for _ in 0..length {
            self.buf[self.len] = self.buf[self.len - distance];
            self.len += 1;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum EntryKind {
    #[default]
    Invalid,
    Symbol,
    Subtable,
}

/// Lookup entry. For `Symbol` `value` is the symbol and `bits` the full code
/// length; for `Subtable` `value` is the subtable offset and `bits` its index width.
#[derive(Clone, Copy, Debug, Default)]
struct Entry {
    value: u16,
    bits: u8,
    kind: EntryKind,
}

/// Canonical Huffman decoding table: a primary table indexed by the next
/// `PRIMARY_BITS` input bits, followed by subtables for longer codes.
pub(crate) struct Huffman {
    table: Vec<Entry>,
}

/// Assign canonical codes to `lengths`, returning `(symbol, code, length)` for
/// every symbol with a non-zero length. Codes are ordered by length, then symbol.
pub(crate) fn canonical_codes(lengths: &[u8]) -> Result<Vec<(u16, u32, u8)>, InflateError> {
    let mut counts = [0u16; MAX_CODE_BITS + 1];
    for &len in lengths {
        if usize::from(len) > MAX_CODE_BITS {
            return Err(InflateError::InvalidCodeLengths);
        }
        counts[usize::from(len)] += 1;
    }
    counts[0] = 0;

    let mut left: i32 = 1;
    for &count in &counts[1..] {
        left <<= 1;
        left -= i32::from(count);
        if left < 0 {
            return Err(InflateError::InvalidCodeLengths);
        }
    }

    let mut next_code = [0u32; MAX_CODE_BITS + 1];
    let mut code = 0u32;
    for len in 1..=MAX_CODE_BITS {
        code = (code + u32::from(counts[len - 1])) << 1;
        next_code[len] = code;
    }

    let mut codes = Vec::with_capacity(lengths.len());
    for (symbol, &len) in lengths.iter().enumerate() {
        if len == 0 {
            continue;
        }
        let code = next_code[usize::from(len)];
        next_code[usize::from(len)] += 1;
        codes.push((symbol as u16, code, len));
    }
    Ok(codes)
}

fn reverse_bits(mut code: u32, len: u8) -> u32 {
    let mut reversed = 0;
    for _ in 0..len {
        reversed = (reversed << 1) | (code & 1);
        code >>= 1;
    }
    reversed
}

impl Huffman {
    pub(crate) fn new(lengths: &[u8]) -> Result<Self, InflateError> {
        let codes = canonical_codes(lengths)?;
        let primary_size = 1usize << PRIMARY_BITS;
        let primary_mask = primary_size - 1;
        let mut table = vec![Entry::default(); primary_size];

        // Input is read LSB-first while codes are defined MSB-first.
        let codes: Vec<(u16, usize, u8)> = codes
            .into_iter()
            .map(|(symbol, code, len)| (symbol, reverse_bits(code, len) as usize, len))
            .collect();

        let mut sub_bits = vec![0u8; primary_size];
        for &(_, reversed, len) in &codes {
            if u32::from(len) > PRIMARY_BITS {
                let prefix = reversed & primary_mask;
                sub_bits[prefix] = sub_bits[prefix].max(len - PRIMARY_BITS as u8);
            }
        }
        for (prefix, &bits) in sub_bits.iter().enumerate() {
            if bits > 0 {
                let offset = table.len();
                table.resize(offset + (1usize << bits), Entry::default());
                table[prefix] = Entry {
                    value: offset as u16,
                    bits,
                    kind: EntryKind::Subtable,
                };
            }
        }

        for &(symbol, reversed, len) in &codes {
            let entry = Entry {
                value: symbol,
                bits: len,
                kind: EntryKind::Symbol,
            };
            if u32::from(len) <= PRIMARY_BITS {
                let mut index = reversed;
                while index < primary_size {
                    table[index] = entry;
                    index += 1 << len;
                }
            } else {
                let link = table[reversed & primary_mask];
                let offset = usize::from(link.value);
                let size = 1usize << link.bits;
                let mut index = reversed >> PRIMARY_BITS;
                while index < size {
                    table[offset + index] = entry;
                    index += 1 << (u32::from(len) - PRIMARY_BITS);
                }
            }
        }

        Ok(Self { table })
    }

    fn decode(&self, reader: &mut BitReader<'_>) -> Result<u16, InflateError> {
        let mut entry = self.table[reader.peek(PRIMARY_BITS) as usize];
        if entry.kind == EntryKind::Subtable {
            let bits = reader.peek(PRIMARY_BITS + u32::from(entry.bits));
            entry = self.table[usize::from(entry.value) + (bits >> PRIMARY_BITS) as usize];
        }
        if entry.kind != EntryKind::Symbol {
            return Err(InflateError::InvalidSymbol);
        }
        reader.consume(u32::from(entry.bits))?;
        Ok(entry.value)
    }
}

fn fixed_tables() -> Result<(Huffman, Huffman), InflateError> {
    let mut lengths = [0u8; 288];
    lengths[..144].fill(8);
    lengths[144..256].fill(9);
    lengths[256..280].fill(7);
    lengths[280..].fill(8);
    Ok((Huffman::new(&lengths)?, Huffman::new(&[5u8; 30])?))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Header,
    Stored,
    Fixed,
    Dynamic,
    Done,
}

struct Inflater<'i, 'o> {
    reader: BitReader<'i>,
    out: Output<'o>,
    state: State,
    last_block: bool,
    fixed: Option<(Huffman, Huffman)>,
}

impl<'i, 'o> Inflater<'i, 'o> {
    fn new(input: &'i [u8], output: &'o mut [u8]) -> Self {
        Self {
            reader: BitReader::new(input),
            out: Output { buf: output, len: 0 },
            state: State::Header,
            last_block: false,
            fixed: None,
        }
    }

    fn run(&mut self) -> Result<(), InflateError> {
        loop {
            self.state = match self.state {
                State::Header => {
                    self.last_block = self.reader.take(1)? == 1;
                    match self.reader.take(2)? {
                        0 => State::Stored,
                        1 => State::Fixed,
                        2 => State::Dynamic,
                        _ => return Err(InflateError::InvalidBlockType),
                    }
                }
                State::Stored => {
                    self.stored_block()?;
                    self.after_block()
                }
                State::Fixed => {
                    if self.fixed.is_none() {
                        self.fixed = Some(fixed_tables()?);
                    }
                    if let Some((lit, dist)) = &self.fixed {
                        decode_block(&mut self.reader, &mut self.out, lit, dist)?;
                    }
                    self.after_block()
                }
                State::Dynamic => {
                    let (lit, dist) = self.dynamic_tables()?;
                    decode_block(&mut self.reader, &mut self.out, &lit, &dist)?;
                    self.after_block()
                }
                State::Done => return Ok(()),
            };
        }
    }

    fn after_block(&self) -> State {
        if self.last_block {
            State::Done
        } else {
            State::Header
        }
    }

    fn stored_block(&mut self) -> Result<(), InflateError> {
        self.reader.align_to_byte();
        let len = self.reader.take(16)? as u16;
        let nlen = self.reader.take(16)? as u16;
        if len != !nlen {
            return Err(InflateError::StoredLength { len, nlen });
        }

        let mut remaining = usize::from(len);
        while remaining > 0 && self.reader.count >= 8 {
            let byte = self.reader.take(8)? as u8;
            self.out.push(byte)?;
            remaining -= 1;
        }
        if remaining > 0 {
            let bytes = self.reader.take_bytes(remaining)?;
            self.out.extend(bytes)?;
        }
        Ok(())
    }

    fn dynamic_tables(&mut self) -> Result<(Huffman, Huffman), InflateError> {
        let hlit = self.reader.take(5)? as usize + 257;
        let hdist = self.reader.take(5)? as usize + 1;
        let hclen = self.reader.take(4)? as usize + 4;
        if hlit > 286 || hdist > 30 {
            return Err(InflateError::InvalidCodeLengths);
        }

        let mut code_length_lengths = [0u8; 19];
        for &index in CODE_LENGTH_ORDER.iter().take(hclen) {
            code_length_lengths[index] = self.reader.take(3)? as u8;
        }
        let code_lengths = Huffman::new(&code_length_lengths)?;

        let total = hlit + hdist;
        let mut lengths = [0u8; 286 + 30];
        let mut i = 0;
        while i < total {
            let symbol = code_lengths.decode(&mut self.reader)?;
            let (value, repeat) = match symbol {
                0..=15 => (symbol as u8, 1),
                16 => {
                    let previous = *i
                        .checked_sub(1)
                        .and_then(|prev| lengths.get(prev))
                        .ok_or(InflateError::InvalidCodeLengths)?;
                    (previous, 3 + self.reader.take(2)? as usize)
                }
                17 => (0, 3 + self.reader.take(3)? as usize),
                18 => (0, 11 + self.reader.take(7)? as usize),
                _ => return Err(InflateError::InvalidSymbol),
            };
            if i + repeat > total {
                return Err(InflateError::InvalidCodeLengths);
            }
            lengths[i..i + repeat].fill(value);
            i += repeat;
        }

        if lengths[256] == 0 {
            return Err(InflateError::InvalidCodeLengths);
        }
        Ok((
            Huffman::new(&lengths[..hlit])?,
            Huffman::new(&lengths[hlit..total])?,
        ))
    }
}

/// Shared literal/length + distance loop for fixed and dynamic blocks.
fn decode_block(
    reader: &mut BitReader<'_>,
    out: &mut Output<'_>,
    lit: &Huffman,
    dist: &Huffman,
) -> Result<(), InflateError> {
    loop {
        let symbol = usize::from(lit.decode(reader)?);
        match symbol {
            0..=255 => out.push(symbol as u8)?,
            256 => return Ok(()),
            257..=285 => {
                let index = symbol - 257;
                let length = usize::from(LENGTH_BASE[index])
                    + reader.take(u32::from(LENGTH_EXTRA[index]))? as usize;

                let dist_symbol = usize::from(dist.decode(reader)?);
                if dist_symbol >= DIST_BASE.len() {
                    return Err(InflateError::InvalidSymbol);
                }
                let distance = usize::from(DIST_BASE[dist_symbol])
                    + reader.take(u32::from(DIST_EXTRA[dist_symbol]))? as usize;

                out.copy_back(distance, length)?;
            }
            _ => return Err(InflateError::InvalidSymbol),
        }
    }
}

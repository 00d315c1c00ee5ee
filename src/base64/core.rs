use std::io::{self, BufRead, Read, Write};

use base64_simd::AsOut;
use tracing::{debug, trace};

use crate::common::io::{pool, read_full};
use crate::error::{Error, Result};
use crate::wrap::LineWriter;

const BASE64_ENGINE: &base64_simd::Base64 = &base64_simd::STANDARD;

/// Largest slice handed to the SIMD encoder at once: 3MB, a multiple of 3 so
/// only the final write of a stream can need padding.
const ENCODE_CHUNK: usize = 3 * 1024 * 1024;

/// Streaming encoder: bytes written in are encoded and written to `inner`.
///
/// Up to two trailing bytes are carried between `write` calls so the output
/// is identical however the input is split. [`Encoder::finish`] encodes the
/// carried bytes with `=` padding.
pub struct Encoder<W: Write> {
    inner: W,
    carry: [u8; 3],
    carry_len: usize,
    out: Vec<u8>,
    consumed: u64,
}

impl<W: Write> Encoder<W> {
    pub fn new(inner: W) -> Self {
        Encoder {
            inner,
            carry: [0; 3],
            carry_len: 0,
            out: Vec::new(),
            consumed: 0,
        }
    }

    /// Bytes accepted so far, including any still carried.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Flush the padded tail and return the inner writer. Does not flush
    /// `inner` itself.
    pub fn finish(mut self) -> io::Result<W> {
        if self.carry_len > 0 {
            let mut tail = [0u8; 4];
            let encoded = BASE64_ENGINE.encode(&self.carry[..self.carry_len], tail[..].as_out());
            self.inner.write_all(encoded)?;
            self.carry_len = 0;
        }
        Ok(self.inner)
    }

    fn encode_whole(&mut self, data: &[u8]) -> io::Result<()> {
        debug_assert_eq!(data.len() % 3, 0);
        for chunk in data.chunks(ENCODE_CHUNK) {
            let enc_len = BASE64_ENGINE.encoded_length(chunk.len());
            if self.out.len() < enc_len {
                self.out.resize(enc_len, 0);
            }
            let encoded = BASE64_ENGINE.encode(chunk, self.out[..enc_len].as_out());
            self.inner.write_all(encoded)?;
        }
        Ok(())
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut input = buf;

        if self.carry_len > 0 {
            let take = (3 - self.carry_len).min(input.len());
            self.carry[self.carry_len..self.carry_len + take]
                .copy_from_slice(&input[..take]);
            self.carry_len += take;
            input = &input[take..];
            if self.carry_len < 3 {
                self.consumed += buf.len() as u64;
                return Ok(buf.len());
            }
            let group = self.carry;
            self.encode_whole(&group)?;
            self.carry_len = 0;
        }

        let whole = input.len() - input.len() % 3;
        self.encode_whole(&input[..whole])?;

        let rest = &input[whole..];
        self.carry[..rest.len()].copy_from_slice(rest);
        self.carry_len = rest.len();

        self.consumed += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Encode everything `reader` yields into line-wrapped base64 on `writer`,
/// using `buf` for the reads. Returns the number of input bytes and the
/// writer, flushed. Empty input produces no output.
pub fn encode_body<R: Read + ?Sized, W: Write>(
    reader: &mut R,
    writer: W,
    wrap_col: usize,
    buf: &mut [u8],
) -> io::Result<(u64, W)> {
    let mut encoder = Encoder::new(LineWriter::new(writer, wrap_col));
    loop {
        let n = read_full(reader, buf)?;
        if n == 0 {
            break;
        }
        encoder.write_all(&buf[..n])?;
    }
    let consumed = encoder.consumed();
    let lines = encoder.finish()?;
    trace!(lines = lines.lines_written(), "body wrapped");
    Ok((consumed, lines.finish()?))
}

/// Decode line-wrapped base64 from `reader` into `writer`.
///
/// `\n` and `\r` are stripped; every other byte must be in the standard
/// alphabet, and `=` is only accepted at the very end of the stream.
/// Returns the number of decoded bytes written.
pub fn decode_body<R: BufRead + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
) -> Result<u64> {
    let mut sym = pool().acquire();
    let mut out = pool().acquire();
    decode_body_with(reader, writer, &mut sym, &mut out)
}

/// [`decode_body`] with caller-provided storage. Symbols are collected in
/// `sym` and decoded in batches of `sym.len()` rounded down to a multiple of
/// 4; `out` must hold the decoded form of one full batch.
pub(crate) fn decode_body_with<R: BufRead + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    sym: &mut [u8],
    out: &mut [u8],
) -> Result<u64> {
    let cap = sym.len() - sym.len() % 4;
    debug_assert!(cap > 0, "symbol buffer must hold at least one quantum");
    debug_assert!(out.len() >= cap / 4 * 3);
    let sym = &mut sym[..cap];

    let mut filled = 0usize;
    // Symbols already decoded and written.
    let mut offset = 0u64;
    let mut decoded = 0u64;
    // Set once a decoded batch ended in padding: nothing may follow.
    let mut closed = false;

    loop {
        let data = reader.fill_buf()?;
        if data.is_empty() {
            break;
        }
        let (used, copied) = strip_separators(data, &mut sym[filled..]);
        reader.consume(used);
        if copied == 0 {
            continue;
        }
        if closed {
            return Err(Error::InvalidEncoding { offset });
        }
        filled += copied;

        if filled == cap {
            decoded += decode_batch(sym, out, offset, writer)? as u64;
            offset += cap as u64;
            closed = sym[cap - 1] == b'=';
            filled = 0;
        }
    }

    if filled > 0 {
        decoded += decode_batch(&sym[..filled], out, offset, writer)? as u64;
    }
    Ok(decoded)
}

/// Decode one batch into `out` and write it. The batch's last quantum may
/// carry padding.
fn decode_batch<W: Write + ?Sized>(
    batch: &[u8],
    out: &mut [u8],
    offset: u64,
    writer: &mut W,
) -> Result<usize> {
    let strict = BASE64_ENGINE.decode(batch, out.as_out()).map(|d| d.len());
    let Some(n) = strict.ok().or_else(|| decode_loose_tail(batch, out)) else {
        let offset = offset + first_bad_symbol(batch) as u64;
        return Err(Error::InvalidEncoding { offset });
    };
    writer.write_all(&out[..n])?;
    Ok(n)
}

/// Retry a batch whose padded final quantum has non-zero unused bits,
/// decoding it with those bits cleared. Returns the decoded length, or
/// `None` when the batch is bad for any other reason.
fn decode_loose_tail(batch: &[u8], out: &mut [u8]) -> Option<usize> {
    if batch.len() < 4 || batch.len() % 4 != 0 {
        return None;
    }
    let (head, last) = batch.split_at(batch.len() - 4);
    if memchr::memchr(b'=', head).is_some() {
        return None;
    }
    let mut tail = [last[0], last[1], last[2], last[3]];
    if !clear_unused_bits(&mut tail) {
        return None;
    }
    let head_len = if head.is_empty() {
        0
    } else {
        BASE64_ENGINE.decode(head, out.as_out()).ok()?.len()
    };
    let tail_len = BASE64_ENGINE
        .decode(&tail, out[head_len..].as_out())
        .ok()?
        .len();
    Some(head_len + tail_len)
}

/// Clear the bits a padded quantum does not use. Returns false when the
/// quantum is unpadded or has nothing to clear.
fn clear_unused_bits(quantum: &mut [u8; 4]) -> bool {
    let (idx, mask) = match (quantum[2], quantum[3]) {
        (b'=', b'=') => (1, 0x0f),
        (_, b'=') => (2, 0x03),
        _ => return false,
    };
    match symbol_value(quantum[idx]) {
        Some(v) if v & mask != 0 => {
            quantum[idx] = ALPHABET[usize::from(v & !mask)];
            true
        }
        _ => false,
    }
}

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn symbol_value(b: u8) -> Option<u8> {
    match b {
        b'A'..=b'Z' => Some(b - b'A'),
        b'a'..=b'z' => Some(b - b'a' + 26),
        b'0'..=b'9' => Some(b - b'0' + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

/// Best guess at where a batch goes wrong, for the error message: the first
/// byte outside the alphabet, else the first padding byte, else the start of
/// the last quantum.
fn first_bad_symbol(batch: &[u8]) -> usize {
    batch
        .iter()
        .position(|&b| !is_base64_char(b))
        .or_else(|| memchr::memchr(b'=', batch))
        .unwrap_or(batch.len().saturating_sub(1) & !3)
}

/// Copy `src` into `dst` without `\n`/`\r`, stopping when `dst` is full.
/// Returns `(bytes of src consumed, bytes written to dst)`.
fn strip_separators(src: &[u8], dst: &mut [u8]) -> (usize, usize) {
    let mut rp = 0;
    let mut wp = 0;
    while rp < src.len() && wp < dst.len() {
        let rest = &src[rp..];
        let seg = memchr::memchr2(b'\n', b'\r', rest).unwrap_or(rest.len());
        let n = seg.min(dst.len() - wp);
        dst[wp..wp + n].copy_from_slice(&rest[..n]);
        wp += n;
        rp += n;
        if n == seg && rp < src.len() {
            rp += 1;
        }
    }
    (rp, wp)
}

/// Check if a byte is a valid base64 alphabet character or padding.
#[inline]
fn is_base64_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='
}

/// Headerless encode: base64 with line wrapping, one pass, no digest.
/// Returns the number of input bytes.
pub fn encode_stream<R: Read + ?Sized, W: Write>(
    reader: &mut R,
    writer: W,
    wrap_col: usize,
) -> Result<u64> {
    let mut buf = pool().acquire();
    let (n, _) = encode_body(reader, writer, wrap_col, &mut buf)?;
    debug!(bytes = n, "raw encode complete");
    Ok(n)
}

/// Headerless decode: strip line separators and decode. No digest check.
/// Returns the number of decoded bytes.
pub fn decode_stream<R: BufRead + ?Sized, W: Write>(reader: &mut R, mut writer: W) -> Result<u64> {
    let n = decode_body(reader, &mut writer)?;
    writer.flush()?;
    debug!(bytes = n, "raw decode complete");
    Ok(n)
}

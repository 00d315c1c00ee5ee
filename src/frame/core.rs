use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::base64::{decode_body, encode_body};
use crate::checksum::{HashingWriter, Summary, count_and_digest, is_digest_hex};
use crate::common::io::{TeeReader, pool, spool_file};
use crate::error::{Error, HeaderField, Result};
use crate::wrap::DEFAULT_WRAP_COL;

/// Read-side buffer for the encoded document.
const READ_BUF: usize = 256 * 1024;

/// Write-side buffer in front of the decoded output.
const WRITE_BUF: usize = 2 * 1024 * 1024;

/// The four-line preamble of a framed document:
/// filename, decimal size, hex SHA-256, blank line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub filename: String,
    pub size: u64,
    /// Lowercase hex SHA-256 of the original bytes.
    pub digest_hex: String,
}

impl Header {
    pub fn new(filename: &str, summary: &Summary) -> Self {
        Header {
            filename: filename.to_string(),
            size: summary.size,
            digest_hex: summary.digest_hex(),
        }
    }

    /// Write the header with a single `write_all`, so a failed write never
    /// leaves half a header ahead of the body.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let text = format!("{}\n{}\n{}\n\n", self.filename, self.size, self.digest_hex);
        out.write_all(text.as_bytes())
    }

    /// Parse the header, leaving `reader` positioned at the first body byte.
    pub fn read_from<R: BufRead + ?Sized>(reader: &mut R) -> Result<Header> {
        let filename = read_header_line(reader, HeaderField::Filename)?;

        let size_line = read_header_line(reader, HeaderField::Size)?;
        let size = size_line.parse::<u64>().map_err(|_| Error::MalformedHeader {
            field: HeaderField::Size,
            detail: "not a decimal byte count",
        })?;

        let digest_line = read_header_line(reader, HeaderField::Digest)?;
        if !is_digest_hex(&digest_line) {
            return Err(Error::MalformedHeader {
                field: HeaderField::Digest,
                detail: "not a hex SHA-256 digest",
            });
        }

        let separator = read_header_line(reader, HeaderField::Separator)?;
        if !separator.is_empty() {
            return Err(Error::MalformedHeader {
                field: HeaderField::Separator,
                detail: "expected an empty line",
            });
        }

        Ok(Header {
            filename,
            size,
            digest_hex: digest_line.to_ascii_lowercase(),
        })
    }
}

/// One `\n`-terminated header line, surrounding whitespace trimmed.
/// EOF before the terminator means the header was truncated.
fn read_header_line<R: BufRead + ?Sized>(reader: &mut R, field: HeaderField) -> Result<String> {
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line)?;
    if line.last() != Some(&b'\n') {
        return Err(Error::truncated(field));
    }
    let text = String::from_utf8(line).map_err(|_| Error::MalformedHeader {
        field,
        detail: "not valid UTF-8",
    })?;
    Ok(text.trim().to_string())
}

/// Encoder settings.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    /// Symbols per body line; 0 disables wrapping.
    pub wrap_col: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            wrap_col: DEFAULT_WRAP_COL,
        }
    }
}

/// Framed encode of a seekable input: hash from the current position to
/// EOF, seek back, then encode. Two passes over the source, no extra storage.
pub fn encode_framed_seekable<R, W>(
    input: &mut R,
    output: W,
    filename: &str,
    opts: &EncodeOptions,
) -> Result<Header>
where
    R: Read + Seek + ?Sized,
    W: Write,
{
    check_header_name(filename)?;
    let mut buf = pool().acquire();
    let start = input.stream_position()?;
    let summary = count_and_digest(input, &mut buf)?;
    debug!(bytes = summary.size, "hash pass complete");
    input.seek(SeekFrom::Start(start))?;
    let header = Header::new(filename, &summary);
    write_document(input, output, header, opts, &mut buf)
}

/// Framed encode of any input. The hashing pass also copies the input into
/// an anonymous temporary file, which the body pass then reads back: the
/// input is read exactly once, at the cost of disk space equal to its size.
pub fn encode_framed<R, W>(
    input: &mut R,
    output: W,
    filename: &str,
    opts: &EncodeOptions,
) -> Result<Header>
where
    R: Read + ?Sized,
    W: Write,
{
    check_header_name(filename)?;
    let mut buf = pool().acquire();
    let mut spool = spool_file()?;
    let summary = {
        let mut tee = TeeReader::new(input, &mut spool);
        count_and_digest(&mut tee, &mut buf)?
    };
    debug!(bytes = summary.size, "input spooled and hashed");
    spool.seek(SeekFrom::Start(0))?;
    let header = Header::new(filename, &summary);
    write_document(&mut spool, output, header, opts, &mut buf)
}

/// A name the header cannot carry unchanged: line breaks would split the
/// header and the parser trims surrounding whitespace.
fn check_header_name(name: &str) -> Result<()> {
    if name.contains(['\n', '\r']) || name.trim() != name {
        return Err(Error::UnsafeFilename(name.to_string()));
    }
    Ok(())
}

fn write_document<R, W>(
    body: &mut R,
    mut output: W,
    header: Header,
    opts: &EncodeOptions,
    buf: &mut [u8],
) -> Result<Header>
where
    R: Read + ?Sized,
    W: Write,
{
    header.write_to(&mut output)?;
    let (encoded, _) = encode_body(body, output, opts.wrap_col, buf)?;
    if encoded != header.size {
        return Err(Error::InputChanged {
            expected: header.size,
            actual: encoded,
        });
    }
    debug!(file = %header.filename, bytes = encoded, "framed encode complete");
    Ok(header)
}

/// Outcome of a framed decode. A digest mismatch is reported here, not
/// raised as an error: the output has already been written in full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeReport {
    pub header: Header,
    /// Size and digest of the bytes actually decoded.
    pub computed: Summary,
}

impl DecodeReport {
    /// Size claimed by the header.
    pub fn reported_size(&self) -> u64 {
        self.header.size
    }

    pub fn computed_digest_hex(&self) -> String {
        self.computed.digest_hex()
    }

    /// True when the decoded bytes hash to the digest in the header.
    pub fn matches(&self) -> bool {
        self.computed_digest_hex() == self.header.digest_hex
    }
}

/// Framed decode. `open` is called with the parsed header once it is
/// complete and returns the sink for the decoded bytes; it is never called
/// when the header is malformed.
pub fn decode_framed<R, W, F>(input: R, open: F) -> Result<DecodeReport>
where
    R: Read,
    W: Write,
    F: FnOnce(&Header) -> Result<W>,
{
    let mut reader = BufReader::with_capacity(READ_BUF, input);
    let header = Header::read_from(&mut reader)?;
    debug!(file = %header.filename, size = header.size, "header parsed");

    let sink = open(&header)?;
    let mut hashing = HashingWriter::new(BufWriter::with_capacity(WRITE_BUF, sink));
    decode_body(&mut reader, &mut hashing)?;
    let (buffered, computed) = hashing.finish();
    let mut sink = buffered.into_inner().map_err(|e| e.into_error())?;
    sink.flush()?;

    let report = DecodeReport { header, computed };
    if !report.matches() {
        warn!(
            expected = %report.header.digest_hex,
            actual = %report.computed_digest_hex(),
            "digest mismatch"
        );
    }
    Ok(report)
}

/// Reject header filenames that would escape `dir` or name it.
pub fn check_target_name(name: &str) -> Result<&str> {
    if matches!(name, "" | "." | "..") || name.contains(['/', '\\', '\0']) {
        return Err(Error::UnsafeFilename(name.to_string()));
    }
    Ok(name)
}

/// Default output policy for [`decode_framed`]: create (or truncate) the
/// header's filename inside `dir`.
pub fn create_target(dir: &Path, header: &Header) -> Result<File> {
    let name = check_target_name(&header.filename)?;
    Ok(File::create(dir.join(name))?)
}

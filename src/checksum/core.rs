use std::io::{self, Read, Write};

use digest::Digest;
use sha2::Sha256;

/// Length in bytes of the SHA-256 digest carried in a framed header.
pub const DIGEST_LEN: usize = 32;

/// Byte count and SHA-256 digest of one full pass over a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub size: u64,
    pub digest: [u8; DIGEST_LEN],
}

impl Summary {
    pub fn digest_hex(&self) -> String {
        hex_encode(&self.digest)
    }
}

/// Drain `reader`, counting bytes and hashing them with SHA-256.
/// `buf` is scratch space for the reads; any size works, larger is faster.
pub fn count_and_digest<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<Summary> {
    let mut hasher = Sha256::new();
    let mut size = 0u64;
    loop {
        let n = match reader.read(buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok(Summary {
        size,
        digest: hasher.finalize().into(),
    })
}

/// Summary of an in-memory slice.
pub fn summarize(data: &[u8]) -> Summary {
    Summary {
        size: data.len() as u64,
        digest: Sha256::digest(data).into(),
    }
}

/// Writer that hashes everything successfully written through it.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        HashingWriter {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Hand back the inner writer with the summary of the bytes it received.
    /// Does not flush.
    pub fn finish(self) -> (W, Summary) {
        let summary = Summary {
            size: self.written,
            digest: self.hasher.finalize().into(),
        };
        (self.inner, summary)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Only the accepted prefix is hashed; a short write is retried by the
        // caller with the remainder.
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Lowercase hex encoding.
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push(HEX[(b >> 4) as usize] as char);
        s.push(HEX[(b & 0x0f) as usize] as char);
    }
    s
}

/// True for a string of exactly `2 * DIGEST_LEN` hex digits, either case.
pub fn is_digest_hex(s: &str) -> bool {
    s.len() == DIGEST_LEN * 2 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

use std::io::{self, BufWriter, Write};

/// Symbols per line in the encoded body.
pub const DEFAULT_WRAP_COL: usize = 64;

/// Output buffer between the line wrapper and the real sink.
/// Lines are small; batching them keeps the write syscall count low.
const OUTPUT_BUF: usize = 2 * 1024 * 1024;

/// Wraps a byte stream into lines of exactly `width` bytes, each followed by
/// `\n`, regardless of how the input is split across `write` calls.
///
/// The partial last line is only terminated by [`LineWriter::finish`];
/// `flush` pushes complete lines through without closing the current one.
/// A width of 0 disables wrapping: bytes pass straight through and no
/// terminator is added.
pub struct LineWriter<W: Write> {
    out: BufWriter<W>,
    /// `width` content bytes plus the terminator slot.
    line: Box<[u8]>,
    pos: usize,
    width: usize,
    lines: u64,
}

impl<W: Write> LineWriter<W> {
    pub fn new(inner: W, width: usize) -> Self {
        LineWriter {
            out: BufWriter::with_capacity(OUTPUT_BUF, inner),
            line: vec![0u8; width + 1].into_boxed_slice(),
            pos: 0,
            width,
            lines: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of terminated lines emitted so far.
    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    /// Terminate the pending partial line (if any), flush everything, and
    /// return the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        if self.width > 0 && self.pos > 0 {
            self.emit_line()?;
        }
        let mut inner = self.out.into_inner().map_err(|e| e.into_error())?;
        inner.flush()?;
        Ok(inner)
    }

    #[inline]
    fn emit_line(&mut self) -> io::Result<()> {
        self.line[self.pos] = b'\n';
        self.out.write_all(&self.line[..=self.pos])?;
        self.pos = 0;
        self.lines += 1;
        Ok(())
    }
}

impl<W: Write> Write for LineWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.width == 0 {
            return self.out.write(buf);
        }

        let mut rp = 0;
        while rp < buf.len() {
            let space = self.width - self.pos;
            let take = space.min(buf.len() - rp);
            self.line[self.pos..self.pos + take]
                .copy_from_slice(&buf[rp..rp + take]);
            self.pos += take;
            rp += take;
            if self.pos == self.width {
                self.emit_line()?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

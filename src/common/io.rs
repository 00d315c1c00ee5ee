use std::fs::File;
use std::io::{self, Read, Write};
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Size of every pooled chunk: 4MB, large enough that a full read or a full
/// decode batch amortises the per-call overhead of the SIMD codec.
pub const CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// How many released chunks the process-wide pool keeps around.
const MAX_IDLE: usize = 4;

static POOL: BufferPool = BufferPool::new(CHUNK_SIZE, MAX_IDLE);

/// Process-wide buffer pool shared by the encode and decode paths.
#[inline]
pub fn pool() -> &'static BufferPool {
    &POOL
}

/// A free list of fixed-size byte chunks.
///
/// `acquire` hands out exclusive ownership of a chunk for the lifetime of the
/// returned guard, so concurrent callers never alias the same buffer. The
/// chunk goes back on the free list when the guard drops, including on early
/// `?` returns.
pub struct BufferPool {
    chunk_size: usize,
    max_idle: usize,
    idle: Mutex<Vec<Box<[u8]>>>,
}

impl BufferPool {
    pub const fn new(chunk_size: usize, max_idle: usize) -> Self {
        BufferPool {
            chunk_size,
            max_idle,
            idle: Mutex::new(Vec::new()),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Take a chunk from the free list, allocating a fresh one if it is empty.
    pub fn acquire(&self) -> PooledBuf<'_> {
        let buf = self
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.chunk_size].into_boxed_slice());
        PooledBuf { pool: self, buf }
    }

    /// Number of chunks currently waiting on the free list.
    pub fn idle(&self) -> usize {
        self.lock().len()
    }

    fn release(&self, buf: Box<[u8]>) {
        let mut idle = self.lock();
        if idle.len() < self.max_idle {
            idle.push(buf);
        }
    }

    // A panic while holding the lock cannot leave the free list half-updated.
    fn lock(&self) -> MutexGuard<'_, Vec<Box<[u8]>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped ownership of one pooled chunk. Dereferences to `[u8]`.
pub struct PooledBuf<'a> {
    pool: &'a BufferPool,
    buf: Box<[u8]>,
}

impl Deref for PooledBuf<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for PooledBuf<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for PooledBuf<'_> {
    fn drop(&mut self) {
        let buf = mem::take(&mut self.buf);
        if buf.len() == self.pool.chunk_size {
            self.pool.release(buf);
        }
    }
}

/// Reader adapter that copies every byte it yields into `sink`.
/// Used to spool a non-seekable input to disk during the hashing pass.
pub struct TeeReader<R, W> {
    reader: R,
    sink: W,
}

impl<R: Read, W: Write> TeeReader<R, W> {
    pub fn new(reader: R, sink: W) -> Self {
        TeeReader { reader, sink }
    }
}

impl<R: Read, W: Write> Read for TeeReader<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.sink.write_all(&buf[..n])?;
        Ok(n)
    }
}

/// Anonymous temporary file that holds a copy of a non-seekable input.
/// Removed by the OS as soon as the handle closes.
pub fn spool_file() -> io::Result<File> {
    tempfile::tempfile()
}

/// Borrow stdin as a `File` when it is redirected from a regular file, so the
/// framed encoder can seek back to the start instead of spooling.
#[cfg(unix)]
pub fn stdin_regular_file() -> Option<mem::ManuallyDrop<File>> {
    use std::os::unix::io::FromRawFd;

    // SAFETY: fd 0 stays open for the life of the process; ManuallyDrop keeps
    // the borrowed File from closing it.
    let file = mem::ManuallyDrop::new(unsafe { File::from_raw_fd(0) });
    match file.metadata() {
        Ok(meta) if meta.file_type().is_file() => Some(file),
        _ => None,
    }
}

#[cfg(not(unix))]
pub fn stdin_regular_file() -> Option<mem::ManuallyDrop<File>> {
    None
}

/// Read as many bytes as possible into buf, retrying on partial reads.
/// Ensures the full buffer is filled (or EOF reached), so every chunk handed
/// to the codec is as large as the buffer allows.
#[inline]
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

use super::*;
use std::io::Write;

fn wrap_in_chunks(data: &[u8], width: usize, chunk: usize) -> Vec<u8> {
    let mut w = LineWriter::new(Vec::new(), width);
    for piece in data.chunks(chunk.max(1)) {
        w.write_all(piece).unwrap();
    }
    w.finish().unwrap()
}

fn wrap(data: &[u8], width: usize) -> Vec<u8> {
    wrap_in_chunks(data, width, data.len())
}

#[test]
fn test_wrap_nothing_written() {
    assert_eq!(wrap(b"", 4), b"");
}

#[test]
fn test_wrap_short_line_terminated() {
    assert_eq!(wrap(b"abc", 4), b"abc\n");
}

#[test]
fn test_wrap_exact_width_single_newline() {
    // A full line at finish must not be followed by an empty line.
    assert_eq!(wrap(b"abcd", 4), b"abcd\n");
}

#[test]
fn test_wrap_multiple_lines() {
    assert_eq!(wrap(b"abcdefghij", 4), b"abcd\nefgh\nij\n");
}

#[test]
fn test_wrap_write_spanning_boundary() {
    let mut w = LineWriter::new(Vec::new(), 4);
    w.write_all(b"ab").unwrap();
    w.write_all(b"cdefghi").unwrap();
    w.write_all(b"j").unwrap();
    assert_eq!(w.finish().unwrap(), b"abcd\nefgh\nij\n");
}

#[test]
fn test_wrap_byte_at_a_time_matches_single_write() {
    let data: Vec<u8> = (0..1000u32).map(|i| b'A' + (i % 26) as u8).collect();
    let whole = wrap(&data, 64);
    for chunk in [1, 3, 63, 64, 65, 200] {
        assert_eq!(wrap_in_chunks(&data, 64, chunk), whole, "chunk {}", chunk);
    }
}

#[test]
fn test_wrap_line_shape() {
    let data = vec![b'x'; 64 * 3 + 10];
    let out = wrap(&data, 64);
    let text = std::str::from_utf8(&out).unwrap();
    assert!(text.ends_with('\n'));
    let lines: Vec<&str> = text.trim_end_matches('\n').split('\n').collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[..3].iter().all(|l| l.len() == 64));
    assert_eq!(lines[3].len(), 10);
}

#[test]
fn test_wrap_lines_written() {
    let mut w = LineWriter::new(Vec::new(), 2);
    w.write_all(b"abcde").unwrap();
    assert_eq!(w.lines_written(), 2);
    assert_eq!(w.width(), 2);
    let out = w.finish().unwrap();
    assert_eq!(out, b"ab\ncd\ne\n");
}

#[test]
fn test_wrap_width_zero_passthrough() {
    assert_eq!(wrap(b"abcdefghij", 0), b"abcdefghij");
    assert_eq!(wrap(b"", 0), b"");
}

#[test]
fn test_wrap_flush_keeps_partial_line_open() {
    let mut w = LineWriter::new(Vec::new(), 4);
    w.write_all(b"abcdef").unwrap();
    w.flush().unwrap();
    w.write_all(b"gh").unwrap();
    assert_eq!(w.finish().unwrap(), b"abcd\nefgh\n");
}

#[test]
fn test_wrap_width_one() {
    assert_eq!(wrap(b"abc", 1), b"a\nb\nc\n");
}

/// Sink that always fails.
#[derive(Debug)]
struct Broken;

impl Write for Broken {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::ErrorKind::BrokenPipe.into())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Err(std::io::ErrorKind::BrokenPipe.into())
    }
}

#[test]
fn test_wrap_finish_propagates_sink_error() {
    let mut w = LineWriter::new(Broken, 4);
    // Buffered internally, so the error surfaces at finish.
    w.write_all(b"abcdef").unwrap();
    let err = w.finish().unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
}

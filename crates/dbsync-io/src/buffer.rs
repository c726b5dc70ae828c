//! Cursor-bearing buffers for partial non-blocking reads and writes.

use std::io::{self, Read, Write};

use bytes::{Bytes, BytesMut};

/// Size of one read call. Reads stop early at the buffer cap.
const READ_CHUNK: usize = 1024;

/// Outcome of one [`CappedBuf::fill_from`] drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fill {
    /// Bytes appended during this drain.
    pub bytes: usize,
    /// The peer closed its write half.
    pub eof: bool,
}

/// A receive buffer that never grows past its capacity.
///
/// Input beyond the cap is left unread in the socket.
#[derive(Debug)]
pub struct CappedBuf {
    buf: BytesMut,
    capacity: usize,
}

impl CappedBuf {
    /// Creates an empty buffer holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self::with_buffer(BytesMut::new(), capacity)
    }

    /// Wraps a recycled buffer. Its contents are discarded.
    pub fn with_buffer(mut buf: BytesMut, capacity: usize) -> Self {
        buf.clear();
        Self { buf, capacity }
    }

    /// Drains `reader` until it would block, reaches EOF, or the cap is hit.
    ///
    /// `Interrupted` reads are retried. Any other error is returned as is;
    /// bytes read before it stay in the buffer.
    pub fn fill_from<R: Read>(&mut self, reader: &mut R) -> io::Result<Fill> {
        let mut fill = Fill::default();
        let mut chunk = [0u8; READ_CHUNK];

        while !self.is_full() {
            let want = READ_CHUNK.min(self.capacity - self.buf.len());
            match reader.read(&mut chunk[..want]) {
                Ok(0) => {
                    fill.eof = true;
                    break;
                }
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    fill.bytes += n;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        Ok(fill)
    }

    /// Raises the cap to `capacity` and reserves room for it.
    ///
    /// Used once the envelope length is known: the header bytes already
    /// buffered are kept and the rest of the envelope is read after them.
    pub fn grow_to(&mut self, capacity: usize) {
        if capacity > self.capacity {
            self.buf.reserve(capacity - self.buf.len());
            self.capacity = capacity;
        }
    }

    /// Drops buffered bytes and restores `capacity`.
    pub fn reset(&mut self, capacity: usize) {
        self.buf.clear();
        self.capacity = capacity;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.capacity
    }

    /// Takes the buffered bytes, leaving the buffer empty.
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Returns the underlying allocation, for recycling.
    pub fn into_inner(self) -> BytesMut {
        self.buf
    }
}

/// A send buffer with a progress offset.
#[derive(Debug, Clone, Default)]
pub struct SendCursor {
    buf: Bytes,
    offset: usize,
}

impl SendCursor {
    pub fn new(buf: Bytes) -> Self {
        Self { buf, offset: 0 }
    }

    /// Bytes sent so far.
    pub fn consumed(&self) -> usize {
        self.offset
    }

    /// Bytes still to send.
    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.offset..]
    }

    pub fn is_done(&self) -> bool {
        self.offset >= self.buf.len()
    }

    /// Rewinds to the start of the same buffer.
    pub fn rewind(&mut self) {
        self.offset = 0;
    }

    /// Writes until done or the writer would block.
    ///
    /// Returns `true` once everything has been sent. A zero-length write is
    /// reported as `WriteZero`.
    pub fn write_to<W: Write>(&mut self, writer: &mut W) -> io::Result<bool> {
        while !self.is_done() {
            match writer.write(self.remaining()) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write to socket",
                    ));
                }
                Ok(n) => self.offset += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts at most `limit` bytes per call, then blocks once.
    struct Trickle {
        written: Vec<u8>,
        limit: usize,
        block_next: bool,
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.block_next {
                self.block_next = false;
                return Err(io::ErrorKind::WouldBlock.into());
            }
            self.block_next = true;
            let n = buf.len().min(self.limit);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn fill_stops_at_capacity() {
        let mut buf = CappedBuf::new(8);
        let mut input: &[u8] = b"0123456789abcdef";

        let fill = buf.fill_from(&mut input).unwrap();
        assert_eq!(fill.bytes, 8);
        assert!(!fill.eof);
        assert!(buf.is_full());
        assert_eq!(buf.as_slice(), b"01234567");
        assert_eq!(input, b"89abcdef");
    }

    #[test]
    fn fill_reports_eof() {
        let mut buf = CappedBuf::new(64);
        let mut input: &[u8] = b"ds:0:";

        let fill = buf.fill_from(&mut input).unwrap();
        assert_eq!(fill, Fill { bytes: 5, eof: true });
    }

    #[test]
    fn grow_keeps_header_bytes() {
        let mut buf = CappedBuf::new(4);
        let mut input: &[u8] = b"ds:3:abc";
        buf.fill_from(&mut input).unwrap();
        assert_eq!(buf.as_slice(), b"ds:3");

        buf.grow_to(8);
        buf.fill_from(&mut input).unwrap();
        assert_eq!(buf.as_slice(), b"ds:3:abc");
    }

    #[test]
    fn reset_discards_contents() {
        let mut buf = CappedBuf::with_buffer(BytesMut::from(&b"stale"[..]), 16);
        assert!(buf.is_empty());

        let mut input: &[u8] = b"fresh";
        buf.fill_from(&mut input).unwrap();
        buf.reset(16);
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 16);
    }

    #[test]
    fn cursor_tracks_partial_writes() {
        let mut cursor = SendCursor::new(Bytes::from_static(b"ds:5:PING\0"));
        let mut sink = Trickle {
            written: Vec::new(),
            limit: 3,
            block_next: false,
        };

        assert!(!cursor.write_to(&mut sink).unwrap());
        assert_eq!(cursor.consumed(), 3);
        assert_eq!(cursor.remaining(), b"5:PING\0");

        while !cursor.write_to(&mut sink).unwrap() {}
        assert!(cursor.is_done());
        assert_eq!(sink.written, b"ds:5:PING\0");
    }

    #[test]
    fn cursor_rewinds() {
        let mut cursor = SendCursor::new(Bytes::from_static(b"abc"));
        let mut sink = Vec::new();
        assert!(cursor.write_to(&mut sink).unwrap());
        cursor.rewind();
        assert_eq!(cursor.remaining(), b"abc");
    }
}

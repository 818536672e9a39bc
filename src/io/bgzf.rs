//! BGZF (Blocked GNU Zip Format) block layer.
//!
//! BAM files are framed as a series of independent gzip members, each
//! carrying a `BC` extra subfield with the compressed block size (BSIZE) and
//! decompressing to at most 64 KiB. Because every block is self-contained,
//! a position in the uncompressed data can be named by a *virtual offset*:
//! the compressed offset of the block in the high 48 bits and the offset
//! within the decompressed block in the low 16 bits. Region indexes and
//! sidecar pointers both store virtual offsets, and [`BgzfReader::seek_virtual`]
//! jumps straight to one without touching earlier blocks.
//!
//! # Block Structure
//!
//! Each BGZF block:
//! - Bytes 0-1: Gzip magic (31, 139)
//! - Byte 2: Compression method (8 = deflate)
//! - Byte 3: Flags (FEXTRA must be set)
//! - Bytes 4-9: Standard gzip header fields
//! - Bytes 10-11: XLEN (extra field length)
//! - Bytes 12+: Extra subfields, including BSIZE
//!   - SI1=66 ('B'), SI2=67 ('C'), SLEN=2
//!   - BSIZE (little-endian u16): total block size - 1
//! - CDATA: raw deflate stream
//! - Trailer: CRC32 (4 bytes) + ISIZE (4 bytes) of the uncompressed data

use crate::io::bam::index::VirtualOffset;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Maximum number of uncompressed payload bytes per block.
///
/// Kept below the 65536-byte format limit so BSIZE always fits its u16
/// field even for incompressible data.
pub const MAX_BLOCK_SIZE: usize = 0xff00;

/// The 28-byte empty block that terminates a BGZF stream.
pub const EOF_MARKER: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02,
    0x00, 0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Reader over a BGZF-compressed stream with virtual-offset seeking.
///
/// Decompresses one block at a time; memory use is bounded by the 64 KiB
/// block limit regardless of file size. Reads may span block boundaries.
pub struct BgzfReader<R: Read + Seek> {
    inner: R,
    /// Decompressed bytes of the current block
    block: Vec<u8>,
    /// Read cursor within `block`
    block_pos: usize,
    /// Compressed offset at which the current block starts
    block_coffset: u64,
    /// Compressed offset of the block after the current one
    next_coffset: u64,
    /// Set once the underlying stream is exhausted
    eof: bool,
}

impl BgzfReader<File> {
    /// Open a BGZF file from a path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::new(File::open(path)?)
    }
}

impl<R: Read + Seek> BgzfReader<R> {
    /// Create a reader positioned at the start of the stream.
    ///
    /// No block is read until the first `read` or seek.
    pub fn new(inner: R) -> io::Result<Self> {
        Ok(Self {
            inner,
            block: Vec::new(),
            block_pos: 0,
            block_coffset: 0,
            next_coffset: 0,
            eof: false,
        })
    }

    /// Virtual offset of the next byte this reader will return.
    ///
    /// At the end of a block this is `(block, block_length)`, not
    /// `(next_block, 0)` — the same convention the writer uses, so offsets
    /// recorded while scanning compare equal to offsets recorded while
    /// writing. Seeking to either form reads the same byte.
    pub fn virtual_offset(&self) -> VirtualOffset {
        VirtualOffset::from_parts(self.block_coffset, self.block_pos as u16)
    }

    /// Reposition the reader to a virtual offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the compressed offset does not name a valid block
    /// boundary or the within-block offset exceeds the block length.
    pub fn seek_virtual(&mut self, offset: VirtualOffset) -> io::Result<()> {
        let coffset = offset.compressed();
        let uoffset = offset.uncompressed() as usize;

        if coffset != self.block_coffset || self.block.is_empty() {
            self.inner.seek(SeekFrom::Start(coffset))?;
            self.next_coffset = coffset;
            self.eof = false;
            if !self.read_block()? {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("Virtual offset {:#x} points past end of file", offset.as_raw()),
                ));
            }
        }

        if uoffset > self.block.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Virtual offset {:#x}: within-block offset {} exceeds block length {}",
                    offset.as_raw(),
                    uoffset,
                    self.block.len()
                ),
            ));
        }

        self.block_pos = uoffset;
        Ok(())
    }

    /// Decompress the next block into the internal buffer.
    ///
    /// Returns `Ok(false)` on clean end of stream. Empty blocks (such as the
    /// EOF marker) are skipped so that a successful `true` always leaves at
    /// least one readable byte.
    fn read_block(&mut self) -> io::Result<bool> {
        loop {
            let coffset = self.next_coffset;

            let mut fixed = [0u8; 12];
            if !read_exact_or_eof(&mut self.inner, &mut fixed)? {
                self.eof = true;
                return Ok(false);
            }

            if fixed[0] != 0x1f || fixed[1] != 0x8b || fixed[2] != 0x08 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "Invalid gzip magic at offset {}: [{:#04x}, {:#04x}, {:#04x}]",
                        coffset, fixed[0], fixed[1], fixed[2]
                    ),
                ));
            }

            if fixed[3] & 0x04 == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Gzip member at offset {} has no extra field (not BGZF)", coffset),
                ));
            }

            let xlen = u16::from_le_bytes([fixed[10], fixed[11]]) as usize;
            let mut extra = vec![0u8; xlen];
            self.inner.read_exact(&mut extra)?;

            let bsize = find_bsize(&extra).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Gzip member at offset {} has no BC subfield (not BGZF)", coffset),
                )
            })? as usize;

            // CDATA length = BSIZE+1 minus header (12), extra field, and trailer (8)
            let cdata_len = (bsize + 1)
                .checked_sub(12 + xlen + 8)
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Invalid BSIZE {} at offset {}", bsize, coffset),
                    )
                })?;

            let mut cdata = vec![0u8; cdata_len];
            self.inner.read_exact(&mut cdata)?;

            let mut trailer = [0u8; 8];
            self.inner.read_exact(&mut trailer)?;
            let expected_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
            let isize = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]) as usize;

            self.block.clear();
            let mut decoder = DeflateDecoder::new(&cdata[..]);
            decoder.read_to_end(&mut self.block)?;

            if self.block.len() != isize {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "Block at offset {} decompressed to {} bytes, ISIZE says {}",
                        coffset,
                        self.block.len(),
                        isize
                    ),
                ));
            }

            let mut crc = Crc::new();
            crc.update(&self.block);
            if crc.sum() != expected_crc {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("CRC mismatch in block at offset {}", coffset),
                ));
            }

            self.block_pos = 0;
            self.block_coffset = coffset;
            self.next_coffset = coffset + bsize as u64 + 1;

            if !self.block.is_empty() {
                return Ok(true);
            }
            // Zero-length block (EOF marker or padding): keep scanning.
        }
    }
}

impl<R: Read + Seek> Read for BgzfReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.block_pos == self.block.len() {
            if self.eof || !self.read_block()? {
                return Ok(0);
            }
        }

        let available = &self.block[self.block_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.block_pos += n;
        Ok(n)
    }
}

/// Locate the BSIZE value in a gzip extra field.
fn find_bsize(extra: &[u8]) -> Option<u16> {
    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let si1 = extra[pos];
        let si2 = extra[pos + 1];
        let slen = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
        if si1 == b'B' && si2 == b'C' && slen == 2 && pos + 6 <= extra.len() {
            return Some(u16::from_le_bytes([extra[pos + 4], extra[pos + 5]]));
        }
        pos += 4 + slen;
    }
    None
}

/// Like `read_exact` but distinguishes a clean EOF before the first byte.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Truncated BGZF block header",
            ));
        }
        filled += n;
    }
    Ok(true)
}

/// Writer producing a BGZF-compressed stream.
///
/// Buffers uncompressed bytes and emits one gzip member per
/// [`MAX_BLOCK_SIZE`] chunk. [`BgzfWriter::finish`] flushes the final block
/// and appends the EOF marker.
pub struct BgzfWriter<W: Write> {
    /// `None` only after `finish` has taken the writer
    inner: Option<W>,
    buf: Vec<u8>,
    /// Compressed bytes emitted so far (the coffset of the pending block)
    coffset: u64,
}

impl BgzfWriter<File> {
    /// Create a BGZF file at a path.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> BgzfWriter<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner: Some(inner),
            buf: Vec::with_capacity(MAX_BLOCK_SIZE),
            coffset: 0,
        }
    }

    /// Virtual offset of the next byte written.
    ///
    /// Used by index builders to record where a record begins in the output.
    pub fn virtual_offset(&self) -> VirtualOffset {
        VirtualOffset::from_parts(self.coffset, self.buf.len() as u16)
    }

    /// Compress and emit the buffered bytes as one block.
    fn flush_block(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let inner = match self.inner.as_mut() {
            Some(w) => w,
            None => return Ok(()),
        };

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.buf)?;
        let cdata = encoder.finish()?;

        let mut crc = Crc::new();
        crc.update(&self.buf);

        // header (12) + extra (6) + cdata + trailer (8)
        let block_size = 12 + 6 + cdata.len() + 8;
        if block_size > u16::MAX as usize + 1 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Compressed block too large: {} bytes", block_size),
            ));
        }

        let mut header = [0u8; 18];
        header[0] = 0x1f;
        header[1] = 0x8b;
        header[2] = 0x08; // deflate
        header[3] = 0x04; // FEXTRA
        header[9] = 0xff; // unknown OS
        header[10..12].copy_from_slice(&6u16.to_le_bytes()); // XLEN
        header[12] = b'B';
        header[13] = b'C';
        header[14..16].copy_from_slice(&2u16.to_le_bytes()); // SLEN
        header[16..18].copy_from_slice(&((block_size - 1) as u16).to_le_bytes()); // BSIZE

        inner.write_all(&header)?;
        inner.write_all(&cdata)?;
        inner.write_all(&crc.sum().to_le_bytes())?;
        inner.write_all(&(self.buf.len() as u32).to_le_bytes())?;

        self.coffset += block_size as u64;
        self.buf.clear();
        Ok(())
    }

    /// Flush remaining data, append the EOF marker, and return the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.flush_block()?;
        let mut inner = self.inner.take().expect("writer already finished");
        inner.write_all(&EOF_MARKER)?;
        inner.flush()?;
        Ok(inner)
    }
}

impl<W: Write> Write for BgzfWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut remaining = data;
        while !remaining.is_empty() {
            let room = MAX_BLOCK_SIZE - self.buf.len();
            let n = room.min(remaining.len());
            self.buf.extend_from_slice(&remaining[..n]);
            remaining = &remaining[n..];
            if self.buf.len() == MAX_BLOCK_SIZE {
                self.flush_block()?;
            }
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_block()?;
        match self.inner.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write> Drop for BgzfWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            let _ = self.flush_block();
            if let Some(inner) = self.inner.as_mut() {
                let _ = inner.write_all(&EOF_MARKER);
                let _ = inner.flush();
            }
        }
    }
}

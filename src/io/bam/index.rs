//! BAM region index (.bai) support.
//!
//! A BAI index maps genomic coordinate ranges to byte offsets in the
//! BGZF-compressed BAM file, so a range query seeks straight to the relevant
//! blocks instead of scanning from the start.
//!
//! # Format Specification
//!
//! ```text
//! BAI file:
//! - Magic: "BAI\1" (4 bytes)
//! - n_ref: Number of reference sequences (int32)
//! - Per reference:
//!   - n_bin (int32)
//!   - Per bin: bin id (uint32), n_chunk (int32), chunks (2 x uint64 each)
//!   - n_intv (int32)
//!   - Per interval: ioffset (uint64)
//! ```
//!
//! # Binning Scheme
//!
//! 37,450 hierarchical bins covering 512 Mbp:
//! - Level 0: 1 bin (512 Mbp)
//! - Level 1: 8 bins (64 Mbp each)
//! - Level 2: 64 bins (8 Mbp each)
//! - Level 3: 512 bins (1 Mbp each)
//! - Level 4: 4096 bins (128 Kbp each)
//! - Level 5: 32768 bins (16 Kbp each)
//!
//! The linear index records, for each 16 Kbp window, the smallest virtual
//! offset of a record starting in that window; queries use it to discard
//! chunks that end before the window of the query start.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// BAI file magic string.
const BAI_MAGIC: &[u8; 4] = b"BAI\x01";

/// File extension appended to the BAM path (`file.bam` -> `file.bam.bai`).
pub const BAI_EXTENSION: &str = "bai";

/// Linear index window size (16 Kbp).
const LINEAR_WINDOW_SHIFT: u32 = 14;

/// First bin id of the finest (16 Kbp) level.
const FINEST_LEVEL_OFFSET: u32 = 4681;

/// BGZF virtual file offset.
///
/// High 48 bits: compressed offset of a block; low 16 bits: offset within
/// the decompressed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    /// Build from a raw 64-bit value.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Build from compressed-block offset and within-block offset.
    pub fn from_parts(coffset: u64, uoffset: u16) -> Self {
        Self((coffset << 16) | uoffset as u64)
    }

    /// The raw 64-bit value.
    pub fn as_raw(&self) -> u64 {
        self.0
    }

    /// Compressed offset of the containing block.
    pub fn compressed(&self) -> u64 {
        self.0 >> 16
    }

    /// Offset within the decompressed block.
    pub fn uncompressed(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

/// A contiguous region of the compressed file holding records for one bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Virtual offset of the first record in the chunk
    pub start: VirtualOffset,
    /// Virtual offset just past the last record
    pub end: VirtualOffset,
}

impl Chunk {
    /// Create a chunk.
    pub fn new(start: VirtualOffset, end: VirtualOffset) -> Self {
        Self { start, end }
    }
}

/// A bin in the hierarchical binning index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bin {
    /// Bin number (0-37449)
    pub id: u32,
    /// Chunks of data in this bin
    pub chunks: Vec<Chunk>,
}

impl Bin {
    /// Create an empty bin.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            chunks: Vec::new(),
        }
    }
}

/// Index data for one reference sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceIndex {
    /// Bins (hierarchical spatial index)
    pub bins: Vec<Bin>,
    /// Linear index: smallest virtual offset per 16 Kbp window
    pub intervals: Vec<VirtualOffset>,
}

/// BAM region index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaiIndex {
    /// One entry per reference sequence, in header order
    pub references: Vec<ReferenceIndex>,
}

impl BaiIndex {
    /// Conventional index path for a BAM file (`<bam>.bai`).
    pub fn path_for<P: AsRef<Path>>(bam_path: P) -> std::path::PathBuf {
        let mut path = bam_path.as_ref().as_os_str().to_os_string();
        path.push(".");
        path.push(BAI_EXTENSION);
        path.into()
    }

    /// Load a BAI index from a file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read_from(&mut reader)
    }

    /// Parse a BAI index from a reader.
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != BAI_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid BAI magic: expected {:?}, got {:?}", BAI_MAGIC, magic),
            ));
        }

        let n_ref = read_i32(reader)?;
        if n_ref < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid BAI reference count: {}", n_ref),
            ));
        }

        let mut references = Vec::with_capacity(n_ref as usize);
        for _ in 0..n_ref {
            let mut reference = ReferenceIndex::default();

            let n_bin = read_i32(reader)?;
            for _ in 0..n_bin {
                let bin_id = read_u32(reader)?;
                let n_chunk = read_i32(reader)?;
                let mut bin = Bin::new(bin_id);
                for _ in 0..n_chunk {
                    let start = VirtualOffset::from_raw(read_u64(reader)?);
                    let end = VirtualOffset::from_raw(read_u64(reader)?);
                    bin.chunks.push(Chunk::new(start, end));
                }
                reference.bins.push(bin);
            }

            let n_intv = read_i32(reader)?;
            for _ in 0..n_intv {
                reference
                    .intervals
                    .push(VirtualOffset::from_raw(read_u64(reader)?));
            }

            references.push(reference);
        }

        Ok(Self { references })
    }

    /// Write the index to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)
    }

    /// Serialize the index to a writer.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(BAI_MAGIC)?;
        writer.write_all(&(self.references.len() as i32).to_le_bytes())?;
        for reference in &self.references {
            writer.write_all(&(reference.bins.len() as i32).to_le_bytes())?;
            for bin in &reference.bins {
                writer.write_all(&bin.id.to_le_bytes())?;
                writer.write_all(&(bin.chunks.len() as i32).to_le_bytes())?;
                for chunk in &bin.chunks {
                    writer.write_all(&chunk.start.as_raw().to_le_bytes())?;
                    writer.write_all(&chunk.end.as_raw().to_le_bytes())?;
                }
            }
            writer.write_all(&(reference.intervals.len() as i32).to_le_bytes())?;
            for interval in &reference.intervals {
                writer.write_all(&interval.as_raw().to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// Chunks to read for records overlapping `[start, end]` (0-based,
    /// inclusive) on the given reference.
    ///
    /// Candidate bins come from the hierarchical binning scheme; the linear
    /// index prunes chunks ending before the query start's window; the
    /// survivors are sorted and merged.
    pub fn query(&self, ref_index: usize, start: i32, end: i32) -> io::Result<Vec<Chunk>> {
        let reference = self.references.get(ref_index).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Reference index {} out of range (index covers {})",
                    ref_index,
                    self.references.len()
                ),
            )
        })?;

        if start < 0 || end < start {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid query range: [{}, {}]", start, end),
            ));
        }

        // The binning scheme covers 512 Mbp; clamp to its coordinate space.
        let end = (end as u32 + 1).min(1 << 29);
        let bins = reg2bins((start as u32).min((1 << 29) - 1), end);

        let mut chunks = Vec::new();
        for bin_id in bins {
            if let Some(bin) = reference.bins.iter().find(|b| b.id == bin_id) {
                chunks.extend_from_slice(&bin.chunks);
            }
        }

        // Linear-index pruning: skip chunks that end before the first record
        // in the query start's 16 Kbp window.
        let window = (start as u32 >> LINEAR_WINDOW_SHIFT) as usize;
        if let Some(&min_offset) = reference.intervals.get(window) {
            chunks.retain(|c| c.end > min_offset);
        }

        chunks.sort_by_key(|c| c.start);
        Ok(merge_chunks(&chunks))
    }
}

/// Compute the finest bin containing `[beg, end)` (0-based, half-open).
pub fn reg2bin(beg: i32, end: i32) -> u32 {
    let beg = beg as u32;
    let end = (end as u32).saturating_sub(1);
    if beg >> 14 == end >> 14 {
        return FINEST_LEVEL_OFFSET + (beg >> 14);
    }
    if beg >> 17 == end >> 17 {
        return ((1 << 12) - 1) / 7 + (beg >> 17);
    }
    if beg >> 20 == end >> 20 {
        return ((1 << 9) - 1) / 7 + (beg >> 20);
    }
    if beg >> 23 == end >> 23 {
        return ((1 << 6) - 1) / 7 + (beg >> 23);
    }
    if beg >> 26 == end >> 26 {
        return ((1 << 3) - 1) / 7 + (beg >> 26);
    }
    0
}

/// Bin ids that may contain records overlapping `[beg, end)`.
fn reg2bins(beg: u32, end: u32) -> Vec<u32> {
    let mut bins = vec![0u32];
    let end = end - 1;
    for level in 1..=5u32 {
        let offset = ((1 << (3 * level)) - 1) / 7;
        let shift = 29 - 3 * level;
        for bin in (offset + (beg >> shift))..=(offset + (end >> shift)) {
            bins.push(bin);
        }
    }
    bins
}

/// Merge overlapping or adjacent chunks (input must be sorted by start).
fn merge_chunks(chunks: &[Chunk]) -> Vec<Chunk> {
    let mut merged: Vec<Chunk> = Vec::new();
    for &chunk in chunks {
        match merged.last_mut() {
            Some(last) if chunk.start <= last.end => {
                if chunk.end > last.end {
                    last.end = chunk.end;
                }
            }
            _ => merged.push(chunk),
        }
    }
    merged
}

/// Incremental BAI construction during a scan or write.
///
/// Records must be fed in file order. Adjacent records in the same bin
/// extend the bin's open chunk; a final pass merges chunks that share a
/// compressed block, reducing seek calls for consumers.
#[derive(Debug)]
pub struct BaiBuilder {
    references: Vec<ReferenceIndex>,
}

impl BaiBuilder {
    /// Create a builder for a file with `n_ref` reference sequences.
    pub fn new(n_ref: usize) -> Self {
        Self {
            references: vec![ReferenceIndex::default(); n_ref],
        }
    }

    /// Register one mapped record.
    ///
    /// * `ref_index` - reference the record aligns to
    /// * `start`/`end` - 0-based half-open reference span
    /// * `chunk` - virtual offsets delimiting the record in the file
    pub fn add_record(&mut self, ref_index: usize, start: i32, end: i32, chunk: Chunk) {
        let Some(reference) = self.references.get_mut(ref_index) else {
            return;
        };

        let bin_id = reg2bin(start, end);
        match reference.bins.iter_mut().find(|b| b.id == bin_id) {
            Some(bin) => match bin.chunks.last_mut() {
                Some(last) if last.end == chunk.start => last.end = chunk.end,
                _ => bin.chunks.push(chunk),
            },
            None => {
                let mut bin = Bin::new(bin_id);
                bin.chunks.push(chunk);
                reference.bins.push(bin);
            }
        }

        // Linear index: remember the smallest offset per touched window.
        let first_window = (start.max(0) as u32 >> LINEAR_WINDOW_SHIFT) as usize;
        let last_window = ((end - 1).max(0) as u32 >> LINEAR_WINDOW_SHIFT) as usize;
        if reference.intervals.len() <= last_window {
            reference
                .intervals
                .resize(last_window + 1, VirtualOffset::default());
        }
        for window in first_window..=last_window {
            let slot = &mut reference.intervals[window];
            if slot.as_raw() == 0 || chunk.start < *slot {
                *slot = chunk.start;
            }
        }
    }

    /// Finish building, merging chunks that live in the same compressed block.
    pub fn finish(mut self) -> BaiIndex {
        for reference in &mut self.references {
            reference.bins.sort_by_key(|b| b.id);
            for bin in &mut reference.bins {
                let mut reduced: Vec<Chunk> = Vec::with_capacity(bin.chunks.len());
                for &chunk in &bin.chunks {
                    match reduced.last_mut() {
                        Some(last) if last.end.compressed() == chunk.start.compressed() => {
                            last.end = chunk.end;
                        }
                        _ => reduced.push(chunk),
                    }
                }
                bin.chunks = reduced;
            }
        }
        BaiIndex {
            references: self.references,
        }
    }
}

fn read_i32<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_offset_parts() {
        let v = VirtualOffset::from_parts(0x1234, 0x56);
        assert_eq!(v.compressed(), 0x1234);
        assert_eq!(v.uncompressed(), 0x56);
        assert_eq!(VirtualOffset::from_raw(v.as_raw()), v);
    }

    #[test]
    fn test_reg2bin_levels() {
        // A range within one 16 Kbp window lands in the finest level
        assert_eq!(reg2bin(0, 100), FINEST_LEVEL_OFFSET);
        assert_eq!(reg2bin(16384, 16484), FINEST_LEVEL_OFFSET + 1);
        // A range spanning the whole coordinate space lands in bin 0
        assert_eq!(reg2bin(0, 1 << 29), 0);
    }

    #[test]
    fn test_reg2bins_contains_reg2bin() {
        for (beg, end) in [(0, 100), (100_000, 150_000), (1 << 20, (1 << 20) + 5000)] {
            let bins = reg2bins(beg as u32, end as u32);
            assert!(bins.contains(&0));
            assert!(bins.contains(&reg2bin(beg, end)));
        }
    }

    #[test]
    fn test_merge_chunks() {
        let chunks = vec![
            Chunk::new(VirtualOffset::from_raw(100), VirtualOffset::from_raw(200)),
            Chunk::new(VirtualOffset::from_raw(150), VirtualOffset::from_raw(250)),
            Chunk::new(VirtualOffset::from_raw(300), VirtualOffset::from_raw(400)),
        ];
        let merged = merge_chunks(&chunks);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].start.as_raw(), 100);
        assert_eq!(merged[0].end.as_raw(), 250);
        assert_eq!(merged[1].start.as_raw(), 300);
    }

    #[test]
    fn test_builder_query_round_trip() {
        let mut builder = BaiBuilder::new(2);
        builder.add_record(
            0,
            100,
            200,
            Chunk::new(VirtualOffset::from_raw(1 << 16), VirtualOffset::from_raw(2 << 16)),
        );
        builder.add_record(
            0,
            50_000,
            50_100,
            Chunk::new(VirtualOffset::from_raw(5 << 16), VirtualOffset::from_raw(6 << 16)),
        );
        builder.add_record(
            1,
            10,
            60,
            Chunk::new(VirtualOffset::from_raw(8 << 16), VirtualOffset::from_raw(9 << 16)),
        );
        let index = builder.finish();

        // Region covering the first record only
        let chunks = index.query(0, 90, 300).unwrap();
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].start.as_raw(), 1 << 16);

        // Second reference
        let chunks = index.query(1, 0, 100).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start.as_raw(), 8 << 16);

        // Out-of-range reference index
        assert!(index.query(5, 0, 100).is_err());
    }

    #[test]
    fn test_builder_extends_adjacent_chunks() {
        let mut builder = BaiBuilder::new(1);
        let a = Chunk::new(VirtualOffset::from_raw(100), VirtualOffset::from_raw(200));
        let b = Chunk::new(VirtualOffset::from_raw(200), VirtualOffset::from_raw(300));
        builder.add_record(0, 10, 50, a);
        builder.add_record(0, 20, 60, b);
        let index = builder.finish();
        let bin = &index.references[0].bins[0];
        assert_eq!(bin.chunks.len(), 1);
        assert_eq!(bin.chunks[0].start.as_raw(), 100);
        assert_eq!(bin.chunks[0].end.as_raw(), 300);
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut builder = BaiBuilder::new(1);
        builder.add_record(
            0,
            128,
            256,
            Chunk::new(VirtualOffset::from_raw(77), VirtualOffset::from_raw(99)),
        );
        let index = builder.finish();

        let mut bytes = Vec::new();
        index.write_to(&mut bytes).unwrap();
        let reloaded = BaiIndex::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(reloaded, index);
    }

    #[test]
    fn test_invalid_magic() {
        let bytes = b"XAI\x01\x00\x00\x00\x00";
        assert!(BaiIndex::read_from(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn test_path_for() {
        assert_eq!(
            BaiIndex::path_for("data/sample.bam"),
            std::path::PathBuf::from("data/sample.bam.bai")
        );
    }
}

//! BAM parser orchestration.
//!
//! [`BamParser`] opens a BAM file (BGZF-compressed or bare), parses the
//! header, then either materializes every record eagerly or, with data
//! virtualization enabled, records one [`SequencePointer`] per record and
//! builds/reuses a sidecar index so records are paged in on demand. Range
//! queries seek through a companion `.bai` region index instead of scanning.
//!
//! The parser owns the open file handle used for on-demand virtual reads.
//! [`BamParser::close`] (also run on drop) releases it deterministically;
//! afterwards any still-virtual sequence fails with `ResourceDisposed`
//! rather than returning stale data.

use super::header::{read_raw_header, RawHeader, Reference, BAM_MAGIC};
use super::index::{BaiBuilder, BaiIndex, Chunk, VirtualOffset};
use super::record::{parse_record, read_record_block, Record};
use crate::alignment::{QuerySequences, SequenceAlignmentMap};
use crate::alphabet::SequenceEncoding;
use crate::error::{BampageError, Result};
use crate::io::bgzf::BgzfReader;
use crate::io::sam::header::SamHeader;
use crate::virt::list::VirtualSequenceList;
use crate::virt::pointer::SequencePointer;
use crate::virt::sidecar::SidecarIndex;
use log::debug;
use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Default capacity of a virtual list's materialized-record cache.
const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// When to emit sequence pointers instead of materializing records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VirtualizationPolicy {
    /// Materialize everything eagerly (the default).
    #[default]
    Never,
    /// Always virtualize.
    Always,
    /// Virtualize when the source file is at least this many bytes.
    FileSizeAtLeast(u64),
}

pub(crate) trait SeekRead: Read + Seek {}
impl<T: Read + Seek> SeekRead for T {}

/// Input positioned over uncompressed BAM bytes, with virtual-offset
/// addressing over either a BGZF-compressed or a bare `BAM\x01` stream.
///
/// For bare input the "virtual offset" is the plain byte offset with a zero
/// within-block part, so pointer and index representations stay uniform.
pub(crate) enum BamStream {
    Bgzf(BgzfReader<Box<dyn SeekRead>>),
    Plain { reader: Box<dyn SeekRead>, pos: u64 },
}

impl BamStream {
    /// Sniff the stream's leading bytes and wrap it accordingly.
    ///
    /// Gzip magic (0x1f 0x8b 0x08) selects the BGZF path; `BAM\x01` selects
    /// the bare path; anything else is a format error.
    pub(crate) fn open(mut inner: Box<dyn SeekRead>) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        inner.read_exact(&mut magic)?;
        inner.seek(SeekFrom::Start(0))?;

        if magic[0] == 0x1f && magic[1] == 0x8b && magic[2] == 0x08 {
            Ok(BamStream::Bgzf(BgzfReader::new(inner)?))
        } else if &magic == BAM_MAGIC {
            Ok(BamStream::Plain { reader: inner, pos: 0 })
        } else {
            Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Not a BAM file: leading bytes {:?} are neither BGZF nor bare BAM",
                    magic
                ),
            ))
        }
    }

    fn open_path(path: &Path) -> io::Result<Self> {
        Self::open(Box::new(File::open(path)?))
    }

    pub(crate) fn virtual_offset(&self) -> VirtualOffset {
        match self {
            BamStream::Bgzf(reader) => reader.virtual_offset(),
            BamStream::Plain { pos, .. } => VirtualOffset::from_parts(*pos, 0),
        }
    }

    pub(crate) fn seek_virtual(&mut self, offset: VirtualOffset) -> io::Result<()> {
        match self {
            BamStream::Bgzf(reader) => reader.seek_virtual(offset),
            BamStream::Plain { reader, pos } => {
                reader.seek(SeekFrom::Start(offset.compressed()))?;
                *pos = offset.compressed();
                Ok(())
            }
        }
    }
}

impl Read for BamStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            BamStream::Bgzf(reader) => reader.read(buf),
            BamStream::Plain { reader, pos } => {
                let n = reader.read(buf)?;
                *pos += n as u64;
                Ok(n)
            }
        }
    }
}

/// Shared access to an open BAM stream for on-demand pointer resolution.
///
/// One `RecordSource` is shared (single-threaded, `Rc<RefCell>`) between the
/// parser that created it and any [`VirtualSequenceList`] resolving pointers
/// through it. Closing drops the stream; later reads fail with
/// `ResourceDisposed`.
pub(crate) struct RecordSource {
    stream: Option<BamStream>,
    encoding: SequenceEncoding,
    path: PathBuf,
    scratch: Vec<u8>,
}

impl RecordSource {
    fn new(stream: BamStream, encoding: SequenceEncoding, path: PathBuf) -> Self {
        Self {
            stream: Some(stream),
            encoding,
            path,
            scratch: Vec::with_capacity(512),
        }
    }

    /// Materialize the record a pointer refers to.
    pub(crate) fn read_at(&mut self, pointer: &SequencePointer) -> Result<Record> {
        let encoding = self.encoding;
        let path = self.path.clone();
        let stream = self
            .stream
            .as_mut()
            .ok_or(BampageError::ResourceDisposed)?;

        stream
            .seek_virtual(pointer.start_offset())
            .map_err(|e| format_error(&path, pointer.start_offset(), e))?;

        if !read_record_block(stream, &mut self.scratch)
            .map_err(|e| format_error(&path, pointer.start_offset(), e))?
        {
            return Err(BampageError::InvalidFormat {
                file: path.display().to_string(),
                offset: pointer.start_offset().as_raw(),
                msg: String::from("pointer refers past end of file"),
            });
        }

        parse_record(&self.scratch, encoding)
            .map_err(|e| format_error(&path, pointer.start_offset(), e))
    }

    pub(crate) fn close(&mut self) {
        self.stream = None;
    }
}

fn format_error(path: &Path, offset: VirtualOffset, e: io::Error) -> BampageError {
    match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => BampageError::InvalidFormat {
            file: path.display().to_string(),
            offset: offset.as_raw(),
            msg: e.to_string(),
        },
        _ => BampageError::Io(e),
    }
}

/// Reads BAM files into [`SequenceAlignmentMap`]s.
///
/// Construction is builder-style; the encoding and virtualization policy
/// are fixed before parsing:
///
/// ```no_run
/// use bampage::io::bam::parser::{BamParser, VirtualizationPolicy};
///
/// # fn main() -> bampage::Result<()> {
/// let mut parser = BamParser::new()
///     .with_virtualization(VirtualizationPolicy::Always);
/// let map = parser.parse("alignments.bam")?;
/// println!("{} records", map.query_sequences().len());
/// # Ok(())
/// # }
/// ```
pub struct BamParser {
    encoding: SequenceEncoding,
    virtualization: VirtualizationPolicy,
    cache_capacity: NonZeroUsize,
    source: Option<Rc<RefCell<RecordSource>>>,
    scans: u64,
}

impl BamParser {
    /// Create a parser with the default encoding and no virtualization.
    pub fn new() -> Self {
        Self {
            encoding: SequenceEncoding::default(),
            virtualization: VirtualizationPolicy::default(),
            cache_capacity: NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap(),
            source: None,
            scans: 0,
        }
    }

    /// Use a specific sequence encoding for 4-bit base codes.
    pub fn with_encoding(mut self, encoding: SequenceEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the data-virtualization policy.
    pub fn with_virtualization(mut self, policy: VirtualizationPolicy) -> Self {
        self.virtualization = policy;
        self
    }

    /// Bound the virtual list's materialized-record cache.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity =
            NonZeroUsize::new(capacity.max(1)).unwrap_or(self.cache_capacity);
        self
    }

    /// Number of full pointer-building scans this parser has performed.
    ///
    /// A reused sidecar does not scan; tests assert on this counter.
    pub fn scan_count(&self) -> u64 {
        self.scans
    }

    /// Parse a BAM file into a [`SequenceAlignmentMap`].
    ///
    /// With virtualization off (or the file below the size threshold) every
    /// record is materialized and the file handle is released before
    /// returning. With virtualization on, records stay on disk behind a
    /// [`VirtualSequenceList`] backed by a sidecar index, and the parser
    /// keeps the file open for on-demand reads until [`BamParser::close`].
    pub fn parse<P: AsRef<Path>>(&mut self, path: P) -> Result<SequenceAlignmentMap> {
        let path = path.as_ref();
        self.close();

        let virtualize = match self.virtualization {
            VirtualizationPolicy::Never => false,
            VirtualizationPolicy::Always => true,
            VirtualizationPolicy::FileSizeAtLeast(threshold) => {
                fs::metadata(path)?.len() >= threshold
            }
        };

        let mut stream = BamStream::open_path(path).map_err(|e| {
            format_error(path, VirtualOffset::from_raw(0), e)
        })?;
        let (header, references) = read_header(&mut stream, path)?;

        if !virtualize {
            let sequences = self.read_all(&mut stream, path)?;
            return Ok(SequenceAlignmentMap::with_sequences(
                header,
                references,
                QuerySequences::Eager(sequences),
            ));
        }

        let sidecar = match SidecarIndex::load(path)? {
            Some(sidecar) => sidecar,
            None => {
                let pointers = self.scan_pointers(&mut stream, path)?;
                self.scans += 1;
                SidecarIndex::create(path, pointers, self.encoding)
            }
        };
        debug!(
            "virtualized parse of {}: {} records, sidecar {}",
            path.display(),
            sidecar.len(),
            if sidecar.is_persistent() { "persisted" } else { "in-memory" }
        );

        let source = Rc::new(RefCell::new(RecordSource::new(
            stream,
            self.encoding,
            path.to_path_buf(),
        )));
        self.source = Some(Rc::clone(&source));

        let list = VirtualSequenceList::new(Rc::new(sidecar), source, self.cache_capacity);
        Ok(SequenceAlignmentMap::with_sequences(
            header,
            references,
            QuerySequences::Virtual(list),
        ))
    }

    /// Parse an in-memory or otherwise seekable BAM stream, eagerly.
    ///
    /// Streams have no path to hang a sidecar on, so the virtualization
    /// policy does not apply here.
    pub fn parse_stream<R: Read + Seek + 'static>(
        &mut self,
        reader: R,
    ) -> Result<SequenceAlignmentMap> {
        let label = Path::new("<stream>");
        let mut stream = BamStream::open(Box::new(reader))
            .map_err(|e| format_error(label, VirtualOffset::from_raw(0), e))?;
        let (header, references) = read_header(&mut stream, label)?;
        let sequences = self.read_all(&mut stream, label)?;
        Ok(SequenceAlignmentMap::with_sequences(
            header,
            references,
            QuerySequences::Eager(sequences),
        ))
    }

    /// Parse only the records of one reference sequence, by index, using the
    /// companion `.bai` region index.
    pub fn parse_reference<P: AsRef<Path>>(
        &mut self,
        path: P,
        ref_index: usize,
    ) -> Result<SequenceAlignmentMap> {
        self.parse_range(path, ref_index, 0, i32::MAX)
    }

    /// Parse records whose position falls within `[start, end]` (0-based,
    /// inclusive) on the reference with the given index.
    ///
    /// Requires `<path>.bai`; a missing or unreadable index is an
    /// [`BampageError::IndexUnavailable`] error, never a silent full scan.
    pub fn parse_range<P: AsRef<Path>>(
        &mut self,
        path: P,
        ref_index: usize,
        start: i32,
        end: i32,
    ) -> Result<SequenceAlignmentMap> {
        let path = path.as_ref();

        if start < 0 || end < start {
            return Err(BampageError::InvalidRange(format!(
                "start {} and end {} do not form a valid range",
                start, end
            )));
        }

        let index = load_region_index(path)?;

        let mut stream = BamStream::open_path(path).map_err(|e| {
            format_error(path, VirtualOffset::from_raw(0), e)
        })?;
        let (header, references) = read_header(&mut stream, path)?;

        if ref_index >= references.len() {
            return Err(BampageError::InvalidRange(format!(
                "reference index {} out of range ({} references)",
                ref_index,
                references.len()
            )));
        }

        let chunks = index
            .query(ref_index, start, end.min(i32::MAX - 1))
            .map_err(|e| BampageError::InvalidRange(e.to_string()))?;

        let mut sequences = Vec::new();
        let mut block = Vec::with_capacity(512);
        for chunk in chunks {
            self.collect_chunk(
                &mut stream,
                path,
                chunk,
                ref_index,
                start,
                end,
                &mut block,
                &mut sequences,
            )?;
        }

        Ok(SequenceAlignmentMap::with_sequences(
            header,
            references,
            QuerySequences::Eager(sequences),
        ))
    }

    /// Parse records in `[start, end]` on the reference with the given name.
    pub fn parse_range_by_name<P: AsRef<Path>>(
        &mut self,
        path: P,
        ref_name: &str,
        start: i32,
        end: i32,
    ) -> Result<SequenceAlignmentMap> {
        let path = path.as_ref();
        let mut stream = BamStream::open_path(path).map_err(|e| {
            format_error(path, VirtualOffset::from_raw(0), e)
        })?;
        let (_, references) = read_header(&mut stream, path)?;
        drop(stream);

        let ref_index = references
            .iter()
            .position(|r| r.name == ref_name)
            .ok_or_else(|| {
                BampageError::InvalidRange(format!(
                    "reference {:?} not present in {}",
                    ref_name,
                    path.display()
                ))
            })?;
        self.parse_range(path, ref_index, start, end)
    }

    /// Build a region index by scanning a BAM file.
    ///
    /// Adjacent chunks in the same compressed block are merged, reducing
    /// seek calls for consumers of the index.
    pub fn build_index<P: AsRef<Path>>(&mut self, path: P) -> Result<BaiIndex> {
        let path = path.as_ref();
        let mut stream = BamStream::open_path(path).map_err(|e| {
            format_error(path, VirtualOffset::from_raw(0), e)
        })?;
        let (_, references) = read_header(&mut stream, path)?;

        let mut builder = BaiBuilder::new(references.len());
        let mut block = Vec::with_capacity(512);
        loop {
            let start_offset = stream.virtual_offset();
            if !read_record_block(&mut stream, &mut block)
                .map_err(|e| format_error(path, start_offset, e))?
            {
                break;
            }
            let end_offset = stream.virtual_offset();
            let record = parse_record(&block, self.encoding)
                .map_err(|e| format_error(path, start_offset, e))?;

            if let (Some(ref_id), Some(pos)) = (record.reference_id, record.position) {
                let end = record.reference_end().unwrap_or(pos + 1);
                builder.add_record(ref_id, pos, end, Chunk::new(start_offset, end_offset));
            }
        }

        Ok(builder.finish())
    }

    /// Release the parser's open file handle.
    ///
    /// Any virtual sequences not yet materialized become unreadable and fail
    /// with `ResourceDisposed` on access.
    pub fn close(&mut self) {
        if let Some(source) = self.source.take() {
            source.borrow_mut().close();
        }
    }

    fn read_all(&self, stream: &mut BamStream, path: &Path) -> Result<Vec<Rc<Record>>> {
        let mut sequences = Vec::new();
        let mut block = Vec::with_capacity(512);
        loop {
            let offset = stream.virtual_offset();
            if !read_record_block(stream, &mut block).map_err(|e| format_error(path, offset, e))? {
                break;
            }
            let record =
                parse_record(&block, self.encoding).map_err(|e| format_error(path, offset, e))?;
            sequences.push(Rc::new(record));
        }
        Ok(sequences)
    }

    /// Full forward scan emitting one pointer per record without
    /// materializing sequences.
    fn scan_pointers(
        &self,
        stream: &mut BamStream,
        path: &Path,
    ) -> Result<Vec<SequencePointer>> {
        let mut pointers = Vec::new();
        let mut block = Vec::with_capacity(512);
        loop {
            let start = stream.virtual_offset();
            if !read_record_block(stream, &mut block).map_err(|e| format_error(path, start, e))? {
                break;
            }
            let end = stream.virtual_offset();

            // id stays None: sidecar entries are fixed-size and carry no
            // name, and a scan-built table must match a reloaded one.
            pointers.push(SequencePointer {
                alphabet_name: self.encoding.alphabet_name().to_string(),
                id: None,
                index_offsets: (start.as_raw() as i64, end.as_raw() as i64),
                starting_line: 0,
            });
        }
        Ok(pointers)
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_chunk(
        &self,
        stream: &mut BamStream,
        path: &Path,
        chunk: Chunk,
        ref_index: usize,
        start: i32,
        end: i32,
        block: &mut Vec<u8>,
        out: &mut Vec<Rc<Record>>,
    ) -> Result<()> {
        stream
            .seek_virtual(chunk.start)
            .map_err(|e| format_error(path, chunk.start, e))?;

        while stream.virtual_offset() < chunk.end {
            let offset = stream.virtual_offset();
            if !read_record_block(stream, block).map_err(|e| format_error(path, offset, e))? {
                break;
            }
            let record =
                parse_record(block, self.encoding).map_err(|e| format_error(path, offset, e))?;

            if record.reference_id == Some(ref_index) {
                if let Some(pos) = record.position {
                    if pos >= start && pos <= end {
                        out.push(Rc::new(record));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for BamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BamParser {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read the binary header, parse the embedded SAM text, and reconcile the
/// reference table into the structured header.
fn read_header(stream: &mut BamStream, path: &Path) -> Result<(SamHeader, Vec<Reference>)> {
    let offset = stream.virtual_offset();
    let RawHeader { text, references } =
        read_raw_header(stream).map_err(|e| format_error(path, offset, e))?;
    let mut header = SamHeader::parse(&text)?;
    header.reconcile_references(&references);
    Ok((header, references))
}

/// Region index for a BAM path, or `IndexUnavailable`.
fn load_region_index(path: &Path) -> Result<BaiIndex> {
    let bai_path = BaiIndex::path_for(path);
    if !bai_path.exists() {
        return Err(BampageError::IndexUnavailable {
            file: path.display().to_string(),
            msg: format!("{} does not exist", bai_path.display()),
        });
    }
    BaiIndex::from_path(&bai_path).map_err(|e| BampageError::IndexUnavailable {
        file: path.display().to_string(),
        msg: e.to_string(),
    })
}

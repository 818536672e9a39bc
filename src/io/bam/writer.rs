//! BAM output: the inverse of the parser.
//!
//! [`BamWriter`] serializes a header and records back to the binary BAM
//! grammar over a BGZF stream, optionally building and emitting a `.bai`
//! region index alongside. Header record order, tag order and per-record
//! field values round-trip bit-for-bit; the one documented exception is the
//! record `bin` field, which is recomputed from position and CIGAR span.

use super::header::{write_raw_header, Reference};
use super::index::{BaiBuilder, BaiIndex, Chunk};
use super::record::{encode_record, Record};
use crate::alignment::SequenceAlignmentMap;
use crate::error::{BampageError, Result};
use crate::io::bgzf::BgzfWriter;
use crate::io::sam::header::SamHeader;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Streaming BAM writer.
///
/// ```no_run
/// use bampage::io::bam::writer::BamWriter;
/// use bampage::io::sam::header::SamHeader;
/// use bampage::io::bam::header::Reference;
///
/// # fn main() -> bampage::Result<()> {
/// let header = SamHeader::parse("@SQ\tSN:chr1\tLN:1000\n")?;
/// let references = header.reference_sequences();
/// let writer = BamWriter::create("out.bam", &header, &references)?;
/// // writer.write_record(&record)?; ...
/// writer.finish()?;
/// # Ok(())
/// # }
/// ```
pub struct BamWriter<W: Write> {
    bgzf: BgzfWriter<W>,
    references: Vec<Reference>,
    /// Present when a region index is being built alongside the output
    index: Option<(BaiBuilder, PathBuf)>,
    records_written: u64,
    scratch: Vec<u8>,
}

impl BamWriter<File> {
    /// Create a BAM file with the given header and reference table.
    pub fn create<P: AsRef<Path>>(
        path: P,
        header: &SamHeader,
        references: &[Reference],
    ) -> Result<Self> {
        let bgzf = BgzfWriter::create(path)?;
        Self::new(bgzf, header, references, None)
    }

    /// Create a BAM file and emit `<path>.bai` when finished.
    pub fn create_with_index<P: AsRef<Path>>(
        path: P,
        header: &SamHeader,
        references: &[Reference],
    ) -> Result<Self> {
        let bai_path = BaiIndex::path_for(&path);
        let bgzf = BgzfWriter::create(path)?;
        Self::new(
            bgzf,
            header,
            references,
            Some((BaiBuilder::new(references.len()), bai_path)),
        )
    }
}

impl<W: Write> BamWriter<W> {
    /// Wrap an arbitrary writer (no index emission).
    pub fn from_writer(inner: W, header: &SamHeader, references: &[Reference]) -> Result<Self> {
        Self::new(BgzfWriter::new(inner), header, references, None)
    }

    fn new(
        mut bgzf: BgzfWriter<W>,
        header: &SamHeader,
        references: &[Reference],
        index: Option<(BaiBuilder, PathBuf)>,
    ) -> Result<Self> {
        write_raw_header(&mut bgzf, &header.to_text(), references)?;
        Ok(Self {
            bgzf,
            references: references.to_vec(),
            index,
            records_written: 0,
            scratch: Vec::with_capacity(512),
        })
    }

    /// Serialize one record.
    ///
    /// # Errors
    ///
    /// Fails if the record names a reference index outside the writer's
    /// reference table, or a field exceeds its wire width.
    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        for (label, id) in [
            ("reference", record.reference_id),
            ("mate reference", record.mate_reference_id),
        ] {
            if let Some(id) = id {
                if id >= self.references.len() {
                    return Err(BampageError::InvalidRange(format!(
                        "record {:?} names {} index {} but the header declares {} references",
                        record.name,
                        label,
                        id,
                        self.references.len()
                    )));
                }
            }
        }

        let start = self.bgzf.virtual_offset();

        self.scratch.clear();
        encode_record(record, &mut self.scratch)?;
        self.bgzf.write_all(&self.scratch)?;
        self.records_written += 1;

        if let Some((builder, _)) = self.index.as_mut() {
            if let (Some(ref_id), Some(pos)) = (record.reference_id, record.position) {
                let end = record.reference_end().unwrap_or(pos + 1);
                builder.add_record(ref_id, pos, end, Chunk::new(start, self.bgzf.virtual_offset()));
            }
        }
        Ok(())
    }

    /// Number of records written so far.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Flush the final block, write the BGZF EOF marker, and emit the region
    /// index if one was requested.
    pub fn finish(self) -> Result<()> {
        self.bgzf.finish()?;
        if let Some((builder, bai_path)) = self.index {
            builder.finish().save(bai_path)?;
        }
        Ok(())
    }
}

/// Serialize a whole [`SequenceAlignmentMap`] to a BAM file.
///
/// Returns the number of records written. Virtual collections are paged
/// through in file order without materializing everything at once.
pub fn write_map<P: AsRef<Path>>(path: P, map: &SequenceAlignmentMap) -> Result<u64> {
    write_map_impl(path, map, false)
}

/// Serialize a map to a BAM file and emit `<path>.bai` alongside.
pub fn write_map_indexed<P: AsRef<Path>>(path: P, map: &SequenceAlignmentMap) -> Result<u64> {
    write_map_impl(path, map, true)
}

fn write_map_impl<P: AsRef<Path>>(
    path: P,
    map: &SequenceAlignmentMap,
    indexed: bool,
) -> Result<u64> {
    let mut writer = if indexed {
        BamWriter::create_with_index(path, map.header(), map.references())?
    } else {
        BamWriter::create(path, map.header(), map.references())?
    };
    for record in map.query_sequences().iter() {
        writer.write_record(&*record?)?;
    }
    let written = writer.records_written();
    writer.finish()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::bam::cigar::CigarOp;
    use crate::io::bam::parser::BamParser;
    use std::io::Cursor;

    fn sample_header() -> (SamHeader, Vec<Reference>) {
        let header = SamHeader::parse("@HD\tVN:1.6\n@SQ\tSN:chr1\tLN:1000\n").unwrap();
        let references = header.reference_sequences();
        (header, references)
    }

    fn mapped_record(name: &str, pos: i32) -> Record {
        let mut record = Record::new();
        record.name = name.to_string();
        record.reference_id = Some(0);
        record.position = Some(pos);
        record.mapq = Some(60);
        record.sequence = b"ACGT".to_vec();
        record.quality = vec![30, 31, 32, 33];
        record.cigar = vec![CigarOp::Match(4)];
        record
    }

    #[test]
    fn test_write_then_parse_stream() {
        let (header, references) = sample_header();
        let mut writer = BamWriter::from_writer(Vec::new(), &header, &references).unwrap();
        writer.write_record(&mapped_record("r1", 10)).unwrap();
        writer.write_record(&mapped_record("r2", 40)).unwrap();
        assert_eq!(writer.records_written(), 2);

        // finish() consumes; round-trip via an owned buffer instead
        let mut bytes = Vec::new();
        {
            let mut writer = BamWriter::from_writer(&mut bytes, &header, &references).unwrap();
            writer.write_record(&mapped_record("r1", 10)).unwrap();
            writer.write_record(&mapped_record("r2", 40)).unwrap();
            writer.finish().unwrap();
        }

        let mut parser = BamParser::new();
        let map = parser.parse_stream(Cursor::new(bytes)).unwrap();
        assert_eq!(map.query_sequences().len(), 2);
        assert_eq!(map.query_sequences().get(0).unwrap().name, "r1");
        assert_eq!(map.query_sequences().get(1).unwrap().position, Some(40));
    }

    #[test]
    fn test_out_of_range_reference_rejected() {
        let (header, references) = sample_header();
        let mut writer = BamWriter::from_writer(Vec::new(), &header, &references).unwrap();
        let mut record = mapped_record("bad", 10);
        record.reference_id = Some(7);
        assert!(matches!(
            writer.write_record(&record),
            Err(BampageError::InvalidRange(_))
        ));
    }
}

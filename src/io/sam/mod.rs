//! SAM text format support.
//!
//! The text sibling of the BAM reader/writer: tab-delimited alignment lines
//! under an `@`-prefixed header. Both parsers produce the same
//! [`SequenceAlignmentMap`], so SAM→BAM→SAM conversions preserve header
//! tag/value pairs and record fields — a tested behavior, not an
//! implementation note.

pub mod header;
pub mod record;

pub use header::{FieldTag, HeaderRecord, SamHeader};
pub use record::{format_alignment_line, parse_alignment_line};

use crate::alignment::SequenceAlignmentMap;
use crate::error::{BampageError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Reads SAM text files into [`SequenceAlignmentMap`]s.
#[derive(Debug, Default)]
pub struct SamParser;

impl SamParser {
    /// Create a parser.
    pub fn new() -> Self {
        Self
    }

    /// Parse a SAM file.
    pub fn parse<P: AsRef<Path>>(&self, path: P) -> Result<SequenceAlignmentMap> {
        self.parse_reader(BufReader::new(File::open(path)?))
    }

    /// Parse SAM text from a buffered reader.
    ///
    /// Header lines must precede all alignment lines; a header line after
    /// the first alignment is a format error.
    pub fn parse_reader<R: BufRead>(&self, reader: R) -> Result<SequenceAlignmentMap> {
        let mut header_text = String::new();
        let mut map: Option<SequenceAlignmentMap> = None;

        for (line_index, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = line_index + 1;
            if line.is_empty() {
                continue;
            }

            if line.starts_with('@') {
                if map.is_some() {
                    return Err(BampageError::InvalidSamFormat {
                        line: line_no,
                        msg: String::from("header line after first alignment line"),
                    });
                }
                header_text.push_str(&line);
                header_text.push('\n');
                continue;
            }

            if map.is_none() {
                let header = header::SamHeader::parse(&header_text)?;
                let references = header.reference_sequences();
                map = Some(SequenceAlignmentMap::new(header, references));
            }
            let map = map.as_mut().expect("map initialized above");

            let record = record::parse_alignment_line(&line, line_no, map.references())?;
            map.query_sequences_mut().push(record)?;
        }

        match map {
            Some(map) => Ok(map),
            None => {
                // Header-only (or empty) input still yields a valid map.
                let header = header::SamHeader::parse(&header_text)?;
                let references = header.reference_sequences();
                Ok(SequenceAlignmentMap::new(header, references))
            }
        }
    }
}

/// Writes [`SequenceAlignmentMap`]s as SAM text.
#[derive(Debug, Default)]
pub struct SamWriter;

impl SamWriter {
    /// Create a writer.
    pub fn new() -> Self {
        Self
    }

    /// Write a map to a SAM file.
    pub fn write<P: AsRef<Path>>(&self, path: P, map: &SequenceAlignmentMap) -> Result<()> {
        self.write_to(BufWriter::new(File::create(path)?), map)
    }

    /// Write a map as SAM text to a writer.
    pub fn write_to<W: Write>(&self, mut writer: W, map: &SequenceAlignmentMap) -> Result<()> {
        writer.write_all(map.header().to_text().as_bytes())?;
        for record in map.query_sequences().iter() {
            let line = record::format_alignment_line(&*record?, map.references());
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::bam::record::FLAG_PAIRED;

    const SAMPLE: &str = "@HD\tVN:1.6\tSO:coordinate\n\
        @SQ\tSN:chr1\tLN:1000\n\
        @RG\tID:rg1\tSM:s1\n\
        r1\t99\tchr1\t101\t60\t4M\t=\t301\t204\tACGT\tIIII\tRG:Z:rg1\n\
        r2\t4\t*\t0\t255\t*\t*\t0\t0\t*\t*\n";

    #[test]
    fn test_parse_sample() {
        let map = SamParser::new()
            .parse_reader(SAMPLE.as_bytes())
            .unwrap();
        assert_eq!(map.references().len(), 1);
        assert_eq!(map.query_sequences().len(), 2);

        let first = map.query_sequences().get(0).unwrap();
        assert_eq!(first.name, "r1");
        assert!(first.flags & FLAG_PAIRED != 0);
        assert_eq!(first.position, Some(100));
    }

    #[test]
    fn test_text_round_trip() {
        let parser = SamParser::new();
        let map = parser.parse_reader(SAMPLE.as_bytes()).unwrap();

        let mut out = Vec::new();
        SamWriter::new().write_to(&mut out, &map).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), SAMPLE);
    }

    #[test]
    fn test_header_only_input() {
        let map = SamParser::new()
            .parse_reader("@HD\tVN:1.6\n".as_bytes())
            .unwrap();
        assert!(map.query_sequences().is_empty());
        assert_eq!(map.header().records.len(), 1);
    }

    #[test]
    fn test_header_after_alignment_rejected() {
        let text = "@SQ\tSN:chr1\tLN:1000\n\
            r1\t0\tchr1\t1\t60\t4M\t*\t0\t0\tACGT\tIIII\n\
            @PG\tID:late\n";
        let err = SamParser::new().parse_reader(text.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }
}

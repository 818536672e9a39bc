//! SAM header parsing and formatting.
//!
//! The SAM header is the `@`-prefixed text block at the start of a SAM file
//! and embedded inside the binary BAM header. Grammar per line:
//!
//! ```text
//! @TYPE\tTAG:VALUE\tTAG:VALUE...
//! @CO\tfree text kept verbatim
//! ```
//!
//! Record order and tag order within a record are preserved exactly, so
//! formatting a parsed header reproduces the original text. Unrecognized
//! type codes are kept as opaque records rather than rejected, for forward
//! compatibility with newer header extensions.

use crate::error::{BampageError, Result};
use crate::io::bam::header::Reference;

/// One `TAG:VALUE` pair within a header record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTag {
    /// Two-character tag name (e.g. "SN")
    pub tag: String,
    /// Tag value
    pub value: String,
}

impl FieldTag {
    /// Create a tag/value pair.
    pub fn new(tag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            value: value.into(),
        }
    }
}

/// One typed header record (`@HD`, `@SQ`, `@RG`, `@PG`, or an unrecognized
/// code preserved opaquely).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    /// Two-character type code without the leading `@`
    pub type_code: String,
    /// Ordered tag/value pairs
    pub tags: Vec<FieldTag>,
}

impl HeaderRecord {
    /// Create a record with no tags.
    pub fn new(type_code: impl Into<String>) -> Self {
        Self {
            type_code: type_code.into(),
            tags: Vec::new(),
        }
    }

    /// Look up the first tag with the given name.
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.tag == name)
            .map(|t| t.value.as_str())
    }
}

/// Structured SAM header: ordered typed records plus verbatim comments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamHeader {
    /// Typed records in file order
    pub records: Vec<HeaderRecord>,
    /// `@CO` comment lines, without the `@CO\t` prefix
    pub comments: Vec<String>,
}

impl SamHeader {
    /// Create an empty header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a SAM header text block.
    ///
    /// Every non-empty line must start with `@` followed by a two-character
    /// type code. `@CO` lines are kept verbatim; all other codes become
    /// typed records with their tag order preserved.
    pub fn parse(text: &str) -> Result<Self> {
        let mut header = Self::new();

        for (line_index, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let line_no = line_index + 1;

            if !line.starts_with('@') {
                return Err(BampageError::InvalidSamFormat {
                    line: line_no,
                    msg: format!("header line does not start with '@': {:?}", line),
                });
            }

            let mut fields = line.split('\t');
            let type_field = fields.next().unwrap_or("");
            let type_code = &type_field[1..];
            if type_code.len() != 2 {
                return Err(BampageError::InvalidSamFormat {
                    line: line_no,
                    msg: format!("header type code must be two characters, got {:?}", type_code),
                });
            }

            if type_code == "CO" {
                // Everything after the first tab is the comment, verbatim.
                let comment = line.splitn(2, '\t').nth(1).unwrap_or("");
                header.comments.push(comment.to_string());
                continue;
            }

            let mut record = HeaderRecord::new(type_code);
            for field in fields {
                let (tag, value) = field.split_once(':').ok_or_else(|| {
                    BampageError::InvalidSamFormat {
                        line: line_no,
                        msg: format!("header field is not TAG:VALUE: {:?}", field),
                    }
                })?;
                if tag.len() != 2 {
                    return Err(BampageError::InvalidSamFormat {
                        line: line_no,
                        msg: format!("header tag must be two characters, got {:?}", tag),
                    });
                }
                record.tags.push(FieldTag::new(tag, value));
            }
            header.records.push(record);
        }

        Ok(header)
    }

    /// Format the header back to SAM text (one trailing newline per line).
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            out.push('@');
            out.push_str(&record.type_code);
            for tag in &record.tags {
                out.push('\t');
                out.push_str(&tag.tag);
                out.push(':');
                out.push_str(&tag.value);
            }
            out.push('\n');
        }
        for comment in &self.comments {
            out.push_str("@CO\t");
            out.push_str(comment);
            out.push('\n');
        }
        out
    }

    /// Reference sequences declared by `@SQ` records (`SN`/`LN` tags).
    ///
    /// Records with a missing or unparsable `LN` are skipped.
    pub fn reference_sequences(&self) -> Vec<Reference> {
        self.records
            .iter()
            .filter(|r| r.type_code == "SQ")
            .filter_map(|r| {
                let name = r.tag("SN")?;
                let length: u32 = r.tag("LN")?.parse().ok()?;
                Some(Reference::new(name.to_string(), length))
            })
            .collect()
    }

    /// Append `@SQ` records for references present in the binary reference
    /// table but missing from the header text.
    ///
    /// BAM files are not required to repeat the reference dictionary in the
    /// SAM text; reconciling keeps the structured header authoritative for
    /// formatting.
    pub fn reconcile_references(&mut self, references: &[Reference]) {
        let known: Vec<String> = self
            .records
            .iter()
            .filter(|r| r.type_code == "SQ")
            .filter_map(|r| r.tag("SN").map(|s| s.to_uppercase()))
            .collect();

        for reference in references {
            if !known.contains(&reference.name.to_uppercase()) {
                let mut record = HeaderRecord::new("SQ");
                record.tags.push(FieldTag::new("SN", reference.name.clone()));
                record
                    .tags
                    .push(FieldTag::new("LN", reference.length.to_string()));
                self.records.push(record);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "@HD\tVN:1.6\tSO:coordinate\n\
                          @SQ\tSN:chr1\tLN:1000\n\
                          @SQ\tSN:chr2\tLN:2000\n\
                          @RG\tID:rg1\tSM:sample1\n\
                          @PG\tID:aln\tPN:aligner\tVN:0.9\n\
                          @CO\tfree text comment\twith a tab\n";

    #[test]
    fn test_parse_sample() {
        let header = SamHeader::parse(SAMPLE).unwrap();
        assert_eq!(header.records.len(), 5);
        assert_eq!(header.comments, vec!["free text comment\twith a tab"]);

        assert_eq!(header.records[0].type_code, "HD");
        assert_eq!(header.records[0].tag("VN"), Some("1.6"));
        assert_eq!(header.records[0].tag("SO"), Some("coordinate"));

        let refs = header.reference_sequences();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].name, "chr1");
        assert_eq!(refs[1].length, 2000);
    }

    #[test]
    fn test_round_trip_preserves_order() {
        let header = SamHeader::parse(SAMPLE).unwrap();
        assert_eq!(header.to_text(), SAMPLE);

        let reparsed = SamHeader::parse(&header.to_text()).unwrap();
        assert_eq!(reparsed, header);
    }

    #[test]
    fn test_unknown_type_code_preserved() {
        let text = "@ZZ\tXX:experimental\n";
        let header = SamHeader::parse(text).unwrap();
        assert_eq!(header.records[0].type_code, "ZZ");
        assert_eq!(header.records[0].tag("XX"), Some("experimental"));
        assert_eq!(header.to_text(), text);
    }

    #[test]
    fn test_value_containing_colon() {
        let header = SamHeader::parse("@PG\tCL:tool -x a:b\n").unwrap();
        assert_eq!(header.records[0].tag("CL"), Some("tool -x a:b"));
    }

    #[test]
    fn test_rejects_non_header_line() {
        let err = SamHeader::parse("@HD\tVN:1.6\nnot a header\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_rejects_bad_type_code() {
        assert!(SamHeader::parse("@H\tVN:1.6\n").is_err());
        assert!(SamHeader::parse("@HEAD\tVN:1.6\n").is_err());
    }

    #[test]
    fn test_rejects_bad_field() {
        assert!(SamHeader::parse("@HD\tnotatag\n").is_err());
    }

    #[test]
    fn test_reconcile_references() {
        let mut header = SamHeader::parse("@SQ\tSN:chr1\tLN:1000\n").unwrap();
        let table = vec![
            Reference::new(String::from("chr1"), 1000),
            Reference::new(String::from("chr2"), 2000),
        ];
        header.reconcile_references(&table);

        let refs = header.reference_sequences();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[1].name, "chr2");

        // Reconciling again adds nothing
        header.reconcile_references(&table);
        assert_eq!(header.reference_sequences().len(), 2);
    }

    #[test]
    fn test_empty_header() {
        let header = SamHeader::parse("").unwrap();
        assert!(header.records.is_empty());
        assert_eq!(header.to_text(), "");
    }
}

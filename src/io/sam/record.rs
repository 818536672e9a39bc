//! SAM alignment line parsing and formatting.
//!
//! One alignment per line, tab-delimited, 11 mandatory fields followed by
//! optional `TAG:TYPE:VALUE` fields:
//!
//! ```text
//! QNAME FLAG RNAME POS MAPQ CIGAR RNEXT PNEXT TLEN SEQ QUAL
//! ```
//!
//! SAM positions are 1-based (`0` = unavailable); records are stored with
//! BAM's 0-based convention internally. Quality is Phred+33 ASCII in SAM and
//! raw Phred in memory.

use crate::error::{BampageError, Result};
use crate::io::bam::cigar::{cigar_from_str, cigar_to_string};
use crate::io::bam::header::Reference;
use crate::io::bam::record::Record;
use crate::io::bam::tags::{tag_value_from_sam, Tag};

/// Parse one SAM alignment line into a [`Record`].
///
/// `references` resolves RNAME/RNEXT to reference indexes; `line_no` is used
/// for error context.
pub fn parse_alignment_line(
    line: &str,
    line_no: usize,
    references: &[Reference],
) -> Result<Record> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 11 {
        return Err(BampageError::InvalidSamFormat {
            line: line_no,
            msg: format!("expected 11 mandatory fields, got {}", fields.len()),
        });
    }

    let bad_field = |field: &str, what: &str| BampageError::InvalidSamFormat {
        line: line_no,
        msg: format!("invalid {}: {:?}", what, field),
    };

    let name = fields[0].to_string();
    let flags: u16 = fields[1].parse().map_err(|_| bad_field(fields[1], "FLAG"))?;

    let reference_id = resolve_reference(fields[2], references, line_no)?;

    let pos: i64 = fields[3].parse().map_err(|_| bad_field(fields[3], "POS"))?;
    let position = if pos > 0 { Some((pos - 1) as i32) } else { None };

    let mapq: u8 = fields[4].parse().map_err(|_| bad_field(fields[4], "MAPQ"))?;
    let mapq = if mapq == 255 { None } else { Some(mapq) };

    let cigar = cigar_from_str(fields[5]).ok_or_else(|| bad_field(fields[5], "CIGAR"))?;

    let mate_reference_id = if fields[6] == "=" {
        reference_id
    } else {
        resolve_reference(fields[6], references, line_no)?
    };

    let mate_pos: i64 = fields[7].parse().map_err(|_| bad_field(fields[7], "PNEXT"))?;
    let mate_position = if mate_pos > 0 {
        Some((mate_pos - 1) as i32)
    } else {
        None
    };

    let template_length: i32 = fields[8].parse().map_err(|_| bad_field(fields[8], "TLEN"))?;

    let sequence = if fields[9] == "*" {
        Vec::new()
    } else {
        fields[9].as_bytes().to_vec()
    };

    let quality = if fields[10] == "*" {
        Vec::new()
    } else {
        let qual: Vec<u8> = fields[10].bytes().map(|b| b.wrapping_sub(33)).collect();
        if !sequence.is_empty() && qual.len() != sequence.len() {
            return Err(BampageError::InvalidSamFormat {
                line: line_no,
                msg: format!(
                    "QUAL length {} does not match SEQ length {}",
                    qual.len(),
                    sequence.len()
                ),
            });
        }
        qual
    };

    let mut record = Record {
        name,
        reference_id,
        position,
        mapq,
        flags,
        mate_reference_id,
        mate_position,
        template_length,
        sequence,
        quality,
        cigar,
        tags: Default::default(),
    };

    for field in &fields[11..] {
        let mut parts = field.splitn(3, ':');
        let (Some(tag), Some(type_str), Some(value)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(bad_field(field, "optional field"));
        };
        if tag.len() != 2 || type_str.len() != 1 {
            return Err(bad_field(field, "optional field"));
        }
        let type_char = type_str.chars().next().unwrap();
        let value = tag_value_from_sam(type_char, value).ok_or_else(|| {
            bad_field(field, "optional field value")
        })?;
        let name_bytes = tag.as_bytes();
        record
            .tags
            .push(Tag::new([name_bytes[0], name_bytes[1]], value));
    }

    Ok(record)
}

fn resolve_reference(
    name: &str,
    references: &[Reference],
    line_no: usize,
) -> Result<Option<usize>> {
    if name == "*" {
        return Ok(None);
    }
    references
        .iter()
        .position(|r| r.name == name)
        .map(Some)
        .ok_or_else(|| BampageError::InvalidSamFormat {
            line: line_no,
            msg: format!("reference {:?} not declared in header", name),
        })
}

/// Format a [`Record`] as one SAM alignment line (no trailing newline).
pub fn format_alignment_line(record: &Record, references: &[Reference]) -> String {
    let rname = reference_name(record.reference_id, references);
    let rnext = match (record.mate_reference_id, record.reference_id) {
        (Some(mate), Some(own)) if mate == own => "=".to_string(),
        (mate, _) => reference_name(mate, references),
    };

    let seq = if record.sequence.is_empty() {
        String::from("*")
    } else {
        String::from_utf8_lossy(&record.sequence).into_owned()
    };
    let qual = if record.quality.is_empty() {
        String::from("*")
    } else {
        record.quality.iter().map(|&q| (q + 33) as char).collect()
    };

    let mut line = format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        record.name,
        record.flags,
        rname,
        record.position.map(|p| p + 1).unwrap_or(0),
        record.mapq.unwrap_or(255),
        cigar_to_string(&record.cigar),
        rnext,
        record.mate_position.map(|p| p + 1).unwrap_or(0),
        record.template_length,
        seq,
        qual,
    );

    for tag in &record.tags {
        line.push('\t');
        line.push_str(&tag.name_str());
        line.push(':');
        line.push(tag.value.sam_type());
        line.push(':');
        line.push_str(&tag.value.sam_value());
    }

    line
}

fn reference_name(id: Option<usize>, references: &[Reference]) -> String {
    id.and_then(|i| references.get(i))
        .map(|r| r.name.clone())
        .unwrap_or_else(|| String::from("*"))
}

//! Binary BAM header reading and writing.
//!
//! The BAM header consists of:
//! 1. Magic bytes (`BAM\x01`)
//! 2. SAM header text (length-prefixed)
//! 3. Reference sequence dictionary
//!
//! # Format
//!
//! ```text
//! BAM Header:
//! - 4 bytes: Magic ("BAM\1")
//! - 4 bytes: SAM header text length (l_text, int32)
//! - l_text bytes: SAM header text
//! - 4 bytes: Number of reference sequences (n_ref, int32)
//! - For each reference:
//!   - 4 bytes: Reference name length (l_name, int32, includes null terminator)
//!   - l_name bytes: Reference name (null-terminated)
//!   - 4 bytes: Reference length (int32)
//! ```

use super::error::BamDecodeError;
use std::io::{self, Read, Write};

/// BAM magic bytes.
pub const BAM_MAGIC: &[u8; 4] = b"BAM\x01";

/// Reference sequence information.
///
/// Each reference sequence (chromosome/contig) has a name and length, used
/// to resolve record reference IDs and validate alignment positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Reference sequence name (e.g., "chr1", "chrM")
    pub name: String,
    /// Reference sequence length in bases
    pub length: u32,
}

impl Reference {
    /// Create a new reference.
    pub fn new(name: String, length: u32) -> Self {
        Self { name, length }
    }
}

/// The raw binary BAM header: embedded SAM text plus the reference table.
///
/// The text is parsed into a structured header by `io::sam::header`; the
/// reference table is authoritative for record reference-ID resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeader {
    /// SAM header text (includes @HD, @SQ, @RG, @PG lines)
    pub text: String,
    /// Reference sequences (chromosomes/contigs)
    pub references: Vec<Reference>,
}

/// Read and validate BAM magic bytes.
pub fn read_magic<R: Read>(reader: &mut R) -> io::Result<()> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;

    if &magic != BAM_MAGIC {
        return Err(BamDecodeError::InvalidMagic { actual: magic }.into());
    }

    Ok(())
}

/// Read the length-prefixed SAM header text.
pub fn read_header_text<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = i32::from_le_bytes(len_bytes);

    if len < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid SAM header length: {}", len),
        ));
    }

    let mut text_bytes = vec![0u8; len as usize];
    reader.read_exact(&mut text_bytes)?;

    String::from_utf8(text_bytes).map_err(|source| {
        BamDecodeError::InvalidUtf8 {
            field: "SAM header text",
            source,
        }
        .into()
    })
}

/// Read a single reference sequence entry.
pub fn read_reference<R: Read>(reader: &mut R) -> io::Result<Reference> {
    let mut name_len_bytes = [0u8; 4];
    reader.read_exact(&mut name_len_bytes)?;
    let name_len = i32::from_le_bytes(name_len_bytes);

    if name_len <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid reference name length: {}", name_len),
        ));
    }

    let mut name_bytes = vec![0u8; name_len as usize];
    reader.read_exact(&mut name_bytes)?;

    if name_bytes.last() != Some(&0) {
        return Err(BamDecodeError::MissingNulTerminator {
            field: "reference name",
            offset: 0,
        }
        .into());
    }
    name_bytes.pop();

    let name = String::from_utf8(name_bytes).map_err(|source| BamDecodeError::InvalidUtf8 {
        field: "reference name",
        source,
    })?;

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let length = i32::from_le_bytes(len_bytes);

    if length < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid reference length: {}", length),
        ));
    }

    Ok(Reference::new(name, length as u32))
}

/// Read the reference sequence dictionary.
pub fn read_references<R: Read>(reader: &mut R) -> io::Result<Vec<Reference>> {
    let mut count_bytes = [0u8; 4];
    reader.read_exact(&mut count_bytes)?;
    let count = i32::from_le_bytes(count_bytes);

    if count < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid reference count: {}", count),
        ));
    }

    let mut references = Vec::with_capacity(count as usize);
    for i in 0..count {
        let reference = read_reference(reader).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Error reading reference {}: {}", i, e),
            )
        })?;
        references.push(reference);
    }

    Ok(references)
}

/// Read the complete binary BAM header: magic, SAM text, reference table.
pub fn read_raw_header<R: Read>(reader: &mut R) -> io::Result<RawHeader> {
    read_magic(reader)?;
    let text = read_header_text(reader)?;
    let references = read_references(reader)?;
    Ok(RawHeader { text, references })
}

/// Write the complete binary BAM header.
pub fn write_raw_header<W: Write>(
    writer: &mut W,
    text: &str,
    references: &[Reference],
) -> io::Result<()> {
    writer.write_all(BAM_MAGIC)?;
    writer.write_all(&(text.len() as i32).to_le_bytes())?;
    writer.write_all(text.as_bytes())?;
    writer.write_all(&(references.len() as i32).to_le_bytes())?;
    for reference in references {
        writer.write_all(&(reference.name.len() as i32 + 1).to_le_bytes())?;
        writer.write_all(reference.name.as_bytes())?;
        writer.write_all(&[0])?;
        writer.write_all(&(reference.length as i32).to_le_bytes())?;
    }
    Ok(())
}

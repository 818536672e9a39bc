//! Native BAM (Binary Alignment Map) support.
//!
//! Decodes and encodes the compressed binary BAM format:
//! header (magic bytes, embedded SAM text, reference table), variable-length
//! alignment records (fixed fields, CIGAR, 4-bit packed sequence, quality,
//! typed optional tags), and the `.bai` region index used for random access
//! by genomic coordinate.
//!
//! # Example
//!
//! ```no_run
//! use bampage::io::bam::BamParser;
//!
//! # fn main() -> bampage::Result<()> {
//! let mut parser = BamParser::new();
//! let map = parser.parse("alignments.bam")?;
//!
//! println!("{} references", map.references().len());
//! for record in map.query_sequences().iter() {
//!     let record = record?;
//!     if let Some(pos) = record.position {
//!         println!("{} at {}", record.name, pos);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod cigar;
pub mod error;
pub mod header;
pub mod index;
pub mod parser;
pub mod record;
pub mod sequence;
pub mod tags;
pub mod writer;

pub use cigar::{parse_cigar, CigarOp};
pub use error::BamDecodeError;
pub use header::{RawHeader, Reference};
pub use index::{BaiBuilder, BaiIndex, Bin, Chunk, ReferenceIndex, VirtualOffset};
pub use parser::{BamParser, VirtualizationPolicy};
pub use record::{parse_record, Record};
pub use sequence::decode_sequence;
pub use tags::{ArrayValue, Tag, TagValue, Tags};
pub use writer::{write_map, write_map_indexed, BamWriter};

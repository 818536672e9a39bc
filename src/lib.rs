//! bampage: BAM alignment parsing with sidecar-indexed data virtualization
//!
//! # Overview
//!
//! bampage reads and writes the compressed binary BAM alignment format and
//! lets files far larger than available memory be opened and queried, by
//! paging records through a sidecar-index-backed virtual sequence list.
//!
//! - **BAM in/out**: native decoding and encoding of the BAM wire format
//!   (BGZF blocks, binary header, variable-length records, typed tags)
//! - **Data virtualization**: parse once, persist a `.isc` pointer sidecar,
//!   then page individual records on demand behind a bounded LRU cache
//! - **Range queries**: seek straight to a genomic region through a `.bai`
//!   region index instead of scanning
//! - **SAM sibling**: text parsing/formatting that is semantically
//!   consistent with the BAM core for round-trip conversion
//!
//! # Quick Start
//!
//! ```no_run
//! use bampage::{BamParser, VirtualizationPolicy};
//!
//! # fn main() -> bampage::Result<()> {
//! // Parse with data virtualization: records stay on disk until touched
//! let mut parser = BamParser::new()
//!     .with_virtualization(VirtualizationPolicy::Always);
//! let map = parser.parse("large.bam")?;
//!
//! println!("{} records", map.query_sequences().len());
//! let one = map.query_sequences().get(12_000)?;
//! println!("{} at {:?}", one.name, one.position);
//! # Ok(())
//! # }
//! ```
//!
//! # Range queries
//!
//! ```no_run
//! use bampage::BamParser;
//!
//! # fn main() -> bampage::Result<()> {
//! let mut parser = BamParser::new();
//! // Requires large.bam.bai; fails with IndexUnavailable otherwise
//! let region = parser.parse_range_by_name("large.bam", "chr1", 10_000, 20_000)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`io::bam`]: binary format decode/encode, parser, writer, region index
//! - [`io::sam`]: SAM text header and alignment-line grammar
//! - [`io::bgzf`]: BGZF block layer with virtual-offset seeking
//! - [`virt`]: sequence pointers, sidecar indexes, virtual sequence lists
//! - [`alignment`]: the in-memory `SequenceAlignmentMap` and paired reads
//! - [`alphabet`]: 4-bit nucleotide encodings
//!
//! # Concurrency
//!
//! Parsing and virtual-sequence resolution are synchronous and
//! single-threaded; a parser and the maps it produces share state through
//! `Rc` and are intentionally not `Send`. Confine each parser to one thread
//! or synchronize externally.

#![warn(missing_docs)]

pub mod alignment;
pub mod alphabet;
pub mod error;
pub mod io;
pub mod virt;

// Re-export commonly used types
pub use alignment::{PairedRead, PairedReadType, QuerySequences, SequenceAlignmentMap};
pub use alphabet::SequenceEncoding;
pub use error::{BampageError, Result};
pub use io::bam::{BaiIndex, BamParser, BamWriter, CigarOp, Record, VirtualizationPolicy};
pub use io::sam::{SamHeader, SamParser, SamWriter};
pub use virt::{SequencePointer, SidecarIndex, VirtualSequenceList};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

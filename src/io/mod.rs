//! I/O: the BGZF block layer and the BAM/SAM format readers and writers.

pub mod bam;
pub mod bgzf;
pub mod sam;

pub use bam::{BamParser, BamWriter};
pub use bgzf::{BgzfReader, BgzfWriter};
pub use sam::{SamParser, SamWriter};

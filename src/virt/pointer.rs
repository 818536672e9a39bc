//! Sequence pointers: lightweight locators for unmaterialized records.

use crate::io::bam::index::VirtualOffset;

/// Locator identifying where one aligned sequence's data lives in its
/// source file, independent of whether it has been materialized.
///
/// The offsets are BGZF virtual offsets delimiting the record (for bare
/// uncompressed BAM input the within-block half is zero, so the value is a
/// plain byte offset). `starting_line` is meaningful only for line-oriented
/// source formats and is 0 for BAM. Pointers are immutable once created and
/// own no file-handle resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencePointer {
    /// Name of the alphabet the sequence was decoded with
    pub alphabet_name: String,
    /// Query name, when known (sidecar-loaded pointers carry `None`)
    pub id: Option<String>,
    /// Start and end virtual offsets of the record in the source file
    pub index_offsets: (i64, i64),
    /// 1-based line number for text sources; 0 for binary sources
    pub starting_line: i32,
}

impl SequencePointer {
    /// Virtual offset of the record's first byte.
    pub fn start_offset(&self) -> VirtualOffset {
        VirtualOffset::from_raw(self.index_offsets.0 as u64)
    }

    /// Virtual offset just past the record's last byte.
    pub fn end_offset(&self) -> VirtualOffset {
        VirtualOffset::from_raw(self.index_offsets.1 as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets() {
        let pointer = SequencePointer {
            alphabet_name: String::from("IUPACna"),
            id: Some(String::from("read1")),
            index_offsets: (0x10_0000, 0x10_0040),
            starting_line: 0,
        };
        assert_eq!(pointer.start_offset().as_raw(), 0x10_0000);
        assert_eq!(pointer.end_offset().as_raw(), 0x10_0040);
        assert_eq!(pointer.start_offset().compressed(), 0x10);
        assert_eq!(pointer.start_offset().uncompressed(), 0);
    }
}

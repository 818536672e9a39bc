//! In-memory sequence alignment maps.
//!
//! A [`SequenceAlignmentMap`] is the result of parsing a BAM or SAM file:
//! one structured header plus the ordered collection of aligned records.
//! The collection is a tagged enum over its backing storage — an eager
//! vector or a [`VirtualSequenceList`] paging records from disk — chosen at
//! parse time; callers index and iterate it the same way either way.
//! Record order always matches file order, which the sidecar's
//! pointer-index correspondence relies on.

use crate::error::{BampageError, Result};
use crate::io::bam::header::Reference;
use crate::io::bam::record::Record;
use crate::io::sam::header::SamHeader;
use crate::virt::list::VirtualSequenceList;
use std::collections::HashMap;
use std::rc::Rc;

/// Ordered collection of aligned records, eager or virtual.
#[derive(Debug)]
pub enum QuerySequences {
    /// All records materialized in memory
    Eager(Vec<Rc<Record>>),
    /// Records paged in on demand from the source file
    Virtual(VirtualSequenceList),
}

impl QuerySequences {
    /// Number of records.
    pub fn len(&self) -> usize {
        match self {
            QuerySequences::Eager(records) => records.len(),
            QuerySequences::Virtual(list) => list.len(),
        }
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the collection pages records from disk.
    pub fn is_virtual(&self) -> bool {
        matches!(self, QuerySequences::Virtual(_))
    }

    /// The virtual list, when this collection is virtualized.
    pub fn as_virtual(&self) -> Option<&VirtualSequenceList> {
        match self {
            QuerySequences::Virtual(list) => Some(list),
            QuerySequences::Eager(_) => None,
        }
    }

    /// The record at `index`.
    pub fn get(&self, index: usize) -> Result<Rc<Record>> {
        match self {
            QuerySequences::Eager(records) => records.get(index).cloned().ok_or_else(|| {
                BampageError::InvalidRange(format!(
                    "index {} out of range for list of {}",
                    index,
                    records.len()
                ))
            }),
            QuerySequences::Virtual(list) => list.get(index),
        }
    }

    /// Iterate over records in file order.
    pub fn iter(&self) -> QueryIter<'_> {
        QueryIter {
            sequences: self,
            index: 0,
        }
    }

    /// Append a record.
    ///
    /// Fails with `UnsupportedOperation` on a virtual collection, which is a
    /// read-only projection over its file.
    pub fn push(&mut self, record: Record) -> Result<()> {
        match self {
            QuerySequences::Eager(records) => {
                records.push(Rc::new(record));
                Ok(())
            }
            QuerySequences::Virtual(_) => Err(BampageError::UnsupportedOperation("push")),
        }
    }
}

/// Iterator created by [`QuerySequences::iter`].
pub struct QueryIter<'a> {
    sequences: &'a QuerySequences,
    index: usize,
}

impl<'a> Iterator for QueryIter<'a> {
    type Item = Result<Rc<Record>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.sequences.len() {
            return None;
        }
        let item = self.sequences.get(self.index);
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.sequences.len() - self.index;
        (remaining, Some(remaining))
    }
}

/// Classification of a reconstructed read pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairedReadType {
    /// Both mates mapped to the same reference, opposite strands, with a
    /// plausible insert
    Normal,
    /// Only one mate present, or a mate unmapped
    Orphan,
    /// Mates mapped to different references
    Chimera,
    /// Mates mapped in the same orientation (both forward or both reverse)
    StructuralAnomaly,
    /// Insert length exceeds the caller's ceiling
    LengthAnomaly,
    /// More than two primary records share the query name
    MultipleHits,
}

/// A read pair reconstructed from a map's records.
#[derive(Debug, Clone)]
pub struct PairedRead {
    /// The records sharing one query name, in file order
    pub reads: Vec<Rc<Record>>,
    /// Pair classification
    pub paired_type: PairedReadType,
    /// Absolute template length reported by the first mate (0 when unknown)
    pub insert_length: i32,
}

/// Header plus ordered aligned records: the in-memory form of one BAM/SAM
/// file.
#[derive(Debug)]
pub struct SequenceAlignmentMap {
    header: SamHeader,
    references: Vec<Reference>,
    query_sequences: QuerySequences,
}

impl SequenceAlignmentMap {
    /// Create an empty map with an eager record collection.
    pub fn new(header: SamHeader, references: Vec<Reference>) -> Self {
        Self {
            header,
            references,
            query_sequences: QuerySequences::Eager(Vec::new()),
        }
    }

    pub(crate) fn with_sequences(
        header: SamHeader,
        references: Vec<Reference>,
        query_sequences: QuerySequences,
    ) -> Self {
        Self {
            header,
            references,
            query_sequences,
        }
    }

    /// The structured header.
    pub fn header(&self) -> &SamHeader {
        &self.header
    }

    /// The reference sequence table, in header order.
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Name of the reference with the given index.
    pub fn reference_name(&self, id: usize) -> Option<&str> {
        self.references.get(id).map(|r| r.name.as_str())
    }

    /// The record collection.
    pub fn query_sequences(&self) -> &QuerySequences {
        &self.query_sequences
    }

    /// Mutable access to the record collection.
    ///
    /// Mutation still fails with `UnsupportedOperation` when the collection
    /// is virtual.
    pub fn query_sequences_mut(&mut self) -> &mut QuerySequences {
        &mut self.query_sequences
    }

    /// Reconstruct read pairs and classify them.
    ///
    /// Primary paired records are grouped by query name; each group becomes
    /// one [`PairedRead`] classified by mate presence, reference, strand
    /// orientation and insert length. `max_insert_length` is the ceiling
    /// above which an otherwise normal pair is classified as a length
    /// anomaly. The map is not mutated; for a virtual collection records are
    /// paged through once in file order.
    pub fn paired_reads(&self, max_insert_length: i32) -> Result<Vec<PairedRead>> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<Rc<Record>>> = HashMap::new();

        for record in self.query_sequences.iter() {
            let record = record?;
            if !record.is_paired() || record.is_secondary_or_supplementary() {
                continue;
            }
            match groups.get_mut(&record.name) {
                Some(group) => group.push(record),
                None => {
                    order.push(record.name.clone());
                    groups.insert(record.name.clone(), vec![record]);
                }
            }
        }

        let mut pairs = Vec::with_capacity(order.len());
        for name in order {
            let reads = groups.remove(&name).expect("group recorded in order");
            let paired_type = classify_pair(&reads, max_insert_length);
            let insert_length = reads
                .first()
                .map(|r| r.template_length.abs())
                .unwrap_or(0);
            pairs.push(PairedRead {
                reads,
                paired_type,
                insert_length,
            });
        }
        Ok(pairs)
    }
}

fn classify_pair(reads: &[Rc<Record>], max_insert_length: i32) -> PairedReadType {
    match reads {
        [_] => PairedReadType::Orphan,
        [first, second] => {
            if first.is_unmapped() || second.is_unmapped() {
                return PairedReadType::Orphan;
            }
            if first.reference_id != second.reference_id {
                return PairedReadType::Chimera;
            }
            if first.is_reverse() == second.is_reverse() {
                return PairedReadType::StructuralAnomaly;
            }
            if first.template_length.abs() > max_insert_length {
                return PairedReadType::LengthAnomaly;
            }
            PairedReadType::Normal
        }
        _ => PairedReadType::MultipleHits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::bam::record::{
        FLAG_FIRST_IN_PAIR, FLAG_LAST_IN_PAIR, FLAG_PAIRED, FLAG_REVERSE, FLAG_UNMAPPED,
    };

    fn mapped(name: &str, ref_id: usize, pos: i32, flags: u16, tlen: i32) -> Record {
        let mut record = Record::new();
        record.name = name.to_string();
        record.reference_id = Some(ref_id);
        record.position = Some(pos);
        record.flags = flags;
        record.template_length = tlen;
        record
    }

    fn map_with(records: Vec<Record>) -> SequenceAlignmentMap {
        let header = SamHeader::parse("@SQ\tSN:chr1\tLN:1000\n@SQ\tSN:chr2\tLN:1000\n").unwrap();
        let references = header.reference_sequences();
        let mut map = SequenceAlignmentMap::new(header, references);
        for record in records {
            map.query_sequences_mut().push(record).unwrap();
        }
        map
    }

    #[test]
    fn test_eager_access_and_iteration() {
        let map = map_with(vec![
            mapped("a", 0, 10, 0, 0),
            mapped("b", 0, 20, 0, 0),
        ]);
        assert_eq!(map.query_sequences().len(), 2);
        assert_eq!(map.query_sequences().get(1).unwrap().name, "b");
        assert!(map.query_sequences().get(2).is_err());

        let names: Vec<String> = map
            .query_sequences()
            .iter()
            .map(|r| r.unwrap().name.clone())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_normal_pair() {
        let map = map_with(vec![
            mapped("p1", 0, 100, FLAG_PAIRED | FLAG_FIRST_IN_PAIR, 300),
            mapped("p1", 0, 350, FLAG_PAIRED | FLAG_LAST_IN_PAIR | FLAG_REVERSE, -300),
        ]);
        let pairs = map.paired_reads(1000).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].paired_type, PairedReadType::Normal);
        assert_eq!(pairs[0].insert_length, 300);
        assert_eq!(pairs[0].reads.len(), 2);
    }

    #[test]
    fn test_anomalous_pairs_classified() {
        let map = map_with(vec![
            // orphan: mate never appears
            mapped("lone", 0, 5, FLAG_PAIRED | FLAG_FIRST_IN_PAIR, 0),
            // chimera: mates on different references
            mapped("chi", 0, 10, FLAG_PAIRED | FLAG_FIRST_IN_PAIR, 0),
            mapped("chi", 1, 10, FLAG_PAIRED | FLAG_LAST_IN_PAIR | FLAG_REVERSE, 0),
            // structural anomaly: both mates on the forward strand
            mapped("tand", 0, 10, FLAG_PAIRED | FLAG_FIRST_IN_PAIR, 200),
            mapped("tand", 0, 210, FLAG_PAIRED | FLAG_LAST_IN_PAIR, -200),
            // length anomaly
            mapped("far", 0, 10, FLAG_PAIRED | FLAG_FIRST_IN_PAIR, 90_000),
            mapped("far", 0, 90_010, FLAG_PAIRED | FLAG_LAST_IN_PAIR | FLAG_REVERSE, -90_000),
            // orphan: one mate unmapped
            mapped("um", 0, 40, FLAG_PAIRED | FLAG_FIRST_IN_PAIR, 0),
            mapped("um", 0, 40, FLAG_PAIRED | FLAG_LAST_IN_PAIR | FLAG_UNMAPPED, 0),
        ]);
        let pairs = map.paired_reads(10_000).unwrap();
        let kinds: Vec<(String, PairedReadType)> = pairs
            .iter()
            .map(|p| (p.reads[0].name.clone(), p.paired_type))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (String::from("lone"), PairedReadType::Orphan),
                (String::from("chi"), PairedReadType::Chimera),
                (String::from("tand"), PairedReadType::StructuralAnomaly),
                (String::from("far"), PairedReadType::LengthAnomaly),
                (String::from("um"), PairedReadType::Orphan),
            ]
        );
    }

    #[test]
    fn test_unpaired_records_excluded() {
        let map = map_with(vec![mapped("solo", 0, 10, 0, 0)]);
        assert!(map.paired_reads(1000).unwrap().is_empty());
    }
}

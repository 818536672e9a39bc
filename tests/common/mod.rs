//! Shared fixtures for integration tests.
//!
//! Fixture BAM files are built in-code through the writer, so every test
//! starts from a deterministic record set with known positions.

#![allow(dead_code)]

use bampage::io::bam::record::{
    FLAG_FIRST_IN_PAIR, FLAG_LAST_IN_PAIR, FLAG_MATE_REVERSE, FLAG_PAIRED, FLAG_REVERSE,
    FLAG_UNMAPPED,
};
use bampage::io::bam::tags::{Tag, TagValue};
use bampage::io::bam::writer;
use bampage::{CigarOp, Record, Result, SamHeader, SequenceAlignmentMap};
use std::path::Path;
use std::rc::Rc;

/// Header text for the fixture: two references, a read group, one comment.
pub const FIXTURE_HEADER: &str = "@HD\tVN:1.6\tSO:coordinate\n\
@SQ\tSN:chr1\tLN:100000\n\
@SQ\tSN:chr2\tLN:50000\n\
@RG\tID:rg1\tSM:sample1\n\
@CO\tfixture data built in-code\n";

fn mapped(name: &str, ref_id: usize, pos: i32, flags: u16, tlen: i32) -> Record {
    let mut record = Record::new();
    record.name = name.to_string();
    record.reference_id = Some(ref_id);
    record.position = Some(pos);
    record.mapq = Some(60);
    record.flags = flags;
    record.mate_reference_id = if flags & FLAG_PAIRED != 0 {
        Some(ref_id)
    } else {
        None
    };
    record.template_length = tlen;
    record.sequence = b"ACGTACGT".to_vec();
    record.quality = vec![30, 31, 32, 33, 34, 35, 36, 37];
    record.cigar = vec![CigarOp::Match(8)];
    record.tags.push(Tag::new(*b"NM", TagValue::UInt8(0)));
    record
        .tags
        .push(Tag::new(*b"RG", TagValue::String(String::from("rg1"))));
    record
}

fn unmapped(name: &str) -> Record {
    let mut record = Record::new();
    record.name = name.to_string();
    record.flags = FLAG_UNMAPPED;
    record.sequence = b"ACGT".to_vec();
    record.quality = vec![20, 21, 22, 23];
    record
}

/// The canonical fixture: 6 mapped records across two references plus one
/// unmapped record, in coordinate order.
pub fn fixture_map() -> SequenceAlignmentMap {
    let header = SamHeader::parse(FIXTURE_HEADER).unwrap();
    let references = header.reference_sequences();
    let mut map = SequenceAlignmentMap::new(header, references);

    let mut r001 = mapped(
        "r001",
        0,
        100,
        FLAG_PAIRED | FLAG_FIRST_IN_PAIR | FLAG_MATE_REVERSE,
        58,
    );
    r001.mate_position = Some(150);
    let mut r002 = mapped(
        "r001",
        0,
        150,
        FLAG_PAIRED | FLAG_LAST_IN_PAIR | FLAG_REVERSE,
        -58,
    );
    r002.mate_position = Some(100);

    let records = vec![
        r001,
        r002,
        mapped("r003", 0, 5000, 0, 0),
        mapped("r004", 0, 20000, 0, 0),
        mapped("r005", 1, 30, 0, 0),
        mapped("r006", 1, 4000, 0, 0),
        unmapped("u001"),
    ];
    for record in records {
        map.query_sequences_mut().push(record).unwrap();
    }
    map
}

/// Number of records in [`fixture_map`].
pub const FIXTURE_RECORD_COUNT: usize = 7;

/// Write the fixture to a BAM file; returns the record count.
pub fn write_fixture_bam(path: &Path) -> Result<u64> {
    writer::write_map(path, &fixture_map())
}

/// Write the fixture to a BAM file with a `.bai` alongside.
pub fn write_fixture_bam_indexed(path: &Path) -> Result<u64> {
    writer::write_map_indexed(path, &fixture_map())
}

/// Assert two maps hold pairwise-equal records and equal headers.
pub fn assert_maps_equal(left: &SequenceAlignmentMap, right: &SequenceAlignmentMap) {
    assert_eq!(left.header(), right.header(), "headers differ");
    assert_eq!(left.references(), right.references(), "reference tables differ");
    assert_eq!(
        left.query_sequences().len(),
        right.query_sequences().len(),
        "record counts differ"
    );

    for index in 0..left.query_sequences().len() {
        let a: Rc<Record> = left.query_sequences().get(index).unwrap();
        let b: Rc<Record> = right.query_sequences().get(index).unwrap();
        assert_eq!(*a, *b, "record {} differs", index);
    }
}

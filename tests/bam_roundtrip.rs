//! Round-trip integration tests: map -> BAM -> map and BAM -> BAM.

mod common;

use bampage::io::bam::writer;
use bampage::BamParser;
use common::{assert_maps_equal, fixture_map, write_fixture_bam, FIXTURE_RECORD_COUNT};

#[test]
fn test_write_then_parse_reproduces_fixture() {
    let dir = tempfile::tempdir().unwrap();
    let bam_path = dir.path().join("fixture.bam");

    let written = write_fixture_bam(&bam_path).unwrap();
    assert_eq!(written, FIXTURE_RECORD_COUNT as u64);

    let mut parser = BamParser::new();
    let parsed = parser.parse(&bam_path).unwrap();
    assert_maps_equal(&fixture_map(), &parsed);
}

#[test]
fn test_parse_format_parse_is_identity() {
    let dir = tempfile::tempdir().unwrap();
    let first_path = dir.path().join("first.bam");
    let second_path = dir.path().join("second.bam");

    write_fixture_bam(&first_path).unwrap();

    let mut parser = BamParser::new();
    let first = parser.parse(&first_path).unwrap();

    writer::write_map(&second_path, &first).unwrap();
    let second = parser.parse(&second_path).unwrap();

    assert_maps_equal(&first, &second);
}

#[test]
fn test_header_field_and_tag_order_survive() {
    let dir = tempfile::tempdir().unwrap();
    let bam_path = dir.path().join("fixture.bam");
    write_fixture_bam(&bam_path).unwrap();

    let mut parser = BamParser::new();
    let parsed = parser.parse(&bam_path).unwrap();

    // The header text embedded in the BAM reproduces the fixture exactly,
    // including the @CO comment and the tag order within each record.
    assert_eq!(parsed.header().to_text(), common::FIXTURE_HEADER);

    let hd = &parsed.header().records[0];
    assert_eq!(hd.type_code, "HD");
    assert_eq!(
        hd.tags.iter().map(|t| t.tag.as_str()).collect::<Vec<_>>(),
        vec!["VN", "SO"]
    );
}

#[test]
fn test_record_tags_survive_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let bam_path = dir.path().join("fixture.bam");
    write_fixture_bam(&bam_path).unwrap();

    let mut parser = BamParser::new();
    let parsed = parser.parse(&bam_path).unwrap();

    let record = parsed.query_sequences().get(0).unwrap();
    let names: Vec<String> = record.tags.iter().map(|t| t.name_str()).collect();
    assert_eq!(names, vec!["NM", "RG"]);
    assert_eq!(
        record.tags.get(b"RG").unwrap().value.sam_value(),
        "rg1"
    );
}

#[test]
fn test_unmapped_record_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let bam_path = dir.path().join("fixture.bam");
    write_fixture_bam(&bam_path).unwrap();

    let mut parser = BamParser::new();
    let parsed = parser.parse(&bam_path).unwrap();

    let last = parsed
        .query_sequences()
        .get(FIXTURE_RECORD_COUNT - 1)
        .unwrap();
    assert_eq!(last.name, "u001");
    assert!(last.is_unmapped());
    assert_eq!(last.reference_id, None);
    assert_eq!(last.position, None);
    assert_eq!(last.mapq, None);
    assert!(last.cigar.is_empty());
}

#[test]
fn test_truncated_file_is_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let bam_path = dir.path().join("fixture.bam");
    let broken_path = dir.path().join("broken.bam");
    write_fixture_bam(&bam_path).unwrap();

    // Chop the compressed stream mid-block
    let bytes = std::fs::read(&bam_path).unwrap();
    std::fs::write(&broken_path, &bytes[..bytes.len() / 2]).unwrap();

    let mut parser = BamParser::new();
    assert!(parser.parse(&broken_path).is_err());
}

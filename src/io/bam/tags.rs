//! BAM optional tags (auxiliary data).
//!
//! Optional tags store additional per-alignment information such as edit
//! distance (NM:i), alignment score (AS:i) or read group (RG:Z). Each tag is
//! encoded as a 2-byte name, a 1-byte type code and a type-dependent value.
//! Tag order is preserved so formatting a parsed record reproduces the
//! original byte sequence.
//!
//! # Type codes
//!
//! - `A` printable character
//! - `c`/`C` signed/unsigned 8-bit integer
//! - `s`/`S` signed/unsigned 16-bit integer
//! - `i`/`I` signed/unsigned 32-bit integer
//! - `f` 32-bit float
//! - `Z` NUL-terminated string
//! - `H` NUL-terminated hex string
//! - `B` array: 1-byte subtype (`cCsSiIf`) + u32 count + elements

use super::error::BamDecodeError;
use std::io;

/// A typed tag value.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    /// Printable character (A)
    Char(u8),
    /// Signed 8-bit integer (c)
    Int8(i8),
    /// Unsigned 8-bit integer (C)
    UInt8(u8),
    /// Signed 16-bit integer (s)
    Int16(i16),
    /// Unsigned 16-bit integer (S)
    UInt16(u16),
    /// Signed 32-bit integer (i)
    Int32(i32),
    /// Unsigned 32-bit integer (I)
    UInt32(u32),
    /// 32-bit float (f)
    Float(f32),
    /// NUL-terminated string (Z)
    String(String),
    /// NUL-terminated hex string (H)
    Hex(String),
    /// Numeric array (B)
    Array(ArrayValue),
}

/// Element storage for a `B`-typed array tag.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValue {
    /// Subtype `c`
    Int8(Vec<i8>),
    /// Subtype `C`
    UInt8(Vec<u8>),
    /// Subtype `s`
    Int16(Vec<i16>),
    /// Subtype `S`
    UInt16(Vec<u16>),
    /// Subtype `i`
    Int32(Vec<i32>),
    /// Subtype `I`
    UInt32(Vec<u32>),
    /// Subtype `f`
    Float(Vec<f32>),
}

impl TagValue {
    /// The BAM type code for this value.
    pub fn type_code(&self) -> u8 {
        match self {
            TagValue::Char(_) => b'A',
            TagValue::Int8(_) => b'c',
            TagValue::UInt8(_) => b'C',
            TagValue::Int16(_) => b's',
            TagValue::UInt16(_) => b'S',
            TagValue::Int32(_) => b'i',
            TagValue::UInt32(_) => b'I',
            TagValue::Float(_) => b'f',
            TagValue::String(_) => b'Z',
            TagValue::Hex(_) => b'H',
            TagValue::Array(_) => b'B',
        }
    }

    /// The SAM type character (all integer widths render as `i` in SAM).
    pub fn sam_type(&self) -> char {
        match self {
            TagValue::Char(_) => 'A',
            TagValue::Int8(_)
            | TagValue::UInt8(_)
            | TagValue::Int16(_)
            | TagValue::UInt16(_)
            | TagValue::Int32(_)
            | TagValue::UInt32(_) => 'i',
            TagValue::Float(_) => 'f',
            TagValue::String(_) => 'Z',
            TagValue::Hex(_) => 'H',
            TagValue::Array(_) => 'B',
        }
    }

    /// Render the value portion of a SAM `TAG:TYPE:VALUE` field.
    pub fn sam_value(&self) -> String {
        match self {
            TagValue::Char(c) => (*c as char).to_string(),
            TagValue::Int8(v) => v.to_string(),
            TagValue::UInt8(v) => v.to_string(),
            TagValue::Int16(v) => v.to_string(),
            TagValue::UInt16(v) => v.to_string(),
            TagValue::Int32(v) => v.to_string(),
            TagValue::UInt32(v) => v.to_string(),
            TagValue::Float(v) => v.to_string(),
            TagValue::String(s) | TagValue::Hex(s) => s.clone(),
            TagValue::Array(array) => array.sam_value(),
        }
    }
}

impl ArrayValue {
    /// The BAM subtype code for the element type.
    pub fn subtype(&self) -> u8 {
        match self {
            ArrayValue::Int8(_) => b'c',
            ArrayValue::UInt8(_) => b'C',
            ArrayValue::Int16(_) => b's',
            ArrayValue::UInt16(_) => b'S',
            ArrayValue::Int32(_) => b'i',
            ArrayValue::UInt32(_) => b'I',
            ArrayValue::Float(_) => b'f',
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            ArrayValue::Int8(v) => v.len(),
            ArrayValue::UInt8(v) => v.len(),
            ArrayValue::Int16(v) => v.len(),
            ArrayValue::UInt16(v) => v.len(),
            ArrayValue::Int32(v) => v.len(),
            ArrayValue::UInt32(v) => v.len(),
            ArrayValue::Float(v) => v.len(),
        }
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sam_value(&self) -> String {
        fn join<T: ToString>(subtype: char, values: &[T]) -> String {
            let mut out = subtype.to_string();
            for v in values {
                out.push(',');
                out.push_str(&v.to_string());
            }
            out
        }
        match self {
            ArrayValue::Int8(v) => join('c', v),
            ArrayValue::UInt8(v) => join('C', v),
            ArrayValue::Int16(v) => join('s', v),
            ArrayValue::UInt16(v) => join('S', v),
            ArrayValue::Int32(v) => join('i', v),
            ArrayValue::UInt32(v) => join('I', v),
            ArrayValue::Float(v) => join('f', v),
        }
    }
}

/// One optional tag field: 2-character name plus typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    /// Two-character tag name (e.g. `NM`)
    pub name: [u8; 2],
    /// Typed value
    pub value: TagValue,
}

impl Tag {
    /// Create a tag.
    pub fn new(name: [u8; 2], value: TagValue) -> Self {
        Self { name, value }
    }

    /// Tag name as a string slice.
    pub fn name_str(&self) -> String {
        format!("{}{}", self.name[0] as char, self.name[1] as char)
    }
}

/// Ordered container for a record's optional tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tags {
    entries: Vec<Tag>,
}

impl Tags {
    /// Create an empty tag set.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Look up a tag by name.
    pub fn get(&self, name: &[u8; 2]) -> Option<&Tag> {
        self.entries.iter().find(|t| &t.name == name)
    }

    /// Append a tag, preserving insertion order.
    pub fn push(&mut self, tag: Tag) {
        self.entries.push(tag);
    }

    /// Iterate over tags in file order.
    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.entries.iter()
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no tags.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize all tags to BAM binary form, appending to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        for tag in &self.entries {
            buf.extend_from_slice(&tag.name);
            buf.push(tag.value.type_code());
            encode_value(&tag.value, buf);
        }
    }
}

impl<'a> IntoIterator for &'a Tags {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn encode_value(value: &TagValue, buf: &mut Vec<u8>) {
    match value {
        TagValue::Char(c) => buf.push(*c),
        TagValue::Int8(v) => buf.push(*v as u8),
        TagValue::UInt8(v) => buf.push(*v),
        TagValue::Int16(v) => buf.extend_from_slice(&v.to_le_bytes()),
        TagValue::UInt16(v) => buf.extend_from_slice(&v.to_le_bytes()),
        TagValue::Int32(v) => buf.extend_from_slice(&v.to_le_bytes()),
        TagValue::UInt32(v) => buf.extend_from_slice(&v.to_le_bytes()),
        TagValue::Float(v) => buf.extend_from_slice(&v.to_le_bytes()),
        TagValue::String(s) | TagValue::Hex(s) => {
            buf.extend_from_slice(s.as_bytes());
            buf.push(0);
        }
        TagValue::Array(array) => {
            buf.push(array.subtype());
            buf.extend_from_slice(&(array.len() as u32).to_le_bytes());
            match array {
                ArrayValue::Int8(v) => buf.extend(v.iter().map(|&x| x as u8)),
                ArrayValue::UInt8(v) => buf.extend_from_slice(v),
                ArrayValue::Int16(v) => {
                    v.iter().for_each(|x| buf.extend_from_slice(&x.to_le_bytes()))
                }
                ArrayValue::UInt16(v) => {
                    v.iter().for_each(|x| buf.extend_from_slice(&x.to_le_bytes()))
                }
                ArrayValue::Int32(v) => {
                    v.iter().for_each(|x| buf.extend_from_slice(&x.to_le_bytes()))
                }
                ArrayValue::UInt32(v) => {
                    v.iter().for_each(|x| buf.extend_from_slice(&x.to_le_bytes()))
                }
                ArrayValue::Float(v) => {
                    v.iter().for_each(|x| buf.extend_from_slice(&x.to_le_bytes()))
                }
            }
        }
    }
}

/// Cursor-based reader over the tag region of a record.
struct TagCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> TagCursor<'a> {
    fn take(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], BamDecodeError> {
        if self.pos + n > self.data.len() {
            return Err(BamDecodeError::UnexpectedEof {
                context,
                expected: n,
                actual: self.data.len() - self.pos,
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u8(&mut self, context: &'static str) -> Result<u8, BamDecodeError> {
        Ok(self.take(1, context)?[0])
    }

    fn take_nul_string(&mut self, field: &'static str) -> Result<String, BamDecodeError> {
        let start = self.pos;
        let end = self.data[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|i| start + i)
            .ok_or(BamDecodeError::MissingNulTerminator { field, offset: start })?;
        let bytes = self.data[start..end].to_vec();
        self.pos = end + 1;
        String::from_utf8(bytes).map_err(|source| BamDecodeError::InvalidUtf8 { field, source })
    }
}

/// Parse the optional tag region at the end of a BAM record.
///
/// # Errors
///
/// Returns an error on truncated values, invalid type/subtype codes, or
/// duplicate tag names (a spec violation).
pub fn parse_tags(data: &[u8]) -> io::Result<Tags> {
    let mut cursor = TagCursor { data, pos: 0 };
    let mut tags = Tags::new();

    while cursor.pos < data.len() {
        let name_bytes = cursor.take(2, "tag name")?;
        let name = [name_bytes[0], name_bytes[1]];
        let type_code = cursor.take_u8("tag type")?;

        if tags.get(&name).is_some() {
            return Err(BamDecodeError::DuplicateTag { tag: name }.into());
        }

        let value = parse_value(&mut cursor, name, type_code)?;
        tags.push(Tag::new(name, value));
    }

    Ok(tags)
}

fn parse_value(
    cursor: &mut TagCursor<'_>,
    tag: [u8; 2],
    type_code: u8,
) -> Result<TagValue, BamDecodeError> {
    Ok(match type_code {
        b'A' => TagValue::Char(cursor.take_u8("tag value")?),
        b'c' => TagValue::Int8(cursor.take_u8("tag value")? as i8),
        b'C' => TagValue::UInt8(cursor.take_u8("tag value")?),
        b's' => {
            let b = cursor.take(2, "tag value")?;
            TagValue::Int16(i16::from_le_bytes([b[0], b[1]]))
        }
        b'S' => {
            let b = cursor.take(2, "tag value")?;
            TagValue::UInt16(u16::from_le_bytes([b[0], b[1]]))
        }
        b'i' => {
            let b = cursor.take(4, "tag value")?;
            TagValue::Int32(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        }
        b'I' => {
            let b = cursor.take(4, "tag value")?;
            TagValue::UInt32(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        }
        b'f' => {
            let b = cursor.take(4, "tag value")?;
            TagValue::Float(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        }
        b'Z' => TagValue::String(cursor.take_nul_string("tag string value")?),
        b'H' => TagValue::Hex(cursor.take_nul_string("tag hex value")?),
        b'B' => {
            let subtype = cursor.take_u8("array subtype")?;
            let count_bytes = cursor.take(4, "array count")?;
            let count = u32::from_le_bytes([
                count_bytes[0],
                count_bytes[1],
                count_bytes[2],
                count_bytes[3],
            ]) as usize;
            TagValue::Array(parse_array(cursor, tag, subtype, count)?)
        }
        other => return Err(BamDecodeError::InvalidTagType { tag, type_code: other }),
    })
}

fn parse_array(
    cursor: &mut TagCursor<'_>,
    tag: [u8; 2],
    subtype: u8,
    count: usize,
) -> Result<ArrayValue, BamDecodeError> {
    fn elements<T, const N: usize>(
        cursor: &mut TagCursor<'_>,
        count: usize,
        convert: impl Fn([u8; N]) -> T,
    ) -> Result<Vec<T>, BamDecodeError> {
        let bytes = cursor.take(
            count.checked_mul(N).ok_or(BamDecodeError::InvalidData {
                message: format!("array element count too large: {}", count),
            })?,
            "array elements",
        )?;
        Ok(bytes
            .chunks_exact(N)
            .map(|chunk| {
                let mut raw = [0u8; N];
                raw.copy_from_slice(chunk);
                convert(raw)
            })
            .collect())
    }

    Ok(match subtype {
        b'c' => ArrayValue::Int8(elements(cursor, count, |[b]: [u8; 1]| b as i8)?),
        b'C' => ArrayValue::UInt8(elements(cursor, count, |[b]: [u8; 1]| b)?),
        b's' => ArrayValue::Int16(elements(cursor, count, i16::from_le_bytes)?),
        b'S' => ArrayValue::UInt16(elements(cursor, count, u16::from_le_bytes)?),
        b'i' => ArrayValue::Int32(elements(cursor, count, i32::from_le_bytes)?),
        b'I' => ArrayValue::UInt32(elements(cursor, count, u32::from_le_bytes)?),
        b'f' => ArrayValue::Float(elements(cursor, count, f32::from_le_bytes)?),
        other => return Err(BamDecodeError::InvalidArraySubtype { tag, subtype: other }),
    })
}

/// Parse a SAM-text optional field value (`TYPE:VALUE` portion).
///
/// Integers always parse to `Int32`, the widest SAM integer type, since SAM
/// text does not distinguish widths.
pub fn tag_value_from_sam(type_char: char, value: &str) -> Option<TagValue> {
    Some(match type_char {
        'A' => TagValue::Char(*value.as_bytes().first()?),
        'i' => TagValue::Int32(value.parse().ok()?),
        'f' => TagValue::Float(value.parse().ok()?),
        'Z' => TagValue::String(value.to_string()),
        'H' => TagValue::Hex(value.to_string()),
        'B' => {
            let mut parts = value.split(',');
            let subtype = parts.next()?;
            let rest: Vec<&str> = parts.collect();
            let array = match subtype {
                "c" => ArrayValue::Int8(parse_all(&rest)?),
                "C" => ArrayValue::UInt8(parse_all(&rest)?),
                "s" => ArrayValue::Int16(parse_all(&rest)?),
                "S" => ArrayValue::UInt16(parse_all(&rest)?),
                "i" => ArrayValue::Int32(parse_all(&rest)?),
                "I" => ArrayValue::UInt32(parse_all(&rest)?),
                "f" => ArrayValue::Float(parse_all(&rest)?),
                _ => return None,
            };
            TagValue::Array(array)
        }
        _ => return None,
    })
}

fn parse_all<T: std::str::FromStr>(parts: &[&str]) -> Option<Vec<T>> {
    parts.iter().map(|p| p.parse().ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tags() {
        let tags = parse_tags(&[]).unwrap();
        assert!(tags.is_empty());
        assert_eq!(tags.len(), 0);
    }

    #[test]
    fn test_parse_int_tag() {
        // NM:i:1
        let data = vec![b'N', b'M', b'i', 1, 0, 0, 0];
        let tags = parse_tags(&data).unwrap();
        assert_eq!(tags.len(), 1);
        let tag = tags.get(b"NM").unwrap();
        assert_eq!(tag.value, TagValue::Int32(1));
    }

    #[test]
    fn test_parse_string_tag() {
        // RG:Z:grp1
        let mut data = vec![b'R', b'G', b'Z'];
        data.extend_from_slice(b"grp1\0");
        let tags = parse_tags(&data).unwrap();
        assert_eq!(
            tags.get(b"RG").unwrap().value,
            TagValue::String(String::from("grp1"))
        );
    }

    #[test]
    fn test_parse_array_tag() {
        // XB:B:S,7,9
        let mut data = vec![b'X', b'B', b'B', b'S'];
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&7u16.to_le_bytes());
        data.extend_from_slice(&9u16.to_le_bytes());
        let tags = parse_tags(&data).unwrap();
        assert_eq!(
            tags.get(b"XB").unwrap().value,
            TagValue::Array(ArrayValue::UInt16(vec![7, 9]))
        );
    }

    #[test]
    fn test_parse_multiple_preserves_order() {
        let mut data = vec![b'N', b'M', b'C', 3];
        data.extend_from_slice(b"RGZone\0");
        data.extend_from_slice(&[b'A', b'S', b's']);
        data.extend_from_slice(&512i16.to_le_bytes());
        let tags = parse_tags(&data).unwrap();
        let names: Vec<String> = tags.iter().map(|t| t.name_str()).collect();
        assert_eq!(names, vec!["NM", "RG", "AS"]);
    }

    #[test]
    fn test_duplicate_tag_rejected() {
        let data = vec![b'N', b'M', b'C', 3, b'N', b'M', b'C', 4];
        let err = parse_tags(&data).unwrap_err();
        assert!(err.to_string().contains("Duplicate tag"));
    }

    #[test]
    fn test_invalid_type_code() {
        let data = vec![b'X', b'X', b'q', 0];
        let err = parse_tags(&data).unwrap_err();
        assert!(err.to_string().contains("Invalid type code"));
    }

    #[test]
    fn test_truncated_value() {
        let data = vec![b'N', b'M', b'i', 1, 0]; // i32 needs 4 bytes
        assert!(parse_tags(&data).is_err());
    }

    #[test]
    fn test_unterminated_string() {
        let data = vec![b'R', b'G', b'Z', b'a', b'b'];
        let err = parse_tags(&data).unwrap_err();
        assert!(err.to_string().contains("NUL terminator"));
    }

    #[test]
    fn test_encode_round_trip() {
        let mut tags = Tags::new();
        tags.push(Tag::new(*b"NM", TagValue::UInt8(3)));
        tags.push(Tag::new(*b"RG", TagValue::String(String::from("lane1"))));
        tags.push(Tag::new(*b"XF", TagValue::Float(1.5)));
        tags.push(Tag::new(
            *b"CG",
            TagValue::Array(ArrayValue::Int32(vec![80, -3, 96])),
        ));

        let mut buf = Vec::new();
        tags.encode(&mut buf);
        let reparsed = parse_tags(&buf).unwrap();
        assert_eq!(reparsed, tags);
    }

    #[test]
    fn test_sam_rendering() {
        assert_eq!(TagValue::Int8(-2).sam_type(), 'i');
        assert_eq!(TagValue::Int8(-2).sam_value(), "-2");
        assert_eq!(
            TagValue::Array(ArrayValue::UInt8(vec![1, 2])).sam_value(),
            "C,1,2"
        );
    }

    #[test]
    fn test_sam_value_parsing() {
        assert_eq!(tag_value_from_sam('i', "42"), Some(TagValue::Int32(42)));
        assert_eq!(
            tag_value_from_sam('B', "i,1,-2"),
            Some(TagValue::Array(ArrayValue::Int32(vec![1, -2])))
        );
        assert_eq!(tag_value_from_sam('Q', "x"), None);
    }
}

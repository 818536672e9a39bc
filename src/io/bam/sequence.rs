//! 4-bit BAM sequence decoding and encoding.
//!
//! BAM stores sequences in 4-bit encoding (2 bases per byte) to save space,
//! high nibble first. Which symbols the 16 codes map to is decided by the
//! [`SequenceEncoding`] passed in by the parser.

use super::error::BamDecodeError;
use crate::alphabet::SequenceEncoding;
use std::io;

/// Decode a 4-bit packed BAM sequence to ASCII.
///
/// # Arguments
///
/// * `data` - Packed 4-bit sequence data (ceil(length/2) bytes)
/// * `length` - Number of bases to decode
/// * `encoding` - Encoding deciding which codes are valid
///
/// # Errors
///
/// Returns an error if `data` is too short for the specified `length`, or a
/// code falls outside the encoding's alphabet (strict mode).
pub fn decode_sequence(
    data: &[u8],
    length: usize,
    encoding: SequenceEncoding,
) -> io::Result<Vec<u8>> {
    let required_bytes = length.div_ceil(2);
    if data.len() < required_bytes {
        return Err(BamDecodeError::UnexpectedEof {
            context: "packed sequence",
            expected: required_bytes,
            actual: data.len(),
        }
        .into());
    }

    let mut sequence = Vec::with_capacity(length);
    for i in 0..length {
        let byte = data[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };

        let symbol = encoding.decode(nibble).ok_or(BamDecodeError::SymbolOutOfAlphabet {
            code: nibble,
            position: i,
            encoding: encoding.alphabet_name(),
        })?;
        sequence.push(symbol);
    }

    Ok(sequence)
}

/// Encode ASCII bases to 4-bit packed form, high nibble first.
///
/// Symbols outside the table encode as `N`; odd-length sequences pad the
/// final low nibble with zero.
pub fn encode_sequence(bases: &[u8]) -> Vec<u8> {
    let encoding = SequenceEncoding::IupacNa;
    let mut packed = Vec::with_capacity(bases.len().div_ceil(2));
    for pair in bases.chunks(2) {
        let high = encoding.encode(pair[0]);
        let low = if pair.len() > 1 { encoding.encode(pair[1]) } else { 0 };
        packed.push((high << 4) | low);
    }
    packed
}

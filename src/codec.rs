use std::fmt;

use crate::constants::{
    MAX_REMAINING_LENGTH, MAX_REMAINING_LENGTH_BYTES, REMAINING_LENGTH_MULTIPLIER_LIMIT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemainingLengthError {
    /// The value does not fit in the supported range.
    TooLarge,
    /// The encoded value would exceed the supported range.
    OutOfRange,
    /// The input ended before a terminating byte.
    Incomplete,
}

impl RemainingLengthError {
    /// Numeric code matching the decode/encode return contract.
    pub fn code(&self) -> i8 {
        match self {
            Self::TooLarge | Self::Incomplete => -1,
            Self::OutOfRange => -2,
        }
    }
}

impl std::error::Error for RemainingLengthError {}

impl fmt::Display for RemainingLengthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge => write!(f, "Remaining length exceeds {MAX_REMAINING_LENGTH}"),
            Self::OutOfRange => write!(f, "Remaining length out of range"),
            Self::Incomplete => write!(f, "Remaining length incomplete"),
        }
    }
}

/// Encode a remaining length.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718023>
///
/// ```text
/// do
///    encodedByte = X MOD 128
///    X = X DIV 128
///    // if there are more data to encode, set the top bit of this byte
///    if (X > 0)
///       encodedByte = encodedByte OR 128
///    endif
///    'output' encodedByte
/// while (X > 0)
/// ```
///
/// Returns the number of bytes written into `out`.
///
/// # Errors
/// - `TooLarge` if the value exceeds `MAX_REMAINING_LENGTH`.
/// - `Incomplete` if `out` is too short to hold the encoding.
pub fn encode_remaining_length(mut value: u32, out: &mut [u8]) -> Result<usize, RemainingLengthError> {
    if value > MAX_REMAINING_LENGTH {
        return Err(RemainingLengthError::TooLarge);
    }

    for (i, slot) in out.iter_mut().enumerate() {
        // Take the 7 least significant bits
        let mut encoded_byte = (value % 128) as u8;
        value >>= 7;

        // More to come, mark this byte as continuation
        if value > 0 {
            encoded_byte |= 128;
        }

        *slot = encoded_byte;

        if value == 0 {
            return Ok(i + 1);
        }
    }

    Err(RemainingLengthError::Incomplete)
}

/// Decode a remaining length from at most `max_bytes` bytes of `input`.
///
/// Returns the value and the number of bytes consumed. At most
/// `MAX_REMAINING_LENGTH_BYTES` are ever inspected.
///
/// # Errors
/// - `OutOfRange` if a terminating byte arrives once the multiplier has
///   reached 128^3.
/// - `Incomplete` if the window ends without a terminating byte.
pub fn decode_remaining_length(
    input: &[u8],
    max_bytes: usize,
) -> Result<(u32, usize), RemainingLengthError> {
    let window = input.len().min(max_bytes).min(MAX_REMAINING_LENGTH_BYTES);
    let mut multiplier: u32 = 1;
    let mut value: u32 = 0;

    for (i, &encoded_byte) in input[..window].iter().enumerate() {
        if encoded_byte & 128 == 0 && multiplier >= REMAINING_LENGTH_MULTIPLIER_LIMIT {
            return Err(RemainingLengthError::OutOfRange);
        }

        value += u32::from(encoded_byte & 127) * multiplier;

        // If the continuation bit is not set, we are done
        if encoded_byte & 128 == 0 {
            return Ok((value, i + 1));
        }

        multiplier <<= 7;
    }

    Err(RemainingLengthError::Incomplete)
}

/// Number of bytes needed to encode `value`, saturating at 4.
pub fn remaining_length_len(value: u32) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Reads a big-endian u16 at `offset`.
pub(crate) fn read_u16(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Reads a 2-byte length prefix at `offset` and returns the bytes it covers.
pub(crate) fn read_length_prefixed(buf: &[u8], offset: usize) -> Option<&[u8]> {
    let len = usize::from(read_u16(buf, offset)?);
    buf.get(offset + 2..offset + 2 + len)
}

/// Fixed header of a received packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    /// First byte: packet type in the high nibble, flags in the low nibble.
    pub control_byte: u8,
    /// Decoded remaining length.
    pub remaining_len: usize,
    /// Bytes taken by the control byte and the remaining length field.
    pub header_len: usize,
}

impl FixedHeader {
    /// Parses the fixed header at the start of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, RemainingLengthError> {
        let Some(&control_byte) = buf.first() else {
            return Err(RemainingLengthError::Incomplete);
        };

        let (remaining_len, consumed) =
            decode_remaining_length(&buf[1..], MAX_REMAINING_LENGTH_BYTES)?;

        Ok(Self { control_byte, remaining_len: remaining_len as usize, header_len: 1 + consumed })
    }

    pub fn packet_type(&self) -> u8 {
        self.control_byte >> 4
    }

    pub fn flags(&self) -> u8 {
        self.control_byte & 0x0F
    }

    /// Total size of the packet on the wire.
    pub fn packet_len(&self) -> usize {
        self.header_len + self.remaining_len
    }

    /// The variable header and payload, if `buf` holds the whole packet.
    pub fn body<'b>(&self, buf: &'b [u8]) -> Option<&'b [u8]> {
        buf.get(self.header_len..self.packet_len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: u32) -> Vec<u8> {
        let mut out = [0; 4];
        let n = encode_remaining_length(value, &mut out).unwrap();
        out[..n].to_vec()
    }

    #[test]
    fn encodes_boundaries() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(127), vec![0x7F]);
        assert_eq!(encode(128), vec![0x80, 0x01]);
        assert_eq!(encode(16_383), vec![0xFF, 0x7F]);
        assert_eq!(encode(16_384), vec![0x80, 0x80, 0x01]);
        assert_eq!(encode(2_097_151), vec![0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn rejects_values_past_the_limit() {
        let mut out = [0; 4];
        assert_eq!(encode_remaining_length(2_097_152, &mut out), Err(RemainingLengthError::TooLarge));
        assert_eq!(encode_remaining_length(u32::MAX, &mut out), Err(RemainingLengthError::TooLarge));
    }

    #[test]
    fn encode_needs_room() {
        let mut out = [0; 1];
        assert_eq!(encode_remaining_length(128, &mut out), Err(RemainingLengthError::Incomplete));
    }

    #[test]
    fn decodes_and_reports_consumed() {
        assert_eq!(decode_remaining_length(&[0x00], 4), Ok((0, 1)));
        assert_eq!(decode_remaining_length(&[0xC8, 0x01, 0xAA], 4), Ok((200, 2)));
        assert_eq!(decode_remaining_length(&[0xFF, 0xFF, 0x7F], 4), Ok((2_097_151, 3)));
    }

    #[test]
    fn four_continuation_bytes_are_incomplete() {
        assert_eq!(
            decode_remaining_length(&[0xFF, 0xFF, 0xFF, 0xFF], 4),
            Err(RemainingLengthError::Incomplete)
        );
        assert_eq!(
            decode_remaining_length(&[0x80, 0x80, 0x80, 0x80, 0x01], 8),
            Err(RemainingLengthError::Incomplete)
        );
    }

    #[test]
    fn fourth_byte_is_out_of_range() {
        assert_eq!(
            decode_remaining_length(&[0x80, 0x80, 0x80, 0x01], 4),
            Err(RemainingLengthError::OutOfRange)
        );
        assert_eq!(RemainingLengthError::OutOfRange.code(), -2);
    }

    #[test]
    fn window_limits_decode() {
        assert_eq!(decode_remaining_length(&[0x80, 0x01], 1), Err(RemainingLengthError::Incomplete));
        assert_eq!(decode_remaining_length(&[], 4), Err(RemainingLengthError::Incomplete));
    }

    #[test]
    fn encoded_len_matches_encoding() {
        for value in [0, 127, 128, 16_383, 16_384, 2_097_151] {
            assert_eq!(remaining_length_len(value), encode(value).len());
        }
    }

    #[test]
    fn parses_fixed_header() {
        let buf = [0x32, 0x03, 0x00, 0x01, b't', 0xFF];
        let header = FixedHeader::parse(&buf).unwrap();

        assert_eq!(header.packet_type(), 3);
        assert_eq!(header.flags(), 2);
        assert_eq!(header.remaining_len, 3);
        assert_eq!(header.header_len, 2);
        assert_eq!(header.body(&buf), Some(&[0x00, 0x01, b't'][..]));
        assert_eq!(header.body(&buf[..4]), None);
    }

    #[test]
    fn reads_length_prefixed() {
        let buf = [0x00, 0x02, b'a', b'b', b'c'];
        assert_eq!(read_length_prefixed(&buf, 0), Some(&b"ab"[..]));
        assert_eq!(read_length_prefixed(&buf, 2), None);
        assert_eq!(read_u16(&buf, 4), None);
    }
}

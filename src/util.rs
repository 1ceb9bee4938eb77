//! Small helpers shared across modules.

use crate::error::Error;

/// Brings [unlikely](core::intrinsics::unlikely) to stable rust.
#[inline(always)]
pub(crate) const fn unlikely(b: bool) -> bool {
    #[allow(clippy::needless_bool, clippy::bool_to_int_with_if)]
    if (1i32).checked_div(if b { 0 } else { 1 }).is_none() {
        true
    } else {
        false
    }
}

#[cfg(any(feature = "base64", test))]
#[inline]
pub(crate) fn encode_base64<T: AsRef<[u8]>>(data: T) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data.as_ref())
}

#[cfg(any(feature = "base64", test))]
#[inline]
pub(crate) fn decode_base64<T: AsRef<[u8]>>(data: T) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(data.as_ref())
}

#[cfg(feature = "base64")]
#[inline]
pub(crate) fn decode_base64_slice<T: AsRef<[u8]>>(
    data: T,
    target: &mut [u8],
) -> Result<(), base64::DecodeSliceError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode_slice(data.as_ref(), target)
        .map(|_| ())
}

/// Reads up to 8 bytes as a big-endian unsigned integer.
///
/// Returns `None` if `bytes` is longer than 8.
#[inline]
pub(crate) fn read_be_uint(bytes: &[u8]) -> Option<u64> {
    if unlikely(bytes.len() > 8) {
        return None;
    }
    let mut buffer = [0u8; 8];
    buffer[8 - bytes.len()..].copy_from_slice(bytes);
    Some(u64::from_be_bytes(buffer))
}

/// A wrapper around arbitrary data with the specified bit length.
///
/// Displayed as hex with the `_` completion tag suffix when
/// the length is not a multiple of four.
pub struct Bitstring<'a> {
    /// Underlying bytes (with or without termination bit).
    pub bytes: &'a [u8],
    /// Length of data in bits.
    pub bit_len: u16,
}

impl Bitstring<'_> {
    /// Parses a bitstring from a hex string.
    ///
    /// Returns the parsed data and the bit length.
    /// Tag bit is removed if present.
    pub fn from_hex_str(s: &str) -> Result<(Vec<u8>, u16), Error> {
        fn nibble(c: u8) -> Result<u8, Error> {
            match c {
                b'0'..=b'9' => Ok(c - b'0'),
                b'a'..=b'f' => Ok(c - b'a' + 10),
                b'A'..=b'F' => Ok(c - b'A' + 10),
                _ => Err(Error::InvalidData),
            }
        }

        if !s.is_ascii() || s.len() > 128 * 2 {
            return Err(Error::InvalidData);
        }

        let (digits, with_tag) = match s.as_bytes().strip_suffix(b"_") {
            Some(digits) => (digits, true),
            None => (s.as_bytes(), false),
        };

        let mut data = Vec::with_capacity((digits.len() + 1) / 2);
        for pair in digits.chunks(2) {
            let hi = ok!(nibble(pair[0]));
            let lo = match pair.get(1) {
                Some(c) => ok!(nibble(*c)),
                None => 0,
            };
            data.push((hi << 4) | lo);
        }

        let mut bit_len = digits.len() as u16 * 4;
        if with_tag {
            // Strip trailing zeros and the tag bit itself
            while bit_len > 0 {
                bit_len -= 1;
                let byte = data[(bit_len / 8) as usize];
                if byte & (0x80 >> (bit_len % 8)) != 0 {
                    break;
                }
            }

            data.truncate((bit_len as usize + 7) / 8);
            let rem = bit_len % 8;
            if let Some(last) = data.last_mut() {
                if rem != 0 {
                    *last &= 0xff << (8 - rem);
                }
            }
        }

        Ok((data, bit_len))
    }
}

impl std::fmt::Display for Bitstring<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bit_len = std::cmp::min(self.bit_len as usize, self.bytes.len() * 8);
        let full_bytes = bit_len / 8;

        for byte in &self.bytes[..full_bytes] {
            ok!(write!(f, "{byte:02x}"));
        }

        let rem = bit_len % 8;
        if rem == 0 {
            return Ok(());
        }

        // Append the completion tag right after the data bits
        let tag_mask: u8 = 0x80 >> rem;
        let last = (self.bytes[full_bytes] & !(tag_mask | (tag_mask.wrapping_sub(1)))) | tag_mask;
        match rem {
            4 => write!(f, "{:x}", last >> 4),
            1..=3 => write!(f, "{:x}_", last >> 4),
            _ => write!(f, "{last:02x}_"),
        }
    }
}

impl std::fmt::Binary for Bitstring<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bit_len = std::cmp::min(self.bit_len as usize, self.bytes.len() * 8);
        for i in 0..bit_len {
            let bit = (self.bytes[i / 8] >> (7 - i % 8)) & 1;
            ok!(f.write_str(if bit != 0 { "1" } else { "0" }));
        }
        Ok(())
    }
}

use std::io::{self, Read};

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};
use log::warn;

use crate::error::Result;

/// Read exactly `len` bytes without trusting `len` for the allocation.
///
/// Lengths come straight from the file; a corrupt one must fail as a short
/// read instead of reserving gigabytes up front.
pub(crate) fn read_bytes<R: Read>(source: &mut R, len: u64) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    source.by_ref().take(len).read_to_end(&mut buf)?;
    if (buf.len() as u64) < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("wanted {} bytes, source had {}", len, buf.len()),
        )
        .into());
    }
    Ok(buf)
}

/// Width in bytes of one code unit (and of the string terminator).
pub(crate) fn unit_width(encoding: &'static Encoding) -> usize {
    if encoding == UTF_16LE || encoding == UTF_16BE {
        2
    } else {
        1
    }
}

/// Decode text, replacing malformed sequences.
pub(crate) fn decode_string(encoding: &'static Encoding, data: &[u8]) -> String {
    let (cow, had_errors) = encoding.decode_without_bom_handling(data);
    if had_errors {
        warn!("malformed {} text replaced while decoding", encoding.name());
    }
    cow.into_owned()
}

/// Position of the first all-zero code unit, in bytes.
pub(crate) fn find_terminator(data: &[u8], width: usize) -> Option<usize> {
    if width == 2 {
        data.chunks_exact(2)
            .position(|unit| unit == [0, 0])
            .map(|unit| unit * 2)
    } else {
        memchr::memchr(0, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MdictError;
    use encoding_rs::UTF_8;

    #[test]
    fn read_bytes_reports_short_reads() {
        let mut src: &[u8] = &[1, 2, 3];
        let err = read_bytes(&mut src, 10).unwrap_err();
        assert!(matches!(err, MdictError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn terminator_respects_unit_alignment() {
        // 0x00 straddling two units is not a terminator
        let data = [0x41, 0x00, 0x00, 0x42, 0x00, 0x00];
        assert_eq!(find_terminator(&data, 2), Some(4));
        assert_eq!(find_terminator(b"ab\0cd", 1), Some(2));
        assert_eq!(find_terminator(b"abc", 1), None);
    }

    #[test]
    fn unit_width_by_encoding() {
        assert_eq!(unit_width(UTF_16LE), 2);
        assert_eq!(unit_width(UTF_8), 1);
    }
}

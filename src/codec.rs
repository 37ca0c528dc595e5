//! Stored block framing: `[u8 method][3 reserved][u32 BE adler32][payload]`.

use std::borrow::Cow;
use std::io::Read;

use adler::adler32_slice;
use byteorder::{BigEndian, ByteOrder};
use flate2::read::ZlibDecoder;
use log::trace;
use rust_lzo::{LZOContext, LZOError};

use crate::crypto;
use crate::error::{MdictError, Result};
use crate::utils::read_bytes;

/// Bytes of method word plus checksum word preceding every payload.
pub const FRAME_LEN: u64 = 8;

/// An LZO1X run-length byte adds at most 255 output bytes, so no stream
/// yields more than this many bytes per input byte.
const LZO_MAX_EXPANSION: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Stored,
    Lzo,
    Deflate,
}

impl TryFrom<u8> for Compression {
    type Error = MdictError;

    fn try_from(method: u8) -> Result<Self> {
        match method {
            0 => Ok(Compression::Stored),
            1 => Ok(Compression::Lzo),
            2 => Ok(Compression::Deflate),
            other => Err(MdictError::UnsupportedCompression(other)),
        }
    }
}

/// Read one `comp_size`-byte block from the current position and decode it.
///
/// `encrypted` applies the nibble cipher (keyed from the checksum word) to
/// the payload before decompression.
pub fn decode_block<R: Read>(
    source: &mut R,
    comp_size: u64,
    decomp_size: u64,
    encrypted: bool,
) -> Result<Vec<u8>> {
    if comp_size < FRAME_LEN {
        return Err(MdictError::SizeMismatch {
            context: "block frame",
            expected: FRAME_LEN,
            found: comp_size,
        });
    }
    let raw = read_bytes(source, comp_size)?;
    decode_payload(&raw, decomp_size, encrypted)
}

/// Decode an in-memory framed block.
pub fn decode_payload(raw: &[u8], decomp_size: u64, encrypted: bool) -> Result<Vec<u8>> {
    if (raw.len() as u64) < FRAME_LEN {
        return Err(MdictError::SizeMismatch {
            context: "block frame",
            expected: FRAME_LEN,
            found: raw.len() as u64,
        });
    }
    // high nibble names a per-frame cipher; only clear frames are supported
    let cipher = raw[0] >> 4;
    if cipher != 0 {
        return Err(MdictError::UnsupportedEncryption(format!(
            "frame cipher {} (info byte {:#04x})",
            cipher, raw[0]
        )));
    }
    let compression = Compression::try_from(raw[0])?;
    let checksum_word = &raw[4..8];
    let expected = BigEndian::read_u32(checksum_word);
    let payload: Cow<[u8]> = if encrypted {
        Cow::Owned(crypto::fast_decrypt(&raw[8..], &crypto::index_key(checksum_word)))
    } else {
        Cow::Borrowed(&raw[8..])
    };
    trace!(
        "decoding {:?} block: {} payload bytes -> {} bytes",
        compression,
        payload.len(),
        decomp_size
    );

    let decoded = match compression {
        Compression::Stored => payload.into_owned(),
        Compression::Lzo => decompress_lzo(&payload, decomp_size)?,
        Compression::Deflate => inflate(&payload, decomp_size)?,
    };

    if decoded.len() as u64 != decomp_size {
        return Err(MdictError::SizeMismatch {
            context: "decoded block",
            expected: decomp_size,
            found: decoded.len() as u64,
        });
    }
    let actual = adler32_slice(&decoded);
    if actual != expected {
        return Err(MdictError::ChecksumMismatch {
            context: "decoded block",
            expected,
            actual,
        });
    }
    Ok(decoded)
}

fn decompress_lzo(payload: &[u8], decomp_size: u64) -> Result<Vec<u8>> {
    let reachable = (payload.len() as u64).saturating_mul(LZO_MAX_EXPANSION);
    let too_large = MdictError::SizeMismatch {
        context: "lzo stream",
        expected: decomp_size,
        found: reachable,
    };
    if decomp_size > reachable {
        return Err(too_large);
    }
    let len = usize::try_from(decomp_size).map_err(|_| too_large)?;
    let mut output = Vec::new();
    if output.try_reserve_exact(len).is_err() {
        return Err(MdictError::SizeMismatch {
            context: "lzo stream",
            expected: decomp_size,
            found: 0,
        });
    }
    output.resize(len, 0);
    let (produced, status) = {
        let (decoded, status) = LZOContext::decompress_to_slice(payload, &mut output);
        (decoded.len(), status)
    };
    if !matches!(status, LZOError::OK) {
        return Err(MdictError::SizeMismatch {
            context: "lzo stream",
            expected: decomp_size,
            found: produced as u64,
        });
    }
    output.truncate(produced);
    Ok(output)
}

fn inflate(payload: &[u8], decomp_size: u64) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    // one extra byte lets an over-long stream show up as a size mismatch
    let mut decoder = ZlibDecoder::new(payload).take(decomp_size.saturating_add(1));
    if decoder.read_to_end(&mut output).is_err() {
        return Err(MdictError::SizeMismatch {
            context: "deflate stream",
            expected: decomp_size,
            found: output.len() as u64,
        });
    }
    Ok(output)
}

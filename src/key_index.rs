//! Key index: size header, key-block-info table and the key blocks proper.

use std::collections::HashSet;
use std::io::{Cursor, Read, Seek, SeekFrom};

use adler::adler32_slice;
use byteorder::{BigEndian, ReadBytesExt};
use encoding_rs::Encoding;
use log::{debug, info, trace, warn};

use crate::codec;
use crate::crypto;
use crate::error::{MdictError, Result};
use crate::header::{ContainerKind, DictionaryHeader, Generation};
use crate::key_store::{KeyStore, KeyStoreBuilder};
use crate::utils::{decode_string, find_terminator, read_bytes, unit_width};

/// One row of the key-block-info table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBlockDescriptor {
    pub entry_count: u64,
    pub first_key: String,
    pub last_key: String,
    pub comp_size: u64,
    pub decomp_size: u64,
    /// File offset of the block's frame.
    pub physical_start: u64,
}

/// The fixed-size header in front of the key-block-info table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeHeader {
    pub num_blocks: u64,
    pub num_entries: u64,
    /// Absent under `V1`, whose table is stored uncompressed.
    pub info_decomp_len: Option<u64>,
    pub info_comp_len: u64,
    pub key_blocks_len: u64,
}

impl SizeHeader {
    fn byte_len(generation: Generation) -> u64 {
        match generation {
            Generation::V1 => 4 * 4,
            Generation::V2 => 5 * 8,
        }
    }

    fn parse(generation: Generation, raw: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(raw);
        let num_blocks = generation.read_number(&mut cursor)?;
        let num_entries = generation.read_number(&mut cursor)?;
        let info_decomp_len = match generation {
            Generation::V1 => None,
            Generation::V2 => Some(generation.read_number(&mut cursor)?),
        };
        let info_comp_len = generation.read_number(&mut cursor)?;
        let key_blocks_len = generation.read_number(&mut cursor)?;
        Ok(SizeHeader {
            num_blocks,
            num_entries,
            info_decomp_len,
            info_comp_len,
            key_blocks_len,
        })
    }
}

/// Everything the key index contributes to a loaded dictionary.
#[derive(Debug)]
pub struct KeyIndex {
    pub sizes: SizeHeader,
    pub store: KeyStore,
    pub blocks: Vec<KeyBlockDescriptor>,
    /// Every distinct logical offset, ascending.
    pub offsets: Vec<u64>,
    /// Stream offset of the record section.
    pub key_blocks_end: u64,
}

/// Decode the key index that starts at `header.key_index_start()`.
pub fn decode<R: Read + Seek>(
    source: &mut R,
    header: &DictionaryHeader,
    kind: ContainerKind,
    password: Option<&[u8]>,
) -> Result<KeyIndex> {
    let generation = header.generation();
    let encoding = header.encoding();
    source.seek(SeekFrom::Start(header.key_index_start()))?;

    let sizes = read_size_header(source, header, password)?;
    debug!("key index sizes: {:?}", sizes);

    let info = match sizes.info_decomp_len {
        None => read_bytes(source, sizes.info_comp_len)?,
        Some(decomp_len) => codec::decode_block(
            source,
            sizes.info_comp_len,
            decomp_len,
            header.encryption().index_encrypted(),
        )?,
    };
    let key_blocks_start = source.stream_position()?;
    let blocks = parse_block_info(&info, generation, encoding, kind, key_blocks_start)?;
    if blocks.len() as u64 != sizes.num_blocks {
        return Err(MdictError::KeyCountMismatch {
            context: "key block descriptors",
            expected: sizes.num_blocks,
            found: blocks.len() as u64,
        });
    }
    let comp_total = blocks
        .iter()
        .try_fold(0u64, |total, b| total.checked_add(b.comp_size));
    if comp_total != Some(sizes.key_blocks_len) {
        return Err(MdictError::BlockSizeMismatch {
            expected: sizes.key_blocks_len,
            found: comp_total.unwrap_or(u64::MAX),
        });
    }

    let mut builder = KeyStoreBuilder::new();
    let mut seen = HashSet::new();
    let mut offsets = Vec::new();
    for (i, block) in blocks.iter().enumerate() {
        let data = codec::decode_block(source, block.comp_size, block.decomp_size, false)?;
        let entries = split_key_block(&data, generation, encoding)?;
        trace!("key block {}: {} entries", i, entries.len());
        if entries.len() as u64 != block.entry_count {
            return Err(MdictError::KeyCountMismatch {
                context: "key block",
                expected: block.entry_count,
                found: entries.len() as u64,
            });
        }
        for (offset, key) in entries {
            let key = match kind {
                ContainerKind::Resource => key.replace('\\', "/"),
                ContainerKind::Text => key,
            };
            let key = disambiguate(&mut seen, key);
            builder.insert(&key, offset);
            offsets.push(offset);
        }
    }

    if offsets.len() as u64 != sizes.num_entries {
        return Err(MdictError::KeyCountMismatch {
            context: "key index",
            expected: sizes.num_entries,
            found: offsets.len() as u64,
        });
    }
    offsets.sort_unstable();
    offsets.dedup();

    let key_blocks_end = key_blocks_start
        .checked_add(sizes.key_blocks_len)
        .ok_or_else(|| {
            MdictError::InvalidFormat(format!(
                "key blocks of {} bytes at offset {} overflow the stream",
                sizes.key_blocks_len, key_blocks_start
            ))
        })?;
    info!(
        "key index decoded: {} blocks, {} entries",
        blocks.len(),
        sizes.num_entries
    );
    Ok(KeyIndex {
        sizes,
        store: builder.freeze(),
        blocks,
        offsets,
        key_blocks_end,
    })
}

fn read_size_header<R: Read>(
    source: &mut R,
    header: &DictionaryHeader,
    password: Option<&[u8]>,
) -> Result<SizeHeader> {
    let generation = header.generation();
    let mut raw = read_bytes(source, SizeHeader::byte_len(generation))?;
    if generation == Generation::V2 {
        if header.encryption().header_encrypted() {
            let password = password.ok_or_else(|| {
                MdictError::DecryptionFailure(
                    "key index header is encrypted and no password was supplied".to_owned(),
                )
            })?;
            crypto::salsa20_8(&mut raw, password)?;
        }
        let expected = source.read_u32::<BigEndian>()?;
        let actual = adler32_slice(&raw);
        if expected != actual {
            return Err(MdictError::ChecksumMismatch {
                context: "key index header",
                expected,
                actual,
            });
        }
    }
    SizeHeader::parse(generation, &raw)
}

fn parse_block_info(
    info: &[u8],
    generation: Generation,
    encoding: &'static Encoding,
    kind: ContainerKind,
    mut physical_start: u64,
) -> Result<Vec<KeyBlockDescriptor>> {
    let mut cursor = Cursor::new(info);
    let mut blocks = Vec::new();
    while cursor.position() < info.len() as u64 {
        let entry_count = generation.read_number(&mut cursor)?;
        let first_key = read_info_key(&mut cursor, generation, encoding, kind)?;
        let last_key = read_info_key(&mut cursor, generation, encoding, kind)?;
        let comp_size = generation.read_number(&mut cursor)?;
        let decomp_size = generation.read_number(&mut cursor)?;
        blocks.push(KeyBlockDescriptor {
            entry_count,
            first_key,
            last_key,
            comp_size,
            decomp_size,
            physical_start,
        });
        physical_start = physical_start.checked_add(comp_size).ok_or_else(|| {
            MdictError::InvalidFormat(format!(
                "key block {} of {} bytes overflows the stream",
                blocks.len(),
                comp_size
            ))
        })?;
    }
    Ok(blocks)
}

fn read_info_key(
    cursor: &mut Cursor<&[u8]>,
    generation: Generation,
    encoding: &'static Encoding,
    kind: ContainerKind,
) -> Result<String> {
    let width = unit_width(encoding) as u64;
    let units = generation.read_key_length(cursor)?;
    let raw = read_bytes(cursor, (units + generation.key_terminator_units()) * width)?;
    let key = decode_string(encoding, &raw[..(units * width) as usize]);
    Ok(match kind {
        ContainerKind::Resource => key.replace('\\', "/"),
        ContainerKind::Text => key,
    })
}

/// Split a decoded key block into `(offset, key)` entries.
fn split_key_block(
    data: &[u8],
    generation: Generation,
    encoding: &'static Encoding,
) -> Result<Vec<(u64, String)>> {
    let number_width = generation.number_width() as usize;
    let width = unit_width(encoding);
    let mut entries = Vec::new();
    let mut position = 0;
    while position < data.len() {
        let mut number = data.get(position..position + number_width).ok_or_else(|| {
            MdictError::InvalidFormat(format!("truncated key entry at byte {}", position))
        })?;
        let offset = generation.read_number(&mut number)?;
        let text_start = position + number_width;
        let rest = &data[text_start..];
        let (text_len, next) = match find_terminator(rest, width) {
            Some(end) => (end, text_start + end + width),
            None => (rest.len(), data.len()),
        };
        entries.push((offset, decode_string(encoding, &rest[..text_len])));
        position = next;
    }
    Ok(entries)
}

/// Give an exact repeat of an earlier key the first free numeric suffix.
fn disambiguate(seen: &mut HashSet<String>, key: String) -> String {
    if seen.insert(key.clone()) {
        return key;
    }
    let renamed = (1u64..)
        .map(|n| format!("{}{}", key, n))
        .find(|candidate| !seen.contains(candidate))
        .unwrap_or_else(|| key.clone());
    warn!("duplicate key {:?} stored as {:?}", key, renamed);
    seen.insert(renamed.clone());
    renamed
}

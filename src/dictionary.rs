//! Loaded dictionary: the decoded indexes plus a handle on the file body.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use encoding_rs::{Encoding, UTF_16BE};
use log::{info, warn};

use crate::codec;
use crate::error::{MdictError, Result};
use crate::header::{self, ContainerKind, DictionaryHeader};
use crate::key_index::{self, KeyBlockDescriptor};
use crate::key_store::KeyStore;
use crate::options::Options;
use crate::record_index::{RecordBlockDescriptor, RecordIndex};
use crate::utils::{decode_string, unit_width};

/// Everything decoded at load time. Immutable afterwards.
#[derive(Debug)]
struct Index {
    header: DictionaryHeader,
    kind: ContainerKind,
    store: KeyStore,
    key_blocks: Vec<KeyBlockDescriptor>,
    records: RecordIndex,
    offsets: Vec<u64>,
}

/// A read-only `.mdx` or `.mdd` container.
///
/// Queries take `&self`; block reads serialize on the source lock. Use
/// [`Dictionary::with_source`] to give another thread its own handle over
/// the same decoded index.
#[derive(Debug)]
pub struct Dictionary<R> {
    index: Arc<Index>,
    source: Mutex<R>,
}

impl Dictionary<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P, password: Option<&[u8]>) -> Result<Self> {
        let mut options = Options::new();
        if let Some(password) = password {
            options = options.password(password);
        }
        Self::open_with(path, &options)
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: &Options) -> Result<Self> {
        let path = path.as_ref();
        let options = Options {
            kind: Some(options.kind_for(path)),
            ..options.clone()
        };
        info!("opening {}", path.display());
        Self::load(BufReader::new(File::open(path)?), &options)
    }

    /// A new handle on `path` sharing this dictionary's decoded index.
    pub fn reopen<P: AsRef<Path>>(&self, path: P) -> Result<Self> {
        Ok(self.with_source(BufReader::new(File::open(path)?)))
    }
}

impl<R: Read + Seek> Dictionary<R> {
    /// Decode header, key index and record index from `source`.
    ///
    /// The container kind defaults to text when `options` leaves it unset.
    pub fn load(mut source: R, options: &Options) -> Result<Self> {
        let kind = options.kind.unwrap_or(ContainerKind::Text);
        let header = header::parse(&mut source, kind, options.encoding.as_deref())?;
        let keys = key_index::decode(&mut source, &header, kind, options.password.as_deref())?;

        source.seek(SeekFrom::Start(keys.key_blocks_end))?;
        let records = RecordIndex::decode(&mut source, header.generation())?;
        if records.num_entries() != keys.sizes.num_entries {
            warn!(
                "record index declares {} entries, key index {}",
                records.num_entries(),
                keys.sizes.num_entries
            );
        }

        info!(
            "loaded {:?} container {:?}: {} keys, {} record blocks",
            kind,
            header.title(),
            keys.store.len(),
            records.len()
        );
        Ok(Dictionary {
            index: Arc::new(Index {
                header,
                kind,
                store: keys.store,
                key_blocks: keys.blocks,
                records,
                offsets: keys.offsets,
            }),
            source: Mutex::new(source),
        })
    }

    /// Share the decoded index with a second, independent byte source.
    pub fn with_source<S: Read + Seek>(&self, source: S) -> Dictionary<S> {
        Dictionary {
            index: Arc::clone(&self.index),
            source: Mutex::new(source),
        }
    }

    pub fn entries_for(&self, word: &str) -> Vec<(&str, u64)> {
        self.index.store.lookup(word)
    }

    pub fn entries_predictive(&self, prefix: &str) -> Vec<(&str, u64)> {
        self.index.store.lookup_predictive(prefix)
    }

    /// The article line stored at `offset`.
    pub fn text_for(&self, offset: u64) -> Result<String> {
        if self.index.kind == ContainerKind::Resource {
            return Err(MdictError::IllegalState("text lookup on a resource container"));
        }
        let (block, data) = self.block_for(offset)?;
        let tail = &data[(offset - block.logical_start) as usize..];
        let encoding = self.index.header.encoding();
        let end = line_end(tail, encoding).unwrap_or(tail.len());
        let text = decode_string(encoding, &tail[..end]);
        Ok(match text.strip_suffix('\r') {
            Some(line) => line.to_owned(),
            None => text,
        })
    }

    /// The blob stored at `offset`: up to the next key's offset, or to the
    /// end of the owning block. Resource containers only.
    pub fn data_for(&self, offset: u64) -> Result<Vec<u8>> {
        if self.index.kind == ContainerKind::Text {
            return Err(MdictError::IllegalState("byte lookup on a text container"));
        }
        let (block, data) = self.block_for(offset)?;
        let block_end = block.logical_end();
        let offsets = &self.index.offsets;
        let end = offsets
            .get(offsets.partition_point(|&o| o <= offset))
            .map_or(block_end, |&next| next.min(block_end));
        let start = (offset - block.logical_start) as usize;
        Ok(data[start..(end - block.logical_start) as usize].to_vec())
    }

    /// Every article under `word`, with the key it was found under.
    pub fn articles_for(&self, word: &str) -> Result<Vec<(&str, String)>> {
        self.resolve_rows(self.entries_for(word))
    }

    pub fn articles_predictive(&self, prefix: &str) -> Result<Vec<(&str, String)>> {
        self.resolve_rows(self.entries_predictive(prefix))
    }

    /// The resource stored under exactly `path`. Backslashes count as `/`.
    pub fn resource(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let path = path.replace('\\', "/");
        match self.index.store.get(&path) {
            Some(value) => match value.offsets().first() {
                Some(&offset) => self.data_for(offset).map(Some),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    pub fn header(&self) -> &DictionaryHeader {
        &self.index.header
    }

    pub fn kind(&self) -> ContainerKind {
        self.index.kind
    }

    pub fn key_store(&self) -> &KeyStore {
        &self.index.store
    }

    pub fn key_blocks(&self) -> &[KeyBlockDescriptor] {
        &self.index.key_blocks
    }

    pub fn record_index(&self) -> &RecordIndex {
        &self.index.records
    }

    /// Number of stored keys, lower-case aliases included.
    pub fn len(&self) -> usize {
        self.index.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.store.is_empty()
    }

    fn resolve_rows<'a>(&'a self, rows: Vec<(&'a str, u64)>) -> Result<Vec<(&'a str, String)>> {
        rows.into_iter()
            .map(|(key, offset)| Ok((key, self.text_for(offset)?)))
            .collect()
    }

    fn block_for(&self, offset: u64) -> Result<(RecordBlockDescriptor, Vec<u8>)> {
        let i = self.index.records.resolve(offset)?;
        let block = *self
            .index
            .records
            .block(i)
            .ok_or(MdictError::OffsetOutOfRange {
                offset,
                limit: self.index.records.logical_len(),
            })?;
        let mut source = self.lock()?;
        source.seek(SeekFrom::Start(block.physical_start))?;
        let data = codec::decode_block(&mut *source, block.comp_size, block.decomp_size, false)?;
        Ok((block, data))
    }

    fn lock(&self) -> Result<MutexGuard<'_, R>> {
        self.source.lock().map_err(|_| MdictError::LockPoisoned)
    }
}

/// Byte length of the first line in `data`: up to NUL or newline, in whole
/// code units.
fn line_end(data: &[u8], encoding: &'static Encoding) -> Option<usize> {
    if unit_width(encoding) == 2 {
        let newline: [u8; 2] = if encoding == UTF_16BE { [0, b'\n'] } else { [b'\n', 0] };
        data.chunks_exact(2)
            .position(|unit| unit == [0, 0] || unit == newline)
            .map(|unit| unit * 2)
    } else {
        memchr::memchr2(0, b'\n', data)
    }
}

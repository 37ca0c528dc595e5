//! Record section index: per-block sizes and their cumulative offsets.

use std::io::{Read, Seek};

use log::{debug, info};

use crate::error::{MdictError, Result};
use crate::header::Generation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordBlockDescriptor {
    pub comp_size: u64,
    pub decomp_size: u64,
    /// File offset of the block's frame.
    pub physical_start: u64,
    /// Offset of the block's first byte in the decompressed record stream.
    pub logical_start: u64,
}

impl RecordBlockDescriptor {
    pub fn logical_end(&self) -> u64 {
        self.logical_start + self.decomp_size
    }
}

#[derive(Debug, Clone)]
pub struct RecordIndex {
    blocks: Vec<RecordBlockDescriptor>,
    num_entries: u64,
    logical_end: u64,
    physical_end: u64,
}

impl RecordIndex {
    /// Read the record index starting at the current stream position.
    pub fn decode<R: Read + Seek>(source: &mut R, generation: Generation) -> Result<Self> {
        let num_blocks = generation.read_number(source)?;
        let num_entries = generation.read_number(source)?;
        let index_len = generation.read_number(source)?;
        let blocks_len = generation.read_number(source)?;
        debug!(
            "record index: blocks={} entries={} index={} bytes data={} bytes",
            num_blocks, num_entries, index_len, blocks_len
        );

        let index_start = source.stream_position()?;
        let index_end = index_start
            .checked_add(index_len)
            .ok_or(MdictError::WrongIndexSize {
                expected: u64::MAX,
                found: index_start,
            })?;
        let mut sizes = Vec::new();
        for _ in 0..num_blocks {
            let comp_size = generation.read_number(source)?;
            let decomp_size = generation.read_number(source)?;
            sizes.push((comp_size, decomp_size));
        }

        let position = source.stream_position()?;
        if position != index_end {
            return Err(MdictError::WrongIndexSize {
                expected: index_end,
                found: position,
            });
        }
        let declared_end = index_end.checked_add(blocks_len);
        let index = Self::from_sizes(index_end, &sizes, num_entries).ok_or(
            MdictError::WrongIndexPosition {
                expected: declared_end.unwrap_or(u64::MAX),
                found: u64::MAX,
            },
        )?;
        if declared_end != Some(index.physical_end) {
            return Err(MdictError::WrongIndexPosition {
                expected: declared_end.unwrap_or(u64::MAX),
                found: index.physical_end,
            });
        }

        info!(
            "record index decoded: {} blocks, {} decompressed bytes",
            index.blocks.len(),
            index.logical_end
        );
        Ok(index)
    }

    /// Lay out blocks of the given `(comp_size, decomp_size)` back to back
    /// from file offset `base`. `None` when either running total overflows.
    pub(crate) fn from_sizes(base: u64, sizes: &[(u64, u64)], num_entries: u64) -> Option<Self> {
        let mut blocks = Vec::with_capacity(sizes.len());
        let mut physical = base;
        let mut logical: u64 = 0;
        for &(comp_size, decomp_size) in sizes {
            blocks.push(RecordBlockDescriptor {
                comp_size,
                decomp_size,
                physical_start: physical,
                logical_start: logical,
            });
            physical = physical.checked_add(comp_size)?;
            logical = logical.checked_add(decomp_size)?;
        }
        Some(RecordIndex {
            blocks,
            num_entries,
            logical_end: logical,
            physical_end: physical,
        })
    }

    /// Index of the block holding `offset`.
    ///
    /// `offset` equal to the end of the stream resolves to the last block.
    pub fn resolve(&self, offset: u64) -> Result<usize> {
        if self.blocks.is_empty() || offset > self.logical_end {
            return Err(MdictError::OffsetOutOfRange {
                offset,
                limit: self.logical_end,
            });
        }
        if offset == self.logical_end {
            return Ok(self.blocks.len() - 1);
        }
        Ok(self.blocks.partition_point(|b| b.logical_start <= offset) - 1)
    }

    pub fn block(&self, index: usize) -> Option<&RecordBlockDescriptor> {
        self.blocks.get(index)
    }

    pub fn blocks(&self) -> &[RecordBlockDescriptor] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Entry count declared by the record index header.
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Total decompressed size of the record stream.
    pub fn logical_len(&self) -> u64 {
        self.logical_end
    }

    pub fn physical_end(&self) -> u64 {
        self.physical_end
    }
}

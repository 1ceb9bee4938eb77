use std::collections::HashMap;

use super::BocTag;
use crate::cell::{CellDescriptor, DynCell, HashBytes, RefsIter};

/// Preparsed BOC header.
///
/// Cells are collected in reversed topological order: every cell is
/// added after all of its children, so writing them backwards puts
/// parents before children.
pub struct BocHeader<'a> {
    root_rev_indices: Vec<u32>,
    rev_indices: HashMap<&'a HashBytes, u32, ahash::RandomState>,
    rev_cells: Vec<&'a DynCell>,
    rev_ref_counts: Vec<u32>,
    total_data_size: u64,
    reference_count: u64,
    cell_count: u32,
    include_crc: bool,
    include_index: bool,
    include_cache_bits: bool,
}

impl<'a> BocHeader<'a> {
    /// Creates an empty header without roots.
    pub fn new() -> Self {
        Self {
            root_rev_indices: Vec::new(),
            rev_indices: Default::default(),
            rev_cells: Vec::new(),
            rev_ref_counts: Vec::new(),
            total_data_size: 0,
            reference_count: 0,
            cell_count: 0,
            include_crc: false,
            include_index: false,
            include_cache_bits: false,
        }
    }

    /// Creates a header with a single root.
    pub fn with_root(root: &'a DynCell) -> Self {
        let mut res = Self::new();
        res.add_root(root);
        res
    }

    /// Adds a new root to the header. Shared subtrees are stored once.
    pub fn add_root(&mut self, root: &'a DynCell) {
        let root_rev_index = self.fill(root);
        self.count_ref(root_rev_index);
        self.root_rev_indices.push(root_rev_index);
    }

    /// Whether to append a CRC-32C checksum.
    #[inline]
    pub fn with_crc(mut self, include_crc: bool) -> Self {
        self.include_crc = include_crc;
        self
    }

    /// Whether to write the table of cell end offsets.
    #[inline]
    pub fn with_index(mut self, include_index: bool) -> Self {
        self.include_index = include_index;
        self
    }

    /// Whether to mark cells referenced more than once in the index.
    ///
    /// Has no effect without the index.
    #[inline]
    pub fn with_cache_bits(mut self, include_cache_bits: bool) -> Self {
        self.include_cache_bits = include_cache_bits;
        self
    }

    /// Number of unique cells.
    pub fn cell_count(&self) -> u32 {
        self.cell_count
    }

    /// Encodes the cell tree into the target buffer.
    pub fn encode(self, target: &mut Vec<u8>) {
        let root_count = self.root_rev_indices.len();

        let ref_size = number_of_bytes_to_fit(self.cell_count as u64).max(1);
        let total_cells_size: u64 = self.total_data_size
            + (self.cell_count as u64 * 2) // all descriptor bytes
            + (ref_size as u64 * self.reference_count);
        let cache_bits = self.include_index && self.include_cache_bits;
        // Cache bits take the lowest bit of each index entry
        let max_offset = total_cells_size << u8::from(cache_bits);
        let offset_size = number_of_bytes_to_fit(max_offset).max(1);

        debug_assert!((1..=4).contains(&ref_size));
        debug_assert!((1..=8).contains(&offset_size));

        let flags = (ref_size as u8)
            | (u8::from(self.include_index) * 0b1000_0000)
            | (u8::from(self.include_crc) * 0b0100_0000)
            | (u8::from(cache_bits) * 0b0010_0000);

        // 4 bytes - BOC tag
        // 1 byte - flags
        // 1 byte - offset size
        // {ref_size} - cell count
        // {ref_size} - root count
        // {ref_size} - absent cell count
        // {offset_size} - total cells size
        // root_count * {ref_size} - root indices
        // include_index * cell_count * {offset_size} - cell end offsets
        // {total_cells_size} - cells
        // include_crc * 4 - optional CRC32
        let total_size = 4
            + 2
            + (ref_size as u64) * (3 + root_count as u64)
            + (offset_size as u64)
            + u64::from(self.include_index) * (self.cell_count as u64) * (offset_size as u64)
            + total_cells_size
            + u64::from(self.include_crc) * 4;

        let start = target.len();
        target.reserve(total_size as usize);

        target.extend_from_slice(&BocTag::Generic.to_bytes());
        target.extend_from_slice(&[flags, offset_size as u8]);
        target.extend_from_slice(&self.cell_count.to_be_bytes()[4 - ref_size..]);
        target.extend_from_slice(&(root_count as u32).to_be_bytes()[4 - ref_size..]);
        target.extend_from_slice(&[0; 4][4 - ref_size..]);
        target.extend_from_slice(&total_cells_size.to_be_bytes()[8 - offset_size..]);

        for rev_index in &self.root_rev_indices {
            let root_index = self.cell_count - rev_index - 1;
            target.extend_from_slice(&root_index.to_be_bytes()[4 - ref_size..]);
        }

        if self.include_index {
            let mut end_offset = 0u64;
            for (cell, ref_count) in self.rev_cells.iter().zip(&self.rev_ref_counts).rev() {
                let descriptor = cell.descriptor();
                end_offset += 2
                    + descriptor.byte_len() as u64
                    + (ref_size * descriptor.reference_count() as usize) as u64;

                let mut entry = end_offset;
                if cache_bits {
                    entry = (entry << 1) | u64::from(*ref_count > 1);
                }
                target.extend_from_slice(&entry.to_be_bytes()[8 - offset_size..]);
            }
        }

        for cell in self.rev_cells.iter().rev() {
            let descriptor = cell.descriptor();
            target.extend_from_slice(&[
                descriptor.d1 & !CellDescriptor::STORE_HASHES_MASK,
                descriptor.d2,
            ]);
            target.extend_from_slice(cell.data());
            for child in cell.references() {
                // Children are always added before their parents
                let rev_index = self
                    .rev_indices
                    .get(child.repr_hash())
                    .copied()
                    .unwrap_or_default();
                let index = self.cell_count - rev_index - 1;
                target.extend_from_slice(&index.to_be_bytes()[4 - ref_size..]);
            }
        }

        if self.include_crc {
            let crc = crc32c::crc32c(&target[start..]);
            target.extend_from_slice(&crc.to_le_bytes());
        }

        tracing::debug!(
            cells = self.cell_count,
            roots = root_count,
            size = target.len() - start,
            crc = self.include_crc,
            index = self.include_index,
            "encoded BOC"
        );
    }

    fn fill(&mut self, root: &'a DynCell) -> u32 {
        if let Some(index) = self.rev_indices.get(root.repr_hash()) {
            return *index;
        }

        let mut stack: Vec<RefsIter<'a>> = vec![root.references()];
        while let Some(children) = stack.last_mut() {
            match children.next() {
                Some(child) => {
                    if !self.rev_indices.contains_key(child.repr_hash()) {
                        stack.push(child.references());
                    }
                }
                None => {
                    let cell = children.cell();
                    stack.pop();
                    self.add_cell(cell);
                }
            }
        }

        self.rev_indices
            .get(root.repr_hash())
            .copied()
            .unwrap_or_default()
    }

    fn add_cell(&mut self, cell: &'a DynCell) {
        for child in cell.references() {
            if let Some(rev_index) = self.rev_indices.get(child.repr_hash()).copied() {
                self.count_ref(rev_index);
            }
        }

        self.rev_indices.insert(cell.repr_hash(), self.cell_count);
        self.rev_cells.push(cell);
        self.rev_ref_counts.push(0);

        let descriptor = cell.descriptor();
        self.total_data_size += descriptor.byte_len() as u64;
        self.reference_count += descriptor.reference_count() as u64;
        self.cell_count += 1;
    }

    fn count_ref(&mut self, rev_index: u32) {
        if let Some(count) = self.rev_ref_counts.get_mut(rev_index as usize) {
            *count = count.saturating_add(1);
        }
    }
}

impl Default for BocHeader<'_> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

fn number_of_bytes_to_fit(l: u64) -> usize {
    (8 - l.leading_zeros() / 8) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_to_fit() {
        assert_eq!(number_of_bytes_to_fit(0), 0);
        assert_eq!(number_of_bytes_to_fit(1), 1);
        assert_eq!(number_of_bytes_to_fit(255), 1);
        assert_eq!(number_of_bytes_to_fit(256), 2);
        assert_eq!(number_of_bytes_to_fit(u32::MAX as u64), 4);
        assert_eq!(number_of_bytes_to_fit(u32::MAX as u64 + 1), 5);
    }
}

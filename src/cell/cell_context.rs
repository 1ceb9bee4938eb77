use sha2::digest::Digest;
use smallvec::SmallVec;

use crate::cell::{
    Cell, CellDescriptor, CellType, HashBytes, LevelMask, MAX_DEPTH, MAX_REF_COUNT,
};
use crate::error::Error;
use crate::util::unlikely;

/// Cell finalization hook.
///
/// Every cell produced by a [`CellBuilder`] goes through the context,
/// so it can be used to intern or account for new cells.
///
/// [`CellBuilder`]: crate::cell::CellBuilder
pub trait CellContext {
    /// Builds a new cell from cell parts.
    fn finalize_cell(&self, cell: CellParts<'_>) -> Result<Cell, Error>;
}

/// Default cell context which just validates parts and allocates a new cell.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyCellContext;

impl CellContext for EmptyCellContext {
    #[inline]
    fn finalize_cell(&self, cell: CellParts<'_>) -> Result<Cell, Error> {
        let hashes = ok!(cell.compute_hashes());
        Ok(Cell::from_parts(cell, hashes))
    }
}

/// Partially assembled cell.
pub struct CellParts<'a> {
    /// Length of this cell's data in bits.
    pub bit_len: u16,

    /// Well-formed cell descriptor.
    pub descriptor: CellDescriptor,

    /// Bitwise OR of child level masks.
    pub children_mask: LevelMask,

    /// Array of child cells.
    ///
    /// NOTE: it is guaranteed that the length of the array is consistent
    /// with the descriptor.
    pub references: SmallVec<[Cell; MAX_REF_COUNT]>,

    /// Cell data slice (with completion tag if unaligned).
    pub data: &'a [u8],
}

/// Cell hashes and depths for each hash index.
pub(crate) type CellHashes = SmallVec<[(HashBytes, u16); 4]>;

const HASH_BITS: usize = 256;
const DEPTH_BITS: usize = 16;

impl CellParts<'_> {
    /// Validates cell and computes all hashes.
    ///
    /// Returns one entry per hash index of the cell level mask.
    /// Pruned branches also get their stored hashes in front.
    pub fn compute_hashes(&self) -> Result<CellHashes, Error> {
        let level_mask = self.descriptor.level_mask();
        let cell_type = if self.descriptor.is_exotic() {
            ok!(self.check_exotic(level_mask))
        } else {
            if unlikely(self.children_mask != level_mask) {
                return Err(Error::InvalidCell);
            }
            CellType::Ordinary
        };

        let mut hashes = CellHashes::new();
        if cell_type.is_pruned_branch() {
            ok!(self.read_stored_hashes(level_mask.level(), &mut hashes));
            // Pruned branches have only one own hash, computed over the full mask
            let own = ok!(self.hash_with_mask(level_mask, 0, None));
            hashes.push(own);
            return Ok(hashes);
        }

        // Merkle cells look one level deeper into their children
        let child_shift = cell_type.is_merkle() as u8;
        for level in 0..4 {
            if level == 0 || level_mask.contains(level) {
                let prev_hash = hashes.last().map(|(hash, _)| hash);
                let entry = ok!(self.hash_with_mask(
                    LevelMask::from_level(level),
                    level + child_shift,
                    prev_hash
                ));
                hashes.push(entry);
            }
        }
        Ok(hashes)
    }

    /// Checks exotic payload layout and returns its type.
    fn check_exotic(&self, level_mask: LevelMask) -> Result<CellType, Error> {
        let bit_len = self.bit_len as usize;
        let refs = self.references.len();
        let Some(cell_type) = self.data.first().copied().and_then(CellType::from_byte_exotic) else {
            return Err(Error::InvalidCell);
        };

        let (layout_ok, expected_mask) = match cell_type {
            // type, mask, level x (hash, depth)
            CellType::PrunedBranch => {
                let level = level_mask.level() as usize;
                let stored_mask = self.data.get(1).copied().unwrap_or_default();
                let ok = level > 0
                    && refs == 0
                    && bit_len == 16 + level * (HASH_BITS + DEPTH_BITS)
                    && level_mask == stored_mask;
                (ok, level_mask)
            }
            // type, hash, depth
            CellType::MerkleProof => (
                refs == 1 && bit_len == 8 + HASH_BITS + DEPTH_BITS,
                self.children_mask.virtualize(1),
            ),
            // type, 2 x (hash, depth)
            CellType::MerkleUpdate => (
                refs == 2 && bit_len == 8 + 2 * (HASH_BITS + DEPTH_BITS),
                self.children_mask.virtualize(1),
            ),
            // type, hash
            CellType::LibraryReference => (refs == 0 && bit_len == 8 + HASH_BITS, LevelMask::EMPTY),
            CellType::Ordinary => (false, level_mask),
        };

        if unlikely(!layout_ok || expected_mask != level_mask) {
            return Err(Error::InvalidCell);
        }
        Ok(cell_type)
    }

    /// Copies hashes and depths of the original cell from the pruned branch data.
    fn read_stored_hashes(&self, level: u8, hashes: &mut CellHashes) -> Result<(), Error> {
        let level = level as usize;
        let (hash_bytes, depth_bytes) = self.data[2..].split_at(level * 32);
        for (hash, depth) in hash_bytes.chunks_exact(32).zip(depth_bytes.chunks_exact(2)) {
            let Some(hash) = HashBytes::from_slice(hash) else {
                return Err(Error::InvalidCell);
            };
            let depth = u16::from_be_bytes([depth[0], depth[1]]);
            if unlikely(depth > MAX_DEPTH) {
                return Err(Error::DepthOverflow);
            }
            hashes.push((hash, depth));
        }
        Ok(())
    }

    /// Hashes the cell representation for one level.
    ///
    /// Higher levels hash the previous level hash instead of the data.
    fn hash_with_mask(
        &self,
        level_mask: LevelMask,
        child_level: u8,
        prev_hash: Option<&HashBytes>,
    ) -> Result<(HashBytes, u16), Error> {
        let mut d1 = self.descriptor.d1;
        d1 &= !(CellDescriptor::LEVEL_MASK | CellDescriptor::STORE_HASHES_MASK);
        d1 |= u8::from(level_mask) << 5;

        let mut hasher = sha2::Sha256::new();
        hasher.update([d1, self.descriptor.d2]);
        match prev_hash {
            Some(prev_hash) => hasher.update(prev_hash.as_slice()),
            None => hasher.update(self.data),
        }

        let mut depth = 0;
        for child in &self.references {
            let child_depth = child.as_ref().depth(child_level);
            if unlikely(child_depth >= MAX_DEPTH) {
                return Err(Error::DepthOverflow);
            }
            depth = depth.max(child_depth + 1);
            hasher.update(child_depth.to_be_bytes());
        }
        for child in &self.references {
            hasher.update(child.as_ref().hash(child_level).as_slice());
        }

        Ok((hasher.finalize().into(), depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellBuilder, EMPTY_CELL_HASH};

    #[test]
    fn empty_cell_hash() {
        let parts = CellParts {
            bit_len: 0,
            descriptor: CellDescriptor::new([0, 0]),
            children_mask: LevelMask::EMPTY,
            references: SmallVec::new(),
            data: &[],
        };
        let hashes = parts.compute_hashes().unwrap();
        assert_eq!(hashes.len(), 1);
        assert_eq!(&hashes[0].0, EMPTY_CELL_HASH);
        assert_eq!(hashes[0].1, 0);
    }

    #[test]
    fn invalid_exotic_cells() {
        // Unknown exotic tag
        let parts = CellParts {
            bit_len: 8,
            descriptor: CellDescriptor::new([CellDescriptor::IS_EXOTIC_MASK, 2]),
            children_mask: LevelMask::EMPTY,
            references: SmallVec::new(),
            data: &[0x05],
        };
        assert_eq!(parts.compute_hashes().unwrap_err(), Error::InvalidCell);

        // Library cell with a wrong size
        let mut builder = CellBuilder::new();
        builder.set_exotic(true);
        builder.store_u8(CellType::LibraryReference.to_byte()).unwrap();
        builder.store_u32(0).unwrap();
        assert_eq!(builder.build().unwrap_err(), Error::InvalidCell);

        // Exotic cell without data
        let mut builder = CellBuilder::new();
        builder.set_exotic(true);
        assert_eq!(builder.build().unwrap_err(), Error::InvalidCell);
    }

    #[test]
    fn depth_overflow() {
        let mut cell = Cell::empty_cell();
        for _ in 0..MAX_DEPTH {
            let mut builder = CellBuilder::new();
            builder.store_reference(cell).unwrap();
            cell = builder.build().unwrap();
        }
        assert_eq!(cell.repr_depth(), MAX_DEPTH);
        assert!(cell.has_max_depth());

        let mut builder = CellBuilder::new();
        builder.store_reference(cell).unwrap();
        assert_eq!(builder.build().unwrap_err(), Error::DepthOverflow);
    }
}

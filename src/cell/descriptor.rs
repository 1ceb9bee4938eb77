use super::{CellType, LevelMask};

/// Two descriptor bytes of a cell.
///
/// ```text
/// d1 = refs_count + 8 * is_exotic + 16 * store_hashes + 32 * level_mask
/// d2 = floor(bit_len / 8) + ceil(bit_len / 8)
/// ```
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[repr(C)]
pub struct CellDescriptor {
    /// First descriptor byte with a generic info about cell.
    pub d1: u8,
    /// Second descriptor byte with a packed data size.
    pub d2: u8,
}

impl CellDescriptor {
    /// Bit mask to store the number of references in the descriptor.
    pub const REF_COUNT_MASK: u8 = 0b0000_0111;
    /// Bit mask to store the `is_exotic` flag in the descriptor.
    pub const IS_EXOTIC_MASK: u8 = 0b0000_1000;
    /// Bit mask to store the `store_hashes` flag in the descriptor.
    pub const STORE_HASHES_MASK: u8 = 0b0001_0000;
    /// Bit mask to store the level mask in the descriptor.
    pub const LEVEL_MASK: u8 = 0b1110_0000;

    /// Computes the first descriptor byte.
    #[inline(always)]
    pub const fn compute_d1(level_mask: LevelMask, is_exotic: bool, ref_count: u8) -> u8 {
        (level_mask.to_byte() << 5) | ((is_exotic as u8) << 3) | (ref_count & Self::REF_COUNT_MASK)
    }

    /// Computes the second descriptor byte.
    #[inline(always)]
    pub const fn compute_d2(bit_len: u16) -> u8 {
        (((bit_len >> 2) as u8) & !0b1) | ((bit_len % 8 != 0) as u8)
    }

    /// Constructs cell descriptor bytes.
    #[inline(always)]
    pub const fn new(bytes: [u8; 2]) -> Self {
        Self {
            d1: bytes[0],
            d2: bytes[1],
        }
    }

    /// Computes cell type.
    pub const fn cell_type(self) -> CellType {
        if self.d1 & Self::IS_EXOTIC_MASK == 0 {
            CellType::Ordinary
        } else {
            match self.d1 & Self::REF_COUNT_MASK {
                0 => {
                    // NOTE: zero mask <=> zero level
                    if self.d1 & Self::LEVEL_MASK == 0 {
                        CellType::LibraryReference
                    } else {
                        CellType::PrunedBranch
                    }
                }
                1 => CellType::MerkleProof,
                _ => CellType::MerkleUpdate,
            }
        }
    }

    /// Computes child cell count.
    #[inline(always)]
    pub const fn reference_count(self) -> u8 {
        self.d1 & Self::REF_COUNT_MASK
    }

    /// Computes hash count.
    ///
    /// NOTE: Guaranteed to be in range 1..=4.
    #[inline(always)]
    pub const fn hash_count(self) -> u8 {
        let level = self.level_mask().level();
        if self.is_exotic() && self.reference_count() == 0 && level > 0 {
            1 // pruned branch always has 1 hash
        } else {
            level + 1
        }
    }

    /// Returns whether the cell is not ordinary.
    #[inline(always)]
    pub const fn is_exotic(self) -> bool {
        self.d1 & Self::IS_EXOTIC_MASK != 0
    }

    /// Returns whether this cell is a pruned branch cell.
    #[inline(always)]
    pub const fn is_pruned_branch(self) -> bool {
        self.is_exotic() && self.reference_count() == 0 && !self.level_mask().is_empty()
    }

    /// Returns whether this cell refers to some external data.
    #[inline(always)]
    pub const fn is_library(self) -> bool {
        self.is_exotic() && self.reference_count() == 0 && self.level_mask().is_empty()
    }

    /// Returns whether this cell type is Merkle proof or Merkle update.
    #[inline(always)]
    pub const fn is_merkle(self) -> bool {
        self.is_exotic() && self.reference_count() != 0
    }

    /// Returns whether this cell is an absent cell of a legacy BOC.
    #[inline(always)]
    pub const fn is_absent(self) -> bool {
        self.d1 == (Self::REF_COUNT_MASK | Self::IS_EXOTIC_MASK)
    }

    /// Returns whether this cell should store hashes in data.
    #[inline(always)]
    pub const fn store_hashes(self) -> bool {
        self.d1 & Self::STORE_HASHES_MASK != 0
    }

    /// Computes level mask.
    #[inline(always)]
    pub const fn level_mask(self) -> LevelMask {
        LevelMask::new(self.d1 >> 5)
    }

    /// Returns whether this cell's data is 8-bit aligned.
    #[inline(always)]
    pub const fn is_aligned(self) -> bool {
        self.d2 & 1 == 0
    }

    /// Returns this cell's data length in bytes.
    #[inline(always)]
    pub const fn byte_len(self) -> u8 {
        (self.d2 & 1) + (self.d2 >> 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn d2_matches_bit_len() {
        for bit_len in 0..=1023u16 {
            let d2 = CellDescriptor::compute_d2(bit_len);
            assert_eq!(d2, (bit_len / 8) as u8 + ((bit_len + 7) / 8) as u8);

            let descriptor = CellDescriptor { d1: 0, d2 };
            assert_eq!(descriptor.byte_len() as u16, (bit_len + 7) / 8);
            assert_eq!(descriptor.is_aligned(), bit_len % 8 == 0);
        }
    }

    #[test]
    fn d1_layout() {
        let d1 = CellDescriptor::compute_d1(LevelMask::new(0b101), true, 1);
        let descriptor = CellDescriptor { d1, d2: 0 };
        assert_eq!(d1, 0b1010_1001);
        assert_eq!(descriptor.reference_count(), 1);
        assert!(descriptor.is_exotic());
        assert!(!descriptor.store_hashes());
        assert_eq!(descriptor.level_mask(), LevelMask::new(0b101));
        assert_eq!(descriptor.cell_type(), CellType::MerkleProof);

        let pruned = CellDescriptor::new([CellDescriptor::compute_d1(LevelMask::new(1), true, 0), 0]);
        assert!(pruned.is_pruned_branch());
        assert_eq!(pruned.hash_count(), 1);

        let library = CellDescriptor::new([CellDescriptor::compute_d1(LevelMask::EMPTY, true, 0), 0]);
        assert!(library.is_library());
        assert_eq!(library.cell_type(), CellType::LibraryReference);

        assert!(CellDescriptor::new([0b0000_1111, 0]).is_absent());
    }
}

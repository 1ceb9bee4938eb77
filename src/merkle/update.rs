use crate::cell::*;
use crate::error::Error;
use crate::util::unlikely;

/// Parsed Merkle update representation.
///
/// NOTE: Serialized into `MerkleUpdate` cell.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MerkleUpdate {
    /// Representation hash of the original cell.
    pub old_hash: HashBytes,
    /// Representation hash of the updated cell.
    pub new_hash: HashBytes,
    /// Representation depth of the original cell.
    pub old_depth: u16,
    /// Representation depth of the updated cell.
    pub new_depth: u16,
    /// Partially pruned tree with unchanged cells of the origin cell.
    #[cfg_attr(feature = "serde", serde(with = "crate::boc::Boc"))]
    pub old: Cell,
    /// Partially pruned tree with all cells that are not in the original cell.
    #[cfg_attr(feature = "serde", serde(with = "crate::boc::Boc"))]
    pub new: Cell,
}

impl Eq for MerkleUpdate {}
impl PartialEq for MerkleUpdate {
    fn eq(&self, other: &Self) -> bool {
        self.old_hash == other.old_hash
            && self.new_hash == other.new_hash
            && self.old_depth == other.old_depth
            && self.new_depth == other.new_depth
            && self.old.as_ref() == other.old.as_ref()
            && self.new.as_ref() == other.new.as_ref()
    }
}

impl Default for MerkleUpdate {
    fn default() -> Self {
        let empty_cell = Cell::empty_cell();
        Self {
            old_hash: *EMPTY_CELL_HASH,
            new_hash: *EMPTY_CELL_HASH,
            old_depth: 0,
            new_depth: 0,
            old: empty_cell.clone(),
            new: empty_cell,
        }
    }
}

impl<'a> Load<'a> for MerkleUpdate {
    fn load_from(s: &mut CellSlice<'a>) -> Result<Self, Error> {
        if unlikely(!s.has_remaining(Self::BITS, Self::REFS)) {
            return Err(Error::CellUnderflow);
        }

        if ok!(s.get_u8(0)) != CellType::MerkleUpdate.to_byte() {
            return Err(Error::InvalidTag);
        }

        let res = Self {
            old_hash: ok!(s.get_u256(8)),
            new_hash: ok!(s.get_u256(8 + 256)),
            old_depth: ok!(s.get_u16(8 + 256 * 2)),
            new_depth: ok!(s.get_u16(8 + 256 * 2 + 16)),
            old: ok!(s.get_reference_cloned(0)),
            new: ok!(s.get_reference_cloned(1)),
        };
        if unlikely(
            res.old.as_ref().hash(0) != &res.old_hash
                || res.old.as_ref().depth(0) != res.old_depth
                || res.new.as_ref().hash(0) != &res.new_hash
                || res.new.as_ref().depth(0) != res.new_depth,
        ) {
            return Err(Error::InvalidData);
        }

        ok!(s.skip_first(Self::BITS, Self::REFS));
        Ok(res)
    }
}

impl Store for MerkleUpdate {
    fn store_into(&self, b: &mut CellBuilder, _: &dyn CellContext) -> Result<(), Error> {
        if !b.has_capacity(Self::BITS, Self::REFS) {
            return Err(Error::CellOverflow);
        }

        b.set_exotic(true);
        ok!(b.store_u8(CellType::MerkleUpdate.to_byte()));
        ok!(b.store_u256(&self.old_hash));
        ok!(b.store_u256(&self.new_hash));
        ok!(b.store_u16(self.old_depth));
        ok!(b.store_u16(self.new_depth));
        ok!(b.store_reference(self.old.clone()));
        b.store_reference(self.new.clone())
    }
}

impl MerkleUpdate {
    /// The number of data bits that the Merkle update occupies.
    pub const BITS: u16 = 8 + (256 + 16) * 2;
    /// The number of references that the Merkle update occupies.
    pub const REFS: u8 = 2;

    /// Creates an update from two partially pruned trees.
    ///
    /// Hashes and depths are taken from level 0 of both trees.
    pub fn from_parts(old: Cell, new: Cell) -> Self {
        Self {
            old_hash: *old.as_ref().hash(0),
            new_hash: *new.as_ref().hash(0),
            old_depth: old.as_ref().depth(0),
            new_depth: new.as_ref().depth(0),
            old,
            new,
        }
    }
}

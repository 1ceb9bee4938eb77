use std::sync::{Arc, OnceLock};

use smallvec::SmallVec;

use super::cell_context::{CellHashes, CellParts};
use super::{
    CellContext, CellDescriptor, CellImpl, DynCell, EmptyCellContext, HashBytes, EMPTY_CELL_HASH,
    MAX_REF_COUNT,
};

/// Immutable data cell.
///
/// A thread-safe shared handle. Cloning only increments a refcount.
#[derive(Clone)]
#[repr(transparent)]
pub struct Cell(Arc<DynCell>);

impl Cell {
    /// Returns a cell context which validates and allocates new cells.
    #[inline]
    pub fn empty_context() -> &'static dyn CellContext {
        static EMPTY_CONTEXT: EmptyCellContext = EmptyCellContext;
        &EMPTY_CONTEXT
    }

    /// Returns a shared empty ordinary cell.
    pub fn empty_cell() -> Cell {
        static EMPTY_CELL: OnceLock<Cell> = OnceLock::new();
        EMPTY_CELL
            .get_or_init(|| Cell(Arc::new(EmptyOrdinaryCell)))
            .clone()
    }

    /// Returns a static reference to the empty cell.
    #[inline]
    pub fn empty_cell_ref() -> &'static DynCell {
        static EMPTY_CELL: EmptyOrdinaryCell = EmptyOrdinaryCell;
        &EMPTY_CELL
    }

    /// Returns a static reference to the cell with all zeros.
    #[inline]
    pub fn all_zeros_ref() -> &'static DynCell {
        static ALL_ZEROS_CELL: AllZerosCell = AllZerosCell;
        &ALL_ZEROS_CELL
    }

    /// Returns a static reference to the cell with all ones.
    #[inline]
    pub fn all_ones_ref() -> &'static DynCell {
        static ALL_ONES_CELL: AllOnesCell = AllOnesCell;
        &ALL_ONES_CELL
    }

    /// Creates a new cell from validated parts and computed hashes.
    pub(crate) fn from_parts(parts: CellParts<'_>, hashes: CellHashes) -> Self {
        Self(Arc::new(FinalizedCell {
            descriptor: parts.descriptor,
            bit_len: parts.bit_len,
            data: Box::from(parts.data),
            references: parts.references,
            hashes,
        }))
    }

    /// Returns whether two handles point to the same allocation.
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.0, &other.0)
    }
}

impl Default for Cell {
    #[inline]
    fn default() -> Self {
        Cell::empty_cell()
    }
}

impl std::ops::Deref for Cell {
    type Target = DynCell;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl AsRef<DynCell> for Cell {
    #[inline]
    fn as_ref(&self) -> &DynCell {
        self.0.as_ref()
    }
}

impl std::borrow::Borrow<DynCell> for Cell {
    #[inline]
    fn borrow(&self) -> &DynCell {
        self.0.as_ref()
    }
}

impl std::fmt::Debug for Cell {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self.0.as_ref(), f)
    }
}

impl Eq for Cell {}

impl PartialEq for Cell {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0.as_ref() == other.0.as_ref()
    }
}

impl std::hash::Hash for Cell {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.repr_hash().hash(state)
    }
}

/// Heap allocated cell with precomputed hashes.
struct FinalizedCell {
    descriptor: CellDescriptor,
    bit_len: u16,
    data: Box<[u8]>,
    references: SmallVec<[Cell; MAX_REF_COUNT]>,
    hashes: CellHashes,
}

impl FinalizedCell {
    #[inline]
    fn hash_entry(&self, level: u8) -> &(HashBytes, u16) {
        let index = self.descriptor.level_mask().hash_index(level) as usize;
        &self.hashes[std::cmp::min(index, self.hashes.len() - 1)]
    }
}

impl CellImpl for FinalizedCell {
    #[inline]
    fn descriptor(&self) -> CellDescriptor {
        self.descriptor
    }

    #[inline]
    fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    fn bit_len(&self) -> u16 {
        self.bit_len
    }

    #[inline]
    fn reference(&self, index: u8) -> Option<&DynCell> {
        Some(self.references.get(index as usize)?.as_ref())
    }

    #[inline]
    fn reference_cloned(&self, index: u8) -> Option<Cell> {
        self.references.get(index as usize).cloned()
    }

    #[inline]
    fn hash(&self, level: u8) -> &HashBytes {
        &self.hash_entry(level).0
    }

    #[inline]
    fn depth(&self, level: u8) -> u16 {
        self.hash_entry(level).1
    }
}

struct EmptyOrdinaryCell;

impl CellImpl for EmptyOrdinaryCell {
    #[inline]
    fn descriptor(&self) -> CellDescriptor {
        CellDescriptor::new([0, 0])
    }

    #[inline]
    fn data(&self) -> &[u8] {
        &[]
    }

    #[inline]
    fn bit_len(&self) -> u16 {
        0
    }

    #[inline]
    fn reference(&self, _: u8) -> Option<&DynCell> {
        None
    }

    #[inline]
    fn reference_cloned(&self, _: u8) -> Option<Cell> {
        None
    }

    #[inline]
    fn hash(&self, _: u8) -> &HashBytes {
        EMPTY_CELL_HASH
    }

    #[inline]
    fn depth(&self, _: u8) -> u16 {
        0
    }
}

struct AllZerosCell;

impl CellImpl for AllZerosCell {
    #[inline]
    fn descriptor(&self) -> CellDescriptor {
        CellDescriptor::new([0, 0xff])
    }

    #[inline]
    fn data(&self) -> &[u8] {
        &ALL_ZEROS_CELL_DATA
    }

    #[inline]
    fn bit_len(&self) -> u16 {
        1023
    }

    #[inline]
    fn reference(&self, _: u8) -> Option<&DynCell> {
        None
    }

    #[inline]
    fn reference_cloned(&self, _: u8) -> Option<Cell> {
        None
    }

    #[inline]
    fn hash(&self, _: u8) -> &HashBytes {
        HashBytes::wrap(&ALL_ZEROS_CELL_HASH)
    }

    #[inline]
    fn depth(&self, _: u8) -> u16 {
        0
    }
}

struct AllOnesCell;

impl CellImpl for AllOnesCell {
    #[inline]
    fn descriptor(&self) -> CellDescriptor {
        CellDescriptor::new([0, 0xff])
    }

    #[inline]
    fn data(&self) -> &[u8] {
        &ALL_ONES_CELL_DATA
    }

    #[inline]
    fn bit_len(&self) -> u16 {
        1023
    }

    #[inline]
    fn reference(&self, _: u8) -> Option<&DynCell> {
        None
    }

    #[inline]
    fn reference_cloned(&self, _: u8) -> Option<Cell> {
        None
    }

    #[inline]
    fn hash(&self, _: u8) -> &HashBytes {
        HashBytes::wrap(&ALL_ONES_CELL_HASH)
    }

    #[inline]
    fn depth(&self, _: u8) -> u16 {
        0
    }
}

const ALL_ZEROS_CELL_DATA: [u8; 128] = {
    let mut data = [0u8; 128];
    data[127] = 0x01;
    data
};

const ALL_ZEROS_CELL_HASH: [u8; 32] = [
    0xba, 0x03, 0x8d, 0x92, 0x4d, 0xa0, 0xb4, 0x2c, 0x44, 0x76, 0x62, 0xe6, 0xb8, 0xa5, 0x3f, 0x15,
    0x88, 0x9e, 0xbd, 0xf9, 0xd3, 0xb2, 0xf0, 0x1d, 0xbf, 0x94, 0x2c, 0x29, 0xbc, 0x48, 0x98, 0x71,
];

const ALL_ONES_CELL_DATA: [u8; 128] = [0xff; 128];

const ALL_ONES_CELL_HASH: [u8; 32] = [
    0x82, 0x97, 0x0d, 0x46, 0x64, 0xb7, 0x68, 0x3c, 0x3d, 0x14, 0xd4, 0x9b, 0x1f, 0x9f, 0xf3, 0x49,
    0x66, 0x12, 0x81, 0x70, 0x30, 0x1a, 0x7b, 0xec, 0xc2, 0x7a, 0xf1, 0xad, 0xbe, 0x6a, 0x31, 0xc9,
];

use smallvec::SmallVec;

use super::BocTag;
use crate::cell::{Cell, CellContext, CellDescriptor, CellParts, LevelMask, MAX_REF_COUNT};
use crate::util::{read_be_uint, unlikely};

/// Limits applied while decoding a BOC.
#[derive(Debug, Default, Clone)]
pub struct Options {
    /// Fewer roots give [`Error::TooFewRootCells`].
    pub min_roots: Option<usize>,
    /// More roots give [`Error::TooManyRootCells`]. Defaults to 32.
    pub max_roots: Option<usize>,
}

impl Options {
    /// Requires exactly `number` roots.
    pub const fn exact(number: usize) -> Self {
        Self {
            min_roots: Some(number),
            max_roots: Some(number),
        }
    }

    fn check_root_count(&self, root_count: u64) -> Result<(), Error> {
        let min = self.min_roots.unwrap_or(0) as u64;
        let max = self.max_roots.unwrap_or(MAX_ROOTS) as u64;
        if unlikely(root_count < min) {
            Err(Error::TooFewRootCells)
        } else if unlikely(root_count > max) {
            Err(Error::TooManyRootCells)
        } else {
            Ok(())
        }
    }
}

/// Validated BOC layout with borrowed cell records.
pub struct BocHeader<'a> {
    ref_size: usize,
    cells: Vec<RawCell<'a>>,
    roots: SmallVec<[u32; 2]>,
}

/// Serialized cell as it appears in the BOC.
#[derive(Clone, Copy)]
pub struct RawCell<'a> {
    pub descriptor: CellDescriptor,
    /// Data bytes, completion tag included.
    pub data: &'a [u8],
    /// Concatenated child indices of `ref_size` bytes each.
    pub refs: &'a [u8],
}

impl RawCell<'_> {
    fn bit_len(&self) -> u16 {
        let byte_len = self.data.len() as u16;
        match self.data.last() {
            Some(last) if !self.descriptor.is_aligned() => {
                byte_len * 8 - last.trailing_zeros() as u16 - 1
            }
            _ => byte_len * 8,
        }
    }
}

/// Fields of the fixed size BOC prefix.
struct Flags {
    has_index: bool,
    has_crc: bool,
    ref_size: usize,
    offset_size: usize,
    multiple_roots: bool,
}

impl Flags {
    fn read(reader: &mut BocReader<'_>) -> Result<Self, Error> {
        let Some(&[t0, t1, t2, t3, flags, offset_size]) = reader.read(6) else {
            return Err(Error::UnexpectedEof);
        };

        let (has_index, has_crc, has_cache_bits, ref_size, multiple_roots) =
            match BocTag::from_bytes([t0, t1, t2, t3]) {
                // Legacy tags store only the ref size in the flags byte
                Some(BocTag::Indexed) => (true, false, false, flags, false),
                Some(BocTag::IndexedCrc32) => (true, true, false, flags, false),
                Some(BocTag::Generic) => (
                    flags & 0x80 != 0,
                    flags & 0x40 != 0,
                    flags & 0x20 != 0,
                    flags & 0x07,
                    true,
                ),
                None => return Err(Error::UnknownBocTag),
            };

        if unlikely(has_cache_bits && !has_index) {
            return Err(Error::InvalidHeader);
        }
        if unlikely(!(1..=4).contains(&ref_size)) {
            return Err(Error::InvalidRefSize);
        }
        if unlikely(!(1..=8).contains(&offset_size)) {
            return Err(Error::InvalidOffsetSize);
        }

        Ok(Self {
            has_index,
            has_crc,
            ref_size: ref_size as usize,
            offset_size: offset_size as usize,
            multiple_roots,
        })
    }
}

impl<'a> BocHeader<'a> {
    /// Parses and validates the BOC layout without building cells.
    pub fn decode(data: &'a [u8], options: &Options) -> Result<Self, Error> {
        let mut reader = BocReader { data, offset: 0 };
        let flags = ok!(Flags::read(&mut reader));
        let ref_size = flags.ref_size;

        let (Some(cell_count), Some(root_count), Some(absent_count), Some(total_cells_size)) = (
            reader.read_uint(ref_size),
            reader.read_uint(ref_size),
            reader.read_uint(ref_size),
            reader.read_uint(flags.offset_size),
        ) else {
            return Err(Error::InvalidHeader);
        };

        if unlikely(root_count == 0) {
            return Err(Error::RootCellNotFound);
        }
        if unlikely(root_count > 1 && !flags.multiple_roots) {
            return Err(Error::UnexpectedMultipleRoots);
        }
        if unlikely(root_count.saturating_add(absent_count) > cell_count) {
            return Err(Error::TooManyRootCells);
        }
        if unlikely(absent_count != 0) {
            return Err(Error::AbsentCellsNotSupported);
        }
        ok!(options.check_root_count(root_count));

        // Each cell takes at least a descriptor and each non-root cell is referenced once.
        // At most it has all hashes stored, full data and four refs.
        // Counts are at most 4 bytes long, so nothing here overflows.
        let ref_size_u64 = ref_size as u64;
        let min_size = cell_count * (2 + ref_size_u64) - root_count * ref_size_u64;
        let max_size = cell_count * (2 + 4 * (2 + 32) + 128 + MAX_REF_COUNT as u64 * ref_size_u64);
        if unlikely(total_cells_size < min_size || total_cells_size > max_size) {
            return Err(Error::InvalidTotalSize);
        }

        let mut roots = SmallVec::with_capacity(root_count as usize);
        if flags.multiple_roots {
            for _ in 0..root_count {
                match reader.read_uint(ref_size) {
                    Some(index) if index < cell_count => roots.push(index as u32),
                    Some(_) => return Err(Error::RootOutOfBounds),
                    None => return Err(Error::UnexpectedEof),
                }
            }
        } else {
            roots.push(0);
        }

        let index_size = flags.has_index as u64 * cell_count * flags.offset_size as u64;
        let crc_size = flags.has_crc as u64 * 4;
        if unlikely(reader.remaining() < index_size + total_cells_size + crc_size) {
            return Err(Error::UnexpectedEof);
        }
        // Offsets are not needed for a full decode
        if reader.read(index_size as usize).is_none() {
            return Err(Error::UnexpectedEof);
        }

        let cells_start = reader.offset;
        let mut cells = Vec::with_capacity(cell_count as usize);
        for _ in 0..cell_count {
            cells.push(ok!(reader.read_cell(ref_size)));
        }
        if unlikely(cells_start as u64 + total_cells_size != reader.offset as u64) {
            return Err(Error::InvalidTotalSize);
        }

        if flags.has_crc {
            let crc_offset = reader.offset;
            let Some(&[c0, c1, c2, c3]) = reader.read(4) else {
                return Err(Error::UnexpectedEof);
            };
            if u32::from_le_bytes([c0, c1, c2, c3]) != crc32c::crc32c(&data[..crc_offset]) {
                return Err(Error::InvalidChecksum);
            }
        }

        Ok(Self {
            ref_size,
            cells,
            roots,
        })
    }

    /// Builds all cells through `context`, children first.
    pub fn finalize(&self, context: &dyn CellContext) -> Result<ProcessedCells, Error> {
        let cell_count = self.cells.len();

        let mut built: Vec<Cell> = Vec::new();
        if built.try_reserve_exact(cell_count).is_err() {
            return Err(Error::InvalidTotalSize);
        }

        for (index, raw) in self.cells.iter().enumerate().rev() {
            let mut references = SmallVec::<[Cell; MAX_REF_COUNT]>::new();
            let mut children_mask = LevelMask::EMPTY;

            for child_index in raw.refs.chunks_exact(self.ref_size) {
                let Some(child_index) = read_be_uint(child_index) else {
                    return Err(Error::InvalidRef);
                };
                let child_index = child_index as usize;
                if unlikely(child_index >= cell_count) {
                    return Err(Error::InvalidRef);
                }
                // Children are always serialized after parents
                if unlikely(child_index <= index) {
                    return Err(Error::InvalidRefOrder);
                }

                // `built` is filled from the last cell backwards
                let Some(child) = built.get(cell_count - child_index - 1) else {
                    return Err(Error::InvalidRefOrder);
                };
                children_mask |= child.descriptor().level_mask();
                references.push(child.clone());
            }

            let parts = CellParts {
                bit_len: raw.bit_len(),
                descriptor: raw.descriptor,
                children_mask,
                references,
                data: raw.data,
            };
            match context.finalize_cell(parts) {
                Ok(cell) => built.push(cell),
                Err(_) => return Err(Error::InvalidCell),
            }
        }

        Ok(ProcessedCells(built))
    }

    /// Size of a cell index in bytes, `1..=4`.
    pub fn ref_size(&self) -> usize {
        self.ref_size
    }

    pub fn cells(&self) -> &[RawCell<'a>] {
        &self.cells
    }

    pub fn roots(&self) -> &[u32] {
        &self.roots
    }
}

/// Cells built by [`BocHeader::finalize`], addressed by BOC index.
pub struct ProcessedCells(Vec<Cell>);

impl ProcessedCells {
    pub fn get(&self, index: u32) -> Option<Cell> {
        let rev_index = self.0.len().checked_sub(index as usize + 1)?;
        self.0.get(rev_index).cloned()
    }
}

struct BocReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> BocReader<'a> {
    fn remaining(&self) -> u64 {
        (self.data.len() - self.offset) as u64
    }

    fn peek(&self, len: usize) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(len)?;
        self.data.get(self.offset..end)
    }

    fn read(&mut self, len: usize) -> Option<&'a [u8]> {
        let bytes = self.peek(len)?;
        self.offset += len;
        Some(bytes)
    }

    fn read_uint(&mut self, size: usize) -> Option<u64> {
        read_be_uint(self.read(size)?)
    }

    /// Reads one serialized cell, skipping stored hashes.
    fn read_cell(&mut self, ref_size: usize) -> Result<RawCell<'a>, Error> {
        let Some(&[d1, d2]) = self.peek(2) else {
            return Err(Error::UnexpectedEof);
        };
        let descriptor = CellDescriptor::new([d1, d2]);
        if unlikely(descriptor.is_absent()) {
            return Err(Error::AbsentCellsNotSupported);
        }

        let ref_count = descriptor.reference_count() as usize;
        if unlikely(ref_count > MAX_REF_COUNT) {
            return Err(Error::InvalidRef);
        }

        let mut hashes_len = 0;
        if descriptor.store_hashes() {
            let level = descriptor.level_mask().level() as usize;
            // Pruned branches must not duplicate their hashes
            if unlikely(descriptor.is_exotic() && ref_count == 0 && level > 0) {
                return Err(Error::UnnormalizedCell);
            }
            hashes_len = (32 + 2) * (level + 1);
        }

        let data_len = descriptor.byte_len() as usize;
        let refs_len = ref_count * ref_size;
        let Some(bytes) = self.read(2 + hashes_len + data_len + refs_len) else {
            return Err(Error::UnexpectedEof);
        };
        let (data, refs) = bytes[2 + hashes_len..].split_at(data_len);

        // The completion tag must be in the last byte
        if let Some(&last) = data.last() {
            if unlikely(!descriptor.is_aligned() && last & 0x7f == 0) {
                return Err(Error::UnnormalizedCell);
            }
        }

        Ok(RawCell {
            descriptor,
            data,
            refs,
        })
    }
}

const MAX_ROOTS: usize = 32;

/// BOC decoding error.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("unexpected end of BOC")]
    UnexpectedEof,
    #[error("unknown BOC tag")]
    UnknownBocTag,
    #[error("invalid BOC header")]
    InvalidHeader,
    /// Ref size is zero or greater than 4 bytes.
    #[error("invalid ref size")]
    InvalidRefSize,
    /// Offset size is zero or greater than 8 bytes.
    #[error("invalid offset size")]
    InvalidOffsetSize,
    #[error("root cell not found")]
    RootCellNotFound,
    /// Legacy tags allow only one root.
    #[error("unexpected multiple roots")]
    UnexpectedMultipleRoots,
    #[error("too many root cells")]
    TooManyRootCells,
    #[error("absent cells are not supported")]
    AbsentCellsNotSupported,
    #[error("too few root cells")]
    TooFewRootCells,
    #[error("invalid total cells size")]
    InvalidTotalSize,
    #[error("root index out of bounds")]
    RootOutOfBounds,
    /// Child index is out of range or the cell has more than 4 refs.
    #[error("invalid cell reference")]
    InvalidRef,
    /// Non-canonical encoding (missing completion tag or duplicated hashes).
    #[error("unnormalized cell")]
    UnnormalizedCell,
    /// Child is stored before its parent, which can form loops.
    #[error("invalid children order")]
    InvalidRefOrder,
    #[error("invalid cell")]
    InvalidCell,
    #[error("CRC32C mismatch")]
    InvalidChecksum,
}

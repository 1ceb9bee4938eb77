use super::{
    Cell, CellBuilder, CellType, DynCell, HashBytes, LevelMask, Load, RefsIter, Size,
    MAX_BIT_LEN,
};
use crate::error::Error;
use crate::util::{unlikely, Bitstring};

/// Owned cell slice parts alias.
pub type CellSliceParts = (Cell, CellSliceRange);

impl<'a> Load<'a> for CellSlice<'a> {
    #[inline]
    fn load_from(slice: &mut CellSlice<'a>) -> Result<Self, Error> {
        Ok(slice.load_remaining())
    }
}

impl<'a> Load<'a> for &'a DynCell {
    #[inline]
    fn load_from(slice: &mut CellSlice<'a>) -> Result<Self, Error> {
        slice.load_reference()
    }
}

impl Load<'_> for Cell {
    #[inline]
    fn load_from(slice: &mut CellSlice<'_>) -> Result<Self, Error> {
        slice.load_reference_cloned()
    }
}

impl<'a, T: Load<'a>> Load<'a> for Option<T> {
    #[inline]
    fn load_from(slice: &mut CellSlice<'a>) -> Result<Self, Error> {
        let prev = *slice;
        if !ok!(slice.load_bit()) {
            return Ok(None);
        }
        match T::load_from(slice) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                *slice = prev;
                Err(e)
            }
        }
    }
}

impl Load<'_> for () {
    #[inline]
    fn load_from(_: &mut CellSlice<'_>) -> Result<Self, Error> {
        Ok(())
    }
}

macro_rules! impl_primitive_loads {
    ($($type:ty => |$s:ident| $expr:expr),*$(,)?) => {
        $(impl Load<'_> for $type {
            #[inline]
            fn load_from($s: &mut CellSlice) -> Result<Self, Error> {
                $expr
            }
        })*
    };
}

impl_primitive_loads! {
    bool => |s| s.load_bit(),
    u8 => |s| s.load_u8(),
    i8 => |s| Ok(ok!(s.load_u8()) as i8),
    u16 => |s| s.load_u16(),
    i16 => |s| Ok(ok!(s.load_u16()) as i16),
    u32 => |s| s.load_u32(),
    i32 => |s| Ok(ok!(s.load_u32()) as i32),
    u64 => |s| s.load_u64(),
    i64 => |s| Ok(ok!(s.load_u64()) as i64),
    u128 => |s| s.load_u128(),
    i128 => |s| Ok(ok!(s.load_u128()) as i128),
    HashBytes => |s| s.load_u256(),
}

impl<const N: usize> Load<'_> for [u8; N] {
    #[inline]
    fn load_from(slice: &mut CellSlice<'_>) -> Result<Self, Error> {
        let mut data = [0u8; N];
        ok!(slice.load_raw(&mut data, (N * 8) as u16));
        Ok(data)
    }
}

/// Indices of the slice data and refs windows.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct CellSliceRange {
    bits_start: u16,
    bits_end: u16,
    refs_start: u8,
    refs_end: u8,
}

impl CellSliceRange {
    /// Returns an empty slice range.
    pub const fn empty() -> Self {
        CellSliceRange {
            bits_start: 0,
            bits_end: 0,
            refs_start: 0,
            refs_end: 0,
        }
    }

    /// Returns a full range for the specified cell.
    pub fn full(cell: &DynCell) -> Self {
        Self {
            bits_start: 0,
            bits_end: cell.bit_len(),
            refs_start: 0,
            refs_end: cell.reference_count(),
        }
    }

    /// Constructs a new cell slice from the specified cell using the current range.
    /// Returns an error if the cell is pruned or the range is out of bounds.
    pub fn apply<T>(self, cell: &T) -> Result<CellSlice<'_>, Error>
    where
        T: AsRef<DynCell> + ?Sized,
    {
        let cell = cell.as_ref();
        ok!(check_ordinary(cell));

        if unlikely(self.bits_end > cell.bit_len() || self.refs_end > cell.reference_count()) {
            return Err(Error::CellUnderflow);
        }
        Ok(CellSlice { cell, range: self })
    }

    /// Constructs a new cell slice from the specified cell using the current range.
    /// Allows exotic cells.
    pub fn apply_allow_exotic<T>(self, cell: &T) -> Result<CellSlice<'_>, Error>
    where
        T: AsRef<DynCell> + ?Sized,
    {
        let cell = cell.as_ref();
        if unlikely(self.bits_end > cell.bit_len() || self.refs_end > cell.reference_count()) {
            return Err(Error::CellUnderflow);
        }
        Ok(CellSlice { cell, range: self })
    }

    /// Returns the number of remaining bits of data.
    #[inline]
    pub const fn size_bits(&self) -> u16 {
        self.bits_end.saturating_sub(self.bits_start)
    }

    /// Returns the number of remaining references.
    #[inline]
    pub const fn size_refs(&self) -> u8 {
        self.refs_end.saturating_sub(self.refs_start)
    }

    /// Returns the start of data window.
    #[inline]
    pub const fn offset_bits(&self) -> u16 {
        self.bits_start
    }

    /// Returns the start of refs window.
    #[inline]
    pub const fn offset_refs(&self) -> u8 {
        self.refs_start
    }

    /// Returns whether there are no data bits and refs left.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.bits_start >= self.bits_end && self.refs_start >= self.refs_end
    }
}

fn check_ordinary(cell: &DynCell) -> Result<(), Error> {
    let descriptor = cell.descriptor();
    if unlikely(descriptor.is_exotic()) {
        return Err(if descriptor.is_pruned_branch() {
            Error::PrunedBranchAccess
        } else {
            Error::UnexpectedExoticCell
        });
    }
    Ok(())
}

/// A read-only view for a subrange of a cell.
#[derive(Clone, Copy)]
pub struct CellSlice<'a> {
    cell: &'a DynCell,
    range: CellSliceRange,
}

impl Default for CellSlice<'_> {
    #[inline]
    fn default() -> Self {
        // SAFETY: empty cell is an ordinary cell
        unsafe { CellSlice::new_unchecked(Cell::empty_cell_ref()) }
    }
}

impl std::fmt::Debug for CellSlice<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellSlice")
            .field("range", &self.range)
            .field("cell", &self.cell)
            .finish()
    }
}

impl<'a> CellSlice<'a> {
    /// Constructs a new cell slice from the specified cell.
    /// Returns an error if the cell is not ordinary.
    pub fn new(cell: &'a DynCell) -> Result<Self, Error> {
        ok!(check_ordinary(cell));
        Ok(Self {
            range: CellSliceRange::full(cell),
            cell,
        })
    }

    /// Constructs a new cell slice from the specified cell without checking its type.
    pub fn new_allow_exotic(cell: &'a DynCell) -> Self {
        Self {
            range: CellSliceRange::full(cell),
            cell,
        }
    }

    /// Constructs a new cell slice from the specified cell.
    ///
    /// # Safety
    ///
    /// The following must be true:
    /// - cell is not pruned
    /// - range is in cell bounds
    pub unsafe fn new_unchecked(cell: &'a DynCell) -> Self {
        Self {
            range: CellSliceRange::full(cell),
            cell,
        }
    }

    /// Returns an underlying range indices.
    #[inline]
    pub const fn range(&self) -> CellSliceRange {
        self.range
    }

    /// Returns a reference to the underlying cell.
    #[inline]
    pub const fn cell(&self) -> &'a DynCell {
        self.cell
    }

    /// Computes cell type from descriptor bytes.
    #[inline]
    pub fn cell_type(&self) -> CellType {
        self.cell.cell_type()
    }

    /// Computes the cell level from the level mask.
    #[inline]
    pub fn level(&self) -> u8 {
        self.cell.level()
    }

    /// Computes the level mask from the descriptor bytes.
    #[inline]
    pub fn level_mask(&self) -> LevelMask {
        self.cell.level_mask()
    }

    /// Returns whether there are no data bits and refs left.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Returns whether there are no bits of data left.
    #[inline]
    pub const fn is_data_empty(&self) -> bool {
        self.range.bits_start >= self.range.bits_end
    }

    /// Returns whether there are no references left.
    #[inline]
    pub const fn is_refs_empty(&self) -> bool {
        self.range.refs_start >= self.range.refs_end
    }

    /// Returns the number of remaining bits of data in the slice.
    #[inline]
    pub const fn size_bits(&self) -> u16 {
        self.range.size_bits()
    }

    /// Returns the number of remaining references in the slice.
    #[inline]
    pub const fn size_refs(&self) -> u8 {
        self.range.size_refs()
    }

    /// Returns the remaining size of the slice.
    #[inline]
    pub const fn size(&self) -> Size {
        Size {
            bits: self.size_bits(),
            refs: self.size_refs(),
        }
    }

    /// Returns the start of data window.
    #[inline]
    pub const fn offset_bits(&self) -> u16 {
        self.range.bits_start
    }

    /// Returns the start of refs window.
    #[inline]
    pub const fn offset_refs(&self) -> u8 {
        self.range.refs_start
    }

    /// Returns true if the slice contains at least `bits` and `refs`.
    #[inline]
    pub const fn has_remaining(&self, bits: u16, refs: u8) -> bool {
        self.range.bits_start as usize + bits as usize <= self.range.bits_end as usize
            && self.range.refs_start as usize + refs as usize <= self.range.refs_end as usize
    }

    /// Returns an error if the slice is not empty.
    pub fn end_parse(&self) -> Result<(), Error> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidData)
        }
    }

    /// Tries to load the specified type from this slice.
    #[inline]
    pub fn load<T: Load<'a>>(&mut self) -> Result<T, Error> {
        T::load_from(self)
    }

    /// Advances the start of the data and refs windows.
    pub fn skip_first(&mut self, bits: u16, refs: u8) -> Result<(), Error> {
        if unlikely(!self.has_remaining(bits, refs)) {
            return Err(Error::CellUnderflow);
        }
        self.range.bits_start += bits;
        self.range.refs_start += refs;
        Ok(())
    }

    /// Shrinks the end of the data and refs windows.
    pub fn skip_last(&mut self, bits: u16, refs: u8) -> Result<(), Error> {
        if unlikely(!self.has_remaining(bits, refs)) {
            return Err(Error::CellUnderflow);
        }
        self.range.bits_end -= bits;
        self.range.refs_end -= refs;
        Ok(())
    }

    /// Returns a slice with only the first `bits` and `refs` of this slice.
    pub fn get_prefix(&self, bits: u16, refs: u8) -> Result<Self, Error> {
        if unlikely(!self.has_remaining(bits, refs)) {
            return Err(Error::CellUnderflow);
        }
        Ok(Self {
            cell: self.cell,
            range: CellSliceRange {
                bits_start: self.range.bits_start,
                bits_end: self.range.bits_start + bits,
                refs_start: self.range.refs_start,
                refs_end: self.range.refs_start + refs,
            },
        })
    }

    /// Returns the first `bits` and `refs` of this slice and advances the windows.
    pub fn load_prefix(&mut self, bits: u16, refs: u8) -> Result<Self, Error> {
        let prefix = ok!(self.get_prefix(bits, refs));
        self.range.bits_start += bits;
        self.range.refs_start += refs;
        Ok(prefix)
    }

    /// Returns the remaining part of the slice and empties it.
    pub fn load_remaining(&mut self) -> Self {
        let result = *self;
        self.range.bits_start = self.range.bits_end;
        self.range.refs_start = self.range.refs_end;
        result
    }

    /// Returns `Some(bit)` if all remaining data bits are equal to `bit`.
    /// Returns `None` if bits differ or there are no bits left.
    pub fn test_uniform(&self) -> Option<bool> {
        let size = self.size_bits();
        let first = self.get_bit(0).ok()?;

        let mut offset = 0;
        while offset < size {
            let chunk = std::cmp::min(size - offset, 64);
            let value = self.get_uint(offset, chunk).ok()?;
            let expected = if first {
                u64::MAX >> (64 - chunk)
            } else {
                0
            };
            if value != expected {
                return None;
            }
            offset += chunk;
        }

        Some(first)
    }

    /// Returns the longest common data prefix of two slices
    /// as a subslice of this one (without references).
    pub fn longest_common_data_prefix(&self, other: &Self) -> Self {
        let max = std::cmp::min(self.size_bits(), other.size_bits());

        let mut common = 0;
        while common < max {
            let chunk = std::cmp::min(max - common, 64);
            let (Ok(a), Ok(b)) = (self.get_uint(common, chunk), other.get_uint(common, chunk))
            else {
                break;
            };
            if a != b {
                let diff = (a ^ b).leading_zeros() as u16 - (64 - chunk);
                common += diff;
                break;
            }
            common += chunk;
        }

        Self {
            cell: self.cell,
            range: CellSliceRange {
                bits_start: self.range.bits_start,
                bits_end: self.range.bits_start + common,
                refs_start: self.range.refs_start,
                refs_end: self.range.refs_start,
            },
        }
    }

    /// Returns the remaining slice if this slice data starts with the `prefix` data.
    pub fn strip_data_prefix(&self, prefix: &CellSlice<'_>) -> Option<Self> {
        let prefix_len = prefix.size_bits();
        if prefix_len > self.size_bits() {
            return None;
        }
        let common = self.longest_common_data_prefix(prefix);
        if common.size_bits() != prefix_len {
            return None;
        }

        let mut result = *self;
        result.range.bits_start += prefix_len;
        Some(result)
    }

    /// Tries to read the bit at the specified offset (relative to the current bits window).
    pub fn get_bit(&self, offset: u16) -> Result<bool, Error> {
        if self.range.bits_start as usize + offset as usize >= self.range.bits_end as usize {
            return Err(Error::CellUnderflow);
        }
        let index = self.range.bits_start + offset;
        match self.cell.data().get((index / 8) as usize) {
            Some(byte) => Ok((byte >> (7 - index % 8)) & 1 != 0),
            None => Err(Error::CellUnderflow),
        }
    }

    /// Tries to read the next bit, incrementing the bits window start.
    pub fn load_bit(&mut self) -> Result<bool, Error> {
        let bit = ok!(self.get_bit(0));
        self.range.bits_start += 1;
        Ok(bit)
    }

    /// Reads `bits` starting from the `offset` into the `target` buffer.
    ///
    /// Returns a subslice of `target` with data aligned to the most significant bit.
    pub fn get_raw<'b>(
        &self,
        offset: u16,
        target: &'b mut [u8],
        bits: u16,
    ) -> Result<&'b mut [u8], Error> {
        if bits == 0 {
            return Ok(&mut target[..0]);
        }
        if unlikely(
            self.range.bits_start as usize + offset as usize + bits as usize
                > self.range.bits_end as usize,
        ) {
            return Err(Error::CellUnderflow);
        }

        let byte_len = ((bits + 7) / 8) as usize;
        if unlikely(target.len() < byte_len) {
            return Err(Error::CellOverflow);
        }
        let target = &mut target[..byte_len];

        let index = self.range.bits_start + offset;
        let q = (index / 8) as usize;
        let r = index % 8;

        let data = self.cell.data();
        let Some(src) = data.get(q..q + byte_len) else {
            return Err(Error::CellUnderflow);
        };

        if r == 0 {
            target.copy_from_slice(src);
        } else {
            // ___xxxxx|yyy_____ -> xxxxxyyy
            for (i, byte) in src.iter().enumerate() {
                let next = data.get(q + i + 1).copied().unwrap_or_default();
                target[i] = (byte << r) | (next >> (8 - r));
            }
        }

        let rem = bits % 8;
        if rem != 0 {
            target[byte_len - 1] &= 0xff << (8 - rem);
        }

        Ok(target)
    }

    /// Reads `bits` into the `target` buffer and advances the data window.
    pub fn load_raw<'b>(&mut self, target: &'b mut [u8], bits: u16) -> Result<&'b mut [u8], Error> {
        let data = ok!(self.get_raw(0, target, bits));
        self.range.bits_start += bits;
        Ok(data)
    }

    /// Reads `bits` (0..=8) starting from the `offset` as a small integer.
    pub fn get_small_uint(&self, offset: u16, bits: u16) -> Result<u8, Error> {
        if unlikely(bits > 8) {
            return Err(Error::IntOverflow);
        }
        if bits == 0 {
            return Ok(0);
        }
        let mut buffer = [0u8; 1];
        ok!(self.get_raw(offset, &mut buffer, bits));
        Ok(buffer[0] >> (8 - bits))
    }

    /// Reads `bits` (0..=8) as a small integer and advances the data window.
    pub fn load_small_uint(&mut self, bits: u16) -> Result<u8, Error> {
        let value = ok!(self.get_small_uint(0, bits));
        self.range.bits_start += bits;
        Ok(value)
    }

    /// Reads an unsigned integer of `bits` width starting from the `offset`.
    ///
    /// Widths above 64 are allowed only when all extra high bits are zero.
    pub fn get_uint(&self, offset: u16, bits: u16) -> Result<u64, Error> {
        if bits > 64 {
            let extra = bits - 64;
            if unlikely(!self.has_remaining(offset.saturating_add(bits), 0)) {
                return Err(Error::CellUnderflow);
            }
            let prefix = ok!(self.get_prefix(offset + extra, 0));
            let mut prefix = prefix;
            ok!(prefix.skip_first(offset, 0));
            if unlikely(prefix.test_uniform() != Some(false)) {
                return Err(Error::IntOverflow);
            }
            return self.get_uint(offset + extra, 64);
        }
        if bits == 0 {
            return Ok(0);
        }

        let mut buffer = [0u8; 8];
        ok!(self.get_raw(offset, &mut buffer, bits));
        Ok(u64::from_be_bytes(buffer) >> (64 - bits))
    }

    /// Reads an unsigned integer of `bits` width and advances the data window.
    pub fn load_uint(&mut self, bits: u16) -> Result<u64, Error> {
        let value = ok!(self.get_uint(0, bits));
        self.range.bits_start += bits;
        Ok(value)
    }

    /// Reads a two's complement integer of `bits` width starting from the `offset`.
    ///
    /// Widths above 64 are allowed only when all extra high bits are sign bits.
    pub fn get_int(&self, offset: u16, bits: u16) -> Result<i64, Error> {
        if bits > 64 {
            let extra = bits - 64;
            let value = ok!(self.get_uint(offset + extra, 64)) as i64;
            let mut prefix = ok!(self.get_prefix(offset + extra, 0));
            ok!(prefix.skip_first(offset, 0));
            if unlikely(prefix.test_uniform() != Some(value < 0)) {
                return Err(Error::IntOverflow);
            }
            return Ok(value);
        }
        if bits == 0 {
            return Ok(0);
        }

        let value = ok!(self.get_uint(offset, bits));
        // Sign extend
        let shift = 64 - bits;
        Ok(((value << shift) as i64) >> shift)
    }

    /// Reads a two's complement integer of `bits` width and advances the data window.
    pub fn load_int(&mut self, bits: u16) -> Result<i64, Error> {
        let value = ok!(self.get_int(0, bits));
        self.range.bits_start += bits;
        Ok(value)
    }

    /// Reads `u8` starting from the `offset`.
    #[inline]
    pub fn get_u8(&self, offset: u16) -> Result<u8, Error> {
        self.get_small_uint(offset, 8)
    }

    /// Tries to read the next `u8`, incrementing the bits window start.
    #[inline]
    pub fn load_u8(&mut self) -> Result<u8, Error> {
        self.load_small_uint(8)
    }

    /// Reads `u16` starting from the `offset`.
    #[inline]
    pub fn get_u16(&self, offset: u16) -> Result<u16, Error> {
        Ok(ok!(self.get_uint(offset, 16)) as u16)
    }

    /// Tries to read the next `u16`, incrementing the bits window start.
    #[inline]
    pub fn load_u16(&mut self) -> Result<u16, Error> {
        Ok(ok!(self.load_uint(16)) as u16)
    }

    /// Reads `u32` starting from the `offset`.
    #[inline]
    pub fn get_u32(&self, offset: u16) -> Result<u32, Error> {
        Ok(ok!(self.get_uint(offset, 32)) as u32)
    }

    /// Tries to read the next `u32`, incrementing the bits window start.
    #[inline]
    pub fn load_u32(&mut self) -> Result<u32, Error> {
        Ok(ok!(self.load_uint(32)) as u32)
    }

    /// Reads `u64` starting from the `offset`.
    #[inline]
    pub fn get_u64(&self, offset: u16) -> Result<u64, Error> {
        self.get_uint(offset, 64)
    }

    /// Tries to read the next `u64`, incrementing the bits window start.
    #[inline]
    pub fn load_u64(&mut self) -> Result<u64, Error> {
        self.load_uint(64)
    }

    /// Reads `u128` starting from the `offset`.
    pub fn get_u128(&self, offset: u16) -> Result<u128, Error> {
        let mut buffer = [0u8; 16];
        ok!(self.get_raw(offset, &mut buffer, 128));
        Ok(u128::from_be_bytes(buffer))
    }

    /// Tries to read the next `u128`, incrementing the bits window start.
    pub fn load_u128(&mut self) -> Result<u128, Error> {
        let value = ok!(self.get_u128(0));
        self.range.bits_start += 128;
        Ok(value)
    }

    /// Reads 32 bytes starting from the `offset`.
    pub fn get_u256(&self, offset: u16) -> Result<HashBytes, Error> {
        let mut result = HashBytes::ZERO;
        ok!(self.get_raw(offset, &mut result.0, 256));
        Ok(result)
    }

    /// Tries to read the next 32 bytes, incrementing the bits window start.
    pub fn load_u256(&mut self) -> Result<HashBytes, Error> {
        let value = ok!(self.get_u256(0));
        self.range.bits_start += 256;
        Ok(value)
    }

    /// Tries to read the next `i8`, incrementing the bits window start.
    #[inline]
    pub fn load_i8(&mut self) -> Result<i8, Error> {
        Ok(ok!(self.load_u8()) as i8)
    }

    /// Tries to read the next `i16`, incrementing the bits window start.
    #[inline]
    pub fn load_i16(&mut self) -> Result<i16, Error> {
        Ok(ok!(self.load_u16()) as i16)
    }

    /// Tries to read the next `i32`, incrementing the bits window start.
    #[inline]
    pub fn load_i32(&mut self) -> Result<i32, Error> {
        Ok(ok!(self.load_u32()) as i32)
    }

    /// Tries to read the next `i64`, incrementing the bits window start.
    #[inline]
    pub fn load_i64(&mut self) -> Result<i64, Error> {
        Ok(ok!(self.load_u64()) as i64)
    }

    /// Reads a value which must not exceed `upper_bound` (`#<= m`).
    pub fn load_uint_leq(&mut self, upper_bound: u64) -> Result<u64, Error> {
        let bits = (64 - upper_bound.leading_zeros()) as u16;
        let value = ok!(self.get_uint(0, bits));
        if unlikely(value > upper_bound) {
            return Err(Error::IntOverflow);
        }
        self.range.bits_start += bits;
        Ok(value)
    }

    /// Reads a value which must be less than `upper_bound` (`#< m`).
    pub fn load_uint_less(&mut self, upper_bound: u64) -> Result<u64, Error> {
        if unlikely(upper_bound == 0) {
            return Err(Error::InvalidData);
        }
        let bits = (64 - (upper_bound - 1).leading_zeros()) as u16;
        let value = ok!(self.get_uint(0, bits));
        if unlikely(value >= upper_bound) {
            return Err(Error::IntOverflow);
        }
        self.range.bits_start += bits;
        Ok(value)
    }

    /// Reads a unary encoded number (ones terminated by a zero).
    pub fn load_unary(&mut self) -> Result<u16, Error> {
        let mut n = 0;
        loop {
            match self.get_bit(n) {
                Ok(true) => n += 1,
                Ok(false) => break,
                Err(e) => return Err(e),
            }
        }
        self.range.bits_start += n + 1;
        Ok(n)
    }

    /// Reads a variable length unsigned integer with the specified header width.
    pub fn load_var_uint(&mut self, header_bits: u16) -> Result<u128, Error> {
        let bytes = ok!(self.get_uint(0, header_bits));
        if unlikely(bytes > 16) {
            return Err(Error::IntOverflow);
        }
        let bits = bytes as u16 * 8;

        let mut buffer = [0u8; 16];
        ok!(self.get_raw(header_bits, &mut buffer[16 - bytes as usize..], bits));
        self.range.bits_start += header_bits + bits;
        Ok(u128::from_be_bytes(buffer))
    }

    /// Reads an amount of coins (`VarUInteger 16`).
    #[inline]
    pub fn load_coins(&mut self) -> Result<u128, Error> {
        self.load_var_uint(4)
    }

    /// Skips a variable length integer with the specified header width.
    pub fn skip_var_uint(&mut self, header_bits: u16) -> Result<(), Error> {
        let bytes = ok!(self.get_uint(0, header_bits));
        let bits = match bytes.checked_mul(8).map(u16::try_from) {
            Some(Ok(bits)) if bits <= MAX_BIT_LEN => bits,
            _ => return Err(Error::CellUnderflow),
        };
        self.skip_first(header_bits + bits, 0)
    }

    /// Reads an arbitrary precision unsigned integer of `bits` width.
    #[cfg(feature = "bigint")]
    pub fn load_biguint(&mut self, bits: u16) -> Result<num_bigint::BigUint, Error> {
        let mut buffer = [0u8; 128];
        let data = ok!(self.get_raw(0, &mut buffer, bits));
        let mut value = num_bigint::BigUint::from_bytes_be(data);
        let rem = bits % 8;
        if rem != 0 {
            value >>= (8 - rem) as usize;
        }
        self.range.bits_start += bits;
        Ok(value)
    }

    /// Reads an arbitrary precision integer of `bits` width.
    #[cfg(feature = "bigint")]
    pub fn load_bigint(&mut self, bits: u16, signed: bool) -> Result<num_bigint::BigInt, Error> {
        use num_bigint::BigInt;
        use num_traits::One;

        let is_negative = signed && bits > 0 && ok!(self.get_bit(0));
        let value = BigInt::from(ok!(self.load_biguint(bits)));
        if is_negative {
            Ok(value - (BigInt::one() << bits as usize))
        } else {
            Ok(value)
        }
    }

    /// Reads a variable length arbitrary precision unsigned integer.
    #[cfg(feature = "bigint")]
    pub fn load_var_biguint(&mut self, header_bits: u16) -> Result<num_bigint::BigUint, Error> {
        let prev = *self;
        let bytes = ok!(self.load_uint(header_bits));
        match bytes.checked_mul(8).map(u16::try_from) {
            Some(Ok(bits)) if bits <= MAX_BIT_LEN => match self.load_biguint(bits) {
                Ok(value) => Ok(value),
                Err(e) => {
                    *self = prev;
                    Err(e)
                }
            },
            _ => {
                *self = prev;
                Err(Error::CellUnderflow)
            }
        }
    }

    /// Reads all remaining bytes and follows the chain of first references.
    pub fn load_snake_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let mut result = Vec::new();
        let mut buffer = [0u8; 128];

        let mut current = *self;
        loop {
            let bits = current.size_bits();
            if unlikely(bits % 8 != 0) {
                return Err(Error::InvalidData);
            }
            result.extend_from_slice(ok!(current.get_raw(0, &mut buffer, bits)));

            match current.size_refs() {
                0 => break,
                1 => current = ok!(current.get_reference_as_slice(0)),
                _ => return Err(Error::InvalidData),
            }
        }

        self.load_remaining();
        Ok(result)
    }

    /// Returns a reference to the Nth child cell (relative to this slice's refs window).
    pub fn get_reference(&self, index: u8) -> Result<&'a DynCell, Error> {
        if self.range.refs_start as usize + index as usize >= self.range.refs_end as usize {
            return Err(Error::CellUnderflow);
        }
        match self.cell.reference(self.range.refs_start + index) {
            Some(cell) => Ok(cell),
            None => Err(Error::CellUnderflow),
        }
    }

    /// Returns the Nth child cell (relative to this slice's refs window).
    pub fn get_reference_cloned(&self, index: u8) -> Result<Cell, Error> {
        if self.range.refs_start as usize + index as usize >= self.range.refs_end as usize {
            return Err(Error::CellUnderflow);
        }
        match self.cell.reference_cloned(self.range.refs_start + index) {
            Some(cell) => Ok(cell),
            None => Err(Error::CellUnderflow),
        }
    }

    /// Tries to load the specified child cell as slice.
    /// Returns an error if the loaded cell is absent or is pruned.
    pub fn get_reference_as_slice(&self, index: u8) -> Result<CellSlice<'a>, Error> {
        CellSlice::new(ok!(self.get_reference(index)))
    }

    /// Creates an iterator through child nodes.
    pub fn references(&self) -> RefsIter<'a> {
        RefsIter {
            cell: self.cell,
            max: self.range.refs_end,
            index: self.range.refs_start,
        }
    }

    /// Tries to get the next child cell, incrementing the refs window start.
    pub fn load_reference(&mut self) -> Result<&'a DynCell, Error> {
        let cell = ok!(self.get_reference(0));
        self.range.refs_start += 1;
        Ok(cell)
    }

    /// Tries to get the next child cell, incrementing the refs window start.
    pub fn load_reference_cloned(&mut self) -> Result<Cell, Error> {
        let cell = ok!(self.get_reference_cloned(0));
        self.range.refs_start += 1;
        Ok(cell)
    }

    /// Tries to load the next child cell as slice.
    pub fn load_reference_as_slice(&mut self) -> Result<CellSlice<'a>, Error> {
        let cell = ok!(self.get_reference(0));
        let slice = ok!(CellSlice::new(cell));
        self.range.refs_start += 1;
        Ok(slice)
    }

    /// Tries to load an optional child cell (`Maybe ^Cell`).
    pub fn load_maybe_reference(&mut self) -> Result<Option<&'a DynCell>, Error> {
        if !ok!(self.get_bit(0)) {
            self.range.bits_start += 1;
            return Ok(None);
        }
        let cell = ok!(self.get_reference(0));
        self.range.bits_start += 1;
        self.range.refs_start += 1;
        Ok(Some(cell))
    }

    /// Tries to load an optional child cell (`Maybe ^Cell`).
    pub fn load_maybe_reference_cloned(&mut self) -> Result<Option<Cell>, Error> {
        if !ok!(self.get_bit(0)) {
            self.range.bits_start += 1;
            return Ok(None);
        }
        let cell = ok!(self.get_reference_cloned(0));
        self.range.bits_start += 1;
        self.range.refs_start += 1;
        Ok(Some(cell))
    }

    /// Builds a new cell from the remaining data and references.
    pub fn to_cell(&self) -> Result<Cell, Error> {
        let mut builder = CellBuilder::new();
        ok!(builder.store_slice(self));
        builder.build()
    }

    /// Returns an object which will display data as a bitstring
    /// with a termination bit.
    pub fn display_data(&self) -> String {
        let mut buffer = [0u8; 128];
        match self.get_raw(0, &mut buffer, self.size_bits()) {
            Ok(bytes) => Bitstring {
                bytes,
                bit_len: self.size_bits(),
            }
            .to_string(),
            Err(_) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_cell<F: FnOnce(&mut CellBuilder) -> Result<(), Error>>(f: F) -> Cell {
        let mut builder = CellBuilder::new();
        f(&mut builder).unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn get_raw() {
        let cell = build_cell(|b| b.store_raw(&[0xff; 17], 17 * 8));
        let slice = cell.as_slice().unwrap();

        let mut data = [0; 1];
        assert!(slice.get_raw(0, &mut data, 100).is_err());

        let mut data = [0; 17];
        for bits in 0..17 * 8 {
            data.fill(0);
            let target = slice.get_raw(0, &mut data, bits).unwrap();

            let mut expected = [0xffu8; 17];
            if bits % 8 != 0 {
                expected[bits as usize / 8] = 0xff << (8 - bits % 8);
            }
            assert_eq!(target, &expected[..((bits + 7) / 8) as usize]);
        }

        let cell = build_cell(|b| b.store_u16(0xabcd));
        let slice = cell.as_slice().unwrap();
        let mut data = [0; 2];
        assert_eq!(slice.get_raw(4, &mut data, 8).unwrap(), &[0xbc]);
        assert_eq!(slice.get_raw(3, &mut data, 9).unwrap(), &[0x5e, 0x00]);
    }

    #[test]
    fn reads_past_end() {
        let cell = build_cell(|b| b.store_small_uint(0b101, 3));
        let mut slice = cell.as_slice().unwrap();
        assert_eq!(slice.load_u8().unwrap_err(), Error::CellUnderflow);
        assert_eq!(slice.load_reference().unwrap_err(), Error::CellUnderflow);
        assert_eq!(slice.size_bits(), 3);
        assert_eq!(slice.load_small_uint(3).unwrap(), 0b101);
        assert_eq!(slice.load_bit().unwrap_err(), Error::CellUnderflow);
        slice.end_parse().unwrap();
    }

    #[test]
    fn primitives_roundtrip() {
        let cell = build_cell(|b| {
            b.store_bit_one()?;
            b.store_u8(0xfe)?;
            b.store_i16(-2)?;
            b.store_u32(0xdeadbeaf)?;
            b.store_i64(i64::MIN)?;
            b.store_u128(u128::MAX - 1)?;
            b.store_int(-5, 7)?;
            b.store_uint(77, 13)
        });

        let mut slice = cell.as_slice().unwrap();
        assert!(slice.load_bit().unwrap());
        assert_eq!(slice.load_u8().unwrap(), 0xfe);
        assert_eq!(slice.load_i16().unwrap(), -2);
        assert_eq!(slice.load_u32().unwrap(), 0xdeadbeaf);
        assert_eq!(slice.load_i64().unwrap(), i64::MIN);
        assert_eq!(slice.load_u128().unwrap(), u128::MAX - 1);
        assert_eq!(slice.load_int(7).unwrap(), -5);
        assert_eq!(slice.load_uint(13).unwrap(), 77);
        assert!(slice.is_data_empty());
    }

    #[test]
    fn uniform_and_prefix() {
        let cell = build_cell(|b| b.store_ones(100));
        let slice = cell.as_slice().unwrap();
        assert_eq!(slice.test_uniform(), Some(true));

        let cell = build_cell(|b| b.store_zeros(70));
        let slice = cell.as_slice().unwrap();
        assert_eq!(slice.test_uniform(), Some(false));

        let cell = build_cell(|b| {
            b.store_zeros(69)?;
            b.store_bit_one()
        });
        let slice = cell.as_slice().unwrap();
        assert_eq!(slice.test_uniform(), None);
        assert_eq!(CellSlice::default().test_uniform(), None);

        let a = build_cell(|b| b.store_u32(0xdead0000));
        let b = build_cell(|b| b.store_u32(0xdeaf0000));
        let a = a.as_slice().unwrap();
        let b = b.as_slice().unwrap();
        let common = a.longest_common_data_prefix(&b);
        // 0xdead = ...1101, 0xdeaf = ...1111
        assert_eq!(common.size_bits(), 14);

        let rest = a.strip_data_prefix(&common).unwrap();
        assert_eq!(rest.size_bits(), 32 - 14);
        assert!(common.strip_data_prefix(&a).is_none());
    }

    #[test]
    fn prefixes_and_windows() {
        let cell = build_cell(|b| {
            b.store_u16(0xabcd)?;
            b.store_reference(Cell::empty_cell())?;
            b.store_reference(Cell::empty_cell())
        });

        let mut slice = cell.as_slice().unwrap();
        let prefix = slice.load_prefix(8, 1).unwrap();
        assert_eq!(prefix.size(), Size { bits: 8, refs: 1 });
        assert_eq!(prefix.get_u8(0).unwrap(), 0xab);
        assert_eq!(slice.load_u8().unwrap(), 0xcd);
        assert_eq!(slice.size_refs(), 1);

        let mut slice = cell.as_slice().unwrap();
        slice.skip_last(4, 1).unwrap();
        assert_eq!(slice.size_bits(), 12);
        assert_eq!(slice.references().count(), 1);
        assert_eq!(slice.display_data(), "abc");

        let range = slice.range();
        let restored = range.apply(&cell).unwrap();
        assert_eq!(restored.size_bits(), 12);

        let remaining = slice.load_remaining();
        assert!(slice.is_empty());
        assert_eq!(remaining.to_cell().unwrap().bit_len(), 12);
    }

    #[test]
    fn var_uint_and_coins() {
        let cell = build_cell(|b| {
            b.store_var_uint(0, 5)?;
            b.store_var_uint(0x1234, 5)?;
            b.store_coins(u64::MAX as u128)
        });
        let mut slice = cell.as_slice().unwrap();
        assert_eq!(slice.load_var_uint(5).unwrap(), 0);
        assert_eq!(slice.load_var_uint(5).unwrap(), 0x1234);
        let before = slice;
        slice.skip_var_uint(4).unwrap();
        assert!(slice.is_data_empty());
        slice = before;
        assert_eq!(slice.load_coins().unwrap(), u64::MAX as u128);
    }

    #[test]
    fn var_uint_huge_header() {
        let cell = build_cell(|b| {
            b.store_u64(u64::MAX)?;
            b.store_u64(0)
        });
        let mut slice = cell.as_slice().unwrap();
        assert_eq!(slice.skip_var_uint(64).unwrap_err(), Error::CellUnderflow);
        assert_eq!(slice.load_var_uint(64).unwrap_err(), Error::IntOverflow);
        assert_eq!(slice.size_bits(), 128);

        #[cfg(feature = "bigint")]
        {
            assert_eq!(
                slice.load_var_biguint(64).unwrap_err(),
                Error::CellUnderflow
            );
            assert_eq!(slice.size_bits(), 128);
        }
    }

    #[test]
    fn leq_and_less() {
        let cell = build_cell(|b| {
            b.store_uint(7, 3)?;
            b.store_uint(7, 3)
        });
        let mut slice = cell.as_slice().unwrap();
        assert_eq!(slice.load_uint_less(7).unwrap_err(), Error::IntOverflow);
        assert_eq!(slice.load_uint_less(8).unwrap(), 7);
        assert_eq!(slice.load_uint_leq(6).unwrap_err(), Error::IntOverflow);
        assert_eq!(slice.load_uint_leq(7).unwrap(), 7);
    }

    #[test]
    fn pruned_branch_access() {
        let cell = build_cell(|b| b.store_u32(123));
        let pruned =
            crate::merkle::make_pruned_branch(cell.as_ref(), 0, Cell::empty_context()).unwrap();
        assert_eq!(pruned.as_slice().unwrap_err(), Error::PrunedBranchAccess);
        assert_eq!(
            CellSliceRange::full(pruned.as_ref())
                .apply(&pruned)
                .unwrap_err(),
            Error::PrunedBranchAccess
        );
    }

    #[cfg(feature = "bigint")]
    #[test]
    fn bigints() {
        use num_bigint::{BigInt, BigUint};

        let big = BigUint::from(u128::MAX) * BigUint::from(3u8);
        let negative = BigInt::from(-1234567i64);

        let cell = build_cell(|b| {
            b.store_biguint(&big, 200)?;
            b.store_bigint(&negative, 77, true)?;
            b.store_var_biguint(&big, 5)
        });

        let mut slice = cell.as_slice().unwrap();
        assert_eq!(slice.load_biguint(200).unwrap(), big);
        assert_eq!(slice.load_bigint(77, true).unwrap(), negative);
        assert_eq!(slice.load_var_biguint(5).unwrap(), big);
        assert!(slice.is_data_empty());

        let mut builder = CellBuilder::new();
        assert_eq!(
            builder.store_biguint(&big, 129).unwrap_err(),
            Error::IntOverflow
        );
    }
}

use smallvec::SmallVec;

use super::cell_context::CellParts;
use super::{
    Cell, CellContext, CellDescriptor, CellImpl, CellSlice, DynCell, HashBytes, LevelMask, Size,
    Store, EMPTY_CELL_HASH, MAX_BIT_LEN, MAX_REF_COUNT,
};
use crate::error::Error;
use crate::util::{unlikely, Bitstring};

/// Max number of bytes stored inline at the head of a snake chain.
const SNAKE_HEAD_BYTES: usize = 123;
/// Max number of bytes stored in each continuation cell of a snake chain.
const SNAKE_TAIL_BYTES: usize = 127;

impl<T: Store> Store for Option<T> {
    #[inline]
    fn store_into(
        &self,
        builder: &mut CellBuilder,
        context: &dyn CellContext,
    ) -> Result<(), Error> {
        match self {
            Some(data) => {
                let snapshot = builder.snapshot();
                ok!(builder.store_bit_one());
                match data.store_into(builder, context) {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        builder.restore(snapshot);
                        Err(e)
                    }
                }
            }
            None => builder.store_bit_zero(),
        }
    }
}

impl Store for CellBuilder {
    #[inline]
    fn store_into(&self, builder: &mut CellBuilder, _: &dyn CellContext) -> Result<(), Error> {
        builder.store_builder(self)
    }
}

impl Store for CellSlice<'_> {
    #[inline]
    fn store_into(&self, builder: &mut CellBuilder, _: &dyn CellContext) -> Result<(), Error> {
        builder.store_slice(self)
    }
}

impl Store for Cell {
    #[inline]
    fn store_into(&self, builder: &mut CellBuilder, _: &dyn CellContext) -> Result<(), Error> {
        builder.store_reference(self.clone())
    }
}

impl Store for () {
    #[inline]
    fn store_into(&self, _: &mut CellBuilder, _: &dyn CellContext) -> Result<(), Error> {
        Ok(())
    }
}

macro_rules! impl_primitive_store {
    ($($type:ty => |$b:ident, $v:ident| $expr:expr),*$(,)?) => {
        $(impl Store for $type {
            #[inline]
            fn store_into(&self,
                $b: &mut CellBuilder,
                _: &dyn CellContext
            ) -> Result<(), Error> {
                let $v = self;
                $expr
            }
        })*
    };
}

impl_primitive_store! {
    bool => |b, v| b.store_bit(*v),
    u8 => |b, v| b.store_u8(*v),
    i8 => |b, v| b.store_u8(*v as u8),
    u16 => |b, v| b.store_u16(*v),
    i16 => |b, v| b.store_u16(*v as u16),
    u32 => |b, v| b.store_u32(*v),
    i32 => |b, v| b.store_u32(*v as u32),
    u64 => |b, v| b.store_u64(*v),
    i64 => |b, v| b.store_u64(*v as u64),
    u128 => |b, v| b.store_u128(*v),
    i128 => |b, v| b.store_u128(*v as u128),
    HashBytes => |b, v| b.store_u256(v),
}

impl<const N: usize> Store for [u8; N] {
    #[inline]
    fn store_into(&self, builder: &mut CellBuilder, _: &dyn CellContext) -> Result<(), Error> {
        builder.store_bytes(self)
    }
}

/// Builder state which can be used to roll back partial writes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BuilderSnapshot {
    bit_len: u16,
    ref_count: usize,
}

/// Builder for constructing cells with densely packed data.
#[derive(Clone)]
pub struct CellBuilder {
    data: [u8; 128],
    bit_len: u16,
    is_exotic: bool,
    references: SmallVec<[Cell; MAX_REF_COUNT]>,
}

impl Default for CellBuilder {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Eq for CellBuilder {}

impl PartialEq for CellBuilder {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.bit_len == other.bit_len
            && self.is_exotic == other.is_exotic
            && self.data == other.data
            && self.references.as_slice() == other.references.as_slice()
    }
}

impl Ord for CellBuilder {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self.bit_len, self.references.len()).cmp(&(other.bit_len, other.references.len())) {
            std::cmp::Ordering::Equal => {}
            ord => return ord,
        }

        // NOTE: compare only the significant part of data bytes
        let byte_len = ((self.bit_len + 7) / 8) as usize;
        match self.data[..byte_len].cmp(&other.data[..byte_len]) {
            std::cmp::Ordering::Equal => {}
            ord => return ord,
        }

        for (a, b) in self.references.iter().zip(other.references.iter()) {
            match a.repr_hash().cmp(b.repr_hash()) {
                std::cmp::Ordering::Equal => {}
                ord => return ord,
            }
        }

        std::cmp::Ordering::Equal
    }
}

impl PartialOrd for CellBuilder {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Debug for CellBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        #[repr(transparent)]
        struct Data<'a, T>(&'a T);

        impl<T: std::fmt::Display> std::fmt::Debug for Data<'_, T> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(self.0, f)
            }
        }

        f.debug_struct("CellBuilder")
            .field("data", &Data(&self.display_data()))
            .field("bit_len", &self.bit_len)
            .field("is_exotic", &self.is_exotic)
            .field("references", &self.references.as_slice())
            .finish()
    }
}

impl CellBuilder {
    /// Creates an empty cell builder.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; 128],
            bit_len: 0,
            is_exotic: false,
            references: SmallVec::new(),
        }
    }

    /// Builds a new cell from the specified data using the default context.
    #[inline]
    pub fn build_from<T: Store + ?Sized>(data: &T) -> Result<Cell, Error> {
        Self::build_from_ext(data, Cell::empty_context())
    }

    /// Builds a new cell from the specified data using the provided context.
    #[inline]
    pub fn build_from_ext<T: Store + ?Sized>(
        data: &T,
        context: &dyn CellContext,
    ) -> Result<Cell, Error> {
        let mut builder = Self::new();
        ok!(data.store_into(&mut builder, context));
        builder.build_ext(context)
    }

    /// Tries to create a cell builder with the specified data.
    ///
    /// NOTE: if `bits` is greater than `data.len() * 8`, pads the value with zeros (as high bits).
    pub fn from_raw_data(value: &[u8], bits: u16) -> Result<Self, Error> {
        let mut res = Self::new();
        if bits as usize > value.len() * 8 {
            ok!(res.store_zeros(bits - (value.len() * 8) as u16));
            ok!(res.store_raw(value, (value.len() * 8) as u16));
        } else {
            ok!(res.store_raw(value, bits));
        }
        Ok(res)
    }

    /// Returns a slice which contains only builder data bits and no references.
    ///
    /// NOTE: intermediate cell hash is undefined.
    pub fn as_data_slice(&self) -> CellSlice<'_> {
        // SAFETY: we interpret cell builder data as ordinary cell
        unsafe { CellSlice::new_unchecked(IntermediateDataCell::wrap(self)) }
    }

    /// Returns a slice which contains builder data and references.
    ///
    /// NOTE: intermediate cell hash is undefined.
    pub fn as_full_slice(&self) -> CellSlice<'_> {
        // SAFETY: we interpret cell builder data as ordinary cell
        unsafe { CellSlice::new_unchecked(IntermediateFullCell::wrap(self)) }
    }

    /// Returns an underlying data buffer.
    ///
    /// Bits after the current data length are always zero.
    #[inline]
    pub const fn raw_data(&self) -> &[u8; 128] {
        &self.data
    }

    /// Returns the data size of this cell in bits.
    #[inline]
    pub const fn bit_len(&self) -> u16 {
        self.bit_len
    }

    /// Returns the number of references stored so far.
    #[inline]
    pub fn reference_count(&self) -> u8 {
        self.references.len() as u8
    }

    /// Returns child cells stored so far.
    #[inline]
    pub fn references(&self) -> &[Cell] {
        self.references.as_slice()
    }

    /// Returns remaining data capacity in bits.
    #[inline]
    pub const fn spare_bits_capacity(&self) -> u16 {
        MAX_BIT_LEN - self.bit_len
    }

    /// Returns remaining references capacity.
    #[inline]
    pub fn spare_refs_capacity(&self) -> u8 {
        (MAX_REF_COUNT - self.references.len()) as u8
    }

    /// Returns remaining capacity as [`Size`].
    #[inline]
    pub fn spare_capacity(&self) -> Size {
        Size {
            bits: self.spare_bits_capacity(),
            refs: self.spare_refs_capacity(),
        }
    }

    /// Returns true if there is enough remaining capacity to fit `bits` and `refs`.
    #[inline]
    pub fn has_capacity(&self, bits: u16, refs: u8) -> bool {
        self.bit_len as usize + bits as usize <= MAX_BIT_LEN as usize
            && self.references.len() + refs as usize <= MAX_REF_COUNT
    }

    /// Returns whether this cell will be built as an exotic.
    #[inline]
    pub const fn is_exotic(&self) -> bool {
        self.is_exotic
    }

    /// Marks this cell as exotic.
    #[inline]
    pub fn set_exotic(&mut self, is_exotic: bool) {
        self.is_exotic = is_exotic;
    }

    /// Returns an object which will display data as a bitstring
    /// with a termination bit.
    #[inline]
    pub fn display_data(&self) -> impl std::fmt::Display + std::fmt::Binary + '_ {
        Bitstring {
            bytes: &self.data,
            bit_len: self.bit_len,
        }
    }

    /// Removes the specified amount of bits from the end of the data.
    pub fn rewind(&mut self, bits: u16) -> Result<(), Error> {
        if unlikely(bits > self.bit_len) {
            return Err(Error::CellUnderflow);
        }
        self.truncate_data(self.bit_len - bits);
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> BuilderSnapshot {
        BuilderSnapshot {
            bit_len: self.bit_len,
            ref_count: self.references.len(),
        }
    }

    pub(crate) fn restore(&mut self, snapshot: BuilderSnapshot) {
        self.references.truncate(snapshot.ref_count);
        if snapshot.bit_len < self.bit_len {
            self.truncate_data(snapshot.bit_len);
        }
    }

    fn truncate_data(&mut self, bit_len: u16) {
        let byte_len = ((self.bit_len + 7) / 8) as usize;
        let new_byte_len = ((bit_len + 7) / 8) as usize;
        self.data[new_byte_len..byte_len].fill(0);

        let rem = bit_len % 8;
        if rem != 0 {
            self.data[new_byte_len - 1] &= 0xff << (8 - rem);
        }
        self.bit_len = bit_len;
    }

    /// Tries to store the specified number of zero bits in the cell.
    pub fn store_zeros(&mut self, bits: u16) -> Result<(), Error> {
        if self.bit_len as usize + bits as usize <= MAX_BIT_LEN as usize {
            // NOTE: tail bits are always zero
            self.bit_len += bits;
            Ok(())
        } else {
            Err(Error::CellOverflow)
        }
    }

    /// Tries to store the specified number of set bits in the cell.
    pub fn store_ones(&mut self, bits: u16) -> Result<(), Error> {
        if unlikely(self.bit_len as usize + bits as usize > MAX_BIT_LEN as usize) {
            return Err(Error::CellOverflow);
        }

        let mut remaining = bits;
        while remaining > 0 {
            let chunk = std::cmp::min(remaining, 64);
            ok!(self.store_raw(&u64::MAX.to_be_bytes(), chunk));
            remaining -= chunk;
        }
        Ok(())
    }

    /// Tries to store one zero bit in the cell.
    #[inline]
    pub fn store_bit_zero(&mut self) -> Result<(), Error> {
        self.store_zeros(1)
    }

    /// Tries to store one non-zero bit in the cell.
    pub fn store_bit_one(&mut self) -> Result<(), Error> {
        if self.bit_len < MAX_BIT_LEN {
            let q = (self.bit_len / 8) as usize;
            let r = self.bit_len % 8;
            self.data[q] |= 0x80 >> r;
            self.bit_len += 1;
            Ok(())
        } else {
            Err(Error::CellOverflow)
        }
    }

    /// Tries to store one bit in the cell.
    #[inline]
    pub fn store_bit(&mut self, value: bool) -> Result<(), Error> {
        if value {
            self.store_bit_one()
        } else {
            self.store_bit_zero()
        }
    }

    /// Tries to store `u8` in the cell.
    #[inline]
    pub fn store_u8(&mut self, value: u8) -> Result<(), Error> {
        self.store_raw(&[value], 8)
    }

    /// Tries to store `u16` in the cell.
    #[inline]
    pub fn store_u16(&mut self, value: u16) -> Result<(), Error> {
        self.store_raw(&value.to_be_bytes(), 16)
    }

    /// Tries to store `u32` in the cell.
    #[inline]
    pub fn store_u32(&mut self, value: u32) -> Result<(), Error> {
        self.store_raw(&value.to_be_bytes(), 32)
    }

    /// Tries to store `u64` in the cell.
    #[inline]
    pub fn store_u64(&mut self, value: u64) -> Result<(), Error> {
        self.store_raw(&value.to_be_bytes(), 64)
    }

    /// Tries to store `u128` in the cell.
    #[inline]
    pub fn store_u128(&mut self, value: u128) -> Result<(), Error> {
        self.store_raw(&value.to_be_bytes(), 128)
    }

    /// Tries to store 32 bytes in the cell.
    #[inline]
    pub fn store_u256(&mut self, value: &HashBytes) -> Result<(), Error> {
        self.store_raw(value.as_slice(), 256)
    }

    /// Tries to store `i8` in the cell.
    #[inline]
    pub fn store_i8(&mut self, value: i8) -> Result<(), Error> {
        self.store_u8(value as u8)
    }

    /// Tries to store `i16` in the cell.
    #[inline]
    pub fn store_i16(&mut self, value: i16) -> Result<(), Error> {
        self.store_u16(value as u16)
    }

    /// Tries to store `i32` in the cell.
    #[inline]
    pub fn store_i32(&mut self, value: i32) -> Result<(), Error> {
        self.store_u32(value as u32)
    }

    /// Tries to store `i64` in the cell.
    #[inline]
    pub fn store_i64(&mut self, value: i64) -> Result<(), Error> {
        self.store_u64(value as u64)
    }

    /// Tries to store `bits` (0..=8) lower bits of `value` in the cell.
    ///
    /// Fails with [`Error::IntOverflow`] if the value does not fit.
    pub fn store_small_uint(&mut self, value: u8, bits: u16) -> Result<(), Error> {
        if unlikely(bits > 8) {
            return self.store_uint(value as u64, bits);
        }
        if unlikely(bits < 8 && value >> bits != 0) {
            return Err(Error::IntOverflow);
        }
        if bits == 0 {
            return Ok(());
        }
        self.store_raw(&[value << (8 - bits)], bits)
    }

    /// Tries to store `value` as an unsigned integer of `bits` width.
    ///
    /// Widths above 64 are padded with zeros as high bits.
    /// Fails with [`Error::IntOverflow`] if the value does not fit.
    pub fn store_uint(&mut self, value: u64, mut bits: u16) -> Result<(), Error> {
        if unlikely(bits < 64 && value >> bits != 0) {
            return Err(Error::IntOverflow);
        }
        if unlikely(self.bit_len as usize + bits as usize > MAX_BIT_LEN as usize) {
            return Err(Error::CellOverflow);
        }

        if bits > 64 {
            ok!(self.store_zeros(bits - 64));
            bits = 64;
        }
        if bits == 0 {
            return Ok(());
        }

        let value = value << (64 - bits);
        self.store_raw(&value.to_be_bytes(), bits)
    }

    /// Tries to store `value` as a two's complement integer of `bits` width.
    ///
    /// Widths above 64 are sign extended.
    /// Fails with [`Error::IntOverflow`] if the value does not fit.
    pub fn store_int(&mut self, value: i64, bits: u16) -> Result<(), Error> {
        if bits < 64 {
            let fits = match bits {
                0 => value == 0,
                _ => {
                    let shift = bits - 1;
                    value >= -(1i64 << shift) && value < (1i64 << shift)
                }
            };
            if unlikely(!fits) {
                return Err(Error::IntOverflow);
            }
        }
        if unlikely(self.bit_len as usize + bits as usize > MAX_BIT_LEN as usize) {
            return Err(Error::CellOverflow);
        }

        if bits > 64 {
            let extra = bits - 64;
            if value < 0 {
                ok!(self.store_ones(extra));
            } else {
                ok!(self.store_zeros(extra));
            }
            return self.store_u64(value as u64);
        }
        if bits == 0 {
            return Ok(());
        }

        let value = (value as u64) << (64 - bits);
        self.store_raw(&value.to_be_bytes(), bits)
    }

    /// Tries to store a value which must not exceed `upper_bound` (`#<= m`).
    ///
    /// Uses the minimal number of bits required to represent `upper_bound`.
    pub fn store_uint_leq(&mut self, value: u64, upper_bound: u64) -> Result<(), Error> {
        if unlikely(value > upper_bound) {
            return Err(Error::IntOverflow);
        }
        let bits = (64 - upper_bound.leading_zeros()) as u16;
        self.store_uint(value, bits)
    }

    /// Tries to store a unary encoded number (`n` ones followed by a zero).
    pub fn store_unary(&mut self, n: u16) -> Result<(), Error> {
        if unlikely(self.bit_len as usize + n as usize + 1 > MAX_BIT_LEN as usize) {
            return Err(Error::CellOverflow);
        }
        ok!(self.store_ones(n));
        self.store_bit_zero()
    }

    /// Tries to store a variable length unsigned integer.
    ///
    /// Layout: `len:(## header_bits) value:(uint (len * 8))`,
    /// where `len` is the minimal number of bytes of `value`.
    pub fn store_var_uint(&mut self, value: u128, header_bits: u16) -> Result<(), Error> {
        let bytes = (128 - value.leading_zeros() as u16 + 7) / 8;
        if unlikely(header_bits < 16 && (bytes as u32) >= (1u32 << header_bits)) {
            return Err(Error::IntOverflow);
        }
        if unlikely(!self.has_capacity(header_bits + bytes * 8, 0)) {
            return Err(Error::CellOverflow);
        }

        ok!(self.store_uint(bytes as u64, header_bits));
        let value = value.to_be_bytes();
        self.store_raw(&value[16 - bytes as usize..], bytes * 8)
    }

    /// Tries to store an amount of coins (`VarUInteger 16`).
    #[inline]
    pub fn store_coins(&mut self, value: u128) -> Result<(), Error> {
        self.store_var_uint(value, 4)
    }

    /// Tries to store an optional unsigned integer (`Maybe (## bits)`).
    pub fn store_maybe_uint(&mut self, value: Option<u64>, bits: u16) -> Result<(), Error> {
        let Some(value) = value else {
            return self.store_bit_zero();
        };
        if unlikely(bits < 64 && value >> bits != 0) {
            return Err(Error::IntOverflow);
        }
        if unlikely(!self.has_capacity(1 + bits, 0)) {
            return Err(Error::CellOverflow);
        }
        ok!(self.store_bit_one());
        self.store_uint(value, bits)
    }

    /// Tries to store an optional amount of coins (`Maybe Grams`).
    pub fn store_maybe_coins(&mut self, value: Option<u128>) -> Result<(), Error> {
        let Some(value) = value else {
            return self.store_bit_zero();
        };
        let snapshot = self.snapshot();
        ok!(self.store_bit_one());
        let res = self.store_coins(value);
        if res.is_err() {
            self.restore(snapshot);
        }
        res
    }

    /// Tries to store an arbitrary precision unsigned integer of `bits` width.
    #[cfg(feature = "bigint")]
    pub fn store_biguint(&mut self, value: &num_bigint::BigUint, bits: u16) -> Result<(), Error> {
        let value_bits = value.bits();
        if unlikely(value_bits > bits as u64) {
            return Err(Error::IntOverflow);
        }
        if unlikely(!self.has_capacity(bits, 0)) {
            return Err(Error::CellOverflow);
        }
        if value_bits == 0 {
            return self.store_zeros(bits);
        }

        let value_bits = value_bits as u16;
        ok!(self.store_zeros(bits - value_bits));

        // Align the most significant bit to the start of the first byte
        let byte_len = (value_bits + 7) / 8;
        let aligned = value << (byte_len * 8 - value_bits) as usize;
        self.store_raw(&aligned.to_bytes_be(), value_bits)
    }

    /// Tries to store an arbitrary precision integer of `bits` width.
    #[cfg(feature = "bigint")]
    pub fn store_bigint(
        &mut self,
        value: &num_bigint::BigInt,
        bits: u16,
        signed: bool,
    ) -> Result<(), Error> {
        use num_bigint::{BigInt, Sign};
        use num_traits::One;

        if !signed {
            return match value.to_biguint() {
                Some(value) => self.store_biguint(&value, bits),
                None => Err(Error::IntOverflow),
            };
        }

        let fits = match (value.sign(), bits) {
            (Sign::NoSign, _) => true,
            (_, 0) => false,
            (Sign::Plus, _) => value.bits() < bits as u64,
            (Sign::Minus, _) => (-value - BigInt::one()).bits() < bits as u64,
        };
        if unlikely(!fits) {
            return Err(Error::IntOverflow);
        }

        let unsigned = if value.sign() == Sign::Minus {
            (BigInt::one() << bits as usize) + value
        } else {
            value.clone()
        };
        match unsigned.to_biguint() {
            Some(value) => self.store_biguint(&value, bits),
            None => Err(Error::IntOverflow),
        }
    }

    /// Tries to store a variable length arbitrary precision unsigned integer.
    #[cfg(feature = "bigint")]
    pub fn store_var_biguint(
        &mut self,
        value: &num_bigint::BigUint,
        header_bits: u16,
    ) -> Result<(), Error> {
        let bytes = ((value.bits() + 7) / 8) as u16;
        if unlikely(header_bits < 16 && (bytes as u32) >= (1u32 << header_bits)) {
            return Err(Error::IntOverflow);
        }
        if unlikely(!self.has_capacity(header_bits + bytes * 8, 0)) {
            return Err(Error::CellOverflow);
        }

        ok!(self.store_uint(bytes as u64, header_bits));
        self.store_biguint(value, bytes * 8)
    }

    /// Tries to store `bits` high bits of the `value` in the cell.
    ///
    /// NOTE: `bits` is clamped to the length of `value` in bits.
    pub fn store_raw(&mut self, value: &[u8], bits: u16) -> Result<(), Error> {
        let bits = std::cmp::min(bits as usize, value.len() * 8) as u16;
        if bits == 0 {
            return Ok(());
        }
        if unlikely(self.bit_len as usize + bits as usize > MAX_BIT_LEN as usize) {
            return Err(Error::CellOverflow);
        }

        let q = (self.bit_len / 8) as usize;
        let r = self.bit_len % 8;
        let byte_len = ((bits + 7) / 8) as usize;
        let value = &value[..byte_len];

        if r == 0 {
            self.data[q..q + byte_len].copy_from_slice(value);
        } else {
            // yyyxxxxx|xxx00000
            for (i, byte) in value.iter().enumerate() {
                self.data[q + i] |= byte >> r;
                if let Some(next) = self.data.get_mut(q + i + 1) {
                    *next = byte << (8 - r);
                }
            }
        }

        self.bit_len += bits;

        // Restore zero tail after the new data
        let new_byte_len = ((self.bit_len + 7) / 8) as usize;
        let rem = self.bit_len % 8;
        if rem != 0 {
            self.data[new_byte_len - 1] &= 0xff << (8 - rem);
        }
        let written_end = std::cmp::min(q + byte_len + 1, self.data.len());
        if new_byte_len < written_end {
            self.data[new_byte_len..written_end].fill(0);
        }

        Ok(())
    }

    /// Tries to store all bytes of `value` in the cell.
    #[inline]
    pub fn store_bytes(&mut self, value: &[u8]) -> Result<(), Error> {
        if unlikely(value.len() > MAX_BIT_LEN as usize / 8) {
            return Err(Error::CellOverflow);
        }
        self.store_raw(value, (value.len() * 8) as u16)
    }

    /// Tries to store bytes as a snake chain.
    ///
    /// The head chunk is stored inline, the rest is stored in a chain
    /// of child cells referenced by the first reference of each cell.
    pub fn store_snake_bytes(&mut self, value: &[u8]) -> Result<(), Error> {
        self.store_snake_bytes_ext(value, Cell::empty_context())
    }

    /// Tries to store bytes as a snake chain using the provided context.
    pub fn store_snake_bytes_ext(
        &mut self,
        value: &[u8],
        context: &dyn CellContext,
    ) -> Result<(), Error> {
        let head_len = std::cmp::min(value.len(), SNAKE_HEAD_BYTES);
        let (head, tail) = value.split_at(head_len);

        let refs = !tail.is_empty() as u8;
        if unlikely(!self.has_capacity((head_len * 8) as u16, refs)) {
            return Err(Error::CellOverflow);
        }

        // Build continuation cells from the last chunk to the first one
        let mut next = None::<Cell>;
        for chunk in tail.chunks(SNAKE_TAIL_BYTES).rev() {
            let mut builder = CellBuilder::new();
            ok!(builder.store_bytes(chunk));
            if let Some(cell) = next.take() {
                ok!(builder.store_reference(cell));
            }
            next = Some(ok!(builder.build_ext(context)));
        }

        ok!(self.store_bytes(head));
        if let Some(cell) = next {
            ok!(self.store_reference(cell));
        }
        Ok(())
    }

    /// Tries to store the remaining data bits of the slice.
    pub fn store_slice_data(&mut self, value: &CellSlice<'_>) -> Result<(), Error> {
        let bits = value.size_bits();
        if unlikely(!self.has_capacity(bits, 0)) {
            return Err(Error::CellOverflow);
        }

        let mut buffer = [0u8; 128];
        let data = ok!(value.get_raw(0, &mut buffer, bits));
        self.store_raw(data, bits)
    }

    /// Tries to store the remaining data bits and references of the slice.
    pub fn store_slice(&mut self, value: &CellSlice<'_>) -> Result<(), Error> {
        if unlikely(!self.has_capacity(value.size_bits(), value.size_refs())) {
            return Err(Error::CellOverflow);
        }

        ok!(self.store_slice_data(value));
        for cell in value.references().cloned() {
            ok!(self.store_reference(cell));
        }
        Ok(())
    }

    /// Tries to store the data bits of the cell.
    #[inline]
    pub fn store_cell_data(&mut self, value: &DynCell) -> Result<(), Error> {
        if unlikely(!self.has_capacity(value.bit_len(), 0)) {
            return Err(Error::CellOverflow);
        }
        self.store_raw(value.data(), value.bit_len())
    }

    /// Tries to store the data bits and references of the cell inline.
    pub fn store_cell(&mut self, value: &DynCell) -> Result<(), Error> {
        if unlikely(!self.has_capacity(value.bit_len(), value.reference_count())) {
            return Err(Error::CellOverflow);
        }

        ok!(self.store_raw(value.data(), value.bit_len()));
        for cell in value.references().cloned() {
            ok!(self.store_reference(cell));
        }
        Ok(())
    }

    /// Tries to append data bits and references of another builder.
    pub fn store_builder(&mut self, value: &Self) -> Result<(), Error> {
        if unlikely(!self.has_capacity(value.bit_len, value.references.len() as u8)) {
            return Err(Error::CellOverflow);
        }

        ok!(self.store_raw(&value.data, value.bit_len));
        self.references.extend(value.references.iter().cloned());
        Ok(())
    }

    /// Tries to store a child in the cell.
    pub fn store_reference(&mut self, cell: Cell) -> Result<(), Error> {
        if self.references.len() < MAX_REF_COUNT {
            self.references.push(cell);
            Ok(())
        } else {
            Err(Error::CellOverflow)
        }
    }

    /// Tries to store an optional child (`Maybe ^Cell`).
    pub fn store_maybe_reference(&mut self, cell: Option<Cell>) -> Result<(), Error> {
        match cell {
            Some(cell) => {
                if unlikely(!self.has_capacity(1, 1)) {
                    return Err(Error::CellOverflow);
                }
                ok!(self.store_bit_one());
                self.store_reference(cell)
            }
            None => self.store_bit_zero(),
        }
    }

    /// Tries to build a new cell using the default cell context.
    #[inline]
    pub fn build(self) -> Result<Cell, Error> {
        self.build_ext(Cell::empty_context())
    }

    /// Tries to build a new cell using the specified cell context.
    pub fn build_ext(mut self, context: &dyn CellContext) -> Result<Cell, Error> {
        debug_assert!(self.bit_len <= MAX_BIT_LEN);
        debug_assert!(self.references.len() <= MAX_REF_COUNT);

        let mut children_mask = LevelMask::EMPTY;
        for child in self.references.iter() {
            children_mask |= child.as_ref().level_mask();
        }

        let is_exotic = self.is_exotic;

        let level_mask = 'mask: {
            // NOTE: make only a brief check here, as it will raise a proper error in finalizer
            if is_exotic && self.bit_len >= 8 {
                if let Some(ty) = super::CellType::from_byte_exotic(self.data[0]) {
                    match ty {
                        super::CellType::PrunedBranch => {
                            if self.bit_len >= 16 {
                                break 'mask LevelMask::new(self.data[1]);
                            }
                        }
                        super::CellType::MerkleProof | super::CellType::MerkleUpdate => {
                            break 'mask children_mask.virtualize(1);
                        }
                        super::CellType::LibraryReference => break 'mask LevelMask::EMPTY,
                        super::CellType::Ordinary => {}
                    }
                }
            }

            children_mask
        };

        let d1 = CellDescriptor::compute_d1(level_mask, is_exotic, self.references.len() as u8);
        let d2 = CellDescriptor::compute_d2(self.bit_len);

        let rem = self.bit_len % 8;
        let last_byte = (self.bit_len / 8) as usize;
        if rem > 0 {
            // x0000000 - rem=1, tag_mask=01000000
            // ...
            // xxxxxxx0 - rem=7, tag_mask=00000001
            let tag_mask: u8 = 1 << (7 - rem);
            self.data[last_byte] |= tag_mask;
        }

        let byte_len = ((self.bit_len + 7) / 8) as usize;
        let data = &self.data[..byte_len];

        let cell_parts = CellParts {
            bit_len: self.bit_len,
            descriptor: CellDescriptor { d1, d2 },
            children_mask,
            references: std::mem::take(&mut self.references),
            data,
        };
        context.finalize_cell(cell_parts)
    }
}

/// Builder data interpreted as an ordinary cell without references.
#[repr(transparent)]
struct IntermediateDataCell(CellBuilder);

impl IntermediateDataCell {
    #[inline(always)]
    const fn wrap(value: &CellBuilder) -> &Self {
        // SAFETY: IntermediateDataCell is #[repr(transparent)]
        unsafe { &*(value as *const CellBuilder as *const Self) }
    }
}

impl CellImpl for IntermediateDataCell {
    fn descriptor(&self) -> CellDescriptor {
        CellDescriptor {
            d1: 0,
            d2: CellDescriptor::compute_d2(self.0.bit_len),
        }
    }

    fn data(&self) -> &[u8] {
        self.0.raw_data()
    }

    fn bit_len(&self) -> u16 {
        self.0.bit_len
    }

    fn reference(&self, _: u8) -> Option<&DynCell> {
        None
    }

    fn reference_cloned(&self, _: u8) -> Option<Cell> {
        None
    }

    fn hash(&self, _: u8) -> &HashBytes {
        EMPTY_CELL_HASH
    }

    fn depth(&self, _: u8) -> u16 {
        0
    }
}

/// Builder data and references interpreted as an ordinary cell.
#[repr(transparent)]
struct IntermediateFullCell(CellBuilder);

impl IntermediateFullCell {
    #[inline(always)]
    const fn wrap(value: &CellBuilder) -> &Self {
        // SAFETY: IntermediateFullCell is #[repr(transparent)]
        unsafe { &*(value as *const CellBuilder as *const Self) }
    }
}

impl CellImpl for IntermediateFullCell {
    fn descriptor(&self) -> CellDescriptor {
        CellDescriptor {
            d1: self.0.references.len() as u8,
            d2: CellDescriptor::compute_d2(self.0.bit_len),
        }
    }

    fn data(&self) -> &[u8] {
        self.0.raw_data()
    }

    fn bit_len(&self) -> u16 {
        self.0.bit_len
    }

    fn reference(&self, index: u8) -> Option<&DynCell> {
        match self.0.references.get(index as usize) {
            Some(cell) => Some(cell.as_ref()),
            None => None,
        }
    }

    fn reference_cloned(&self, index: u8) -> Option<Cell> {
        self.0.references.get(index as usize).cloned()
    }

    fn hash(&self, _: u8) -> &HashBytes {
        EMPTY_CELL_HASH
    }

    fn depth(&self, _: u8) -> u16 {
        0
    }
}

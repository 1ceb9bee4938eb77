use super::{Cell, CellBuilder, CellContext, CellSlice, HashBytes, Load, Store};
use crate::error::Error;

/// Amount of data bits and references.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size {
    /// Amount of data bits.
    pub bits: u16,
    /// Amount of references.
    pub refs: u8,
}

impl Size {
    /// The additive identity for this type, i.e. `0`.
    pub const ZERO: Self = Self { bits: 0, refs: 0 };

    /// The multiplicative bits identity for this type, i.e. `1 bit`.
    pub const BIT: Self = Self { bits: 1, refs: 0 };

    /// The multiplicative refs identity for this type, i.e. `1 ref`.
    pub const REF: Self = Self { bits: 0, refs: 1 };

    /// Saturating size addition. Computes self + rhs for bits and refs,
    /// saturating at the numeric bounds instead of overflowing.
    #[inline]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self {
            bits: self.bits.saturating_add(rhs.bits),
            refs: self.refs.saturating_add(rhs.refs),
        }
    }

    /// Returns true if the number of bits and refs is in the valid range for the cell.
    #[inline]
    pub const fn fits_into_cell(&self) -> bool {
        self.bits <= super::MAX_BIT_LEN && self.refs as usize <= super::MAX_REF_COUNT
    }
}

impl std::ops::Add for Size {
    type Output = Self;

    #[inline]
    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl std::ops::AddAssign for Size {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.bits += rhs.bits;
        self.refs += rhs.refs;
    }
}

/// Type with a known size in bits and refs.
///
/// For value-dependent layouts (var-uints, addresses, options) the size
/// is computed for the current value.
pub trait ExactSize {
    /// Exact size of the value when it is stored in a slice.
    fn exact_size(&self) -> Size;
}

impl<T: ExactSize + ?Sized> ExactSize for &T {
    #[inline]
    fn exact_size(&self) -> Size {
        T::exact_size(self)
    }
}

impl<T: ExactSize + ?Sized> ExactSize for Box<T> {
    #[inline]
    fn exact_size(&self) -> Size {
        T::exact_size(self)
    }
}

impl<T: ExactSize> ExactSize for Option<T> {
    #[inline]
    fn exact_size(&self) -> Size {
        let mut size = Size::BIT;
        if let Some(value) = self {
            size += value.exact_size();
        }
        size
    }
}

impl ExactSize for CellSlice<'_> {
    #[inline]
    fn exact_size(&self) -> Size {
        self.size()
    }
}

impl ExactSize for CellBuilder {
    #[inline]
    fn exact_size(&self) -> Size {
        Size {
            bits: self.bit_len(),
            refs: self.reference_count(),
        }
    }
}

impl ExactSize for Cell {
    #[inline]
    fn exact_size(&self) -> Size {
        Size::REF
    }
}

macro_rules! strip_plus {
    (+ $($rest:tt)*) => {
        $($rest)*
    }
}

macro_rules! impl_exact_size_for_tuples {
    ($( ($($tt:tt: $t:ident),+) ),*$(,)?) => {$(
        impl<$($t: ExactSize),+> ExactSize for ($($t),*,) {
            fn exact_size(&self) -> Size {
                strip_plus!($(+ ExactSize::exact_size(&self.$tt))+)
            }
        }
    )*};
}

impl_exact_size_for_tuples! {
    (0: T0, 1: T1),
    (0: T0, 1: T1, 2: T2),
    (0: T0, 1: T1, 2: T2, 3: T3),
}

macro_rules! impl_exact_size_for_primitives {
    ($($bits:literal => [$($t:ty),*]),*$(,)?) => {$($(
        impl ExactSize for $t {
            #[inline]
            fn exact_size(&self) -> Size {
                Size { bits: $bits, refs: 0 }
            }
        }
    )*)*};
}

impl_exact_size_for_primitives! {
    0 => [()],
    1 => [bool],
    8 => [u8, i8],
    16 => [u16, i16],
    32 => [u32, i32],
    64 => [u64, i64],
    128 => [u128, i128],
    256 => [HashBytes],
}

impl<const N: usize> ExactSize for [u8; N] {
    #[inline]
    fn exact_size(&self) -> Size {
        Size {
            bits: (N * 8) as u16,
            refs: 0,
        }
    }
}

/// Value which is stored either inline or in a child cell
/// (`Either X ^X`).
///
/// On store, the value is inlined when the builder has enough capacity
/// for the tag bit and the value itself, otherwise it is demoted to a
/// separate cell.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SliceOrCell<T>(pub T);

impl<T: Store + ExactSize> Store for SliceOrCell<T> {
    fn store_into(
        &self,
        builder: &mut CellBuilder,
        context: &dyn CellContext,
    ) -> Result<(), Error> {
        let size = self.0.exact_size();
        if builder.has_capacity(1 + size.bits, size.refs) {
            let snapshot = builder.snapshot();
            ok!(builder.store_bit_zero());
            match self.0.store_into(builder, context) {
                Ok(()) => Ok(()),
                Err(e) => {
                    builder.restore(snapshot);
                    Err(e)
                }
            }
        } else {
            if !builder.has_capacity(1, 1) {
                return Err(Error::CellOverflow);
            }
            let cell = ok!(CellBuilder::build_from_ext(&self.0, context));
            ok!(builder.store_bit_one());
            builder.store_reference(cell)
        }
    }
}

impl<'a, T: Load<'a>> Load<'a> for SliceOrCell<T> {
    fn load_from(slice: &mut CellSlice<'a>) -> Result<Self, Error> {
        let prev = *slice;
        let result = if ok!(slice.load_bit()) {
            match slice.load_reference() {
                Ok(cell) => match cell.as_slice() {
                    Ok(mut child) => T::load_from(&mut child),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            }
        } else {
            T::load_from(slice)
        };

        match result {
            Ok(value) => Ok(Self(value)),
            Err(e) => {
                *slice = prev;
                Err(e)
            }
        }
    }
}

impl<T: ExactSize> SliceOrCell<T> {
    /// Returns whether the value will be inlined into the builder.
    #[inline]
    pub fn fits_inline(&self, builder: &CellBuilder) -> bool {
        let size = self.0.exact_size();
        builder.has_capacity(1 + size.bits, size.refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::MAX_BIT_LEN;

    #[test]
    fn sizes() {
        assert_eq!((1u8, 2u32).exact_size(), Size { bits: 40, refs: 0 });
        assert_eq!(Some(Cell::empty_cell()).exact_size(), Size { bits: 1, refs: 1 });
        assert_eq!(None::<u64>.exact_size(), Size::BIT);
        assert!(Size { bits: MAX_BIT_LEN, refs: 4 }.fits_into_cell());
        assert!(!(Size { bits: MAX_BIT_LEN, refs: 4 } + Size::BIT).fits_into_cell());
    }

    #[test]
    fn slice_or_cell_inline() {
        let mut builder = CellBuilder::new();
        builder.store_u32(1).unwrap();
        SliceOrCell(0xdeadbeafu32)
            .store_into(&mut builder, Cell::empty_context())
            .unwrap();
        assert_eq!(builder.bit_len(), 32 + 1 + 32);
        assert_eq!(builder.reference_count(), 0);

        let cell = builder.build().unwrap();
        let mut slice = cell.as_slice().unwrap();
        slice.skip_first(32, 0).unwrap();
        let SliceOrCell(value) = slice.load::<SliceOrCell<u32>>().unwrap();
        assert_eq!(value, 0xdeadbeaf);
        slice.end_parse().unwrap();
    }

    #[test]
    fn slice_or_cell_demoted() {
        let mut builder = CellBuilder::new();
        builder.store_zeros(MAX_BIT_LEN - 20).unwrap();

        let value = SliceOrCell(0xdeadbeafu32);
        assert!(!value.fits_inline(&builder));
        value.store_into(&mut builder, Cell::empty_context()).unwrap();
        assert_eq!(builder.bit_len(), MAX_BIT_LEN - 19);
        assert_eq!(builder.reference_count(), 1);

        let cell = builder.build().unwrap();
        let mut slice = cell.as_slice().unwrap();
        slice.skip_first(MAX_BIT_LEN - 20, 0).unwrap();
        assert_eq!(slice.load::<SliceOrCell<u32>>().unwrap(), value);
        slice.end_parse().unwrap();
    }
}

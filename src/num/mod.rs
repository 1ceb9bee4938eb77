//! Integer helper types with a fixed or variable bit layout.

use std::fmt;
use std::str::FromStr;

use crate::cell::*;
use crate::error::{Error, ParseIntError};
use crate::util::unlikely;

/// Conversions, parsing and arithmetic shared by all bounded integers.
///
/// Arithmetic operators do not check the upper bound; an out of range
/// value is only rejected when it is stored. Use `checked_*` methods
/// when the bound matters.
macro_rules! impl_bounded_common {
    ($ident:ident, $inner:ty) => {
        impl $ident {
            /// Checked addition. Returns `None` when the result does not fit.
            #[inline]
            #[must_use]
            pub const fn checked_add(self, rhs: Self) -> Option<Self> {
                match self.0.checked_add(rhs.0) {
                    Some(sum) if sum <= Self::MAX.0 => Some(Self(sum)),
                    _ => None,
                }
            }

            /// Checked subtraction. Returns `None` on underflow.
            #[inline]
            #[must_use]
            pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
                match self.0.checked_sub(rhs.0) {
                    Some(diff) => Some(Self(diff)),
                    None => None,
                }
            }

            /// Adds `rhs` in place, failing with [`Error::IntOverflow`] when out of range.
            pub fn try_add_assign(&mut self, rhs: Self) -> Result<(), Error> {
                *self = ok!(self.checked_add(rhs).ok_or(Error::IntOverflow));
                Ok(())
            }

            /// Subtracts `rhs` in place, failing with [`Error::IntOverflow`] on underflow.
            pub fn try_sub_assign(&mut self, rhs: Self) -> Result<(), Error> {
                *self = ok!(self.checked_sub(rhs).ok_or(Error::IntOverflow));
                Ok(())
            }
        }

        impl From<$ident> for $inner {
            #[inline]
            fn from(value: $ident) -> Self {
                value.0
            }
        }

        impl TryFrom<$inner> for $ident {
            type Error = ParseIntError;

            #[inline]
            fn try_from(inner: $inner) -> Result<Self, Self::Error> {
                let value = Self(inner);
                if value.is_valid() {
                    Ok(value)
                } else {
                    Err(ParseIntError::Overflow)
                }
            }
        }

        impl FromStr for $ident {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.parse::<$inner>() {
                    Ok(inner) => Self::try_from(inner),
                    Err(e) => Err(ParseIntError::InvalidString(e)),
                }
            }
        }

        impl PartialEq<$inner> for $ident {
            #[inline]
            fn eq(&self, other: &$inner) -> bool {
                self.0 == *other
            }
        }

        impl fmt::Display for $ident {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl std::ops::Add for $ident {
            type Output = Self;

            #[inline]
            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl std::ops::AddAssign for $ident {
            #[inline]
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }

        impl std::ops::Sub for $ident {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: Self) -> Self {
                Self(self.0 - rhs.0)
            }
        }

        impl std::ops::SubAssign for $ident {
            #[inline]
            fn sub_assign(&mut self, rhs: Self) {
                self.0 -= rhs.0;
            }
        }
    };
}

/// Plain serde impls through the underlying primitive.
macro_rules! impl_plain_serde {
    ($($ident:ident($inner:ty)),*$(,)?) => {$(
        #[cfg(feature = "serde")]
        impl serde::Serialize for $ident {
            #[inline]
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serde::Serialize::serialize(&self.0, serializer)
            }
        }

        #[cfg(feature = "serde")]
        impl<'de> serde::Deserialize<'de> for $ident {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let inner = ok!(<$inner as serde::Deserialize>::deserialize(deserializer));
                Self::try_from(inner).map_err(serde::de::Error::custom)
            }
        }
    )*};
}

/// Integers stored as `len:(#< N) value:(uint len*8)`.
macro_rules! define_var_uints {
    ($($(#[doc = $doc:expr])* $vis:vis struct $ident:ident($inner:ty, max_bytes = $max_bytes:literal);)*) => {$(
        $(#[doc = $doc])*
        #[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
        #[repr(transparent)]
        $vis struct $ident($inner);

        impl $ident {
            /// Zero value.
            pub const ZERO: Self = Self(0);
            /// One.
            pub const ONE: Self = Self(1);
            /// The largest representable value.
            pub const MAX: Self = Self(<$inner>::MAX >> ((std::mem::size_of::<$inner>() - $max_bytes) * 8));

            /// Width of the length prefix in bits.
            pub const LEN_BITS: u16 = 8 - ($max_bytes as u8).leading_zeros() as u16;
            /// Width of the largest representable value in bits.
            pub const MAX_BITS: u16 = Self::LEN_BITS + $max_bytes * 8;

            /// Wraps a primitive integer without a range check.
            #[inline]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Returns the underlying primitive integer.
            #[inline]
            pub const fn into_inner(self) -> $inner {
                self.0
            }

            #[inline]
            pub const fn is_zero(&self) -> bool {
                self.0 == 0
            }

            /// Whether the value fits into `max_bytes` bytes.
            #[inline]
            pub const fn is_valid(&self) -> bool {
                self.0 <= Self::MAX.0
            }

            /// Number of bits this value occupies when stored,
            /// or `None` if it is out of range.
            pub const fn bit_len(&self) -> Option<u16> {
                let value_bytes = (<$inner>::BITS - self.0.leading_zeros()).div_ceil(8);
                if unlikely(value_bytes > $max_bytes) {
                    None
                } else {
                    Some(Self::LEN_BITS + value_bytes as u16 * 8)
                }
            }
        }

        impl ExactSize for $ident {
            #[inline]
            fn exact_size(&self) -> Size {
                Size {
                    bits: self.bit_len().unwrap_or_default(),
                    refs: 0,
                }
            }
        }

        impl Store for $ident {
            #[inline]
            fn store_into(&self, builder: &mut CellBuilder, _: &dyn CellContext) -> Result<(), Error> {
                builder.store_var_uint(self.0 as u128, Self::LEN_BITS)
            }
        }

        impl<'a> Load<'a> for $ident {
            #[inline]
            fn load_from(slice: &mut CellSlice<'a>) -> Result<Self, Error> {
                let value = ok!(slice.load_var_uint(Self::LEN_BITS));
                Ok(Self(value as $inner))
            }
        }
    )*};
}

define_var_uints! {
    /// Variable-length 24-bit integer (`VarUInteger 4`).
    ///
    /// Stored as 2 bits of `len` (`0..=3`), followed by `len` bytes.
    pub struct VarUint24(u32, max_bytes = 3);

    /// Variable-length 56-bit integer (`VarUInteger 8`).
    ///
    /// Stored as 3 bits of `len` (`0..=7`), followed by `len` bytes.
    pub struct VarUint56(u64, max_bytes = 7);

    /// Amount of nanotons (`VarUInteger 16`, a.k.a. `Grams` or coins).
    ///
    /// Stored as 4 bits of `len` (`0..=15`), followed by `len` bytes.
    pub struct Tokens(u128, max_bytes = 15);
}

impl_bounded_common!(VarUint24, u32);
impl_bounded_common!(VarUint56, u64);
impl_plain_serde!(VarUint24(u32), VarUint56(u64));

impl_bounded_common!(Tokens, u128);

impl std::iter::Sum for Tokens {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, std::ops::Add::add)
    }
}

/// Human readable formats get a decimal string, since `u128`
/// does not fit into JSON numbers.
#[cfg(feature = "serde")]
impl serde::Serialize for Tokens {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(&self.0)
        } else {
            serde::Serialize::serialize(&self.0, serializer)
        }
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Tokens {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        if deserializer.is_human_readable() {
            let s = ok!(<std::borrow::Cow<'de, str> as serde::Deserialize>::deserialize(
                deserializer
            ));
            s.parse().map_err(D::Error::custom)
        } else {
            let inner = ok!(<u128 as serde::Deserialize>::deserialize(deserializer));
            Self::try_from(inner).map_err(D::Error::custom)
        }
    }
}

impl crate::dict::AugDictExtra for Tokens {
    fn comp_add(
        left: &mut CellSlice,
        right: &mut CellSlice,
        b: &mut CellBuilder,
        cx: &dyn CellContext,
    ) -> Result<(), Error> {
        let left = ok!(Self::load_from(left));
        let right = ok!(Self::load_from(right));
        match left.checked_add(right) {
            Some(sum) => sum.store_into(b, cx),
            None => Err(Error::IntOverflow),
        }
    }
}

/// Integers stored as exactly `N` bits.
macro_rules! define_fixed_uints {
    ($($(#[doc = $doc:expr])* $vis:vis struct $ident:ident($bits:literal);)*) => {$(
        $(#[doc = $doc])*
        #[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
        #[repr(transparent)]
        $vis struct $ident(u16);

        impl $ident {
            /// Zero value.
            pub const ZERO: Self = Self(0);
            /// One.
            pub const ONE: Self = Self(1);
            /// The largest representable value.
            pub const MAX: Self = Self((1u16 << $bits) - 1);
            /// Width in bits.
            pub const BITS: u16 = $bits;

            /// Wraps a primitive integer without a range check.
            #[inline]
            pub const fn new(value: u16) -> Self {
                Self(value)
            }

            /// Returns the underlying primitive integer.
            #[inline]
            pub const fn into_inner(self) -> u16 {
                self.0
            }

            /// Whether the value fits into `BITS` bits.
            #[inline]
            pub const fn is_valid(&self) -> bool {
                self.0 <= Self::MAX.0
            }
        }

        impl ExactSize for $ident {
            #[inline]
            fn exact_size(&self) -> Size {
                Size { bits: $bits, refs: 0 }
            }
        }

        impl Store for $ident {
            fn store_into(&self, builder: &mut CellBuilder, _: &dyn CellContext) -> Result<(), Error> {
                if unlikely(!self.is_valid()) {
                    return Err(Error::IntOverflow);
                }
                builder.store_uint(self.0 as u64, $bits)
            }
        }

        impl<'a> Load<'a> for $ident {
            fn load_from(slice: &mut CellSlice<'a>) -> Result<Self, Error> {
                let value = ok!(slice.load_uint($bits));
                Ok(Self(value as u16))
            }
        }

        impl crate::dict::DictKey for $ident {
            const BITS: u16 = $bits;

            #[inline]
            fn from_raw_data(d: &[u8; 128]) -> Option<Self> {
                Some(Self(u16::from_be_bytes([d[0], d[1]]) >> (16 - $bits)))
            }
        }

        impl_bounded_common!($ident, u16);
    )*};
}

define_fixed_uints! {
    /// Fixed-length 9-bit integer (`## 9`), used for address lengths.
    pub struct Uint9(9);

    /// Fixed-length 12-bit integer (`## 12`).
    pub struct Uint12(12);
}

impl_plain_serde!(Uint9(u16), Uint12(u16));

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! check_arithmetic {
        ($($ident:ident),*) => {$({
            assert_eq!($ident::new(10) + $ident::new(4), $ident::new(14));
            assert_eq!($ident::new(10) - $ident::new(4), $ident::new(6));

            let mut value = $ident::new(7);
            value += $ident::ONE;
            value -= $ident::new(2);
            assert_eq!(value, $ident::new(6));

            assert!(!($ident::MAX + $ident::ONE).is_valid());
            assert_eq!($ident::MAX.checked_add($ident::ONE), None);
            assert_eq!(($ident::MAX - $ident::ONE).checked_add($ident::ONE), Some($ident::MAX));
            assert_eq!($ident::ZERO.checked_sub($ident::ONE), None);

            let mut value = $ident::MAX;
            assert_eq!(value.try_add_assign($ident::ONE), Err(Error::IntOverflow));
            value.try_sub_assign($ident::ONE).unwrap();
            assert_eq!(value, $ident::MAX - $ident::ONE);
        })*};
    }

    macro_rules! check_each_bit {
        ($ident:ident, $inner:ty) => {
            for i in 0..<$inner>::BITS {
                let value = $ident::new(1 << i);
                let mut builder = CellBuilder::new();

                let res = value.store_into(&mut builder, Cell::empty_context());
                if value.is_valid() {
                    res.unwrap();
                    let cell = builder.build().unwrap();
                    assert_eq!(value.exact_size().bits, cell.bit_len());
                    assert_eq!(cell.parse::<$ident>().unwrap(), value);
                } else {
                    assert_eq!(res.unwrap_err(), Error::IntOverflow);
                }
            }
        };
    }

    #[test]
    fn arithmetic() {
        check_arithmetic!(Uint9, Uint12, VarUint24, VarUint56, Tokens);
    }

    #[test]
    fn fixed_len_serialization() {
        check_each_bit!(Uint9, u16);
        check_each_bit!(Uint12, u16);
    }

    #[test]
    fn var_len_serialization() {
        check_each_bit!(VarUint24, u32);
        check_each_bit!(VarUint56, u64);
        check_each_bit!(Tokens, u128);

        assert_eq!(VarUint24::LEN_BITS, 2);
        assert_eq!(VarUint56::LEN_BITS, 3);
        assert_eq!(Tokens::LEN_BITS, 4);
        assert_eq!(Tokens::MAX_BITS, 124);
    }

    #[test]
    fn coins_layout() {
        // 1e9 = 0x3B9ACA00 takes 4 bytes
        let tokens = Tokens::new(1_000_000_000);
        assert_eq!(tokens.bit_len(), Some(4 + 32));

        let cell = CellBuilder::build_from(&tokens).unwrap();
        assert_eq!(cell.bit_len(), 36);
        assert_eq!(cell.data(), &[0x43, 0xb9, 0xac, 0xa0, 0x08]);

        let zero = CellBuilder::build_from(&Tokens::ZERO).unwrap();
        assert_eq!(zero.bit_len(), 4);

        let total: Tokens = [Tokens::ONE, Tokens::new(2), Tokens::new(3)].into_iter().sum();
        assert_eq!(total, Tokens::new(6));
    }

    #[test]
    fn parse_from_str() {
        assert_eq!("123".parse::<Tokens>().unwrap(), Tokens::new(123));
        assert!("abc".parse::<Tokens>().is_err());
        assert!(matches!(
            "1024".parse::<Uint9>(),
            Err(ParseIntError::Overflow)
        ));
        assert_eq!("511".parse::<Uint9>().unwrap(), Uint9::MAX);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn tokens_serde() {
        let tokens = Tokens::new(u64::MAX as u128 * 10);
        let json = serde_json::to_string(&tokens).unwrap();
        assert_eq!(json, format!("\"{}\"", u64::MAX as u128 * 10));
        assert_eq!(serde_json::from_str::<Tokens>(&json).unwrap(), tokens);

        assert!(serde_json::from_str::<Uint9>("512").is_err());
        assert_eq!(serde_json::from_str::<Uint9>("12").unwrap(), Uint9::new(12));
    }
}

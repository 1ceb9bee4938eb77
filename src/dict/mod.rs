//! Dictionary implementation.

use crate::cell::*;
use crate::error::Error;
use crate::util::unlikely;

pub use self::aug::*;
pub use self::ops::*;
pub use self::pfx::*;
pub use self::raw::*;
pub use self::typed::*;

mod aug;
mod pfx;
mod raw;
mod typed;

mod ops {
    pub use self::build::*;
    pub use self::get::*;
    pub use self::insert::*;
    pub use self::remove::*;

    mod build;
    mod get;
    mod insert;
    mod remove;
}

#[cfg(test)]
mod tests;

/// Type which can be used as a dictionary key.
pub trait DictKey: Sized {
    /// Length in bits for a dictionary key.
    const BITS: u16;

    /// Creates a key from a raw builder data.
    fn from_raw_data(raw_data: &[u8; 128]) -> Option<Self>;
}

#[inline]
fn read_array<const N: usize>(raw_data: &[u8; 128]) -> [u8; N] {
    std::array::from_fn(|i| raw_data[i])
}

macro_rules! impl_dict_key {
    ($($ty:ty => $bits:literal => |$raw_data:ident| $expr:expr),*,) => {
        $(impl DictKey for $ty {
            const BITS: u16 = $bits;

            #[inline]
            fn from_raw_data($raw_data: &[u8; 128]) -> Option<Self> {
                Some($expr)
            }
        })*
    };
}

impl_dict_key! {
    bool => 1 => |d| d[0] & 0x80 != 0,
    u8 => 8 => |d| d[0],
    i8 => 8 => |d| d[0] as i8,
    u16 => 16 => |d| u16::from_be_bytes(read_array(d)),
    i16 => 16 => |d| i16::from_be_bytes(read_array(d)),
    u32 => 32 => |d| u32::from_be_bytes(read_array(d)),
    i32 => 32 => |d| i32::from_be_bytes(read_array(d)),
    u64 => 64 => |d| u64::from_be_bytes(read_array(d)),
    i64 => 64 => |d| i64::from_be_bytes(read_array(d)),
    u128 => 128 => |d| u128::from_be_bytes(read_array(d)),
    i128 => 128 => |d| i128::from_be_bytes(read_array(d)),
    HashBytes => 256 => |d| HashBytes(read_array(d)),
}

impl<const N: usize> DictKey for [u8; N] {
    const BITS: u16 = (N * 8) as u16;

    #[inline]
    fn from_raw_data(raw_data: &[u8; 128]) -> Option<Self> {
        if N <= 128 {
            Some(read_array(raw_data))
        } else {
            None
        }
    }
}

/// Dictionary insertion mode.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SetMode {
    /// Sets the value associated with the key in the dictionary.
    Set = 0b11,
    /// Sets the value associated with the key in the dictionary
    /// only if the key was already present in it.
    Replace = 0b01,
    /// Sets the value associated with key in dictionary,
    /// but only if it is not already present.
    Add = 0b10,
}

impl SetMode {
    /// Returns `true` if the new value can replace the old value for the same key.
    #[inline]
    pub const fn can_replace(self) -> bool {
        self as u8 & 0b01 != 0
    }

    /// Returns `true` if inserting a value can add a new key to the dictionary.
    #[inline]
    pub const fn can_add(self) -> bool {
        self as u8 & 0b10 != 0
    }
}

/// Fold of two child extras into the parent extra.
///
/// Both slices start at the extra of the corresponding child node.
pub type AugDictFn = fn(
    left: &mut CellSlice,
    right: &mut CellSlice,
    builder: &mut CellBuilder,
    context: &dyn CellContext,
) -> Result<(), Error>;

/// Extra value stored in every node of an augmented dictionary.
pub trait AugDictExtra: Default {
    /// Reads extras of two children and stores their combination.
    fn comp_add(
        left: &mut CellSlice,
        right: &mut CellSlice,
        b: &mut CellBuilder,
        cx: &dyn CellContext,
    ) -> Result<(), Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Branch {
    // Branch for a key part that starts with bit 0
    Left = 0,
    // Branch for a key part that starts with bit 1
    Right = 1,
}

impl Branch {
    #[inline]
    pub(crate) fn into_bit(self) -> bool {
        self == Self::Right
    }

    #[inline]
    pub(crate) fn reversed(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

impl From<bool> for Branch {
    #[inline]
    fn from(value: bool) -> Self {
        if value {
            Self::Right
        } else {
            Self::Left
        }
    }
}

/// Fork on the path from the root to the target node.
#[derive(Clone, Copy)]
pub(crate) struct Segment<'a> {
    pub data: &'a DynCell,
    pub next_branch: Branch,
    /// Remaining key bits before the fork label.
    pub key_bit_len: u16,
}

impl<'a> Segment<'a> {
    /// Rebuilds this fork after its `next_branch` child was removed,
    /// merging the fork label with the label of the opposite child.
    ///
    /// Returns the new edge cell and the removed child cell.
    pub(crate) fn rebuild_as_removed(
        self,
        child_key_bit_len: u16,
        context: &dyn CellContext,
    ) -> Result<(Cell, Cell), Error> {
        let index = self.next_branch as u8;

        let Some(removed) = self.data.reference_cloned(index) else {
            return Err(Error::CellUnderflow);
        };

        let pfx = ok!(read_label(&mut ok!(self.data.as_slice()), self.key_bit_len));

        let mut opposite = ok!(self.data.get_reference_as_slice(1 - index));
        let rem = ok!(read_label(&mut opposite, child_key_bit_len));

        let mut builder = CellBuilder::new();
        ok!(write_label_parts(
            &pfx,
            self.next_branch.reversed().into_bit(),
            &rem,
            self.key_bit_len,
            &mut builder
        ));
        ok!(builder.store_slice(&opposite));
        let edge = ok!(builder.build_ext(context));

        Ok((edge, removed))
    }
}

/// Rebuilds forks on the path from the changed node up to the root.
///
/// Aug forks get their extra recomputed with the `comparator`.
pub(crate) fn rebuild_from_stack(
    mut stack: Vec<Segment<'_>>,
    mut leaf: Cell,
    comparator: Option<AugDictFn>,
    context: &dyn CellContext,
) -> Result<Cell, Error> {
    while let Some(last) = stack.pop() {
        let index = last.next_branch as u8;
        let Some(opposite) = last.data.reference_cloned(1 - index) else {
            return Err(Error::CellUnderflow);
        };
        let (left, right) = match last.next_branch {
            Branch::Left => (leaf, opposite),
            Branch::Right => (opposite, leaf),
        };

        // Reuse raw label bits of the fork
        let fork = ok!(last.data.as_slice());
        let mut rest = fork;
        let label = ok!(read_label(&mut rest, last.key_bit_len));
        let label_bits = fork.size_bits() - rest.size_bits();

        let mut builder = CellBuilder::new();
        ok!(builder.store_slice_data(&ok!(fork.get_prefix(label_bits, 0))));
        ok!(builder.store_reference(left.clone()));
        ok!(builder.store_reference(right.clone()));
        if let Some(comparator) = comparator {
            let child_key_bit_len = last.key_bit_len - label.size_bits() - 1;
            ok!(store_fork_extra(
                left.as_ref(),
                right.as_ref(),
                child_key_bit_len,
                comparator,
                &mut builder,
                context
            ));
        }
        leaf = ok!(builder.build_ext(context));
    }
    Ok(leaf)
}

/// Creates a leaf node (`label value` or `label extra value`).
pub(crate) fn make_leaf(
    key: &CellSlice,
    key_bit_len: u16,
    extra: Option<&dyn Store>,
    value: &dyn Store,
    context: &dyn CellContext,
) -> Result<Cell, Error> {
    let mut builder = CellBuilder::new();
    ok!(write_label(key, key_bit_len, &mut builder));
    if let Some(extra) = extra {
        ok!(extra.store_into(&mut builder, context));
    }
    ok!(value.store_into(&mut builder, context));
    builder.build_ext(context)
}

/// Splits an edge at the end of `lcp` into a fork with the old node
/// and a new leaf.
#[allow(clippy::too_many_arguments)]
pub(crate) fn split_edge(
    data: &CellSlice,
    prefix: &mut CellSlice,
    lcp: &CellSlice,
    key: &mut CellSlice,
    extra: Option<&dyn Store>,
    value: &dyn Store,
    comparator: Option<AugDictFn>,
    context: &dyn CellContext,
) -> Result<Cell, Error> {
    // Advance the key
    let prev_key_bit_len = key.size_bits();
    ok!(key.skip_first(lcp.size_bits() + 1, 0));

    // Read the next bit from the data
    ok!(prefix.skip_first(lcp.size_bits(), 0));
    let old_to_right = ok!(prefix.load_bit());

    // Move the old node one level down
    let mut left = ok!(make_leaf(prefix, key.size_bits(), None, data, context));
    // Create a leaf for the new value
    let mut right = ok!(make_leaf(key, key.size_bits(), extra, value, context));

    // The part that starts with 1 goes to the right cell
    if old_to_right {
        std::mem::swap(&mut left, &mut right);
    }

    let mut builder = CellBuilder::new();
    ok!(write_label(lcp, prev_key_bit_len, &mut builder));
    ok!(builder.store_reference(left.clone()));
    ok!(builder.store_reference(right.clone()));
    if let Some(comparator) = comparator {
        ok!(store_fork_extra(
            left.as_ref(),
            right.as_ref(),
            key.size_bits(),
            comparator,
            &mut builder,
            context
        ));
    }
    builder.build_ext(context)
}

/// Returns a slice which starts at the extra of the aug node.
pub(crate) fn read_node_extra(node: &DynCell, key_bit_len: u16) -> Result<CellSlice<'_>, Error> {
    let mut slice = ok!(node.as_slice());
    let label = ok!(read_label(&mut slice, key_bit_len));
    if label.size_bits() != key_bit_len {
        ok!(slice.skip_first(0, 2));
    }
    Ok(slice)
}

pub(crate) fn store_fork_extra(
    left: &DynCell,
    right: &DynCell,
    child_key_bit_len: u16,
    comparator: AugDictFn,
    builder: &mut CellBuilder,
    context: &dyn CellContext,
) -> Result<(), Error> {
    let mut left = ok!(read_node_extra(left, child_key_bit_len));
    let mut right = ok!(read_node_extra(right, child_key_bit_len));
    comparator(&mut left, &mut right, builder, context)
}

pub(crate) fn write_label(
    key: &CellSlice,
    key_bit_len: u16,
    label: &mut CellBuilder,
) -> Result<(), Error> {
    if key_bit_len == 0 || key.is_data_empty() {
        return write_hml_empty(label);
    }

    let bits_for_len = (16 - key_bit_len.leading_zeros()) as u16;

    let remaining_bits = key.size_bits();

    let hml_short_len = 2 + 2 * remaining_bits;
    let hml_long_len = 2 + bits_for_len + remaining_bits;
    let hml_same_len = 3 + bits_for_len;

    if hml_same_len < hml_long_len && hml_same_len < hml_short_len {
        if let Some(bit) = key.test_uniform() {
            return write_hml_same(bit, remaining_bits, bits_for_len, label);
        }
    }

    if hml_short_len <= MAX_BIT_LEN && hml_short_len <= hml_long_len {
        ok!(write_hml_short_tag(remaining_bits, label));
    } else if hml_long_len <= MAX_BIT_LEN {
        ok!(write_hml_long_tag(remaining_bits, bits_for_len, label));
    } else {
        return Err(Error::InvalidData);
    }
    label.store_slice_data(key)
}

pub(crate) fn write_label_parts(
    pfx: &CellSlice,
    bit: bool,
    rem: &CellSlice,
    key_bit_len: u16,
    label: &mut CellBuilder,
) -> Result<(), Error> {
    if key_bit_len == 0 {
        return write_hml_empty(label);
    }

    let bits_for_len = (16 - key_bit_len.leading_zeros()) as u16;

    let remaining_bits = pfx.size_bits() + 1 + rem.size_bits();

    let hml_short_len = 2 + 2 * remaining_bits;
    let hml_long_len = 2 + bits_for_len + remaining_bits;
    let hml_same_len = 3 + bits_for_len;

    if hml_same_len < hml_long_len && hml_same_len < hml_short_len {
        let pfx_uniform = pfx.is_data_empty() || pfx.test_uniform() == Some(bit);
        let rem_uniform = rem.is_data_empty() || rem.test_uniform() == Some(bit);
        if pfx_uniform && rem_uniform {
            return write_hml_same(bit, remaining_bits, bits_for_len, label);
        }
    }

    if hml_short_len <= MAX_BIT_LEN && hml_short_len <= hml_long_len {
        ok!(write_hml_short_tag(remaining_bits, label));
    } else if hml_long_len <= MAX_BIT_LEN {
        ok!(write_hml_long_tag(remaining_bits, bits_for_len, label));
    } else {
        return Err(Error::InvalidData);
    }
    ok!(label.store_slice_data(pfx));
    ok!(label.store_bit(bit));
    label.store_slice_data(rem)
}

/// Reads an edge label for a node with `key_bit_len` remaining key bits.
pub(crate) fn read_label<'a>(
    label: &mut CellSlice<'a>,
    key_bit_len: u16,
) -> Result<CellSlice<'a>, Error> {
    let bits_for_len = (16 - key_bit_len.leading_zeros()) as u16;

    let prefix = if label.is_data_empty() && bits_for_len == 0 {
        ok!(label.get_prefix(0, 0))
    } else if !ok!(label.load_bit()) {
        ok!(read_hml_short(label))
    } else if !ok!(label.load_bit()) {
        ok!(read_hml_long(label, bits_for_len))
    } else {
        ok!(read_hml_same(label, bits_for_len))
    };

    if unlikely(prefix.size_bits() > key_bit_len) {
        return Err(Error::CellUnderflow);
    }
    Ok(prefix)
}

fn write_hml_empty(label: &mut CellBuilder) -> Result<(), Error> {
    label.store_zeros(2)
}

fn write_hml_short_tag(len: u16, label: &mut CellBuilder) -> Result<(), Error> {
    ok!(label.store_bit_zero());
    label.store_unary(len)
}

fn read_hml_short<'a>(label: &mut CellSlice<'a>) -> Result<CellSlice<'a>, Error> {
    let len = ok!(label.load_unary());
    label.load_prefix(len, 0)
}

fn write_hml_long_tag(len: u16, bits_for_len: u16, label: &mut CellBuilder) -> Result<(), Error> {
    ok!(label.store_small_uint(0b10, 2));
    label.store_uint(len as u64, bits_for_len)
}

fn read_hml_long<'a>(label: &mut CellSlice<'a>, bits_for_len: u16) -> Result<CellSlice<'a>, Error> {
    let len = ok!(label.load_uint(bits_for_len)) as u16;
    label.load_prefix(len, 0)
}

fn write_hml_same(
    bit: bool,
    len: u16,
    bits_for_len: u16,
    label: &mut CellBuilder,
) -> Result<(), Error> {
    ok!(label.store_small_uint(0b110 | bit as u8, 3));
    label.store_uint(len as u64, bits_for_len)
}

fn read_hml_same<'a>(label: &mut CellSlice<'a>, bits_for_len: u16) -> Result<CellSlice<'a>, Error> {
    let cell = match ok!(label.load_bit()) {
        false => Cell::all_zeros_ref(),
        true => Cell::all_ones_ref(),
    };
    let len = ok!(label.load_uint(bits_for_len)) as u16;

    let slice = ok!(cell.as_slice());
    slice.get_prefix(len, 0)
}

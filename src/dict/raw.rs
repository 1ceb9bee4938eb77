use crate::cell::*;
use crate::error::Error;

use super::{
    dict_get, dict_get_owned, dict_insert, dict_load_from_root, dict_remove_owned, read_label,
    SetMode,
};

/// Untyped dictionary with `N`-bit keys.
///
/// Keys and values are passed around as cell slices. Typed wrappers
/// ([`Dict`], [`AugDict`]) are built on top of the same node layout:
///
/// ```text
/// hm_edge#_ {n:#} {X:Type} {l:#} {m:#} label:(HmLabel ~l n)
///           {n = (~m) + l} node:(HashmapNode m X) = Hashmap n X;
///
/// hmn_leaf#_ {X:Type} value:X = HashmapNode 0 X;
/// hmn_fork#_ {n:#} {X:Type} left:^(Hashmap n X)
///            right:^(Hashmap n X) = HashmapNode (n + 1) X;
///
/// hml_short$0 {m:#} {n:#} len:(Unary ~n) {n <= m} s:(n * Bit) = HmLabel ~n m;
/// hml_long$10 {m:#} n:(#<= m) s:(n * Bit) = HmLabel ~n m;
/// hml_same$11 {m:#} v:Bit n:(#<= m) = HmLabel ~n m;
///
/// hme_empty$0 {n:#} {X:Type} = HashmapE n X;
/// hme_root$1 {n:#} {X:Type} root:^(Hashmap n X) = HashmapE n X;
/// ```
///
/// [`Dict`]: crate::dict::Dict
/// [`AugDict`]: crate::dict::AugDict
#[derive(Clone, Default)]
pub struct RawDict<const N: u16>(pub(crate) Option<Cell>);

impl<const N: u16> ExactSize for RawDict<N> {
    #[inline]
    fn exact_size(&self) -> Size {
        Size {
            bits: 1,
            refs: self.0.is_some() as u8,
        }
    }
}

impl<'a, const N: u16> Load<'a> for RawDict<N> {
    #[inline]
    fn load_from(slice: &mut CellSlice<'a>) -> Result<Self, Error> {
        Option::<Cell>::load_from(slice).map(Self)
    }
}

impl<const N: u16> Store for RawDict<N> {
    #[inline]
    fn store_into(&self, builder: &mut CellBuilder, context: &dyn CellContext) -> Result<(), Error> {
        self.0.store_into(builder, context)
    }
}

impl<const N: u16> Eq for RawDict<N> {}
impl<const N: u16> PartialEq for RawDict<N> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(this), Some(other)) => this.repr_hash() == other.repr_hash(),
            (this, other) => this.is_none() && other.is_none(),
        }
    }
}

impl<const N: u16> From<Option<Cell>> for RawDict<N> {
    #[inline]
    fn from(root: Option<Cell>) -> Self {
        Self(root)
    }
}

impl<const N: u16> std::fmt::Debug for RawDict<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawDict")
            .field("key_bit_len", &N)
            .field("root", &self.0)
            .finish()
    }
}

impl<const N: u16> RawDict<N> {
    const _ASSERT: () = assert!(N > 0, "dictionary keys must not be empty");

    /// Creates an empty dictionary. Zero-width keys are rejected at compile time:
    ///
    /// ```compile_fail
    /// let _ = ton_cells::dict::RawDict::<0>::new();
    /// ```
    pub const fn new() -> Self {
        let _ = Self::_ASSERT;
        Self(None)
    }

    pub const fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Root cell of the dictionary, `None` when empty.
    #[inline]
    pub const fn root(&self) -> &Option<Cell> {
        &self.0
    }

    /// Reads a non-empty dictionary whose root is stored inline in `slice`.
    #[inline]
    pub fn load_from_root_ext(
        slice: &mut CellSlice<'_>,
        context: &dyn CellContext,
    ) -> Result<Self, Error> {
        let root = ok!(dict_load_from_root(slice, N, context));
        Ok(Self(Some(root)))
    }

    /// Value slice for `key`, if present.
    pub fn get<'a>(&'a self, key: CellSlice<'_>) -> Result<Option<CellSlice<'a>>, Error> {
        dict_get(self.0.as_ref(), N, key)
    }

    /// Owning leaf cell and value range for `key`, if present.
    pub fn get_owned(&self, key: CellSlice<'_>) -> Result<Option<CellSliceParts>, Error> {
        dict_get_owned(self.0.as_ref(), N, key)
    }

    pub fn contains_key(&self, key: CellSlice<'_>) -> Result<bool, Error> {
        Ok(ok!(self.get(key)).is_some())
    }

    /// Inserts or replaces the value for `key`.
    pub fn set_ext(
        &mut self,
        key: CellSlice<'_>,
        value: &dyn Store,
        context: &dyn CellContext,
    ) -> Result<bool, Error> {
        self.insert(key, value, SetMode::Set, context)
    }

    /// Changes the value only if `key` is already present.
    pub fn replace_ext(
        &mut self,
        key: CellSlice<'_>,
        value: &dyn Store,
        context: &dyn CellContext,
    ) -> Result<bool, Error> {
        self.insert(key, value, SetMode::Replace, context)
    }

    /// Inserts the value only if `key` is absent.
    pub fn add_ext(
        &mut self,
        key: CellSlice<'_>,
        value: &dyn Store,
        context: &dyn CellContext,
    ) -> Result<bool, Error> {
        self.insert(key, value, SetMode::Add, context)
    }

    /// Removes `key`, returning the owning leaf cell and value range.
    pub fn remove_ext(
        &mut self,
        mut key: CellSlice<'_>,
        context: &dyn CellContext,
    ) -> Result<Option<CellSliceParts>, Error> {
        dict_remove_owned(&mut self.0, &mut key, N, context)
    }

    fn insert(
        &mut self,
        mut key: CellSlice<'_>,
        value: &dyn Store,
        mode: SetMode,
        context: &dyn CellContext,
    ) -> Result<bool, Error> {
        dict_insert(&mut self.0, &mut key, N, value, mode, context)
    }

    /// Entries in ascending key order.
    ///
    /// Stops after the first malformed node, yielding its error.
    pub fn iter(&'_ self) -> RawIter<'_> {
        RawIter::new(&self.0, N)
    }

    /// Keys in ascending order.
    pub fn keys(&'_ self) -> RawKeys<'_> {
        RawKeys {
            inner: self.iter(),
        }
    }

    /// Values in ascending key order.
    pub fn values(&'_ self) -> RawValues<'_> {
        RawValues {
            inner: self.iter(),
        }
    }

    /// [`set_ext`](Self::set_ext) with an empty cell context.
    pub fn set<T: Store>(&mut self, key: CellSlice<'_>, value: T) -> Result<bool, Error> {
        self.set_ext(key, &value, Cell::empty_context())
    }

    /// [`replace_ext`](Self::replace_ext) with an empty cell context.
    pub fn replace<T: Store>(&mut self, key: CellSlice<'_>, value: T) -> Result<bool, Error> {
        self.replace_ext(key, &value, Cell::empty_context())
    }

    /// [`add_ext`](Self::add_ext) with an empty cell context.
    pub fn add<T: Store>(&mut self, key: CellSlice<'_>, value: T) -> Result<bool, Error> {
        self.add_ext(key, &value, Cell::empty_context())
    }

    /// [`remove_ext`](Self::remove_ext) with an empty cell context.
    pub fn remove(&mut self, key: CellSlice<'_>) -> Result<Option<CellSliceParts>, Error> {
        self.remove_ext(key, Cell::empty_context())
    }
}

/// Pre-order walk over the leaves of a dictionary.
///
/// Entries are visited in ascending order of unsigned keys.
/// Yields a builder with the full key and the value slice.
#[derive(Clone)]
pub struct RawIter<'a> {
    pending: Vec<PendingNode<'a>>,
    key: CellBuilder,
}

#[derive(Clone, Copy)]
struct PendingNode<'a> {
    cell: &'a DynCell,
    /// Key bits collected above the branch bit.
    key_bits: u16,
    /// Branch bit which leads to this node, `None` for the root.
    branch: Option<bool>,
    remaining_bit_len: u16,
}

impl<'a> RawIter<'a> {
    pub fn new(root: &'a Option<Cell>, bit_len: u16) -> Self {
        let pending = match root {
            Some(root) => vec![PendingNode {
                cell: root.as_ref(),
                key_bits: 0,
                branch: None,
                remaining_bit_len: bit_len,
            }],
            None => Vec::new(),
        };
        Self {
            pending,
            key: CellBuilder::new(),
        }
    }

    /// Stops the iteration and passes the error through.
    #[inline]
    pub(crate) fn finish(&mut self, err: Error) -> Error {
        self.pending.clear();
        err
    }

    fn visit(&mut self, node: PendingNode<'a>) -> Result<Option<CellSlice<'a>>, Error> {
        let mut data = ok!(node.cell.as_slice());

        ok!(self.key.rewind(self.key.bit_len() - node.key_bits));
        if let Some(bit) = node.branch {
            ok!(self.key.store_bit(bit));
        }

        let label = ok!(read_label(&mut data, node.remaining_bit_len));
        ok!(self.key.store_slice_data(&label));

        let remaining_bit_len = match node.remaining_bit_len.checked_sub(label.size_bits()) {
            Some(0) => return Ok(Some(data)),
            Some(remaining) => remaining - 1,
            None => return Err(Error::CellUnderflow),
        };

        let (Some(left), Some(right)) = (node.cell.reference(0), node.cell.reference(1)) else {
            return Err(Error::CellUnderflow);
        };

        let key_bits = self.key.bit_len();
        for (cell, bit) in [(right, true), (left, false)] {
            self.pending.push(PendingNode {
                cell,
                key_bits,
                branch: Some(bit),
                remaining_bit_len,
            });
        }
        Ok(None)
    }
}

impl<'a> Iterator for RawIter<'a> {
    type Item = Result<(CellBuilder, CellSlice<'a>), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.pending.pop() {
            match self.visit(node) {
                Ok(Some(value)) => return Some(Ok((self.key.clone(), value))),
                Ok(None) => continue,
                Err(e) => return Some(Err(self.finish(e))),
            }
        }
        None
    }
}

/// Keys of a [`RawDict`] in ascending order.
#[derive(Clone)]
pub struct RawKeys<'a> {
    inner: RawIter<'a>,
}

impl Iterator for RawKeys<'_> {
    type Item = Result<CellBuilder, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.inner.next()?.map(|(key, _)| key))
    }
}

/// Values of a [`RawDict`] in ascending key order.
#[derive(Clone)]
pub struct RawValues<'a> {
    inner: RawIter<'a>,
}

impl<'a> Iterator for RawValues<'a> {
    type Item = Result<CellSlice<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.inner.next()?.map(|(_, value)| value))
    }
}

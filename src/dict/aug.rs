use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::cell::*;
use crate::error::Error;

use super::raw::RawIter;
use super::typed::serialize_key;
use super::{
    aug_dict_insert, aug_dict_remove_owned, build_aug_dict_from_sorted_iter, dict_get,
    read_label, read_node_extra, AugDictExtra, DictKey, SetMode,
};

/// Typed augmented dictionary with fixed length keys.
///
/// Every node stores an extra value: leaves store it before the value,
/// forks store the combination of their children extras.
///
/// # TLB scheme
///
/// ```text
/// ahm_edge#_ {n:#} {V:Type} {A:Type} {l:#} {m:#}
///   label:(HmLabel ~l n) {n = (~m) + l}
///   node:(HashmapAugNode m V A) = HashmapAug n V A;
///
/// ahmn_leaf#_ {V:Type} {A:Type} extra:A value:V = HashmapAugNode 0 V A;
/// ahmn_fork#_ {n:#} {V:Type} {A:Type} left:^(HashmapAug n V A)
///   right:^(HashmapAug n V A) extra:A = HashmapAugNode (n + 1) V A;
///
/// ahme_empty$0 {n:#} {V:Type} {A:Type} extra:A = HashmapAugE n V A;
/// ahme_root$1 {n:#} {V:Type} {A:Type} root:^(HashmapAug n V A) extra:A = HashmapAugE n V A;
/// ```
pub struct AugDict<K, A, V> {
    root: Option<Cell>,
    extra: A,
    _key: PhantomData<K>,
    _value: PhantomData<V>,
}

impl<K, A: ExactSize, V> ExactSize for AugDict<K, A, V> {
    #[inline]
    fn exact_size(&self) -> Size {
        Size {
            bits: 1,
            refs: self.root.is_some() as u8,
        } + self.extra.exact_size()
    }
}

impl<'a, K, A: Load<'a>, V> Load<'a> for AugDict<K, A, V> {
    #[inline]
    fn load_from(slice: &mut CellSlice<'a>) -> Result<Self, Error> {
        Ok(Self {
            root: ok!(<_>::load_from(slice)),
            extra: ok!(A::load_from(slice)),
            _key: PhantomData,
            _value: PhantomData,
        })
    }
}

impl<K, A: Store, V> Store for AugDict<K, A, V> {
    #[inline]
    fn store_into(&self, builder: &mut CellBuilder, context: &dyn CellContext) -> Result<(), Error> {
        ok!(self.root.store_into(builder, context));
        self.extra.store_into(builder, context)
    }
}

impl<K, A: Default, V> Default for AugDict<K, A, V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K, A: Clone, V> Clone for AugDict<K, A, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            extra: self.extra.clone(),
            _key: PhantomData,
            _value: PhantomData,
        }
    }
}

impl<K, A: Eq, V> Eq for AugDict<K, A, V> {}

impl<K, A: PartialEq, V> PartialEq for AugDict<K, A, V> {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.extra == other.extra
    }
}

impl<K, A: std::fmt::Debug, V> std::fmt::Debug for AugDict<K, A, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AugDict")
            .field("root", &self.root)
            .field("extra", &self.extra)
            .finish()
    }
}

impl<K, A: Default, V> AugDict<K, A, V> {
    /// Creates an empty dictionary
    pub fn new() -> Self {
        Self {
            root: None,
            extra: A::default(),
            _key: PhantomData,
            _value: PhantomData,
        }
    }
}

impl<K, A, V> AugDict<K, A, V> {
    /// Returns `true` if the dictionary contains no elements.
    pub const fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the underlying root cell of the dictionary.
    #[inline]
    pub const fn root(&self) -> &Option<Cell> {
        &self.root
    }

    /// Returns the root augmented value.
    #[inline]
    pub const fn root_extra(&self) -> &A {
        &self.extra
    }
}

impl<K: DictKey, A, V> AugDict<K, A, V> {
    /// Loads a non-empty dictionary from a root cell (`HashmapAug` stored inline).
    ///
    /// The root extra is taken from the root node.
    pub fn load_from_root_ext<'a>(
        slice: &mut CellSlice<'a>,
        context: &dyn CellContext,
    ) -> Result<Self, Error>
    where
        A: Load<'a>,
        V: Load<'a>,
    {
        let root = *slice;

        let label = ok!(read_label(slice, K::BITS));
        let extra = if label.size_bits() != K::BITS {
            ok!(slice.skip_first(0, 2));
            ok!(A::load_from(slice))
        } else {
            let extra = ok!(A::load_from(slice));
            ok!(V::load_from(slice));
            extra
        };

        let root_bits = root.size_bits() - slice.size_bits();
        let root_refs = root.size_refs() - slice.size_refs();

        let mut builder = CellBuilder::new();
        ok!(builder.store_slice(&ok!(root.get_prefix(root_bits, root_refs))));
        Ok(Self {
            root: Some(ok!(builder.build_ext(context))),
            extra,
            _key: PhantomData,
            _value: PhantomData,
        })
    }
}

impl<K, A, V> AugDict<K, A, V>
where
    K: Store + DictKey,
{
    /// Returns `true` if the dictionary contains a value for the specified key.
    pub fn contains_key<Q>(&self, key: Q) -> Result<bool, Error>
    where
        Q: Borrow<K>,
    {
        let key = ok!(serialize_key(key.borrow(), Cell::empty_context()));
        Ok(ok!(dict_get(self.root.as_ref(), K::BITS, key.as_data_slice())).is_some())
    }

    /// Returns the extra and the value corresponding to the key.
    pub fn get<'a, Q>(&'a self, key: Q) -> Result<Option<(A, V)>, Error>
    where
        Q: Borrow<K>,
        A: Load<'a>,
        V: Load<'a>,
    {
        let key = ok!(serialize_key(key.borrow(), Cell::empty_context()));
        match ok!(dict_get(self.root.as_ref(), K::BITS, key.as_data_slice())) {
            Some(mut slice) => {
                let extra = ok!(A::load_from(&mut slice));
                let value = ok!(V::load_from(&mut slice));
                Ok(Some((extra, value)))
            }
            None => Ok(None),
        }
    }

    /// Gets an iterator over the entries of the dictionary, sorted by key.
    /// The iterator element type is `Result<(K, A, V)>`.
    ///
    /// If the dictionary is invalid, finishes after the first invalid element,
    /// returning an error.
    pub fn iter<'a>(&'a self) -> AugIter<'a, K, A, V>
    where
        A: Load<'a>,
        V: Load<'a>,
    {
        AugIter {
            inner: RawIter::new(&self.root, K::BITS),
            _key: PhantomData,
            _values: PhantomData,
        }
    }
}

impl<K, A, V> AugDict<K, A, V>
where
    K: Store + DictKey,
    for<'a> A: AugDictExtra + Store + Load<'a>,
    V: Store,
{
    /// Builds a dictionary from a map of `(extra, value)` pairs.
    ///
    /// Entries are reordered by their serialized keys.
    pub fn try_from_btree<Q, E, T>(btree: &BTreeMap<Q, (E, T)>) -> Result<Self, Error>
    where
        Q: Borrow<K> + Ord,
        E: Borrow<A>,
        T: Borrow<V>,
    {
        let context = Cell::empty_context();

        let mut entries = Vec::with_capacity(btree.len());
        for (key, (extra, value)) in btree {
            let key = ok!(serialize_key(key.borrow(), context));
            entries.push((key, extra.borrow(), value.borrow()));
        }
        entries.sort_unstable_by(|(a, ..), (b, ..)| a.raw_data().cmp(b.raw_data()));

        let mut result = Self {
            root: ok!(build_aug_dict_from_sorted_iter(
                entries,
                K::BITS,
                A::comp_add,
                context
            )),
            extra: A::default(),
            _key: PhantomData,
            _value: PhantomData,
        };
        ok!(result.update_root_extra());
        Ok(result)
    }

    /// Sets the value associated with the key in the dictionary.
    pub fn set<Q, E, T>(&mut self, key: Q, extra: E, value: T) -> Result<bool, Error>
    where
        Q: Borrow<K>,
        E: Borrow<A>,
        T: Borrow<V>,
    {
        self.insert_impl(key.borrow(), extra.borrow(), value.borrow(), SetMode::Set)
    }

    /// Sets the value associated with the key in the dictionary
    /// only if the key was already present in it.
    pub fn replace<Q, E, T>(&mut self, key: Q, extra: E, value: T) -> Result<bool, Error>
    where
        Q: Borrow<K>,
        E: Borrow<A>,
        T: Borrow<V>,
    {
        self.insert_impl(key.borrow(), extra.borrow(), value.borrow(), SetMode::Replace)
    }

    /// Sets the value associated with key in dictionary,
    /// but only if it is not already present.
    pub fn add<Q, E, T>(&mut self, key: Q, extra: E, value: T) -> Result<bool, Error>
    where
        Q: Borrow<K>,
        E: Borrow<A>,
        T: Borrow<V>,
    {
        self.insert_impl(key.borrow(), extra.borrow(), value.borrow(), SetMode::Add)
    }

    /// Removes the value associated with key in dictionary.
    /// Returns an optional removed extra and value.
    pub fn remove<Q>(&mut self, key: Q) -> Result<Option<(A, V)>, Error>
    where
        Q: Borrow<K>,
        for<'a> V: Load<'a> + 'static,
    {
        let context = Cell::empty_context();
        let key = ok!(serialize_key(key.borrow(), context));
        let removed = ok!(aug_dict_remove_owned(
            &mut self.root,
            &mut key.as_data_slice(),
            K::BITS,
            A::comp_add,
            context
        ));

        let Some((cell, range)) = removed else {
            return Ok(None);
        };
        ok!(self.update_root_extra());

        let mut slice = ok!(range.apply(&cell));
        let extra = ok!(A::load_from(&mut slice));
        let value = ok!(V::load_from(&mut slice));
        Ok(Some((extra, value)))
    }

    fn insert_impl(&mut self, key: &K, extra: &A, value: &V, mode: SetMode) -> Result<bool, Error> {
        let context = Cell::empty_context();
        let key = ok!(serialize_key(key, context));
        let changed = ok!(aug_dict_insert(
            &mut self.root,
            &mut key.as_data_slice(),
            K::BITS,
            extra,
            value,
            mode,
            A::comp_add,
            context
        ));
        if changed {
            ok!(self.update_root_extra());
        }
        Ok(changed)
    }

    fn update_root_extra(&mut self) -> Result<(), Error> {
        self.extra = match &self.root {
            Some(root) => {
                let mut slice = ok!(read_node_extra(root.as_ref(), K::BITS));
                ok!(A::load_from(&mut slice))
            }
            None => A::default(),
        };
        Ok(())
    }
}

/// An iterator over the entries of an [`AugDict`].
pub struct AugIter<'a, K, A, V> {
    inner: RawIter<'a>,
    _key: PhantomData<K>,
    _values: PhantomData<(A, V)>,
}

impl<K, A, V> Clone for AugIter<'_, K, A, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _key: PhantomData,
            _values: PhantomData,
        }
    }
}

impl<'a, K, A, V> Iterator for AugIter<'a, K, A, V>
where
    K: DictKey,
    A: Load<'a>,
    V: Load<'a>,
{
    type Item = Result<(K, A, V), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next()? {
            Ok((key, mut slice)) => {
                let Some(key) = K::from_raw_data(key.raw_data()) else {
                    return Some(Err(self.inner.finish(Error::CellUnderflow)));
                };
                let entry = A::load_from(&mut slice)
                    .and_then(|extra| Ok((key, extra, ok!(V::load_from(&mut slice)))));
                match entry {
                    Ok(entry) => Some(Ok(entry)),
                    Err(e) => Some(Err(self.inner.finish(e))),
                }
            }
            Err(e) => Some(Err(e)),
        }
    }
}

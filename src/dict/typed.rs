use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::cell::*;
use crate::error::Error;
use crate::merkle::{FilterAction, MerkleProof};

use super::raw::*;
use super::{
    build_dict_from_sorted_iter, dict_find_path, dict_get, dict_insert, dict_load_from_root,
    dict_remove_owned, DictKey, SetMode,
};

/// Dictionary (`HashmapE n X`) with keys of type `K` and values of type `V`.
///
/// Key width is taken from [`DictKey::BITS`]. Stored inline as a single
/// presence bit with an optional reference to the root node.
pub struct Dict<K, V> {
    pub(crate) root: Option<Cell>,
    _key: PhantomData<K>,
    _value: PhantomData<V>,
}

impl<K, V> ExactSize for Dict<K, V> {
    #[inline]
    fn exact_size(&self) -> Size {
        Size {
            bits: 1,
            refs: self.root.is_some() as u8,
        }
    }
}

impl<'a, K, V> Load<'a> for Dict<K, V> {
    #[inline]
    fn load_from(slice: &mut CellSlice<'a>) -> Result<Self, Error> {
        Ok(Self::from(ok!(Option::<Cell>::load_from(slice))))
    }
}

impl<K, V> Store for Dict<K, V> {
    #[inline]
    fn store_into(&self, builder: &mut CellBuilder, context: &dyn CellContext) -> Result<(), Error> {
        self.root.store_into(builder, context)
    }
}

impl<K, V> Default for Dict<K, V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for Dict<K, V> {
    fn clone(&self) -> Self {
        Self::from(self.root.clone())
    }
}

impl<K, V> Eq for Dict<K, V> {}
impl<K, V> PartialEq for Dict<K, V> {
    fn eq(&self, other: &Self) -> bool {
        let hash = |root: &Option<Cell>| root.as_ref().map(|cell| *cell.repr_hash());
        hash(&self.root) == hash(&other.root)
    }
}

impl<K, V> From<Option<Cell>> for Dict<K, V> {
    #[inline]
    fn from(dict: Option<Cell>) -> Self {
        Self {
            root: dict,
            _key: PhantomData,
            _value: PhantomData,
        }
    }
}

impl<K, V> std::fmt::Debug for Dict<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dict").field("root", &self.root).finish()
    }
}

impl<K, V> Dict<K, V> {
    pub const fn new() -> Self {
        Self {
            root: None,
            _key: PhantomData,
            _value: PhantomData,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Root node cell, `None` for an empty dictionary.
    #[inline]
    pub const fn root(&self) -> &Option<Cell> {
        &self.root
    }

    #[inline]
    pub fn into_root(self) -> Option<Cell> {
        self.root
    }
}

impl<K: DictKey, V> Dict<K, V> {
    /// Reads a non-empty dictionary whose root node is stored inline in `slice`.
    pub fn load_from_root_ext(
        slice: &mut CellSlice<'_>,
        context: &dyn CellContext,
    ) -> Result<Self, Error> {
        let root = ok!(dict_load_from_root(slice, K::BITS, context));
        Ok(Self::from(Some(root)))
    }
}

impl<K, V> Dict<K, V>
where
    K: Store + DictKey,
    V: Store,
{
    /// Builds a dictionary from entries already sorted by key bits.
    pub fn try_from_sorted_slice(sorted: &[(K, V)]) -> Result<Self, Error> {
        let entries = sorted.iter().map(|(key, value)| (key, value));
        Ok(Self::from(ok!(build_dict_from_sorted_iter(
            entries,
            K::BITS,
            Cell::empty_context()
        ))))
    }

    /// Builds a dictionary from a map in one pass.
    ///
    /// Keys are re-sorted by their bits, so signed keys work too.
    pub fn try_from_btree<Q, T>(btree: &BTreeMap<Q, T>) -> Result<Self, Error>
    where
        Q: Borrow<K> + Ord,
        T: Borrow<V>,
    {
        let context = Cell::empty_context();

        let mut entries = Vec::with_capacity(btree.len());
        for (key, value) in btree {
            let key = ok!(serialize_key(key.borrow(), context));
            entries.push((key, value.borrow()));
        }
        entries.sort_unstable_by(|(a, _), (b, _)| a.raw_data().cmp(b.raw_data()));

        Ok(Self::from(ok!(build_dict_from_sorted_iter(
            entries, K::BITS, context
        ))))
    }

    /// Inserts or replaces the value for `key`.
    ///
    /// Returns `false` only when nothing changed.
    pub fn set<Q, T>(&mut self, key: Q, value: T) -> Result<bool, Error>
    where
        Q: Borrow<K>,
        T: Borrow<V>,
    {
        self.set_ext(key, value, Cell::empty_context())
    }

    /// Changes the value only if `key` is present.
    pub fn replace<Q, T>(&mut self, key: Q, value: T) -> Result<bool, Error>
    where
        Q: Borrow<K>,
        T: Borrow<V>,
    {
        self.insert_impl(key.borrow(), value.borrow(), SetMode::Replace, Cell::empty_context())
    }

    /// Inserts the value only if `key` is absent.
    pub fn add<Q, T>(&mut self, key: Q, value: T) -> Result<bool, Error>
    where
        Q: Borrow<K>,
        T: Borrow<V>,
    {
        self.insert_impl(key.borrow(), value.borrow(), SetMode::Add, Cell::empty_context())
    }

    /// [`set`](Self::set) with a custom cell context.
    pub fn set_ext<Q, T>(
        &mut self,
        key: Q,
        value: T,
        context: &dyn CellContext,
    ) -> Result<bool, Error>
    where
        Q: Borrow<K>,
        T: Borrow<V>,
    {
        self.insert_impl(key.borrow(), value.borrow(), SetMode::Set, context)
    }

    fn insert_impl(
        &mut self,
        key: &K,
        value: &V,
        mode: SetMode,
        context: &dyn CellContext,
    ) -> Result<bool, Error> {
        let key = ok!(serialize_key(key, context));
        dict_insert(
            &mut self.root,
            &mut key.as_data_slice(),
            K::BITS,
            value,
            mode,
            context,
        )
    }
}

impl<K, V> Dict<K, V>
where
    K: Store + DictKey,
{
    pub fn contains_key<Q>(&self, key: Q) -> Result<bool, Error>
    where
        Q: Borrow<K>,
    {
        Ok(ok!(self.get_raw(key)).is_some())
    }

    /// Loads the value for `key`.
    pub fn get<'a, Q>(&'a self, key: Q) -> Result<Option<V>, Error>
    where
        Q: Borrow<K>,
        V: Load<'a>,
    {
        let Some(mut value) = ok!(self.get_raw(key)) else {
            return Ok(None);
        };
        V::load_from(&mut value).map(Some)
    }

    /// Value slice for `key` without parsing.
    pub fn get_raw<Q>(&self, key: Q) -> Result<Option<CellSlice<'_>>, Error>
    where
        Q: Borrow<K>,
    {
        let key = ok!(serialize_key(key.borrow(), Cell::empty_context()));
        dict_get(self.root.as_ref(), K::BITS, key.as_data_slice())
    }

    /// Removes `key` and returns its parsed value.
    pub fn remove<Q>(&mut self, key: Q) -> Result<Option<V>, Error>
    where
        Q: Borrow<K>,
        for<'a> V: Load<'a> + 'static,
    {
        match ok!(self.remove_raw(key)) {
            Some((cell, range)) => {
                let mut slice = ok!(range.apply(&cell));
                Ok(Some(ok!(V::load_from(&mut slice))))
            }
            None => Ok(None),
        }
    }

    /// Removes `key`, returning the leaf cell and value range.
    pub fn remove_raw<Q>(&mut self, key: Q) -> Result<Option<CellSliceParts>, Error>
    where
        Q: Borrow<K>,
    {
        let context = Cell::empty_context();
        let key = ok!(serialize_key(key.borrow(), context));
        dict_remove_owned(&mut self.root, &mut key.as_data_slice(), K::BITS, context)
    }

    /// Builds a Merkle proof of the key lookup.
    ///
    /// The proof keeps the path from the root to the key (with the whole
    /// value subtree when the key is present) and prunes everything else.
    /// Lookups of the same key in the proof cell give the same result.
    pub fn build_proof<Q>(&self, key: Q) -> Result<MerkleProof, Error>
    where
        Q: Borrow<K>,
    {
        let Some(root) = &self.root else {
            return Err(Error::EmptyProof);
        };

        let key = ok!(serialize_key(key.borrow(), Cell::empty_context()));
        let (path, found) = ok!(dict_find_path(root, K::BITS, key.as_data_slice()));

        let leaf = match path.last() {
            Some(leaf) if found => Some(*leaf.repr_hash()),
            _ => None,
        };
        let path = path
            .iter()
            .map(|cell| *cell.repr_hash())
            .collect::<ahash::HashSet<_>>();

        MerkleProof::create(root.as_ref(), move |hash: &HashBytes| {
            if leaf.as_ref() == Some(hash) {
                FilterAction::IncludeSubtree
            } else if path.contains(hash) {
                FilterAction::Include
            } else {
                FilterAction::Skip
            }
        })
        .build()
    }

    /// Entries in ascending order of key bits.
    ///
    /// Stops after the first malformed node, yielding its error.
    pub fn iter<'a>(&'a self) -> Iter<'a, K, V>
    where
        V: Load<'a>,
    {
        Iter::new(&self.root)
    }

    /// Keys in ascending order of key bits.
    pub fn keys(&'_ self) -> Keys<'_, K> {
        Keys::new(&self.root)
    }
}

impl<K, V> Dict<K, V>
where
    K: DictKey,
{
    /// Values in ascending order of key bits.
    pub fn values<'a>(&'a self) -> Values<'a, V>
    where
        V: Load<'a>,
    {
        Values::new(&self.root, K::BITS)
    }

    /// Untyped entries, see [`RawIter`].
    pub fn raw_iter(&'_ self) -> RawIter<'_> {
        RawIter::new(&self.root, K::BITS)
    }
}

/// Serializes the key into a builder. Keys never contain references.
pub(crate) fn serialize_key<K: Store + ?Sized>(
    key: &K,
    context: &dyn CellContext,
) -> Result<CellBuilder, Error> {
    let mut builder = CellBuilder::new();
    ok!(key.store_into(&mut builder, context));
    Ok(builder)
}

/// Typed entries of a [`Dict`], see [`Dict::iter`].
pub struct Iter<'a, K, V> {
    inner: RawIter<'a>,
    _key: PhantomData<K>,
    _value: PhantomData<V>,
}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _key: PhantomData,
            _value: PhantomData,
        }
    }
}

impl<'a, K, V> Iter<'a, K, V>
where
    K: DictKey,
{
    pub fn new(root: &'a Option<Cell>) -> Self {
        Self {
            inner: RawIter::new(root, K::BITS),
            _key: PhantomData,
            _value: PhantomData,
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V>
where
    K: DictKey,
    V: Load<'a>,
{
    type Item = Result<(K, V), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, mut value) = match self.inner.next()? {
            Ok(entry) => entry,
            Err(e) => return Some(Err(e)),
        };
        let parsed = match K::from_raw_data(key.raw_data()) {
            Some(key) => V::load_from(&mut value).map(|value| (key, value)),
            None => Err(Error::CellUnderflow),
        };
        Some(parsed.map_err(|e| self.inner.finish(e)))
    }
}

/// An iterator over the keys of a [`Dict`].
pub struct Keys<'a, K> {
    inner: RawIter<'a>,
    _key: PhantomData<K>,
}

impl<K> Clone for Keys<'_, K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _key: PhantomData,
        }
    }
}

impl<'a, K> Keys<'a, K>
where
    K: DictKey,
{
    pub fn new(root: &'a Option<Cell>) -> Self {
        Self {
            inner: RawIter::new(root, K::BITS),
            _key: PhantomData,
        }
    }
}

impl<K> Iterator for Keys<'_, K>
where
    K: DictKey,
{
    type Item = Result<K, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = match self.inner.next()? {
            Ok((key, _)) => key,
            Err(e) => return Some(Err(e)),
        };
        let parsed = K::from_raw_data(key.raw_data()).ok_or(Error::CellUnderflow);
        Some(parsed.map_err(|e| self.inner.finish(e)))
    }
}

/// An iterator over the values of a [`Dict`].
pub struct Values<'a, V> {
    inner: RawIter<'a>,
    _value: PhantomData<V>,
}

impl<V> Clone for Values<'_, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _value: PhantomData,
        }
    }
}

impl<'a, V> Values<'a, V> {
    pub fn new(root: &'a Option<Cell>, bit_len: u16) -> Self {
        Self {
            inner: RawIter::new(root, bit_len),
            _value: PhantomData,
        }
    }
}

impl<'a, V> Iterator for Values<'a, V>
where
    V: Load<'a>,
{
    type Item = Result<V, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut value = match self.inner.next()? {
            Ok((_, value)) => value,
            Err(e) => return Some(Err(e)),
        };
        Some(V::load_from(&mut value).map_err(|e| self.inner.finish(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dict_set() {
        let mut dict = Dict::<u32, u16>::new();
        dict.set(123, 0xffff).unwrap();
        assert_eq!(dict.get(123).unwrap(), Some(0xffff));

        dict.set(123, 0xcafe).unwrap();
        assert_eq!(dict.get(123).unwrap(), Some(0xcafe));
    }

    #[test]
    fn dict_load_from_slice() {
        let mut dict = Dict::<u32, u16>::new();
        dict.set(1, 2).unwrap();
        dict.set(3, 4).unwrap();

        let mut builder = CellBuilder::new();
        builder.store_u8(0xaa).unwrap();
        dict.store_into(&mut builder, Cell::empty_context()).unwrap();
        Dict::<u32, u16>::new()
            .store_into(&mut builder, Cell::empty_context())
            .unwrap();
        let cell = builder.build().unwrap();

        let mut slice = cell.as_slice().unwrap();
        assert_eq!(slice.load_u8().unwrap(), 0xaa);
        let loaded = slice.load::<Dict<u32, u16>>().unwrap();
        assert_eq!(loaded, dict);
        assert_eq!(loaded.get(3).unwrap(), Some(4));
        let empty = slice.load::<Dict<u32, u16>>().unwrap();
        assert!(empty.is_empty());
        slice.end_parse().unwrap();
    }

    #[test]
    fn dict_modes() {
        let mut dict = Dict::<u16, u32>::new();
        assert!(!dict.replace(1, 10).unwrap());
        assert!(dict.is_empty());

        assert!(dict.add(1, 10).unwrap());
        assert!(!dict.add(1, 20).unwrap());
        assert_eq!(dict.get(1).unwrap(), Some(10));

        assert!(dict.replace(1, 30).unwrap());
        assert_eq!(dict.get(1).unwrap(), Some(30));
        assert!(dict.contains_key(1).unwrap());
        assert!(!dict.contains_key(2).unwrap());
    }

    #[test]
    fn dict_remove() {
        let mut dict = Dict::<u32, u32>::new();
        for i in 0..10 {
            dict.set(i, i).unwrap();
        }

        let mut check_remove = |n: u32, expected: Option<u32>| {
            let removed = dict.remove(n).unwrap();
            assert_eq!(removed, expected);
        };

        check_remove(0, Some(0));
        check_remove(4, Some(4));
        check_remove(9, Some(9));
        check_remove(9, None);
        check_remove(5, Some(5));
        check_remove(5, None);
        check_remove(100, None);
        check_remove(1, Some(1));
        check_remove(2, Some(2));
        check_remove(3, Some(3));
        check_remove(6, Some(6));
        check_remove(7, Some(7));
        check_remove(8, Some(8));

        assert!(dict.is_empty());
    }

    #[test]
    fn dict_iter() {
        let boc = crate::boc::Boc::decode_base64("te6ccgEBFAEAeAABAcABAgPOQAUCAgHUBAMACQAAAI3gAAkAAACjoAIBIA0GAgEgCgcCASAJCAAJAAAAciAACQAAAIfgAgEgDAsACQAAAFZgAAkAAABsIAIBIBEOAgEgEA8ACQAAADqgAAkAAABQYAIBIBMSAAkAAAAe4AAJAAAAv2A=").unwrap();
        let dict = boc.parse::<Dict<u32, u32>>().unwrap();

        let size = dict.values().count();
        assert_eq!(size, 10);

        for (i, entry) in dict.iter().enumerate() {
            let (key, _) = entry.unwrap();
            assert_eq!(key, i as u32);
        }
    }

    #[test]
    fn dict_iter_keys_sorted() {
        let mut dict = Dict::<i8, u8>::new();
        for key in [-3i8, 7, -128, 0, 127] {
            dict.set(key, key as u8).unwrap();
        }

        // Canonical order is the order of unsigned key bits
        let keys = dict.keys().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(keys, [0, 7, 127, -128, -3]);

        let values = dict.values().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(values, [0, 7, 127, 128, 253]);
    }

    #[test]
    fn dict_from_sorted_slice() {
        let entries = (0..100u32).map(|i| (i * 3, i)).collect::<Vec<_>>();
        let sorted = Dict::<u32, u32>::try_from_sorted_slice(&entries).unwrap();

        let mut inserted = Dict::<u32, u32>::new();
        for (key, value) in &entries {
            inserted.set(key, value).unwrap();
        }
        assert_eq!(sorted, inserted);

        let unsorted = [(5u32, 0u32), (1, 1)];
        assert_eq!(
            Dict::<u32, u32>::try_from_sorted_slice(&unsorted).unwrap_err(),
            Error::InvalidData
        );
    }

    #[test]
    fn dict_from_btree_with_signed_keys() {
        let btree = BTreeMap::from([(-1i32, 1u8), (0, 2), (100, 3), (i32::MIN, 4)]);
        let dict = Dict::<i32, u8>::try_from_btree(&btree).unwrap();

        let mut inserted = Dict::<i32, u8>::new();
        for (key, value) in &btree {
            inserted.set(key, value).unwrap();
        }
        assert_eq!(dict, inserted);

        for (key, value) in &btree {
            assert_eq!(dict.get(key).unwrap(), Some(*value));
        }
    }

    #[test]
    fn dict_root_roundtrip() {
        let mut dict = Dict::<u8, u8>::new();
        dict.set(1, 2).unwrap();
        dict.set(3, 4).unwrap();

        let root = dict.clone().into_root();
        assert_eq!(Dict::<u8, u8>::from(root), dict);
    }

    #[test]
    fn dict_proof() {
        let mut dict = Dict::<u32, u32>::new();
        for i in 0..10 {
            dict.set(i, i * 10).unwrap();
        }

        let proof = dict.build_proof(7).unwrap();
        assert_eq!(&proof.hash, dict.root().as_ref().unwrap().repr_hash());

        let proved = Dict::<u32, u32>::from(Some(proof.cell.clone()));
        assert_eq!(proved.get(7).unwrap(), Some(70));
        assert_eq!(proved.get(4).unwrap_err(), Error::PrunedBranchAccess);
    }
}

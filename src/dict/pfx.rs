use std::marker::PhantomData;

use crate::cell::*;
use crate::error::Error;

use super::{read_label, write_label, Branch};

/// Prefix-free dictionary with variable length keys.
///
/// No stored key can be a prefix of another stored key, so every key
/// ends in its own leaf. Node kind is explicit: `0` for a leaf,
/// `1` for a fork.
///
/// # TLB scheme
///
/// ```text
/// phm_edge#_ {n:#} {X:Type} {l:#} {m:#} label:(HmLabel ~l n)
///   {n = (~m) + l} node:(PfxHashmapNode m X) = PfxHashmap n X;
///
/// phmn_leaf$0 {n:#} {X:Type} value:X = PfxHashmapNode n X;
/// phmn_fork$1 {n:#} {X:Type} left:^(PfxHashmap n X)
///   right:^(PfxHashmap n X) = PfxHashmapNode (n + 1) X;
///
/// phme_empty$0 {n:#} {X:Type} = PfxHashmapE n X;
/// phme_root$1 {n:#} {X:Type} root:^(PfxHashmap n X) = PfxHashmapE n X;
/// ```
pub struct PfxDict<V> {
    root: Option<Cell>,
    key_bit_len: u16,
    _value: PhantomData<V>,
}

impl<V> Clone for PfxDict<V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            key_bit_len: self.key_bit_len,
            _value: PhantomData,
        }
    }
}

impl<V> Eq for PfxDict<V> {}
impl<V> PartialEq for PfxDict<V> {
    fn eq(&self, other: &Self) -> bool {
        self.key_bit_len == other.key_bit_len && self.root == other.root
    }
}

impl<V> std::fmt::Debug for PfxDict<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PfxDict")
            .field("root", &self.root)
            .field("key_bit_len", &self.key_bit_len)
            .finish()
    }
}

impl<V> ExactSize for PfxDict<V> {
    #[inline]
    fn exact_size(&self) -> Size {
        Size {
            bits: 1,
            refs: self.root.is_some() as u8,
        }
    }
}

impl<V> Store for PfxDict<V> {
    #[inline]
    fn store_into(&self, builder: &mut CellBuilder, context: &dyn CellContext) -> Result<(), Error> {
        self.root.store_into(builder, context)
    }
}

impl<V> PfxDict<V> {
    /// Creates an empty dictionary with keys up to `key_bit_len` bits.
    pub const fn new(key_bit_len: u16) -> Self {
        Self {
            root: None,
            key_bit_len,
            _value: PhantomData,
        }
    }

    /// Wraps an existing root cell.
    pub const fn from_root(root: Option<Cell>, key_bit_len: u16) -> Self {
        Self {
            root,
            key_bit_len,
            _value: PhantomData,
        }
    }

    /// Loads a `PfxHashmapE` with the specified max key length.
    pub fn load_from(slice: &mut CellSlice<'_>, key_bit_len: u16) -> Result<Self, Error> {
        Ok(Self::from_root(ok!(<_>::load_from(slice)), key_bit_len))
    }

    /// Returns `true` if the dictionary contains no elements.
    pub const fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the underlying root cell of the dictionary.
    pub const fn root(&self) -> &Option<Cell> {
        &self.root
    }

    /// Max key length in bits.
    pub const fn key_bit_len(&self) -> u16 {
        self.key_bit_len
    }

    /// Returns the value stored exactly at the key.
    pub fn get<'a>(&'a self, key: CellSlice<'_>) -> Result<Option<V>, Error>
    where
        V: Load<'a>,
    {
        match ok!(self.get_raw(key)) {
            Some(mut slice) => V::load_from(&mut slice).map(Some),
            None => Ok(None),
        }
    }

    /// Returns the raw value stored exactly at the key.
    pub fn get_raw(&self, key: CellSlice<'_>) -> Result<Option<CellSlice<'_>>, Error> {
        Ok(match ok!(self.find(key)) {
            Some((matched, value)) if matched == key.size_bits() => Some(value),
            _ => None,
        })
    }

    /// Finds a stored key which is a prefix of the specified key.
    ///
    /// Returns the length of the matched prefix and the value.
    pub fn lookup<'a>(&'a self, key: CellSlice<'_>) -> Result<Option<(u16, V)>, Error>
    where
        V: Load<'a>,
    {
        match ok!(self.find(key)) {
            Some((matched, mut slice)) => Ok(Some((matched, ok!(V::load_from(&mut slice))))),
            None => Ok(None),
        }
    }

    /// Gets an iterator over the entries of the dictionary, sorted by key.
    pub fn iter<'a>(&'a self) -> PfxIter<'a, V>
    where
        V: Load<'a>,
    {
        let mut segments = Vec::new();
        if let Some(root) = &self.root {
            segments.push(PfxSegment {
                data: root.as_ref(),
                key: CellBuilder::new(),
                remaining_bit_len: self.key_bit_len,
            });
        }
        PfxIter {
            segments,
            _value: PhantomData,
        }
    }

    fn find(&self, mut key: CellSlice<'_>) -> Result<Option<(u16, CellSlice<'_>)>, Error> {
        if key.size_bits() > self.key_bit_len {
            return Err(Error::CellUnderflow);
        }

        let Some(root) = &self.root else {
            return Ok(None);
        };

        let total = key.size_bits();
        let mut data = root.as_ref();
        let mut remaining_bit_len = self.key_bit_len;
        loop {
            let mut slice = ok!(data.as_slice());
            let prefix = ok!(read_label(&mut slice, remaining_bit_len));
            key = match key.strip_data_prefix(&prefix) {
                Some(rest) => rest,
                None => return Ok(None),
            };
            remaining_bit_len -= prefix.size_bits();

            if !ok!(slice.load_bit()) {
                return Ok(Some((total - key.size_bits(), slice)));
            }

            if key.is_data_empty() || remaining_bit_len == 0 {
                return Ok(None);
            }
            let branch = Branch::from(ok!(key.load_bit()));
            remaining_bit_len -= 1;
            data = match data.reference(branch as u8) {
                Some(child) => child,
                None => return Err(Error::CellUnderflow),
            };
        }
    }
}

impl<V: Store> PfxDict<V> {
    /// Builds a dictionary from unordered entries.
    ///
    /// Fails with [`Error::InvalidData`] if some key is a prefix of another
    /// one (including duplicates), and with [`Error::CellUnderflow`] if some
    /// key is longer than `key_bit_len`.
    pub fn try_from_entries<I>(key_bit_len: u16, entries: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (CellBuilder, V)>,
    {
        let context = Cell::empty_context();

        let mut entries = entries.into_iter().collect::<Vec<_>>();
        for (key, _) in &entries {
            if key.bit_len() > key_bit_len {
                return Err(Error::CellUnderflow);
            }
        }
        entries.sort_by(|(a, _), (b, _)| {
            a.raw_data()
                .cmp(b.raw_data())
                .then(a.bit_len().cmp(&b.bit_len()))
        });

        // Keys that share a prefix are adjacent after sorting
        for pair in entries.windows(2) {
            let prev = pair[0].0.as_data_slice();
            let next = pair[1].0.as_data_slice();
            if next.longest_common_data_prefix(&prev).size_bits() == prev.size_bits() {
                return Err(Error::InvalidData);
            }
        }

        if entries.is_empty() {
            return Ok(Self::new(key_bit_len));
        }

        enum Task {
            Visit { range: std::ops::Range<usize>, offset: u16 },
            Fork { lo: usize, offset: u16, label_len: u16 },
        }

        let mut tasks = vec![Task::Visit {
            range: 0..entries.len(),
            offset: 0,
        }];
        let mut results = Vec::<Cell>::new();

        while let Some(task) = tasks.pop() {
            match task {
                Task::Visit { range, offset } => {
                    let first = &entries[range.start].0;
                    if range.len() == 1 {
                        let mut label = first.as_data_slice();
                        ok!(label.skip_first(offset, 0));

                        let mut builder = CellBuilder::new();
                        ok!(write_label(&label, key_bit_len - offset, &mut builder));
                        ok!(builder.store_bit_zero());
                        ok!(entries[range.start].1.store_into(&mut builder, context));
                        results.push(ok!(builder.build_ext(context)));
                        continue;
                    }

                    let mut first_rest = first.as_data_slice();
                    ok!(first_rest.skip_first(offset, 0));
                    let mut last_rest = entries[range.end - 1].0.as_data_slice();
                    ok!(last_rest.skip_first(offset, 0));
                    let label_len = first_rest
                        .longest_common_data_prefix(&last_rest)
                        .size_bits();

                    let split_at = offset + label_len;
                    let mid = range.start
                        + entries[range.clone()].partition_point(|(key, _)| {
                            let mut bits = key.as_data_slice();
                            !matches!(bits.skip_first(split_at, 0), Ok(()))
                                || !matches!(bits.get_bit(0), Ok(true))
                        });

                    tasks.push(Task::Fork {
                        lo: range.start,
                        offset,
                        label_len,
                    });
                    tasks.push(Task::Visit {
                        range: mid..range.end,
                        offset: split_at + 1,
                    });
                    tasks.push(Task::Visit {
                        range: range.start..mid,
                        offset: split_at + 1,
                    });
                }
                Task::Fork {
                    lo,
                    offset,
                    label_len,
                } => {
                    let (Some(right), Some(left)) = (results.pop(), results.pop()) else {
                        return Err(Error::InvalidData);
                    };

                    let mut label = entries[lo].0.as_data_slice();
                    ok!(label.skip_first(offset, 0));
                    let label = ok!(label.get_prefix(label_len, 0));

                    let mut builder = CellBuilder::new();
                    ok!(write_label(&label, key_bit_len - offset, &mut builder));
                    ok!(builder.store_bit_one());
                    ok!(builder.store_reference(left));
                    ok!(builder.store_reference(right));
                    results.push(ok!(builder.build_ext(context)));
                }
            }
        }

        match results.pop() {
            Some(root) if results.is_empty() => Ok(Self::from_root(Some(root), key_bit_len)),
            _ => Err(Error::InvalidData),
        }
    }
}

struct PfxSegment<'a> {
    data: &'a DynCell,
    key: CellBuilder,
    remaining_bit_len: u16,
}

/// An iterator over the entries of a [`PfxDict`].
pub struct PfxIter<'a, V> {
    segments: Vec<PfxSegment<'a>>,
    _value: PhantomData<V>,
}

impl<'a, V: Load<'a>> Iterator for PfxIter<'a, V> {
    type Item = Result<(CellBuilder, V), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.next_impl();
        if result.as_ref().is_some_and(Result::is_err) {
            self.segments.clear();
        }
        result
    }
}

impl<'a, V: Load<'a>> PfxIter<'a, V> {
    fn next_impl(&mut self) -> Option<Result<(CellBuilder, V), Error>> {
        while let Some(PfxSegment {
            data,
            mut key,
            remaining_bit_len,
        }) = self.segments.pop()
        {
            let mut slice = match data.as_slice() {
                Ok(slice) => slice,
                Err(e) => return Some(Err(e)),
            };
            let prefix = match read_label(&mut slice, remaining_bit_len) {
                Ok(prefix) => prefix,
                Err(e) => return Some(Err(e)),
            };
            if let Err(e) = key.store_slice_data(&prefix) {
                return Some(Err(e));
            }
            let remaining_bit_len = remaining_bit_len - prefix.size_bits();

            match slice.load_bit() {
                Ok(false) => {
                    return Some(V::load_from(&mut slice).map(|value| (key, value)));
                }
                Ok(true) if remaining_bit_len > 0 => {}
                Ok(true) => return Some(Err(Error::InvalidData)),
                Err(e) => return Some(Err(e)),
            }

            // Push right first so that left is visited first
            for bit in [true, false] {
                let Some(child) = data.reference(Branch::from(bit) as u8) else {
                    return Some(Err(Error::CellUnderflow));
                };
                let mut child_key = key.clone();
                if let Err(e) = child_key.store_bit(bit) {
                    return Some(Err(e));
                }
                self.segments.push(PfxSegment {
                    data: child,
                    key: child_key,
                    remaining_bit_len: remaining_bit_len - 1,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(bits: &str) -> CellBuilder {
        let mut builder = CellBuilder::new();
        for c in bits.chars() {
            builder.store_bit(c == '1').unwrap();
        }
        builder
    }

    fn build(entries: &[(&str, u32)]) -> Result<PfxDict<u32>, Error> {
        PfxDict::try_from_entries(
            16,
            entries.iter().map(|(bits, value)| (key(bits), *value)),
        )
    }

    #[test]
    fn pfx_dict_get() -> anyhow::Result<()> {
        let dict = build(&[("0", 1), ("10", 2), ("110", 3), ("1110101", 4)])?;

        assert_eq!(dict.get(key("0").as_data_slice())?, Some(1));
        assert_eq!(dict.get(key("10").as_data_slice())?, Some(2));
        assert_eq!(dict.get(key("110").as_data_slice())?, Some(3));
        assert_eq!(dict.get(key("1110101").as_data_slice())?, Some(4));

        assert_eq!(dict.get(key("1").as_data_slice())?, None);
        assert_eq!(dict.get(key("111").as_data_slice())?, None);
        assert_eq!(dict.get(key("1111").as_data_slice())?, None);
        assert_eq!(dict.get(key("01").as_data_slice())?, None);

        Ok(())
    }

    #[test]
    fn pfx_dict_lookup() -> anyhow::Result<()> {
        let dict = build(&[("00", 1), ("01", 2), ("1011", 3)])?;

        assert_eq!(dict.lookup(key("0110011").as_data_slice())?, Some((2, 2)));
        assert_eq!(dict.lookup(key("1011").as_data_slice())?, Some((4, 3)));
        assert_eq!(dict.lookup(key("10111111").as_data_slice())?, Some((4, 3)));
        assert_eq!(dict.lookup(key("100").as_data_slice())?, None);
        assert_eq!(dict.lookup(key("1").as_data_slice())?, None);

        Ok(())
    }

    #[test]
    fn pfx_dict_iter() -> anyhow::Result<()> {
        let entries = [("1110101", 4), ("0", 1), ("110", 3), ("10", 2)];
        let dict = build(&entries)?;

        let items = dict.iter().collect::<Result<Vec<_>, _>>()?;
        let values = items.iter().map(|(_, value)| *value).collect::<Vec<_>>();
        assert_eq!(values, [1, 2, 3, 4]);
        assert_eq!(items[3].0, key("1110101"));

        // Roundtrip through a cell
        let cell = CellBuilder::build_from(&dict)?;
        let parsed = PfxDict::<u32>::load_from(&mut cell.as_slice()?, 16)?;
        assert_eq!(parsed, dict);

        Ok(())
    }

    #[test]
    fn pfx_dict_rejects_prefixes() {
        assert_eq!(build(&[("10", 1), ("101", 2)]).unwrap_err(), Error::InvalidData);
        assert_eq!(build(&[("11", 1), ("11", 2)]).unwrap_err(), Error::InvalidData);
        assert_eq!(
            build(&[("10101010101010101", 1)]).unwrap_err(),
            Error::CellUnderflow
        );
    }

    #[test]
    fn pfx_dict_single_and_empty() -> anyhow::Result<()> {
        let empty = build(&[])?;
        assert!(empty.is_empty());
        assert_eq!(empty.get(key("1").as_data_slice())?, None);
        assert_eq!(empty.iter().count(), 0);

        let single = build(&[("", 7)])?;
        assert_eq!(single.get(key("").as_data_slice())?, Some(7));
        assert_eq!(single.lookup(key("0101").as_data_slice())?, Some((0, 7)));
        Ok(())
    }
}

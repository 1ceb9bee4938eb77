use crate::cell::*;
use crate::dict::{make_leaf, store_fork_extra, write_label, AugDictFn};
use crate::error::Error;

/// Builds a dictionary from entries sorted by key bits (unsigned order).
///
/// Much faster than inserting entries one by one. Duplicate keys are
/// skipped, keys out of order give [`Error::InvalidData`].
pub fn build_dict_from_sorted_iter<K, V, I>(
    entries: I,
    key_bit_len: u16,
    context: &dyn CellContext,
) -> Result<Option<Cell>, Error>
where
    I: IntoIterator<Item = (K, V)>,
    K: Store,
    V: Store,
{
    let entries = entries.into_iter().map(|(key, value)| (key, None::<()>, value));
    let builder = SortedBuilder {
        key_bit_len,
        comparator: None,
        context,
    };
    builder.build(entries)
}

/// Same as [`build_dict_from_sorted_iter`] for augmented dictionaries.
///
/// Fork extras are computed with the `comparator`.
pub fn build_aug_dict_from_sorted_iter<K, A, V, I>(
    entries: I,
    key_bit_len: u16,
    comparator: AugDictFn,
    context: &dyn CellContext,
) -> Result<Option<Cell>, Error>
where
    I: IntoIterator<Item = (K, A, V)>,
    K: Store,
    A: Store,
    V: Store,
{
    let entries = entries
        .into_iter()
        .map(|(key, extra, value)| (key, Some(extra), value));
    let builder = SortedBuilder {
        key_bit_len,
        comparator: Some(comparator),
        context,
    };
    builder.build(entries)
}

struct Entry<A, V> {
    key: CellBuilder,
    extra: Option<A>,
    value: V,
}

struct SortedBuilder<'c> {
    key_bit_len: u16,
    comparator: Option<AugDictFn>,
    context: &'c dyn CellContext,
}

impl SortedBuilder<'_> {
    fn build<K, A, V, I>(&self, entries: I) -> Result<Option<Cell>, Error>
    where
        I: Iterator<Item = (K, Option<A>, V)>,
        K: Store,
        A: Store,
        V: Store,
    {
        let mut sorted = Vec::<Entry<A, V>>::new();
        for (key, extra, value) in entries {
            let mut key_bits = CellBuilder::new();
            ok!(key.store_into(&mut key_bits, self.context));
            if key_bits.bit_len() != self.key_bit_len {
                return Err(Error::CellUnderflow);
            }

            if let Some(prev) = sorted.last() {
                // Unused bits of both buffers are zero, so byte order is bit order
                match key_bits.raw_data().cmp(prev.key.raw_data()) {
                    std::cmp::Ordering::Greater => {}
                    std::cmp::Ordering::Equal => continue,
                    std::cmp::Ordering::Less => return Err(Error::InvalidData),
                }
            }
            sorted.push(Entry {
                key: key_bits,
                extra,
                value,
            });
        }

        if sorted.is_empty() {
            return Ok(None);
        }

        let root = ok!(self.build_node(&sorted, 0));
        tracing::trace!(
            entries = sorted.len(),
            key_bit_len = self.key_bit_len,
            aug = self.comparator.is_some(),
            "built dictionary from sorted entries"
        );
        Ok(Some(root))
    }

    /// Builds a subtree for a non-empty run of entries which share
    /// the first `offset` key bits.
    fn build_node<A: Store, V: Store>(
        &self,
        entries: &[Entry<A, V>],
        offset: u16,
    ) -> Result<Cell, Error> {
        let remaining = self.key_bit_len - offset;

        let mut first = entries[0].key.as_data_slice();
        ok!(first.skip_first(offset, 0));

        let [single] = entries else {
            return self.build_fork(entries, first, offset, remaining);
        };
        let extra = single.extra.as_ref().map(|extra| extra as &dyn Store);
        make_leaf(&first, remaining, extra, &single.value, self.context)
    }

    fn build_fork<A: Store, V: Store>(
        &self,
        entries: &[Entry<A, V>],
        first: CellSlice<'_>,
        offset: u16,
        remaining: u16,
    ) -> Result<Cell, Error> {
        // Entries are sorted, so the common prefix of the run is the one of its ends
        let mut last = entries[entries.len() - 1].key.as_data_slice();
        ok!(last.skip_first(offset, 0));
        let label = first.longest_common_data_prefix(&last);
        let split_bit = offset + label.size_bits();

        let mut split = entries.len();
        for (i, entry) in entries.iter().enumerate() {
            if ok!(entry.key.as_data_slice().get_bit(split_bit)) {
                split = i;
                break;
            }
        }
        let (left, right) = entries.split_at(split);
        if left.is_empty() || right.is_empty() {
            return Err(Error::InvalidData);
        }

        let left = ok!(self.build_node(left, split_bit + 1));
        let right = ok!(self.build_node(right, split_bit + 1));

        let mut builder = CellBuilder::new();
        ok!(write_label(&label, remaining, &mut builder));
        ok!(builder.store_reference(left.clone()));
        ok!(builder.store_reference(right.clone()));
        if let Some(comparator) = self.comparator {
            let child_key_bit_len = remaining - label.size_bits() - 1;
            ok!(store_fork_extra(
                left.as_ref(),
                right.as_ref(),
                child_key_bit_len,
                comparator,
                &mut builder,
                self.context
            ));
        }
        builder.build_ext(self.context)
    }
}

use crate::cell::*;
use crate::dict::{
    make_leaf, read_label, rebuild_from_stack, split_edge, AugDictFn, Branch, Segment, SetMode,
};
use crate::error::Error;

/// Stores `value` under `key` according to `mode`.
///
/// Returns `false` when the mode forbids the change and the dictionary is kept as is.
pub fn dict_insert(
    dict: &mut Option<Cell>,
    key: &mut CellSlice,
    key_bit_len: u16,
    value: &dyn Store,
    mode: SetMode,
    context: &dyn CellContext,
) -> Result<bool, Error> {
    let entry = NewEntry {
        extra: None,
        value,
        comparator: None,
        context,
    };
    entry.insert(dict, key, key_bit_len, mode)
}

/// Same as [`dict_insert`] for augmented dictionaries.
///
/// Extras of all forks on the path are recomputed with the `comparator`.
#[allow(clippy::too_many_arguments)]
pub fn aug_dict_insert(
    dict: &mut Option<Cell>,
    key: &mut CellSlice,
    key_bit_len: u16,
    extra: &dyn Store,
    value: &dyn Store,
    mode: SetMode,
    comparator: AugDictFn,
    context: &dyn CellContext,
) -> Result<bool, Error> {
    let entry = NewEntry {
        extra: Some(extra),
        value,
        comparator: Some(comparator),
        context,
    };
    entry.insert(dict, key, key_bit_len, mode)
}

struct NewEntry<'e> {
    extra: Option<&'e dyn Store>,
    value: &'e dyn Store,
    comparator: Option<AugDictFn>,
    context: &'e dyn CellContext,
}

impl NewEntry<'_> {
    fn leaf(&self, label: &CellSlice, key_bit_len: u16) -> Result<Cell, Error> {
        make_leaf(label, key_bit_len, self.extra, self.value, self.context)
    }

    fn insert(
        &self,
        dict: &mut Option<Cell>,
        key: &mut CellSlice,
        key_bit_len: u16,
        mode: SetMode,
    ) -> Result<bool, Error> {
        if key.size_bits() != key_bit_len {
            return Err(Error::CellUnderflow);
        }

        let Some(root) = dict.as_ref() else {
            if !mode.can_add() {
                return Ok(false);
            }
            *dict = Some(ok!(self.leaf(key, key_bit_len)));
            return Ok(true);
        };

        let mut node: &DynCell = root.as_ref();
        let mut path = Vec::<Segment>::new();

        let new_node = loop {
            let mut rest = ok!(node.as_slice());
            let mut label = ok!(read_label(&mut rest, key.size_bits()));
            let common = key.longest_common_data_prefix(&label);
            let common_bits = common.size_bits();

            if common_bits == key.size_bits() {
                // Same key
                if !mode.can_replace() {
                    return Ok(false);
                }
                break ok!(self.leaf(&label, key.size_bits()));
            }

            if common_bits < label.size_bits() {
                // Key diverges inside the label
                if !mode.can_add() {
                    return Ok(false);
                }
                break ok!(split_edge(
                    &rest,
                    &mut label,
                    &common,
                    key,
                    self.extra,
                    self.value,
                    self.comparator,
                    self.context,
                ));
            }

            // Label is a proper prefix of the key, go deeper
            if node.reference_count() != 2 {
                return Err(Error::CellUnderflow);
            }
            let fork_key_bit_len = key.size_bits();
            ok!(key.skip_first(common_bits, 0));
            let next_branch = Branch::from(ok!(key.load_bit()));

            let Some(child) = node.reference(next_branch as u8) else {
                return Err(Error::CellUnderflow);
            };
            path.push(Segment {
                data: node,
                next_branch,
                key_bit_len: fork_key_bit_len,
            });
            node = child;
        };

        *dict = Some(ok!(rebuild_from_stack(
            path,
            new_node,
            self.comparator,
            self.context
        )));
        Ok(true)
    }
}

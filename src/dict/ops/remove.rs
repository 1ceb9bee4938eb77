use crate::cell::*;
use crate::dict::{read_label, rebuild_from_stack, AugDictFn, Branch, Segment};
use crate::error::Error;

/// Removes `key` from the dictionary.
///
/// Returns the leaf cell that held the value together with the value range.
pub fn dict_remove_owned(
    dict: &mut Option<Cell>,
    key: &mut CellSlice,
    key_bit_len: u16,
    context: &dyn CellContext,
) -> Result<Option<CellSliceParts>, Error> {
    remove_impl(dict, key, key_bit_len, None, context)
}

/// Removes `key` from the augmented dictionary.
///
/// The returned range starts at the leaf extra.
pub fn aug_dict_remove_owned(
    dict: &mut Option<Cell>,
    key: &mut CellSlice,
    key_bit_len: u16,
    comparator: AugDictFn,
    context: &dyn CellContext,
) -> Result<Option<CellSliceParts>, Error> {
    remove_impl(dict, key, key_bit_len, Some(comparator), context)
}

fn remove_impl(
    dict: &mut Option<Cell>,
    key: &mut CellSlice,
    key_bit_len: u16,
    comparator: Option<AugDictFn>,
    context: &dyn CellContext,
) -> Result<Option<CellSliceParts>, Error> {
    if key.size_bits() != key_bit_len {
        return Err(Error::CellUnderflow);
    }

    let Some(root) = dict.as_ref() else {
        return Ok(None);
    };
    let Some((mut path, range)) = ok!(locate_leaf(root, key)) else {
        return Ok(None);
    };

    let leaf = match path.pop() {
        // The leaf was the root itself
        None => {
            let leaf = root.clone();
            *dict = None;
            leaf
        }
        Some(parent) => {
            let (merged, leaf) = ok!(parent.rebuild_as_removed(key.size_bits(), context));
            *dict = Some(ok!(rebuild_from_stack(path, merged, comparator, context)));
            leaf
        }
    };

    Ok(Some((leaf, range)))
}

/// Walks down to the leaf for `key`, collecting forks on the way.
fn locate_leaf<'a>(
    root: &'a Cell,
    key: &mut CellSlice,
) -> Result<Option<(Vec<Segment<'a>>, CellSliceRange)>, Error> {
    let mut node: &DynCell = root.as_ref();
    let mut path = Vec::new();

    loop {
        let mut rest = ok!(node.as_slice());
        let label = ok!(read_label(&mut rest, key.size_bits()));
        let common_bits = key.longest_common_data_prefix(&label).size_bits();

        if common_bits == key.size_bits() {
            return Ok(Some((path, rest.range())));
        }
        if common_bits < label.size_bits() {
            return Ok(None);
        }

        if node.reference_count() < 2 {
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
    }
}

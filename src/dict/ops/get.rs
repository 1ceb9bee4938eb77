use crate::cell::*;
use crate::dict::read_label;
use crate::error::Error;

/// Finds the value slice for `key`.
///
/// For augmented dictionaries the slice starts with the node extra.
pub fn dict_get<'a: 'b, 'b>(
    dict: Option<&'a Cell>,
    key_bit_len: u16,
    key: CellSlice<'b>,
) -> Result<Option<CellSlice<'a>>, Error> {
    if key.size_bits() != key_bit_len {
        return Err(Error::CellUnderflow);
    }
    let Some(root) = dict else {
        return Ok(None);
    };
    match ok!(find_leaf(root.as_ref(), key, None)) {
        Some(leaf) => Ok(Some(leaf.value)),
        None => Ok(None),
    }
}

/// Same as [`dict_get`], but returns the owning leaf cell with the value range.
pub fn dict_get_owned(
    dict: Option<&Cell>,
    key_bit_len: u16,
    key: CellSlice<'_>,
) -> Result<Option<CellSliceParts>, Error> {
    if key.size_bits() != key_bit_len {
        return Err(Error::CellUnderflow);
    }
    let Some(root) = dict else {
        return Ok(None);
    };
    let Some(leaf) = ok!(find_leaf(root.as_ref(), key, None)) else {
        return Ok(None);
    };

    let cell = match leaf.parent {
        None => root.clone(),
        Some((parent, index)) => match parent.reference_cloned(index) {
            Some(cell) => cell,
            None => return Err(Error::CellUnderflow),
        },
    };
    Ok(Some((cell, leaf.value.range())))
}

/// Loads a non-empty dictionary from the root cell (`Hashmap n X` stored inline).
///
/// The value of a leaf root takes the rest of the slice.
pub fn dict_load_from_root(
    slice: &mut CellSlice<'_>,
    key_bit_len: u16,
    context: &dyn CellContext,
) -> Result<Cell, Error> {
    let mut root = *slice;

    let label = ok!(read_label(slice, key_bit_len));
    if label.size_bits() != key_bit_len {
        ok!(slice.skip_first(0, 2));
        let root_bits = root.size_bits() - slice.size_bits();
        let root_refs = root.size_refs() - slice.size_refs();
        root = ok!(root.get_prefix(root_bits, root_refs));
    } else {
        slice.load_remaining();
    }

    let mut builder = CellBuilder::new();
    ok!(builder.store_slice(&root));
    builder.build_ext(context)
}

/// Collects cells on the path from the root to the key.
///
/// Returns the visited cells and whether the last one is the leaf with the key.
pub(crate) fn dict_find_path<'a>(
    root: &'a Cell,
    key_bit_len: u16,
    key: CellSlice<'_>,
) -> Result<(Vec<&'a DynCell>, bool), Error> {
    if key.size_bits() != key_bit_len {
        return Err(Error::CellUnderflow);
    }
    let mut path = Vec::new();
    let leaf = ok!(find_leaf(root.as_ref(), key, Some(&mut path)));
    Ok((path, leaf.is_some()))
}

struct Leaf<'a> {
    /// Leaf data right after the label.
    value: CellSlice<'a>,
    /// Fork which references the leaf and the branch taken.
    parent: Option<(&'a DynCell, u8)>,
}

fn find_leaf<'a>(
    root: &'a DynCell,
    mut key: CellSlice<'_>,
    mut visited: Option<&mut Vec<&'a DynCell>>,
) -> Result<Option<Leaf<'a>>, Error> {
    let mut node = root;
    let mut parent = None;
    loop {
        if let Some(visited) = visited.as_deref_mut() {
            visited.push(node);
        }

        let mut value = ok!(node.as_slice());
        let label = ok!(read_label(&mut value, key.size_bits()));
        let Some(rest) = key.strip_data_prefix(&label) else {
            return Ok(None);
        };
        if rest.is_data_empty() {
            return Ok(Some(Leaf { value, parent }));
        }
        if value.size_refs() < 2 {
            return Err(Error::CellUnderflow);
        }
        key = rest;

        let index = ok!(key.load_bit()) as u8;
        let Some(child) = node.reference(index) else {
            return Err(Error::CellUnderflow);
        };
        parent = Some((node, index));
        node = child;
    }
}

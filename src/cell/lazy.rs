use std::marker::PhantomData;

use crate::cell::{Cell, CellBuilder, CellContext, CellSlice, DynCell, ExactSize, Load, Size, Store};
use crate::error::Error;

/// Typed reference field (`^X`).
///
/// Holds the child cell and parses it only when [`load`](Self::load) is called.
/// The cell is always ordinary.
#[repr(transparent)]
pub struct Lazy<T> {
    cell: Cell,
    _marker: PhantomData<T>,
}

impl<T> Lazy<T> {
    /// Wraps an ordinary cell, rejecting exotic ones.
    pub fn from_raw(cell: Cell) -> Result<Self, Error> {
        let descriptor = cell.descriptor();
        if descriptor.is_pruned_branch() {
            Err(Error::PrunedBranchAccess)
        } else if descriptor.is_exotic() {
            Err(Error::UnexpectedExoticCell)
        } else {
            Ok(Self {
                cell,
                _marker: PhantomData,
            })
        }
    }

    #[inline]
    pub fn inner(&self) -> &Cell {
        &self.cell
    }

    #[inline]
    pub fn into_inner(self) -> Cell {
        self.cell
    }
}

impl<T: Store> Lazy<T> {
    /// Stores `value` into a new child cell.
    pub fn new(value: &T) -> Result<Self, Error> {
        let cell = ok!(CellBuilder::build_from(value));
        Self::from_raw(cell)
    }

    /// Replaces the child cell with a freshly stored `value`.
    pub fn set(&mut self, value: &T) -> Result<(), Error> {
        self.cell = ok!(CellBuilder::build_from(value));
        Ok(())
    }
}

impl<'a, T: Load<'a> + 'a> Lazy<T> {
    /// Parses the child cell as `T`.
    pub fn load(&'a self) -> Result<T, Error> {
        self.cell.parse::<T>()
    }
}

impl<T> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Eq for Lazy<T> {}
impl<T> PartialEq for Lazy<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cell.repr_hash() == other.cell.repr_hash()
    }
}

impl<T> std::fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Lazy").field(self.cell.repr_hash()).finish()
    }
}

impl<T> AsRef<DynCell> for Lazy<T> {
    #[inline]
    fn as_ref(&self) -> &DynCell {
        self.cell.as_ref()
    }
}

impl<T> ExactSize for Lazy<T> {
    #[inline]
    fn exact_size(&self) -> Size {
        Size::REF
    }
}

impl<T> Store for Lazy<T> {
    fn store_into(&self, builder: &mut CellBuilder, _: &dyn CellContext) -> Result<(), Error> {
        builder.store_reference(self.cell.clone())
    }
}

impl<'a, T> Load<'a> for Lazy<T> {
    /// The slice is left untouched when the reference is exotic.
    fn load_from(slice: &mut CellSlice<'a>) -> Result<Self, Error> {
        let cell = ok!(slice.get_reference_cloned(0));
        let lazy = ok!(Self::from_raw(cell));
        ok!(slice.skip_first(0, 1));
        Ok(lazy)
    }
}

/// Human readable formats show the parsed value, others the BOC of the child.
#[cfg(feature = "serde")]
impl<T> serde::Serialize for Lazy<T>
where
    for<'a> T: serde::Serialize + Load<'a>,
{
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if !serializer.is_human_readable() {
            return crate::boc::Boc::serialize(&self.cell, serializer);
        }
        match self.load() {
            Ok(value) => value.serialize(serializer),
            Err(e) => Err(serde::ser::Error::custom(e)),
        }
    }
}

#[cfg(feature = "serde")]
impl<'de, T> serde::Deserialize<'de> for Lazy<T>
where
    T: serde::Deserialize<'de> + Store,
{
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        if deserializer.is_human_readable() {
            let value = ok!(T::deserialize(deserializer));
            Self::new(&value).map_err(D::Error::custom)
        } else {
            let cell = ok!(crate::boc::Boc::deserialize(deserializer));
            Self::from_raw(cell).map_err(D::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_on_demand() {
        let lazy = Lazy::new(&0xdeadbeafu32).unwrap();
        assert_eq!(lazy.load().unwrap(), 0xdeadbeaf);
        assert_eq!(lazy.exact_size(), Size::REF);

        let mut builder = CellBuilder::new();
        builder.store_bit_one().unwrap();
        lazy.store_into(&mut builder, Cell::empty_context()).unwrap();
        let cell = builder.build().unwrap();

        let mut slice = cell.as_slice().unwrap();
        assert!(slice.load_bit().unwrap());
        let loaded = slice.load::<Lazy<u32>>().unwrap();
        assert!(slice.is_refs_empty());
        assert_eq!(loaded, lazy);
        assert_eq!(loaded.load().unwrap(), 0xdeadbeaf);

        let mut updated = loaded.clone();
        updated.set(&1).unwrap();
        assert_ne!(updated, loaded);
        assert_eq!(updated.load().unwrap(), 1);
    }

    #[test]
    fn rejects_exotic_children() {
        let child = CellBuilder::build_from(&1u8).unwrap();
        let child_hash = *child.repr_hash();
        let proof = crate::merkle::MerkleProof::create_for_cell(child.as_ref(), &child_hash)
            .build()
            .unwrap();
        let proof_cell = CellBuilder::build_from(&proof).unwrap();

        let mut builder = CellBuilder::new();
        builder.store_reference(proof_cell).unwrap();
        let cell = builder.build().unwrap();

        let mut slice = cell.as_slice().unwrap();
        assert_eq!(
            slice.load::<Lazy<u8>>().unwrap_err(),
            Error::UnexpectedExoticCell
        );
        assert_eq!(slice.size_refs(), 1);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn human_readable_serde() {
        let lazy = Lazy::new(&123u64).unwrap();
        let json = serde_json::to_string(&lazy).unwrap();
        assert_eq!(json, "123");
        let parsed: Lazy<u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, lazy);
    }
}

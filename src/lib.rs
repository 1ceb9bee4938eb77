//! Cells, slices, builders, dictionaries and BOC for the TON family of blockchains.

macro_rules! ok {
    ($e:expr $(,)?) => {
        match $e {
            core::result::Result::Ok(val) => val,
            core::result::Result::Err(err) => return core::result::Result::Err(err),
        }
    };
}

pub use self::boc::{Boc, BocRepr};
pub use self::cell::{
    Cell, CellBuilder, CellContext, CellDescriptor, CellSlice, CellType, DynCell, HashBytes,
    LevelMask, Load, Store,
};

pub mod address;
pub mod boc;
pub mod cell;
pub mod dict;
pub mod error;
pub mod merkle;
pub mod num;
pub mod prelude;
pub mod util;

const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Cell>();
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_slices() -> anyhow::Result<()> {
        let cell = Boc::decode_base64("te6ccgEBAQEABQAABb23wA==")?;
        println!("{}", cell.display_tree());

        let mut slice = cell.as_slice()?;
        assert!(!slice.is_data_empty());
        assert_eq!(slice.size_bits(), 17);
        assert!(slice.is_refs_empty());
        assert_eq!(slice.size_refs(), 0);
        assert!(slice.get_reference(0).is_err());
        assert!(slice.load_reference_cloned().is_err());

        assert!(slice.get_bit(0)?);
        assert!(slice.load_bit()?);
        assert_eq!(slice.get_uint(0, 8)?, 0x7b);
        assert_eq!(slice.get_uint(8, 8)?, 0x6f);
        assert!(slice.get_uint(16, 1).is_err());
        Ok(())
    }
}

//! The `ton-cells` prelude.
//!
//! This brings into scope a number of traits and commonly used types.

pub use crate::boc::{Boc, BocRepr};
pub use crate::cell::{
    Cell, CellBuilder, CellContext, CellSlice, CellType, DynCell, EmptyCellContext, ExactSize,
    HashBytes, Lazy, Load, Size, Store,
};
pub use crate::dict::{AugDict, Dict, PfxDict, RawDict};
pub use crate::merkle::{MerkleProof, MerkleUpdate};

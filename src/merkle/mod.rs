//! Merkle proofs, updates and pruned branches.

use std::collections::HashSet;
use std::hash::BuildHasher;

use crate::cell::HashBytes;

pub use self::proof::{MerkleProof, MerkleProofBuilder};
pub use self::pruned_branch::make_pruned_branch;
pub use self::update::MerkleUpdate;

mod proof;
mod pruned_branch;
mod update;

#[cfg(test)]
mod tests;

/// A cell tree filter that controls which cells will be included
/// in the Merkle proof.
pub trait MerkleFilter {
    /// Returns how the cell with the specified representation hash
    /// should be processed.
    fn check(&self, cell: &HashBytes) -> FilterAction;
}

/// Merkle filter action.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FilterAction {
    /// Cell will be replaced with a pruned branch.
    Skip,
    /// Cell will be included, its references will be checked.
    Include,
    /// Cell and its whole subtree will be included as is.
    IncludeSubtree,
}

impl<S: BuildHasher> MerkleFilter for HashSet<HashBytes, S> {
    fn check(&self, cell: &HashBytes) -> FilterAction {
        if self.contains(cell) {
            FilterAction::Include
        } else {
            FilterAction::Skip
        }
    }
}

impl<S: BuildHasher> MerkleFilter for HashSet<&HashBytes, S> {
    fn check(&self, cell: &HashBytes) -> FilterAction {
        if self.contains(cell) {
            FilterAction::Include
        } else {
            FilterAction::Skip
        }
    }
}

impl<F> MerkleFilter for F
where
    F: Fn(&HashBytes) -> FilterAction,
{
    #[inline]
    fn check(&self, cell: &HashBytes) -> FilterAction {
        (self)(cell)
    }
}

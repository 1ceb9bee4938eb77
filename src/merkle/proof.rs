use std::collections::HashMap;

use super::{make_pruned_branch, FilterAction, MerkleFilter};
use crate::cell::*;
use crate::error::Error;
use crate::util::unlikely;

/// Parsed Merkle proof representation.
///
/// NOTE: Serialized into `MerkleProof` cell.
#[derive(Debug, Clone)]
pub struct MerkleProof {
    /// Representation hash of the original cell.
    pub hash: HashBytes,
    /// Representation depth of the origin cell.
    pub depth: u16,
    /// Partially pruned tree with the contents of the original cell.
    pub cell: Cell,
}

impl Eq for MerkleProof {}

impl PartialEq for MerkleProof {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.depth == other.depth
            && self.cell.as_ref() == other.cell.as_ref()
    }
}

impl Default for MerkleProof {
    fn default() -> Self {
        Self {
            hash: *EMPTY_CELL_HASH,
            depth: 0,
            cell: Cell::empty_cell(),
        }
    }
}

impl<'a> Load<'a> for MerkleProof {
    fn load_from(s: &mut CellSlice<'a>) -> Result<Self, Error> {
        if unlikely(!s.has_remaining(Self::BITS, Self::REFS)) {
            return Err(Error::CellUnderflow);
        }

        if ok!(s.get_u8(0)) != CellType::MerkleProof.to_byte() {
            return Err(Error::InvalidTag);
        }

        let res = Self {
            hash: ok!(s.get_u256(8)),
            depth: ok!(s.get_u16(8 + 256)),
            cell: ok!(s.get_reference_cloned(0)),
        };
        if res.cell.as_ref().hash(0) != &res.hash || res.cell.as_ref().depth(0) != res.depth {
            return Err(Error::InvalidData);
        }

        ok!(s.skip_first(Self::BITS, Self::REFS));
        Ok(res)
    }
}

impl Store for MerkleProof {
    fn store_into(&self, b: &mut CellBuilder, _: &dyn CellContext) -> Result<(), Error> {
        if !b.has_capacity(Self::BITS, Self::REFS) {
            return Err(Error::CellOverflow);
        }

        b.set_exotic(true);
        ok!(b.store_u8(CellType::MerkleProof.to_byte()));
        ok!(b.store_u256(&self.hash));
        ok!(b.store_u16(self.depth));
        b.store_reference(self.cell.clone())
    }
}

impl MerkleProof {
    /// The number of data bits that the Merkle proof occupies.
    pub const BITS: u16 = 8 + 256 + 16;
    /// The number of references that the Merkle proof occupies.
    pub const REFS: u8 = 1;

    /// Starts building a Merkle proof for the specified root,
    /// using cells determined by filter.
    pub fn create<'a, F>(root: &'a DynCell, f: F) -> MerkleProofBuilder<'a, F>
    where
        F: MerkleFilter + 'a,
    {
        MerkleProofBuilder::new(root, f)
    }

    /// Create a Merkle proof for the single cell with the specified
    /// representation hash.
    ///
    /// Only ancestors of the first occurrence are included in the proof.
    pub fn create_for_cell<'a>(
        root: &'a DynCell,
        child_hash: &'a HashBytes,
    ) -> MerkleProofBuilder<'a, impl MerkleFilter + 'a> {
        struct RootOrChild<'a> {
            cells: ahash::HashSet<&'a HashBytes>,
            child_hash: &'a HashBytes,
        }

        impl MerkleFilter for RootOrChild<'_> {
            fn check(&self, cell: &HashBytes) -> FilterAction {
                if self.cells.contains(cell) || cell == self.child_hash {
                    FilterAction::Include
                } else {
                    FilterAction::Skip
                }
            }
        }

        let mut stack = vec![(root, root.references())];
        while let Some((_, last_cells)) = stack.last_mut() {
            match last_cells.next() {
                Some(child) if child.repr_hash() == child_hash => break,
                Some(child) => stack.push((child, child.references())),
                None => {
                    stack.pop();
                }
            }
        }

        let mut cells = ahash::HashSet::with_capacity_and_hasher(stack.len(), Default::default());
        for (cell, _) in stack {
            cells.insert(cell.repr_hash());
        }

        MerkleProofBuilder::new(root, RootOrChild { cells, child_hash })
    }

    /// Returns the root of the proven tree with the original hash at level 0.
    #[inline]
    pub fn root(&self) -> &DynCell {
        self.cell.as_ref()
    }
}

/// Helper struct to build a Merkle proof.
pub struct MerkleProofBuilder<'a, F> {
    root: &'a DynCell,
    filter: F,
}

impl<'a, F> MerkleProofBuilder<'a, F>
where
    F: MerkleFilter,
{
    /// Creates a new Merkle proof builder for the tree with the specified root,
    /// using cells determined by filter.
    pub fn new(root: &'a DynCell, f: F) -> Self {
        Self { root, filter: f }
    }

    /// Builds a Merkle proof using the default cell context.
    pub fn build(self) -> Result<MerkleProof, Error> {
        self.build_ext(Cell::empty_context())
    }

    /// Builds a Merkle proof using the specified cell context.
    pub fn build_ext(self, context: &dyn CellContext) -> Result<MerkleProof, Error> {
        let root = self.root;
        let cell = ok!(self.build_raw_ext(context));
        Ok(MerkleProof {
            hash: *root.repr_hash(),
            depth: root.repr_depth(),
            cell,
        })
    }

    /// Builds a Merkle proof child cell using the specified cell context.
    pub fn build_raw_ext(self, context: &dyn CellContext) -> Result<Cell, Error> {
        BuilderImpl {
            root: self.root,
            filter: &self.filter,
            cells: Default::default(),
            context,
        }
        .build()
    }
}

struct BuilderImpl<'a, 'b> {
    root: &'a DynCell,
    filter: &'b dyn MerkleFilter,
    cells: HashMap<&'a HashBytes, Cell, ahash::RandomState>,
    context: &'b dyn CellContext,
}

impl<'a> BuilderImpl<'a, '_> {
    fn build(&mut self) -> Result<Cell, Error> {
        struct Node<'a> {
            cell: &'a DynCell,
            references: RefsIter<'a>,
            merkle_depth: u8,
            children: Vec<Cell>,
        }

        if self.filter.check(self.root.repr_hash()) == FilterAction::Skip {
            return Err(Error::EmptyProof);
        }

        let mut pruned_count = 0usize;
        let mut stack = Vec::with_capacity(self.root.repr_depth() as usize);

        // Push root node
        stack.push(Node {
            cell: self.root,
            references: self.root.references(),
            merkle_depth: self.root.descriptor().is_merkle() as u8,
            children: Vec::new(),
        });

        while let Some(last) = stack.last_mut() {
            if let Some(child) = last.references.next() {
                // Process children if they are left

                let child_repr_hash = child.repr_hash();
                let child = if let Some(child) = self.cells.get(child_repr_hash) {
                    // Reuse processed cells
                    child.clone()
                } else {
                    let descriptor = child.descriptor();

                    match self.filter.check(child_repr_hash) {
                        // Replace all skipped subtrees with pruned branch cells
                        FilterAction::Skip if descriptor.reference_count() > 0 => {
                            pruned_count += 1;
                            ok!(make_pruned_branch_cold(
                                child,
                                last.merkle_depth,
                                self.context
                            ))
                        }
                        // Included subtrees are used as is
                        FilterAction::IncludeSubtree => {
                            let index = last.references.len() as u8;
                            let index = last.cell.reference_count() - 1 - index;
                            match last.cell.reference_cloned(index) {
                                Some(child) => child,
                                None => return Err(Error::CellUnderflow),
                            }
                        }
                        // All other cells will be included in a different branch
                        _ => {
                            // Add merkle offset to the current merkle depth
                            let merkle_depth = last.merkle_depth + descriptor.is_merkle() as u8;

                            // Push child node and start processing its references
                            stack.push(Node {
                                cell: child,
                                references: child.references(),
                                merkle_depth,
                                children: Vec::new(),
                            });
                            continue;
                        }
                    }
                };

                last.children.push(child);
            } else if let Some(last) = stack.pop() {
                // Build a new cell if there are no child nodes left to process

                let cell = last.cell;

                let mut builder = CellBuilder::new();
                builder.set_exotic(cell.is_exotic());
                ok!(builder.store_cell_data(cell));
                for child in last.children {
                    ok!(builder.store_reference(child));
                }
                let proof_cell = ok!(builder.build_ext(self.context));

                // Save this cell as processed cell
                self.cells.insert(cell.repr_hash(), proof_cell.clone());

                match stack.last_mut() {
                    // Append this cell to the ancestor
                    Some(last) => last.children.push(proof_cell),
                    // Or return it as a result (for the root node)
                    None => {
                        tracing::trace!(
                            cells = self.cells.len(),
                            pruned = pruned_count,
                            "created merkle proof"
                        );
                        return Ok(proof_cell);
                    }
                }
            }
        }

        // Something is wrong if we are here
        Err(Error::InvalidCell)
    }
}

#[cold]
fn make_pruned_branch_cold(
    cell: &DynCell,
    merkle_depth: u8,
    context: &dyn CellContext,
) -> Result<Cell, Error> {
    make_pruned_branch(cell, merkle_depth, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::RawDict;

    fn build_u32(key: u32) -> Cell {
        let mut builder = CellBuilder::new();
        builder.store_u32(key).unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn correct_store_load() -> anyhow::Result<()> {
        let default = MerkleProof::default();

        let cell = CellBuilder::build_from(&default)?;
        assert_eq!(cell.cell_type(), CellType::MerkleProof);

        let parsed = MerkleProof::load_from(&mut cell.as_slice_allow_exotic())?;
        assert_eq!(default, parsed);

        // Hash mismatch is rejected
        let mut builder = CellBuilder::new();
        builder.set_exotic(true);
        builder.store_u8(CellType::MerkleProof.to_byte())?;
        builder.store_u256(&HashBytes([1; 32]))?;
        builder.store_u16(0)?;
        builder.store_reference(Cell::empty_cell())?;
        let invalid = builder.build()?;
        assert_eq!(
            MerkleProof::load_from(&mut invalid.as_slice_allow_exotic()).unwrap_err(),
            Error::InvalidData
        );

        Ok(())
    }

    #[test]
    fn create_proof_for_deep_cell() -> anyhow::Result<()> {
        let mut cell = Cell::empty_cell();
        for i in 0..1000 {
            let mut builder = CellBuilder::new();
            builder.store_u32(i)?;
            builder.store_reference(cell)?;
            cell = builder.build()?;
        }

        let proof = MerkleProof::create_for_cell(cell.as_ref(), EMPTY_CELL_HASH).build()?;
        assert_eq!(proof.cell.hash(0), cell.repr_hash());
        assert_eq!(proof.depth, 1000);
        Ok(())
    }

    #[test]
    fn skipped_root_is_empty_proof() {
        let cell = build_u32(123);
        let result = MerkleProof::create(cell.as_ref(), |_: &HashBytes| FilterAction::Skip).build();
        assert_eq!(result.unwrap_err(), Error::EmptyProof);
    }

    #[test]
    fn create_proof_for_dict() -> anyhow::Result<()> {
        // Create dict with keys 0..10
        let mut dict = RawDict::<32>::new();
        for i in 0..10 {
            let key = build_u32(i);
            let value = build_u32(i * 10);
            dict.add(key.as_slice()?, value.as_slice()?)?;
        }
        let root = dict.root().clone().unwrap();

        // Collect cells on the path to keys 0 and 9
        let mut visited = std::collections::HashSet::new();
        for key in [0, 9] {
            let key = build_u32(key);
            let mut key = key.as_slice()?;
            let mut data = root.as_ref();
            let mut remaining = 32;
            loop {
                visited.insert(*data.repr_hash());
                let mut slice = data.as_slice()?;
                let label = crate::dict::read_label(&mut slice, remaining)?;
                key.skip_first(label.size_bits(), 0)?;
                remaining -= label.size_bits();
                if remaining == 0 {
                    break;
                }
                let bit = key.load_bit()?;
                remaining -= 1;
                data = data.reference(bit as u8).unwrap();
            }
        }

        let proof = MerkleProof::create(root.as_ref(), visited).build()?;
        assert_eq!(proof.cell.hash(0), root.repr_hash());

        let proof_dict = RawDict::<32>::from(Some(proof.cell.clone()));
        assert!(proof_dict.get(build_u32(0).as_slice()?)?.is_some());
        assert!(proof_dict.get(build_u32(9).as_slice()?)?.is_some());
        assert_eq!(
            proof_dict.get(build_u32(5).as_slice()?).unwrap_err(),
            Error::PrunedBranchAccess
        );

        // Proof is stored as an exotic cell
        let proof_cell = CellBuilder::build_from(&proof)?;
        let parsed = MerkleProof::load_from(&mut proof_cell.as_slice_allow_exotic())?;
        assert_eq!(parsed, proof);

        Ok(())
    }
}

use std::collections::HashSet;

use super::*;
use crate::boc::Boc;
use crate::cell::*;
use crate::dict::Dict;
use crate::error::Error;

fn build_chain(len: u32) -> anyhow::Result<Cell> {
    let mut cell = Cell::empty_cell();
    for i in 0..len {
        let mut builder = CellBuilder::new();
        builder.store_u32(i)?;
        builder.store_reference(cell)?;
        cell = builder.build()?;
    }
    Ok(cell)
}

#[test]
fn proof_survives_boc_roundtrip() -> anyhow::Result<()> {
    let mut dict = Dict::<u32, u64>::new();
    for i in 0..64 {
        dict.set(i, i as u64 * 1000)?;
    }

    let proof = dict.build_proof(17)?;
    let cell = CellBuilder::build_from(&proof)?;
    assert_eq!(cell.level(), 0);

    let decoded = Boc::decode(Boc::encode(cell.as_ref()))?;
    assert_eq!(decoded, cell);

    let parsed = MerkleProof::load_from(&mut decoded.as_slice_allow_exotic())?;
    assert_eq!(parsed, proof);

    let proved = Dict::<u32, u64>::from(Some(parsed.cell));
    assert_eq!(proved.get(17)?, Some(17000));
    assert_eq!(proved.get(18).unwrap_err(), Error::PrunedBranchAccess);

    Ok(())
}

#[test]
fn proof_with_hash_set_filter() -> anyhow::Result<()> {
    let root = build_chain(10)?;

    // Include only the first three cells of the chain
    let mut included = HashSet::new();
    let mut cell = root.as_ref();
    for _ in 0..3 {
        included.insert(cell.repr_hash());
        cell = cell.reference(0).unwrap();
    }

    let proof = MerkleProof::create(root.as_ref(), included).build()?;
    assert_eq!(&proof.hash, root.repr_hash());
    assert_eq!(proof.depth, 10);

    let mut cell = proof.cell.as_ref();
    for _ in 0..3 {
        assert_eq!(cell.cell_type(), CellType::Ordinary);
        cell = cell.reference(0).unwrap();
    }
    assert_eq!(cell.cell_type(), CellType::PrunedBranch);

    let mut original = root.as_ref();
    for _ in 0..3 {
        original = original.reference(0).unwrap();
    }
    assert_eq!(cell.hash(0), original.repr_hash());

    Ok(())
}

#[test]
fn include_subtree_keeps_cells() -> anyhow::Result<()> {
    let root = build_chain(5)?;
    let child_hash = *root.reference(0).unwrap().repr_hash();

    let proof = MerkleProof::create(root.as_ref(), |hash: &HashBytes| {
        if hash == &child_hash {
            FilterAction::IncludeSubtree
        } else {
            FilterAction::Include
        }
    })
    .build()?;

    // Nothing was pruned, so the proof tree is the original tree
    assert_eq!(proof.cell, root);
    Ok(())
}

#[test]
fn leaf_cells_are_never_pruned() -> anyhow::Result<()> {
    let leaf = {
        let mut builder = CellBuilder::new();
        builder.store_u8(0xaa)?;
        builder.build()?
    };
    let root = {
        let mut builder = CellBuilder::new();
        builder.store_reference(leaf.clone())?;
        builder.store_reference(build_chain(2)?)?;
        builder.build()?
    };

    let root_hash = *root.repr_hash();
    let proof = MerkleProof::create(root.as_ref(), move |hash: &HashBytes| {
        if hash == &root_hash {
            FilterAction::Include
        } else {
            FilterAction::Skip
        }
    })
    .build()?;

    assert_eq!(proof.cell.reference_cloned(0), Some(leaf));
    assert_eq!(
        proof.cell.reference(1).unwrap().cell_type(),
        CellType::PrunedBranch
    );
    Ok(())
}

#[test]
fn proof_of_merkle_proof() -> anyhow::Result<()> {
    let inner_root = build_chain(4)?;
    let inner = MerkleProof::create_for_cell(
        inner_root.as_ref(),
        inner_root.reference(0).unwrap().repr_hash(),
    )
    .build()?;
    let inner_cell = CellBuilder::build_from(&inner)?;

    let outer_root = {
        let mut builder = CellBuilder::new();
        builder.store_bit_one()?;
        builder.store_reference(inner_cell)?;
        builder.build()?
    };

    // Everything is included, so the exotic child is rebuilt as is
    let outer = MerkleProof::create(outer_root.as_ref(), |_: &HashBytes| FilterAction::Include)
        .build()?;
    assert_eq!(outer.cell, outer_root);
    Ok(())
}

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

use super::*;
use crate::boc::Boc;
use crate::error::Error;
use crate::num::Tokens;

#[test]
fn small_u8_dict() -> anyhow::Result<()> {
    let mut dict = Dict::<u8, u8>::new();
    dict.set(0, b'a')?;
    dict.set(1, b'b')?;
    dict.set(255, b'c')?;

    let cell = CellBuilder::build_from(&dict)?;
    let decoded = Boc::decode(Boc::encode(cell.as_ref()))?;
    assert_eq!(decoded, cell);

    let parsed = decoded.parse::<Dict<u8, u8>>()?;
    assert_eq!(parsed.get(0)?, Some(b'a'));
    assert_eq!(parsed.get(1)?, Some(b'b'));
    assert_eq!(parsed.get(255)?, Some(b'c'));
    assert_eq!(parsed.get(2)?, None);

    let entries = parsed.iter().collect::<Result<Vec<_>, _>>()?;
    assert_eq!(entries, [(0, b'a'), (1, b'b'), (255, b'c')]);

    // Root fork splits on the first bit with an empty label
    let root = parsed.root().as_ref().unwrap();
    assert_eq!(root.reference_count(), 2);
    assert_eq!(root.bit_len(), 2);

    Ok(())
}

#[test]
fn random_dict_matches_btree() -> anyhow::Result<()> {
    let mut rng = XorShiftRng::seed_from_u64(123123);

    for _ in 0..10 {
        let mut dict = Dict::<u32, u64>::new();
        let mut expected = BTreeMap::<u32, u64>::new();

        let count = rng.gen_range(1..300);
        for _ in 0..count {
            let key = rng.gen::<u32>() % 1000;
            let value = rng.gen::<u64>();
            dict.set(key, value)?;
            expected.insert(key, value);
        }

        for (key, value) in &expected {
            assert_eq!(dict.get(key)?, Some(*value));
        }

        let entries = dict.iter().collect::<Result<Vec<_>, _>>()?;
        let expected_entries = expected.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>();
        assert_eq!(entries, expected_entries);

        // Sorted construction produces the same trie
        let built = Dict::<u32, u64>::try_from_btree(&expected)?;
        assert_eq!(built.root(), dict.root());

        // Remove every other key
        let keys = expected.keys().copied().collect::<Vec<_>>();
        for key in keys.iter().step_by(2) {
            let removed = dict.remove(key)?;
            assert_eq!(removed, expected.remove(key));
        }
        let entries = dict.iter().collect::<Result<Vec<_>, _>>()?;
        let expected_entries = expected.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>();
        assert_eq!(entries, expected_entries);

        let rebuilt = Dict::<u32, u64>::try_from_btree(&expected)?;
        assert_eq!(rebuilt.root(), dict.root());
    }

    Ok(())
}

#[test]
fn insertion_order_does_not_matter() -> anyhow::Result<()> {
    let mut rng = XorShiftRng::seed_from_u64(42);
    let mut keys = (0..200).map(|_| HashBytes(rng.gen::<[u8; 32]>())).collect::<Vec<_>>();

    let mut first = Dict::<HashBytes, u16>::new();
    for (i, key) in keys.iter().enumerate() {
        first.set(key, i as u16)?;
    }

    let mut second = Dict::<HashBytes, u16>::new();
    for (i, key) in keys.iter().enumerate().rev() {
        second.set(key, i as u16)?;
    }
    assert_eq!(first, second);

    keys.sort();
    let sorted = keys
        .iter()
        .map(|key| (*key, first.get(key).unwrap().unwrap()))
        .collect::<Vec<_>>();
    let built = Dict::<HashBytes, u16>::try_from_sorted_slice(&sorted)?;
    assert_eq!(built, first);

    Ok(())
}

#[test]
fn remove_all_entries() -> anyhow::Result<()> {
    let mut dict = Dict::<i32, i32>::new();
    for i in -50..50 {
        dict.set(i, -i)?;
    }

    for i in -50..50 {
        assert_eq!(dict.remove(i)?, Some(-i));
        assert_eq!(dict.remove(i)?, None);
    }
    assert!(dict.is_empty());
    assert_eq!(dict.iter().count(), 0);

    Ok(())
}

#[test]
fn sorted_builder_rejects_unsorted() {
    let entries = [(3u32, 1u8), (1, 2)];
    assert_eq!(
        Dict::<u32, u8>::try_from_sorted_slice(&entries).unwrap_err(),
        Error::InvalidData
    );

    // Duplicates are skipped
    let entries = [(1u32, 1u8), (1, 2), (2, 3)];
    let dict = Dict::<u32, u8>::try_from_sorted_slice(&entries).unwrap();
    assert_eq!(dict.get(1).unwrap(), Some(1));
    assert_eq!(dict.iter().count(), 2);
}

#[test]
fn aug_dict_random_fold() -> anyhow::Result<()> {
    let mut rng = XorShiftRng::seed_from_u64(77);

    let mut dict = AugDict::<u64, Tokens, u8>::new();
    let mut expected = BTreeMap::<u64, (Tokens, u8)>::new();
    for _ in 0..500 {
        let key = rng.gen::<u64>() % 2000;
        let extra = Tokens::new(rng.gen_range(0..1_000_000_000));
        let value = rng.gen::<u8>();
        dict.set(key, extra, value)?;
        expected.insert(key, (extra, value));
    }

    let fold = |map: &BTreeMap<u64, (Tokens, u8)>| {
        map.values()
            .fold(Tokens::ZERO, |acc, (extra, _)| acc + *extra)
    };
    assert_eq!(*dict.root_extra(), fold(&expected));

    let built = AugDict::<u64, Tokens, u8>::try_from_btree(&expected)?;
    assert_eq!(built, dict);

    let keys = expected.keys().copied().collect::<Vec<_>>();
    for key in keys.iter().step_by(3) {
        assert_eq!(dict.remove(key)?, expected.remove(key));
        assert_eq!(*dict.root_extra(), fold(&expected));
    }

    Ok(())
}

#[test]
fn aug_dict_overflow_fails() -> anyhow::Result<()> {
    let mut dict = AugDict::<u8, Tokens, ()>::new();
    dict.set(0, Tokens::MAX, ())?;
    assert_eq!(dict.set(1, Tokens::new(1), ()).unwrap_err(), Error::IntOverflow);
    Ok(())
}

#[test]
fn pruned_branch_access() -> anyhow::Result<()> {
    let mut dict = Dict::<u16, u32>::new();
    for i in 0..100u16 {
        dict.set(i * 3, i as u32)?;
    }

    let proof = dict.build_proof(30)?;
    assert_eq!(&proof.hash, dict.root().as_ref().unwrap().repr_hash());
    assert_eq!(proof.cell.hash(0), &proof.hash);

    let proof_dict = Dict::<u16, u32>::from(Some(proof.cell.clone()));
    assert_eq!(proof_dict.get(30)?, Some(10));
    assert_eq!(proof_dict.get(90).unwrap_err(), Error::PrunedBranchAccess);

    Ok(())
}

use super::*;
use crate::cell::{CellType, HashBytes};
use crate::util::decode_base64;

const SMALL_BOC: &str = "te6ccgEBAQEABQAABb23wA==";

fn build_tree(width: u8, depth: u8) -> anyhow::Result<Cell> {
    let mut level = Vec::new();
    for i in 0..width {
        let mut builder = CellBuilder::new();
        builder.store_u8(i)?;
        level.push(builder.build()?);
    }

    for d in 0..depth {
        let mut next = Vec::new();
        for chunk in level.chunks(2) {
            let mut builder = CellBuilder::new();
            builder.store_u16(d as u16)?;
            builder.store_bit_one()?;
            for child in chunk {
                builder.store_reference(child.clone())?;
            }
            next.push(builder.build()?);
        }
        level = next;
    }

    let mut builder = CellBuilder::new();
    for child in level {
        builder.store_reference(child)?;
    }
    Ok(builder.build()?)
}

#[test]
fn small_boc_roundtrip() -> anyhow::Result<()> {
    let bytes = decode_base64(SMALL_BOC)?;
    let cell = Boc::decode(&bytes)?;

    assert_eq!(cell.bit_len(), 17);
    assert_eq!(cell.reference_count(), 0);

    let slice = cell.as_slice()?;
    assert_eq!(slice.get_u8(0)?, 0xbd);
    assert_eq!(slice.get_u8(8)?, 0xb7);
    assert!(slice.get_bit(16)?);

    assert_eq!(Boc::encode(&cell), bytes);
    assert_eq!(Boc::encode_base64(&cell), SMALL_BOC);
    Ok(())
}

#[test]
fn legacy_indexed_boc() -> anyhow::Result<()> {
    let expected = Boc::decode_base64(SMALL_BOC)?;

    #[rustfmt::skip]
    let indexed: [u8; 16] = [
        0x68, 0xff, 0x65, 0xf3, // tag
        0x01, 0x01,             // ref size, offset size
        0x01, 0x01, 0x00,       // cells, roots, absent
        0x05,                   // total cells size
        0x05,                   // index
        0x00, 0x05, 0xbd, 0xb7, 0xc0,
    ];
    assert_eq!(Boc::decode(indexed)?, expected);

    let mut with_crc = indexed.to_vec();
    with_crc[..4].copy_from_slice(&BocTag::IndexedCrc32.to_bytes());
    let crc = crc32c::crc32c(&with_crc);
    with_crc.extend_from_slice(&crc.to_le_bytes());
    assert_eq!(Boc::decode(&with_crc)?, expected);
    Ok(())
}

#[test]
fn boc_with_crc() -> anyhow::Result<()> {
    let cell = build_tree(16, 3)?;

    let without_crc = Boc::encode(&cell);
    let mut with_crc = Boc::encode_ext([cell.as_ref()], true);
    assert_eq!(without_crc.len() + 4, with_crc.len());

    let decoded = Boc::decode(&with_crc)?;
    assert_eq!(decoded, cell);

    if let Some(last_byte) = with_crc.last_mut() {
        *last_byte = !*last_byte;
    }
    assert_eq!(Boc::decode(&with_crc), Err(de::Error::InvalidChecksum));
    Ok(())
}

#[test]
fn indexed_boc_output() -> anyhow::Result<()> {
    let leaf = {
        let mut builder = CellBuilder::new();
        builder.store_uint(42, 7)?;
        builder.build()?
    };
    let middle = {
        let mut builder = CellBuilder::new();
        builder.store_u8(12)?;
        builder.store_reference(leaf.clone())?;
        builder.build()?
    };
    let root = {
        let mut builder = CellBuilder::new();
        builder.store_u8(13)?;
        builder.store_reference(leaf)?;
        builder.store_reference(middle)?;
        builder.build()?
    };

    let encode = |index: bool, cache_bits: bool| {
        let mut target = Vec::new();
        ser::BocHeader::with_root(root.as_ref())
            .with_crc(true)
            .with_index(index)
            .with_cache_bits(cache_bits)
            .encode(&mut target);
        target
    };

    assert_eq!(
        hex::encode(encode(false, false)),
        "b5ee9c7241010301000c0002020d020101020c02000155921e09df"
    );

    let indexed = encode(true, false);
    assert_eq!(
        hex::encode(&indexed),
        "b5ee9c72c1010301000c0005090c02020d020101020c02000155b647f116"
    );
    assert_eq!(Boc::decode(&indexed)?, root);

    // Offsets are doubled and the shared leaf is marked
    let cached = encode(true, true);
    assert_eq!(cached[4], 0b1110_0001);
    assert_eq!(&cached[11..14], &[0x0a, 0x12, 0x19]);
    assert_eq!(Boc::decode(&cached)?, root);

    // Cache bits alone are ignored
    assert_eq!(encode(false, true), encode(false, false));
    Ok(())
}

#[test]
fn shared_cells_are_stored_once() -> anyhow::Result<()> {
    let shared = {
        let mut builder = CellBuilder::new();
        builder.store_u64(0x0123456789abcdef)?;
        builder.build()?
    };
    let root = {
        let mut builder = CellBuilder::new();
        builder.store_reference(shared.clone())?;
        builder.store_reference(shared.clone())?;
        builder.store_reference(shared)?;
        builder.build()?
    };

    let header = ser::BocHeader::with_root(root.as_ref());
    assert_eq!(header.cell_count(), 2);

    let mut bytes = Vec::new();
    header.encode(&mut bytes);

    let parsed = de::BocHeader::decode(&bytes, &de::Options::exact(1))?;
    assert_eq!(parsed.cells().len(), 2);
    // Root is always written first
    assert_eq!(parsed.roots(), &[0]);

    assert_eq!(Boc::decode(&bytes)?, root);
    Ok(())
}

#[test]
fn deep_chain_roundtrip() -> anyhow::Result<()> {
    let mut cell = Cell::empty_cell();
    for i in 0..1000u32 {
        let mut builder = CellBuilder::new();
        builder.store_u32(i)?;
        builder.store_reference(cell)?;
        cell = builder.build()?;
    }
    assert_eq!(cell.repr_depth(), 1000);

    let decoded = Boc::decode(Boc::encode(&cell))?;
    assert_eq!(decoded.repr_hash(), cell.repr_hash());
    assert_eq!(decoded.repr_depth(), 1000);
    Ok(())
}

#[test]
fn multiple_roots() -> anyhow::Result<()> {
    let first = build_tree(4, 1)?;
    let second = build_tree(8, 2)?;

    let bytes = Boc::encode_pair((&first, &second));
    let (a, b) = Boc::decode_pair(&bytes)?;
    assert_eq!(a, first);
    assert_eq!(b, second);

    // Reversed order is preserved too
    let bytes = Boc::encode_ext([second.as_ref(), first.as_ref()], false);
    let roots = Boc::decode_roots(&bytes, &de::Options::default())?;
    assert_eq!(roots, vec![second.clone(), first.clone()]);

    assert_eq!(Boc::decode(&bytes), Err(de::Error::TooManyRootCells));

    let single = Boc::encode(&first);
    assert_eq!(Boc::decode_pair(single), Err(de::Error::TooFewRootCells));
    Ok(())
}

#[test]
fn exotic_cells_roundtrip() -> anyhow::Result<()> {
    let root = build_tree(8, 2)?;
    let child_hash = *root.reference(0).unwrap().repr_hash();
    let proof = crate::merkle::MerkleProof::create_for_cell(root.as_ref(), &child_hash).build()?;

    let cell = CellBuilder::build_from(&proof)?;
    assert_eq!(cell.cell_type(), CellType::MerkleProof);

    let decoded = Boc::decode(Boc::encode(&cell))?;
    assert_eq!(decoded, cell);
    assert_eq!(decoded.cell_type(), CellType::MerkleProof);
    Ok(())
}

#[test]
fn invalid_bocs() {
    assert_eq!(Boc::decode([0u8; 0]), Err(de::Error::UnexpectedEof));
    assert_eq!(
        Boc::decode([0xdeu8, 0xad, 0xbe, 0xef, 0x01, 0x01]),
        Err(de::Error::UnknownBocTag)
    );

    let valid = Boc::encode(Cell::empty_cell());
    assert_eq!(
        Boc::decode(&valid[..valid.len() - 1]),
        Err(de::Error::UnexpectedEof)
    );

    let mut zero_ref_size = valid.clone();
    zero_ref_size[4] = 0;
    assert_eq!(Boc::decode(&zero_ref_size), Err(de::Error::InvalidRefSize));

    let mut zero_offset_size = valid;
    zero_offset_size[5] = 0;
    assert_eq!(
        Boc::decode(&zero_offset_size),
        Err(de::Error::InvalidOffsetSize)
    );

    #[rustfmt::skip]
    let unnormalized: [u8; 14] = [
        0xb5, 0xee, 0x9c, 0x72, 0x01, 0x01,
        0x01, 0x01, 0x00, 0x03, 0x00,
        // one byte with only a completion tag
        0x00, 0x01, 0x80,
    ];
    assert_eq!(
        Boc::decode(unnormalized),
        Err(de::Error::UnnormalizedCell)
    );

    #[rustfmt::skip]
    let self_reference: [u8; 14] = [
        0xb5, 0xee, 0x9c, 0x72, 0x01, 0x01,
        0x01, 0x01, 0x00, 0x03, 0x00,
        // empty cell with a reference to itself
        0x01, 0x00, 0x00,
    ];
    assert_eq!(
        Boc::decode(self_reference),
        Err(de::Error::InvalidRefOrder)
    );

    #[rustfmt::skip]
    let absent: [u8; 13] = [
        0xb5, 0xee, 0x9c, 0x72, 0x01, 0x01,
        0x01, 0x01, 0x01, 0x02, 0x00,
        0x00, 0x00,
    ];
    assert_eq!(Boc::decode(absent), Err(de::Error::TooManyRootCells));
}

#[test]
fn boc_repr_roundtrip() -> anyhow::Result<()> {
    let hash = HashBytes([0x55; 32]);

    let bytes = BocRepr::encode(&hash)?;
    let decoded: HashBytes = BocRepr::decode(&bytes)?;
    assert_eq!(decoded, hash);

    let encoded = BocRepr::encode_base64(&0xdeadbeafu32)?;
    let decoded: u32 = BocRepr::decode_base64(encoded)?;
    assert_eq!(decoded, 0xdeadbeaf);

    assert!(matches!(
        BocRepr::decode::<u64, _>(&bytes[..4]),
        Err(BocReprError::InvalidBoc(de::Error::UnexpectedEof))
    ));

    let small = BocRepr::encode(&0xffu8)?;
    assert!(matches!(
        BocRepr::decode::<u32, _>(small),
        Err(BocReprError::InvalidData(crate::error::Error::CellUnderflow))
    ));
    Ok(())
}

#[cfg(feature = "serde")]
#[derive(::serde::Serialize, ::serde::Deserialize)]
struct SerdeWithHashBytes {
    some_hash: HashBytes,
}

#[cfg(feature = "serde")]
#[derive(::serde::Serialize, ::serde::Deserialize)]
struct SerdeWithCell {
    #[serde(with = "Boc")]
    some_cell: Cell,
}

#[cfg(feature = "serde")]
#[test]
fn hex_bytes() -> anyhow::Result<()> {
    let hash = HashBytes([0xab; 32]);

    let test = format!(r#"{{"some_hash":"{hash}"}}"#);
    let SerdeWithHashBytes { some_hash } = serde_json::from_str(&test)?;
    assert_eq!(some_hash, hash);

    let serialized = serde_json::to_string(&SerdeWithHashBytes { some_hash })?;
    assert_eq!(serialized, test);
    Ok(())
}

#[cfg(feature = "serde")]
#[test]
fn struct_with_cell() -> anyhow::Result<()> {
    let test = format!(r#"{{"some_cell":"{SMALL_BOC}"}}"#);
    let SerdeWithCell { some_cell } = serde_json::from_str(&test)?;

    let original = Boc::decode_base64(SMALL_BOC)?;
    assert_eq!(some_cell, original);

    let serialized = serde_json::to_string(&SerdeWithCell { some_cell })?;
    assert_eq!(serialized, test);

    let plain: Cell = serde_json::from_str(&format!("\"{SMALL_BOC}\""))?;
    assert_eq!(plain, original);

    assert!(serde_json::from_str::<Cell>("\"AAAA\"").is_err());
    Ok(())
}

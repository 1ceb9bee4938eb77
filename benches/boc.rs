use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use ton_cells::boc::Boc;
use ton_cells::cell::{Cell, CellBuilder};

/// Builds a random balanced tree with `leaves` leaf cells.
///
/// Small leaves repeat often, so the tree also has shared cells.
fn random_tree(leaves: usize) -> Cell {
    let mut rng = rand_xorshift::XorShiftRng::from_seed([0u8; 16]);

    let mut level = (0..leaves)
        .map(|_| {
            let mut builder = CellBuilder::new();
            if rng.gen_bool(0.5) {
                builder.store_u8(rng.gen_range(0..16)).unwrap();
            } else {
                for _ in 0..rng.gen_range(0..=127) {
                    builder.store_u8(rng.gen()).unwrap();
                }
            }
            builder.build().unwrap()
        })
        .collect::<Vec<_>>();

    while level.len() > 1 {
        level = level
            .chunks(4)
            .map(|chunk| {
                let mut builder = CellBuilder::new();
                builder.store_u32(rng.gen()).unwrap();
                for child in chunk {
                    builder.store_reference(child.clone()).unwrap();
                }
                builder.build().unwrap()
            })
            .collect();
    }

    level.pop().unwrap_or_default()
}

fn deserialize_boc(id: BenchmarkId, boc: &[u8], c: &mut Criterion) {
    c.bench_with_input(id, &boc, |b, boc| {
        b.iter(|| {
            let result = Boc::decode(boc);
            _ = black_box(result);
        });
    });
}

fn serialize_boc(id: BenchmarkId, cell: &Cell, c: &mut Criterion) {
    c.bench_with_input(id, cell, |b, cell| {
        b.iter(|| {
            let result = Boc::encode(cell.as_ref());
            _ = black_box(result);
        });
    });
}

fn boc_group(c: &mut Criterion) {
    for leaves in [10, 1000, 50000] {
        let cell = random_tree(leaves);
        let boc = Boc::encode(&cell);

        let params = format!("leaves={leaves}");
        deserialize_boc(BenchmarkId::new("deserialize_boc", &params), &boc, c);
        serialize_boc(BenchmarkId::new("serialize_boc", &params), &cell, c);
    }
}

criterion_group!(boc, boc_group);
criterion_main!(boc);
